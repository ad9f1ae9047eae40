#![deny(warnings)]

pub mod api;
pub mod capture;
pub mod config;
pub mod console;
#[cfg(feature = "audio-device")]
mod device;
pub mod history;
pub mod interpret;
pub mod memory;
pub mod paging;
pub mod playback;
pub mod session;
pub mod verify;
pub mod wire;
