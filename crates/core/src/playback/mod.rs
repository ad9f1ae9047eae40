//! Playing a finalized artifact back to the user.

#[cfg(feature = "audio-device")]
mod audio;
mod silent;

use crate::capture::AudioArtifact;
use futures::future::BoxFuture;

#[cfg(feature = "audio-device")]
pub use audio::AudioPlayer;
pub use silent::SilentPlayer;

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("audio output unavailable: {details}")]
    AudioOutputUnavailable { details: String },

    #[error("artifact could not be decoded for playback: {0}")]
    Undecodable(String),
}

pub trait ArtifactPlayer: Send + Sync {
    fn play(&self, artifact: AudioArtifact) -> BoxFuture<'_, Result<(), PlaybackError>>;
}
