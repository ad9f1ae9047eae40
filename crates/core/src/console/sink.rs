use crate::api::{AdaptiveReply, Insights, UserProfile};
use crate::history::HistoryView;
use crate::interpret::{ClassificationResult, DisplayModel};
use crate::memory::MemoryView;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Connectivity {
    Online { status: String },
    Degraded { status: String },
    Offline { message: String },
}

/// Where the console writes what the user should see. The host owns the
/// presentation; the console only decides what to show.
pub trait RenderSink: Send {
    fn classification(&mut self, result: &ClassificationResult, model: &DisplayModel);

    fn history(&mut self, view: &HistoryView);

    fn memories(&mut self, view: &MemoryView);

    fn insights(&mut self, insights: &Insights);

    fn profile(&mut self, profile: &UserProfile);

    fn reply(&mut self, reply: &AdaptiveReply);

    fn connectivity(&mut self, state: &Connectivity);

    fn notice(&mut self, level: NoticeLevel, message: &str);
}
