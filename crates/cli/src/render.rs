use chrono::Local;
use emotion_client_core::api::{AdaptiveReply, Insights, UserProfile};
use emotion_client_core::console::{Connectivity, NoticeLevel, RenderSink};
use emotion_client_core::history::HistoryView;
use emotion_client_core::interpret::{ClassificationResult, DisplayMode, DisplayModel};
use emotion_client_core::memory::MemoryView;
use std::io::Write;

const DEFAULT_ICON: &str = "•";
const MESSAGE_WIDTH: usize = 48;

fn icon_for(label: &str) -> &'static str {
    match label.to_ascii_lowercase().as_str() {
        "joy" | "happy" | "happiness" => "😊",
        "love" => "❤",
        "gratitude" | "relief" => "🙏",
        "optimism" => "🌤",
        "sadness" | "sad" => "😢",
        "anger" | "angry" | "frustration" => "😠",
        "fear" => "😨",
        "surprise" => "😮",
        "disgust" => "🤢",
        "neutral" | "calm" => "😐",
        "boredom" => "🥱",
        "stress" | "stressed" => "😣",
        _ => DEFAULT_ICON,
    }
}

fn truncate(text: &str, width: usize) -> String {
    let single_line = text.replace(['\n', '\r'], " ");
    if single_line.chars().count() <= width {
        return single_line;
    }
    let mut out: String = single_line.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Prints to stdout; notices go to stderr so piped output stays clean.
#[derive(Debug)]
pub struct TerminalSink {
    show_timeline: bool,
    hold_history: bool,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self {
            show_timeline: false,
            hold_history: false,
        }
    }

    pub fn with_timeline(mut self, show: bool) -> Self {
        self.show_timeline = show;
        self
    }

    /// While held, history updates are swallowed; the next one after
    /// release is printed.
    pub fn hold_history(&mut self, hold: bool) {
        self.hold_history = hold;
    }
}

impl RenderSink for TerminalSink {
    fn classification(&mut self, result: &ClassificationResult, model: &DisplayModel) {
        let mut out = std::io::stdout().lock();
        match model.mode {
            DisplayMode::Single => {
                let _ = writeln!(
                    out,
                    "{} {}  {}",
                    icon_for(&model.primary.label),
                    model.primary.label,
                    model.confidence_text()
                );
            }
            DisplayMode::Mixed => {
                let _ = writeln!(out, "Mixed emotions:");
                for (chip, label) in model.chips().iter().zip(
                    std::iter::once(&model.primary).chain(model.secondary.as_ref()),
                ) {
                    let _ = writeln!(out, "  {} {}", icon_for(&label.label), chip);
                }
            }
        }
        if let Some(transcript) = result.transcript.as_deref().filter(|t| !t.is_empty()) {
            let _ = writeln!(out, "Transcript: {transcript}");
        }
    }

    fn history(&mut self, view: &HistoryView) {
        if self.hold_history {
            return;
        }
        let mut out = std::io::stdout().lock();
        let window = match view.since_days() {
            0 => "all time".to_owned(),
            days => format!("last {days} days"),
        };
        if view.is_empty() {
            let _ = writeln!(out, "No history for {window}.");
            return;
        }

        let _ = writeln!(
            out,
            "History ({window}): page {}/{} of {} records",
            view.current_page(),
            view.total_pages(),
            view.filtered().len()
        );
        for log in view.current_slice() {
            let when = log
                .timestamp
                .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".repeat(16));
            let _ = writeln!(
                out,
                "  {when}  {} {:<10} {:>6.1}%  {}",
                icon_for(&log.emotion),
                log.emotion,
                log.confidence * 100.0,
                truncate(&log.message, MESSAGE_WIDTH)
            );
        }

        let counts: Vec<String> = view
            .emotion_counts()
            .into_iter()
            .map(|(label, n)| format!("{label} {n}"))
            .collect();
        let _ = writeln!(out, "Counts: {}", counts.join(", "));

        if self.show_timeline {
            let timeline = view.timeline();
            let _ = writeln!(out, "Timeline (axis: {}):", timeline.labels.join(" < "));
            for point in &timeline.points {
                let _ = writeln!(
                    out,
                    "  {}  {:>2} {}",
                    point.timestamp.with_timezone(&Local).format("%m-%d %H:%M"),
                    point.emotion_index,
                    timeline.label_of(point).unwrap_or(DEFAULT_ICON)
                );
            }
        }
    }

    fn memories(&mut self, view: &MemoryView) {
        let mut out = std::io::stdout().lock();
        if view.is_empty() {
            let _ = writeln!(out, "No memories saved yet.");
            return;
        }
        let _ = writeln!(
            out,
            "Memories: page {}/{} of {}",
            view.current_page(),
            view.total_pages(),
            view.entries().len()
        );
        for memory in view.current_slice() {
            let when = memory
                .created_at
                .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  [{}] {:<10} {:<12} {}",
                memory.importance,
                memory.memory_type,
                when,
                truncate(&memory.content, MESSAGE_WIDTH)
            );
        }
    }

    fn insights(&mut self, insights: &Insights) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(
            out,
            "Last {} days: {} classifications, top emotion {}",
            insights.window_days,
            insights.total,
            insights.top_emotion.as_deref().unwrap_or("-")
        );
        let _ = writeln!(
            out,
            "Mix: {:.0}% positive, {:.0}% negative, {:.0}% neutral",
            insights.mix.positive * 100.0,
            insights.mix.negative * 100.0,
            insights.mix.neutral * 100.0
        );
        for (label, count) in &insights.counts {
            let _ = writeln!(out, "  {} {label}: {count}", icon_for(label));
        }
    }

    fn profile(&mut self, profile: &UserProfile) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "User:  {}", profile.user_id);
        let _ = writeln!(out, "Name:  {}", profile.name.as_deref().unwrap_or("-"));
        let _ = writeln!(
            out,
            "Style: {}",
            profile.interaction_style.as_deref().unwrap_or("-")
        );
        if !profile.preferences.is_empty() {
            let _ = writeln!(out, "Likes: {}", profile.preferences.join(", "));
        }
    }

    fn reply(&mut self, reply: &AdaptiveReply) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", reply.response);
        tracing::debug!(reason = %reply.reason, pos = reply.stats.pos_pct, neg = reply.stats.neg_pct, "adaptive reply");
    }

    fn connectivity(&mut self, state: &Connectivity) {
        let mut out = std::io::stdout().lock();
        let _ = match state {
            Connectivity::Online { status } => writeln!(out, "Service online ({status})"),
            Connectivity::Degraded { status } => writeln!(out, "Service degraded ({status})"),
            Connectivity::Offline { message } => writeln!(out, "Service offline: {message}"),
        };
    }

    fn notice(&mut self, level: NoticeLevel, message: &str) {
        let prefix = match level {
            NoticeLevel::Info => "",
            NoticeLevel::Warning => "warning: ",
            NoticeLevel::Error => "error: ",
        };
        eprintln!("{prefix}{message}");
    }
}
