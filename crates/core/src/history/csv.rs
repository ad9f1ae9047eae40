use crate::history::HistoryLogEntry;
use crate::interpret::round_pct;
use chrono::SecondsFormat;
use std::borrow::Cow;

pub const CSV_HEADER: &str = "timestamp,message,emotion,confidence";

pub fn to_csv(logs: &[HistoryLogEntry]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + logs.len() * 64);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for log in logs {
        let timestamp = log
            .timestamp
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default();
        let confidence = format!("{:.1}%", round_pct(log.confidence));
        let row = [
            escape_field(&timestamp),
            escape_field(&log.message),
            escape_field(&log.emotion),
            escape_field(&confidence),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn escape_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
