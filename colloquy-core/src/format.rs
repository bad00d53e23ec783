//! Formatting helpers shared across front ends.

use chrono::{DateTime, Local, Utc};

use crate::types::Chat;

/// Relative age of `ts` as seen at `now` (e.g. "2m ago").
pub fn relative_time_at(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(ts);

    if age.num_seconds() < 10 {
        "just now".to_string()
    } else if age.num_seconds() < 60 {
        format!("{}s ago", age.num_seconds())
    } else if age.num_minutes() < 60 {
        format!("{}m ago", age.num_minutes())
    } else if age.num_hours() < 24 {
        format!("{}h ago", age.num_hours())
    } else if age.num_days() < 7 {
        format!("{}d ago", age.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}

pub fn relative_time(ts: DateTime<Utc>) -> String {
    relative_time_at(ts, Utc::now())
}

/// Message time as local `HH:MM`
pub fn clock_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%H:%M").to_string()
}

/// Sidebar row text for a chat: title, message count and age
pub fn chat_list_label(chat: &Chat) -> String {
    format!(
        "{} ({}, {})",
        chat.title,
        chat.messages.len(),
        relative_time(chat.last_activity())
    )
}

/// Human-readable byte count (e.g. "5.0 MiB")
pub fn byte_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{} B", bytes)
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / (KIB * KIB))
    }
}
