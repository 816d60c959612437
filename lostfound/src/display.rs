//! Presentation helpers for conversation rows and message bubbles.

use chrono::{DateTime, TimeZone};

use lostfound_proto::model::{Chat, ChatMessage, UserId};

/// Shown for timestamps that do not parse.
pub const UNKNOWN_TIME: &str = "--:--";

/// Shown when a participant's name is unknown.
pub const UNKNOWN_USER: &str = "Unknown user";

/// Label for the local user's own messages.
pub const OWN_LABEL: &str = "You";

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Format an RFC 3339 timestamp relative to `now`, in `now`'s time zone.
///
/// Less than a day old renders as `HH:MM`, less than a week as the short
/// weekday (`Mon`), anything older as `dd/MM`. Day counts are floored, so a
/// timestamp in the future renders as a weekday.
#[must_use]
pub fn format_time<Tz: TimeZone>(created_at: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let Ok(parsed) = DateTime::parse_from_rfc3339(created_at) else {
        return UNKNOWN_TIME.to_string();
    };
    let local = parsed.with_timezone(&now.timezone());
    let elapsed = now.clone().signed_duration_since(local.clone()).num_seconds();
    let days = elapsed.div_euclid(SECONDS_PER_DAY);

    let pattern = match days {
        0 => "%H:%M",
        ..=6 => "%a",
        _ => "%d/%m",
    };
    local.format(pattern).to_string()
}

/// Who wrote `message`, from the point of view of `current_user`.
#[must_use]
pub fn sender_label(message: &ChatMessage, current_user: Option<&UserId>) -> String {
    if current_user == Some(&message.sender_id) {
        return OWN_LABEL.to_string();
    }
    message
        .sender
        .as_ref()
        .map(|s| s.full_name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_USER)
        .to_string()
}

/// Title of a conversation row: the other participant's name.
#[must_use]
pub fn chat_title(chat: &Chat) -> &str {
    chat.other_user
        .as_ref()
        .map(|u| u.full_name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_USER)
}

/// Title of the item a conversation is about.
#[must_use]
pub fn item_label(chat: &Chat) -> &str {
    chat.item_title.as_deref().unwrap_or("Unknown item")
}

/// One-line preview of a conversation row.
#[must_use]
pub fn chat_preview(chat: &Chat) -> &str {
    chat.last_message
        .as_ref()
        .map_or("No messages yet", |m| m.content.as_str())
}
