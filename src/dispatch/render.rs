//! Room message layout
//!
//! ```text
//! ntfy message in topic ntfy.sh/alerts
//! ⚠️ backup (https://example.com/backup)
//! disk full
//! Tags: db
//! Attachment: log.txt (https://example.com/log.txt)
//! ```
//!
//! Emoji tags prefix the title, or the body when there is no title. The click
//! URL follows the title, or the body when there is no title.

use crate::bridge::topic::TopicKey;
use crate::dispatch::emoji;
use crate::transport::NtfyEvent;

pub fn render_event(key: &TopicKey, event: &NtfyEvent) -> String {
    let (emoji, plain_tags) = emoji::split_tags(&event.tags);
    let prefix = if emoji.is_empty() {
        String::new()
    } else {
        format!("{} ", emoji.concat())
    };
    let link = |text: &str| match &event.click {
        Some(url) => format!("{text} ({url})"),
        None => text.to_string(),
    };
    let body = event.message.as_deref().unwrap_or_default();

    let mut lines = vec![format!("ntfy message in topic {key}")];
    match event.title.as_deref().filter(|t| !t.is_empty()) {
        Some(title) => {
            lines.push(format!("{prefix}{}", link(title)));
            if !body.is_empty() {
                lines.push(body.to_string());
            }
        }
        None => lines.push(format!("{prefix}{}", link(body))),
    }

    if !plain_tags.is_empty() {
        lines.push(format!("Tags: {}", plain_tags.join(", ")));
    }
    if let Some(attachment) = &event.attachment {
        lines.push(format!("Attachment: {} ({})", attachment.name, attachment.url));
    }

    lines.join("\n")
}

/// Sent to every room of a topic the server refused.
pub fn render_rejection(key: &TopicKey, reason: &str) -> String {
    format!(
        "The ntfy server refused topic {key} ({reason}). This room has been unsubscribed from {key}."
    )
}
