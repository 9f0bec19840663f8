//! Chat command parsing
//!
//! Commands are addressed to the bridge with `!<prefix>`:
//!
//! ```text
//! !ntfy subscribe ntfy.sh/alerts     (alias: sub)
//! !ntfy unsubscribe ntfy.sh/alerts   (alias: unsub)
//! !ntfy list
//! !ntfy help
//! ```

use tracing::warn;

use crate::bridge::engine::Bridge;
use crate::listener::ConnectionState;
use crate::utils::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Subscribe(String),
    Unsubscribe(String),
    List,
    Help,
    /// Addressed to the bridge but not understood; holds the verb.
    Unknown(String),
}

impl Command {
    /// Parse a chat line. Returns `None` when the line is not addressed to
    /// the bridge.
    pub fn parse(prefix: &str, line: &str) -> Option<Command> {
        let mut words = line.split_whitespace();
        let head = words.next()?.strip_prefix('!')?;
        if !head.eq_ignore_ascii_case(prefix) {
            return None;
        }

        let Some(verb) = words.next() else {
            return Some(Command::Help);
        };
        let argument = words.next();

        let command = match (verb.to_ascii_lowercase().as_str(), argument) {
            ("subscribe" | "sub", Some(target)) => Command::Subscribe(target.to_string()),
            ("unsubscribe" | "unsub", Some(target)) => Command::Unsubscribe(target.to_string()),
            ("list" | "ls", None) => Command::List,
            ("help", _) => Command::Help,
            _ => Command::Unknown(verb.to_string()),
        };
        Some(command)
    }
}

pub fn help_text(prefix: &str) -> String {
    format!(
        "Manage ntfy subscriptions.\n\
         !{prefix} subscribe <server>/<topic>: Subscribe this room to a ntfy topic.\n\
         !{prefix} unsubscribe <server>/<topic>: Unsubscribe this room from a ntfy topic.\n\
         !{prefix} list: List the topics this room is subscribed to."
    )
}

/// Run `command` for `room_id` and return the reply for the room.
pub async fn execute(bridge: &Bridge, room_id: &str, command: Command) -> String {
    let prefix = bridge.settings().command_prefix.clone();

    match command {
        Command::Subscribe(target) => match bridge.subscribe(room_id, &target).await {
            Ok(done) if done.state == ConnectionState::Closed => format!(
                "Subscribed this room to {}, but the server refused the connection",
                done.key
            ),
            Ok(done) => format!("Subscribed this room to {}", done.key),
            Err(BridgeError::AlreadySubscribed(key)) => {
                format!("This room is already subscribed to {key}")
            }
            Err(e) => reply_error(room_id, e),
        },
        Command::Unsubscribe(target) => match bridge.unsubscribe(room_id, &target).await {
            Ok(done) => format!("Unsubscribed this room from {}", done.key),
            Err(BridgeError::NotSubscribed(key)) => {
                format!("This room is not subscribed to {key}")
            }
            Err(e) => reply_error(room_id, e),
        },
        Command::List => match bridge.subscriptions(room_id) {
            Ok(topics) if topics.is_empty() => "This room is not subscribed to any topic".to_string(),
            Ok(topics) => {
                let mut lines = vec!["This room is subscribed to:".to_string()];
                for (key, info) in topics {
                    let state = info.map_or(ConnectionState::Closed, |info| info.state);
                    lines.push(format!("- {key} ({state})"));
                }
                lines.join("\n")
            }
            Err(e) => reply_error(room_id, e),
        },
        Command::Help => help_text(&prefix),
        Command::Unknown(verb) => format!(
            "Unknown command `{verb}`. Try !{prefix} help"
        ),
    }
}

fn reply_error(room_id: &str, error: BridgeError) -> String {
    match error {
        BridgeError::InvalidTarget(_) | BridgeError::InvalidRoom(_) => {
            let mut text = error.to_string();
            if let Some(first) = text.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            text
        }
        other => {
            warn!(room_id = %room_id, error = %other, "command failed");
            "Something went wrong, see the bridge logs".to_string()
        }
    }
}
