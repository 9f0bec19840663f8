use std::fmt;

/// Lifecycle of a topic connection.
///
/// `Connecting` -> `Active` on the first handshake, `Active` <-> `Retrying`
/// across disconnects, and any state -> `Closed`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    Retrying,
    Closed,
}

impl ConnectionState {
    pub fn is_closed(self) -> bool {
        self == ConnectionState::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Active => "active",
            ConnectionState::Retrying => "retrying",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
