//! Topic addressing
//!
//! A `TopicKey` names one ntfy topic on one server. It is the unit the
//! subscription store groups rooms by and the unit the listener pool keeps
//! exactly one connection for.
//!
//! Accepted targets look like `ntfy.sh/alerts` or `localhost:8080/builds`.
//! A leading `http://` or `https://` is kept and pins the connection to
//! plain or TLS WebSockets; without one the listener settings decide.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::{BridgeError, Result};

const MAX_TOPIC_LEN: usize = 64;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn prefix(self) -> &'static str {
        match self {
            Scheme::Http => "http://",
            Scheme::Https => "https://",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicKey {
    server: String,
    topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scheme: Option<Scheme>,
}

impl TopicKey {
    /// Parse and validate a `<server>/<topic>` target.
    pub fn parse(target: &str) -> Result<Self> {
        let invalid = || BridgeError::InvalidTarget(target.to_string());

        let trimmed = target.trim();
        let (scheme, trimmed) = if let Some(rest) = trimmed.strip_prefix("https://") {
            (Some(Scheme::Https), rest)
        } else if let Some(rest) = trimmed.strip_prefix("http://") {
            (Some(Scheme::Http), rest)
        } else {
            (None, trimmed)
        };

        let (server, topic) = trimmed.split_once('/').ok_or_else(invalid)?;
        if !is_valid_server(server) || !is_valid_topic(topic) {
            return Err(invalid());
        }

        Ok(Self {
            server: server.to_ascii_lowercase(),
            topic: topic.to_string(),
            scheme,
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Scheme given explicitly in the target, if any.
    pub fn scheme(&self) -> Option<Scheme> {
        self.scheme
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = self.scheme.map_or("", Scheme::prefix);
        write!(f, "{scheme}{}/{}", self.server, self.topic)
    }
}

fn is_valid_topic(topic: &str) -> bool {
    !topic.is_empty()
        && topic.len() <= MAX_TOPIC_LEN
        && topic
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn is_valid_server(server: &str) -> bool {
    let host = match server.rsplit_once(':') {
        Some((host, port)) => {
            if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
                return false;
            }
            match port.parse::<u16>() {
                Ok(0) | Err(_) => return false,
                Ok(_) => host,
            }
        }
        None => server,
    };

    host.eq_ignore_ascii_case("localhost") || is_ipv4(host) || is_domain(host)
}

fn is_ipv4(host: &str) -> bool {
    host.parse::<std::net::Ipv4Addr>().is_ok()
}

/// One or more `[A-Za-z0-9-]{1,63}` labels followed by an alphabetic TLD of
/// two to six characters.
fn is_domain(host: &str) -> bool {
    let labels: Vec<&str> = host.split('.').collect();
    let Some((tld, rest)) = labels.split_last() else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }

    let tld_ok = (2..=6).contains(&tld.len()) && tld.bytes().all(|b| b.is_ascii_alphabetic());
    let labels_ok = rest.iter().all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    });

    tld_ok && labels_ok
}
