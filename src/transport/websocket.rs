//! WebSocket topic source
//!
//! Subscribes to `ws[s]://<server>/<topic>/ws`, ntfy's WebSocket endpoint,
//! optionally with `?since=<id>` to replay what was missed while
//! disconnected. Each text frame is one JSON event; frames that do not parse
//! are logged and skipped rather than tearing the connection down.
//!
//! Handshake failures are classified here: a 4xx answer (except 429) or a
//! URL the client cannot use means the topic is rejected for good, anything
//! else is transient.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tracing::{debug, warn};
use tungstenite::Error as WsError;
use tungstenite::http::StatusCode;
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use crate::bridge::topic::{Scheme, TopicKey};
use crate::config::ListenerSettings;
use crate::transport::message::NtfyEvent;
use crate::transport::source::{EventStream, TopicSource};
use crate::utils::{BridgeError, Result};

#[derive(Debug, Clone)]
pub struct WebSocketSource {
    secure: bool,
    connect_timeout: Duration,
}

impl WebSocketSource {
    pub fn new(settings: &ListenerSettings) -> Self {
        Self {
            secure: settings.secure,
            connect_timeout: settings.connect_timeout(),
        }
    }

    /// The URL a listener for `key` connects to. An explicit `http://` or
    /// `https://` on the key overrides the `secure` setting.
    pub fn endpoint(&self, key: &TopicKey, since: Option<&str>) -> Result<Url> {
        let secure = match key.scheme() {
            Some(Scheme::Https) => true,
            Some(Scheme::Http) => false,
            None => self.secure,
        };
        let scheme = if secure { "wss" } else { "ws" };
        let mut url = Url::parse(&format!("{scheme}://{}/{}/ws", key.server(), key.topic()))
            .map_err(|e| BridgeError::ConnectionRejected(format!("unusable url for {key}: {e}")))?;
        if let Some(since) = since {
            url.query_pairs_mut().append_pair("since", since);
        }
        Ok(url)
    }
}

#[async_trait]
impl TopicSource for WebSocketSource {
    async fn open(&self, key: &TopicKey, since: Option<&str>) -> Result<EventStream> {
        let url = self.endpoint(key, since)?;
        debug!(topic = %key, %url, "opening websocket");

        let (ws_stream, _response) =
            match tokio::time::timeout(self.connect_timeout, connect_async(url.as_str())).await {
                Err(_) => {
                    return Err(BridgeError::ConnectionFailed(format!(
                        "handshake with {key} timed out after {:?}",
                        self.connect_timeout
                    )));
                }
                Ok(Err(e)) => return Err(classify(e)),
                Ok(Ok(pair)) => pair,
            };

        let topic = key.to_string();
        let events = ws_stream.filter_map(move |frame| {
            let topic = topic.clone();
            async move {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        match serde_json::from_str::<NtfyEvent>(text.as_str()) {
                            Ok(event) => Some(Ok(event)),
                            Err(e) => {
                                warn!(%topic, error = %e, "skipping malformed event");
                                None
                            }
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        debug!(%topic, ?frame, "server closed the stream");
                        None
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(BridgeError::ConnectionFailed(e.to_string()))),
                }
            }
        });

        Ok(Box::pin(events))
    }
}

fn classify(error: WsError) -> BridgeError {
    match error {
        WsError::Http(response) => {
            let status = response.status();
            if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                BridgeError::ConnectionRejected(format!("server answered {status}"))
            } else {
                BridgeError::ConnectionFailed(format!("server answered {status}"))
            }
        }
        WsError::Url(e) => BridgeError::ConnectionRejected(e.to_string()),
        other => BridgeError::ConnectionFailed(other.to_string()),
    }
}
