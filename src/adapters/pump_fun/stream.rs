//! PumpPortal WebSocket connector
//!
//! Thin tokio-tungstenite transport behind the [`StreamConnector`] port.
//! Protocol handling (subscriptions, acks, dispatch) lives in the
//! subscription session; this module only moves text frames.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::ports::stream::{StreamConnection, StreamConnector, StreamError};

/// Default WebSocket URL for pump.fun data
pub const DEFAULT_WS_URL: &str = "wss://pumpportal.fun/api/data";

/// Maximum message size in bytes (prevent memory exhaustion)
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Append the optional API key the way PumpPortal expects it
pub fn stream_url(base: &str, api_key: Option<&str>) -> String {
    match api_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => {
            let sep = if base.contains('?') { '&' } else { '?' };
            format!("{}{}api-key={}", base, sep, key)
        }
        None => base.to_string(),
    }
}

/// Strip the API key before a URL goes into a log line
fn redact_url(url: &str) -> String {
    match url.find("api-key=") {
        Some(idx) => format!("{}api-key=***", &url[..idx]),
        None => url.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
    max_message_size: usize,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration, max_message_size: usize) -> Self {
        Self {
            connect_timeout,
            max_message_size,
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, MAX_MESSAGE_SIZE)
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamConnection>, StreamError> {
        let safe_url = redact_url(url);
        info!("Connecting to {}", safe_url);

        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| StreamError::ConnectionFailed(format!("timed out connecting to {}", safe_url)))?
            .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;

        info!("Connected to {}", safe_url);
        Ok(Box::new(WsConnection {
            stream: ws_stream,
            max_message_size: self.max_message_size,
        }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    max_message_size: usize,
}

impl WsConnection {
    fn check_size(&self, size: usize) -> Result<(), StreamError> {
        if size > self.max_message_size {
            warn!("Message exceeds max size: {} > {} bytes", size, self.max_message_size);
            return Err(StreamError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StreamConnection for WsConnection {
    async fn send(&mut self, text: String) -> Result<(), StreamError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| StreamError::SendFailed(e.to_string()))
    }

    async fn next_message(&mut self) -> Option<Result<String, StreamError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    if let Err(e) = self.check_size(text.len()) {
                        return Some(Err(e));
                    }
                    return Some(Ok(text.as_str().to_string()));
                }
                Ok(Message::Binary(bytes)) => {
                    if let Err(e) = self.check_size(bytes.len()) {
                        return Some(Err(e));
                    }
                    match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => return Some(Ok(text)),
                        Err(_) => debug!("Ignoring non-UTF8 binary frame ({} bytes)", bytes.len()),
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!("Server closed connection: {:?}", frame);
                    return None;
                }
                // tungstenite queues the pong for pings itself and flushes it on the next read or write
                Ok(_) => {}
                Err(e) => return Some(Err(StreamError::ReceiveFailed(e.to_string()))),
            }
        }
    }

    async fn ping(&mut self) -> Result<(), StreamError> {
        self.stream
            .send(Message::Ping(Default::default()))
            .await
            .map_err(|e| StreamError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| StreamError::SendFailed(e.to_string()))
    }
}
