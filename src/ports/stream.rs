use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StreamError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("Connection closed")]
    Closed,
}

/// An open text-frame socket
///
/// `next_message` must be cancel safe: a session abandons a pending read when
/// its deadline or cancellation fires.
#[async_trait]
pub trait StreamConnection: Send {
    async fn send(&mut self, text: String) -> Result<(), StreamError>;

    /// Next inbound text message, `None` once the peer closed the socket
    async fn next_message(&mut self) -> Option<Result<String, StreamError>>;

    async fn ping(&mut self) -> Result<(), StreamError>;

    async fn close(&mut self) -> Result<(), StreamError>;
}

/// Opens socket connections
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamConnection>, StreamError>;
}
