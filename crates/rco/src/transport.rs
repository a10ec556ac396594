//! # Transport Abstraction
//!
//! A minimal, async interface for moving encoded packets between two contexts.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Transport knows nothing about packets or handles.
//!   It moves opaque buffers.
//! - **Message-Framed**: One `send` is one packet and one `recv` yields one packet.
//!   Framing a byte stream is the implementation's job.

use std::fmt;

#[derive(Debug, Clone)]
pub enum TransportError {
    /// The other end has gone away.
    ConnectionLost(String),
    /// Any other failure of the underlying medium.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "transport closed: {}", msg),
            Self::Io(msg) => write!(f, "transport i/o: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A bidirectional, message-framed byte channel. Object safe; the pump holds it as
/// `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one framed packet.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Receives the next packet, or `None` once the stream is closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;
}
