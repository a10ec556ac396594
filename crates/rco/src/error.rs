//! # Error Definitions
//!
//! Failures a context raises to its local caller. Failures while servicing the peer's
//! calls never appear here; they travel back over the failure channel instead.

use std::fmt;

/// Errors surfaced synchronously by a `Context`.
#[derive(Debug, Clone)]
pub enum ContextError {
    /// No output sink has been bound yet.
    TransportNotBound,
    /// The requested wire encoding does not exist.
    UnsupportedEncoding(String),
    /// Inbound data matched none of the accepted payload shapes.
    UnrecognizedPayloadShape(String),
    /// The binary codec rejected the payload.
    Codec(rcopack::Error),
    /// The payload decoded, but is not a well-formed packet.
    MalformedPacket(String),
    /// A call arrived with no Tokio runtime to run its handler on.
    NoRuntime,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportNotBound => write!(f, "context is not bound to an output sink"),
            Self::UnsupportedEncoding(name) => write!(f, "unsupported output encoding: {}", name),
            Self::UnrecognizedPayloadShape(msg) => write!(f, "unable to process payload: {}", msg),
            Self::Codec(e) => write!(f, "codec error: {}", e),
            Self::MalformedPacket(msg) => write!(f, "malformed packet: {}", msg),
            Self::NoRuntime => write!(f, "no tokio runtime to run the handler on"),
        }
    }
}

impl std::error::Error for ContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rcopack::Error> for ContextError {
    fn from(e: rcopack::Error) -> Self {
        Self::Codec(e)
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
