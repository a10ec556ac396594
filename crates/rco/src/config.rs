//! Context configuration knobs.

use std::str::FromStr;

use crate::error::ContextError;

/// How outbound packets are handed to the output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// The decoded value tree itself, no serialization.
    Raw,
    /// The tree encoded with `rcopack`.
    #[default]
    Binary,
    /// The `rcopack` bytes transcoded to base64 text.
    Text,
}

impl FromStr for Encoding {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Encoding::Raw),
            "jsob" | "jsobin" | "binary" => Ok(Encoding::Binary),
            "base64" | "text" => Ok(Encoding::Text),
            other => Err(ContextError::UnsupportedEncoding(other.to_string())),
        }
    }
}

/// What to do when a handler fails and the caller supplied no failure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhandledFailure {
    /// Discard silently. Fire-and-forget callers asked for nothing back.
    #[default]
    Drop,
    /// Discard, but emit a `warn!` event with the failure value.
    Log,
}
