//! Text-safe transcoding of encoded buffers.
//!
//! Standard padded base64, so a packet can ride on transports that only carry strings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::Error;
use crate::Result;

/// Transcodes an encoded buffer into base64 text.
pub fn to_text(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Recovers an encoded buffer from base64 text.
pub fn from_text(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| Error::InvalidText(e.to_string()))
}
