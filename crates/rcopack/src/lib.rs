//! # Rcopack
//!
//! A small tagged binary encoding for the dynamic value trees exchanged by `rco` contexts.
//!
//! ## Philosophy
//!
//! - **Closed Tree**: Exactly seven kinds of node exist. Anything richer is built from them.
//! - **TLV Architecture**: `[Tag][Length?][Value]` so a reader can skip a node without understanding it.
//! - **Bounded**: Decoders are zero-copy, bounds-checked views and nesting depth is capped on both sides.
//!
//! ## Format
//!
//! - **Scalars**: `[Tag: 1b][Data: N]`
//! - **Blobs**: `[Tag: 1b][Len: 4b][Data: Len]`
//! - **Containers**: `[Tag: 1b][Len: 4b][Body: Len]`
//!
//! All integers are Little-Endian. Mapping bodies are a run of `[Text key][Value]` pairs.

mod text;

#[cfg(test)]
mod tests;

pub use text::from_text;
pub use text::to_text;

/// Maximum container nesting accepted by the encoder and decoder.
pub const MAX_DEPTH: usize = 128;

/// Rcopack serialization and deserialization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// Byte does not correspond to a valid `Tag`.
    InvalidTag(u8),
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// Blob or container length exceeds `u32::MAX`.
    BlobTooLarge(usize),
    /// Containers nested deeper than `MAX_DEPTH`.
    DepthExceeded,
    /// Bytes left over after the root value.
    TrailingBytes(usize),
    /// Text form is not valid base64.
    InvalidText(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnexpectedEnd => write!(f, "unexpected end of buffer"),
            Error::InvalidTag(b) => write!(f, "invalid tag byte: {:#04x}", b),
            Error::InvalidUtf8 => write!(f, "string is not valid utf-8"),
            Error::BlobTooLarge(len) => write!(f, "blob of {} bytes exceeds u32 length", len),
            Error::DepthExceeded => write!(f, "nesting deeper than {} levels", MAX_DEPTH),
            Error::TrailingBytes(n) => write!(f, "{} trailing bytes after root value", n),
            Error::InvalidText(msg) => write!(f, "invalid text encoding: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for Rcopack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Identifies the kind of the encoded node.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Null = 0x00,
    BoolTrue = 0x01,
    BoolFalse = 0x02,
    Number = 0x0C,
    Placeholder = 0x0F,

    // Blobs (Tag + u32 Len + Bytes)
    Text = 0x10,

    // Containers (Tag + u32 Len + Body)
    Sequence = 0x20,
    Mapping = 0x21,
}

impl Tag {
    /// Returns the Tag variant for a given byte, or `None` if invalid.
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Tag::Null),
            0x01 => Some(Tag::BoolTrue),
            0x02 => Some(Tag::BoolFalse),
            0x0C => Some(Tag::Number),
            0x0F => Some(Tag::Placeholder),
            0x10 => Some(Tag::Text),
            0x20 => Some(Tag::Sequence),
            0x21 => Some(Tag::Mapping),
            _ => None,
        }
    }
}

/// A node of the wire value tree.
///
/// `Placeholder` stands in for a function that was lifted out of the tree before
/// transmission; its number is only meaningful together with the handle map that
/// travels in the same packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Sequence(Vec<Value>),
    /// Insertion-ordered key/value pairs.
    Mapping(Vec<(String, Value)>),
    Placeholder(u32),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Looks up a key in a `Mapping`. Returns `None` for any other node.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Number(v) }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Number(v as f64) }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self { Value::Number(v as f64) }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::Text(v.to_string()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Value::Text(v) }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self { Value::Sequence(v) }
}

/// Encodes a whole tree into a fresh buffer.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    enc.value(value)?;
    Ok(enc.into_bytes())
}

/// Decodes exactly one tree from `bytes`.
///
/// # Errors
/// Returns `Error::TrailingBytes` if anything follows the root value.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let mut dec = Decoder::new(bytes);
    let value = dec.value()?;
    if dec.remaining() != 0 {
        return Err(Error::TrailingBytes(dec.remaining()));
    }
    Ok(value)
}

/// Appends encoded nodes to an owned buffer, back-patching container lengths.
pub struct Encoder {
    buf: Vec<u8>,
    depth: usize,
}

impl Encoder {
    /// Creates a new encoder with default capacity.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
            depth: 0,
        }
    }

    /// Consumes the encoder and returns the final byte vector.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Returns a view of the current buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn write_tag(&mut self, tag: Tag) {
        self.buf.push(tag as u8);
    }

    fn write_len(&mut self, len: usize) -> Result<()> {
        if len > u32::MAX as usize {
            return Err(Error::BlobTooLarge(len));
        }
        self.buf.extend_from_slice(&(len as u32).to_le_bytes());
        Ok(())
    }

    pub fn null(&mut self) { self.write_tag(Tag::Null); }

    pub fn bool(&mut self, v: bool) {
        self.write_tag(if v { Tag::BoolTrue } else { Tag::BoolFalse });
    }

    /// Encodes a 64-bit float (LE).
    pub fn number(&mut self, v: f64) {
        self.write_tag(Tag::Number);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Encodes a placeholder identity (u32 LE).
    pub fn placeholder(&mut self, slot: u32) {
        self.write_tag(Tag::Placeholder);
        self.buf.extend_from_slice(&slot.to_le_bytes());
    }

    /// Encodes a UTF-8 string blob.
    pub fn text(&mut self, v: &str) -> Result<()> {
        self.write_tag(Tag::Text);
        self.write_len(v.len())?;
        self.buf.extend_from_slice(v.as_bytes());
        Ok(())
    }

    /// Writes a container header, runs `body`, then patches the length.
    fn container<F>(&mut self, tag: Tag, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if self.depth >= MAX_DEPTH {
            return Err(Error::DepthExceeded);
        }
        self.write_tag(tag);
        self.buf.extend_from_slice(&[0, 0, 0, 0]); // Length placeholder
        let start = self.buf.len();

        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        result?;

        let body_len = self.buf.len() - start;
        if body_len > u32::MAX as usize {
            return Err(Error::BlobTooLarge(body_len));
        }
        self.buf[start - 4..start].copy_from_slice(&(body_len as u32).to_le_bytes());
        Ok(())
    }

    /// Encodes any node, recursing into containers.
    pub fn value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.null(),
            Value::Bool(b) => self.bool(*b),
            Value::Number(n) => self.number(*n),
            Value::Placeholder(slot) => self.placeholder(*slot),
            Value::Text(s) => self.text(s)?,
            Value::Sequence(items) => self.container(Tag::Sequence, |enc| {
                items.iter().try_for_each(|item| enc.value(item))
            })?,
            Value::Mapping(entries) => self.container(Tag::Mapping, |enc| {
                entries.iter().try_for_each(|(key, item)| {
                    enc.text(key)?;
                    enc.value(item)
                })
            })?,
        }
        Ok(())
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// A zero-copy, bounds-checked cursor over an encoded buffer.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, depth: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::UnexpectedEnd);
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn read_len(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.read_array()?) as usize)
    }

    /// Returns the tag of the next node without consuming it.
    pub fn peek_tag(&self) -> Result<Tag> {
        let b = *self.buf.get(self.pos).ok_or(Error::UnexpectedEnd)?;
        Tag::from_u8(b).ok_or(Error::InvalidTag(b))
    }

    fn read_tag(&mut self) -> Result<Tag> {
        let tag = self.peek_tag()?;
        self.pos += 1;
        Ok(tag)
    }

    fn read_text(&mut self) -> Result<&'a str> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Carves the next `len` bytes into a child decoder one level deeper.
    fn enter(&mut self, len: usize) -> Result<Decoder<'a>> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::DepthExceeded);
        }
        let body = self.read_bytes(len)?;
        Ok(Decoder { buf: body, pos: 0, depth: self.depth + 1 })
    }

    /// Skips the next node, whatever it is.
    pub fn skip(&mut self) -> Result<()> {
        match self.read_tag()? {
            Tag::Null | Tag::BoolTrue | Tag::BoolFalse => {}
            Tag::Number => { self.read_bytes(8)?; }
            Tag::Placeholder => { self.read_bytes(4)?; }
            Tag::Text | Tag::Sequence | Tag::Mapping => {
                let len = self.read_len()?;
                self.read_bytes(len)?;
            }
        }
        Ok(())
    }

    /// Decodes the next node, recursing into containers.
    pub fn value(&mut self) -> Result<Value> {
        let value = match self.read_tag()? {
            Tag::Null => Value::Null,
            Tag::BoolTrue => Value::Bool(true),
            Tag::BoolFalse => Value::Bool(false),
            Tag::Number => Value::Number(f64::from_le_bytes(self.read_array()?)),
            Tag::Placeholder => Value::Placeholder(u32::from_le_bytes(self.read_array()?)),
            Tag::Text => Value::Text(self.read_text()?.to_string()),
            Tag::Sequence => {
                let len = self.read_len()?;
                let mut body = self.enter(len)?;
                let mut items = Vec::new();
                while body.remaining() > 0 {
                    items.push(body.value()?);
                }
                Value::Sequence(items)
            }
            Tag::Mapping => {
                let len = self.read_len()?;
                let mut body = self.enter(len)?;
                let mut entries = Vec::new();
                while body.remaining() > 0 {
                    let key = match body.read_tag()? {
                        Tag::Text => body.read_text()?.to_string(),
                        other => return Err(Error::InvalidTag(other as u8)),
                    };
                    entries.push((key, body.value()?));
                }
                Value::Mapping(entries)
            }
        };
        Ok(value)
    }
}
