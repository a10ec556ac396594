//! # Packet Grammar
//!
//! Every packet is a sequence whose first element is a small integer discriminant:
//!
//! ```text
//! Call    := [0 | 1, nameOrId, argsTree, handleMap?, onSuccessId?, onFailureId?]
//! Release := [2, id, id, ...]
//! ```
//!
//! `0` targets a named function, `1` a handle id. Trailing absent fields are omitted;
//! an absent field followed by a present one is written as `Null`. A handle map is a
//! sequence of `[Placeholder(n), id]` pairs.

use rcopack::Value;

use crate::error::ContextError;
use crate::error::Result;

pub const CALL_NAMED: u8 = 0;
pub const CALL_HANDLE: u8 = 1;
pub const RELEASE: u8 = 2;

/// Who a call is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A function in the receiver's named registry.
    Named(String),
    /// A function the receiver previously exposed under a handle id.
    Handle(String),
}

impl Target {
    fn kind(&self) -> u8 {
        match self {
            Target::Named(_) => CALL_NAMED,
            Target::Handle(_) => CALL_HANDLE,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Target::Named(s) | Target::Handle(s) => s,
        }
    }
}

/// Placeholder identity to handle id, scoped to one packet's payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandleMap {
    pairs: Vec<(u32, String)>,
}

impl HandleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: u32, id: impl Into<String>) {
        self.pairs.push((slot, id.into()));
    }

    pub fn get(&self, slot: u32) -> Option<&str> {
        self.pairs.iter().find(|(s, _)| *s == slot).map(|(_, id)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.pairs.iter().map(|(slot, id)| (*slot, id.as_str()))
    }

    /// `None` when empty, so the field can be left off the wire.
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() { None } else { Some(self) }
    }

    pub fn to_value(&self) -> Value {
        Value::Sequence(
            self.pairs
                .iter()
                .map(|(slot, id)| Value::Sequence(vec![Value::Placeholder(*slot), Value::Text(id.clone())]))
                .collect(),
        )
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Sequence(items) = value else {
            return Err(malformed("handle map is not a sequence"));
        };

        let mut map = HandleMap::new();
        for item in items {
            match item {
                Value::Sequence(pair) => match pair.as_slice() {
                    [Value::Placeholder(slot), Value::Text(id)] => map.insert(*slot, id.clone()),
                    _ => return Err(malformed("handle map entry is not a [placeholder, id] pair")),
                },
                _ => return Err(malformed("handle map entry is not a pair")),
            }
        }
        Ok(map)
    }
}

/// A call, in either direction.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPacket {
    pub target: Target,
    /// Always a `Value::Sequence` of arguments.
    pub args: Value,
    pub handles: Option<HandleMap>,
    pub on_success: Option<String>,
    pub on_failure: Option<String>,
}

impl CallPacket {
    /// A call that expects no answer.
    pub fn notify(target: Target, args: Vec<Value>) -> Self {
        Self {
            target,
            args: Value::Sequence(args),
            handles: None,
            on_success: None,
            on_failure: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Call(CallPacket),
    Release(Vec<String>),
}

impl Packet {
    pub fn to_value(&self) -> Value {
        match self {
            Packet::Call(call) => {
                let opt_text = |s: &Option<String>| s.clone().map(Value::Text).unwrap_or(Value::Null);
                let mut items = vec![
                    Value::Number(call.target.kind() as f64),
                    Value::Text(call.target.as_str().to_string()),
                    call.args.clone(),
                    call.handles.as_ref().map(HandleMap::to_value).unwrap_or(Value::Null),
                    opt_text(&call.on_success),
                    opt_text(&call.on_failure),
                ];
                while items.len() > 3 && items.last().is_some_and(Value::is_null) {
                    items.pop();
                }
                Value::Sequence(items)
            }
            Packet::Release(ids) => {
                let mut items = Vec::with_capacity(ids.len() + 1);
                items.push(Value::Number(RELEASE as f64));
                items.extend(ids.iter().cloned().map(Value::Text));
                Value::Sequence(items)
            }
        }
    }

    /// Parses a decoded tree.
    ///
    /// Returns `Ok(None)` for a well-formed sequence with an unknown discriminant, which
    /// receivers ignore.
    pub fn from_value(value: Value) -> Result<Option<Packet>> {
        let Value::Sequence(items) = value else {
            return Err(malformed("packet is not a sequence"));
        };
        let mut items = items.into_iter();

        let kind = match items.next() {
            Some(Value::Number(n)) if n.fract() == 0.0 && (0.0..=255.0).contains(&n) => n as u8,
            Some(_) => return Err(malformed("packet discriminant is not a small integer")),
            None => return Err(malformed("empty packet")),
        };

        match kind {
            CALL_NAMED | CALL_HANDLE => {
                let name = match items.next() {
                    Some(Value::Text(s)) => s,
                    _ => return Err(malformed("call target is not a string")),
                };
                let args = match items.next() {
                    Some(args @ Value::Sequence(_)) => args,
                    _ => return Err(malformed("call arguments are not a sequence")),
                };
                let handles = match items.next() {
                    None | Some(Value::Null) => None,
                    Some(map) => Some(HandleMap::from_value(map)?),
                };
                let on_success = optional_id(items.next(), "success id")?;
                let on_failure = optional_id(items.next(), "failure id")?;

                let target = if kind == CALL_NAMED { Target::Named(name) } else { Target::Handle(name) };
                Ok(Some(Packet::Call(CallPacket { target, args, handles, on_success, on_failure })))
            }
            RELEASE => {
                let ids = items
                    .map(|item| match item {
                        Value::Text(id) => Ok(id),
                        _ => Err(malformed("release id is not a string")),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(Packet::Release(ids)))
            }
            _ => Ok(None),
        }
    }
}

fn optional_id(item: Option<Value>, what: &str) -> Result<Option<String>> {
    match item {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(id)) => Ok(Some(id)),
        Some(_) => Err(malformed(&format!("{} is not a string", what))),
    }
}

fn malformed(msg: &str) -> ContextError {
    ContextError::MalformedPacket(msg.to_string())
}
