//! # rco
//!
//! Remote calls between two endpoints that only share a message transport, where
//! functions can be passed as arguments or return values in either direction.
//!
//! ## Philosophy
//!
//! - **Handles, not closures, cross the wire**: functions are lifted out of a value tree
//!   before sending and replaced by placeholders that point at opaque handle ids.
//! - **The far side owns its functions**: a received handle becomes a local proxy; calling it
//!   sends a call back to the owner.
//! - **Reachability drives release**: when the last clone of a proxy is dropped the owner is
//!   told it may forget the handle.

pub mod api;
pub mod builder;
pub mod config;
pub mod context;
pub mod duplex;
pub mod entries;
pub mod error;
pub mod handles;
pub mod ids;
pub mod packet;
pub mod pump;
pub mod transport;
pub mod tree;

mod codec;


pub use api::RemoteApi;
pub use builder::ContextBuilder;
pub use config::Encoding;
pub use config::UnhandledFailure;
pub use context::Context;
pub use context::Payload;
pub use context::Reply;
pub use duplex::DuplexChannelTransport;
pub use error::ContextError;
pub use packet::CallPacket;
pub use packet::HandleMap;
pub use packet::Packet;
pub use packet::Target;
pub use rcopack::Value;
pub use tree::CallResult;
pub use tree::Function;
pub use tree::Tree;

/// Failure value sent back when a named function or handle id cannot be resolved.
pub const TARGET_NOT_FOUND: &str = "function does not exist";

/// Failure value a `Reply` settles with when its correlation entries vanish unanswered.
pub const CALL_ABANDONED: &str = "call abandoned";
