//! # Context
//!
//! One context is one logical connection to one peer. It owns the named-function
//! registry, the function entry table and the remote handle registry, and it is the
//! packet dispatcher for everything arriving from the peer.
//!
//! ## Concurrency
//!
//! Table lookups, single-use removal and handle injection happen synchronously inside
//! `on_data`, in arrival order. Handler bodies then run as Tokio tasks, so a slow handler
//! never holds up other packets. Tasks go to the runtime captured when the context was
//! built, or else the one `on_data` is called from; with neither, a call packet is refused
//! with `ContextError::NoRuntime`.
//!
//! A handler that panics counts as a throw: the panic message goes back over the failure
//! channel.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::task::Context as TaskContext;
use std::task::Poll;

use dashmap::DashMap;
use futures::FutureExt;
use rcopack::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::builder::ContextBuilder;
use crate::codec;
use crate::config::Encoding;
use crate::config::UnhandledFailure;
use crate::entries::FunctionEntry;
use crate::entries::FunctionTable;
use crate::error::ContextError;
use crate::error::Result;
use crate::handles::HandleRegistry;
use crate::ids::IdGenerator;
use crate::packet::CallPacket;
use crate::packet::Packet;
use crate::packet::Target;
use crate::tree::CallResult;
use crate::tree::Function;
use crate::tree::Tree;

/// Data crossing the boundary between a context and its transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A decoded value tree.
    Structured(Value),
    /// `rcopack` bytes.
    Binary(Vec<u8>),
    /// Base64 of `rcopack` bytes.
    Text(String),
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self { Payload::Structured(v) }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self { Payload::Binary(v) }
}

impl From<&[u8]> for Payload {
    fn from(v: &[u8]) -> Self { Payload::Binary(v.to_vec()) }
}

impl From<String> for Payload {
    fn from(v: String) -> Self { Payload::Text(v) }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self { Payload::Text(v.to_string()) }
}

type Sink = Arc<dyn Fn(Payload) + Send + Sync>;

#[derive(Clone)]
struct Output {
    sink: Sink,
    encoding: Encoding,
}

pub(crate) struct ContextInner {
    pub(crate) name: String,
    named: DashMap<String, Function>,
    pub(crate) entries: FunctionTable,
    pub(crate) handles: HandleRegistry,
    pub(crate) ids: Box<dyn IdGenerator>,
    output: RwLock<Option<Output>>,
    failure_policy: UnhandledFailure,
    runtime: Option<Handle>,
}

/// A connection endpoint. Clones share the same state.
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Arc<ContextInner>,
}

impl Context {
    /// Creates a context with default configuration.
    pub fn new() -> Self {
        ContextBuilder::new().build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub(crate) fn from_parts(
        name: String,
        ids: Box<dyn IdGenerator>,
        failure_policy: UnhandledFailure,
        runtime: Option<Handle>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                name,
                named: DashMap::new(),
                entries: FunctionTable::new(),
                handles: HandleRegistry::new(),
                ids,
                output: RwLock::new(None),
                failure_policy,
                runtime,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Installs the output sink, replacing any previous one.
    pub fn bind_output<F>(&self, sink: F, encoding: Encoding)
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        debug!(context = %self.inner.name, ?encoding, "bind output");
        let output = Output { sink: Arc::new(sink), encoding };
        *self.inner.output.write().unwrap_or_else(|p| p.into_inner()) = Some(output);
    }

    /// Like `bind_output`, with the encoding given by name (`"raw"`, `"jsob"`, `"base64"`, ...).
    pub fn bind_output_named<F>(&self, sink: F, encoding: &str) -> Result<()>
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        let encoding = encoding.parse()?;
        self.bind_output(sink, encoding);
        Ok(())
    }

    /// Adds one named function. A later registration under the same name wins.
    pub fn register(&self, name: impl Into<String>, function: Function) {
        let name = name.into();
        trace!(context = %self.inner.name, %name, "register");
        self.inner.named.insert(name, function);
    }

    /// Adds many named functions at once.
    pub fn register_all<I, S>(&self, functions: I)
    where
        I: IntoIterator<Item = (S, Function)>,
        S: Into<String>,
    {
        for (name, function) in functions {
            self.register(name, function);
        }
    }

    /// Feeds one inbound payload to the dispatcher.
    ///
    /// Text is base64-decoded then decoded as binary, binary is decoded, and a structured
    /// value is used as is. The decoded value must be a packet sequence.
    ///
    /// May be called from any thread. Call packets need a runtime to run their handler on
    /// and fail with `NoRuntime` if there is none.
    pub fn on_data(&self, payload: impl Into<Payload>) -> Result<()> {
        let value = match payload.into() {
            Payload::Text(text) => {
                let bytes = rcopack::from_text(&text)
                    .map_err(|e| ContextError::UnrecognizedPayloadShape(e.to_string()))?;
                rcopack::decode(&bytes)?
            }
            Payload::Binary(bytes) => rcopack::decode(&bytes)?,
            Payload::Structured(value) => value,
        };

        if !matches!(value, Value::Sequence(_)) {
            return Err(ContextError::UnrecognizedPayloadShape(format!(
                "expected a packet sequence, got {}",
                value_kind(&value)
            )));
        }

        match Packet::from_value(value)? {
            Some(packet) => self.inner.dispatch(packet),
            None => {
                debug!(context = %self.inner.name, "ignoring packet with unknown discriminant");
                Ok(())
            }
        }
    }

    /// Calls a function the peer registered under `name`.
    ///
    /// # Errors
    /// Returns `TransportNotBound` if no sink is installed; nothing is registered or sent.
    pub fn call_named(&self, name: &str, args: Vec<Tree>) -> Result<Reply> {
        self.inner.send_call(Target::Named(name.to_string()), args)
    }

    /// A capability object for calling the peer's named functions.
    pub fn named_functions(&self) -> crate::api::RemoteApi {
        crate::api::RemoteApi::new(self.clone())
    }

    /// Sends a packet as is.
    pub fn emit(&self, packet: Packet) -> Result<()> {
        self.inner.emit(&packet)
    }

    /// Flushes queued releases now. Returns how many ids were sent.
    pub fn reclaim(&self) -> usize {
        self.inner.reclaim()
    }

    /// Functions currently exposed to the peer.
    pub fn entry_count(&self) -> usize {
        self.inner.entries.len()
    }

    /// Peer functions currently held as live proxies.
    pub fn held_count(&self) -> usize {
        self.inner.handles.len()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextInner {
    pub(crate) fn emit(&self, packet: &Packet) -> Result<()> {
        // Clone out of the lock: the sink may re-enter this context.
        let output = self.output.read().unwrap_or_else(|p| p.into_inner()).clone();
        let Some(output) = output else {
            return Err(ContextError::TransportNotBound);
        };

        let value = packet.to_value();
        let payload = match output.encoding {
            Encoding::Raw => Payload::Structured(value),
            Encoding::Binary => Payload::Binary(rcopack::encode(&value)?),
            Encoding::Text => Payload::Text(rcopack::to_text(&rcopack::encode(&value)?)),
        };
        (output.sink)(payload);
        Ok(())
    }

    pub(crate) fn named_get(&self, name: &str) -> Option<Function> {
        self.named.get(name).map(|f| f.value().clone())
    }

    fn runtime(&self) -> Option<Handle> {
        self.runtime.clone().or_else(|| Handle::try_current().ok())
    }

    fn is_bound(&self) -> bool {
        self.output.read().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    /// Sends a call and registers the success/failure pair that will settle its reply.
    pub(crate) fn send_call(&self, target: Target, args: Vec<Tree>) -> Result<Reply> {
        if !self.is_bound() {
            return Err(ContextError::TransportNotBound);
        }

        let (args, handles) = codec::extract(self, Tree::Sequence(args));
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));

        let success_id = self.ids.next_id();
        let failure_id = self.ids.next_id();
        trace!(context = %self.name, %success_id, %failure_id, "expose reply pair");
        self.entries.insert(success_id.clone(), FunctionEntry::paired(settler(slot.clone(), true), failure_id.clone()));
        self.entries.insert(failure_id.clone(), FunctionEntry::paired(settler(slot, false), success_id.clone()));

        debug!(context = %self.name, ?target, handles = handles.len(), "send call");
        let packet = Packet::Call(CallPacket {
            target,
            args,
            handles: handles.non_empty(),
            on_success: Some(success_id.clone()),
            on_failure: Some(failure_id.clone()),
        });

        if let Err(e) = self.emit(&packet) {
            self.entries.release(&success_id);
            self.entries.release(&failure_id);
            return Err(e);
        }
        Ok(Reply { rx })
    }

    fn dispatch(self: &Arc<Self>, packet: Packet) -> Result<()> {
        match packet {
            Packet::Release(ids) => {
                for id in &ids {
                    let known = self.entries.release(id);
                    trace!(context = %self.name, %id, known, "release");
                }
                Ok(())
            }
            Packet::Call(call) => self.accept_call(call),
        }
    }

    fn accept_call(self: &Arc<Self>, call: CallPacket) -> Result<()> {
        let Some(runtime) = self.runtime() else {
            return Err(ContextError::NoRuntime);
        };

        let function = match &call.target {
            Target::Named(name) => self.named_get(name),
            Target::Handle(id) => self.entries.claim(id),
        };

        let Some(function) = function else {
            debug!(context = %self.name, target = ?call.target, "call target not found");
            // Proxies for the caller's functions drop right away and are released.
            drop(codec::inject(self, call.args, call.handles.as_ref()));
            if let Some(failure_id) = call.on_failure {
                self.answer(failure_id, Tree::from(crate::TARGET_NOT_FOUND));
            }
            return Ok(());
        };

        let args = match codec::inject(self, call.args, call.handles.as_ref()) {
            Tree::Sequence(items) => items,
            other => vec![other],
        };

        let ctx = self.clone();
        let on_success = call.on_success;
        let on_failure = call.on_failure;
        runtime.spawn(async move {
            let outcome = match AssertUnwindSafe(function.call(args)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(&*panic);
                    warn!(context = %ctx.name, %message, "handler panicked");
                    Err(Tree::Text(message))
                }
            };
            ctx.settle(outcome, on_success, on_failure);
        });
        Ok(())
    }

    /// Routes a handler outcome back to whichever correlation id applies.
    fn settle(&self, outcome: CallResult, on_success: Option<String>, on_failure: Option<String>) {
        match (outcome, on_success, on_failure) {
            (Ok(value), Some(success_id), _) => self.answer(success_id, value),
            (Ok(_), None, _) => {}
            (Err(error), _, Some(failure_id)) => self.answer(failure_id, error),
            (Err(error), _, None) => match self.failure_policy {
                UnhandledFailure::Drop => trace!(context = %self.name, "dropping unhandled failure"),
                UnhandledFailure::Log => warn!(context = %self.name, %error, "handler failed with no failure channel"),
            },
        }
    }

    /// Calls the peer's correlation handle with a single value.
    fn answer(&self, id: String, value: Tree) {
        let (value, handles) = codec::extract(self, value);
        let packet = Packet::Call(CallPacket {
            target: Target::Handle(id),
            args: Value::Sequence(vec![value]),
            handles: handles.non_empty(),
            on_success: None,
            on_failure: None,
        });
        if let Err(e) = self.emit(&packet) {
            warn!(context = %self.name, error = %e, "failed to send reply");
        }
    }

    pub(crate) fn reclaim(&self) -> usize {
        let ids = self.handles.drain();
        if ids.is_empty() {
            return 0;
        }
        let count = ids.len();
        let packet = Packet::Release(ids);
        if let Err(e) = self.emit(&packet) {
            debug!(context = %self.name, error = %e, "release deferred");
            if let Packet::Release(ids) = packet {
                self.handles.requeue(ids);
            }
            return 0;
        }
        debug!(context = %self.name, count, "released handles");
        count
    }

    /// Flushes queued releases from a background task, if a runtime is around.
    pub(crate) fn schedule_reclaim(self: &Arc<Self>) {
        let Some(runtime) = self.runtime() else { return };
        let ctx = Arc::downgrade(self);
        runtime.spawn(async move {
            if let Some(ctx) = ctx.upgrade() {
                ctx.reclaim();
            }
        });
    }
}

/// One half of a success/failure pair. Whichever fires first settles the reply.
fn settler(slot: Arc<Mutex<Option<oneshot::Sender<CallResult>>>>, success: bool) -> Function {
    Function::sync(move |args| {
        let value = Tree::first(args);
        let tx = slot.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(tx) = tx {
            let _ = tx.send(if success { Ok(value) } else { Err(value) });
        }
        Ok(Tree::Null)
    })
}

/// The eventual answer to an outbound call.
///
/// There is no timeout. If the peer never answers, the reply stays pending; wrap it in
/// `tokio::time::timeout` if that matters. If both correlation entries are dropped
/// without firing, the reply settles with `Err(CALL_ABANDONED)`.
#[must_use = "a reply does nothing unless awaited"]
pub struct Reply {
    rx: oneshot::Receiver<CallResult>,
}

impl Future for Reply {
    type Output = CallResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Tree::from(crate::CALL_ABANDONED))),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_string()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::Text(_) => "text",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Placeholder(_) => "placeholder",
    }
}
