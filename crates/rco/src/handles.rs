//! # Remote Handle Registry
//!
//! Proxies for functions the peer owns.
//!
//! The registry only holds weak links, so the proxy lives exactly as long as host code
//! keeps a clone of it. When the last clone drops, the handle unregisters itself and
//! queues its id. Queued ids go out as a single `Release` packet, flushed from a spawned
//! task or by `Context::reclaim`.
//!
//! ## Invariants
//!
//! - At most one live proxy per handle id.
//! - A handle only queues its id if the registry still points at it, so each proxy
//!   lifetime produces exactly one release.
//! - A handle never keeps its context alive.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::context::ContextInner;
use crate::packet::Target;
use crate::tree::CallResult;
use crate::tree::Callable;
use crate::tree::Function;
use crate::tree::Tree;

/// The local stand-in for one peer-owned function.
pub(crate) struct RemoteHandle {
    id: String,
    ctx: Weak<ContextInner>,
}

#[async_trait::async_trait]
impl Callable for RemoteHandle {
    async fn call(&self, args: Vec<Tree>) -> CallResult {
        let Some(ctx) = self.ctx.upgrade() else {
            return Err(Tree::from(crate::CALL_ABANDONED));
        };
        let reply = ctx.send_call(Target::Handle(self.id.clone()), args);
        // Do not hold the context across the wait.
        drop(ctx);
        match reply {
            Ok(reply) => reply.await,
            Err(e) => Err(Tree::from(e.to_string())),
        }
    }
}

impl Drop for RemoteHandle {
    fn drop(&mut self) {
        let Some(ctx) = self.ctx.upgrade() else { return };
        let me: *const RemoteHandle = self;
        if ctx.handles.forget(&self.id, me) {
            tracing::trace!(context = %ctx.name, id = %self.id, "queue release");
            ctx.handles.queue_release(self.id.clone());
            ctx.schedule_reclaim();
        }
    }
}

#[derive(Default)]
pub struct HandleRegistry {
    held: DashMap<String, Weak<RemoteHandle>>,
    pending: Mutex<Vec<String>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live proxy for `id`, creating one if none is reachable.
    pub(crate) fn proxy_for(&self, id: &str, ctx: &Arc<ContextInner>) -> Function {
        let fresh = || Arc::new(RemoteHandle { id: id.to_string(), ctx: Arc::downgrade(ctx) });

        let handle = match self.held.entry(id.to_string()) {
            Entry::Occupied(mut slot) => match slot.get().upgrade() {
                Some(live) => live,
                None => {
                    let handle = fresh();
                    slot.insert(Arc::downgrade(&handle));
                    handle
                }
            },
            Entry::Vacant(slot) => {
                let handle = fresh();
                slot.insert(Arc::downgrade(&handle));
                handle
            }
        };
        Function::from_callable(handle)
    }

    /// Removes the registration for `id` if it still belongs to `handle`.
    fn forget(&self, id: &str, handle: *const RemoteHandle) -> bool {
        self.held
            .remove_if(id, |_, weak| std::ptr::eq(weak.as_ptr(), handle))
            .is_some()
    }

    fn queue_release(&self, id: String) {
        self.lock_pending().push(id);
    }

    /// Takes every queued id.
    pub(crate) fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock_pending())
    }

    /// Puts ids back after a failed flush.
    pub(crate) fn requeue(&self, ids: Vec<String>) {
        self.lock_pending().extend(ids);
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of proxies currently registered.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }
}
