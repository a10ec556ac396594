//! # Named Function Facade
//!
//! A capability object standing in for "the peer's named functions". `get` hands out a
//! callable bound to one name; bound callables are cached per name and only hold a weak
//! link to the context, so passing one back to the peer cannot keep the context alive.

use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;

use crate::context::Context;
use crate::context::ContextInner;
use crate::packet::Target;
use crate::tree::CallResult;
use crate::tree::Function;
use crate::tree::Tree;

pub struct RemoteApi {
    ctx: Context,
    bound: DashMap<String, Function>,
}

impl RemoteApi {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx, bound: DashMap::new() }
    }

    /// A callable that invokes the peer's function `name`.
    pub fn get(&self, name: &str) -> Function {
        self.bound
            .entry(name.to_string())
            .or_insert_with(|| bind(Arc::downgrade(&self.ctx.inner), name.to_string()))
            .value()
            .clone()
    }

    /// Calls the peer's function `name`.
    ///
    /// Local configuration errors come back as `Err(Text)` like any other failure.
    pub async fn call(&self, name: &str, args: Vec<Tree>) -> CallResult {
        self.get(name).call(args).await
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }
}

fn bind(ctx: Weak<ContextInner>, name: String) -> Function {
    Function::new(move |args| {
        let reply = match ctx.upgrade() {
            Some(ctx) => ctx.send_call(Target::Named(name.clone()), args).map_err(|e| e.to_string()),
            None => Err(crate::CALL_ABANDONED.to_string()),
        };
        async move {
            match reply {
                Ok(reply) => reply.await,
                Err(msg) => Err(Tree::from(msg)),
            }
        }
    })
}
