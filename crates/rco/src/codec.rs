//! # Tree Codec
//!
//! Swaps functions for placeholders on the way out and placeholders for proxies on
//! the way in. Both walks are depth-first over sequences and mappings; scalars pass
//! through untouched.

use std::collections::HashMap;
use std::sync::Arc;

use rcopack::Value;

use crate::context::ContextInner;
use crate::entries::FunctionEntry;
use crate::packet::HandleMap;
use crate::tree::Function;
use crate::tree::Tree;

/// Lifts every function out of `tree`, exposing each under a fresh handle id.
///
/// The same function reached twice shares one placeholder and one id. The returned map
/// is empty when the tree held no functions.
pub(crate) fn extract(ctx: &ContextInner, tree: Tree) -> (Value, HandleMap) {
    let mut walk = Extract { ctx, map: HandleMap::new(), seen: HashMap::new() };
    let value = walk.lift(tree);
    (value, walk.map)
}

struct Extract<'a> {
    ctx: &'a ContextInner,
    map: HandleMap,
    /// Function identity to placeholder slot.
    seen: HashMap<usize, u32>,
}

impl Extract<'_> {
    fn lift(&mut self, tree: Tree) -> Value {
        match tree {
            Tree::Null => Value::Null,
            Tree::Bool(b) => Value::Bool(b),
            Tree::Number(n) => Value::Number(n),
            Tree::Text(s) => Value::Text(s),
            Tree::Sequence(items) => Value::Sequence(items.into_iter().map(|item| self.lift(item)).collect()),
            Tree::Mapping(entries) => Value::Mapping(
                entries.into_iter().map(|(key, item)| (key, self.lift(item))).collect(),
            ),
            Tree::Function(function) => Value::Placeholder(self.expose(function)),
        }
    }

    fn expose(&mut self, function: Function) -> u32 {
        if let Some(slot) = self.seen.get(&function.addr()) {
            return *slot;
        }
        let slot = self.map.len() as u32;
        let id = self.ctx.ids.next_id();
        self.seen.insert(function.addr(), slot);
        tracing::trace!(context = %self.ctx.name, %id, slot, "expose");
        self.ctx.entries.insert(id.clone(), FunctionEntry::reusable(function));
        self.map.insert(slot, id);
        slot
    }
}

/// Rebuilds a host tree from a received one, turning placeholders into proxies.
///
/// A proxy is made for every id in the map up front, so ids the tree never references
/// are dropped straight away and released back to the peer. A placeholder missing from
/// the map becomes an empty mapping.
pub(crate) fn inject(ctx: &Arc<ContextInner>, value: Value, handles: Option<&HandleMap>) -> Tree {
    let mut proxies: HashMap<u32, Function> = HashMap::new();
    if let Some(handles) = handles {
        let mut by_id: HashMap<&str, Function> = HashMap::new();
        for (slot, id) in handles.iter() {
            let proxy = by_id.entry(id).or_insert_with(|| ctx.handles.proxy_for(id, ctx)).clone();
            proxies.insert(slot, proxy);
        }
    }
    rebuild(value, &proxies)
}

fn rebuild(value: Value, proxies: &HashMap<u32, Function>) -> Tree {
    match value {
        Value::Null => Tree::Null,
        Value::Bool(b) => Tree::Bool(b),
        Value::Number(n) => Tree::Number(n),
        Value::Text(s) => Tree::Text(s),
        Value::Sequence(items) => Tree::Sequence(items.into_iter().map(|item| rebuild(item, proxies)).collect()),
        Value::Mapping(entries) => Tree::Mapping(
            entries.into_iter().map(|(key, item)| (key, rebuild(item, proxies))).collect(),
        ),
        Value::Placeholder(slot) => match proxies.get(&slot) {
            Some(proxy) => Tree::Function(proxy.clone()),
            None => Tree::Mapping(Vec::new()),
        },
    }
}
