//! Fluent construction of a `Context`.

use tokio::runtime::Handle;

use crate::config::UnhandledFailure;
use crate::context::Context;
use crate::ids::IdGenerator;
use crate::ids::UuidGenerator;

/// Builder for `Context`.
///
/// ```rust
/// # use rco::{Context, UnhandledFailure};
/// let ctx = Context::builder()
///     .name("worker")
///     .failure_policy(UnhandledFailure::Log)
///     .build();
/// assert_eq!(ctx.name(), "worker");
/// ```
pub struct ContextBuilder {
    name: String,
    failure_policy: UnhandledFailure,
    ids: Option<Box<dyn IdGenerator>>,
    runtime: Option<Handle>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            name: "rco".to_string(),
            failure_policy: UnhandledFailure::default(),
            ids: None,
            runtime: None,
        }
    }

    /// Name used in log events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Policy for handler failures nobody asked to hear about.
    pub fn failure_policy(mut self, policy: UnhandledFailure) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Replaces the default UUID id generator.
    pub fn id_generator(mut self, ids: impl IdGenerator) -> Self {
        self.ids = Some(Box::new(ids));
        self
    }

    /// Runtime that handlers and release flushes are spawned on.
    ///
    /// Defaults to the runtime `build` is called from, if any.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Context {
        let ids = self.ids.unwrap_or_else(|| Box::new(UuidGenerator));
        let runtime = self.runtime.or_else(|| Handle::try_current().ok());
        Context::from_parts(self.name, ids, self.failure_policy, runtime)
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
