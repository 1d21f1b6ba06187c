//! The plugin container.
//!
//! Keeps the registered plugins in order together with one callable list per
//! hook point, and dispatches hook points under either calling convention.
//! The container is built during setup and shared read-only by every method
//! afterwards.

use crate::{
    compiler::IntoPlugin,
    context::{Context, Field},
    hook::{Convention, HookFn, HookPoint, HookResult, Hooks},
    plugin::Plugin,
};
use std::{any::Any, fmt, sync::Arc};

struct Entry {
    instance: Arc<dyn Any + Send + Sync>,
    name: &'static str,
    hooks: Hooks,
}

/// Ordered collection of compiled plugins.
pub struct PluginContainer {
    entries: Vec<Entry>,
    chains: [Vec<HookFn>; HookPoint::COUNT],
}

impl PluginContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            chains: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Register a plugin after the ones already present.
    pub fn add(&mut self, plugin: impl IntoPlugin) -> &mut Self {
        let (instance, name, table) = plugin.into_registration().into_parts();
        let hooks = table.hooks();
        for (point, hook) in table.iter() {
            self.chains[point.index()].push(Arc::clone(hook));
        }
        tracing::debug!(plugin = name, hooks = ?hooks, "registered plugin");
        self.entries.push(Entry {
            instance,
            name,
            hooks,
        });
        self
    }

    /// Register a plugin instance that stays shared with the caller.
    ///
    /// [`contains`](Self::contains) recognises the same `Arc` afterwards.
    pub fn add_shared<P: Plugin>(&mut self, plugin: Arc<P>) -> &mut Self {
        self.add(crate::compiler::Registration::shared(plugin))
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, plugin: impl IntoPlugin) -> Self {
        self.add(plugin);
        self
    }

    /// Whether this exact instance was registered.
    pub fn contains<P: Plugin>(&self, plugin: &Arc<P>) -> bool {
        let wanted = Arc::as_ptr(plugin) as *const ();
        self.entries
            .iter()
            .any(|e| Arc::as_ptr(&e.instance) as *const () == wanted)
    }

    /// Whether any plugin of type `T` was registered.
    pub fn contains_type<T: Any>(&self) -> bool {
        self.entries.iter().any(|e| e.instance.is::<T>())
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered plugin names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    /// Number of plugins implementing `point`.
    pub fn implementors(&self, point: HookPoint) -> usize {
        self.chains[point.index()].len()
    }

    /// Broadcast: run every implementation of `point` in registration order.
    ///
    /// The first error aborts the remaining calls.
    pub async fn call_all(&self, ctx: &mut Context, point: HookPoint) -> HookResult {
        for hook in &self.chains[point.index()] {
            tracing::trace!(hook = %point, "broadcast");
            hook(&mut *ctx).await?;
        }
        Ok(())
    }

    /// Chain of command: run implementations of `point` newest first until
    /// `monitor` is assigned.
    ///
    /// The field is checked after each call, so the newest implementation
    /// always runs. With no implementations this does nothing.
    pub async fn call_one(&self, ctx: &mut Context, point: HookPoint, monitor: Field) -> HookResult {
        for hook in self.chains[point.index()].iter().rev() {
            tracing::trace!(hook = %point, field = %monitor, "chain of command");
            hook(&mut *ctx).await?;
            if ctx.is_assigned(monitor) {
                break;
            }
        }
        Ok(())
    }

    /// Dispatch `point` with its own calling convention.
    pub async fn dispatch(&self, ctx: &mut Context, point: HookPoint) -> HookResult {
        match point.convention() {
            Convention::Broadcast => self.call_all(ctx, point).await,
            Convention::ChainOfCommand(field) => self.call_one(ctx, point, field).await,
        }
    }
}

impl Default for PluginContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.name, e.hooks)))
            .finish()
    }
}
