//! Plugin compilation.
//!
//! Registration turns a plugin into a [`HookTable`]: a mapping from hook
//! point to a type-erased callable. Three plugin shapes compile to the same
//! table:
//!
//! - a [`Plugin`] implementation, filtered by [`Plugin::implemented`]
//! - a `#[plugin]`-annotated impl block or module, which generates a
//!   [`Plugin`] implementation with an exact `implemented` set
//! - a [`HookMap`] of explicit name/callable pairs

use crate::{
    context::Context,
    hook::{BoxFuture, HookFn, HookPoint, HookResult, Hooks, hook_fn},
    plugin::Plugin,
};
use std::{any::Any, fmt, future, sync::Arc};

// ============================================================================
// Hook Table
// ============================================================================

/// Compiled hooks of a single plugin.
#[derive(Clone)]
pub struct HookTable {
    slots: [Option<HookFn>; HookPoint::COUNT],
}

impl HookTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Set the callable for `point`, returning the previous one.
    pub fn insert(&mut self, point: HookPoint, hook: HookFn) -> Option<HookFn> {
        self.slots[point.index()].replace(hook)
    }

    /// The callable for `point`.
    pub fn get(&self, point: HookPoint) -> Option<&HookFn> {
        self.slots[point.index()].as_ref()
    }

    /// The set of points with a callable.
    pub fn hooks(&self) -> Hooks {
        self.iter().fold(Hooks::empty(), |set, (p, _)| set | p.flag())
    }

    /// Iterate over `(point, callable)` pairs in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (HookPoint, &HookFn)> {
        HookPoint::ALL
            .into_iter()
            .filter_map(|p| self.get(p).map(|hook| (p, hook)))
    }

    /// Number of compiled hooks.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether the table has no hooks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HookTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.iter().map(|(p, _)| p.as_str()))
            .finish()
    }
}

/// Compile a [`Plugin`] into its hook table.
///
/// Only the points in [`Plugin::implemented`] are bound. Each callable holds
/// a clone of `plugin`, so the table keeps the instance alive.
pub fn compile<P: Plugin>(plugin: &Arc<P>) -> HookTable {
    let mut table = HookTable::new();
    for point in plugin.implemented().points() {
        table.insert(point, bind(plugin, point));
    }
    table
}

fn bind<P: Plugin>(plugin: &Arc<P>, point: HookPoint) -> HookFn {
    macro_rules! forward {
        ($method:ident) => {{
            let plugin = Arc::clone(plugin);
            hook_fn(move |ctx| {
                let plugin = Arc::clone(&plugin);
                Box::pin(async move { plugin.$method(ctx).await })
            })
        }};
    }

    match point {
        HookPoint::StartRequest => forward!(start_request),
        HookPoint::CheckAccess => forward!(check_access),
        HookPoint::AfterCheckAccess => forward!(after_check_access),
        HookPoint::ReadInput => forward!(read_input),
        HookPoint::NormalizeInput => forward!(normalize_input),
        HookPoint::ValidateInput => forward!(validate_input),
        HookPoint::CallFunction => forward!(call_function),
        HookPoint::ProcessOutput => forward!(process_output),
        HookPoint::CreateResponse => forward!(create_response),
        HookPoint::ProcessError => forward!(process_error),
        HookPoint::ProcessResponse => forward!(process_response),
        HookPoint::EndRequest => forward!(end_request),
    }
}

// ============================================================================
// Hook Map
// ============================================================================

/// A plugin given as explicit hook name → callable pairs.
///
/// Names that are not hook names are ignored when the map is compiled, and a
/// later entry for the same hook replaces an earlier one.
///
/// # Example
///
/// ```rust,ignore
/// let plugin = HookMap::new()
///     .on_sync("start_request", |ctx| {
///         ctx.config_mut().map(|c| c.insert("csrf", false));
///         Ok(())
///     })
///     .on("process_output", |ctx| Box::pin(async move { Ok(()) }));
/// ```
#[derive(Clone, Default)]
pub struct HookMap {
    entries: Vec<(String, HookFn)>,
}

impl HookMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asynchronous hook.
    pub fn on<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HookResult> + Send + Sync + 'static,
    {
        self.entries.push((name.into(), hook_fn(hook)));
        self
    }

    /// Add a synchronous hook.
    pub fn on_sync<F>(self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&mut Context) -> HookResult + Send + Sync + 'static,
    {
        self.on(name, move |ctx| Box::pin(future::ready(hook(ctx))))
    }

    /// Names as given, including ones that are not hook names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Compile the map into a hook table.
    pub fn compile(&self) -> HookTable {
        let mut table = HookTable::new();
        for (name, hook) in &self.entries {
            match HookPoint::from_name(name) {
                Some(point) => {
                    table.insert(point, Arc::clone(hook));
                }
                None => tracing::debug!(name = %name, "ignoring non-hook entry in hook map"),
            }
        }
        table
    }
}

impl fmt::Debug for HookMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// ============================================================================
// Registration
// ============================================================================

/// A compiled plugin ready to be added to a container.
pub struct Registration {
    instance: Arc<dyn Any + Send + Sync>,
    name: &'static str,
    table: HookTable,
}

impl Registration {
    /// Compile a shared plugin instance.
    pub fn shared<P: Plugin>(plugin: Arc<P>) -> Self {
        let table = compile(&plugin);
        Self {
            name: plugin.name(),
            instance: plugin,
            table,
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The compiled hooks.
    pub fn table(&self) -> &HookTable {
        &self.table
    }

    pub(crate) fn into_parts(self) -> (Arc<dyn Any + Send + Sync>, &'static str, HookTable) {
        (self.instance, self.name, self.table)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

/// Anything that can be registered as a plugin.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be registered as a plugin",
    label = "not a plugin",
    note = "Implement `Plugin`, use `#[wicket::plugin]`, or pass a `HookMap`."
)]
pub trait IntoPlugin {
    /// Compile into a registration.
    fn into_registration(self) -> Registration;
}

impl<P: Plugin> IntoPlugin for P {
    fn into_registration(self) -> Registration {
        Registration::shared(Arc::new(self))
    }
}

impl IntoPlugin for HookMap {
    fn into_registration(self) -> Registration {
        let table = self.compile();
        Registration {
            instance: Arc::new(self),
            name: "HookMap",
            table,
        }
    }
}

impl IntoPlugin for Registration {
    fn into_registration(self) -> Registration {
        self
    }
}
