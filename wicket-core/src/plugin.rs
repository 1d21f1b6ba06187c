//! The plugin contract.
//!
//! A plugin is a bundle of optional hook implementations. Every hook has a
//! no-op default, so a plugin only writes the hooks it cares about and
//! reports them through [`Plugin::implemented`]. The `#[plugin]` attribute
//! computes that set from the methods actually written. Hand-written
//! implementations that keep the default claim every hook.

use crate::{
    context::Context,
    hook::{HookResult, Hooks},
};
use std::future::{self, Future};

/// A bundle of pipeline hooks.
///
/// Prefer `#[wicket::plugin]` on the impl block: it fills in
/// [`implemented`](Plugin::implemented) from the hooks actually written.
/// A bare `impl Plugin` must override `implemented` itself. Otherwise every
/// default no-op is registered and runs on each request.
///
/// # Example
///
/// ```rust,ignore
/// struct DenyAnonymous;
///
/// impl Plugin for DenyAnonymous {
///     fn implemented(&self) -> Hooks {
///         Hooks::CHECK_ACCESS
///     }
///
///     async fn check_access(&self, ctx: &mut Context) -> HookResult {
///         if ctx.session().get("user").is_none() {
///             return Err(ServiceError::new(AuthenticationRequired).into());
///         }
///         Ok(())
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a Wicket plugin",
    label = "missing `Plugin` implementation",
    note = "Implement `Plugin` directly, annotate an impl block or module with `#[wicket::plugin]`, or build a `HookMap`."
)]
pub trait Plugin: Send + Sync + 'static {
    /// Hook points this plugin actually implements.
    ///
    /// Defaults to every point. Override it (or use `#[plugin]`) so the
    /// container skips the unwritten hooks.
    fn implemented(&self) -> Hooks {
        Hooks::all()
    }

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Execution begins. Broadcast.
    fn start_request(&self, ctx: &mut Context) -> impl Future<Output = HookResult> + Send {
        let _ = ctx;
        future::ready(Ok(()))
    }

    /// Decide whether the request may proceed. Broadcast.
    fn check_access(&self, ctx: &mut Context) -> impl Future<Output = HookResult> + Send {
        let _ = ctx;
        future::ready(Ok(()))
    }

    /// Access was granted. Broadcast.
    fn after_check_access(&self, ctx: &mut Context) -> impl Future<Output = HookResult> + Send {
        let _ = ctx;
        future::ready(Ok(()))
    }

    /// Decode the request payload and assign `input`. Chain of command.
    fn read_input(&self, ctx: &mut Context) -> impl Future<Output = HookResult> + Send {
        let _ = ctx;
        future::ready(Ok(()))
    }

    /// Rewrite `input`. Broadcast.
    fn normalize_input(&self, ctx: &mut Context) -> impl Future<Output = HookResult> + Send {
        let _ = ctx;
        future::ready(Ok(()))
    }

    /// Reject invalid `input`. Broadcast.
    fn validate_input(&self, ctx: &mut Context) -> impl Future<Output = HookResult> + Send {
        let _ = ctx;
        future::ready(Ok(()))
    }

    /// Invoke the function and assign `output`. Chain of command.
    fn call_function(&self, ctx: &mut Context) -> impl Future<Output = HookResult> + Send {
        let _ = ctx;
        future::ready(Ok(()))
    }

    /// Rewrite `output`. Broadcast.
    fn process_output(&self, ctx: &mut Context) -> impl Future<Output = HookResult> + Send {
        let _ = ctx;
        future::ready(Ok(()))
    }

    /// Build the response from `output` and assign `response`. Chain of command.
    fn create_response(&self, ctx: &mut Context) -> impl Future<Output = HookResult> + Send {
        let _ = ctx;
        future::ready(Ok(()))
    }

    /// Observe the handled error in `error`. Broadcast.
    fn process_error(&self, ctx: &mut Context) -> impl Future<Output = HookResult> + Send {
        let _ = ctx;
        future::ready(Ok(()))
    }

    /// Final changes to `response`. Broadcast; runs on every path.
    fn process_response(&self, ctx: &mut Context) -> impl Future<Output = HookResult> + Send {
        let _ = ctx;
        future::ready(Ok(()))
    }

    /// Execution ends. Broadcast; runs on every path.
    fn end_request(&self, ctx: &mut Context) -> impl Future<Output = HookResult> + Send {
        let _ = ctx;
        future::ready(Ok(()))
    }
}
