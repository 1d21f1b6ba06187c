//! Procedural macros for Wicket.
//!
//! Use these through the `wicket` crate; the generated code refers to
//! `::wicket` paths.

use proc_macro::TokenStream;
use syn::{Item, parse_macro_input};

mod plugin;

/// Turn an impl block or a module into a plugin.
///
/// Hook methods are recognised by name (`start_request` .. `end_request`,
/// plus `process_input` as an alias of `normalize_input`). They take
/// `&mut Context` and return `HookResult`, either directly or as an
/// `async fn`. Everything else in the item is left alone.
///
/// # Shapes
///
/// ```rust,ignore
/// // Inherent impl: generates `impl Plugin for Audit`.
/// #[wicket::plugin(name = "audit")]
/// impl Audit {
///     async fn end_request(&self, ctx: &mut Context) -> HookResult { Ok(()) }
///     fn helper(&self) {}
/// }
///
/// // Trait impl: adds an exact `implemented()`.
/// #[wicket::plugin]
/// impl Plugin for Audit {
///     async fn check_access(&self, ctx: &mut Context) -> HookResult { Ok(()) }
/// }
///
/// // Module: generates `hooks::Functions`.
/// #[wicket::plugin]
/// mod hooks {
///     pub fn start_request(ctx: &mut Context) -> HookResult { Ok(()) }
/// }
/// ```
///
/// # Arguments
///
/// - `name = "..."`: the plugin name used in logs
/// - `ident = Name`: the struct generated for a module (default `Functions`)
#[proc_macro_attribute]
pub fn plugin(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as plugin::PluginArgs);
    let item = parse_macro_input!(item as Item);

    plugin::expand(args, item)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
