//! Standard plugins.
//!
//! [`register_defaults`] installs the plugins every service starts with, in
//! this order: CSRF, JSON input, input normalization, function call, JSON
//! output. [`AuthPlugin`] is opt-in.

mod auth;
mod call_function;
mod csrf;
mod json_input;
mod json_output;
mod normalize;

pub use auth::AuthPlugin;
pub use call_function::{CallFunctionPlugin, MissingInput, UnexpectedInput};
pub use csrf::{
    CSRF_HEADER, CsrfPlugin, CsrfTokenInvalid, CsrfTokenRequired, MAX_TOKENS, TOKENS_KEY,
    clear_tokens, issue_token, recent_tokens,
};
pub use json_input::{JsonInputPlugin, NonJsonInput};
pub use json_output::JsonOutputPlugin;
pub use normalize::{NormalizeInputPlugin, Rules};

use wicket_core::PluginContainer;

/// Add the default plugin set to `container`.
pub fn register_defaults(container: &mut PluginContainer) -> &mut PluginContainer {
    container
        .add(CsrfPlugin)
        .add(JsonInputPlugin)
        .add(NormalizeInputPlugin)
        .add(CallFunctionPlugin)
        .add(JsonOutputPlugin)
}
