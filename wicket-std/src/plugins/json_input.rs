//! JSON request decoding.

use serde_json::{Value, json};
use wicket_core::{Context, HookResult, Hooks, Plugin, ServiceError};

wicket_core::service_error! {
    /// The request body could not be parsed as JSON data.
    pub struct NonJsonInput: Client;
}

/// Reads `input` from a JSON request body.
///
/// An empty or whitespace-only body yields `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonInputPlugin;

impl Plugin for JsonInputPlugin {
    fn implemented(&self) -> Hooks {
        Hooks::READ_INPUT
    }

    fn name(&self) -> &'static str {
        "json_input"
    }

    async fn read_input(&self, ctx: &mut Context) -> HookResult {
        let body = ctx.request().body();
        let input = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(body).map_err(|err| {
                ServiceError::new(NonJsonInput).with_details(json!({ "message": err.to_string() }))
            })?
        };
        ctx.set_input(input);
        Ok(())
    }
}
