//! JSON response encoding.

use bytes::Bytes;
use http::{StatusCode, header::CONTENT_TYPE};
use serde_json::Value;
use wicket_core::{Context, Field, HookResult, Hooks, Plugin};

/// Builds the response from `output` as pretty-printed JSON.
///
/// Status is `200 OK`, or `500 Internal Server Error` when the execution
/// failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOutputPlugin;

impl Plugin for JsonOutputPlugin {
    fn implemented(&self) -> Hooks {
        Hooks::CREATE_RESPONSE
    }

    fn name(&self) -> &'static str {
        "json_output"
    }

    async fn create_response(&self, ctx: &mut Context) -> HookResult {
        let body = serde_json::to_vec_pretty(ctx.output().unwrap_or(&Value::Null))?;
        let status = if ctx.is_assigned(Field::Error) {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };
        let response = http::Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(body))?;
        ctx.set_response(response);
        Ok(())
    }
}
