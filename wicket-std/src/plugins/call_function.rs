//! Function invocation.

use serde_json::json;
use wicket_core::{Arity, Context, HookResult, Hooks, ImplementationError, Plugin, ServiceError};

wicket_core::service_error! {
    /// The method requires input, but the request did not provide any.
    pub struct MissingInput: Client;

    /// The method takes no input, but the request provided some.
    pub struct UnexpectedInput: Client;
}

/// Calls the bound function with `input` and stores its result in `output`.
///
/// JSON `null` input counts as no input.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallFunctionPlugin;

impl Plugin for CallFunctionPlugin {
    fn implemented(&self) -> Hooks {
        Hooks::CALL_FUNCTION
    }

    fn name(&self) -> &'static str {
        "call_function"
    }

    async fn call_function(&self, ctx: &mut Context) -> HookResult {
        let Some(function) = ctx.function().cloned() else {
            return Err(ServiceError::new(ImplementationError)
                .with_details(json!({ "message": "no function bound to the request" }))
                .into());
        };
        let input = ctx.input().filter(|v| !v.is_null()).cloned();

        match (function.arity(), &input) {
            (Arity::Required, None) => return Err(ServiceError::new(MissingInput).into()),
            (Arity::None, Some(_)) => return Err(ServiceError::new(UnexpectedInput).into()),
            _ => {}
        }

        let output = function.call(input).await?;
        ctx.set_output(output);
        Ok(())
    }
}
