//! CSRF protection.
//!
//! Every response carries a fresh token in the [`CSRF_HEADER`] header and the
//! session remembers the most recent [`MAX_TOKENS`] of them. A protected
//! method (option `csrf`, default `true`) only runs when the request sends one
//! of those tokens back in the same header.
//!
//! Remembering a few tokens instead of one keeps concurrent calls from an
//! asynchronous client working when responses arrive out of order. The
//! initial token comes from an unprotected call such as the service's ping.

use http::{HeaderName, HeaderValue};
use serde_json::{Value, json};
use uuid::Uuid;
use wicket_core::{Context, HookResult, Hooks, Plugin, ServiceError, Session};

/// Header carrying tokens in both directions.
pub const CSRF_HEADER: &str = "x-wicket-csrf-token";

/// Session key of the recent tokens.
pub const TOKENS_KEY: &str = "wicket.csrf_tokens";

/// Number of recent tokens accepted.
pub const MAX_TOKENS: usize = 3;

wicket_core::service_error! {
    /// The method is CSRF protected, but the request carries no CSRF token.
    pub struct CsrfTokenRequired: Client;

    /// The CSRF token of the request is not valid for this session.
    pub struct CsrfTokenInvalid: Client;
}

/// Issues and checks CSRF tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsrfPlugin;

impl Plugin for CsrfPlugin {
    fn implemented(&self) -> Hooks {
        Hooks::CHECK_ACCESS | Hooks::PROCESS_RESPONSE
    }

    fn name(&self) -> &'static str {
        "csrf"
    }

    async fn check_access(&self, ctx: &mut Context) -> HookResult {
        if !ctx.options().flag("csrf", true) {
            return Ok(());
        }
        let Some(header) = ctx.request().headers().get(CSRF_HEADER) else {
            return Err(ServiceError::new(CsrfTokenRequired).into());
        };
        let known = recent_tokens(ctx.session().as_ref());
        match header.to_str() {
            Ok(token) if known.iter().any(|t| t == token) => Ok(()),
            _ => Err(ServiceError::new(CsrfTokenInvalid).into()),
        }
    }

    async fn process_response(&self, ctx: &mut Context) -> HookResult {
        let token = issue_token(ctx.session().as_ref());
        if let Some(response) = ctx.response_mut() {
            response.headers_mut().insert(
                HeaderName::from_static(CSRF_HEADER),
                HeaderValue::from_str(&token)?,
            );
        }
        Ok(())
    }
}

/// Tokens currently accepted for `session`, oldest first.
pub fn recent_tokens(session: &dyn Session) -> Vec<String> {
    session
        .get(TOKENS_KEY)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Generate a token, remember it in `session` and return it.
pub fn issue_token(session: &dyn Session) -> String {
    let token = Uuid::new_v4().to_string();
    let mut tokens = recent_tokens(session);
    tokens.push(token.clone());
    let excess = tokens.len().saturating_sub(MAX_TOKENS);
    tokens.drain(..excess);
    session.set(TOKENS_KEY, Value::from(tokens));
    tracing::trace!(token = %token, "issued csrf token");
    token
}

/// Forget all tokens of `session`.
pub fn clear_tokens(session: &dyn Session) {
    session.set(TOKENS_KEY, json!([]));
}
