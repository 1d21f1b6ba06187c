//! Authentication and role authorization.
//!
//! Options:
//!
//! - `auth` (default `false`): the method requires an active auth session
//! - `role` (default unset): the method requires an active auth session that
//!   grants this role; implies `auth`

use crate::auth_session;
use serde_json::json;
use wicket_core::{
    AuthenticationRequired, AuthorizationFailed, Context, HookResult, Hooks, Plugin, ServiceError,
};

/// Enforces the `auth` and `role` options against the session's auth record.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthPlugin;

impl Plugin for AuthPlugin {
    fn implemented(&self) -> Hooks {
        Hooks::CHECK_ACCESS | Hooks::AFTER_CHECK_ACCESS
    }

    fn name(&self) -> &'static str {
        "auth"
    }

    async fn check_access(&self, ctx: &mut Context) -> HookResult {
        let options = ctx.options();
        let role = options.str("role");
        if !options.flag("auth", false) && role.is_none() {
            return Ok(());
        }

        let Some(record) = auth_session::current(ctx.session().as_ref()) else {
            return Err(ServiceError::new(AuthenticationRequired).into());
        };
        match role {
            Some(role) if !record.has_role(role) => Err(ServiceError::new(AuthorizationFailed)
                .with_details(json!({ "role": role }))
                .into()),
            _ => Ok(()),
        }
    }

    async fn after_check_access(&self, ctx: &mut Context) -> HookResult {
        auth_session::keep_alive(ctx.session().as_ref());
        Ok(())
    }
}
