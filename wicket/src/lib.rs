//! # wicket - Functions as JSON Methods
//!
//! `wicket` exposes plain async functions as JSON methods. Every invocation
//! runs through a pipeline of twelve hook points, and everything the method
//! does besides calling the function (access checks, decoding, normalization,
//! encoding, CSRF tokens) is a plugin.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use serde::Deserialize;
//! use wicket::prelude::*;
//!
//! #[derive(Deserialize)]
//! struct Greeting { name: String }
//!
//! async fn hello(g: Greeting) -> Result<String, Infallible> {
//!     Ok(format!("Hello, {}!", g.name))
//! }
//!
//! let mut service = Service::builder().build();
//! service.register("hello", hello)?;
//!
//! // In the host router:
//! let response = service.route("/hello").unwrap().call(request, session).await?;
//! ```
//!
//! ## Writing Plugins
//!
//! ```rust,ignore
//! struct Audit;
//!
//! #[wicket::plugin(name = "audit")]
//! impl Audit {
//!     async fn end_request(&self, ctx: &mut Context) -> HookResult {
//!         tracing::info!(failed = ctx.error().is_some(), "request finished");
//!         Ok(())
//!     }
//! }
//!
//! let service = Service::builder().plugin(Audit).build();
//! ```
//!
//! ## Crate Structure
//!
//! - `wicket-core`: the pipeline engine, error taxonomy and plugin contract
//! - `wicket-std`: the standard plugins and testing utilities
//! - `wicket-macros`: the `#[plugin]` attribute

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod service;

pub use service::{PING_RULE, RegistrationError, Service, ServiceBuilder};

pub use wicket_core::{
    // Errors
    AccessDenied,
    // Functions
    Arity,
    AuthenticationFailed,
    AuthenticationRequired,
    AuthorizationFailed,
    BoxError,
    BoxFuture,
    Cause,
    ConfigError,
    // Configuration
    ConfigNode,
    // Context
    Context,
    Convention,
    ErrorKind,
    Field,
    Function,
    // Hooks
    HookError,
    HookFn,
    // Plugins
    HookMap,
    HookPoint,
    HookResult,
    HookTable,
    Hooks,
    ImplementationError,
    IntoFunction,
    IntoPlugin,
    InvalidInput,
    MemorySession,
    // Pipeline
    Method,
    Options,
    Plugin,
    PluginContainer,
    Registration,
    Request,
    Response,
    ServiceError,
    Session,
    Stage,
    StageUnhandled,
    Unhandled,
    UnhandledException,
    UnknownHook,
    WithDefault,
    compile,
    envelope,
    hook_fn,
    is_valid_name,
    optional,
    service_error,
};

pub use wicket_std::{auth_session, plugins, testing};

#[cfg(feature = "macros")]
pub use wicket_macros::plugin;

/// Prelude module for convenient imports.
///
/// ```rust
/// use wicket::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Context, HookError, HookMap, HookPoint, HookResult, Hooks, MemorySession, Method, Options,
        Plugin, Request, Response, Service, ServiceBuilder, ServiceError, Session, optional,
        service_error,
    };

    #[cfg(feature = "macros")]
    pub use crate::plugin;

    pub use std::convert::Infallible;
}
