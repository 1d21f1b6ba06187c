//! # wicket-core
//!
//! Core pipeline engine for the Wicket JSON method framework.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! plugins that don't need the standard plugin set from `wicket-std`.
//!
//! # Pipeline
//!
//! A [`Method`] wraps a function (anything implementing [`IntoFunction`]) and
//! runs it through twelve [`HookPoint`]s. Plugins registered in a
//! [`PluginContainer`] implement any subset of those points:
//!
//! - **Broadcast** points run every implementation in registration order.
//! - **Chain-of-command** points (`read_input`, `call_function`,
//!   `create_response`) run implementations newest first until one of them
//!   assigns the point's [`Field`] on the [`Context`].
//!
//! # Plugins
//!
//! [`Plugin`] is the typed contract: one provided no-op method per hook
//! point. [`HookMap`] builds a plugin from name/closure pairs. Both compile to
//! a [`HookTable`] on registration.
//!
//! # Configuration
//!
//! [`ConfigNode`]s form a parent chain (service → method). Each invocation
//! receives a flattened [`Options`] snapshot.
//!
//! # Error Types
//!
//! - [`ServiceError`] - Classified error reported in the error envelope
//! - [`HookError`] - Error propagated by hooks and functions
//! - [`ConfigError`] - Configuration misuse

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod compiler;
mod config;
mod container;
mod context;
mod error;
mod function;
mod hook;
mod method;
mod plugin;
mod session;

// Re-exports
pub use compiler::{HookMap, HookTable, IntoPlugin, Registration, compile};
pub use config::{ConfigNode, Options, is_valid_name};
pub use container::PluginContainer;
pub use context::{Context, Field, Request, Response};
pub use error::{
    AccessDenied, AuthenticationFailed, AuthenticationRequired, AuthorizationFailed, BoxError,
    Cause, ConfigError, ErrorKind, HookError, ImplementationError, ServiceError, StageUnhandled,
    Unhandled, UnhandledException,
};
pub use function::{
    Arity, Defaulted, Erased, Function, IntoFunction, InvalidInput, WithDefault, optional,
};
pub use hook::{BoxFuture, Convention, HookFn, HookPoint, HookResult, Hooks, UnknownHook, hook_fn};
pub use method::{Method, Stage, envelope};
pub use plugin::Plugin;
pub use session::{MemorySession, Session};
