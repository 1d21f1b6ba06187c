//! # wicket-std
//!
//! Standard plugins for the Wicket JSON method framework.
//!
//! This crate provides:
//! - **Request decoding**: [`JsonInputPlugin`](plugins::JsonInputPlugin),
//!   [`NormalizeInputPlugin`](plugins::NormalizeInputPlugin)
//! - **Invocation**: [`CallFunctionPlugin`](plugins::CallFunctionPlugin)
//! - **Response encoding**: [`JsonOutputPlugin`](plugins::JsonOutputPlugin)
//! - **Security**: [`CsrfPlugin`](plugins::CsrfPlugin),
//!   [`AuthPlugin`](plugins::AuthPlugin) and the [`auth_session`] helpers
//! - **Testing**: [`testing`]

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use wicket_core;

// Modules
pub mod auth_session;
pub mod plugins;
pub mod testing;
