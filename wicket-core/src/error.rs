//! Error types for Wicket.
//!
//! The pipeline distinguishes three families of errors:
//!
//! - [`ServiceError`] - a classified failure reported to the caller inside the
//!   error envelope (code, cause, description, details). Kinds are declared
//!   with [`service_error!`](crate::service_error).
//! - [`HookError`] - what hooks, functions and the plugin container propagate.
//!   Either a classified [`ServiceError`] or an [`Unhandled`] error captured
//!   with its type name, message and backtrace.
//! - [`ConfigError`] - misuse of the configuration hierarchy.

use serde::Serialize;
use serde_json::Value;
use std::{
    any::Any,
    backtrace::{Backtrace, BacktraceStatus},
    borrow::Cow,
    cell::Cell,
    error::Error,
    fmt,
    future::Future,
    sync::Arc,
};
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

// ============================================================================
// Classified errors
// ============================================================================

/// Which side of the exchange is responsible for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cause {
    /// The request was at fault (bad input, missing credentials, ...).
    Client,
    /// The service was at fault.
    Server,
}

impl Cause {
    /// Wire name of the cause.
    pub fn as_str(self) -> &'static str {
        match self {
            Cause::Client => "client",
            Cause::Server => "server",
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A kind of classified error.
///
/// Implemented by the unit types generated by
/// [`service_error!`](crate::service_error); the code is the type name and the
/// description is the type's documentation.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a service error kind",
    label = "not declared with `service_error!`",
    note = "Declare error kinds with the `service_error!` macro."
)]
pub trait ErrorKind: Send + Sync + 'static {
    /// Stable error code.
    const CODE: &'static str;
    /// Whether the client or the server is at fault.
    const CAUSE: Cause;
    /// Raw documentation text, condensed into the description.
    const DOC: &'static str;
}

/// A classified error: the payload of the error envelope.
#[derive(Debug, Clone)]
pub struct ServiceError {
    code: Cow<'static, str>,
    cause: Cause,
    description: String,
    details: Value,
    backtrace: Option<Arc<Backtrace>>,
}

impl ServiceError {
    /// Create an error of the given kind without details.
    pub fn new<K: ErrorKind>(kind: K) -> Self {
        let _ = kind;
        Self {
            code: Cow::Borrowed(K::CODE),
            cause: K::CAUSE,
            description: describe(K::CODE, K::DOC),
            details: Value::Null,
            backtrace: captured(),
        }
    }

    /// Create an error that has no declared kind.
    pub fn custom(
        code: impl Into<Cow<'static, str>>,
        cause: Cause,
        description: impl Into<String>,
    ) -> Self {
        let code = code.into();
        let description = describe(&code, &description.into());
        Self {
            code,
            cause,
            description,
            details: Value::Null,
            backtrace: captured(),
        }
    }

    /// Attach structured details.
    pub fn with_details(mut self, details: impl Into<Value>) -> Self {
        self.details = details.into();
        self
    }

    /// Error code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Who caused the error.
    pub fn cause(&self) -> Cause {
        self.cause
    }

    /// Single-line description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Structured details, `null` when there are none.
    pub fn details(&self) -> &Value {
        &self.details
    }

    /// Whether this error is of kind `K`.
    pub fn is<K: ErrorKind>(&self) -> bool {
        self.code == K::CODE
    }

    /// Whether the client is at fault.
    pub fn is_client_error(&self) -> bool {
        self.cause == Cause::Client
    }

    /// Backtrace of the place the error was created, when one was captured.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }
}

impl PartialEq for ServiceError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.cause == other.cause
            && self.description == other.description
            && self.details == other.details
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

impl Error for ServiceError {}

fn describe(code: &str, doc: &str) -> String {
    let condensed = doc.split_whitespace().collect::<Vec<_>>().join(" ");
    if condensed.is_empty() {
        format!("Missing documentation for error type '{code}'")
    } else {
        condensed
    }
}

/// Declare service error kinds.
///
/// Each declaration produces a unit struct implementing
/// [`ErrorKind`](crate::ErrorKind) and converting into
/// [`ServiceError`](crate::ServiceError). The code is the struct name and the
/// description is its doc comment.
///
/// ```rust,ignore
/// wicket::service_error! {
///     /// The requested frobnicator is out of stock.
///     pub struct OutOfStock: Client;
/// }
///
/// let err = ServiceError::new(OutOfStock);
/// assert_eq!(err.code(), "OutOfStock");
/// ```
#[macro_export]
macro_rules! service_error {
    ($(
        $(#[doc = $doc:literal])*
        $vis:vis struct $name:ident: $cause:ident;
    )+) => {$(
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        $vis struct $name;

        impl $crate::ErrorKind for $name {
            const CODE: &'static str = stringify!($name);
            const CAUSE: $crate::Cause = $crate::Cause::$cause;
            const DOC: &'static str = concat!($($doc, "\n",)*);
        }

        impl ::core::convert::From<$name> for $crate::ServiceError {
            fn from(kind: $name) -> Self {
                $crate::ServiceError::new(kind)
            }
        }
    )+};
}

crate::service_error! {
    /// Access to the method was denied.
    pub struct AccessDenied: Client;

    /// The method requires an authenticated session.
    pub struct AuthenticationRequired: Client;

    /// The supplied credentials could not be verified.
    pub struct AuthenticationFailed: Client;

    /// The authenticated session lacks the privileges the method requires.
    pub struct AuthorizationFailed: Client;

    /// The method implementation misbehaved, for example by returning a
    /// value that cannot be represented as JSON.
    pub struct ImplementationError: Server;

    /// An unexpected error occurred while handling the request.
    pub struct UnhandledException: Server;

    /// A pipeline stage finished without any plugin producing its result.
    pub struct StageUnhandled: Server;
}

// ============================================================================
// Hook errors
// ============================================================================

/// An error propagated through the pipeline.
///
/// Any `std::error::Error + Send + Sync + 'static` converts into a `HookError`
/// with `?`. A [`ServiceError`] keeps its classification; every other error is
/// captured as [`Unhandled`] and later reported as `UnhandledException`.
#[derive(Debug)]
pub enum HookError {
    /// A classified error.
    Service(ServiceError),
    /// An error nobody classified.
    Unhandled(Unhandled),
}

impl HookError {
    /// Capture an unclassified error by hand.
    pub fn unhandled(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        HookError::Unhandled(Unhandled {
            error_type: error_type.into(),
            message: message.into(),
            backtrace: capture_backtrace(),
        })
    }

    /// Convert a type-erased error, keeping a [`ServiceError`] classified.
    pub fn boxed(err: BoxError) -> Self {
        match err.downcast::<ServiceError>() {
            Ok(service) => HookError::Service(*service),
            Err(other) => HookError::unhandled("Error", other.to_string()),
        }
    }

    /// Convert a panic payload caught from a hook.
    pub fn panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        HookError::unhandled("panic", message)
    }

    /// The classified error, if this is one.
    pub fn as_service(&self) -> Option<&ServiceError> {
        match self {
            HookError::Service(err) => Some(err),
            HookError::Unhandled(_) => None,
        }
    }

    /// Whether this error is a classified error of kind `K`.
    pub fn is<K: ErrorKind>(&self) -> bool {
        self.as_service().is_some_and(ServiceError::is::<K>)
    }
}

impl<E> From<E> for HookError
where
    E: Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        if let Some(service) = (&err as &dyn Any).downcast_ref::<ServiceError>() {
            return HookError::Service(service.clone());
        }
        HookError::Unhandled(Unhandled {
            error_type: short_type_name::<E>(),
            message: err.to_string(),
            backtrace: capture_backtrace(),
        })
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::Service(err) => write!(f, "{err}"),
            HookError::Unhandled(err) => write!(f, "unhandled {}: {}", err.error_type, err.message),
        }
    }
}

/// An unclassified error captured at the point it entered the pipeline.
#[derive(Debug)]
pub struct Unhandled {
    error_type: String,
    message: String,
    backtrace: Backtrace,
}

impl Unhandled {
    /// Short type name of the original error (`"panic"` for panics).
    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    /// Display text of the original error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Backtrace captured on conversion.
    ///
    /// Disabled unless the error was raised inside a debug-mode method or
    /// the environment enables backtraces (`RUST_LIB_BACKTRACE`).
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

// ============================================================================
// Backtrace capture
// ============================================================================

thread_local! {
    static FORCE_CAPTURE: Cell<bool> = const { Cell::new(false) };
}

fn capture_backtrace() -> Backtrace {
    if FORCE_CAPTURE.get() {
        Backtrace::force_capture()
    } else {
        Backtrace::capture()
    }
}

fn captured() -> Option<Arc<Backtrace>> {
    let backtrace = capture_backtrace();
    (backtrace.status() == BacktraceStatus::Captured).then(|| Arc::new(backtrace))
}

struct RestoreCapture(bool);

impl Drop for RestoreCapture {
    fn drop(&mut self) {
        FORCE_CAPTURE.set(self.0);
    }
}

/// Drive `future` with backtrace capture forced on (`true`) or left to the
/// environment (`false`) for errors created while it is polled.
pub(crate) async fn with_diagnostics<F: Future>(enabled: bool, future: F) -> F::Output {
    let mut future = std::pin::pin!(future);
    futures::future::poll_fn(|cx| {
        let _restore = RestoreCapture(FORCE_CAPTURE.replace(enabled));
        future.as_mut().poll(cx)
    })
    .await
}

fn short_type_name<E: ?Sized>() -> String {
    let full = std::any::type_name::<E>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path).to_string()
}

// ============================================================================
// Configuration errors
// ============================================================================

/// Errors raised by the configuration hierarchy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The option name is not a valid identifier.
    #[error("invalid configuration name: {0:?}")]
    InvalidName(String),

    /// No node in the chain defines the option.
    #[error("configuration option not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::service_error! {
        /// The frobnicator
        ///     is out   of stock.
        struct OutOfStock: Client;

        struct Undocumented: Server;
    }

    #[derive(Debug, Error)]
    #[error("disk on fire")]
    struct DiskOnFire;

    #[test]
    fn description_is_condensed_doc() {
        let err = ServiceError::new(OutOfStock);
        assert_eq!(err.code(), "OutOfStock");
        assert_eq!(err.cause(), Cause::Client);
        assert_eq!(err.description(), "The frobnicator is out of stock.");
        assert!(err.details().is_null());
    }

    #[test]
    fn missing_doc_has_placeholder_description() {
        let err = ServiceError::from(Undocumented);
        assert_eq!(
            err.description(),
            "Missing documentation for error type 'Undocumented'"
        );
        assert!(!err.is_client_error());
    }

    #[test]
    fn service_error_keeps_classification_through_question_mark() {
        fn fail() -> Result<(), HookError> {
            Err(ServiceError::new(AccessDenied).with_details(serde_json::json!({"why": "no"})))?;
            Ok(())
        }

        let err = fail().unwrap_err();
        assert!(err.is::<AccessDenied>());
        assert_eq!(err.as_service().unwrap().details()["why"], "no");
    }

    #[test]
    fn foreign_error_is_captured_unhandled() {
        let err = HookError::from(DiskOnFire);
        match err {
            HookError::Unhandled(u) => {
                assert_eq!(u.error_type(), "DiskOnFire");
                assert_eq!(u.message(), "disk on fire");
            }
            other => panic!("expected unhandled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn backtraces_are_forced_only_under_diagnostics() {
        let forced = with_diagnostics(true, async {
            (HookError::from(DiskOnFire), ServiceError::new(OutOfStock))
        })
        .await;
        match forced {
            (HookError::Unhandled(u), service) => {
                assert_eq!(u.backtrace().status(), BacktraceStatus::Captured);
                assert!(service.backtrace().is_some());
            }
            other => panic!("expected unhandled, got {other:?}"),
        }

        let ambient = Backtrace::capture().status();
        let relaxed = with_diagnostics(false, async { HookError::from(DiskOnFire) }).await;
        match relaxed {
            HookError::Unhandled(u) => assert_eq!(u.backtrace().status(), ambient),
            other => panic!("expected unhandled, got {other:?}"),
        }
        assert!(!FORCE_CAPTURE.get());
    }

    #[tokio::test]
    async fn equality_ignores_backtrace() {
        let traced = with_diagnostics(true, async { ServiceError::new(OutOfStock) }).await;
        assert_eq!(traced, ServiceError::from(OutOfStock));
    }

    #[test]
    fn boxed_error_downcasts_service_error() {
        let boxed: BoxError = Box::new(ServiceError::new(StageUnhandled));
        assert!(HookError::boxed(boxed).is::<StageUnhandled>());

        let boxed: BoxError = "plain".into();
        assert!(matches!(HookError::boxed(boxed), HookError::Unhandled(_)));
    }

    #[test]
    fn panic_payload_message() {
        let err = HookError::panic(Box::new("boom"));
        match err {
            HookError::Unhandled(u) => {
                assert_eq!(u.error_type(), "panic");
                assert_eq!(u.message(), "boom");
            }
            other => panic!("expected unhandled, got {other:?}"),
        }
    }
}
