//! Hook points of the method pipeline.
//!
//! A method execution is a fixed sequence of twelve hook points. Each point
//! follows one of two calling conventions:
//!
//! - **Broadcast**: every plugin implementing the hook runs, in registration
//!   order.
//! - **Chain of command**: plugins run in reverse registration order until one
//!   of them assigns the point's monitored [`Field`]. Later registrations
//!   therefore override earlier ones.

use crate::{
    context::{Context, Field},
    error::HookError,
};
use std::{fmt, future::Future, pin::Pin, str::FromStr, sync::Arc};

/// Result of a single hook invocation.
pub type HookResult = Result<(), HookError>;

/// A boxed, sendable future borrowing from `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A compiled, type-erased hook.
pub type HookFn = Arc<dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HookResult> + Send + Sync>;

/// Wrap a closure as a [`HookFn`].
///
/// Pins the higher-ranked signature so closures infer correctly.
pub fn hook_fn<F>(f: F) -> HookFn
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HookResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// How a hook point dispatches to its implementors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Convention {
    /// Invoke every implementor in registration order.
    Broadcast,
    /// Invoke implementors newest first until the field is assigned.
    ChainOfCommand(Field),
}

/// The twelve hook points, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookPoint {
    /// Execution begins.
    StartRequest,
    /// Access control.
    CheckAccess,
    /// Access control passed.
    AfterCheckAccess,
    /// Decode the request payload into `input`.
    ReadInput,
    /// Rewrite `input` into its canonical form.
    NormalizeInput,
    /// Validate `input`.
    ValidateInput,
    /// Invoke the function and assign `output`.
    CallFunction,
    /// Post-process `output`.
    ProcessOutput,
    /// Build `response` from `output`.
    CreateResponse,
    /// Observe a handled error.
    ProcessError,
    /// Final touches on `response`.
    ProcessResponse,
    /// Execution ends.
    EndRequest,
}

impl HookPoint {
    /// Number of hook points.
    pub const COUNT: usize = 12;

    /// All hook points in pipeline order.
    pub const ALL: [HookPoint; Self::COUNT] = [
        HookPoint::StartRequest,
        HookPoint::CheckAccess,
        HookPoint::AfterCheckAccess,
        HookPoint::ReadInput,
        HookPoint::NormalizeInput,
        HookPoint::ValidateInput,
        HookPoint::CallFunction,
        HookPoint::ProcessOutput,
        HookPoint::CreateResponse,
        HookPoint::ProcessError,
        HookPoint::ProcessResponse,
        HookPoint::EndRequest,
    ];

    /// The hook name plugins use.
    pub fn as_str(self) -> &'static str {
        match self {
            HookPoint::StartRequest => "start_request",
            HookPoint::CheckAccess => "check_access",
            HookPoint::AfterCheckAccess => "after_check_access",
            HookPoint::ReadInput => "read_input",
            HookPoint::NormalizeInput => "normalize_input",
            HookPoint::ValidateInput => "validate_input",
            HookPoint::CallFunction => "call_function",
            HookPoint::ProcessOutput => "process_output",
            HookPoint::CreateResponse => "create_response",
            HookPoint::ProcessError => "process_error",
            HookPoint::ProcessResponse => "process_response",
            HookPoint::EndRequest => "end_request",
        }
    }

    /// Resolve a hook name. `process_input` is an alias of `normalize_input`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "process_input" => Some(HookPoint::NormalizeInput),
            _ => Self::ALL.into_iter().find(|p| p.as_str() == name),
        }
    }

    /// Calling convention of this point.
    pub fn convention(self) -> Convention {
        match self {
            HookPoint::ReadInput => Convention::ChainOfCommand(Field::Input),
            HookPoint::CallFunction => Convention::ChainOfCommand(Field::Output),
            HookPoint::CreateResponse => Convention::ChainOfCommand(Field::Response),
            _ => Convention::Broadcast,
        }
    }

    /// Position in [`HookPoint::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// The single-point [`Hooks`] set.
    pub fn flag(self) -> Hooks {
        Hooks::from_bits_retain(1 << self.index())
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown hook name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown hook name: {0}")]
pub struct UnknownHook(pub String);

impl FromStr for HookPoint {
    type Err = UnknownHook;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownHook(s.to_string()))
    }
}

bitflags::bitflags! {
    /// A set of hook points.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Hooks: u16 {
        /// `start_request`
        const START_REQUEST = 1 << 0;
        /// `check_access`
        const CHECK_ACCESS = 1 << 1;
        /// `after_check_access`
        const AFTER_CHECK_ACCESS = 1 << 2;
        /// `read_input`
        const READ_INPUT = 1 << 3;
        /// `normalize_input`
        const NORMALIZE_INPUT = 1 << 4;
        /// `validate_input`
        const VALIDATE_INPUT = 1 << 5;
        /// `call_function`
        const CALL_FUNCTION = 1 << 6;
        /// `process_output`
        const PROCESS_OUTPUT = 1 << 7;
        /// `create_response`
        const CREATE_RESPONSE = 1 << 8;
        /// `process_error`
        const PROCESS_ERROR = 1 << 9;
        /// `process_response`
        const PROCESS_RESPONSE = 1 << 10;
        /// `end_request`
        const END_REQUEST = 1 << 11;
    }
}

impl Hooks {
    /// The hook points in this set, in pipeline order.
    pub fn points(self) -> impl Iterator<Item = HookPoint> {
        HookPoint::ALL
            .into_iter()
            .filter(move |p| self.contains(p.flag()))
    }
}

impl From<HookPoint> for Hooks {
    fn from(point: HookPoint) -> Self {
        point.flag()
    }
}
