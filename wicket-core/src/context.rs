//! Per-execution request context.
//!
//! A [`Context`] is created for every method invocation and carries the
//! state the plugins build up: the function, the configuration snapshot, the
//! input, the output, the error and the response. Each of these starts out
//! unassigned. A field counts as assigned once something has been stored in
//! it, even an "empty" value such as JSON `null`; chain-of-command hooks use
//! this to detect that a plugin has claimed a stage.

use crate::{config::Options, error::ServiceError, function::Function, session::Session};
use bytes::Bytes;
use serde_json::Value;
use std::{
    fmt,
    sync::{Arc, LazyLock},
};

/// Incoming request type.
pub type Request = http::Request<Bytes>;

/// Outgoing response type.
pub type Response = http::Response<Bytes>;

static NO_OPTIONS: LazyLock<Options> = LazyLock::new(Options::new);

/// Names of the assignable context fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// The function being exposed.
    Function,
    /// The flattened configuration snapshot.
    Config,
    /// The decoded request payload.
    Input,
    /// The function result, or the error envelope.
    Output,
    /// The classified error, if the execution failed.
    Error,
    /// The response to return.
    Response,
}

impl Field {
    /// Lower-case field name.
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Function => "function",
            Field::Config => "config",
            Field::Input => "input",
            Field::Output => "output",
            Field::Error => "error",
            Field::Response => "response",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single method execution.
pub struct Context {
    function: Option<Arc<dyn Function>>,
    config: Option<Options>,
    input: Option<Value>,
    output: Option<Value>,
    error: Option<ServiceError>,
    response: Option<Response>,
    request: Request,
    session: Arc<dyn Session>,
}

macro_rules! slot_accessors {
    ($($field:ident: $ty:ty => $set:ident, $get_mut:ident, $take:ident;)+) => {$(
        #[doc = concat!("The ", stringify!($field), ", if assigned.")]
        pub fn $field(&self) -> Option<&$ty> {
            self.$field.as_ref()
        }

        #[doc = concat!("Assign the ", stringify!($field), ".")]
        pub fn $set(&mut self, value: $ty) {
            self.$field = Some(value);
        }

        #[doc = concat!("Mutable access to the ", stringify!($field), ", if assigned.")]
        pub fn $get_mut(&mut self) -> Option<&mut $ty> {
            self.$field.as_mut()
        }

        #[doc = concat!("Take the ", stringify!($field), " out, leaving it unassigned.")]
        pub fn $take(&mut self) -> Option<$ty> {
            self.$field.take()
        }
    )+};
}

impl Context {
    /// Create a context with every field unassigned.
    pub fn new(request: Request, session: Arc<dyn Session>) -> Self {
        Self {
            function: None,
            config: None,
            input: None,
            output: None,
            error: None,
            response: None,
            request,
            session,
        }
    }

    slot_accessors! {
        function: Arc<dyn Function> => set_function, function_mut, take_function;
        config: Options => set_config, config_mut, take_config;
        input: Value => set_input, input_mut, take_input;
        output: Value => set_output, output_mut, take_output;
        error: ServiceError => set_error, error_mut, take_error;
        response: Response => set_response, response_mut, take_response;
    }

    /// The configuration snapshot, empty when unassigned.
    pub fn options(&self) -> &Options {
        self.config.as_ref().unwrap_or(&NO_OPTIONS)
    }

    /// Whether `field` has been assigned.
    pub fn is_assigned(&self, field: Field) -> bool {
        match field {
            Field::Function => self.function.is_some(),
            Field::Config => self.config.is_some(),
            Field::Input => self.input.is_some(),
            Field::Output => self.output.is_some(),
            Field::Error => self.error.is_some(),
            Field::Response => self.response.is_some(),
        }
    }

    /// Return `field` to the unassigned state.
    pub fn reset(&mut self, field: Field) {
        match field {
            Field::Function => self.function = None,
            Field::Config => self.config = None,
            Field::Input => self.input = None,
            Field::Output => self.output = None,
            Field::Error => self.error = None,
            Field::Response => self.response = None,
        }
    }

    /// The incoming request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Mutable access to the incoming request.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// The client's session.
    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("function", &self.function.as_ref().map(|_| ".."))
            .field("config", &self.config)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("error", &self.error)
            .field("response", &self.response.as_ref().map(Response::status))
            .field("request", &self.request.uri())
            .finish_non_exhaustive()
    }
}
