//! Testing utilities for Wicket.
//!
//! # Features
//!
//! - [`RecordingPlugin`]: A plugin that records every hook call it receives
//! - [`post`] / [`post_with_header`]: Request builders
//! - [`response_json`]: Decode a JSON response body

use bytes::Bytes;
use http::Method;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use wicket_core::{Context, HookPoint, HookResult, Plugin, Request, Response};

// ============================================================================
// Recording Plugin
// ============================================================================

/// Shared log of `(label, hook point)` pairs.
pub type CallLog = Arc<Mutex<Vec<(&'static str, HookPoint)>>>;

/// A plugin that implements every hook and records each call.
///
/// Several recorders can share one [`CallLog`] to observe ordering across
/// plugins.
///
/// # Example
///
/// ```rust,ignore
/// let log = CallLog::default();
/// container.add(RecordingPlugin::new("a", &log));
/// container.add(RecordingPlugin::new("b", &log));
///
/// method.call(request, session).await?;
/// assert_eq!(log.lock().unwrap()[0], ("a", HookPoint::StartRequest));
/// ```
#[derive(Clone)]
pub struct RecordingPlugin {
    label: &'static str,
    log: CallLog,
}

impl RecordingPlugin {
    /// Create a recorder writing to a shared log.
    pub fn new(label: &'static str, log: &CallLog) -> Self {
        Self {
            label,
            log: Arc::clone(log),
        }
    }

    /// Create a recorder with its own log.
    pub fn standalone(label: &'static str) -> Self {
        Self::new(label, &CallLog::default())
    }

    /// Hook points this recorder saw, in order.
    pub fn points(&self) -> Vec<HookPoint> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(label, _)| *label == self.label)
            .map(|(_, point)| *point)
            .collect()
    }

    /// Number of calls this recorder saw.
    pub fn count(&self) -> usize {
        self.points().len()
    }

    fn record(&self, point: HookPoint) {
        self.log.lock().unwrap().push((self.label, point));
    }
}

macro_rules! record_hooks {
    ($($method:ident => $point:ident),+ $(,)?) => {$(
        async fn $method(&self, _ctx: &mut Context) -> HookResult {
            self.record(HookPoint::$point);
            Ok(())
        }
    )+};
}

impl Plugin for RecordingPlugin {
    fn name(&self) -> &'static str {
        self.label
    }

    record_hooks! {
        start_request => StartRequest,
        check_access => CheckAccess,
        after_check_access => AfterCheckAccess,
        read_input => ReadInput,
        normalize_input => NormalizeInput,
        validate_input => ValidateInput,
        call_function => CallFunction,
        process_output => ProcessOutput,
        create_response => CreateResponse,
        process_error => ProcessError,
        process_response => ProcessResponse,
        end_request => EndRequest,
    }
}

// ============================================================================
// Requests and Responses
// ============================================================================

/// Build a `POST` request.
pub fn post(path: &str, body: impl Into<Bytes>) -> Request {
    let mut request = Request::new(body.into());
    *request.method_mut() = Method::POST;
    *request.uri_mut() = path.parse().unwrap();
    request
}

/// Build a `POST` request carrying one extra header.
pub fn post_with_header(path: &str, body: impl Into<Bytes>, name: &str, value: &str) -> Request {
    let mut request = post(path, body);
    request.headers_mut().insert(
        http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
        http::HeaderValue::from_str(value).unwrap(),
    );
    request
}

/// Decode a response body as JSON.
pub fn response_json(response: &Response) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}
