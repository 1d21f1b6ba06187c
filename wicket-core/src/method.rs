//! The pipeline driver.
//!
//! A [`Method`] binds a function to a configuration node and a shared plugin
//! container, and runs the full hook sequence for each invocation:
//!
//! ```text
//! start_request → check_access → after_check_access
//!   → read_input* → normalize_input → validate_input
//!   → call_function* → process_output → create_response*
//!   → process_response → end_request
//! ```
//!
//! Points marked `*` are chain of command and must end with their field
//! assigned. Any failure in the primary stages diverts to error handling:
//! the error is classified, an error envelope becomes the output, and
//! `create_response` and `process_error` run. `process_response` and
//! `end_request` run on every path.

use crate::{
    config::{ConfigNode, Options},
    container::PluginContainer,
    context::{Context, Field, Request, Response},
    error::{
        ConfigError, HookError, ServiceError, StageUnhandled, UnhandledException, with_diagnostics,
    },
    function::{Function, IntoFunction},
    hook::{Convention, HookPoint, HookResult},
    session::Session,
};
use futures::FutureExt;
use serde_json::{Value, json};
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    sync::Arc,
};
use tracing::Instrument;

/// Stage of a method execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing has run yet.
    Init,
    /// `start_request`, `check_access`, `after_check_access`.
    AccessControl,
    /// `read_input`.
    InputAcquisition,
    /// `normalize_input`, `validate_input`.
    InputProcessing,
    /// `call_function`.
    Invocation,
    /// `process_output`.
    OutputProcessing,
    /// `create_response`.
    ResponseCreation,
    /// Error envelope, `create_response`, `process_error`.
    ErrorHandling,
    /// `process_response`, `end_request`.
    Finalization,
    /// The response has been handed back.
    Done,
}

impl Stage {
    const PRIMARY: [Stage; 6] = [
        Stage::AccessControl,
        Stage::InputAcquisition,
        Stage::InputProcessing,
        Stage::Invocation,
        Stage::OutputProcessing,
        Stage::ResponseCreation,
    ];

    /// Hook points run by this stage on the success path.
    pub fn hooks(self) -> &'static [HookPoint] {
        match self {
            Stage::AccessControl => &[
                HookPoint::StartRequest,
                HookPoint::CheckAccess,
                HookPoint::AfterCheckAccess,
            ],
            Stage::InputAcquisition => &[HookPoint::ReadInput],
            Stage::InputProcessing => &[HookPoint::NormalizeInput, HookPoint::ValidateInput],
            Stage::Invocation => &[HookPoint::CallFunction],
            Stage::OutputProcessing => &[HookPoint::ProcessOutput],
            Stage::ResponseCreation => &[HookPoint::CreateResponse],
            Stage::ErrorHandling => &[HookPoint::CreateResponse, HookPoint::ProcessError],
            Stage::Finalization => &[HookPoint::ProcessResponse, HookPoint::EndRequest],
            Stage::Init | Stage::Done => &[],
        }
    }
}

/// A function wrapped in the plugin pipeline.
pub struct Method {
    name: String,
    function: Arc<dyn Function>,
    config: Arc<ConfigNode>,
    plugins: Arc<PluginContainer>,
    debug: bool,
}

impl Method {
    /// Wrap `function`, giving it a configuration node under `parent`.
    pub fn new<M>(
        name: impl Into<String>,
        function: impl IntoFunction<M>,
        parent: &Arc<ConfigNode>,
        plugins: Arc<PluginContainer>,
    ) -> Self {
        Self {
            name: name.into(),
            function: function.into_function(),
            config: ConfigNode::child(parent),
            plugins,
            debug: false,
        }
    }

    /// Include stack traces in error envelopes.
    ///
    /// While a debug-mode invocation runs, errors capture a backtrace where
    /// they are created, so the trace points at the raising hook.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set method-level options. Returns `self` for chaining.
    pub fn configure<I, K, V>(&self, options: I) -> Result<&Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.config.configure(options)?;
        Ok(self)
    }

    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The method's configuration node.
    pub fn config(&self) -> &Arc<ConfigNode> {
        &self.config
    }

    /// The shared plugin container.
    pub fn plugins(&self) -> &Arc<PluginContainer> {
        &self.plugins
    }

    /// Run one invocation.
    ///
    /// Failures in the primary stages are reported through the response.
    /// `Err` is returned only when error handling or finalization itself
    /// fails; `process_response` and `end_request` have still run by then.
    pub async fn call(
        &self,
        request: Request,
        session: Arc<dyn Session>,
    ) -> Result<Response, HookError> {
        let span = tracing::debug_span!("method", method = %self.name);
        with_diagnostics(self.debug, self.execute(request, session))
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        request: Request,
        session: Arc<dyn Session>,
    ) -> Result<Response, HookError> {
        let mut ctx = Context::new(request, session);
        ctx.set_function(Arc::clone(&self.function));
        ctx.set_config(self.config.flattened());

        let mut fatal = None;
        if let Err(failure) = guarded(self.run_primary(&mut ctx)).await {
            tracing::debug!(stage = ?Stage::ErrorHandling, "entering error handling");
            if let Err(err) = guarded(self.handle_error(&mut ctx, failure)).await {
                tracing::error!(error = %err, "error handling failed");
                fatal = Some(err);
            }
        }

        tracing::debug!(stage = ?Stage::Finalization, "finalizing");
        for point in Stage::Finalization.hooks() {
            if let Err(err) = guarded(self.plugins.call_all(&mut ctx, *point)).await {
                tracing::error!(hook = %point, error = %err, "finalization failed");
                fatal.get_or_insert(err);
            }
        }

        if let Some(err) = fatal {
            return Err(err);
        }
        tracing::debug!(stage = ?Stage::Done, "done");
        ctx.take_response()
            .ok_or_else(|| unclaimed(HookPoint::CreateResponse))
    }

    async fn run_primary(&self, ctx: &mut Context) -> HookResult {
        for stage in Stage::PRIMARY {
            tracing::debug!(stage = ?stage, "entering stage");
            for point in stage.hooks() {
                self.run_point(ctx, *point).await?;
            }
        }
        Ok(())
    }

    async fn run_point(&self, ctx: &mut Context, point: HookPoint) -> HookResult {
        self.plugins.dispatch(ctx, point).await?;
        match point.convention() {
            Convention::ChainOfCommand(field) if !ctx.is_assigned(field) => Err(unclaimed(point)),
            _ => Ok(()),
        }
    }

    async fn handle_error(&self, ctx: &mut Context, failure: HookError) -> HookResult {
        let (error, trace) = self.classify(failure);
        ctx.set_output(envelope(&error, trace));
        ctx.set_error(error);
        ctx.reset(Field::Response);

        self.run_point(ctx, HookPoint::CreateResponse).await?;
        self.plugins.call_all(ctx, HookPoint::ProcessError).await
    }

    fn classify(&self, failure: HookError) -> (ServiceError, Option<Vec<String>>) {
        let (error, backtrace) = match failure {
            HookError::Service(error) => {
                let trace = error.backtrace().and_then(frames);
                (error, trace)
            }
            HookError::Unhandled(unhandled) => {
                let error = ServiceError::new(UnhandledException).with_details(json!({
                    "error_type": unhandled.error_type(),
                    "error_message": unhandled.message(),
                }));
                (error, frames(unhandled.backtrace()))
            }
        };

        if error.is_client_error() {
            tracing::debug!(code = error.code(), "request rejected");
        } else {
            tracing::warn!(code = error.code(), details = %error.details(), "request failed");
        }

        let trace = self
            .debug
            .then(|| backtrace.or_else(|| frames(&Backtrace::force_capture())))
            .flatten();
        (error, trace)
    }

    /// Flattened configuration a new invocation would see.
    pub fn options(&self) -> Options {
        self.config.flattened()
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("arity", &self.function.arity())
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Build the error envelope that becomes the output on the error path.
pub fn envelope(error: &ServiceError, trace: Option<Vec<String>>) -> Value {
    json!({
        "code": error.code(),
        "caused_by": error.cause(),
        "description": error.description(),
        "details": error.details(),
        "trace": trace,
    })
}

fn unclaimed(point: HookPoint) -> HookError {
    HookError::Service(
        ServiceError::new(StageUnhandled).with_details(json!({ "hook": point.as_str() })),
    )
}

async fn guarded<F>(future: F) -> HookResult
where
    F: Future<Output = HookResult>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(HookError::panic(payload)))
}

/// One entry per frame: `"N: symbol at file:line:col"`.
fn frames(backtrace: &Backtrace) -> Option<Vec<String>> {
    if backtrace.status() != BacktraceStatus::Captured {
        return None;
    }
    let mut frames: Vec<String> = Vec::new();
    let rendered = backtrace.to_string();
    for line in rendered.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match frames.last_mut() {
            Some(frame) if line.starts_with("at ") => {
                frame.push(' ');
                frame.push_str(line);
            }
            _ => frames.push(line.to_string()),
        }
    }
    Some(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compiler::HookMap, error::AccessDenied, session::MemorySession};
    use std::{convert::Infallible, sync::Mutex};

    fn respond_with_output() -> HookMap {
        HookMap::new()
            .on_sync("read_input", |ctx| {
                ctx.set_input(Value::Null);
                Ok(())
            })
            .on("call_function", |ctx| {
                Box::pin(async move {
                    let function = Arc::clone(ctx.function().unwrap());
                    let output = function.call(None).await?;
                    ctx.set_output(output);
                    Ok::<(), HookError>(())
                })
            })
            .on_sync("create_response", |ctx| {
                let body = serde_json::to_vec(ctx.output().unwrap_or(&Value::Null)).unwrap();
                let status: u16 = if ctx.is_assigned(Field::Error) { 500 } else { 200 };
                let response = http::Response::builder()
                    .status(status)
                    .body(body.into())
                    .unwrap();
                ctx.set_response(response);
                Ok(())
            })
    }

    fn method(plugins: PluginContainer) -> Method {
        Method::new(
            "ping",
            || async { Ok::<_, Infallible>("pong") },
            &ConfigNode::root(),
            Arc::new(plugins),
        )
    }

    async fn call(method: &Method) -> Result<Response, HookError> {
        method
            .call(Request::default(), Arc::new(MemorySession::new()))
            .await
    }

    fn body(response: &Response) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn success_path_runs_function() {
        let response = call(&method(PluginContainer::new().with(respond_with_output())))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(body(&response), json!("pong"));
    }

    #[tokio::test]
    async fn hooks_run_in_pipeline_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = HookMap::new();
        for point in HookPoint::ALL {
            let log = Arc::clone(&log);
            recorder = recorder.on_sync(point.as_str(), move |_| {
                log.lock().unwrap().push(point);
                Ok(())
            });
        }
        let plugins = PluginContainer::new()
            .with(respond_with_output())
            .with(recorder);

        call(&method(plugins)).await.unwrap();
        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            [
                HookPoint::StartRequest,
                HookPoint::CheckAccess,
                HookPoint::AfterCheckAccess,
                HookPoint::ReadInput,
                HookPoint::NormalizeInput,
                HookPoint::ValidateInput,
                HookPoint::CallFunction,
                HookPoint::ProcessOutput,
                HookPoint::CreateResponse,
                HookPoint::ProcessResponse,
                HookPoint::EndRequest,
            ]
        );
    }

    #[tokio::test]
    async fn access_denied_becomes_client_envelope() {
        let plugins = PluginContainer::new()
            .with(respond_with_output())
            .with(HookMap::new().on_sync("check_access", |_| {
                Err(ServiceError::new(AccessDenied).into())
            }));

        let response = call(&method(plugins)).await.unwrap();
        assert_eq!(response.status(), 500);
        let body = body(&response);
        assert_eq!(body["code"], "AccessDenied");
        assert_eq!(body["caused_by"], "client");
        assert_eq!(body["description"], "Access to the method was denied.");
        assert!(body["details"].is_null());
        assert!(body["trace"].is_null());
    }

    #[tokio::test]
    async fn unclaimed_chain_stage_fails_closed() {
        let plugins = PluginContainer::new().with(HookMap::new().on_sync(
            "create_response",
            |ctx| {
                ctx.set_response(Response::new(
                    serde_json::to_vec(ctx.output().unwrap()).unwrap().into(),
                ));
                Ok(())
            },
        ));

        let response = call(&method(plugins)).await.unwrap();
        let body = body(&response);
        assert_eq!(body["code"], "StageUnhandled");
        assert_eq!(body["details"]["hook"], "read_input");
    }

    #[tokio::test]
    async fn panics_are_reported_as_unhandled() {
        let plugins = PluginContainer::new()
            .with(respond_with_output())
            .with(HookMap::new().on_sync("validate_input", |_| panic!("kaboom")));

        let method = method(plugins).with_debug(true);
        let body = body(&call(&method).await.unwrap());
        assert_eq!(body["code"], "UnhandledException");
        assert_eq!(body["caused_by"], "server");
        assert_eq!(body["details"]["error_type"], "panic");
        assert_eq!(body["details"]["error_message"], "kaboom");
        assert!(body["trace"].is_array());
    }

    #[tokio::test]
    async fn failure_during_error_handling_surfaces_after_teardown() {
        let ended = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ended);
        let plugins = PluginContainer::new()
            .with(respond_with_output())
            .with(
                HookMap::new()
                    .on_sync("check_access", |_| Err(ServiceError::new(AccessDenied).into()))
                    .on_sync("process_error", |_| Err(ServiceError::new(StageUnhandled).into()))
                    .on_sync("end_request", move |_| {
                        *flag.lock().unwrap() = true;
                        Ok(())
                    }),
            );

        let err = call(&method(plugins)).await.unwrap_err();
        assert!(err.is::<StageUnhandled>());
        assert!(*ended.lock().unwrap());
    }

    #[tokio::test]
    async fn failing_process_response_still_ends_request() {
        let ended = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ended);
        let plugins = PluginContainer::new()
            .with(respond_with_output())
            .with(
                HookMap::new()
                    .on_sync("process_response", |_| panic!("header write failed"))
                    .on_sync("end_request", move |_| {
                        *flag.lock().unwrap() = true;
                        Ok(())
                    }),
            );

        match call(&method(plugins)).await.unwrap_err() {
            HookError::Unhandled(u) => assert_eq!(u.message(), "header write failed"),
            other => panic!("expected unhandled, got {other:?}"),
        }
        assert!(*ended.lock().unwrap());
    }

    #[tokio::test]
    async fn classified_error_trace_starts_where_it_was_raised() {
        let plugins = PluginContainer::new()
            .with(respond_with_output())
            .with(HookMap::new().on_sync("check_access", |_| {
                Err(ServiceError::new(AccessDenied).into())
            }));

        let method = method(plugins).with_debug(true);
        let body = body(&call(&method).await.unwrap());
        let trace: Vec<String> = serde_json::from_value(body["trace"].clone()).unwrap();
        assert!(!trace.is_empty());
        assert!(!trace.iter().any(|frame| frame.contains("classify")));
    }

    #[test]
    fn each_frame_is_one_entry() {
        let frames = frames(&Backtrace::force_capture()).unwrap();
        assert!(!frames.is_empty());
        for frame in &frames {
            let (index, _) = frame.split_once(':').unwrap();
            assert!(index.parse::<usize>().is_ok(), "{frame}");
        }
    }

    #[tokio::test]
    async fn response_assigned_before_failure_is_replaced() {
        let plugins = PluginContainer::new()
            .with(respond_with_output())
            .with(
                HookMap::new()
                    .on_sync("start_request", |ctx| {
                        ctx.set_response(Response::new("stale".into()));
                        Ok(())
                    })
                    .on_sync("check_access", |_| Err(ServiceError::new(AccessDenied).into())),
            );

        let response = call(&method(plugins)).await.unwrap();
        assert_eq!(body(&response)["code"], "AccessDenied");
    }

    #[test]
    fn stage_hooks_cover_every_point() {
        let mut seen: Vec<_> = Stage::PRIMARY
            .into_iter()
            .chain([Stage::ErrorHandling, Stage::Finalization])
            .flat_map(|s| s.hooks().iter().copied())
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen, HookPoint::ALL);
    }
}
