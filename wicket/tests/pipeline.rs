//! End-to-end pipeline behaviour through a [`Service`].

mod common;

use common::{Greeting, Label, TestClient, hello, init_tracing, ping};
use serde_json::{Value, json};
use std::{
    convert::Infallible,
    sync::{Arc, Mutex},
};
use wicket::{
    Context, Field, HookError, HookMap, HookPoint, HookResult, Hooks, MemorySession, Plugin,
    PluginContainer, Request, Service, ServiceBuilder, optional,
    testing::{CallLog, RecordingPlugin, post, response_json},
};

fn unguarded() -> ServiceBuilder {
    Service::builder().option("csrf", false).unwrap()
}

// ============================================================================
// Dispatch Conventions
// ============================================================================

#[tokio::test]
async fn broadcast_appends_labels_in_registration_order() {
    let container = PluginContainer::new()
        .with(Label("A"))
        .with(Label("B"))
        .with(Label("C"));

    let mut ctx = Context::new(Request::default(), Arc::new(MemorySession::new()));
    ctx.set_input(json!("START"));
    container
        .call_all(&mut ctx, HookPoint::NormalizeInput)
        .await
        .unwrap();

    assert_eq!(ctx.input(), Some(&json!("START|A|B|C")));
}

#[tokio::test]
async fn chain_of_command_stops_at_first_assignment() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let reader = |label: &'static str, assigns: bool| {
        let seen = Arc::clone(&seen);
        HookMap::new().on_sync("read_input", move |ctx| {
            seen.lock().unwrap().push(label);
            if assigns {
                ctx.set_input(json!(label));
            }
            Ok(())
        })
    };
    let container = PluginContainer::new()
        .with(reader("A", false))
        .with(reader("B", true))
        .with(reader("C", false));

    let mut ctx = Context::new(Request::default(), Arc::new(MemorySession::new()));
    container
        .call_one(&mut ctx, HookPoint::ReadInput, Field::Input)
        .await
        .unwrap();

    assert_eq!(ctx.input(), Some(&json!("B")));
    assert_eq!(*seen.lock().unwrap(), ["C", "B"]);
}

#[tokio::test]
async fn null_assignment_stops_the_chain() {
    let container = PluginContainer::new()
        .with(HookMap::new().on_sync("read_input", |_| {
            panic!("older reader must not run");
        }))
        .with(HookMap::new().on_sync("read_input", |ctx| {
            ctx.set_input(Value::Null);
            Ok(())
        }));

    let mut ctx = Context::new(Request::default(), Arc::new(MemorySession::new()));
    container
        .call_one(&mut ctx, HookPoint::ReadInput, Field::Input)
        .await
        .unwrap();
    assert!(ctx.is_assigned(Field::Input));
}

// ============================================================================
// Function Arity
// ============================================================================

#[tokio::test]
async fn required_argument_is_enforced() {
    init_tracing();
    let mut service = unguarded().build();
    service.register("hello", hello).unwrap();
    let mut client = TestClient::new(service);

    let (status, body) = client.call("/hello", r#"{"name": "  Ada  "}"#).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!("Hello, Ada!"));

    let (status, body) = client.call("/hello", "").await;
    assert_eq!(status, 500);
    assert_eq!(body["code"], "MissingInput");
    assert_eq!(body["caused_by"], "client");
}

#[tokio::test]
async fn unexpected_argument_is_rejected() {
    let mut service = unguarded().build();
    service.register("status", ping).unwrap();
    let mut client = TestClient::new(service);

    let (_, body) = client.call("/status", "").await;
    assert_eq!(body, json!("pong"));

    let (status, body) = client.call("/status", r#"{"verbose": true}"#).await;
    assert_eq!(status, 500);
    assert_eq!(body["code"], "UnexpectedInput");
    assert_eq!(body["caused_by"], "client");
}

#[tokio::test]
async fn optional_argument_may_be_omitted() {
    let mut service = unguarded().build();
    service
        .register(
            "greet",
            optional(|greeting: Option<Greeting>| async move {
                let name = greeting.map_or_else(|| "world".to_owned(), |g| g.name);
                Ok::<_, Infallible>(format!("Hello, {name}!"))
            }),
        )
        .unwrap();
    let mut client = TestClient::new(service);

    assert_eq!(client.call("/greet", "").await.1, json!("Hello, world!"));
    assert_eq!(
        client.call("/greet", r#"{"name": "Ada"}"#).await.1,
        json!("Hello, Ada!")
    );
}

#[tokio::test]
async fn undecodable_argument_is_invalid_input() {
    let mut service = unguarded().build();
    service.register("hello", hello).unwrap();
    let mut client = TestClient::new(service);

    let (_, body) = client.call("/hello", r#"{"nom": "Ada"}"#).await;
    assert_eq!(body["code"], "InvalidInput");
    assert_eq!(body["caused_by"], "client");
    assert!(body["details"]["message"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn non_json_body_is_rejected() {
    let mut service = unguarded().build();
    service.register("hello", hello).unwrap();
    let mut client = TestClient::new(service);

    let (status, body) = client.call("/hello", "name=Ada").await;
    assert_eq!(status, 500);
    assert_eq!(body["code"], "NonJsonInput");
    assert_eq!(body["caused_by"], "client");
}

// ============================================================================
// Unhandled Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
#[error("the disk is full")]
struct DiskFull;

async fn save() -> Result<(), DiskFull> {
    Err(DiskFull)
}

#[tokio::test]
async fn unhandled_error_keeps_type_and_message() {
    let mut service = unguarded().build();
    service.register("save", save).unwrap();
    let mut client = TestClient::new(service);

    let (status, body) = client.call("/save", "").await;
    assert_eq!(status, 500);
    assert_eq!(body["code"], "UnhandledException");
    assert_eq!(body["caused_by"], "server");
    assert_eq!(
        body["details"],
        json!({ "error_type": "DiskFull", "error_message": "the disk is full" })
    );
    assert_eq!(body["trace"], Value::Null);
}

#[tokio::test]
async fn debug_mode_includes_trace() {
    let mut service = unguarded().debug(true).build();
    service.register("save", save).unwrap();
    let mut client = TestClient::new(service);

    let (_, body) = client.call("/save", "").await;
    let frames = body["trace"].as_array().expect("trace frames");
    assert!(!frames.is_empty());
    assert!(frames.iter().all(Value::is_string));
    // Source locations stay with their frame.
    assert!(!frames.iter().any(|f| f.as_str().is_some_and(|f| f.starts_with("at "))));
}

#[tokio::test]
async fn description_comes_from_error_docs() {
    let mut service = Service::builder()
        .plugin(HookMap::new().on_sync("check_access", |_| {
            Err(wicket::ServiceError::new(wicket::AccessDenied).into())
        }))
        .option("csrf", false)
        .unwrap()
        .build();
    service.register("status", ping).unwrap();
    let mut client = TestClient::new(service);

    let (_, body) = client.call("/status", "").await;
    assert_eq!(
        body,
        json!({
            "code": "AccessDenied",
            "caused_by": "client",
            "description": "Access to the method was denied.",
            "details": null,
            "trace": null,
        })
    );
}

// ============================================================================
// Stage Ordering
// ============================================================================

#[tokio::test]
async fn every_stage_runs_once_on_success() {
    let log = CallLog::default();
    let mut service = unguarded()
        .plugin(RecordingPlugin::new("rec", &log))
        .build();
    service.register("status", ping).unwrap();

    let response = service
        .handle(post("/status", ""), Arc::new(MemorySession::new()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response_json(&response), json!("pong"));

    let points: Vec<_> = log.lock().unwrap().iter().map(|(_, p)| *p).collect();
    // The recorder is newest, so it is asked first at chain-of-command
    // points and declines.
    let expected: Vec<_> = HookPoint::ALL
        .into_iter()
        .filter(|p| *p != HookPoint::ProcessError)
        .collect();
    assert_eq!(points, expected);
}

#[tokio::test]
async fn failure_skips_to_error_handling_and_teardown() {
    let log = CallLog::default();
    let mut service = unguarded()
        .plugin(RecordingPlugin::new("rec", &log))
        .build();
    service.register("hello", hello).unwrap();

    let response = service
        .handle(post("/hello", ""), Arc::new(MemorySession::new()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response_json(&response)["code"], "MissingInput");

    let points: Vec<_> = log.lock().unwrap().iter().map(|(_, p)| *p).collect();
    assert_eq!(
        points,
        [
            HookPoint::StartRequest,
            HookPoint::CheckAccess,
            HookPoint::AfterCheckAccess,
            HookPoint::ReadInput,
            HookPoint::NormalizeInput,
            HookPoint::ValidateInput,
            HookPoint::CallFunction,
            HookPoint::CreateResponse,
            HookPoint::ProcessError,
            HookPoint::ProcessResponse,
            HookPoint::EndRequest,
        ]
    );
}

struct Teardown {
    ended: Arc<Mutex<bool>>,
}

impl Plugin for Teardown {
    fn implemented(&self) -> Hooks {
        Hooks::PROCESS_ERROR | Hooks::END_REQUEST
    }

    async fn process_error(&self, _ctx: &mut Context) -> HookResult {
        Err(HookError::unhandled("ReportingFailed", "error sink unavailable"))
    }

    async fn end_request(&self, _ctx: &mut Context) -> HookResult {
        *self.ended.lock().unwrap() = true;
        Ok(())
    }
}

#[tokio::test]
async fn error_handling_failure_surfaces_after_teardown() {
    let ended = Arc::new(Mutex::new(false));
    let mut service = unguarded()
        .plugin(Teardown {
            ended: Arc::clone(&ended),
        })
        .build();
    service.register("save", save).unwrap();

    let err = service
        .handle(post("/save", ""), Arc::new(MemorySession::new()))
        .await
        .unwrap()
        .unwrap_err();
    match err {
        HookError::Unhandled(u) => assert_eq!(u.error_type(), "ReportingFailed"),
        other => panic!("expected unhandled error, got {other:?}"),
    }
    assert!(*ended.lock().unwrap());
}

#[tokio::test]
async fn start_request_may_rewrite_options() {
    let mut service = Service::builder()
        .plugin(HookMap::new().on_sync("start_request", |ctx| {
            if let Some(config) = ctx.config_mut() {
                config.insert("csrf", false);
            }
            Ok(())
        }))
        .build();
    service.register("status", ping).unwrap();
    let mut client = TestClient::new(service);

    // No token was ever issued, but the plugin switched the check off.
    assert_eq!(client.call("/status", "").await.1, json!("pong"));
}
