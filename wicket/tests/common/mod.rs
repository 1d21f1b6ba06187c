#![allow(dead_code)]

use serde::Deserialize;
use serde_json::Value;
use std::{convert::Infallible, sync::Arc};
use wicket::{
    Context, HookResult, Hooks, MemorySession, Plugin, Response, Service,
    plugins::CSRF_HEADER,
    testing::{post, post_with_header, response_json},
};

// ============================================================================
// Tracing
// ============================================================================

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Test Functions
// ============================================================================

#[derive(Deserialize)]
pub struct Greeting {
    pub name: String,
}

pub async fn hello(greeting: Greeting) -> Result<String, Infallible> {
    Ok(format!("Hello, {}!", greeting.name))
}

pub async fn ping() -> Result<&'static str, Infallible> {
    Ok("pong")
}

// ============================================================================
// Test Plugins
// ============================================================================

/// Appends `|<label>` to a string input at `normalize_input`.
pub struct Label(pub &'static str);

impl Plugin for Label {
    fn implemented(&self) -> Hooks {
        Hooks::NORMALIZE_INPUT
    }

    async fn normalize_input(&self, ctx: &mut Context) -> HookResult {
        if let Some(Value::String(input)) = ctx.input_mut() {
            input.push('|');
            input.push_str(self.0);
        }
        Ok(())
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// Calls a service the way a browser would: one session, and the CSRF
/// token of the last response sent back with the next request.
pub struct TestClient {
    service: Service,
    session: Arc<MemorySession>,
    token: Option<String>,
}

impl TestClient {
    pub fn new(service: Service) -> Self {
        Self {
            service,
            session: Arc::new(MemorySession::new()),
            token: None,
        }
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn session(&self) -> &Arc<MemorySession> {
        &self.session
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Forget the current token.
    pub fn drop_token(&mut self) {
        self.token = None;
    }

    /// Bootstrap a token.
    pub async fn ping(&mut self) -> Response {
        self.send("/ping", "").await
    }

    /// Post `body` to `path` and return the response.
    pub async fn send(&mut self, path: &str, body: &str) -> Response {
        let request = match &self.token {
            Some(token) => post_with_header(path, body.to_owned(), CSRF_HEADER, token),
            None => post(path, body.to_owned()),
        };
        let response = self
            .service
            .handle(request, self.session.clone())
            .await
            .expect("route exists")
            .expect("pipeline completes");
        if let Some(token) = response.headers().get(CSRF_HEADER) {
            self.token = Some(token.to_str().unwrap().to_owned());
        }
        response
    }

    /// Post `body` to `path` and decode the JSON response.
    pub async fn call(&mut self, path: &str, body: &str) -> (u16, Value) {
        let response = self.send(path, body).await;
        (response.status().as_u16(), response_json(&response))
    }
}
