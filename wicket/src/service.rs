//! The registration surface.
//!
//! A [`Service`] owns the service-level configuration node, the shared plugin
//! container and the table of registered methods. The host's HTTP router
//! looks methods up by path and passes each request and session in.

use indexmap::IndexMap;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use wicket_core::{
    ConfigError, ConfigNode, Context, Field, HookError, HookPoint, IntoFunction, IntoPlugin,
    Method, Options, Plugin, PluginContainer, Request, Response, ServiceError, Session,
    StageUnhandled, is_valid_name,
};

/// Rule answered by [`Service::ping`].
pub const PING_RULE: &str = "/ping";

/// Errors raised while registering methods.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// Another method already answers this rule.
    #[error("route already registered: {0}")]
    DuplicateRoute(String),
    /// The rule or method name is malformed.
    #[error("invalid route: {0}")]
    InvalidRoute(String),
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Service`].
///
/// # Example
///
/// ```rust,ignore
/// let mut service = Service::builder()
///     .plugin(AuthPlugin)
///     .option("csrf", false)?
///     .debug(true)
///     .build();
/// service.register("hello", hello)?;
/// ```
pub struct ServiceBuilder {
    config: Arc<ConfigNode>,
    plugins: PluginContainer,
    debug: bool,
}

impl ServiceBuilder {
    /// Start with the default plugin set.
    pub fn new() -> Self {
        let mut plugins = PluginContainer::new();
        wicket_std::plugins::register_defaults(&mut plugins);
        Self::with_container(plugins)
    }

    /// Start with no plugins at all.
    pub fn bare() -> Self {
        Self::with_container(PluginContainer::new())
    }

    fn with_container(plugins: PluginContainer) -> Self {
        Self {
            config: ConfigNode::root(),
            plugins,
            debug: false,
        }
    }

    /// Register a plugin after the ones already present.
    pub fn plugin(mut self, plugin: impl IntoPlugin) -> Self {
        self.plugins.add(plugin);
        self
    }

    /// Register a plugin instance the caller keeps a handle to.
    pub fn shared_plugin<P: Plugin>(mut self, plugin: Arc<P>) -> Self {
        self.plugins.add_shared(plugin);
        self
    }

    /// Set a service-level option.
    pub fn option(self, name: &str, value: impl Into<Value>) -> Result<Self, ConfigError> {
        self.config.set(name, value)?;
        Ok(self)
    }

    /// Set several service-level options at once.
    pub fn options<I, K, V>(self, options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.config.configure(options)?;
        Ok(self)
    }

    /// Include stack traces in error envelopes.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Freeze the plugin set and build the service.
    pub fn build(self) -> Service {
        tracing::debug!(plugins = ?self.plugins, debug = self.debug, "service built");
        Service {
            config: self.config,
            plugins: Arc::new(self.plugins),
            debug: self.debug,
            methods: IndexMap::new(),
        }
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBuilder")
            .field("plugins", &self.plugins)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Service
// ============================================================================

/// A set of JSON methods sharing one plugin container and one root
/// configuration.
pub struct Service {
    config: Arc<ConfigNode>,
    plugins: Arc<PluginContainer>,
    debug: bool,
    methods: IndexMap<String, Arc<Method>>,
}

impl Service {
    /// Start building a service with the default plugins.
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    /// The service-level configuration node.
    pub fn config(&self) -> &Arc<ConfigNode> {
        &self.config
    }

    /// Set service-level options.
    ///
    /// Methods read the new values on their next invocation.
    pub fn configure<I, K, V>(&self, options: I) -> Result<&Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.config.configure(options)?;
        Ok(self)
    }

    /// The shared plugin container.
    pub fn plugins(&self) -> &Arc<PluginContainer> {
        &self.plugins
    }

    /// Whether error envelopes carry stack traces.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Register `function` as method `name`, answering `/<name>`.
    pub fn register<M>(
        &mut self,
        name: &str,
        function: impl IntoFunction<M>,
    ) -> Result<Arc<Method>, RegistrationError> {
        if !is_valid_name(name) {
            return Err(RegistrationError::InvalidRoute(name.to_owned()));
        }
        self.register_at(&format!("/{name}"), name, function)
    }

    /// Register `function` as method `name` under an explicit rule.
    pub fn register_at<M>(
        &mut self,
        rule: &str,
        name: &str,
        function: impl IntoFunction<M>,
    ) -> Result<Arc<Method>, RegistrationError> {
        if !is_valid_rule(rule) {
            return Err(RegistrationError::InvalidRoute(rule.to_owned()));
        }
        if rule == PING_RULE || self.methods.contains_key(rule) {
            return Err(RegistrationError::DuplicateRoute(rule.to_owned()));
        }

        let method = Arc::new(
            Method::new(name, function, &self.config, Arc::clone(&self.plugins))
                .with_debug(self.debug),
        );
        tracing::debug!(rule, method = name, "registered method");
        self.methods.insert(rule.to_owned(), Arc::clone(&method));
        Ok(method)
    }

    /// The method answering `path`.
    pub fn route(&self, path: &str) -> Option<&Arc<Method>> {
        self.methods.get(path)
    }

    /// Registered `(rule, method)` pairs in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &Arc<Method>)> {
        self.methods.iter().map(|(rule, m)| (rule.as_str(), m))
    }

    /// Route `request` by its path and run it.
    ///
    /// [`PING_RULE`] is answered by [`ping`](Self::ping). Returns `None`
    /// when nothing answers the path.
    pub async fn handle(
        &self,
        request: Request,
        session: Arc<dyn Session>,
    ) -> Option<Result<Response, HookError>> {
        let path = request.uri().path().to_owned();
        if path == PING_RULE {
            return Some(self.ping(request, session).await);
        }
        let method = self.route(&path)?;
        Some(method.call(request, session).await)
    }

    /// Answer `"pong"` without access checks.
    ///
    /// Runs only the `create_response` chain and `process_response`, so
    /// plugins that finalize responses (such as CSRF token issuing) still
    /// apply. Clients call this once to bootstrap.
    pub async fn ping(
        &self,
        request: Request,
        session: Arc<dyn Session>,
    ) -> Result<Response, HookError> {
        let span = tracing::debug_span!("ping");
        async move {
            let mut ctx = Context::new(request, session);
            ctx.set_config(self.config.flattened());
            ctx.set_output(json!("pong"));

            self.plugins
                .call_one(&mut ctx, HookPoint::CreateResponse, Field::Response)
                .await?;
            self.plugins
                .call_all(&mut ctx, HookPoint::ProcessResponse)
                .await?;

            ctx.take_response().ok_or_else(|| {
                ServiceError::new(StageUnhandled)
                    .with_details(json!({ "hook": HookPoint::CreateResponse.as_str() }))
                    .into()
            })
        }
        .instrument(span)
        .await
    }

    /// Flattened service-level options.
    pub fn options(&self) -> Options {
        self.config.flattened()
    }
}

impl Default for Service {
    fn default() -> Self {
        ServiceBuilder::new().build()
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("plugins", &self.plugins)
            .field("routes", &self.methods.keys().collect::<Vec<_>>())
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

fn is_valid_rule(rule: &str) -> bool {
    rule.len() > 1 && rule.starts_with('/') && !rule.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use wicket_core::MemorySession;
    use wicket_std::testing::{post, response_json};

    async fn hello() -> Result<&'static str, Infallible> {
        Ok("hello")
    }

    #[test]
    fn register_mounts_under_name() {
        let mut service = ServiceBuilder::bare().build();
        service.register("hello", hello).unwrap();

        let method = service.route("/hello").unwrap();
        assert_eq!(method.name(), "hello");
        assert_eq!(service.routes().map(|(r, _)| r).collect::<Vec<_>>(), ["/hello"]);
    }

    #[test]
    fn duplicate_and_invalid_routes_are_rejected() {
        let mut service = ServiceBuilder::bare().build();
        service.register("hello", hello).unwrap();

        assert_eq!(
            service.register("hello", hello).unwrap_err(),
            RegistrationError::DuplicateRoute("/hello".into())
        );
        assert_eq!(
            service.register("ping", hello).unwrap_err(),
            RegistrationError::DuplicateRoute("/ping".into())
        );
        assert_eq!(
            service.register("not valid", hello).unwrap_err(),
            RegistrationError::InvalidRoute("not valid".into())
        );
        assert_eq!(
            service.register_at("hello", "hello", hello).unwrap_err(),
            RegistrationError::InvalidRoute("hello".into())
        );
    }

    #[test]
    fn method_config_inherits_service_config() {
        let mut service = ServiceBuilder::bare()
            .option("csrf", false)
            .unwrap()
            .build();
        let method = service.register("hello", hello).unwrap();
        method.configure([("normalize", false)]).unwrap();

        let options = method.options();
        assert!(!options.flag("csrf", true));
        assert!(!options.flag("normalize", true));
        assert!(!service.options().contains("normalize"));
    }

    #[test]
    fn invalid_option_name_is_rejected() {
        let err = ServiceBuilder::bare().option("1st", true).unwrap_err();
        assert_eq!(err, ConfigError::InvalidName("1st".into()));
    }

    #[test]
    fn builder_debug_lists_plugins() {
        let builder = ServiceBuilder::new().debug(true);
        let rendered = format!("{builder:?}");
        assert!(rendered.starts_with("ServiceBuilder"));
        assert!(rendered.contains("csrf"));
        assert!(rendered.contains("debug: true"));
    }

    #[test]
    fn defaults_are_registered_in_order() {
        let service = Service::default();
        assert_eq!(
            service.plugins().names().collect::<Vec<_>>(),
            ["csrf", "json_input", "normalize_input", "call_function", "json_output"]
        );
    }

    #[tokio::test]
    async fn handle_unknown_path_is_none() {
        let service = ServiceBuilder::bare().build();
        let session = Arc::new(MemorySession::new());
        assert!(service.handle(post("/nope", ""), session).await.is_none());
    }

    #[tokio::test]
    async fn ping_without_response_plugin_is_unclaimed() {
        let service = ServiceBuilder::bare().build();
        let err = service
            .ping(post(PING_RULE, ""), Arc::new(MemorySession::new()))
            .await
            .unwrap_err();
        assert!(err.is::<StageUnhandled>());
    }

    #[tokio::test]
    async fn ping_answers_pong() {
        let service = Service::default();
        let response = service
            .ping(post(PING_RULE, ""), Arc::new(MemorySession::new()))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response_json(&response), json!("pong"));
    }
}
