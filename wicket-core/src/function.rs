//! Adapting plain async functions into pipeline functions.
//!
//! The exposed function takes zero or one JSON-decoded argument and returns a
//! serializable value. [`IntoFunction`] erases such closures into an
//! `Arc<dyn Function>`, which the context carries and the call-function
//! plugin invokes.

use crate::{
    error::{HookError, ImplementationError, ServiceError},
    hook::BoxFuture,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{future::Future, marker::PhantomData, sync::Arc};

crate::service_error! {
    /// The request payload does not match the parameter type of the method.
    pub struct InvalidInput: Client;
}

/// How many arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No argument.
    None,
    /// Exactly one argument.
    Required,
    /// One argument with a default, so it may be omitted.
    Optional,
}

/// A type-erased exposed function.
pub trait Function: Send + Sync + 'static {
    /// Argument shape.
    fn arity(&self) -> Arity;

    /// Invoke with the (already normalized) input.
    ///
    /// `None` means no input was supplied.
    fn call(&self, input: Option<Value>) -> BoxFuture<'_, Result<Value, HookError>>;
}

/// Conversion into an `Arc<dyn Function>`.
///
/// Implemented for async closures and functions taking no argument or one
/// deserializable argument, and for [`optional`] wrappers.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be exposed as a JSON method",
    label = "not a supported function signature",
    note = "Expected `async fn() -> Result<O, E>`, `async fn(A) -> Result<O, E>`, or `optional(async fn(Option<A>) -> Result<O, E>)`."
)]
pub trait IntoFunction<Marker>: Sized {
    /// Erase into a shared function object.
    fn into_function(self) -> Arc<dyn Function>;
}

/// Marker for functions that are already erased.
#[doc(hidden)]
pub struct Erased;

/// Marker for [`optional`] functions.
#[doc(hidden)]
pub struct Defaulted<A>(PhantomData<fn(A)>);

impl IntoFunction<Erased> for Arc<dyn Function> {
    fn into_function(self) -> Arc<dyn Function> {
        self
    }
}

struct Nullary<F> {
    f: F,
}

struct Unary<F, A> {
    f: F,
    _input: PhantomData<fn(A)>,
}

/// Wrapper marking the function's argument as having a default.
///
/// Created by [`optional`].
pub struct WithDefault<F> {
    f: F,
}

/// Expose a function whose single argument may be omitted.
///
/// The function receives `None` when the request carries no input.
pub fn optional<F>(f: F) -> WithDefault<F> {
    WithDefault { f }
}

impl<F, Fut, O, E> Function for Nullary<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Serialize + Send + 'static,
    E: Send + 'static,
    HookError: From<E>,
{
    fn arity(&self) -> Arity {
        Arity::None
    }

    fn call(&self, input: Option<Value>) -> BoxFuture<'_, Result<Value, HookError>> {
        let _ = input;
        let future = (self.f)();
        Box::pin(async move { encode(future.await?) })
    }
}

impl<F, A, Fut, O, E> Function for Unary<F, A>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Serialize + Send + 'static,
    E: Send + 'static,
    HookError: From<E>,
{
    fn arity(&self) -> Arity {
        Arity::Required
    }

    fn call(&self, input: Option<Value>) -> BoxFuture<'_, Result<Value, HookError>> {
        let future = decode::<A>(input.unwrap_or(Value::Null)).map(|arg| (self.f)(arg));
        Box::pin(async move { encode(future?.await?) })
    }
}

struct DefaultedFn<F, A> {
    f: F,
    _input: PhantomData<fn(A)>,
}

impl<F, A, Fut, O, E> Function for DefaultedFn<F, A>
where
    F: Fn(Option<A>) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Serialize + Send + 'static,
    E: Send + 'static,
    HookError: From<E>,
{
    fn arity(&self) -> Arity {
        Arity::Optional
    }

    fn call(&self, input: Option<Value>) -> BoxFuture<'_, Result<Value, HookError>> {
        let future = input
            .filter(|value| !value.is_null())
            .map(decode::<A>)
            .transpose()
            .map(|arg| (self.f)(arg));
        Box::pin(async move { encode(future?.await?) })
    }
}

impl<F, Fut, O, E> IntoFunction<()> for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Serialize + Send + 'static,
    E: Send + 'static,
    HookError: From<E>,
{
    fn into_function(self) -> Arc<dyn Function> {
        Arc::new(Nullary { f: self })
    }
}

impl<F, A, Fut, O, E> IntoFunction<(A,)> for F
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Serialize + Send + 'static,
    E: Send + 'static,
    HookError: From<E>,
{
    fn into_function(self) -> Arc<dyn Function> {
        Arc::new(Unary {
            f: self,
            _input: PhantomData,
        })
    }
}

impl<F, A, Fut, O, E> IntoFunction<Defaulted<A>> for WithDefault<F>
where
    F: Fn(Option<A>) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Serialize + Send + 'static,
    E: Send + 'static,
    HookError: From<E>,
{
    fn into_function(self) -> Arc<dyn Function> {
        Arc::new(DefaultedFn {
            f: self.f,
            _input: PhantomData,
        })
    }
}

fn decode<A: DeserializeOwned>(input: Value) -> Result<A, HookError> {
    serde_json::from_value(input).map_err(|err| {
        ServiceError::new(InvalidInput)
            .with_details(json!({ "message": err.to_string() }))
            .into()
    })
}

fn encode<O: Serialize>(output: O) -> Result<Value, HookError> {
    serde_json::to_value(output).map_err(|err| {
        ServiceError::new(ImplementationError)
            .with_details(json!({ "message": format!("unserializable output: {err}") }))
            .into()
    })
}
