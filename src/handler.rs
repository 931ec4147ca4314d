//! Procedure handlers and type erasure.
//!
//! # How typed handlers are stored
//!
//! The route table holds procedures whose handlers all have *different*
//! types: different closures, different input types, different output
//! types. Rust collections hold one concrete type, so each handler is
//! wrapped in a newtype that speaks JSON on both sides and stored behind
//! `dyn ErasedHandler`.
//!
//! ```text
//! |input: NewUser, ctx| async { Ok(user) }         ← user writes this
//!        ↓ .mutation(handler)
//! Arc::new(FnHandler::new(handler))                ← heap-allocated wrapper
//!        ↓ stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(value, ctx) at request time         ← one vtable dispatch
//!        ↓
//! from_value::<NewUser>(value)? → handler → to_value(output)
//! ```
//!
//! By the time a handler runs, its schema has already accepted the input,
//! so the `from_value` step only fails if the schema and the handler's
//! input type disagree. That failure is still reported as a validation
//! error (400), never as a panic.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::Context;
use crate::error::ProcedureError;

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` let tokio move the future across worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Internal dispatch interface.
pub(crate) trait ErasedHandler: Send + Sync + 'static {
    fn call(&self, input: Value, ctx: Context) -> BoxFuture<Result<Value, ProcedureError>>;
}

/// A type-erased handler shared across concurrent requests.
pub(crate) type BoxedHandler = Arc<dyn ErasedHandler>;

/// Newtype that holds a concrete handler `F` and bridges the typed world to
/// the JSON world.
///
/// `fn() -> (I, O)` keeps the wrapper `Send + Sync` regardless of `I`/`O`.
struct FnHandler<F, I, O> {
    f: F,
    _types: PhantomData<fn() -> (I, O)>,
}

impl<F, Fut, I, O> ErasedHandler for FnHandler<F, I, O>
where
    F: Fn(I, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ProcedureError>> + Send + 'static,
    I: DeserializeOwned + 'static,
    O: Serialize + 'static,
{
    fn call(&self, input: Value, ctx: Context) -> BoxFuture<Result<Value, ProcedureError>> {
        // Decode before boxing: a bad input never reaches the handler.
        let input = match serde_json::from_value::<I>(input) {
            Ok(input) => input,
            Err(e) => return Box::pin(std::future::ready(Err(e.into()))),
        };
        let fut = (self.f)(input, ctx);
        Box::pin(async move {
            let output = fut.await?;
            serde_json::to_value(&output).map_err(ProcedureError::internal)
        })
    }
}

pub(crate) fn boxed<F, Fut, I, O>(f: F) -> BoxedHandler
where
    F: Fn(I, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ProcedureError>> + Send + 'static,
    I: DeserializeOwned + 'static,
    O: Serialize + 'static,
{
    Arc::new(FnHandler { f, _types: PhantomData })
}
