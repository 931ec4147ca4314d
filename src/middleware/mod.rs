//! Middleware and the chain executor.
//!
//! A middleware sees the request's current [`Context`] and a [`Next`]
//! continuation (which also exposes the request itself, read-only). It does
//! exactly one of:
//!
//! - `Ok(next.call(ctx))` to continue, possibly with a new context;
//! - `Ok(Flow::Respond(response))` to end the request with `response`;
//! - `Err(..)` to fail the request (400 for validation errors, 500 otherwise).
//!
//! ```rust
//! use minirpc::middleware::{Flow, Next};
//! use minirpc::{Context, ProcedureError, Response};
//! use http::StatusCode;
//! use serde_json::json;
//!
//! async fn require_user(ctx: Context, next: Next) -> Result<Flow, ProcedureError> {
//!     let token = next.request().header("authorization").map(str::to_owned);
//!     match token {
//!         Some(token) => Ok(next.call(ctx.with("user", token))),
//!         None => Ok(Response::error(StatusCode::UNAUTHORIZED, json!("Unauthorized")).into()),
//!     }
//! }
//! ```
//!
//! Middleware is not an onion: `Next::call` does not run the rest of the
//! chain, it only records the context the next step starts from. The
//! executor runs the steps one after another and the handler last.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::debug;

use crate::context::Context;
use crate::error::ProcedureError;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// What a middleware step decided.
#[derive(Debug)]
pub enum Flow {
    /// Move on. Only meaningful when produced by [`Next::call`].
    Continue,
    /// Stop here and send this response. No later middleware and no handler run.
    Respond(Response),
}

/// `Ok(StatusCode::FORBIDDEN.into())`, `Ok((status, body).into())` and
/// `Ok(response.into())` all short-circuit.
impl<R: IntoResponse> From<R> for Flow {
    fn from(res: R) -> Self {
        Flow::Respond(res.into_response())
    }
}

/// The continuation handed to each middleware.
///
/// Consumed by [`call`](Next::call), so a step can advance at most once.
#[derive(Debug)]
pub struct Next {
    tx: oneshot::Sender<Context>,
    request: Arc<Request>,
}

impl Next {
    /// The request being served: method, path, headers and raw body.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Continue the chain; the next middleware (or the handler) sees `ctx`.
    pub fn call(self, ctx: Context) -> Flow {
        // The receiver outlives every middleware call; a send error would
        // mean the step outlived its own chain, and there is nothing to advance.
        let _ = self.tx.send(ctx);
        Flow::Continue
    }
}

/// A single middleware step.
///
/// Implemented for every `async fn(Context, Next) -> Result<Flow, ProcedureError>`
/// and matching closure. Implement it by hand for middleware that carries state.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, ctx: Context, next: Next) -> BoxFuture<Result<Flow, ProcedureError>>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Flow, ProcedureError>> + Send + 'static,
{
    fn call(&self, ctx: Context, next: Next) -> BoxFuture<Result<Flow, ProcedureError>> {
        Box::pin(self(ctx, next))
    }
}

/// A type-erased middleware, shareable between procedures.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Erases an async function or closure into a [`BoxedMiddleware`].
///
/// Useful when the same middleware guards several procedures.
pub fn from_fn<F, Fut>(f: F) -> BoxedMiddleware
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Flow, ProcedureError>> + Send + 'static,
{
    Arc::new(f)
}

/// How a chain run ended.
#[derive(Debug)]
pub enum ChainOutcome {
    /// The handler should run with this context.
    Completed(Context),
    /// Middleware at `index` produced the final response.
    ShortCircuited { index: usize, response: Response },
}

/// Runs `chain` in order for `request`, starting from `ctx`.
///
/// A step that returns [`Flow::Continue`] without calling [`Next::call`]
/// ends the chain early *without* a response: the handler still runs, with
/// the context that step received. This fall-through is deliberate and kept
/// stable; a middleware that means to reject must return a response.
pub async fn run_chain(
    chain: &[BoxedMiddleware],
    mut ctx: Context,
    request: &Request,
) -> Result<ChainOutcome, ProcedureError> {
    if chain.is_empty() {
        return Ok(ChainOutcome::Completed(ctx));
    }
    let request = Arc::new(request.clone());

    for (index, middleware) in chain.iter().enumerate() {
        let (tx, mut rx) = oneshot::channel();
        let next = Next { tx, request: Arc::clone(&request) };

        match middleware.call(ctx.clone(), next).await? {
            Flow::Respond(response) => {
                return Ok(ChainOutcome::ShortCircuited { index, response });
            }
            Flow::Continue => {}
        }

        match rx.try_recv() {
            Ok(next) => ctx = next,
            Err(_) => {
                debug!(index, remaining = chain.len() - index - 1, "middleware did not continue; skipping rest of chain");
                break;
            }
        }
    }

    Ok(ChainOutcome::Completed(ctx))
}
