//! The route table and the dispatcher.
//!
//! One flat table, keyed by procedure name. A request names its procedure
//! with the last segment of its path, so `/status` and `/api/v1/status`
//! reach the same entry. There is no hierarchy to walk.
//!
//! [`Router::handle`] is the whole request pipeline:
//!
//! ```text
//! name ──► lookup ──► body ──► schema ──► middleware ──► handler ──► 200
//!            │          │         │            │             │
//!           404     400 Invalid  400 [issues]  short-circuit 500 / 400
//!                     JSON                     response
//! ```
//!
//! Every failure is classified in one place, at the bottom of `handle`.

use std::collections::HashMap;
use std::future::Future;

use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::context::Context;
use crate::error::{DispatchError, ProcedureError};
use crate::middleware::{self, ChainOutcome};
use crate::procedure::{Procedure, ProcedureKind};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup, then hand it to [`Server::serve`](crate::Server::serve)
/// or call [`handle`](Router::handle) yourself. The table and the base
/// context are read-only from then on; concurrent requests share them
/// without locking.
///
/// ```rust
/// use minirpc::{Context, Procedure, Request, Router};
/// use serde_json::{Value, json};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let router = Router::with_context(Context::new().with("region", "eu"))
///     .query("status", |_: Value, _ctx| async { Ok(json!({ "status": "ok" })) });
///
/// let res = router.handle(Request::get("/status")).await;
/// assert_eq!(res.body(), &json!({ "status": "ok" }));
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct Router {
    procedures: HashMap<String, Procedure>,
    context: Context,
}

impl Router {
    /// A router with an empty base context.
    pub fn new() -> Self {
        Self::default()
    }

    /// A router whose requests all start from `ctx`.
    pub fn with_context(ctx: Context) -> Self {
        Self { procedures: HashMap::new(), context: ctx }
    }

    /// Registers `procedure` under `name`. A later registration of the same
    /// name replaces the earlier one. Names are matched exactly, case included.
    pub fn register(mut self, name: impl Into<String>, procedure: Procedure) -> Self {
        let name = name.into();
        if self.procedures.insert(name.clone(), procedure).is_some() {
            debug!(procedure = %name, "procedure re-registered; previous definition replaced");
        }
        self
    }

    /// Registers a schema-less, middleware-less query.
    pub fn query<F, Fut, I, O>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(I, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ProcedureError>> + Send + 'static,
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
    {
        let procedure = Procedure::builder().query(move |input: Value, ctx| {
            // Decoded here rather than by the builder so `I` stays free.
            let decoded = serde_json::from_value::<I>(input);
            let fut = decoded.map(|input| handler(input, ctx));
            async move { fut?.await }
        });
        self.register(name, procedure)
    }

    /// Registers a schema-less, middleware-less mutation.
    pub fn mutation<F, Fut, I, O>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(I, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ProcedureError>> + Send + 'static,
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
    {
        let procedure = Procedure::builder().mutation(move |input: Value, ctx| {
            let decoded = serde_json::from_value::<I>(input);
            let fut = decoded.map(|input| handler(input, ctx));
            async move { fut?.await }
        });
        self.register(name, procedure)
    }

    pub fn get(&self, name: &str) -> Option<&Procedure> {
        self.procedures.get(name)
    }

    /// Every registered name with its kind, sorted by name.
    pub fn procedures(&self) -> Vec<(&str, ProcedureKind)> {
        let mut all: Vec<_> = self.procedures.iter()
            .map(|(name, p)| (name.as_str(), p.kind()))
            .collect();
        all.sort_unstable_by(|a, b| a.0.cmp(b.0));
        all
    }

    pub fn base_context(&self) -> &Context {
        &self.context
    }

    /// Dispatches one request. Never fails: every outcome is a JSON response.
    pub async fn handle(&self, req: Request) -> Response {
        let name = req.procedure_name().unwrap_or_default().to_owned();

        match self.dispatch(&name, &req).await {
            Ok(res) => res,
            Err(err) => {
                let status = err.status();
                match &err {
                    DispatchError::NotFound(_) => {
                        debug!(procedure = %name, path = %req.path(), "unknown procedure");
                    }
                    DispatchError::InvalidJson(e) => {
                        warn!(procedure = %name, error = %e, "rejected malformed JSON body");
                    }
                    DispatchError::Validation(issues) => {
                        warn!(procedure = %name, issues = issues.len(), "rejected invalid input");
                    }
                    DispatchError::Internal(e) => {
                        error!(procedure = %name, status = status.as_u16(), error = %e, "procedure failed");
                    }
                }
                err.into_response()
            }
        }
    }

    async fn dispatch(&self, name: &str, req: &Request) -> Result<Response, DispatchError> {
        let procedure = self.procedures.get(name)
            .ok_or_else(|| DispatchError::NotFound(name.to_owned()))?;

        debug!(procedure = %name, kind = %procedure.kind, method = %req.method(), "dispatching");

        let input = read_input(req)?;

        let input = match &procedure.schema {
            Some(schema) => schema.safe_validate(&input).map_err(DispatchError::Validation)?,
            None => input,
        };

        // Clone of the base context: one Arc increment. Nothing a request
        // does can reach the router's copy.
        let ctx = self.context.clone();

        let ctx = match middleware::run_chain(&procedure.middleware, ctx, req).await? {
            ChainOutcome::Completed(ctx) => ctx,
            ChainOutcome::ShortCircuited { index, response } => {
                debug!(procedure = %name, middleware = index, status = response.status().as_u16(), "short-circuited");
                return Ok(response);
            }
        };

        let output = procedure.handler.call(input, ctx).await?;
        Ok(Response::json(output))
    }
}

/// `POST` carries a JSON body; anything else has an empty-object input.
///
/// An empty `POST` body is not JSON and is rejected like any other.
fn read_input(req: &Request) -> Result<Value, DispatchError> {
    if req.method() != Method::POST {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(req.body()).map_err(DispatchError::InvalidJson)
}
