//! Procedures and their builder.
//!
//! A [`Procedure`] is everything the router needs to serve one name: its
//! kind, an optional input schema, the middleware chain and the handler.
//! It is immutable once built.
//!
//! ```rust
//! use minirpc::{Procedure, ProcedureError};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize, Serialize)]
//! struct NewUser { name: String }
//!
//! let create_user = Procedure::builder()
//!     .input_type::<NewUser>()
//!     .mutation(|input: NewUser, _ctx| async move {
//!         Ok::<_, ProcedureError>(serde_json::json!({ "id": "1", "name": input.name }))
//!     });
//! ```
//!
//! Input configuration comes before the terminal `.query()` / `.mutation()`:
//! the builder's type parameter is the handler's input type, so
//! `input_type::<T>()` has to be in place for the handler to receive a `T`.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::Context;
use crate::error::ProcedureError;
use crate::handler::{self, BoxedHandler};
use crate::middleware::{self as mw, BoxedMiddleware, Flow, Next};
use crate::schema::{Schema, SerdeSchema};

/// Read or write.
///
/// Informational: both kinds accept `GET` and `POST`. The kind shows up in
/// logs and in [`Router::procedures`](crate::Router::procedures).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ProcedureKind {
    Query,
    Mutation,
}

impl ProcedureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query    => "query",
            Self::Mutation => "mutation",
        }
    }
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered procedure.
#[derive(Clone)]
pub struct Procedure {
    pub(crate) kind: ProcedureKind,
    pub(crate) schema: Option<Arc<dyn Schema>>,
    pub(crate) middleware: Arc<[BoxedMiddleware]>,
    pub(crate) handler: BoxedHandler,
}

impl Procedure {
    /// Starts a procedure whose handler takes raw JSON input.
    pub fn builder() -> ProcedureBuilder<Value> {
        ProcedureBuilder {
            schema: None,
            middleware: Vec::new(),
            _input: PhantomData,
        }
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    pub fn has_schema(&self) -> bool {
        self.schema.is_some()
    }

    pub fn middleware_len(&self) -> usize {
        self.middleware.len()
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("kind", &self.kind)
            .field("has_schema", &self.has_schema())
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

/// Accumulates schema and middleware; finished by [`query`](Self::query) or
/// [`mutation`](Self::mutation).
///
/// `I` is the handler's input type: [`Value`] until
/// [`input_type`](Self::input_type) says otherwise.
pub struct ProcedureBuilder<I> {
    schema: Option<Arc<dyn Schema>>,
    middleware: Vec<BoxedMiddleware>,
    _input: PhantomData<fn() -> I>,
}

impl<I> ProcedureBuilder<I> {
    /// Appends a middleware. Middleware runs in the order it was added.
    pub fn middleware<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Flow, ProcedureError>> + Send + 'static,
    {
        self.middleware.push(mw::from_fn(f));
        self
    }

    /// Appends an already-erased middleware, e.g. one shared by many procedures.
    pub fn with(mut self, middleware: BoxedMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Validates input with `schema`. The handler receives the schema's
    /// canonical output, still as JSON.
    pub fn input(self, schema: impl Schema) -> ProcedureBuilder<Value> {
        ProcedureBuilder {
            schema: Some(Arc::new(schema)),
            middleware: self.middleware,
            _input: PhantomData,
        }
    }

    /// Validates input by deserializing it into `T` and hands the handler a `T`.
    pub fn input_type<T>(self) -> ProcedureBuilder<T>
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        ProcedureBuilder {
            schema: Some(Arc::new(SerdeSchema::<T>::new())),
            middleware: self.middleware,
            _input: PhantomData,
        }
    }
}

impl<I> ProcedureBuilder<I>
where
    I: DeserializeOwned + 'static,
{
    pub fn query<F, Fut, O>(self, handler: F) -> Procedure
    where
        F: Fn(I, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ProcedureError>> + Send + 'static,
        O: Serialize + 'static,
    {
        self.finish(ProcedureKind::Query, handler::boxed(handler))
    }

    pub fn mutation<F, Fut, O>(self, handler: F) -> Procedure
    where
        F: Fn(I, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ProcedureError>> + Send + 'static,
        O: Serialize + 'static,
    {
        self.finish(ProcedureKind::Mutation, handler::boxed(handler))
    }

    fn finish(self, kind: ProcedureKind, handler: BoxedHandler) -> Procedure {
        Procedure {
            kind,
            schema: self.schema,
            middleware: self.middleware.into(),
            handler,
        }
    }
}
