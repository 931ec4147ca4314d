//! # minirpc
//!
//! A minimal RPC router over plain HTTP and JSON.
//!
//! You define named procedures (queries that read, mutations that write),
//! each with an optional input schema and a middleware chain. minirpc gives
//! you one request handler that finds the procedure, validates its input,
//! runs the middleware, calls the handler and serializes the result. A small
//! client issues requests with the matching shape.
//!
//! ## The wire contract
//!
//! | Request | Input |
//! |---|---|
//! | `GET /{name}` | `{}` |
//! | `POST /{name}` with a JSON body | the body |
//!
//! Only the last path segment names the procedure: `/api/v1/status` and
//! `/status` are the same call.
//!
//! | Outcome | Status | Body |
//! |---|---|---|
//! | Success | 200 | the handler's return value |
//! | Unknown procedure | 404 | `{"error": "Not found"}` |
//! | Body is not JSON | 400 | `{"error": "Invalid JSON"}` |
//! | Schema rejected input | 400 | `{"error": [<field errors>]}` |
//! | Middleware short-circuit | any | whatever the middleware built |
//! | Anything else | 500 | `{"error": "Unknown error"}` |
//!
//! Handlers never see input that failed validation, and internal error
//! details never leave the process (they are logged with `tracing`).
//!
//! What minirpc does not do: TLS, retries, streaming, connection pooling.
//! Put it behind a proxy for the first; the rest are out of scope.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use minirpc::middleware::{Flow, Next};
//! use minirpc::schema::{FieldType, ObjectSchema};
//! use minirpc::{Context, Procedure, ProcedureError, Response, Router, Server};
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .query("status", |_: Value, _ctx| async { Ok(json!({ "status": "ok" })) })
//!         .register("createUser", Procedure::builder()
//!             .middleware(authenticated)
//!             .input(ObjectSchema::new().required("name", FieldType::String))
//!             .mutation(|input: Value, _ctx| async move {
//!                 Ok::<_, ProcedureError>(json!({ "id": "1", "name": input["name"] }))
//!             }));
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn authenticated(ctx: Context, next: Next) -> Result<Flow, ProcedureError> {
//!     let user = next.request().header("x-user").map(str::to_owned);
//!     match user {
//!         Some(user) => Ok(next.call(ctx.with("user", user))),
//!         None => Ok(Response::error(StatusCode::UNAUTHORIZED, json!("Unauthorized")).into()),
//!     }
//! }
//! ```

mod context;
mod error;
mod handler;
mod procedure;
mod request;
mod response;
mod router;
mod server;

#[cfg(feature = "client")]
mod client;

pub mod middleware;
pub mod schema;

pub use context::Context;
pub use error::{Error, ProcedureError};
pub use handler::BoxFuture;
pub use procedure::{Procedure, ProcedureBuilder, ProcedureKind};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use schema::{FieldError, Schema};
pub use server::Server;

#[cfg(feature = "client")]
pub use client::{Client, ClientError, NO_INPUT, ProcedureCaller};

pub use http::{Method, StatusCode};
