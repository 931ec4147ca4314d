//! Minimal minirpc example: a public query, an authenticated query and a
//! validated mutation.
//!
//! Run with:
//!   RUST_LOG=info,minirpc=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/status
//!   curl -X POST http://localhost:3000/createUser -d '{"name":"Ann"}'
//!   curl -X POST http://localhost:3000/createUser -d '{"bogus":1}'
//!   curl http://localhost:3000/me
//!   curl -H 'authorization: Bearer ann' http://localhost:3000/me
//!   curl http://localhost:3000/getUser

use minirpc::middleware::{Flow, Next};
use minirpc::schema::{FieldType, ObjectSchema};
use minirpc::{Context, Procedure, ProcedureError, Response, Router, Server, StatusCode};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let app = Router::with_context(Context::new().with("service", "users"))
        .query("status", status)
        .register("createUser", Procedure::builder()
            .input(ObjectSchema::new().required("name", FieldType::String))
            .mutation(create_user))
        .register("me", Procedure::builder()
            .middleware(demo_auth)
            .query(me))
        .query("getUser", get_user);

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// GET /status
async fn status(_input: Value, _ctx: Context) -> Result<Value, ProcedureError> {
    Ok(json!({ "status": "ok" }))
}

// POST /createUser {"name": "..."}
//
// The schema already checked `name`; unknown keys were stripped.
async fn create_user(input: Value, _ctx: Context) -> Result<Value, ProcedureError> {
    Ok(json!({ "id": "1", "name": input["name"] }))
}

// GET /me
async fn me(_input: Value, ctx: Context) -> Result<Value, ProcedureError> {
    Ok(json!({ "user": ctx.get("user"), "service": ctx.get("service") }))
}

// GET /getUser → 500 {"error": "Unknown error"}; the detail only reaches the log.
async fn get_user(_input: Value, _ctx: Context) -> Result<Value, ProcedureError> {
    Err(ProcedureError::msg("User not found"))
}

// Accepts any bearer token and exposes it to the handler as `user`.
async fn demo_auth(ctx: Context, next: Next) -> Result<Flow, ProcedureError> {
    let token = next.request()
        .header("authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);

    match token {
        Some(user) => Ok(next.call(ctx.with("user", user))),
        None => Ok(Flow::Respond(
            Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .header("www-authenticate", "Bearer")
                .error(json!("Unauthorized")),
        )),
    }
}
