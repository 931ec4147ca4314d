//! Request pipeline behavior, driven through `Router::handle` without a socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use minirpc::middleware::{Flow, Next, from_fn};
use minirpc::schema::{FieldType, ObjectSchema};
use minirpc::{Context, Procedure, ProcedureError, Request, Response, Router, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// =============================================================================
// Helpers
// =============================================================================

/// Counts handler invocations.
#[derive(Clone, Default)]
struct Spy(Arc<AtomicUsize>);

impl Spy {
    fn calls(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn procedure(&self) -> Procedure {
        let spy = self.clone();
        Procedure::builder()
            .input(ObjectSchema::new().required("name", FieldType::String))
            .mutation(move |input: Value, _ctx| {
                spy.0.fetch_add(1, Ordering::SeqCst);
                async move { Ok(json!({ "id": "1", "name": input["name"] })) }
            })
    }
}

fn status_router() -> Router {
    Router::new().query("status", |_: Value, _ctx| async { Ok(json!({ "status": "ok" })) })
}

fn unauthorized() -> Response {
    Response::error(StatusCode::UNAUTHORIZED, json!("Unauthorized"))
}

// =============================================================================
// Name resolution
// =============================================================================

#[tokio::test]
async fn get_status_returns_handler_value() {
    let res = status_router().handle(Request::get("/status")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body(), &json!({ "status": "ok" }));
}

#[tokio::test]
async fn nested_paths_collapse_to_last_segment() {
    let router = status_router();
    let flat = router.handle(Request::get("/status")).await;
    let nested = router.handle(Request::get("/api/v1/status")).await;
    assert_eq!(flat, nested);
}

#[tokio::test]
async fn unknown_procedure_is_404() {
    let res = status_router().handle(Request::get("/nope")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.body(), &json!({ "error": "Not found" }));
}

// =============================================================================
// Input handling
// =============================================================================

#[tokio::test]
async fn create_user_with_valid_input() {
    let spy = Spy::default();
    let router = Router::new().register("createUser", spy.procedure());

    let res = router.handle(Request::post("/createUser", r#"{"name":"Ann"}"#)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body(), &json!({ "id": "1", "name": "Ann" }));
    assert_eq!(spy.calls(), 1);
}

#[tokio::test]
async fn invalid_json_never_reaches_the_handler() {
    let spy = Spy::default();
    let router = Router::new().register("createUser", spy.procedure());

    let res = router.handle(Request::post("/createUser", "{not json")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.body(), &json!({ "error": "Invalid JSON" }));
    assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn invalid_json_never_reaches_middleware() {
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    let router = Router::new().register(
        "echo",
        Procedure::builder()
            .middleware(move |ctx, next: Next| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(next.call(ctx)) }
            })
            .mutation(|input: Value, _ctx| async move { Ok(input) }),
    );

    let res = router.handle(Request::post("/echo", "[1,")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn schema_rejection_lists_field_errors() {
    let spy = Spy::default();
    let router = Router::new().register("createUser", spy.procedure());

    let res = router.handle(Request::post("/createUser", r#"{"bogus":1}"#)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let errors = res.body()["error"].as_array().expect("error is a list");
    assert!(!errors.is_empty());
    assert_eq!(errors[0]["path"], json!(["name"]));
    assert_eq!(errors[0]["code"], json!("invalid_type"));
    assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn get_on_a_schema_procedure_validates_the_empty_object() {
    let spy = Spy::default();
    let router = Router::new().register("createUser", spy.procedure());

    let res = router.handle(Request::get("/createUser")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn handler_receives_the_canonical_value() {
    let router = Router::new().register(
        "inspect",
        Procedure::builder()
            .input(ObjectSchema::new().required("n", FieldType::Integer).coerce())
            .mutation(|input: Value, _ctx| async move { Ok(input) }),
    );

    let res = router.handle(Request::post("/inspect", r#"{"n":"5","junk":true}"#)).await;
    assert_eq!(res.body(), &json!({ "n": 5 }));
}

#[tokio::test]
async fn typed_input() {
    #[derive(Deserialize, Serialize)]
    struct NewUser {
        name: String,
        #[serde(default)]
        admin: bool,
    }

    let router = Router::new().register(
        "createUser",
        Procedure::builder()
            .input_type::<NewUser>()
            .mutation(|user: NewUser, _ctx| async move {
                Ok(json!({ "name": user.name, "admin": user.admin }))
            }),
    );

    let ok = router.handle(Request::post("/createUser", r#"{"name":"Ann"}"#)).await;
    assert_eq!(ok.body(), &json!({ "name": "Ann", "admin": false }));

    let bad = router.handle(Request::post("/createUser", r#"{"name":7}"#)).await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    assert!(bad.body()["error"].as_array().is_some_and(|e| !e.is_empty()));
}

// =============================================================================
// Middleware
// =============================================================================

#[tokio::test]
async fn middleware_runs_in_order_before_the_handler() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let step = |name: &'static str| {
        let log = Arc::clone(&log);
        from_fn(move |ctx, next: Next| {
            log.lock().unwrap().push(name);
            async move { Ok(next.call(ctx)) }
        })
    };
    let handler_log = Arc::clone(&log);

    let router = Router::new().register(
        "run",
        Procedure::builder()
            .with(step("A"))
            .with(step("B"))
            .query(move |_: Value, _ctx| {
                handler_log.lock().unwrap().push("handler");
                async { Ok(()) }
            }),
    );

    let res = router.handle(Request::get("/run")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(*log.lock().unwrap(), ["A", "B", "handler"]);
}

#[tokio::test]
async fn short_circuit_skips_later_middleware_and_handler() {
    let b_ran = Arc::new(AtomicUsize::new(0));
    let b_counter = Arc::clone(&b_ran);
    let spy = Spy::default();
    let handler_spy = spy.clone();

    let router = Router::new().register(
        "secret",
        Procedure::builder()
            .middleware(|_ctx, _next| async { Ok(Flow::from(unauthorized())) })
            .middleware(move |ctx, next: Next| {
                b_counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(next.call(ctx)) }
            })
            .query(move |_: Value, _ctx| {
                handler_spy.0.fetch_add(1, Ordering::SeqCst);
                async { Ok("secret") }
            }),
    );

    let res = router.handle(Request::get("/secret")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.body(), &json!({ "error": "Unauthorized" }));
    assert_eq!(b_ran.load(Ordering::SeqCst), 0);
    assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn responding_after_continuing_still_short_circuits() {
    let later_ran = Arc::new(AtomicUsize::new(0));
    let later_counter = Arc::clone(&later_ran);
    let spy = Spy::default();
    let handler_spy = spy.clone();

    let router = Router::new().register(
        "secret",
        Procedure::builder()
            .middleware(|ctx: Context, next: Next| async move {
                let _ = next.call(ctx.with("user", "ann"));
                Ok(Flow::Respond(unauthorized()))
            })
            .middleware(move |ctx, next: Next| {
                later_counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(next.call(ctx)) }
            })
            .query(move |_: Value, _ctx| {
                handler_spy.0.fetch_add(1, Ordering::SeqCst);
                async { Ok("secret") }
            }),
    );

    let res = router.handle(Request::get("/secret")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.body(), &json!({ "error": "Unauthorized" }));
    assert_eq!(later_ran.load(Ordering::SeqCst), 0);
    assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn short_circuit_response_keeps_custom_headers() {
    let router = Router::new().register(
        "secret",
        Procedure::builder()
            .middleware(|_ctx, _next| async {
                let res = Response::builder()
                    .status(StatusCode::UNAUTHORIZED)
                    .header("www-authenticate", "Bearer")
                    .json(json!({ "error": "Unauthorized", "hint": "log in" }));
                Ok(Flow::Respond(res))
            })
            .query(|_: Value, _ctx| async { Ok(()) }),
    );

    let res = router.handle(Request::get("/secret")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.header("WWW-Authenticate"), Some("Bearer"));
    assert_eq!(res.body()["hint"], json!("log in"));
}

#[tokio::test]
async fn context_threads_to_later_middleware_and_handler() {
    let seen_by_b = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&seen_by_b);

    let router = Router::with_context(Context::new().with("app", "demo")).register(
        "whoami",
        Procedure::builder()
            .middleware(|ctx: Context, next: Next| async move { Ok(next.call(ctx.with("x", 1))) })
            .middleware(move |ctx: Context, next: Next| {
                *seen.lock().unwrap() = ctx.get("x").cloned();
                async move { Ok(next.call(ctx)) }
            })
            .query(|_: Value, ctx: Context| async move { Ok(ctx) }),
    );

    let res = router.handle(Request::get("/whoami")).await;
    assert_eq!(res.body(), &json!({ "app": "demo", "x": 1 }));
    assert_eq!(*seen_by_b.lock().unwrap(), Some(json!(1)));

    // The base context is untouched for the next request.
    assert!(!router.base_context().contains("x"));
    assert_eq!(router.base_context().get("app"), Some(&json!("demo")));
}

#[tokio::test]
async fn middleware_authenticates_from_request_headers() {
    let router = Router::new().register(
        "me",
        Procedure::builder()
            .middleware(|ctx: Context, next: Next| async move {
                let token = next.request()
                    .header("authorization")
                    .and_then(|v| v.strip_prefix("Bearer "))
                    .map(str::to_owned);
                match token {
                    Some(user) => Ok(next.call(ctx.with("user", user))),
                    None => Ok(Flow::Respond(unauthorized())),
                }
            })
            .query(|_: Value, ctx: Context| async move { Ok(ctx.get("user").cloned()) }),
    );

    let anonymous = router.handle(Request::get("/me")).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let signed_in = router
        .handle(Request::get("/me").with_header("Authorization", "Bearer ann"))
        .await;
    assert_eq!(signed_in.status(), StatusCode::OK);
    assert_eq!(signed_in.body(), &json!("ann"));
}

#[tokio::test]
async fn requests_are_isolated_from_each_other() {
    let router = Router::new().register(
        "count",
        Procedure::builder()
            .middleware(|ctx: Context, next: Next| async move {
                let n = ctx.get_as::<i64>("n").unwrap_or(0);
                Ok(next.call(ctx.with("n", n + 1)))
            })
            .query(|_: Value, ctx: Context| async move { Ok(ctx.get("n").cloned()) }),
    );

    for _ in 0..3 {
        let res = router.handle(Request::get("/count")).await;
        assert_eq!(res.body(), &json!(1));
    }
}

/// A middleware that neither continues nor responds ends the chain quietly:
/// the handler still runs, with the context from before that middleware.
#[tokio::test]
async fn silent_middleware_falls_through_to_the_handler() {
    let c_ran = Arc::new(AtomicUsize::new(0));
    let c_counter = Arc::clone(&c_ran);

    let router = Router::new().register(
        "fallthrough",
        Procedure::builder()
            .middleware(|ctx: Context, next: Next| async move { Ok(next.call(ctx.with("a", true))) })
            .middleware(|ctx: Context, _next: Next| async move {
                // Builds a context but never hands it on.
                let _ignored = ctx.with("b", true);
                Ok(Flow::Continue)
            })
            .middleware(move |ctx, next: Next| {
                c_counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(next.call(ctx.with("c", true))) }
            })
            .query(|_: Value, ctx: Context| async move { Ok(ctx) }),
    );

    let res = router.handle(Request::get("/fallthrough")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body(), &json!({ "a": true }));
    assert_eq!(c_ran.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn handler_error_is_an_opaque_500() {
    let router = Router::new()
        .query("getUser", |_: Value, _ctx| async {
            Err::<Value, _>(ProcedureError::msg("User not found"))
        });

    let res = router.handle(Request::get("/getUser")).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body(), &json!({ "error": "Unknown error" }));
}

#[tokio::test]
async fn middleware_error_is_an_opaque_500() {
    let spy = Spy::default();
    let handler_spy = spy.clone();
    let router = Router::new().register(
        "boom",
        Procedure::builder()
            .middleware(|_ctx, _next| async {
                Err(ProcedureError::internal(std::io::Error::other("disk on fire")))
            })
            .query(move |_: Value, _ctx| {
                handler_spy.0.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
    );

    let res = router.handle(Request::get("/boom")).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body(), &json!({ "error": "Unknown error" }));
    assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn validation_error_raised_by_middleware_is_a_400() {
    let spy = Spy::default();
    let handler_spy = spy.clone();
    let router = Router::new().register(
        "invite",
        Procedure::builder()
            .middleware(|_ctx, _next| async {
                Err(ProcedureError::Validation(vec![minirpc::FieldError::new(
                    "custom",
                    vec!["email".into()],
                    "domain not allowed",
                )]))
            })
            .mutation(move |_: Value, _ctx| {
                handler_spy.0.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
    );

    let res = router.handle(Request::post("/invite", r#"{"email":"a@b.c"}"#)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        res.body(),
        &json!({ "error": [{ "code": "custom", "path": ["email"], "message": "domain not allowed" }] })
    );
    assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn validation_error_raised_by_a_handler_is_a_400() {
    let router = Router::new().mutation("strict", |_: Value, _ctx| async {
        Err::<Value, _>(ProcedureError::Validation(vec![minirpc::FieldError::new(
            "custom",
            vec!["email".into()],
            "already taken",
        )]))
    });

    let res = router.handle(Request::post("/strict", "{}")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        res.body(),
        &json!({ "error": [{ "code": "custom", "path": ["email"], "message": "already taken" }] })
    );
}
