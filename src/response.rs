//! Outgoing response type and the [`IntoResponse`] conversion trait.
//!
//! Every response minirpc produces has a JSON body. Handlers never build one
//! directly (their return value is serialized for them); middleware builds
//! one when it wants to short-circuit a request.

use bytes::Bytes;
use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http_body_util::Full;
use serde_json::{Value, json};

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing JSON response.
///
/// # Shortcuts
///
/// ```rust
/// use minirpc::Response;
/// use http::StatusCode;
/// use serde_json::json;
///
/// Response::json(json!({ "status": "ok" }));
/// Response::error(StatusCode::UNAUTHORIZED, json!("Unauthorized"));
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use minirpc::Response;
/// use http::StatusCode;
/// use serde_json::json;
///
/// Response::builder()
///     .status(StatusCode::UNAUTHORIZED)
///     .header("www-authenticate", "Bearer")
///     .json(json!({ "error": "Unauthorized" }));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub(crate) body: Value,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK` with `body`.
    pub fn json(body: Value) -> Self {
        Self { body, headers: Vec::new(), status: StatusCode::OK }
    }

    /// `{"error": error}` with the given status.
    pub fn error(status: StatusCode, error: Value) -> Self {
        Self { body: json!({ "error": error }), headers: Vec::new(), status }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn into_body(self) -> Value {
        self.body
    }

    /// Renders the response for hyper.
    ///
    /// Headers that are not valid HTTP are dropped with a warning rather than
    /// failing the response.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        // Serializing a `Value` cannot fail: its map keys are always strings.
        let body = serde_json::to_vec(&self.body).unwrap_or_else(|_| b"{}".to_vec());

        let mut res = http::Response::new(Full::new(Bytes::from(body)));
        *res.status_mut() = self.status;
        res.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(name), Ok(value)) => {
                    res.headers_mut().append(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`. Terminated by
/// [`json`](ResponseBuilder::json) or [`error`](ResponseBuilder::error).
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn json(self, body: Value) -> Response {
        Response { body, headers: self.headers, status: self.status }
    }

    /// Terminate with an `{"error": error}` body.
    pub fn error(self, error: Value) -> Response {
        self.json(json!({ "error": error }))
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into a [`Response`].
///
/// Lets middleware short-circuit with whatever is most convenient:
///
/// ```rust
/// use minirpc::{IntoResponse, Response};
/// use http::StatusCode;
/// use serde_json::json;
///
/// let res = (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" })).into_response();
/// assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
/// ```
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for Value {
    fn into_response(self) -> Response { Response::json(self) }
}

impl IntoResponse for (StatusCode, Value) {
    fn into_response(self) -> Response {
        Response::builder().status(self.0).json(self.1)
    }
}

/// A bare status gets the canonical reason as its error: `{"error": "Unauthorized"}`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response {
        let reason = self.canonical_reason().unwrap_or("Unknown status");
        Response::error(self, json!(reason))
    }
}
