//! Incoming request type.

use bytes::Bytes;
use http::Method;
use http_body_util::{BodyExt, Limited};

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An incoming RPC request.
///
/// The router only looks at three things: the method, the path (its last
/// segment names the procedure) and, for `POST`, the body.
///
/// Build one by hand to drive a [`Router`](crate::Router) without a server:
///
/// ```rust
/// use minirpc::Request;
///
/// let req = Request::post("/createUser", r#"{"name":"Ann"}"#);
/// assert_eq!(req.path(), "/createUser");
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: Vec::new(), body: Bytes::new() }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Buffers a hyper request, reading at most `limit` body bytes.
    ///
    /// The query string is not part of [`path`](Request::path). Header values
    /// that are not visible ASCII are skipped. A body over `limit` fails with
    /// [`LengthLimitError`](http_body_util::LengthLimitError) inside the box.
    pub(crate) async fn from_hyper<B>(req: http::Request<B>, limit: usize) -> Result<Self, BoxError>
    where
        B: hyper::body::Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let body = Limited::new(body, limit).collect().await?.to_bytes();

        let headers = parts.headers.iter()
            .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
            .collect();

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            headers,
            body,
        })
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The procedure this request addresses: the last non-empty path segment.
    ///
    /// `/api/v1/status`, `/status` and `/status/` all name `status`; `/`
    /// names nothing.
    pub fn procedure_name(&self) -> Option<&str> {
        self.path.rsplit('/').find(|segment| !segment.is_empty())
    }
}
