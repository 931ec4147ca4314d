//! HTTP client for a minirpc server.
//!
//! Each procedure name maps to a [`ProcedureCaller`] with two calls:
//! `query` sends `GET /{name}` with no body, `mutation` sends `POST /{name}`
//! with a JSON body (`{}` when there is no input). The server is the only
//! judge of input; nothing is validated here.
//!
//! ```rust,no_run
//! use minirpc::Client;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), minirpc::ClientError> {
//! let client = Client::new("http://localhost:3000");
//!
//! let status = client.procedure("status").query().await?;
//! let user = client.procedure("createUser").mutation(Some(&json!({ "name": "Ann" }))).await?;
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Spelled-out "no input" for [`ProcedureCaller::mutation`].
///
/// `None` alone leaves the input type ambiguous; `caller.mutation(NO_INPUT)` does not.
pub const NO_INPUT: Option<&'static Value> = None;

/// Why a call failed.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a non-2xx status. `body` is its JSON body
    /// (`Null` if it was not JSON).
    #[error("server responded with status {status}")]
    Status { status: u16, body: Value },

    /// Connection, TLS or protocol failure, as reported by `reqwest`.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// A 2xx body that does not decode into the requested type.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A client bound to one server.
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    /// Uses a preconfigured `reqwest::Client` (timeouts, default headers, ...).
    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The caller for the procedure registered as `name`.
    pub fn procedure(&self, name: &str) -> ProcedureCaller<'_> {
        ProcedureCaller { client: self, url: format!("{}/{}", self.base_url, name) }
    }
}

/// Calls for a single procedure name.
#[derive(Debug)]
pub struct ProcedureCaller<'a> {
    client: &'a Client,
    url: String,
}

impl ProcedureCaller<'_> {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// `GET` with no body.
    pub async fn query(&self) -> Result<Value, ClientError> {
        self.query_as().await
    }

    pub async fn query_as<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        let res = self.client.http.get(&self.url).send().await?;
        decode(res).await
    }

    /// `POST` with `input` as the JSON body, `{}` when `None`.
    pub async fn mutation<I>(&self, input: Option<&I>) -> Result<Value, ClientError>
    where
        I: Serialize + ?Sized,
    {
        self.mutation_as(input).await
    }

    pub async fn mutation_as<I, T>(&self, input: Option<&I>) -> Result<T, ClientError>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self.client.http.post(&self.url);
        let req = match input {
            Some(input) => req.json(input),
            None => req.json(&serde_json::Map::new()),
        };
        decode(req.send().await?).await
    }
}

async fn decode<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, ClientError> {
    let status = res.status();
    let bytes = res.bytes().await?;

    if !status.is_success() {
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        tracing::debug!(status = status.as_u16(), "procedure call failed");
        return Err(ClientError::Status { status: status.as_u16(), body });
    }

    Ok(serde_json::from_slice(&bytes)?)
}
