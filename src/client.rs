use std::{collections::BTreeMap, fmt, sync::Arc, time::Instant};

use bytes::Bytes;
use reqwest::Method;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
    adapter::{
        RestBytes, RestError, RestRequest, RestResponse, RestResult, RestSession, RestTransport,
    },
    config::{ClientConfig, FailurePolicy},
    encode::{EncodeError, WireValue, encode_json, encode_param},
    resource::Listings,
};

/// Caller supplied query parameters. Null entries are dropped before sending.
pub type Params = BTreeMap<String, WireValue>;

/// Encoded query parameters, one or more values per key.
pub type QueryParams = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("failed to encode request: {0}")]
    Encode(#[from] EncodeError),
    #[error("failed to resolve path {path:?}: {source}")]
    Url {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("transport failure: {0}")]
    Transport(#[from] RestError),
}

/// Outcome of a dispatched request.
#[derive(Debug)]
pub enum Dispatch {
    /// The server answered, whatever the status.
    Completed(RestResponse),
    /// The transport failed before a response was obtained.
    Failed(RestError),
}

impl Dispatch {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn response(&self) -> Option<&RestResponse> {
        match self {
            Self::Completed(response) => Some(response),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&RestError> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(err) => Some(err),
        }
    }

    pub fn into_result(self) -> RestResult<RestResponse> {
        match self {
            Self::Completed(response) => Ok(response),
            Self::Failed(err) => Err(err),
        }
    }
}

/// Client for the remote service: holds the api key, default headers and parameters, and
/// the HTTP session reused across calls.
///
/// Defaults are fixed at construction. Each call overlays its own parameters onto a copy, so
/// nothing leaks from one call into the next and concurrent calls are independent.
#[derive(Clone)]
pub struct ServiceClient {
    config: ClientConfig,
    api_key: Arc<str>,
    headers: Arc<[(String, RestBytes)]>,
    default_params: Arc<QueryParams>,
    session: RestSession,
}

impl ServiceClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_config(api_key, ClientConfig::default())
    }

    pub fn with_config(api_key: impl Into<String>, config: ClientConfig) -> Self {
        Self::with_session(api_key, config, RestSession::new())
    }

    pub fn with_transport<T>(api_key: impl Into<String>, config: ClientConfig, transport: T) -> Self
    where
        T: RestTransport + 'static,
    {
        Self::with_session(api_key, config, RestSession::with_transport(transport))
    }

    pub fn with_session(
        api_key: impl Into<String>,
        config: ClientConfig,
        session: RestSession,
    ) -> Self {
        let api_key: Arc<str> = Arc::from(api_key.into());
        let headers = vec![
            (
                "Content-Type".to_string(),
                Bytes::from_static(b"application/json"),
            ),
            (
                "User-Agent".to_string(),
                Bytes::from(config.user_agent.clone()),
            ),
        ];
        let default_params =
            QueryParams::from([(config.key_param.clone(), vec![api_key.to_string()])]);

        Self {
            config,
            api_key,
            headers: headers.into(),
            default_params: Arc::new(default_params),
            session,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn default_params(&self) -> &QueryParams {
        &self.default_params
    }

    pub fn listings(&self) -> Listings<'_> {
        Listings::new(self)
    }

    /// Issue one request against `path`, joined onto the configured base url.
    ///
    /// Encoding failures are returned before anything is sent. Transport failures are
    /// logged, then handled according to the configured [`FailurePolicy`]. There is no
    /// retry.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        params: Option<&Params>,
        body: Option<&WireValue>,
    ) -> Result<Dispatch, CallError> {
        let params = normalize_params(params)?;
        let query = self.merge_params(&params);
        let body = body.map(encode_json).transpose()?;
        let url = self.resolve(path, &query)?;

        debug!(
            method = %method,
            url = %url,
            params = ?params,
            body = %body.as_deref().unwrap_or(""),
            "sending request"
        );

        let mut request = RestRequest::new(method, url.as_str());
        for (key, value) in self.headers.iter() {
            request = request.with_header(key.clone(), value.clone());
        }
        if let Some(body) = body {
            request = request.with_body(body);
        }

        let start = Instant::now();
        match self.session.execute(request).await {
            Ok(response) => {
                let elapsed_ms = elapsed_ms(start);
                debug!(
                    status = response.status(),
                    elapsed_ms = %elapsed_ms,
                    body = %response.text(),
                    "received response"
                );
                Ok(Dispatch::Completed(response))
            }
            Err(err) => {
                let elapsed_ms = elapsed_ms(start);
                error!(
                    kind = %err.kind(),
                    elapsed_ms = %elapsed_ms,
                    error = %err.message,
                    "request failed"
                );
                match self.config.failure_policy {
                    FailurePolicy::Absorb => Ok(Dispatch::Failed(err)),
                    FailurePolicy::Propagate => Err(CallError::Transport(err)),
                }
            }
        }
    }

    pub async fn get(&self, path: &str, params: Option<&Params>) -> Result<Dispatch, CallError> {
        self.call(Method::GET, path, params, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        params: Option<&Params>,
        body: &WireValue,
    ) -> Result<Dispatch, CallError> {
        self.call(Method::POST, path, params, Some(body)).await
    }

    /// Defaults overlaid with the call's parameters; the stored defaults stay untouched.
    pub fn merge_params(&self, params: &QueryParams) -> QueryParams {
        let mut merged = QueryParams::clone(&self.default_params);
        merged.extend(params.iter().map(|(key, values)| (key.clone(), values.clone())));
        merged
    }

    /// Join `path` onto the base url and append `query`.
    pub fn resolve(&self, path: &str, query: &QueryParams) -> Result<Url, CallError> {
        let mut url = self
            .config
            .base_url
            .join(path)
            .map_err(|source| CallError::Url {
                path: path.to_string(),
                source,
            })?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, values) in query {
                for value in values {
                    pairs.append_pair(key, value);
                }
            }
        }
        Ok(url)
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("base_url", &self.config.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("failure_policy", &self.config.failure_policy)
            .finish_non_exhaustive()
    }
}

/// Encode each parameter one level deep, dropping nulls.
pub fn normalize_params(params: Option<&Params>) -> Result<QueryParams, EncodeError> {
    let mut normalized = QueryParams::new();
    for (key, value) in params.into_iter().flatten() {
        if value.is_null() {
            continue;
        }
        let values = encode_param(value)?;
        if !values.is_empty() {
            normalized.insert(key.clone(), values);
        }
    }
    Ok(normalized)
}

fn elapsed_ms(start: Instant) -> String {
    format!("{:.2}", start.elapsed().as_secs_f64() * 1000.0)
}
