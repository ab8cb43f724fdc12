use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";
pub const DEFAULT_KEY_PARAM: &str = "token";
pub const DEFAULT_USER_AGENT: &str = concat!("service-restapi/", env!("CARGO_PKG_VERSION"));

/// Environment variable overriding [`DEFAULT_BASE_URL`].
pub const BASE_URL_ENV: &str = "SERVICE_API_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base url {value:?}: {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// What [`ServiceClient::call`](crate::ServiceClient::call) does when the transport fails
/// before a response is obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and return it as [`Dispatch::Failed`](crate::Dispatch::Failed).
    #[default]
    Absorb,
    /// Log the failure and return it as [`CallError::Transport`](crate::CallError::Transport).
    Propagate,
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: Url,
    pub user_agent: String,
    /// Query parameter the api key is sent under.
    pub key_param: String,
    pub failure_policy: FailurePolicy,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self::default().with_base_url(parse_url(base_url)?))
    }

    /// Defaults, with the base url taken from `SERVICE_API_URL` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        match lookup(BASE_URL_ENV) {
            Some(value) => Self::new(&value),
            None => Ok(Self::default()),
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_key_param(mut self, key_param: impl Into<String>) -> Self {
        self.key_param = key_param.into();
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url must parse"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            key_param: DEFAULT_KEY_PARAM.to_string(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn parse_url(value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        value: value.to_string(),
        source,
    })
}
