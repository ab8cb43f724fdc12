//! Thin client for the service REST API over reqwest.
//!
//! [`ServiceClient::call`] encodes query parameters and JSON bodies (dates, times and
//! decimals included, see [`encode`]), sends one request through a shared session, logs the
//! outcome with `tracing` and hands back a [`Dispatch`]. [`MockRestAdapter`] replaces the
//! network for deterministic tests.

pub mod adapter;
pub mod client;
pub mod config;
pub mod encode;
pub mod mock;
pub mod resource;

pub use reqwest::Method;

pub use adapter::{
    ReqwestTransport, RestBytes, RestError, RestErrorKind, RestFuture, RestRequest, RestResponse,
    RestResult, RestSession, RestTransport,
};
pub use client::{CallError, Dispatch, Params, QueryParams, ServiceClient};
pub use config::{ClientConfig, ConfigError, FailurePolicy};
pub use encode::{EncodeError, Encoded, WireValue, encode_json, encode_param, encode_value};
pub use mock::{
    MockBehavior, MockBehaviorPlan, MockResponse, MockRestAdapter, MockRestStateSnapshot,
};
pub use resource::Listings;
