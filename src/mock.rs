use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use sonic_rs::to_vec;

use super::adapter::{
    RestBytes, RestError, RestFuture, RestRequest, RestResponse, RestResult, RestTransport,
};

/// Scripted outcome for the next request the mock receives.
#[derive(Clone, Debug, Default)]
pub enum MockBehavior {
    #[default]
    Pass,
    Delay(Duration),
    ConnectError {
        reason: String,
    },
    SendError {
        reason: String,
    },
    ReceiveError {
        reason: String,
    },
    TimeoutError {
        reason: String,
    },
    InternalError {
        reason: String,
    },
}

impl MockBehavior {
    pub fn delay(ms: u64) -> Self {
        Self::Delay(Duration::from_millis(ms))
    }

    pub fn connect_error(reason: impl Into<String>) -> Self {
        Self::ConnectError {
            reason: reason.into(),
        }
    }

    pub fn send_error(reason: impl Into<String>) -> Self {
        Self::SendError {
            reason: reason.into(),
        }
    }

    pub fn receive_error(reason: impl Into<String>) -> Self {
        Self::ReceiveError {
            reason: reason.into(),
        }
    }

    pub fn timeout_error(reason: impl Into<String>) -> Self {
        Self::TimeoutError {
            reason: reason.into(),
        }
    }

    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self::InternalError {
            reason: reason.into(),
        }
    }

    fn into_error(self) -> Option<RestError> {
        match self {
            Self::Pass | Self::Delay(_) => None,
            Self::ConnectError { reason } => Some(RestError::connect(reason, true)),
            Self::SendError { reason } => Some(RestError::send(reason, false)),
            Self::ReceiveError { reason } => Some(RestError::receive(reason, false)),
            Self::TimeoutError { reason } => Some(RestError::timeout(reason)),
            Self::InternalError { reason } => Some(RestError::internal(reason)),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MockBehaviorPlan {
    request: VecDeque<MockBehavior>,
}

impl MockBehaviorPlan {
    pub fn push(&mut self, behavior: MockBehavior) -> &mut Self {
        self.request.push_back(behavior);
        self
    }

    pub fn pop(&mut self) -> MockBehavior {
        self.request.pop_front().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.request.len()
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, RestBytes)>,
    pub body: RestBytes,
}

impl MockResponse {
    pub fn new(status: u16, body: impl Into<RestBytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<RestBytes>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, body.into())
    }

    pub fn json<T: Serialize>(status: u16, payload: &T) -> RestResult<Self> {
        let body = to_vec(payload).map_err(RestError::from)?;
        Ok(Self::new(status, body).with_header("Content-Type", "application/json"))
    }
}

#[derive(Clone, Debug)]
pub struct MockRestStateSnapshot {
    pub request_count: usize,
    pub last_url: Option<String>,
    pub last_status: Option<u16>,
    pub last_error: Option<String>,
    pub behavior_remaining: usize,
    pub response_queue_len: usize,
    pub route_queue_len: usize,
    pub elapsed_total: Duration,
}

#[derive(Debug, Default)]
struct MockRestAdapterState {
    request_count: usize,
    last_url: Option<String>,
    last_status: Option<u16>,
    last_error: Option<String>,
    behavior_plan: MockBehaviorPlan,
    default_response_queue: VecDeque<MockResponse>,
    route_response_queues: HashMap<(Method, String), VecDeque<MockResponse>>,
    outbound_log: Vec<RestRequest>,
    elapsed_total: Duration,
}

impl MockRestAdapterState {
    fn snapshot(&self) -> MockRestStateSnapshot {
        MockRestStateSnapshot {
            request_count: self.request_count,
            last_url: self.last_url.clone(),
            last_status: self.last_status,
            last_error: self.last_error.clone(),
            behavior_remaining: self.behavior_plan.len(),
            response_queue_len: self.default_response_queue.len(),
            route_queue_len: self.route_response_queues.values().map(VecDeque::len).sum(),
            elapsed_total: self.elapsed_total,
        }
    }
}

/// In-memory [`RestTransport`]: records every request and answers from queued responses,
/// or fails as scripted by its [`MockBehaviorPlan`].
///
/// Route queues are keyed by method and url without its query string, so a route matches
/// whatever parameters the client appended. With nothing queued the mock answers `200`
/// with an empty body.
#[derive(Clone, Debug, Default)]
pub struct MockRestAdapter {
    state: Arc<Mutex<MockRestAdapterState>>,
}

impl MockRestAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior_plan(behavior_plan: MockBehaviorPlan) -> Self {
        let state = MockRestAdapterState {
            behavior_plan,
            ..MockRestAdapterState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn push_behavior(&self, behavior: MockBehavior) {
        self.state
            .lock()
            .expect("mock-restapi mutex poisoned while pushing behavior")
            .behavior_plan
            .push(behavior);
    }

    pub fn snapshot(&self) -> MockRestStateSnapshot {
        self.state
            .lock()
            .expect("mock-restapi mutex poisoned while taking snapshot")
            .snapshot()
    }

    pub fn queue_response(&self, response: MockResponse) {
        self.state
            .lock()
            .expect("mock-restapi mutex poisoned while queueing response")
            .default_response_queue
            .push_back(response);
    }

    pub fn queue_response_for(
        &self,
        method: Method,
        url: impl Into<String>,
        response: MockResponse,
    ) {
        let key = (method, route_of(&url.into()).to_string());
        self.state
            .lock()
            .expect("mock-restapi mutex poisoned while queueing response by route")
            .route_response_queues
            .entry(key)
            .or_default()
            .push_back(response);
    }

    pub fn queue_get_response(&self, url: impl Into<String>, response: MockResponse) {
        self.queue_response_for(Method::GET, url, response);
    }

    pub fn queue_post_response(&self, url: impl Into<String>, response: MockResponse) {
        self.queue_response_for(Method::POST, url, response);
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<RestRequest> {
        self.state
            .lock()
            .expect("mock-restapi mutex poisoned while reading outbound log")
            .outbound_log
            .clone()
    }

    pub fn last_request(&self) -> Option<RestRequest> {
        self.state
            .lock()
            .expect("mock-restapi mutex poisoned while reading outbound log")
            .outbound_log
            .last()
            .cloned()
    }

    pub fn request_count(&self) -> usize {
        self.snapshot().request_count
    }

    fn begin(&self, request: &RestRequest) -> MockBehavior {
        let mut state = self
            .state
            .lock()
            .expect("mock-restapi mutex poisoned while updating state before execute");
        state.request_count += 1;
        state.last_url = Some(request.url.clone());
        state.last_error = None;
        state.outbound_log.push(request.clone());
        state.behavior_plan.pop()
    }

    fn fail(&self, error: RestError) -> RestError {
        let mut state = self
            .state
            .lock()
            .expect("mock-restapi mutex poisoned while recording error");
        state.last_error = Some(error.message.clone());
        state.last_status = None;
        error
    }

    fn next_response(&self, request: &RestRequest) -> Option<MockResponse> {
        let mut state = self
            .state
            .lock()
            .expect("mock-restapi mutex poisoned while selecting response");
        let route_key = (request.method.clone(), route_of(&request.url).to_string());
        if let Some(response) = state
            .route_response_queues
            .get_mut(&route_key)
            .and_then(VecDeque::pop_front)
        {
            return Some(response);
        }
        state.default_response_queue.pop_front()
    }

    fn complete(&self, response: MockResponse, start: Instant) -> RestResponse {
        let elapsed = start.elapsed();
        let mut state = self
            .state
            .lock()
            .expect("mock-restapi mutex poisoned while recording response");
        state.last_status = Some(response.status);
        state.elapsed_total += elapsed;
        RestResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
            elapsed,
        }
    }
}

impl RestTransport for MockRestAdapter {
    fn execute(&self, request: RestRequest) -> RestFuture<RestResult<RestResponse>> {
        let adapter = self.clone();
        Box::pin(async move {
            let start = Instant::now();
            let behavior = adapter.begin(&request);

            if let MockBehavior::Delay(duration) = &behavior {
                std::thread::sleep(*duration);
            }
            if let Some(error) = behavior.into_error() {
                return Err(adapter.fail(error));
            }

            let response = adapter
                .next_response(&request)
                .unwrap_or_else(|| MockResponse::new(200, Bytes::new()));
            Ok(adapter.complete(response, start))
        })
    }
}

fn route_of(url: &str) -> &str {
    url.split_once('?').map_or(url, |(route, _)| route)
}
