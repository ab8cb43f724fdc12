use axum::Router;
use axum::extract::RawQuery;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use service_restapi::{
    CallError, ClientConfig, Dispatch, FailurePolicy, Params, RestErrorKind, ServiceClient,
    WireValue,
};
use tokio::net::TcpListener;

#[tokio::test]
async fn e2e_query_string_carries_key_and_encoded_params() {
    let server = TestServer::start().await;
    let client = ServiceClient::with_config("abc", server.config());
    let mut params = Params::new();
    params.insert(
        "since".to_string(),
        Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap().into(),
    );
    params.insert("skip".to_string(), WireValue::Null);

    let response = client
        .get("/v1/query", Some(&params))
        .await
        .expect("request should be built")
        .into_result()
        .expect("server should answer");

    assert_eq!(response.status(), 200);
    assert_eq!(response.text(), "since=2024-03-05T07%3A08%3A09Z&token=abc");
}

#[tokio::test]
async fn e2e_body_and_headers_reach_the_server() {
    let server = TestServer::start().await;
    let client = ServiceClient::with_config("abc", server.config());
    let body = WireValue::map([
        ("amount", WireValue::from(Decimal::new(250, 2))),
        ("ok", WireValue::from(true)),
    ]);

    let response = client
        .post("/v1/echo", None, &body)
        .await
        .expect("request should be built")
        .into_result()
        .expect("server should answer");

    assert_eq!(response.status(), 201);
    assert_eq!(response.text(), r#"application/json {"amount":"2.50","ok":true}"#);
}

#[tokio::test]
async fn e2e_listing_not_found_is_a_completed_response() {
    let server = TestServer::start().await;
    let client = ServiceClient::with_config("abc", server.config());

    let dispatch = client
        .listings()
        .get("missing", None)
        .await
        .expect("request should be built");

    let response = dispatch.response().expect("server should answer");
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn e2e_refused_connection_is_absorbed_or_propagated() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let config = ClientConfig::new(&format!("http://{addr}/")).expect("valid url");

    let client = ServiceClient::with_config("abc", config.clone());
    let dispatch = client
        .get("/v1/query", None)
        .await
        .expect("absorbed failure is not an error");
    match dispatch {
        Dispatch::Failed(err) => assert_eq!(err.kind(), RestErrorKind::Connect),
        Dispatch::Completed(response) => panic!("unexpected response {}", response.status()),
    }

    let client =
        ServiceClient::with_config("abc", config.with_failure_policy(FailurePolicy::Propagate));
    let err = client
        .get("/v1/query", None)
        .await
        .expect_err("propagated failure is an error");
    assert!(matches!(err, CallError::Transport(_)));
}

struct TestServer {
    base_url: String,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let app = Router::new()
            .route("/v1/query", get(query_handler))
            .route("/v1/echo", post(echo_handler))
            .route("/listings/{id}", get(listing_handler));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let base_url = format!("http://{}/", addr);

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { base_url, task }
    }

    fn config(&self) -> ClientConfig {
        ClientConfig::new(&self.base_url).expect("test server url is valid")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn query_handler(RawQuery(query): RawQuery) -> (StatusCode, String) {
    (StatusCode::OK, query.unwrap_or_default())
}

async fn echo_handler(headers: HeaderMap, body: String) -> (StatusCode, String) {
    let content_type = headers
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    (StatusCode::CREATED, format!("{content_type} {body}"))
}

async fn listing_handler() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "no such listing")
}
