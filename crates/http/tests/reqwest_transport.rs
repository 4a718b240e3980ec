//! `ReqwestTransport` against a local HTTP server that echoes what it received.

use std::sync::Arc;

use axum::extract::RawQuery;
use axum::http::{HeaderMap, Method as WireMethod, StatusCode};
use axum::routing::{any, get};
use axum::{Json, Router};
use courier_core::{
    CallerIdentity, CookieStoreId, Credential, CredentialPolicy, CredentialResolver,
    CredentialsMode, Descriptor, Dispatcher, HttpTransport, MemoryCredentialStore, Message,
    Method, Pipeline, PreparedRequest, Registry, Reply, RequestBody, TabId, TransportError,
    CREDENTIAL_HEADER,
};
use courier_http::{Jar, ReqwestTransport, TransportConfig};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Echo server
// ---------------------------------------------------------------------------

async fn echo(
    method: WireMethod,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: String,
) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "method": method.as_str(),
        "query": query,
        "cookie": header("cookie"),
        "credential": header(CREDENTIAL_HEADER),
        "contentType": header("content-type"),
        "userAgent": header("user-agent"),
        "body": body,
    }))
}

async fn missing() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "no such thing")
}

async fn start_server() -> String {
    let app = Router::new()
        .route("/echo", any(echo))
        .route("/missing", get(missing));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn request(method: Method, url: String) -> PreparedRequest {
    PreparedRequest {
        method,
        url,
        headers: Vec::new(),
        credentials: None,
        body: None,
    }
}

async fn echoed(transport: &ReqwestTransport, request: PreparedRequest) -> Value {
    let response = transport.send(request).await.unwrap();
    assert_eq!(response.status, 200);
    response.json().unwrap()
}

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_sends_query_without_body() {
    let base = start_server().await;
    let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();

    let echo = echoed(&transport, request(Method::Get, format!("{base}/echo?pn=1&ps=10"))).await;

    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["query"], "pn=1&ps=10");
    assert_eq!(echo["body"], "");
}

#[tokio::test]
async fn form_post_carries_body_and_declared_content_type() {
    let base = start_server().await;
    let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();
    let mut post = request(Method::Post, format!("{base}/echo"));
    post.headers.push((
        "Content-Type".to_string(),
        "application/x-www-form-urlencoded".to_string(),
    ));
    post.body = Some(RequestBody::Form("fid=42&act=1".to_string()));

    let echo = echoed(&transport, post).await;

    assert_eq!(echo["method"], "POST");
    assert_eq!(echo["contentType"], "application/x-www-form-urlencoded");
    assert_eq!(echo["body"], "fid=42&act=1");
}

#[tokio::test]
async fn user_agent_is_applied() {
    let base = start_server().await;
    let transport = ReqwestTransport::new(TransportConfig {
        user_agent: Some("courier-test/1".to_string()),
        ..TransportConfig::default()
    })
    .unwrap();

    let echo = echoed(&transport, request(Method::Get, format!("{base}/echo"))).await;
    assert_eq!(echo["userAgent"], "courier-test/1");
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[tokio::test]
async fn credential_header_passes_through_unchanged_by_default() {
    let base = start_server().await;
    let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();
    let mut get = request(Method::Get, format!("{base}/echo"));
    get.headers
        .push((CREDENTIAL_HEADER.to_string(), "SESSDATA=work".to_string()));

    let echo = echoed(&transport, get).await;

    assert_eq!(echo["credential"], "SESSDATA=work");
    assert_eq!(echo["cookie"], Value::Null);
}

#[tokio::test]
async fn rewrite_moves_credential_header_into_cookie() {
    let base = start_server().await;
    let jar = Arc::new(Jar::default());
    jar.add_cookie_str("SESSDATA=ambient", &base.parse().unwrap());
    let transport = ReqwestTransport::with_cookie_jar(
        TransportConfig {
            rewrite_credential_header: true,
            ..TransportConfig::default()
        },
        jar,
    )
    .unwrap();
    let mut get = request(Method::Get, format!("{base}/echo"));
    get.headers
        .push((CREDENTIAL_HEADER.to_string(), "SESSDATA=work".to_string()));

    let echo = echoed(&transport, get).await;

    assert_eq!(echo["cookie"], "SESSDATA=work");
    assert_eq!(echo["credential"], Value::Null);
}

#[tokio::test]
async fn ambient_cookies_follow_the_credentials_mode() {
    let base = start_server().await;
    let jar = Arc::new(Jar::default());
    jar.add_cookie_str("SESSDATA=ambient", &base.parse().unwrap());
    let transport = ReqwestTransport::with_cookie_jar(TransportConfig::default(), jar).unwrap();

    let mut include = request(Method::Get, format!("{base}/echo"));
    include.credentials = Some(CredentialsMode::Include);
    assert_eq!(echoed(&transport, include).await["cookie"], "SESSDATA=ambient");

    let mut omit = request(Method::Get, format!("{base}/echo"));
    omit.credentials = Some(CredentialsMode::Omit);
    assert_eq!(echoed(&transport, omit).await["cookie"], Value::Null);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_success_status_is_returned_not_raised() {
    let base = start_server().await;
    let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();

    let response = transport
        .send(request(Method::Get, format!("{base}/missing")))
        .await
        .unwrap();

    assert_eq!(response.status, 404);
    assert!(!response.is_success());
    assert_eq!(response.text(), "no such thing");
}

#[tokio::test]
async fn unreachable_host_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();

    let err = transport
        .send(request(Method::Get, format!("http://{addr}/echo")))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Network { .. }));
}

// ---------------------------------------------------------------------------
// Through the dispatcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispatcher_round_trip_over_the_wire() {
    let base = start_server().await;
    let mut builder = Registry::builder();
    builder
        .descriptor(
            "echoFeed",
            Descriptor::get(format!("{base}/echo"))
                .with_param("pn", 1)
                .with_param("rid", 231)
                .with_pipeline(Pipeline::json_deliver()),
        )
        .unwrap();
    let store = CookieStoreId::new("firefox-container-1").unwrap();
    let credentials = MemoryCredentialStore::default()
        .with_store(store.clone(), vec![Credential::new("SESSDATA", "work")]);
    let dispatcher = Dispatcher::new(
        Arc::new(builder.build()),
        Arc::new(ReqwestTransport::new(TransportConfig::default()).unwrap()),
        CredentialResolver::new(CredentialPolicy::isolated(), Arc::new(credentials)),
    );
    let (reply, rx) = Reply::channel();

    dispatcher
        .dispatch(
            Message::new("echoFeed").with_field("rid", 0),
            Some(CallerIdentity::in_store(TabId::new(3), store)),
            Some(reply),
        )
        .await;

    let echo = rx.await.unwrap();
    assert_eq!(echo["query"], "pn=1");
    assert_eq!(echo["credential"], "SESSDATA=work");
}
