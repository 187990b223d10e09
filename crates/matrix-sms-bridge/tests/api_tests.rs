//! Integration tests for the bridge HTTP API.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    Router,
};
use matrix_client::MatrixClient;
use matrix_sms_bridge::{
    api::{create_router_with_rate_limit, AppState, RateLimitState, ADMIN_TOKEN_HEADER},
    registry::{MappingRegistry, TokenRegistry},
    AcrobitsPushClient, SessionManager,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ADMIN_TOKEN: &str = "test-admin-token";
const USER: &str = "@alice:example.com";
const PASSWORD: &str = "secret";

struct TestEnv {
    homeserver: MockServer,
    pnm: MockServer,
}

impl TestEnv {
    async fn start() -> Self {
        Self {
            homeserver: MockServer::start().await,
            pnm: MockServer::start().await,
        }
    }

    fn state(&self, admin_token: Option<&str>) -> AppState {
        let matrix = Arc::new(
            MatrixClient::new(self.homeserver.uri(), Duration::from_secs(5)).unwrap(),
        );
        let relay = AcrobitsPushClient::new(
            format!("{}/pnm2/send", self.pnm.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        let sessions = Arc::new(SessionManager::new(matrix.clone(), Duration::from_secs(60)));

        AppState::new(
            matrix,
            Arc::new(relay),
            sessions,
            TokenRegistry::in_memory(),
            MappingRegistry::in_memory(),
            admin_token.map(|t| SecretString::new(t.to_string())),
        )
    }

    fn app(&self) -> Router {
        create_router_with_rate_limit(self.state(Some(ADMIN_TOKEN)), RateLimitState::permissive())
    }

    async fn mount_login(&self) {
        Mock::given(method("POST"))
            .and(path("/_matrix/client/v3/login"))
            .and(body_partial_json(json!({"password": PASSWORD})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user_id": USER,
                "access_token": "syt_access",
                "device_id": "DEVICE"
            })))
            .mount(&self.homeserver)
            .await;
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn from_peer(mut request: Request<Body>, peer: [u8; 4]) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
    request
}

/// Internal API request from localhost with the admin token.
fn admin_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ADMIN_TOKEN_HEADER, ADMIN_TOKEN);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    from_peer(builder.body(body).unwrap(), [127, 0, 0, 1])
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn map_number(app: &Router) {
    let (status, _) = call(
        app,
        admin_request(
            "POST",
            "/api/internal/map_sms_to_matrix",
            Some(json!({
                "sms_number": "+1234567890",
                "matrix_id": "@bob:example.com",
                "room_id": "!room:example.com"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_endpoint() {
    let env = TestEnv::start().await;
    Mock::given(method("GET"))
        .and(path("/_matrix/client/versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"versions": ["v1.11"]})))
        .mount(&env.homeserver)
        .await;

    let (status, json) = call(
        &env.app(),
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["homeserver_reachable"], true);
    assert_eq!(json["cached_sessions"], 0);
    assert_eq!(json["push_tokens"], 0);
    assert_eq!(json["mappings"], 0);
}

#[tokio::test]
async fn test_send_message_to_mapped_number() {
    let env = TestEnv::start().await;
    env.mount_login().await;
    Mock::given(method("PUT"))
        .and(path_regex(
            r"^/_matrix/client/v3/rooms/%21room%3Aexample\.com/send/m\.room\.message/[0-9a-f]+$",
        ))
        .and(header("authorization", "Bearer syt_access"))
        .and(body_partial_json(json!({"msgtype": "m.text", "body": "hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "$sent1"})))
        .expect(1)
        .mount(&env.homeserver)
        .await;

    let app = env.app();
    map_number(&app).await;

    let (status, json) = call(
        &app,
        json_request(
            "POST",
            "/api/client/send_message",
            json!({
                "from": USER,
                "password": PASSWORD,
                "sms_to": "+1234567890",
                "sms_body": "hello",
                "content_type": "text/plain"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sms_id"], "$sent1");
}

#[tokio::test]
async fn test_send_message_unmapped_number() {
    let env = TestEnv::start().await;
    env.mount_login().await;

    let (status, json) = call(
        &env.app(),
        json_request(
            "POST",
            "/api/client/send_message",
            json!({
                "from": USER,
                "password": PASSWORD,
                "sms_to": "+1999999999",
                "sms_body": "hello"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_RECIPIENT");
}

#[tokio::test]
async fn test_send_message_wrong_password() {
    let env = TestEnv::start().await;
    env.mount_login().await;
    Mock::given(method("POST"))
        .and(path("/_matrix/client/v3/login"))
        .and(body_partial_json(json!({"password": "wrong"})))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errcode": "M_FORBIDDEN",
            "error": "Invalid username or password"
        })))
        .mount(&env.homeserver)
        .await;

    let (status, json) = call(
        &env.app(),
        json_request(
            "POST",
            "/api/client/send_message",
            json!({
                "from": USER,
                "password": "wrong",
                "sms_to": "+1234567890",
                "sms_body": "hello"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "AUTHENTICATION_FAILED");
}

#[tokio::test]
async fn test_send_message_login_rate_limited() {
    let env = TestEnv::start().await;
    Mock::given(method("POST"))
        .and(path("/_matrix/client/v3/login"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "errcode": "M_LIMIT_EXCEEDED",
            "error": "Too many requests",
            "retry_after_ms": 2000
        })))
        .mount(&env.homeserver)
        .await;

    let (status, json) = call(
        &env.app(),
        json_request(
            "POST",
            "/api/client/send_message",
            json!({
                "from": USER,
                "password": PASSWORD,
                "sms_to": "+1234567890",
                "sms_body": "hello"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "UPSTREAM_FAILURE");
}

#[tokio::test]
async fn test_fetch_messages() {
    let env = TestEnv::start().await;
    env.mount_login().await;
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v3/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "next_batch": "s1",
            "rooms": {
                "join": {
                    "!room:example.com": {
                        "timeline": {
                            "events": [
                                {
                                    "event_id": "$in1",
                                    "sender": "@bob:example.com",
                                    "origin_server_ts": 1_700_000_000_000_i64,
                                    "type": "m.room.message",
                                    "content": {"msgtype": "m.text", "body": "Received message"}
                                },
                                {
                                    "event_id": "$out1",
                                    "sender": "@Alice:Example.com",
                                    "origin_server_ts": 1_700_000_001_000_i64,
                                    "type": "m.room.message",
                                    "content": {"msgtype": "m.text", "body": "Sent message"}
                                }
                            ]
                        }
                    }
                }
            }
        })))
        .mount(&env.homeserver)
        .await;

    let (status, json) = call(
        &env.app(),
        json_request(
            "POST",
            "/api/client/fetch_messages",
            json!({"username": USER, "password": PASSWORD, "last_id": "", "last_sent_id": ""}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["date"].as_str().is_some());
    assert_eq!(json["received_smss"].as_array().unwrap().len(), 1);
    assert_eq!(json["received_smss"][0]["sms_id"], "$in1");
    assert_eq!(json["received_smss"][0]["sms_text"], "Received message");
    assert_eq!(json["received_smss"][0]["stream_id"], "!room:example.com");
    assert_eq!(json["sent_smss"].as_array().unwrap().len(), 1);
    assert_eq!(json["sent_smss"][0]["sms_id"], "$out1");
}

#[tokio::test]
async fn test_push_token_report_and_notify() {
    let env = TestEnv::start().await;
    Mock::given(method("POST"))
        .and(path("/pnm2/send"))
        .and(body_partial_json(json!({
            "verb": "NotifyTextMessage",
            "AppId": "app.x",
            "DeviceToken": "tok-A",
            "Selector": "sel-1",
            "Sound": "bing",
            "Badge": 5,
            "Message": "Hello World"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "response": "Your message was sent."
        })))
        .expect(1)
        .mount(&env.pnm)
        .await;

    let app = env.app();

    let (status, _) = call(
        &app,
        json_request(
            "POST",
            "/api/client/push_token_report",
            json!({
                "selector": "sel-1",
                "token_msgs": "tok-A",
                "appid_msgs": "app.x",
                "token_calls": "tok-call",
                "appid_calls": "app.x.pushkit"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(
        &app,
        json_request(
            "POST",
            "/_matrix/push/v1/notify",
            json!({
                "notification": {
                    "content": {"body": "Hello World", "msgtype": "m.text"},
                    "counts": {"unread": 5},
                    "devices": [
                        {"app_id": "app.x", "pushkey": "tok-A", "tweaks": {"sound": "bing"}},
                        {"app_id": "app.x", "pushkey": "unknown-token"}
                    ],
                    "event_id": "$event123",
                    "room_id": "!room:example.org",
                    "sender": "@alice:example.org"
                }
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"rejected": ["unknown-token"]}));
}

#[tokio::test]
async fn test_notify_relay_failure_rejects_pushkey() {
    let env = TestEnv::start().await;
    Mock::given(method("POST"))
        .and(path("/pnm2/send"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&env.pnm)
        .await;

    let app = env.app();
    call(
        &app,
        json_request(
            "POST",
            "/api/client/push_token_report",
            json!({"selector": "sel-1", "token_msgs": "tok-A", "appid_msgs": "app.x"}),
        ),
    )
    .await;

    let (status, json) = call(
        &app,
        json_request(
            "POST",
            "/_matrix/push/v1/notify",
            json!({"notification": {"devices": [{"app_id": "app.x", "pushkey": "tok-A"}]}}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["rejected"], json!(["tok-A"]));
}

#[tokio::test]
async fn test_push_token_report_empty_selector() {
    let env = TestEnv::start().await;

    let (status, json) = call(
        &env.app(),
        json_request(
            "POST",
            "/api/client/push_token_report",
            json!({"selector": "", "token_msgs": "tok"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_app_transaction_acknowledged() {
    let env = TestEnv::start().await;

    let (status, json) = call(
        &env.app(),
        json_request(
            "PUT",
            "/_matrix/app/v1/transactions/txn123",
            json!({"events": [], "other": "value"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({}));
}

#[tokio::test]
async fn test_mapping_roundtrip_through_internal_api() {
    let env = TestEnv::start().await;
    let app = env.app();

    let (status, _) = call(
        &app,
        admin_request("GET", "/api/internal/map_sms_to_matrix?sms_number=%2B1234567890", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    map_number(&app).await;

    let (status, json) = call(
        &app,
        admin_request("GET", "/api/internal/map_sms_to_matrix?sms_number=%2B1234567890", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["matrix_id"], "@bob:example.com");
    assert_eq!(json["room_id"], "!room:example.com");
    assert!(json["updated_at"].as_str().is_some());

    let (status, _) = call(
        &app,
        admin_request("GET", "/api/internal/map_sms_to_matrix", None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_internal_push_token_management() {
    let env = TestEnv::start().await;
    let app = env.app();

    call(
        &app,
        json_request(
            "POST",
            "/api/client/push_token_report",
            json!({"selector": "sel-1", "token_msgs": "tok-A", "appid_msgs": "app.x"}),
        ),
    )
    .await;

    let (status, json) = call(&app, admin_request("GET", "/api/internal/push_tokens", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["selector"], "sel-1");

    let (status, _) = call(
        &app,
        admin_request("DELETE", "/api/internal/push_tokens/sel-1", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Deleting again still succeeds
    let (status, _) = call(
        &app,
        admin_request("DELETE", "/api/internal/push_tokens/sel-1", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = call(&app, admin_request("GET", "/api/internal/push_tokens", None)).await;
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn test_internal_api_access_control() {
    let env = TestEnv::start().await;
    let app = env.app();

    // No peer address at all
    let request = Request::builder()
        .uri("/api/internal/push_tokens")
        .header(ADMIN_TOKEN_HEADER, ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Remote peer with a valid token
    let request = Request::builder()
        .uri("/api/internal/push_tokens")
        .header(ADMIN_TOKEN_HEADER, ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap();
    let (status, json) = call(&app, from_peer(request, [192, 168, 1, 10])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");

    // Local peer with a wrong token
    let request = Request::builder()
        .uri("/api/internal/push_tokens")
        .header(ADMIN_TOKEN_HEADER, "nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, from_peer(request, [127, 0, 0, 1])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Local peer without a token
    let request = Request::builder()
        .uri("/api/internal/push_tokens")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, from_peer(request, [127, 0, 0, 1])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_internal_api_disabled_without_token() {
    let env = TestEnv::start().await;
    let app = create_router_with_rate_limit(env.state(None), RateLimitState::permissive());

    let (status, json) = call(&app, admin_request("GET", "/api/internal/push_tokens", None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn test_client_rate_limit() {
    let env = TestEnv::start().await;
    let app = create_router_with_rate_limit(env.state(Some(ADMIN_TOKEN)), RateLimitState::new(1));

    let report = || {
        json_request(
            "POST",
            "/api/client/push_token_report",
            json!({"selector": "sel-1", "token_msgs": "tok-A", "appid_msgs": "app.x"}),
        )
    };

    let (status, _) = call(&app, report()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(&app, report()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["code"], "RATE_LIMIT_EXCEEDED");

    // Homeserver callbacks are not rate limited
    let (status, _) = call(
        &app,
        json_request(
            "POST",
            "/_matrix/push/v1/notify",
            json!({"notification": {"devices": []}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
