//! End-to-end route tests: the full router over an in-memory ledger and a
//! mocked panel.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use vpnsub_api::state::{AppConfig, AppState};
use vpnsub_core::IdentityId;
use vpnsub_engine::{EngineConfig, Provisioner};
use vpnsub_ledger::Ledger;
use vpnsub_panel_client::{EndpointSelector, PanelClient, PanelConfig};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zeroize::Zeroizing;

const TOKEN: &str = "front-end-token";
const ADMIN: i64 = 7;

// ── Helpers ─────────────────────────────────────────────────────────

fn engine_config() -> EngineConfig {
    EngineConfig {
        public_host: "vpn.example.com".to_string(),
        selector: EndpointSelector::default(),
        validity_days: 30,
        price: 199,
        currency: "RUB".to_string(),
        watch_interval: Duration::from_secs(60),
        privileged: BTreeSet::from([IdentityId(ADMIN)]),
    }
}

async fn mount_panel(mock_server: &MockServer, add_client_status: u16) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/panel/inbound/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "obj": [{
                "id": 2,
                "remark": "reality-main",
                "port": 443,
                "protocol": "vless",
                "settings": "{\"clients\":[]}",
                "streamSettings": {
                    "network": "tcp",
                    "security": "reality",
                    "realitySettings": {
                        "publicKey": "PK",
                        "serverNames": ["example.com"],
                        "shortIds": ["ab"]
                    }
                }
            }]
        })))
        .mount(mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/panel/inbound/addClient"))
        .respond_with(
            ResponseTemplate::new(add_client_status)
                .set_body_json(json!({"success": add_client_status == 200})),
        )
        .mount(mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/panel/inbound/delClient/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(mock_server)
        .await;
}

async fn test_app(mock_server: &MockServer) -> Router {
    let ledger = Ledger::in_memory().await.unwrap();
    let panel = PanelClient::new(PanelConfig::local_mock(&mock_server.uri()).unwrap()).unwrap();
    let provisioner = Provisioner::new(ledger, panel, Arc::new(engine_config()));
    let config = AppConfig {
        auth_token: Some(Zeroizing::new(TOKEN.to_string())),
        ..AppConfig::default()
    };
    vpnsub_api::app(AppState::new(config, provisioner))
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, body)
}

async fn open_payment(app: &Router, identity: i64) -> String {
    let (status, body) = send(app, "POST", &format!("/v1/identities/{identity}/payments")).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["payment"]["id"].as_str().unwrap().to_string()
}

// ── Health and auth ─────────────────────────────────────────────────

#[tokio::test]
async fn health_probes_need_no_token() {
    let mock_server = MockServer::start().await;
    let app = test_app(&mock_server).await;

    for (uri, expected) in [("/health/liveness", "ok"), ("/health/readiness", "ready")] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], expected.as_bytes());
    }
}

#[tokio::test]
async fn api_routes_require_token() {
    let mock_server = MockServer::start().await;
    let app = test_app(&mock_server).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/identities/42/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

// ── Purchase and confirmation ───────────────────────────────────────

#[tokio::test]
async fn purchase_then_confirm_provisions_subscription() {
    let mock_server = MockServer::start().await;
    mount_panel(&mock_server, 200).await;
    let app = test_app(&mock_server).await;

    let payment_id = open_payment(&app, 42).await;

    // A second start resumes the same payment.
    let (status, body) = send(&app, "POST", "/v1/identities/42/payments").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "pending");
    assert_eq!(body["resumed"], true);
    assert_eq!(body["payment"]["id"], payment_id.as_str());

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/identities/42/payments/{payment_id}/confirm"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["outcome"], "provisioned");
    assert_eq!(body["replayed"], false);
    let subscription = &body["subscription"];
    assert_eq!(subscription["status"], "active");
    assert_eq!(subscription["payment_id"], payment_id.as_str());
    assert!(subscription["connection_descriptor"]
        .as_str()
        .unwrap()
        .starts_with("vless://"));

    // Replaying the confirmation returns the same subscription.
    let (status, replay) = send(
        &app,
        "POST",
        &format!("/v1/identities/42/payments/{payment_id}/confirm"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["replayed"], true);
    assert_eq!(replay["subscription"]["id"], subscription["id"]);

    let (status, active) = send(&app, "GET", "/v1/identities/42/subscription").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["id"], subscription["id"]);

    let (status, latest) = send(&app, "GET", "/v1/identities/42/subscription/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["id"], subscription["id"]);

    // Covered identities are told so instead of being charged again.
    let (status, body) = send(&app, "POST", "/v1/identities/42/payments").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "already_active");
}

#[tokio::test]
async fn confirming_another_identitys_payment_is_forbidden() {
    let mock_server = MockServer::start().await;
    let app = test_app(&mock_server).await;

    let payment_id = open_payment(&app, 42).await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/identities/43/payments/{payment_id}/confirm"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn confirming_unknown_payment_is_not_found() {
    let mock_server = MockServer::start().await;
    let app = test_app(&mock_server).await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/identities/42/payments/5f0c6b7e-3d52-4c1e-9a51-0a4f3b2c1d00/confirm",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn panel_failure_is_bad_gateway() {
    let mock_server = MockServer::start().await;
    mount_panel(&mock_server, 500).await;
    let app = test_app(&mock_server).await;

    let payment_id = open_payment(&app, 42).await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/identities/42/payments/{payment_id}/confirm"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "PANEL_ERROR");

    let (status, _) = send(&app, "GET", "/v1/identities/42/subscription").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_path_is_bad_request() {
    let mock_server = MockServer::start().await;
    let app = test_app(&mock_server).await;

    let (status, body) = send(&app, "POST", "/v1/identities/not-a-number/payments").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = send(&app, "POST", "/v1/identities/42/payments/not-a-uuid/confirm").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Queries ─────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_subscription_is_not_found() {
    let mock_server = MockServer::start().await;
    let app = test_app(&mock_server).await;

    let (status, _) = send(&app, "GET", "/v1/identities/42/subscription").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", "/v1/identities/42/subscription/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Grants ──────────────────────────────────────────────────────────

#[tokio::test]
async fn grant_issues_once_for_privileged_identity() {
    let mock_server = MockServer::start().await;
    mount_panel(&mock_server, 200).await;
    let app = test_app(&mock_server).await;

    let (status, body) = send(&app, "POST", &format!("/v1/identities/{ADMIN}/grant")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["granted"], true);
    assert!(body["subscription"]["credential_label"]
        .as_str()
        .unwrap()
        .starts_with(&format!("admin{ADMIN}-")));

    let (status, body) = send(&app, "POST", &format!("/v1/identities/{ADMIN}/grant")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["granted"], false);
    assert!(body["subscription"].is_null());

    let (status, body) = send(&app, "GET", &format!("/v1/identities/{ADMIN}/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identity"], ADMIN);
    assert_eq!(body["privileged"], true);
    assert!(body["active_subscription"].is_object());
}

#[tokio::test]
async fn grant_for_ordinary_identity_is_a_no_op() {
    let mock_server = MockServer::start().await;
    let app = test_app(&mock_server).await;

    let (status, body) = send(&app, "POST", "/v1/identities/42/grant").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["granted"], false);

    let (status, body) = send(&app, "GET", "/v1/identities/42/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["privileged"], false);
    assert!(body["active_subscription"].is_null());
}
