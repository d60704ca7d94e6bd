//! Contract tests for PanelClient against a mocked x-ui / 3x-ui panel.
//!
//! ## Endpoints Tested
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | POST   | `/login` | `login_*`, `expired_session_*` |
//! | GET    | `/panel/inbound/list` | `list_*`, `resolve_*` |
//! | POST   | `/panel/inbound/addClient` | `add_client_*` |
//! | POST   | `/panel/inbound/delClient/{id}/{secret}` | `remove_client_*` |
//! | POST   | `/panel/inbound/delClient` | `remove_client_falls_back_*` |

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use vpnsub_panel_client::{EndpointSelector, PanelClient, PanelConfig, PanelError};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "11111111-1111-1111-1111-111111111111";

fn test_client(mock_server: &MockServer) -> PanelClient {
    let config = PanelConfig::local_mock(&mock_server.uri()).unwrap();
    PanelClient::new(config).unwrap()
}

async fn mount_login(mock_server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("username=admin"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=abc; Path=/")
                .set_body_json(json!({"success": true, "msg": "ok", "obj": null})),
        )
        .expect(expected)
        .mount(mock_server)
        .await;
}

fn listing() -> serde_json::Value {
    json!({
        "success": true,
        "msg": "",
        "obj": [
            {
                "id": 1,
                "remark": "legacy",
                "port": 8443,
                "protocol": "vmess",
                "settings": "{}",
                "streamSettings": "{}"
            },
            {
                "id": 2,
                "remark": "reality-main",
                "port": 443,
                "protocol": "vless",
                "settings": "{\"clients\":[]}",
                "streamSettings": "{\"network\":\"tcp\",\"security\":\"reality\",\"realitySettings\":{\"publicKey\":\"PK\"}}"
            },
            {"remark": "broken entry"}
        ]
    })
}

// ── POST /login ─────────────────────────────────────────────────────

#[tokio::test]
async fn login_happens_once_before_first_call() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 1).await;
    Mock::given(method("GET"))
        .and(path("/panel/inbound/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    assert_eq!(client.list_endpoints().await.unwrap().len(), 2);
    assert_eq!(client.list_endpoints().await.unwrap().len(), 2);
}

#[tokio::test]
async fn login_plain_text_success_opens_session() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/panel/inbound/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    assert_eq!(client.list_endpoints().await.unwrap().len(), 2);
}

#[tokio::test]
async fn login_rejection_surfaces_panel_message() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "msg": "wrong password"})),
        )
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    match client.list_endpoints().await.unwrap_err() {
        PanelError::Rejected { message, .. } => assert_eq!(message, "wrong password"),
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn login_http_failure_is_an_api_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    match client.login().await.unwrap_err() {
        PanelError::Api { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected Api, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_session_triggers_one_relogin_and_retry() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 2).await;
    Mock::given(method("GET"))
        .and(path("/panel/inbound/list"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/panel/inbound/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    assert_eq!(client.list_endpoints().await.unwrap().len(), 2);
}

#[tokio::test]
async fn expired_session_twice_propagates_the_second_failure() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 2).await;
    Mock::given(method("GET"))
        .and(path("/panel/inbound/list"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    match client.list_endpoints().await.unwrap_err() {
        PanelError::Api { status, .. } => assert_eq!(status, 403),
        other => panic!("expected Api, got {other:?}"),
    }
}

#[tokio::test]
async fn base_path_prefix_is_preserved() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/secret-base/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secret-base/panel/inbound/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = PanelConfig::local_mock(&format!("{}/secret-base", mock_server.uri())).unwrap();
    let client = PanelClient::new(config).unwrap();
    assert_eq!(client.list_endpoints().await.unwrap().len(), 2);
}

#[tokio::test]
async fn slow_panel_surfaces_timeout() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 1).await;
    Mock::given(method("GET"))
        .and(path("/panel/inbound/list"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let mut config = PanelConfig::local_mock(&mock_server.uri()).unwrap();
    config.timeout_secs = 1;
    let client = PanelClient::new(config).unwrap();
    let err = client.list_endpoints().await.unwrap_err();
    assert!(matches!(err, PanelError::Timeout { .. }), "got {err:?}");
}

// ── GET /panel/inbound/list ─────────────────────────────────────────

#[tokio::test]
async fn list_parses_nested_listing_envelope() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 1).await;
    Mock::given(method("GET"))
        .and(path("/panel/inbound/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "obj": {"list": [{"id": 5, "protocol": "vless", "port": 2053}]}
        })))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let endpoints = client.list_endpoints().await.unwrap();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].id, 5);
    assert_eq!(endpoints[0].port, 2053);
}

#[tokio::test]
async fn list_rejects_non_json_body() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 1).await;
    Mock::given(method("GET"))
        .and(path("/panel/inbound/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let err = client.list_endpoints().await.unwrap_err();
    assert!(matches!(err, PanelError::Deserialization { .. }), "got {err:?}");
}

#[tokio::test]
async fn resolve_by_label_then_protocol_then_id() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 1).await;
    Mock::given(method("GET"))
        .and(path("/panel/inbound/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);

    let by_label = client
        .resolve_endpoint(&EndpointSelector::by_label("legacy"))
        .await
        .unwrap();
    assert_eq!(by_label.id, 1);

    let by_protocol = client
        .resolve_endpoint(&EndpointSelector::default())
        .await
        .unwrap();
    assert_eq!(by_protocol.id, 2);
    assert_eq!(by_protocol.stream_settings["realitySettings"]["publicKey"], "PK");

    let missing = client
        .resolve_endpoint(&EndpointSelector::by_id(99))
        .await
        .unwrap_err();
    assert!(matches!(missing, PanelError::NotFound(_)));
}

// ── POST /panel/inbound/addClient ───────────────────────────────────

#[tokio::test]
async fn add_client_sends_settings_as_json_string() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 1).await;
    Mock::given(method("POST"))
        .and(path("/panel/inbound/addClient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let expires_at = Utc.with_ymd_and_hms(2026, 11, 15, 0, 0, 0).unwrap();
    client
        .add_client(2, SECRET, "tg42-11111111", expires_at)
        .await
        .unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let add = requests
        .iter()
        .find(|r| r.url.path() == "/panel/inbound/addClient")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&add.body).unwrap();
    assert_eq!(body["id"], 2);
    let settings: serde_json::Value =
        serde_json::from_str(body["settings"].as_str().unwrap()).unwrap();
    let client_entry = &settings["clients"][0];
    assert_eq!(client_entry["id"], SECRET);
    assert_eq!(client_entry["email"], "tg42-11111111");
    assert_eq!(client_entry["flow"], "xtls-rprx-vision");
    assert_eq!(client_entry["limitIp"], 0);
    assert_eq!(client_entry["totalGB"], 0);
    assert_eq!(client_entry["enable"], true);
    assert_eq!(client_entry["expiryTime"], expires_at.timestamp_millis());
}

#[tokio::test]
async fn add_client_accepts_plain_text_success() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 1).await;
    Mock::given(method("POST"))
        .and(path("/panel/inbound/addClient"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    client
        .add_client(2, SECRET, "tg42-11111111", Utc::now())
        .await
        .unwrap();
}

#[tokio::test]
async fn add_client_rejection_is_an_error() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 1).await;
    Mock::given(method("POST"))
        .and(path("/panel/inbound/addClient"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "msg": "Duplicate email"})),
        )
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let err = client
        .add_client(2, SECRET, "tg42-11111111", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::Rejected { .. }), "got {err:?}");
}

// ── POST /panel/inbound/delClient ───────────────────────────────────

#[tokio::test]
async fn remove_client_uses_path_form_first() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("/panel/inbound/delClient/2/{SECRET}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/panel/inbound/delClient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    client.remove_client(2, SECRET).await.unwrap();
}

#[tokio::test]
async fn remove_client_plain_text_success_skips_fallback() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("/panel/inbound/delClient/2/{SECRET}")))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/panel/inbound/delClient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    client.remove_client(2, SECRET).await.unwrap();
}

#[tokio::test]
async fn remove_client_falls_back_to_json_form() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("/panel/inbound/delClient/2/{SECRET}")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/panel/inbound/delClient"))
        .and(body_string_contains(SECRET))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    client.remove_client(2, SECRET).await.unwrap();
}

#[tokio::test]
async fn remove_client_fails_when_both_forms_fail() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("/panel/inbound/delClient/2/{SECRET}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/panel/inbound/delClient"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    match client.remove_client(2, SECRET).await.unwrap_err() {
        PanelError::Api { status, .. } => assert_eq!(status, 500),
        other => panic!("expected Api, got {other:?}"),
    }
}
