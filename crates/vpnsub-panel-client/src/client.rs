//! Session-holding client for the panel's HTTP API.
//!
//! ## API Paths (relative to the configured base URL)
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `login` | Open a cookie session (form `username`, `password`) |
//! | GET    | `panel/inbound/list` | List endpoints |
//! | POST   | `panel/inbound/addClient` | Issue a credential on an endpoint |
//! | POST   | `panel/inbound/delClient/{endpointId}/{secret}` | Revoke a credential |
//! | POST   | `panel/inbound/delClient` | Revoke a credential (older panels, JSON body) |
//!
//! Responses use the envelope `{"success": bool, "msg": string, "obj": ...}`.
//! A 2xx answer with `success: false` is a rejection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use zeroize::Zeroizing;

use crate::config::PanelConfig;
use crate::descriptor::DEFAULT_FLOW;
use crate::endpoint::{endpoints_from_listing, select_endpoint, Endpoint, EndpointSelector};
use crate::error::PanelError;

/// Client for one panel. Cheap to clone; clones share the cookie session.
#[derive(Clone)]
pub struct PanelClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    /// Always ends with `/`.
    base_url: String,
    username: String,
    password: Zeroizing<String>,
    logged_in: AtomicBool,
}

impl std::fmt::Debug for PanelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelClient")
            .field("base_url", &self.inner.base_url)
            .field("username", &self.inner.username)
            .field("logged_in", &self.inner.logged_in.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl PanelClient {
    /// Create a client from configuration. No network traffic happens until
    /// the first call.
    pub fn new(config: PanelConfig) -> Result<Self, PanelError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .user_agent(concat!("vpnsub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PanelError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;

        let mut base_url = config.base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                username: config.username,
                password: config.password,
                logged_in: AtomicBool::new(false),
            }),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Open (or refresh) the cookie session.
    pub async fn login(&self) -> Result<(), PanelError> {
        let endpoint = "POST /login";
        let resp = self
            .inner
            .http
            .post(self.url("login"))
            .form(&[
                ("username", self.inner.username.as_str()),
                ("password", self.inner.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PanelError::transport(endpoint, e))?;

        read_envelope(endpoint, resp, Payload::Opaque).await?;
        self.inner.logged_in.store(true, Ordering::Release);
        tracing::debug!(base_url = %self.inner.base_url, "panel session opened");
        Ok(())
    }

    /// Send an authenticated request, logging in first if needed. A 401/403
    /// answer triggers one fresh login and exactly one retry.
    async fn call<F>(
        &self,
        endpoint: &str,
        payload: Payload,
        request: F,
    ) -> Result<Value, PanelError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        if !self.inner.logged_in.load(Ordering::Acquire) {
            self.login().await?;
        }

        let resp = request(&self.inner.http)
            .send()
            .await
            .map_err(|e| PanelError::transport(endpoint, e))?;

        match read_envelope(endpoint, resp, payload).await {
            Err(err) if err.is_auth_failure() => {
                tracing::debug!(endpoint, "panel session rejected; logging in again");
                self.inner.logged_in.store(false, Ordering::Release);
                self.login().await?;
                let retry = request(&self.inner.http)
                    .send()
                    .await
                    .map_err(|e| PanelError::transport(endpoint, e))?;
                read_envelope(endpoint, retry, payload).await
            }
            other => other,
        }
    }

    /// Fetch every readable endpoint from the panel.
    pub async fn list_endpoints(&self) -> Result<Vec<Endpoint>, PanelError> {
        let endpoint = "GET /panel/inbound/list";
        let url = self.url("panel/inbound/list");
        let body = self
            .call(endpoint, Payload::Json, |http| http.get(&url))
            .await?;
        Ok(endpoints_from_listing(&body))
    }

    /// Fetch the listing and pick the endpoint credentials are issued on.
    pub async fn resolve_endpoint(
        &self,
        selector: &EndpointSelector,
    ) -> Result<Endpoint, PanelError> {
        let endpoints = self.list_endpoints().await?;
        let chosen = select_endpoint(&endpoints, selector)?;
        tracing::debug!(
            endpoint_id = chosen.id,
            label = %chosen.label,
            port = chosen.port,
            "endpoint resolved"
        );
        Ok(chosen)
    }

    /// Issue a credential `secret` on `endpoint_id`, valid until `expires_at`.
    ///
    /// Not idempotent on the panel side: a retry after an ambiguous failure
    /// may create a duplicate client entry.
    pub async fn add_client(
        &self,
        endpoint_id: i64,
        secret: &str,
        label: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), PanelError> {
        let endpoint = "POST /panel/inbound/addClient";
        let url = self.url("panel/inbound/addClient");
        let settings = json!({
            "clients": [{
                "id": secret,
                "email": label,
                "flow": DEFAULT_FLOW,
                "limitIp": 0,
                "totalGB": 0,
                "expiryTime": expires_at.timestamp_millis(),
                "enable": true,
            }]
        });
        let body = json!({ "id": endpoint_id, "settings": settings.to_string() });

        self.call(endpoint, Payload::Opaque, |http| http.post(&url).json(&body))
            .await?;
        tracing::info!(endpoint_id, label, %expires_at, "panel client added");
        Ok(())
    }

    /// Revoke credential `secret` on `endpoint_id`.
    ///
    /// Tries the path-addressed form first and falls back to the JSON-body
    /// form older panels expose. Fails only if both are refused.
    pub async fn remove_client(&self, endpoint_id: i64, secret: &str) -> Result<(), PanelError> {
        let primary = "POST /panel/inbound/delClient/{id}/{secret}";
        let url = self.url(&format!("panel/inbound/delClient/{endpoint_id}/{secret}"));
        match self
            .call(primary, Payload::Opaque, |http| http.post(&url))
            .await
        {
            Ok(_) => {
                tracing::info!(endpoint_id, "panel client removed");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(
                    endpoint_id,
                    error = %e,
                    "primary client removal refused; trying fallback"
                );
            }
        }

        let fallback = "POST /panel/inbound/delClient";
        let url = self.url("panel/inbound/delClient");
        let body = json!({ "id": endpoint_id, "clientId": secret });
        self.call(fallback, Payload::Opaque, |http| http.post(&url).json(&body))
            .await?;
        tracing::info!(endpoint_id, "panel client removed");
        Ok(())
    }
}

/// What a successful answer is expected to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload {
    /// A JSON document the caller reads; anything else is a failure.
    Json,
    /// Only the `success` flag matters. Empty or non-JSON bodies read as
    /// `null`, since some panel builds answer writes with plain text.
    Opaque,
}

/// Check status and envelope, returning the body as JSON.
async fn read_envelope(
    endpoint: &str,
    resp: reqwest::Response,
    payload: Payload,
) -> Result<Value, PanelError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(PanelError::Api {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| PanelError::transport(endpoint, e))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    let body: Value = match (serde_json::from_slice(&bytes), payload) {
        (Ok(body), _) => body,
        (Err(source), Payload::Json) => {
            return Err(PanelError::Deserialization {
                endpoint: endpoint.to_string(),
                source,
            })
        }
        (Err(_), Payload::Opaque) => {
            tracing::debug!(endpoint, "non-JSON success body ignored");
            Value::Null
        }
    };

    if body.get("success") == Some(&Value::Bool(false)) {
        let message = body
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(PanelError::Rejected {
            endpoint: endpoint.to_string(),
            message,
        });
    }

    Ok(body)
}
