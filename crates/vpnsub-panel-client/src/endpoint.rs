//! Endpoints ("inbounds") as reported by the panel listing.
//!
//! Panel versions disagree on where the listing lives in the response
//! envelope and on whether nested configuration is a JSON object or a JSON
//! string holding one. Parsing here is tolerant: entries that cannot be
//! read are skipped rather than failing the whole listing.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::PanelError;

/// Protocol of the endpoints credentials are issued on when no explicit
/// selector is configured.
pub const ACCESS_PROTOCOL: &str = "vless";

/// A provisionable access point on the panel. Fetched live, never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Endpoint {
    pub id: i64,
    /// Human-readable label (the panel's `remark`).
    pub label: String,
    pub port: u16,
    pub protocol: String,
    /// Protocol settings (`settings`), always an object.
    pub settings: Value,
    /// Transport and security configuration (`streamSettings`), always an object.
    pub stream_settings: Value,
}

impl Endpoint {
    /// Read one listing entry. `None` when the entry lacks a usable id or
    /// carries an out-of-range port.
    pub fn from_listing_entry(entry: &Value) -> Option<Self> {
        let item = entry.as_object()?;
        let id = as_i64(item.get("id")?)?;
        let port = match item.get("port") {
            None | Some(Value::Null) => 0,
            Some(v) => u16::try_from(as_i64(v)?).ok()?,
        };

        Some(Self {
            id,
            label: as_text(item.get("remark")),
            port,
            protocol: as_text(item.get("protocol")),
            settings: nested_object(item.get("settings")),
            stream_settings: nested_object(item.get("streamSettings")),
        })
    }
}

/// Which endpoint credentials are issued on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSelector {
    /// Exact endpoint id. Takes precedence over `label`.
    pub id: Option<i64>,
    /// Exact endpoint label.
    pub label: Option<String>,
}

impl EndpointSelector {
    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            label: None,
        }
    }

    pub fn by_label(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: Some(label.into()),
        }
    }
}

/// Extract every readable endpoint from a listing response body.
pub fn endpoints_from_listing(body: &Value) -> Vec<Endpoint> {
    let entries = listing_entries(body);
    let endpoints: Vec<Endpoint> = entries
        .iter()
        .filter_map(Endpoint::from_listing_entry)
        .collect();

    let skipped = entries.len() - endpoints.len();
    if skipped > 0 {
        tracing::debug!(skipped, "skipped malformed endpoint entries");
    }
    endpoints
}

/// Pick an endpoint by selector.
///
/// An id selector must match exactly. Otherwise a non-empty label selector
/// is tried, then the first endpoint speaking [`ACCESS_PROTOCOL`].
pub fn select_endpoint(
    endpoints: &[Endpoint],
    selector: &EndpointSelector,
) -> Result<Endpoint, PanelError> {
    if let Some(id) = selector.id {
        return endpoints
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| PanelError::NotFound(format!("endpoint id {id}")));
    }

    if let Some(label) = selector.label.as_deref().filter(|l| !l.is_empty()) {
        if let Some(found) = endpoints.iter().find(|e| e.label == label) {
            return Ok(found.clone());
        }
    }

    endpoints
        .iter()
        .find(|e| e.protocol.eq_ignore_ascii_case(ACCESS_PROTOCOL))
        .cloned()
        .ok_or_else(|| PanelError::NotFound("no suitable endpoint".to_string()))
}

fn listing_entries(body: &Value) -> &[Value] {
    let candidates = [
        body.get("obj"),
        body.pointer("/obj/list"),
        body.pointer("/obj/inbounds"),
        body.get("list"),
        body.get("inbounds"),
        Some(body),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Nested configuration may arrive as an object or as a JSON string
/// encoding one. Anything else reads as an empty object.
fn nested_object(value: Option<&Value>) -> Value {
    let parsed = match value {
        Some(Value::String(raw)) => serde_json::from_str(raw).ok(),
        Some(v) => Some(v.clone()),
        None => None,
    };
    match parsed {
        Some(Value::Object(map)) => Value::Object(map),
        _ => Value::Object(Map::new()),
    }
}
