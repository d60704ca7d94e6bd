//! # Connection descriptor builder
//!
//! Turns a resolved [`Endpoint`] plus an issued secret into the `vless://`
//! URI that client applications import. The output format is consumed by
//! third-party apps and must stay bit-exact:
//!
//! ```text
//! vless://<secret>@<host>:<port>?type=<transport>&security=<mode>&encryption=none
//!     &flow=xtls-rprx-vision&fp=<fingerprint>&sni=<server name>&pbk=<public key>
//!     &sid=<short id>[&spx=<spider path>]#<label>
//! ```
//!
//! ## Field lookup
//!
//! Panel versions store the same security parameter under different keys.
//! Each field is an ordered list of JSON pointers; the first one that
//! resolves to a non-empty value wins.
//!
//! | Field | Pointers (relative to the security block) | Default |
//! |-------|-------------------------------------------|---------|
//! | security block | `/realitySettings`, `/tlsSettings/realitySettings`, `/reality` (stream settings) | `{}` |
//! | `pbk` | `/publicKey`, `/public_key`, `/settings/publicKey` | `""` |
//! | `sni` | `/serverNames/0`, `/server_names/0`, `/settings/serverName` | `""` |
//! | `sid` | `/shortIds/0`, `/short_ids/0` | `""` |
//! | `fp` | `/fingerprint`, `/settings/fingerprint` | `chrome` |
//! | `spx` | `/spiderX`, `/spider_x`, `/settings/spiderX` | omitted |
//! | `type` | `/network` (stream settings) | `tcp` |
//! | `security` | `/security` (stream settings) | `reality` |

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

use crate::endpoint::Endpoint;

/// Client flow requested for every issued credential.
pub const DEFAULT_FLOW: &str = "xtls-rprx-vision";

/// Query values keep only RFC 3986 unreserved characters.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// The fragment label additionally keeps `/`.
const LABEL: &AsciiSet = &QUERY_VALUE.remove(b'/');

const SECURITY_BLOCK: &[&str] = &["/realitySettings", "/tlsSettings/realitySettings", "/reality"];
const PUBLIC_KEY: &[&str] = &["/publicKey", "/public_key", "/settings/publicKey"];
const SERVER_NAME: &[&str] = &["/serverNames/0", "/server_names/0", "/settings/serverName"];
const SHORT_ID: &[&str] = &["/shortIds/0", "/short_ids/0"];
const FINGERPRINT: &[&str] = &["/fingerprint", "/settings/fingerprint"];
const SPIDER_X: &[&str] = &["/spiderX", "/spider_x", "/settings/spiderX"];

/// Build the connection URI for `secret` on `endpoint`. Never fails: missing
/// parameters degrade to their defaults.
pub fn build_descriptor(endpoint: &Endpoint, public_host: &str, secret: &str, label: &str) -> String {
    let stream = &endpoint.stream_settings;
    let block = SECURITY_BLOCK
        .iter()
        .filter_map(|p| stream.pointer(p))
        .find(|v| v.as_object().is_some_and(|m| !m.is_empty()))
        .unwrap_or(&Value::Null);

    let transport = first_text(stream, &["/network"]).unwrap_or_else(|| "tcp".to_string());
    let security = first_text(stream, &["/security"]).unwrap_or_else(|| "reality".to_string());
    let fingerprint = first_text(block, FINGERPRINT).unwrap_or_else(|| "chrome".to_string());
    let server_name = first_text(block, SERVER_NAME).unwrap_or_default();
    let public_key = first_text(block, PUBLIC_KEY).unwrap_or_default();
    let short_id = first_text(block, SHORT_ID).unwrap_or_default();
    let spider_x = first_text(block, SPIDER_X);

    let mut params: Vec<(&str, String)> = vec![
        ("type", transport),
        ("security", security),
        ("encryption", "none".to_string()),
        ("flow", DEFAULT_FLOW.to_string()),
        ("fp", fingerprint),
        ("sni", server_name),
        ("pbk", public_key),
        ("sid", short_id),
    ];
    if let Some(spx) = spider_x {
        params.push(("spx", spx));
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, QUERY_VALUE)))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "vless://{secret}@{public_host}:{port}?{query}#{label}",
        port = endpoint.port,
        label = utf8_percent_encode(label, LABEL),
    )
}

/// First pointer resolving to a non-empty string (or a number, rendered).
fn first_text(root: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| match root.pointer(p)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
