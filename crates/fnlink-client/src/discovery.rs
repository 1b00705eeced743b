//! Appliance address resolution via the vendor directory service.
//!
//! A plain HTTPS POST, authenticated by two independently computed digests:
//! a device signature over the appliance identifier and timestamp, and a
//! service signature over the request path, a random nonce, the timestamp
//! and the digested body.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use fnlink_core::crypto::{md5_hex, sha256_hex};
use fnlink_core::{NasError, NasRecord, NasResult};

/// Public directory service for appliance address lookup.
pub const DIRECTORY_BASE: &str = "https://fnos.net";

const CONNECT_PATH: &str = "/api/v1/fn/con";

// Fixed material the directory service expects in its digests.
const AUTHX_PREFIX: &str = "NDzZTVxnRKP8Z0jXg1VAMonaG8akvh";
const AUTHX_KEY: &str = "zIGtkc3dqZnJpd29qZXJqa2w7c";
const DEVICE_SIGN_TAG: &str = "trim_connect";
const DEVICE_SIGN_SUFFIX: &str = "anna";

#[derive(Debug, Deserialize)]
struct DirectoryResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<NasRecord>,
}

/// Resolve the appliance's reachable endpoints and LAN addresses.
pub async fn resolve_appliance(fn_id: &str) -> NasResult<NasRecord> {
    resolve_appliance_at(DIRECTORY_BASE, fn_id).await
}

/// Directory lookup against an explicit base URL (injectable for tests).
pub async fn resolve_appliance_at(base: &str, fn_id: &str) -> NasResult<NasRecord> {
    let timestamp = now_ms();
    let nonce: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    let body = serde_json::to_string(&json!({ "fnId": fn_id }))?;

    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| NasError::Discovery(format!("HTTP client build failed: {e}")))?;

    let response = client
        .post(format!("{base}{CONNECT_PATH}"))
        .header("Content-Type", "application/json")
        .header("fn-sign", device_sign(fn_id, timestamp))
        .header("authx", auth_header(CONNECT_PATH, &body, nonce, timestamp))
        .body(body)
        .send()
        .await
        .map_err(|e| NasError::Discovery(format!("directory request failed: {e}")))?;

    let payload: DirectoryResponse = response
        .json()
        .await
        .map_err(|e| NasError::Discovery(format!("unreadable directory response: {e}")))?;

    parse_directory_response(payload)
}

fn parse_directory_response(payload: DirectoryResponse) -> NasResult<NasRecord> {
    if payload.code != 0 {
        let detail = payload
            .msg
            .map(|m| format!(": {m}"))
            .unwrap_or_default();
        return Err(NasError::Discovery(format!(
            "directory lookup failed with code {}{detail}",
            payload.code
        )));
    }
    let record = payload
        .data
        .ok_or_else(|| NasError::Discovery("directory reply carried no data".into()))?;
    debug!(
        endpoints = record.endpoints.len(),
        ipv4 = record.ipv4.len(),
        "appliance resolved"
    );
    Ok(record)
}

/// Device signature: SHA-256 hex over the backtick-joined tag, identifier,
/// timestamp and suffix.
fn device_sign(fn_id: &str, timestamp_ms: u64) -> String {
    sha256_hex(&format!(
        "{DEVICE_SIGN_TAG}`{fn_id}`{timestamp_ms}`{DEVICE_SIGN_SUFFIX}"
    ))
}

/// Service signature header `nonce={n}&timestamp={ms}&sign={md5}`, digesting
/// the underscore-joined prefix, path, nonce, timestamp, body digest and key.
fn auth_header(path: &str, body: &str, nonce: u32, timestamp_ms: u64) -> String {
    let digest = md5_hex(&format!(
        "{AUTHX_PREFIX}_{path}_{nonce}_{timestamp_ms}_{}_{AUTHX_KEY}",
        md5_hex(body)
    ));
    format!("nonce={nonce}&timestamp={timestamp_ms}&sign={digest}")
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zero_code_is_a_discovery_error() {
        let err = parse_directory_response(DirectoryResponse {
            code: 1,
            msg: Some("not found".into()),
            data: None,
        })
        .unwrap_err();
        assert!(matches!(err, NasError::Discovery(_)));
    }

    #[test]
    fn zero_code_yields_the_record() {
        let payload: DirectoryResponse = serde_json::from_str(
            r#"{"code":0,"data":{"fn":["host:0"],"ipv4":["192.168.1.10"]}}"#,
        )
        .unwrap();
        let record = parse_directory_response(payload).unwrap();
        assert_eq!(record.primary_host(), Some("host"));
        assert_eq!(record.local_ip(), Some("192.168.1.10"));
    }

    #[test]
    fn zero_code_without_data_is_an_error() {
        let payload: DirectoryResponse = serde_json::from_str(r#"{"code":0}"#).unwrap();
        assert!(parse_directory_response(payload).is_err());
    }

    #[test]
    fn device_sign_is_a_stable_sha256() {
        let a = device_sign("nas-1", 1_700_000_000_000);
        assert_eq!(a, device_sign("nas-1", 1_700_000_000_000));
        assert_eq!(a.len(), 64);
        assert_ne!(a, device_sign("nas-2", 1_700_000_000_000));
        assert_ne!(a, device_sign("nas-1", 1_700_000_000_001));
    }

    #[test]
    fn auth_header_carries_nonce_timestamp_and_sign() {
        let header = auth_header(CONNECT_PATH, r#"{"fnId":"nas-1"}"#, 123_456, 1_700_000_000_000);
        assert!(header.starts_with("nonce=123456&timestamp=1700000000000&sign="));
        let sign = header.rsplit('=').next().unwrap();
        assert_eq!(sign.len(), 32);
        // The body digest feeds the signature.
        assert_ne!(
            header,
            auth_header(CONNECT_PATH, r#"{"fnId":"nas-2"}"#, 123_456, 1_700_000_000_000)
        );
    }
}
