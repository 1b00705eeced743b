//! Wire message building for the control protocol.
//!
//! Control messages are JSON text frames. Every request carries a
//! correlation id (`reqid`) that the server mirrors in its reply; post-login
//! requests are prefixed with an HMAC signature, and credential-bearing
//! requests travel inside an RSA/AES envelope.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::crypto;
use crate::error::{NasError, NasResult};

/// Request names sent unsigned even when a session secret exists. These
/// bootstrap the handshake and occur before the secret is negotiated.
pub const UNSIGNED_REQUESTS: [&str; 3] = ["encrypted", "util.getSI", "util.crypto.getRSAPub"];

/// Request names whose payloads travel inside the encrypted envelope.
pub const ENCRYPTED_REQUESTS: [&str; 2] = ["user.login", "user.add"];

/// Request type marker of the encrypted envelope itself.
pub const ENVELOPE_REQUEST: &str = "encrypted";

/// Routing id used before the server assigns one at login.
pub const DEFAULT_BACK_ID: &str = "0000000000000000";

/// Build a correlation id: 8 hex digits of the epoch-second timestamp, the
/// 16-character routing id, and 4 hex digits of the per-session counter.
pub fn request_id(timestamp_secs: u64, back_id: &str, seq: u32) -> String {
    format!("{timestamp_secs:08x}{back_id}{seq:04x}")
}

/// Build the request object `{reqid, req, ...params}`.
pub fn build_request(reqid: &str, req: &str, params: &Value) -> NasResult<Value> {
    let mut map = Map::new();
    map.insert("reqid".into(), Value::String(reqid.to_string()));
    map.insert("req".into(), Value::String(req.to_string()));
    match params {
        Value::Object(extra) => {
            for (k, v) in extra {
                map.insert(k.clone(), v.clone());
            }
        }
        Value::Null => {}
        other => {
            return Err(NasError::Codec(format!(
                "request params must be a JSON object, got {other}"
            )))
        }
    }
    Ok(Value::Object(map))
}

/// Apply the signing rule to a serialized request.
///
/// The wire payload is `signature + json` when a signing secret exists and
/// the request is not one of the handshake-bootstrap names; the bare JSON
/// string otherwise.
pub fn sign_request(req: &str, serialized: &str, secret: Option<&str>) -> String {
    match secret {
        Some(secret) if !UNSIGNED_REQUESTS.contains(&req) => {
            format!("{}{}", crypto::signature(serialized, secret), serialized)
        }
        _ => serialized.to_string(),
    }
}

/// Seal a serialized request into the encrypted envelope: the payload is
/// AES-encrypted under the session key/iv and the session key itself is
/// RSA-wrapped with the server public key.
pub fn seal_envelope(
    plaintext: &str,
    session_key: &str,
    iv: &[u8],
    public_key: &str,
) -> NasResult<Value> {
    let rsa = crypto::rsa_encrypt(session_key.as_bytes(), public_key)?;
    let aes = crypto::aes_encrypt(plaintext.as_bytes(), session_key.as_bytes(), iv)?;
    Ok(json!({
        "req": ENVELOPE_REQUEST,
        "iv": BASE64.encode(iv),
        "rsa": rsa,
        "aes": aes,
    }))
}

/// A parsed inbound control message.
///
/// Replies mirror the request's `reqid` and carry a `result` discriminator
/// (`"fail"` marks failure; `"succ"`/`"success"` mark success). Handshake
/// replies deliver fields like `token`, `secret`, `backId`, `pub` and `si`
/// at the top level, retained in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reqid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reply {
    pub fn is_fail(&self) -> bool {
        self.result.as_deref() == Some("fail")
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result.as_deref(), Some("succ") | Some("success"))
    }

    /// Top-level string field outside the well-known ones.
    pub fn top_str(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }

    pub fn data_field(&self, name: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(name))
    }

    pub fn data_str(&self, name: &str) -> Option<&str> {
        self.data_field(name).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePublicKey;
    use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};

    #[test]
    fn request_id_format() {
        let id = request_id(0x1234_5678, "abcdef0123456789", 0x2a);
        assert_eq!(id, "12345678abcdef0123456789002a");
        assert_eq!(id.len(), 28);
    }

    #[test]
    fn request_ids_distinct_within_one_timestamp_bucket() {
        let mut seen = std::collections::HashSet::new();
        for seq in 0..70_000u32 {
            assert!(seen.insert(request_id(1_700_000_000, DEFAULT_BACK_ID, seq)));
        }
    }

    #[test]
    fn build_request_merges_params() {
        let data = build_request("r1", "user.login", &json!({"user": "admin"})).unwrap();
        assert_eq!(data["reqid"], "r1");
        assert_eq!(data["req"], "user.login");
        assert_eq!(data["user"], "admin");
    }

    #[test]
    fn build_request_rejects_non_object_params() {
        assert!(build_request("r1", "x", &json!([1, 2])).is_err());
        assert!(build_request("r1", "x", &Value::Null).is_ok());
    }

    #[test]
    fn bootstrap_requests_stay_unsigned() {
        let secret = BASE64.encode(b"secret");
        let json = r#"{"req":"util.crypto.getRSAPub","reqid":"r1"}"#;
        assert_eq!(
            sign_request("util.crypto.getRSAPub", json, Some(&secret)),
            json
        );
        assert_eq!(sign_request("encrypted", json, Some(&secret)), json);
        assert_eq!(sign_request("util.getSI", json, Some(&secret)), json);
    }

    #[test]
    fn authenticated_requests_carry_signature_prefix() {
        let secret = BASE64.encode(b"secret");
        let json = r#"{"req":"appcgi.sac.entry.v1.dockerList","reqid":"r1"}"#;
        let wire = sign_request("appcgi.sac.entry.v1.dockerList", json, Some(&secret));
        assert!(wire.ends_with(json));
        let prefix = &wire[..wire.len() - json.len()];
        assert_eq!(prefix, crypto::signature(json, &secret));
    }

    #[test]
    fn no_secret_means_no_signature() {
        let json = r#"{"req":"appcgi.sac.entry.v1.dockerList","reqid":"r1"}"#;
        assert_eq!(sign_request("appcgi.sac.entry.v1.dockerList", json, None), json);
    }

    #[test]
    fn envelope_round_trips_through_server_keys() {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pub_der = BASE64.encode(private.to_public_key().to_public_key_der().unwrap());

        let session_key = crypto::random_key(crypto::SESSION_KEY_LEN);
        let iv = crypto::random_iv();
        let plaintext = r#"{"reqid":"r1","req":"user.login","user":"admin"}"#;

        let envelope = seal_envelope(plaintext, &session_key, &iv, &pub_der).unwrap();
        assert_eq!(envelope["req"], ENVELOPE_REQUEST);
        assert_eq!(
            BASE64.decode(envelope["iv"].as_str().unwrap()).unwrap(),
            iv
        );

        let unwrapped_key = private
            .decrypt(
                Pkcs1v15Encrypt,
                &BASE64.decode(envelope["rsa"].as_str().unwrap()).unwrap(),
            )
            .unwrap();
        assert_eq!(unwrapped_key, session_key.as_bytes());

        let recovered =
            crypto::aes_decrypt(envelope["aes"].as_str().unwrap(), &unwrapped_key, &iv).unwrap();
        assert_eq!(BASE64.decode(recovered).unwrap(), plaintext.as_bytes());
    }

    #[test]
    fn reply_accessors() {
        let raw = r#"{"reqid":"r1","result":"succ","token":"t","data":{"token":"entry"}}"#;
        let reply: Reply = serde_json::from_str(raw).unwrap();
        assert!(reply.is_success());
        assert!(!reply.is_fail());
        assert_eq!(reply.top_str("token"), Some("t"));
        assert_eq!(reply.data_str("token"), Some("entry"));

        let fail: Reply = serde_json::from_str(r#"{"reqid":"r1","result":"fail"}"#).unwrap();
        assert!(fail.is_fail());
        assert!(!fail.is_success());
    }
}
