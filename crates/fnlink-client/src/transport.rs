//! Transport establishment for the appliance control channel.
//!
//! The appliance speaks JSON text frames over a WebSocket endpoint.
//! Connection strategies are tried in order, each bounded by its own connect
//! timeout; every strategy yields the same stream type, so protocol dispatch
//! never depends on how the channel was established.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{
    connect_async, connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use fnlink_core::{crypto, NasError, NasResult};

/// Hard per-strategy connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The concrete stream type every strategy produces.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

/// Headers the appliance checks on the upgrade request.
///
/// The target host itself travels in the upgrade URI; the remaining access
/// checks look at the cookie, user-agent and origin.
#[derive(Debug, Clone, Default)]
pub struct AccessHeaders {
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    pub origin: Option<String>,
}

impl AccessHeaders {
    /// Relay-style defaults for a target host, mirroring what the
    /// appliance's own web client sends.
    pub fn for_host(host: &str) -> Self {
        Self {
            cookie: Some(format!(
                "mode=relay; language=zh;entry-token={}",
                crypto::entry_token()
            )),
            user_agent: Some(USER_AGENT.to_string()),
            origin: Some(format!("https://{host}")),
        }
    }
}

/// Normalize a target into a WebSocket URL, appending the control endpoint
/// path when the caller did not specify one.
pub fn normalize_url(target: &str) -> String {
    let mut url = if target.starts_with("ws://") || target.starts_with("wss://") {
        target.to_string()
    } else if let Some(rest) = target.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = target.strip_prefix("https://") {
        format!("wss://{rest}")
    } else {
        format!("wss://{target}")
    };
    if !url.contains("/websocket") {
        url.push_str("/websocket?type=main");
    }
    url
}

/// Ordered connection strategies. Tried in sequence, first success wins.
#[derive(Debug, Clone, Copy)]
enum Strategy {
    /// Upgrade handshake with access headers, certificates validated
    /// against native roots.
    Upgrade,
    /// Same headers, but any server certificate is accepted — appliances
    /// commonly present self-signed or mismatched certs.
    RelaxedTls,
    /// Plain connection without custom headers.
    Bare,
}

impl Strategy {
    fn name(self) -> &'static str {
        match self {
            Strategy::Upgrade => "upgrade",
            Strategy::RelaxedTls => "relaxed-tls",
            Strategy::Bare => "bare",
        }
    }

    async fn attempt(self, url: &str, headers: &AccessHeaders) -> NasResult<WsStream> {
        match self {
            Strategy::Upgrade => {
                let request = build_upgrade_request(url, headers)?;
                let (stream, response) = connect_async(request)
                    .await
                    .map_err(|e| NasError::Transport(format!("upgrade handshake failed: {e}")))?;
                debug!(status = %response.status(), "upgrade accepted");
                Ok(stream)
            }
            Strategy::RelaxedTls => {
                let request = build_upgrade_request(url, headers)?;
                let connector = Connector::Rustls(Arc::new(insecure_tls_config()?));
                let (stream, _) =
                    connect_async_tls_with_config(request, None, false, Some(connector))
                        .await
                        .map_err(|e| {
                            NasError::Transport(format!("relaxed-TLS handshake failed: {e}"))
                        })?;
                Ok(stream)
            }
            Strategy::Bare => {
                let (stream, _) = connect_async(url)
                    .await
                    .map_err(|e| NasError::Transport(format!("bare connect failed: {e}")))?;
                Ok(stream)
            }
        }
    }
}

/// Open a control channel to `target`, trying each strategy in order.
///
/// Fails with the last strategy's error once every candidate is exhausted;
/// no half-open state is observable either way.
pub async fn connect(target: &str, headers: &AccessHeaders) -> NasResult<WsStream> {
    let url = normalize_url(target);
    debug!(%url, "connecting to appliance control endpoint");

    let mut last_err = None;
    for strategy in [Strategy::Upgrade, Strategy::RelaxedTls, Strategy::Bare] {
        match time::timeout(CONNECT_TIMEOUT, strategy.attempt(&url, headers)).await {
            Ok(Ok(stream)) => {
                debug!(strategy = strategy.name(), "control channel established");
                return Ok(stream);
            }
            Ok(Err(e)) => {
                warn!(strategy = strategy.name(), error = %e, "connect strategy failed");
                last_err = Some(e);
            }
            Err(_) => {
                warn!(strategy = strategy.name(), "connect strategy timed out");
                last_err = Some(NasError::Transport(format!(
                    "{} connect timed out after {CONNECT_TIMEOUT:?}",
                    strategy.name()
                )));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| NasError::Transport("no connection strategy available".into())))
}

fn build_upgrade_request(url: &str, headers: &AccessHeaders) -> NasResult<Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| NasError::Transport(format!("invalid control URL {url}: {e}")))?;

    let map = request.headers_mut();
    if let Some(cookie) = &headers.cookie {
        map.insert("Cookie", header_value(cookie)?);
    }
    if let Some(user_agent) = &headers.user_agent {
        map.insert("User-Agent", header_value(user_agent)?);
    }
    if let Some(origin) = &headers.origin {
        map.insert("Origin", header_value(origin)?);
    }
    Ok(request)
}

fn header_value(value: &str) -> NasResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| NasError::Transport(format!("invalid header value: {e}")))
}

fn insecure_tls_config() -> NasResult<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| NasError::Transport(format!("TLS config error: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(danger::NoVerification))
        .with_no_client_auth();
    Ok(config)
}

mod danger {
    use rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};

    /// Accepts any server certificate.
    #[derive(Debug)]
    pub struct NoVerification;

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_becomes_secure_url_with_control_path() {
        assert_eq!(
            normalize_url("nas.example.com"),
            "wss://nas.example.com/websocket?type=main"
        );
    }

    #[test]
    fn http_schemes_map_to_ws_schemes() {
        assert_eq!(
            normalize_url("http://nas.example.com"),
            "ws://nas.example.com/websocket?type=main"
        );
        assert_eq!(
            normalize_url("https://nas.example.com"),
            "wss://nas.example.com/websocket?type=main"
        );
    }

    #[test]
    fn explicit_ws_url_is_kept() {
        assert_eq!(
            normalize_url("wss://nas.example.com/websocket?type=main"),
            "wss://nas.example.com/websocket?type=main"
        );
        assert_eq!(
            normalize_url("ws://127.0.0.1:8080"),
            "ws://127.0.0.1:8080/websocket?type=main"
        );
    }

    #[test]
    fn default_headers_cover_access_checks() {
        let headers = AccessHeaders::for_host("nas.example.com");
        assert!(headers.cookie.unwrap().contains("entry-token="));
        assert_eq!(headers.origin.as_deref(), Some("https://nas.example.com"));
        assert!(headers.user_agent.is_some());
    }
}
