//! The appliance control client.
//!
//! `NasClient` owns one control connection for one logical operation:
//! connect, handshake, a handful of correlated queries, close. Nothing is
//! reused across operations, and the connection must be closed on every
//! exit path — `Drop` aborts the read task as a backstop.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use fnlink_core::directory::{self, ServiceDescriptor};
use fnlink_core::message::{self, Reply};
use fnlink_core::{crypto, NasError, NasResult};

use crate::pending::PendingTable;
use crate::transport::{self, AccessHeaders, WsStream};

/// Per-request reply deadline.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const DEVICE_TYPE: &str = "Browser";

type WsSink = SplitSink<WsStream, Message>;

/// Options for establishing a control connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Headers attached to the upgrade request.
    pub headers: AccessHeaders,
    /// Device name reported in the login payload.
    pub device_name: String,
}

impl ConnectOptions {
    /// Relay-style defaults for a target host.
    pub fn for_host(host: &str) -> Self {
        Self {
            headers: AccessHeaders::for_host(host),
            device_name: "Edge Client".to_string(),
        }
    }
}

/// One control session: Unauthenticated → KeyReady → Authenticated → Closed.
pub struct NasClient {
    host: String,
    sink: Arc<Mutex<WsSink>>,
    pending: Arc<PendingTable>,
    connected: Arc<AtomicBool>,
    read_handle: tokio::task::JoinHandle<()>,

    // Session state. One caller drives a session at a time, so plain fields
    // behind `&mut self` are enough; only the pending table is shared with
    // the read task.
    key: String,
    iv: [u8; crypto::IV_LEN],
    back_id: String,
    seq: AtomicU32,
    device_name: String,
    rsa_pub: Option<String>,
    si: Option<Value>,
    token: Option<String>,
    secret: Option<String>,
}

impl NasClient {
    /// Open the control channel and spawn the inbound dispatch loop.
    pub async fn connect(target: &str, options: ConnectOptions) -> NasResult<Self> {
        let stream = transport::connect(target, &options.headers).await?;
        let (sink, read) = stream.split();
        let sink = Arc::new(Mutex::new(sink));
        let pending = Arc::new(PendingTable::new());
        let connected = Arc::new(AtomicBool::new(true));

        let read_handle = tokio::spawn(read_loop(
            read,
            pending.clone(),
            sink.clone(),
            connected.clone(),
        ));

        Ok(Self {
            host: target.to_string(),
            sink,
            pending,
            connected,
            read_handle,
            key: crypto::random_key(crypto::SESSION_KEY_LEN),
            iv: crypto::random_iv(),
            back_id: message::DEFAULT_BACK_ID.to_string(),
            seq: AtomicU32::new(1),
            device_name: options.device_name,
            rsa_pub: None,
            si: None,
            token: None,
            secret: None,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Authentication token, present after a successful login.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Session signing secret, present after a successful login.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Fetch the server public key and auxiliary handshake value.
    pub async fn fetch_public_key(&mut self) -> NasResult<()> {
        let reply = match self.send_request("util.crypto.getRSAPub", json!({})).await {
            Ok(reply) => reply,
            Err(NasError::RequestFailed(payload)) => return Err(NasError::Handshake(payload)),
            Err(e) => return Err(e),
        };
        if !reply.is_success() {
            return Err(NasError::Handshake(serde_json::to_string(&reply)?));
        }

        let rsa_pub = reply
            .top_str("pub")
            .map(str::to_string)
            .or_else(|| reply.data_str("public_key").map(str::to_string))
            .ok_or_else(|| NasError::Handshake("server reply carried no public key".into()))?;
        self.si = reply
            .extra
            .get("si")
            .cloned()
            .or_else(|| reply.data_field("si").cloned());
        self.rsa_pub = Some(rsa_pub);
        debug!("server public key received");
        Ok(())
    }

    /// Authenticate with the appliance.
    ///
    /// Fetches the server public key if not yet present, sends the
    /// credentials through the encrypted envelope, then adopts the returned
    /// token, signing secret and routing id. Token and secret become visible
    /// together — no signed request can be sent before both exist.
    pub async fn login(&mut self, username: &str, password: &str) -> NasResult<()> {
        if self.rsa_pub.is_none() {
            self.fetch_public_key().await?;
        }

        let params = json!({
            "user": username,
            "password": password,
            "deviceType": DEVICE_TYPE,
            "deviceName": self.device_name,
            "stay": true,
            "si": self.si,
        });

        let reply = match self.send_request("user.login", params).await {
            Ok(reply) => reply,
            Err(NasError::RequestFailed(payload)) => return Err(NasError::Login(payload)),
            Err(e) => return Err(e),
        };
        if !reply.is_success() {
            return Err(NasError::Login(serde_json::to_string(&reply)?));
        }

        let token = reply
            .top_str("token")
            .ok_or_else(|| NasError::Login("login reply carried no token".into()))?
            .to_string();
        let raw_secret = reply
            .top_str("secret")
            .ok_or_else(|| NasError::Login("login reply carried no secret".into()))?;

        let secret = match crypto::aes_decrypt(raw_secret, self.key.as_bytes(), &self.iv) {
            Ok(decrypted) => decrypted,
            Err(e) => {
                // Some firmware returns the secret in a different encoding;
                // keep the raw value so signed requests still work.
                warn!(error = %e, "session secret did not decrypt, keeping raw value");
                raw_secret.to_string()
            }
        };

        if let Some(back_id) = reply.top_str("backId") {
            self.back_id = back_id.to_string();
        }
        self.token = Some(token);
        self.secret = Some(secret);
        info!(user = %username, "authenticated with appliance");
        Ok(())
    }

    /// Exchange for the opaque entry token used to build externally
    /// routable application URLs.
    pub async fn exchange_entry_token(&self) -> NasResult<String> {
        let reply = self
            .send_request("appcgi.sac.entry.v1.exchangeEntryToken", json!({}))
            .await?;
        reply
            .data_str("token")
            .map(str::to_string)
            .ok_or_else(|| NasError::RequestFailed("entry token reply carried no token".into()))
    }

    /// List the appliance's hosted applications.
    pub async fn list_applications(&self, all: bool) -> NasResult<Vec<ServiceDescriptor>> {
        let reply = self
            .send_request("appcgi.sac.entry.v1.dockerList", json!({ "all": all }))
            .await?;
        directory::from_list_payload(reply.data.as_ref())
    }

    /// Send a correlated request and wait for its reply.
    ///
    /// Fails with [`NasError::NotConnected`] when no live channel exists and
    /// [`NasError::Timeout`] after [`REQUEST_TIMEOUT`] with no matching
    /// reply. Any number of requests may be outstanding concurrently; each
    /// owns an independent timer and table entry.
    pub async fn send_request(&self, req: &str, params: Value) -> NasResult<Reply> {
        if !self.is_connected() {
            return Err(NasError::NotConnected);
        }

        let reqid = self.next_request_id();
        let data = message::build_request(&reqid, req, &params)?;

        let wire = if message::ENCRYPTED_REQUESTS.contains(&req) {
            let rsa_pub = self
                .rsa_pub
                .as_deref()
                .ok_or_else(|| NasError::Handshake("server public key not available".into()))?;
            let plaintext = serde_json::to_string(&data)?;
            let envelope = message::seal_envelope(&plaintext, &self.key, &self.iv, rsa_pub)?;
            // The envelope is one of the unsigned bootstrap types; the
            // server correlates on the reqid inside the encrypted payload.
            message::sign_request(
                message::ENVELOPE_REQUEST,
                &serde_json::to_string(&envelope)?,
                self.secret.as_deref(),
            )
        } else {
            let serialized = serde_json::to_string(&data)?;
            message::sign_request(req, &serialized, self.secret.as_deref())
        };

        trace!(%req, %reqid, "sending control request");
        let rx = self.pending.register(&reqid).await;

        {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.send(Message::Text(wire)).await {
                self.pending.abandon(&reqid).await;
                return Err(NasError::Transport(format!("control send failed: {e}")));
            }
        }

        tokio::select! {
            outcome = rx => match outcome {
                Ok(result) => result,
                Err(_) => Err(NasError::Transport("reply channel dropped".into())),
            },
            _ = time::sleep(REQUEST_TIMEOUT) => {
                self.pending.abandon(&reqid).await;
                Err(NasError::Timeout(format!("{req} (reqid {reqid})")))
            }
        }
    }

    /// Close the control channel and stop the read task.
    pub async fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        {
            let mut sink = self.sink.lock().await;
            let _ = sink.send(Message::Close(None)).await;
        }
        self.read_handle.abort();
        debug!("control connection closed");
    }

    fn next_request_id(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        message::request_id(now, &self.back_id, seq)
    }
}

impl Drop for NasClient {
    fn drop(&mut self) {
        self.read_handle.abort();
    }
}

/// Inbound dispatch loop, shared by every connection strategy.
///
/// Replies go to the pending table; transport pings are answered in place.
/// When the loop ends, outstanding requests are deliberately left in the
/// table — each caller discovers the loss through its own timeout.
async fn read_loop(
    mut read: SplitStream<WsStream>,
    pending: Arc<PendingTable>,
    sink: Arc<Mutex<WsSink>>,
    connected: Arc<AtomicBool>,
) {
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                pending.dispatch(&text).await;
            }
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => {
                    pending.dispatch(&text).await;
                }
                Err(_) => warn!("non-UTF-8 binary frame dropped"),
            },
            Ok(Message::Ping(payload)) => {
                let mut sink = sink.lock().await;
                let _ = sink.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(frame)) => {
                debug!(?frame, "control channel closed by server");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "control channel read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
    debug!("control read loop ended");
}
