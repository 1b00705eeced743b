//! Request/response correlation for the control channel.
//!
//! Every outbound request registers a oneshot waiter keyed by its
//! correlation id. The read loop feeds each inbound frame to [`dispatch`],
//! which removes the entry *before* completing it, so a waiter resolves at
//! most once even when a late reply races its timeout.
//!
//! [`dispatch`]: PendingTable::dispatch

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, trace, warn};

use fnlink_core::message::Reply;
use fnlink_core::{NasError, NasResult};

type Waiter = oneshot::Sender<NasResult<Reply>>;

/// Owned mapping from correlation id to the completion of its caller.
#[derive(Default)]
pub struct PendingTable {
    waiters: Mutex<HashMap<String, Waiter>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `reqid`. The returned receiver completes when
    /// a matching reply arrives; the caller owns the timeout.
    pub async fn register(&self, reqid: &str) -> oneshot::Receiver<NasResult<Reply>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(reqid.to_string(), tx);
        rx
    }

    /// Drop the waiter for `reqid`, if still present. Used by the timeout
    /// path so a late reply cannot resolve a caller that already gave up.
    pub async fn abandon(&self, reqid: &str) -> bool {
        self.waiters.lock().await.remove(reqid).is_some()
    }

    pub async fn len(&self) -> usize {
        self.waiters.lock().await.len()
    }

    /// Route one inbound frame to its pending caller.
    ///
    /// Returns `true` when a waiter was completed. Frames that do not parse,
    /// carry no `reqid`, or match no pending entry are dropped — there is no
    /// queuing, delivery is at most once per request.
    pub async fn dispatch(&self, raw: &str) -> bool {
        let reply = match serde_json::from_str::<Reply>(raw) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "unparseable control frame dropped");
                return false;
            }
        };
        let Some(reqid) = reply.reqid.clone() else {
            trace!("control frame without reqid dropped");
            return false;
        };

        let waiter = self.waiters.lock().await.remove(&reqid);
        let Some(waiter) = waiter else {
            debug!(%reqid, "reply with no pending request dropped");
            return false;
        };

        let outcome = if reply.is_fail() {
            Err(NasError::RequestFailed(raw.to_string()))
        } else {
            Ok(reply)
        };
        if waiter.send(outcome).is_err() {
            debug!(%reqid, "waiter gone before reply delivery");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reply_resolves_waiter_exactly_once() {
        let table = PendingTable::new();
        let rx = table.register("r1").await;

        assert!(table.dispatch(r#"{"reqid":"r1","result":"succ","data":{"x":1}}"#).await);
        let reply = rx.await.unwrap().unwrap();
        assert_eq!(reply.reqid.as_deref(), Some("r1"));
        assert_eq!(table.len().await, 0);

        // A duplicate reply has nothing left to resolve.
        assert!(!table.dispatch(r#"{"reqid":"r1","result":"succ"}"#).await);
    }

    #[tokio::test]
    async fn late_reply_after_timeout_is_dropped() {
        let table = PendingTable::new();
        let rx = table.register("r2").await;

        // The timeout path removes the entry before failing the caller.
        assert!(table.abandon("r2").await);
        drop(rx);

        assert!(!table.dispatch(r#"{"reqid":"r2","result":"succ"}"#).await);
        assert!(!table.abandon("r2").await);
    }

    #[tokio::test]
    async fn fail_result_rejects_with_raw_payload() {
        let table = PendingTable::new();
        let rx = table.register("r3").await;

        let raw = r#"{"reqid":"r3","result":"fail","errno":1}"#;
        assert!(table.dispatch(raw).await);
        match rx.await.unwrap() {
            Err(NasError::RequestFailed(payload)) => assert_eq!(payload, raw),
            other => panic!("expected RequestFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unmatched_and_malformed_frames_are_dropped() {
        let table = PendingTable::new();
        assert!(!table.dispatch("not json").await);
        assert!(!table.dispatch(r#"{"result":"succ"}"#).await);
        assert!(!table.dispatch(r#"{"reqid":"nobody","result":"succ"}"#).await);
    }

    #[tokio::test]
    async fn concurrent_waiters_complete_independently() {
        let table = PendingTable::new();
        let rx_a = table.register("a").await;
        let rx_b = table.register("b").await;

        assert!(table.dispatch(r#"{"reqid":"b","result":"succ"}"#).await);
        assert!(rx_b.await.unwrap().is_ok());
        assert_eq!(table.len().await, 1);

        assert!(table.dispatch(r#"{"reqid":"a","result":"succ"}"#).await);
        assert!(rx_a.await.unwrap().is_ok());
    }
}
