//! The store actor: the single task that owns the PGN store (§5 "Shared
//! resources" — the store and pending-broadcast buffer are touched by one
//! writer only). Every other task reaches it by message.
//!
//! Where §4.1 batches ingested records into a pending-broadcast buffer and
//! flushes it once per readiness-loop iteration, this redesign (licensed by
//! the Design Notes' message-passing alternative) broadcasts each record as
//! soon as it is ingested. `tokio::sync::broadcast` preserves send order
//! across all subscribers, so the §4.1 ordering guarantee — "records
//! ingested during iteration *k* precede all of iteration *k+1*" — still
//! holds; it is simply no longer batched into fixed-size ticks.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use crate::clock::now_secs;
use crate::ingest::parse_record;
use crate::model::validity_window_secs;
use crate::snapshot::build_snapshot;
use crate::store::Store;

/// Capacity of the streaming broadcast channel: how many unconsumed
/// records a lagging `JSON_STREAM`/stdout subscriber may fall behind by
/// before it starts dropping the oldest ones.
pub const BROADCAST_CAPACITY: usize = 1024;
/// Capacity of the actor's inbox.
pub const INBOX_CAPACITY: usize = 1024;

pub enum StoreCommand {
    /// One candidate record, exactly as read (newline already stripped).
    Ingest(String),
    /// Request a snapshot of the store as of now.
    Snapshot(oneshot::Sender<String>),
}

pub type StoreHandle = mpsc::Sender<StoreCommand>;
pub type BroadcastHandle = broadcast::Sender<Arc<str>>;

pub struct StoreActor {
    store: Store,
    inbox: mpsc::Receiver<StoreCommand>,
    broadcast_tx: BroadcastHandle,
}

impl StoreActor {
    /// Spawn the actor task, returning a sender for commands and a
    /// broadcast sender that streaming clients and stdout subscribe to.
    pub fn spawn() -> (StoreHandle, BroadcastHandle) {
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let handle_broadcast = broadcast_tx.clone();
        let mut actor = StoreActor {
            store: Store::new(),
            inbox,
            broadcast_tx,
        };
        tokio::spawn(async move { actor.run().await });
        (tx, handle_broadcast)
    }

    async fn run(&mut self) {
        while let Some(cmd) = self.inbox.recv().await {
            match cmd {
                StoreCommand::Ingest(text) => self.handle_ingest(text),
                StoreCommand::Snapshot(reply) => {
                    let snapshot = build_snapshot(&self.store, now_secs());
                    let _ = reply.send(snapshot);
                }
            }
        }
    }

    fn handle_ingest(&mut self, text: String) {
        let Some(parsed) = parse_record(&text) else {
            debug!("dropping malformed or out-of-range record");
            return;
        };
        let now = now_secs();
        let window = validity_window_secs(parsed.pgn, parsed.key_field);
        self.store.update(
            parsed.pgn,
            parsed.src,
            parsed.key2,
            parsed.text,
            now + window,
            parsed.description,
            now,
        );
        // Zero subscribers is a normal, not an error, condition.
        let _ = self.broadcast_tx.send(Arc::from(format!("{text}\n")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample(src: &str, pgn: &str) -> String {
        format!(
            "{{\"timestamp\":\"t\",\"src\":\"{src}\",\"dst\":\"255\",\"pgn\":\"{pgn}\",\"description\":\"Water Depth\",\"fields\":{{\"Depth\":3.1}}}}"
        )
    }

    #[tokio::test]
    async fn ingest_then_snapshot_contains_the_record() {
        let (handle, _broadcast) = StoreActor::spawn();
        handle
            .send(StoreCommand::Ingest(sample("35", "128267")))
            .await
            .unwrap();
        // Let the actor drain its inbox.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let (tx, rx) = oneshot::channel();
        handle.send(StoreCommand::Snapshot(tx)).await.unwrap();
        let snapshot = rx.await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
        assert!(value["128267"]["35"].is_object());
    }

    #[tokio::test]
    async fn malformed_record_does_not_reach_the_store() {
        let (handle, _broadcast) = StoreActor::spawn();
        handle
            .send(StoreCommand::Ingest("not json".to_string()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let (tx, rx) = oneshot::channel();
        handle.send(StoreCommand::Snapshot(tx)).await.unwrap();
        let snapshot = rx.await.unwrap();
        assert_eq!(snapshot, "{}");
    }

    #[tokio::test]
    async fn streaming_subscriber_sees_ingested_records_in_order() {
        let (handle, broadcast_tx) = StoreActor::spawn();
        let mut rx = broadcast_tx.subscribe();
        handle
            .send(StoreCommand::Ingest(sample("1", "128267")))
            .await
            .unwrap();
        handle
            .send(StoreCommand::Ingest(sample("2", "128267")))
            .await
            .unwrap();
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.contains("\"src\":\"1\""));
        assert!(second.contains("\"src\":\"2\""));
    }
}
