use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::PgPool;
use tokio::sync::{Mutex, broadcast};
use tracing::warn;
use turfmap_shared::{TerritoryEvent, TerritoryRecord};

use crate::config::{sse_broadcast_buffer, webhook_timeout, webhook_url};

/// Change event serialized once and shared by every SSE client.
#[derive(Debug, Clone)]
pub struct PreSerializedEvent {
    pub seq: u64,
    pub kind: &'static str,
    pub json: Arc<Bytes>,
}

#[derive(Clone)]
pub struct AppState {
    /// id -> row. Authoritative copy; the database is written through.
    pub territories: Arc<DashMap<String, TerritoryRecord>>,
    pub next_seq: Arc<AtomicU64>,
    /// Startup time in epoch ms. `next_seq` restarts at 0 on every boot, so
    /// list ETags carry this to stay unique across restarts.
    pub boot_ms: i64,
    pub event_tx: broadcast::Sender<PreSerializedEvent>,
    /// Serializes writes so sequence numbers follow apply order.
    pub write_lock: Arc<Mutex<()>>,
    pub http_client: reqwest::Client,
    /// PostgreSQL pool. None keeps the table in memory only.
    pub db: Option<PgPool>,
    pub webhook_url: Option<String>,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    list_requests_total: AtomicU64,
    writes_total: AtomicU64,
    rejected_writes_total: AtomicU64,
    persist_failures_total: AtomicU64,
    webhook_deliveries_total: AtomicU64,
    webhook_failures_total: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct ObservabilitySnapshot {
    pub list_requests_total: u64,
    pub writes_total: u64,
    pub rejected_writes_total: u64,
    pub persist_failures_total: u64,
    pub webhook_deliveries_total: u64,
    pub webhook_failures_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            list_requests_total: self.list_requests_total.load(Ordering::Relaxed),
            writes_total: self.writes_total.load(Ordering::Relaxed),
            rejected_writes_total: self.rejected_writes_total.load(Ordering::Relaxed),
            persist_failures_total: self.persist_failures_total.load(Ordering::Relaxed),
            webhook_deliveries_total: self.webhook_deliveries_total.load(Ordering::Relaxed),
            webhook_failures_total: self.webhook_failures_total.load(Ordering::Relaxed),
        }
    }

    pub fn record_list_request(&self) {
        self.list_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_write(&self) {
        self.rejected_writes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_webhook_delivery(&self) {
        self.webhook_deliveries_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_webhook_failure(&self) {
        self.webhook_failures_total.fetch_add(1, Ordering::Relaxed);
    }
}

impl AppState {
    pub fn new(db: Option<PgPool>) -> Self {
        Self::with_webhook(db, webhook_url())
    }

    pub fn with_webhook(db: Option<PgPool>, webhook_url: Option<String>) -> Self {
        let (event_tx, _) = broadcast::channel(sse_broadcast_buffer());
        let timeout = webhook_timeout();
        let http_client = reqwest::Client::builder()
            .user_agent("turfmap/0.1")
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build configured HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self {
            territories: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(0)),
            boot_ms: Utc::now().timestamp_millis(),
            event_tx,
            write_lock: Arc::new(Mutex::new(())),
            http_client,
            db,
            webhook_url,
            observability: Arc::new(ObservabilityCounters::default()),
        }
    }

    pub fn current_seq(&self) -> u64 {
        self.next_seq.load(Ordering::Acquire)
    }

    /// Every row, ordered by id.
    pub fn sorted_records(&self) -> Vec<TerritoryRecord> {
        let mut records: Vec<TerritoryRecord> = self
            .territories
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Replace the cache with rows loaded at startup.
    pub fn seed(&self, records: Vec<TerritoryRecord>) {
        self.territories.clear();
        for record in records {
            self.territories.insert(record.id.clone(), record);
        }
    }

    pub fn snapshot_event(&self) -> TerritoryEvent {
        TerritoryEvent::Snapshot {
            seq: self.current_seq(),
            territories: self.sorted_records(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Bump the sequence, serialize once and fan out. Call with `write_lock` held.
    pub fn publish_upsert(&self, territory: TerritoryRecord) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel) + 1;
        self.broadcast(TerritoryEvent::Upsert {
            seq,
            territory,
            timestamp: Utc::now().to_rfc3339(),
        });
        seq
    }

    pub fn publish_delete(&self, id: String) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel) + 1;
        self.broadcast(TerritoryEvent::Delete {
            seq,
            id,
            timestamp: Utc::now().to_rfc3339(),
        });
        seq
    }

    fn broadcast(&self, event: TerritoryEvent) {
        let json = match serde_json::to_vec(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, seq = event.seq(), "failed to serialize change event");
                return;
            }
        };
        // No subscribers is not an error.
        let _ = self.event_tx.send(PreSerializedEvent {
            seq: event.seq(),
            kind: event.kind(),
            json: Arc::new(Bytes::from(json)),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turfmap_shared::BoxRecord;

    fn record(id: &str) -> TerritoryRecord {
        TerritoryRecord {
            id: id.into(),
            name: id.into(),
            gang: String::new(),
            color: "#FF0000".into(),
            boxes: vec![BoxRecord {
                bounds: [[0.0, 0.0], [10.0, 10.0]],
            }],
        }
    }

    #[tokio::test]
    async fn publish_bumps_seq_and_fans_out_serialized_events() {
        let state = AppState::with_webhook(None, None);
        let mut rx = state.event_tx.subscribe();

        assert_eq!(state.publish_upsert(record("b")), 1);
        assert_eq!(state.publish_delete("b".into()), 2);
        assert_eq!(state.current_seq(), 2);

        let first = rx.recv().await.expect("upsert event");
        assert_eq!((first.seq, first.kind), (1, "upsert"));
        let parsed: TerritoryEvent =
            serde_json::from_slice(first.json.as_ref()).expect("event json");
        assert!(matches!(parsed, TerritoryEvent::Upsert { ref territory, .. } if territory.id == "b"));

        let second = rx.recv().await.expect("delete event");
        assert_eq!((second.seq, second.kind), (2, "delete"));
    }

    #[test]
    fn sorted_records_orders_by_id() {
        let state = AppState::with_webhook(None, None);
        state.seed(vec![record("c"), record("a"), record("b")]);
        let ids: Vec<String> = state.sorted_records().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
