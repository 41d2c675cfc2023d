//! In-memory remote document store.
//!
//! Documents are kept as JSON objects so merge-writes behave like a real
//! document database: top-level fields in the patch replace stored fields, all
//! other fields survive. Server timestamps come from a [`Clock`] and are forced
//! to strictly increase per document.
//!
//! Latency and failures can be injected, and every landed operation is logged
//! in order, which is what the engine's tests assert against.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, warn};

use super::{RecordPatch, RecordStream, RemoteError, RemoteRecord, RemoteStore};
use crate::{
    Result,
    clock::{Clock, SystemClock, Timestamp, format_timestamp},
    constants::FIELD_UPDATED_AT,
};

/// An operation that reached the store.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOp {
    Get {
        key: String,
    },
    Write {
        key: String,
        patch: RecordPatch,
        updated_at: Timestamp,
        /// Runtime instant at which the write landed
        at: Instant,
    },
    /// A write made by another device via [`InMemoryRemote::external_write`].
    ExternalWrite {
        key: String,
        updated_at: Timestamp,
    },
    Subscribe {
        key: String,
    },
}

impl RemoteOp {
    pub fn key(&self) -> &str {
        match self {
            RemoteOp::Get { key }
            | RemoteOp::Write { key, .. }
            | RemoteOp::ExternalWrite { key, .. }
            | RemoteOp::Subscribe { key } => key,
        }
    }
}

type Subscriber = mpsc::UnboundedSender<std::result::Result<RemoteRecord, RemoteError>>;

#[derive(Default)]
struct RemoteState {
    documents: HashMap<String, Map<String, Value>>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    ops: Vec<RemoteOp>,
    read_latency: Duration,
    write_latency: Duration,
    failing_reads: u32,
    failing_writes: u32,
    failing_subscribes: u32,
}

impl RemoteState {
    fn parse(&self, key: &str) -> Option<std::result::Result<RemoteRecord, RemoteError>> {
        self.documents.get(key).map(|doc| {
            serde_json::from_value(Value::Object(doc.clone())).map_err(|source| {
                RemoteError::InvalidDocument {
                    key: key.to_string(),
                    source,
                }
            })
        })
    }

    /// Merge `fields` into the document and stamp it. Returns the stamp.
    fn merge(&mut self, key: &str, fields: Map<String, Value>, now: Timestamp) -> Timestamp {
        let doc = self.documents.entry(key.to_string()).or_default();
        let previous = doc
            .get(FIELD_UPDATED_AT)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|stamp| stamp.with_timezone(&Utc));
        let updated_at = match previous {
            Some(previous) if now <= previous => previous + TimeDelta::milliseconds(1),
            _ => now,
        };

        doc.extend(fields);
        doc.insert(
            FIELD_UPDATED_AT.to_string(),
            Value::String(format_timestamp(&updated_at)),
        );
        self.broadcast(key);
        updated_at
    }

    fn broadcast(&mut self, key: &str) {
        let record = match self.parse(key) {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                warn!("Not notifying subscribers of malformed record: {e}");
                return;
            }
            None => return,
        };
        if let Some(subscribers) = self.subscribers.get_mut(key) {
            subscribers.retain(|tx| tx.send(Ok(record.clone())).is_ok());
        }
    }
}

/// A [`RemoteStore`] kept in process memory.
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryRemote")
            .field("documents", &state.documents.len())
            .field("ops", &state.ops.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl InMemoryRemote {
    /// A store stamping records with the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(RemoteState::default()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === Fault injection ===

    /// Delay every point read by `latency`.
    pub fn set_read_latency(&self, latency: Duration) {
        self.lock().read_latency = latency;
    }

    /// Delay every merge-write by `latency` before it lands.
    pub fn set_write_latency(&self, latency: Duration) {
        self.lock().write_latency = latency;
    }

    /// Make the next `count` point reads fail.
    pub fn fail_next_reads(&self, count: u32) {
        self.lock().failing_reads = count;
    }

    /// Make the next `count` merge-writes fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.lock().failing_writes = count;
    }

    /// Make the next `count` subscribe calls fail.
    pub fn fail_next_subscribes(&self, count: u32) {
        self.lock().failing_subscribes = count;
    }

    /// Drop every change stream for `key`, as a lost connection would.
    ///
    /// Subscribers receive a [`RemoteError::SubscriptionClosed`] item and then
    /// the end of the stream.
    pub fn drop_subscribers(&self, key: &str) {
        let mut state = self.lock();
        if let Some(subscribers) = state.subscribers.remove(key) {
            debug!(key, count = subscribers.len(), "Dropping subscribers");
            for tx in subscribers {
                let _ = tx.send(Err(RemoteError::SubscriptionClosed {
                    key: key.to_string(),
                }));
            }
        }
    }

    // === Simulating other writers ===

    /// Write as another device would: merges and notifies subscribers.
    pub fn external_write(&self, key: &str, patch: &RecordPatch) -> Result<Timestamp> {
        let fields = encode(key, patch)?;
        let mut state = self.lock();
        let updated_at = state.merge(key, fields, self.clock.now());
        state.ops.push(RemoteOp::ExternalWrite {
            key: key.to_string(),
            updated_at,
        });
        Ok(updated_at)
    }

    /// Replace a raw document. Subscribers are notified if it parses.
    pub fn insert_document(&self, key: &str, document: Map<String, Value>) {
        let mut state = self.lock();
        state.documents.insert(key.to_string(), document);
        state.broadcast(key);
    }

    // === Inspection ===

    /// Every operation that reached the store, in order.
    pub fn ops(&self) -> Vec<RemoteOp> {
        self.lock().ops.clone()
    }

    /// Landed engine writes for `key`, oldest first.
    pub fn writes(&self, key: &str) -> Vec<(RecordPatch, Timestamp, Instant)> {
        self.lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                RemoteOp::Write {
                    key: k,
                    patch,
                    updated_at,
                    at,
                } if k == key => Some((patch.clone(), *updated_at, *at)),
                _ => None,
            })
            .collect()
    }

    pub fn write_count(&self, key: &str) -> usize {
        self.writes(key).len()
    }

    /// The raw stored document.
    pub fn document(&self, key: &str) -> Option<Map<String, Value>> {
        self.lock().documents.get(key).cloned()
    }

    /// The stored document parsed as a record.
    pub fn record(&self, key: &str) -> Option<RemoteRecord> {
        self.lock().parse(key).and_then(|parsed| parsed.ok())
    }

    /// Number of live change streams for `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        let mut state = self.lock();
        match state.subscribers.get_mut(key) {
            Some(subscribers) => {
                subscribers.retain(|tx| !tx.is_closed());
                subscribers.len()
            }
            None => 0,
        }
    }
}

fn encode(key: &str, patch: &RecordPatch) -> Result<Map<String, Value>> {
    match serde_json::to_value(patch) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Ok(Map::new()),
        Err(source) => Err(RemoteError::Encode {
            key: key.to_string(),
            source,
        }
        .into()),
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn get(&self, key: &str) -> Result<Option<RemoteRecord>> {
        let latency = self.lock().read_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(RemoteError::Unavailable {
                reason: "injected read failure".to_string(),
            }
            .into());
        }
        state.ops.push(RemoteOp::Get {
            key: key.to_string(),
        });
        match state.parse(key) {
            Some(parsed) => Ok(Some(parsed?)),
            None => Ok(None),
        }
    }

    async fn merge_write(&self, key: &str, patch: &RecordPatch) -> Result<Timestamp> {
        let latency = self.lock().write_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let fields = encode(key, patch)?;
        let mut state = self.lock();
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(RemoteError::Unavailable {
                reason: "injected write failure".to_string(),
            }
            .into());
        }
        let updated_at = state.merge(key, fields, self.clock.now());
        state.ops.push(RemoteOp::Write {
            key: key.to_string(),
            patch: patch.clone(),
            updated_at,
            at: Instant::now(),
        });
        Ok(updated_at)
    }

    async fn subscribe(&self, key: &str) -> Result<RecordStream> {
        let mut state = self.lock();
        if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            return Err(RemoteError::Unavailable {
                reason: "injected subscribe failure".to_string(),
            }
            .into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(Ok(record)) = state.parse(key) {
            let _ = tx.send(Ok(record));
        }
        state.subscribers.entry(key.to_string()).or_default().push(tx);
        state.ops.push(RemoteOp::Subscribe {
            key: key.to_string(),
        });
        Ok(rx)
    }
}
