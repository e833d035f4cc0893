//! In-memory backend.
//!
//! Implements both [`DataService`] and [`ChangeFeed`] over process-local
//! tables. Every mutation is published to the table's broadcast channel.
//! The transport can be dropped and restored to exercise reconnect paths.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{debug, info};

use super::{
    BackendError, BackendResult, ChangeEvent, ChangeFeed, ConnectionState, DataService, Operation,
    OperationFilter, Row, Select, Subscription, SubscriptionId,
};

/// Channel capacity for change notifications per table.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    channels: RwLock<HashMap<String, broadcast::Sender<ChangeEvent>>>,
    subscriptions: RwLock<HashMap<SubscriptionId, String>>,
    state: watch::Sender<ConnectionState>,
    injected_failures: Mutex<VecDeque<BackendError>>,
    next_id: AtomicI64,
    reads: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Connected);
        Self {
            tables: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            state,
            injected_failures: Mutex::new(VecDeque::new()),
            next_id: AtomicI64::new(1),
            reads: AtomicUsize::new(0),
        }
    }

    /// Loads rows without emitting change notifications.
    pub async fn seed(&self, table: &str, rows: Vec<Row>) {
        let mut tables = self.tables.write().await;
        let stored = tables.entry(table.to_string()).or_default();
        for mut row in rows {
            self.assign_defaults(&mut row);
            stored.push(row);
        }
    }

    /// Number of `select` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Makes the next `select` fail with the given error.
    pub async fn fail_next_select(&self, error: BackendError) {
        self.injected_failures.lock().await.push_back(error);
    }

    /// Publishes a notification as-is, e.g. to replay a duplicate.
    pub async fn emit(&self, event: ChangeEvent) {
        let sender = self.channel(&event.table).await;
        // No receivers just means nobody watches this table.
        let _ = sender.send(event);
    }

    /// Drops the realtime transport: every open stream is closed and all
    /// subscription ids are forgotten.
    pub async fn disconnect(&self) {
        self.state.send_replace(ConnectionState::Disconnected);
        self.channels.write().await.clear();
        self.subscriptions.write().await.clear();
        info!("Realtime transport disconnected");
    }

    /// Restores the realtime transport. Subscribers must subscribe again.
    pub fn reconnect(&self) {
        self.state.send_replace(ConnectionState::Connected);
        info!("Realtime transport reconnected");
    }

    /// Number of currently open subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    fn assign_defaults(&self, row: &mut Row) {
        match row.get("id").and_then(Value::as_i64) {
            Some(id) => {
                self.next_id.fetch_max(id + 1, Ordering::SeqCst);
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                row.insert("id".to_string(), Value::from(id));
            }
        }
        row.entry("created_at").or_insert_with(|| {
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
        });
    }

    async fn channel(&self, table: &str) -> broadcast::Sender<ChangeEvent> {
        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(table) {
                return sender.clone();
            }
        }

        let mut channels = self.channels.write().await;
        channels
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    async fn publish(&self, table: &str, operation: Operation, new: Option<Row>, old: Option<Row>) {
        if *self.state.borrow() == ConnectionState::Disconnected {
            debug!(table, %operation, "Transport down, change notification not delivered");
            return;
        }
        self.emit(ChangeEvent::new(table, operation, new, old)).await;
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn row_id(row: &Row) -> Option<i64> {
    row.get("id").and_then(Value::as_i64)
}

#[async_trait]
impl DataService for MemoryBackend {
    async fn select(&self, query: &Select) -> BackendResult<Vec<Row>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.injected_failures.lock().await.pop_front() {
            return Err(err);
        }

        let tables = self.tables.read().await;
        Ok(tables
            .get(&query.table)
            .map(|rows| query.apply(rows))
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, mut row: Row) -> BackendResult<Row> {
        if table.is_empty() {
            return Err(BackendError::client("table name cannot be empty"));
        }
        self.assign_defaults(&mut row);
        {
            let mut tables = self.tables.write().await;
            let rows = tables.entry(table.to_string()).or_default();
            if let Some(id) = row_id(&row) {
                if rows.iter().any(|r| row_id(r) == Some(id)) {
                    return Err(BackendError::client(format!(
                        "duplicate key: {} row {} already exists",
                        table, id
                    )));
                }
            }
            rows.push(row.clone());
        }
        self.publish(table, Operation::Insert, Some(row.clone()), None)
            .await;
        Ok(row)
    }

    async fn update(&self, table: &str, id: i64, patch: Row) -> BackendResult<Row> {
        let (old, new) = {
            let mut tables = self.tables.write().await;
            let row = tables
                .get_mut(table)
                .and_then(|rows| rows.iter_mut().find(|r| row_id(r) == Some(id)))
                .ok_or_else(|| BackendError::not_found(format!("{} row {} not found", table, id)))?;
            let old = row.clone();
            for (column, value) in patch {
                if column != "id" {
                    row.insert(column, value);
                }
            }
            (old, row.clone())
        };
        self.publish(table, Operation::Update, Some(new.clone()), Some(old))
            .await;
        Ok(new)
    }

    async fn delete(&self, table: &str, id: i64) -> BackendResult<Row> {
        let removed = {
            let mut tables = self.tables.write().await;
            let rows = tables
                .get_mut(table)
                .ok_or_else(|| BackendError::not_found(format!("{} row {} not found", table, id)))?;
            let index = rows
                .iter()
                .position(|r| row_id(r) == Some(id))
                .ok_or_else(|| BackendError::not_found(format!("{} row {} not found", table, id)))?;
            rows.remove(index)
        };
        self.publish(table, Operation::Delete, None, Some(removed.clone()))
            .await;
        Ok(removed)
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, table: &str, filter: OperationFilter) -> BackendResult<Subscription> {
        if *self.state.borrow() == ConnectionState::Disconnected {
            return Err(BackendError::transport("realtime transport is disconnected"));
        }
        let receiver = self.channel(table).await.subscribe();
        let subscription = Subscription::new(table, filter, receiver);
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, table.to_string());
        debug!(table, %filter, id = %subscription.id, "Subscription opened");
        Ok(subscription)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> BackendResult<()> {
        match self.subscriptions.write().await.remove(&id) {
            Some(table) => {
                debug!(%table, %id, "Subscription released");
                Ok(())
            }
            None => Err(BackendError::client(format!("unknown subscription {}", id))),
        }
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}
