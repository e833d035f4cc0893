//! Realtime Module
//!
//! Bridges backend change notifications (including mutations made by other
//! sessions) into query cache invalidations.

mod bridge;

use std::collections::HashMap;
use std::time::Duration;

use crate::backend::OperationFilter;

pub use bridge::{BridgeMonitor, BridgeStatus, RealtimeBridge};

/// Tables watched when no explicit list is configured.
pub const DEFAULT_TABLES: [&str; 8] = [
    "tasks",
    "task_assignments",
    "staff",
    "teams",
    "cash_transactions",
    "maintenance_requests",
    "attendance",
    "system_options",
];

/// One table/operation combination to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    pub table: String,
    pub filter: OperationFilter,
}

impl Watch {
    pub fn all(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: OperationFilter::All,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub watches: Vec<Watch>,
    /// Extra cache namespaces to invalidate per table, beyond the table's own
    pub dependencies: HashMap<String, Vec<String>>,
    /// Pause between failed resubscribe attempts
    pub resubscribe_delay: Duration,
}

impl BridgeConfig {
    pub fn new(watches: Vec<Watch>) -> Self {
        Self {
            watches,
            dependencies: HashMap::new(),
            resubscribe_delay: Duration::from_secs(1),
        }
    }

    /// Also invalidate `namespace` whenever `table` changes.
    pub fn with_dependency(mut self, table: &str, namespace: &str) -> Self {
        let deps = self.dependencies.entry(table.to_string()).or_default();
        if !deps.iter().any(|d| d == namespace) {
            deps.push(namespace.to_string());
        }
        self
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// Cache namespaces that depend on `table`, the table's own first.
    pub fn namespaces_for(&self, table: &str) -> Vec<String> {
        let mut namespaces = vec![table.to_string()];
        if let Some(extra) = self.dependencies.get(table) {
            namespaces.extend(extra.iter().filter(|ns| *ns != table).cloned());
        }
        namespaces
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TABLES.iter().map(|t| Watch::all(*t)).collect())
            .with_dependency("task_assignments", "tasks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::watch;

    use crate::backend::{
        BackendError, BackendResult, ChangeEvent, ChangeFeed, ConnectionState, DataService,
        MemoryBackend, Operation, Row, Subscription, SubscriptionId,
    };
    use crate::cache::{CacheConfig, CacheSource, QueryClient, QueryKey};

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn client() -> QueryClient {
        QueryClient::new(CacheConfig {
            stale_time: Duration::from_secs(60),
            ..CacheConfig::default()
        })
    }

    async fn wait_until<F, Fut>(mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn becomes_stale(client: &QueryClient, key: &QueryKey) -> bool {
        wait_until(move || async move {
            client
                .peek(key)
                .await
                .is_some_and(|r| r.source == CacheSource::Stale)
        })
        .await
    }

    /// Change feed whose unsubscribe always fails.
    struct StickyFeed(MemoryBackend);

    #[async_trait]
    impl ChangeFeed for StickyFeed {
        async fn subscribe(
            &self,
            table: &str,
            filter: crate::backend::OperationFilter,
        ) -> BackendResult<Subscription> {
            self.0.subscribe(table, filter).await
        }

        async fn unsubscribe(&self, _id: SubscriptionId) -> BackendResult<()> {
            Err(BackendError::transport("socket already gone"))
        }

        fn connection_state(&self) -> watch::Receiver<ConnectionState> {
            self.0.connection_state()
        }
    }

    /// Change feed backed by a small channel the test writes to directly.
    struct TightFeed {
        sender: tokio::sync::broadcast::Sender<ChangeEvent>,
        state: watch::Sender<ConnectionState>,
    }

    impl TightFeed {
        fn new(capacity: usize) -> Self {
            Self {
                sender: tokio::sync::broadcast::channel(capacity).0,
                state: watch::channel(ConnectionState::Connected).0,
            }
        }
    }

    #[async_trait]
    impl ChangeFeed for TightFeed {
        async fn subscribe(
            &self,
            table: &str,
            filter: crate::backend::OperationFilter,
        ) -> BackendResult<Subscription> {
            Ok(Subscription::new(table, filter, self.sender.subscribe()))
        }

        async fn unsubscribe(&self, _id: SubscriptionId) -> BackendResult<()> {
            Ok(())
        }

        fn connection_state(&self) -> watch::Receiver<ConnectionState> {
            self.state.subscribe()
        }
    }

    #[test]
    fn test_namespaces_for_includes_dependencies() {
        let config = BridgeConfig::default();
        assert_eq!(config.namespaces_for("tasks"), vec!["tasks".to_string()]);
        assert_eq!(
            config.namespaces_for("task_assignments"),
            vec!["task_assignments".to_string(), "tasks".to_string()]
        );
    }

    #[test]
    fn test_with_dependency_deduplicates() {
        let config = BridgeConfig::new(vec![Watch::all("a")])
            .with_dependency("a", "b")
            .with_dependency("a", "b")
            .with_dependency("a", "a");
        assert_eq!(config.namespaces_for("a"), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_task_change_invalidates_only_tasks_namespace() {
        let backend = Arc::new(MemoryBackend::new());
        let client = client();
        let tasks = QueryKey::new("tasks");
        let assigned = QueryKey::new("tasks").with("assignee", 4);
        let teams = QueryKey::new("teams");
        client.set(tasks.clone(), json!([])).await;
        client.set(assigned.clone(), json!([])).await;
        client.set(teams.clone(), json!([])).await;

        let bridge = RealtimeBridge::start(backend.clone(), client.clone(), BridgeConfig::default())
            .await
            .unwrap();

        backend.insert("tasks", row(json!({"title": "Audit"}))).await.unwrap();

        assert!(becomes_stale(&client, &assigned).await);
        assert!(becomes_stale(&client, &tasks).await);
        assert_eq!(client.peek(&teams).await.unwrap().source, CacheSource::Cache);

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_dependency_namespace_invalidated() {
        let backend = Arc::new(MemoryBackend::new());
        let client = client();
        let key = QueryKey::new("tasks");
        client.set(key.clone(), json!([])).await;

        let bridge = RealtimeBridge::start(backend.clone(), client.clone(), BridgeConfig::default())
            .await
            .unwrap();

        backend
            .insert("task_assignments", row(json!({"task_id": 1, "staff_id": 2})))
            .await
            .unwrap();

        assert!(becomes_stale(&client, &key).await);
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_and_reordered_events_are_harmless() {
        let backend = Arc::new(MemoryBackend::new());
        let client = client();
        let key = QueryKey::new("attendance");
        client.set(key.clone(), json!(["present"])).await;

        let bridge = RealtimeBridge::start(backend.clone(), client.clone(), BridgeConfig::default())
            .await
            .unwrap();

        let update = ChangeEvent::new("attendance", Operation::Update, None, None);
        let insert = ChangeEvent::new("attendance", Operation::Insert, None, None);
        backend.emit(update.clone()).await;
        backend.emit(update).await;
        backend.emit(insert).await;

        let status = &bridge;
        assert!(wait_until(move || async move { status.status().events_received == 3 }).await);
        let entry = client.peek(&key).await.unwrap();
        assert_eq!(entry.source, CacheSource::Stale);
        assert_eq!(entry.data, json!(["present"]));
        assert_eq!(client.len().await, 1);

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_lagging_subscriber_resyncs_table() {
        let feed = Arc::new(TightFeed::new(4));
        let client = client();
        let key = QueryKey::new("attendance").with("date", "2024-03-02");
        client.set(key.clone(), json!(["present"])).await;

        let bridge = RealtimeBridge::start(
            feed.clone(),
            client.clone(),
            BridgeConfig::new(vec![Watch::all("attendance")]),
        )
        .await
        .unwrap();

        // Sent without yielding, so the worker falls behind the channel.
        for _ in 0..20 {
            let event = ChangeEvent::new("attendance", Operation::Update, None, None);
            feed.sender.send(event).unwrap();
        }

        let handle = &bridge;
        assert!(wait_until(move || async move { handle.status().resyncs >= 1 }).await);
        assert!(becomes_stale(&client, &key).await);
        assert!(bridge.status().events_received < 20);

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_subscriptions() {
        let backend = Arc::new(MemoryBackend::new());
        let bridge = RealtimeBridge::start(backend.clone(), client(), BridgeConfig::default())
            .await
            .unwrap();

        assert_eq!(backend.subscription_count().await, DEFAULT_TABLES.len());
        assert!(bridge.is_connected());

        bridge.shutdown().await;
        assert_eq!(backend.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_start_fails_when_transport_down() {
        let backend = Arc::new(MemoryBackend::new());
        backend.disconnect().await;

        let result = RealtimeBridge::start(backend.clone(), client(), BridgeConfig::default()).await;
        assert!(result.is_err());
        assert_eq!(backend.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_resubscribes_after_reconnect() {
        let backend = Arc::new(MemoryBackend::new());
        let client = client();
        let key = QueryKey::new("staff");

        let config = BridgeConfig::new(vec![Watch::all("staff")])
            .with_resubscribe_delay(Duration::from_millis(5));
        let bridge = RealtimeBridge::start(backend.clone(), client.clone(), config)
            .await
            .unwrap();
        let handle = &bridge;

        backend.disconnect().await;
        assert!(wait_until(move || async move { !handle.is_connected() }).await);

        // Cache keeps serving last-known values while disconnected.
        client.set(key.clone(), json!(["before"])).await;
        assert_eq!(client.peek(&key).await.unwrap().source, CacheSource::Cache);

        backend.reconnect();
        assert!(wait_until(move || async move { handle.is_connected() }).await);
        assert_eq!(bridge.status().resubscriptions, 1);

        // Resync after reconnect covers changes missed while down.
        assert!(becomes_stale(&client, &key).await);

        client.set(key.clone(), json!(["fresh"])).await;
        backend.insert("staff", row(json!({"name": "Ravi"}))).await.unwrap();
        assert!(becomes_stale(&client, &key).await);

        bridge.shutdown().await;
        assert_eq!(backend.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_release_failure_does_not_panic() {
        let feed = Arc::new(StickyFeed(MemoryBackend::new()));
        let bridge = RealtimeBridge::start(
            feed.clone(),
            client(),
            BridgeConfig::new(vec![Watch::all("teams"), Watch::all("staff")]),
        )
        .await
        .unwrap();

        bridge.shutdown().await;
        assert_eq!(feed.0.subscription_count().await, 2);
    }

    #[tokio::test]
    async fn test_dropping_bridge_stops_workers() {
        let backend = Arc::new(MemoryBackend::new());
        let bridge = RealtimeBridge::start(
            backend.clone(),
            client(),
            BridgeConfig::new(vec![Watch::all("teams")]),
        )
        .await
        .unwrap();

        drop(bridge);
        let backend_ref = &backend;
        assert!(wait_until(move || async move { backend_ref.subscription_count().await == 0 }).await);
    }
}
