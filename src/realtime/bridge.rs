//! Real-time bridge between the backend change feed and the query cache.
//!
//! One worker task per watched table forwards change notifications into a
//! single channel; one dispatcher task drains it and applies invalidations in
//! receive order. Workers re-subscribe on their own after a transport drop.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{
    BackendResult, ChangeEvent, ChangeFeed, ConnectionState, Subscription, SubscriptionError,
    SubscriptionId,
};
use crate::cache::QueryClient;

use super::{BridgeConfig, Watch};

/// Message from a worker to the dispatcher.
#[derive(Debug)]
enum Signal {
    /// A change notification to apply
    Change(ChangeEvent),
    /// Notifications for the table may have been missed
    Resync(String),
}

#[derive(Debug, Default)]
struct Counters {
    events_received: AtomicU64,
    invalidations: AtomicU64,
    resyncs: AtomicU64,
    resubscriptions: AtomicU64,
    active_subscriptions: AtomicUsize,
}

/// Snapshot of the bridge's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    pub connection: ConnectionState,
    pub watched: usize,
    pub active_subscriptions: usize,
    pub events_received: u64,
    pub invalidations: u64,
    pub resyncs: u64,
    pub resubscriptions: u64,
}

/// Read-only view of a running bridge, cheap to clone into handlers.
#[derive(Debug, Clone)]
pub struct BridgeMonitor {
    connection: watch::Receiver<ConnectionState>,
    counters: Arc<Counters>,
    watched: usize,
}

impl BridgeMonitor {
    /// True when the transport is up and every watch has a live subscription.
    pub fn is_connected(&self) -> bool {
        *self.connection.borrow() == ConnectionState::Connected
            && self.counters.active_subscriptions.load(Ordering::SeqCst) == self.watched
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            connection: *self.connection.borrow(),
            watched: self.watched,
            active_subscriptions: self.counters.active_subscriptions.load(Ordering::SeqCst),
            events_received: self.counters.events_received.load(Ordering::SeqCst),
            invalidations: self.counters.invalidations.load(Ordering::SeqCst),
            resyncs: self.counters.resyncs.load(Ordering::SeqCst),
            resubscriptions: self.counters.resubscriptions.load(Ordering::SeqCst),
        }
    }
}

// == Realtime Bridge ==
pub struct RealtimeBridge {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
    monitor: BridgeMonitor,
}

impl RealtimeBridge {
    /// Opens one subscription per configured watch and starts forwarding
    /// notifications to `client`.
    ///
    /// If any subscription fails to open, the ones already opened are
    /// released and the error is returned.
    pub async fn start(
        feed: Arc<dyn ChangeFeed>,
        client: QueryClient,
        config: BridgeConfig,
    ) -> BackendResult<Self> {
        let mut opened: Vec<(Watch, Subscription)> = Vec::with_capacity(config.watches.len());
        for watch in &config.watches {
            match feed.subscribe(&watch.table, watch.filter).await {
                Ok(sub) => opened.push((watch.clone(), sub)),
                Err(err) => {
                    warn!(table = %watch.table, error = %err, "Subscription failed, rolling back");
                    for (_, sub) in opened {
                        release(feed.as_ref(), sub.id, &sub.table).await;
                    }
                    return Err(err);
                }
            }
        }

        let counters = Arc::new(Counters::default());
        let (shutdown, _) = watch::channel(false);
        let (tx, rx) = mpsc::unbounded_channel();
        let config = Arc::new(config);
        let watched = opened.len();

        let workers = opened
            .into_iter()
            .map(|(watch, sub)| {
                counters.active_subscriptions.fetch_add(1, Ordering::SeqCst);
                let worker = Worker {
                    feed: feed.clone(),
                    watch,
                    tx: tx.clone(),
                    shutdown: shutdown.subscribe(),
                    counters: counters.clone(),
                    resubscribe_delay: config.resubscribe_delay,
                };
                tokio::spawn(worker.run(sub))
            })
            .collect();
        drop(tx);

        let dispatcher = tokio::spawn(dispatch(rx, client, config, counters.clone()));
        info!(tables = watched, "Realtime bridge started");

        Ok(Self {
            shutdown,
            workers,
            dispatcher: Some(dispatcher),
            monitor: BridgeMonitor {
                connection: feed.connection_state(),
                counters,
                watched,
            },
        })
    }

    pub fn is_connected(&self) -> bool {
        self.monitor.is_connected()
    }

    pub fn status(&self) -> BridgeStatus {
        self.monitor.status()
    }

    pub fn monitor(&self) -> BridgeMonitor {
        self.monitor.clone()
    }

    /// Releases every subscription and waits for all tasks to finish.
    /// Pending notifications already received are still applied.
    pub async fn shutdown(mut self) {
        self.shutdown.send_replace(true);

        for worker in std::mem::take(&mut self.workers) {
            if let Err(err) = worker.await {
                warn!(error = %err, "Realtime worker ended abnormally");
            }
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(err) = dispatcher.await {
                warn!(error = %err, "Realtime dispatcher ended abnormally");
            }
        }
        info!("Realtime bridge stopped");
    }
}

impl Drop for RealtimeBridge {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Unsubscribes, logging instead of failing.
async fn release(feed: &dyn ChangeFeed, id: SubscriptionId, table: &str) {
    match feed.unsubscribe(id).await {
        Ok(()) => debug!(table, %id, "Subscription released"),
        Err(err) => warn!(table, %id, error = %err, "Failed to release subscription"),
    }
}

// == Worker ==
struct Worker {
    feed: Arc<dyn ChangeFeed>,
    watch: Watch,
    tx: mpsc::UnboundedSender<Signal>,
    shutdown: watch::Receiver<bool>,
    counters: Arc<Counters>,
    resubscribe_delay: Duration,
}

impl Worker {
    async fn run(mut self, mut sub: Subscription) {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    release(self.feed.as_ref(), sub.id, &sub.table).await;
                    self.counters.active_subscriptions.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
                received = sub.recv() => match received {
                    Ok(event) => {
                        if self.tx.send(Signal::Change(event)).is_err() {
                            return;
                        }
                    }
                    Err(SubscriptionError::Lagged(missed)) => {
                        warn!(table = %self.watch.table, missed, "Change feed lagged, resyncing table");
                        if self.tx.send(Signal::Resync(self.watch.table.clone())).is_err() {
                            return;
                        }
                    }
                    Err(SubscriptionError::Closed) => {
                        self.counters.active_subscriptions.fetch_sub(1, Ordering::SeqCst);
                        warn!(table = %self.watch.table, "Change feed closed, waiting to resubscribe");

                        match self.resubscribe().await {
                            Some(fresh) => {
                                sub = fresh;
                                self.counters.resubscriptions.fetch_add(1, Ordering::SeqCst);
                                self.counters.active_subscriptions.fetch_add(1, Ordering::SeqCst);
                                info!(table = %self.watch.table, "Resubscribed to change feed");
                                // Changes made while disconnected were never delivered.
                                if self.tx.send(Signal::Resync(self.watch.table.clone())).is_err() {
                                    return;
                                }
                            }
                            None => return,
                        }
                    }
                }
            }
        }
    }

    /// Waits for the transport to come back and subscribes again. Returns
    /// `None` if shutdown is requested first.
    async fn resubscribe(&mut self) -> Option<Subscription> {
        let mut connection = self.feed.connection_state();
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => return None,
                ready = async {
                    connection
                        .wait_for(|s| *s == ConnectionState::Connected)
                        .await
                        .is_ok()
                } => {
                    if !ready {
                        return None;
                    }
                }
            }

            match self.feed.subscribe(&self.watch.table, self.watch.filter).await {
                Ok(sub) => return Some(sub),
                Err(err) => {
                    warn!(table = %self.watch.table, error = %err, "Resubscribe failed, retrying");
                    tokio::select! {
                        _ = self.shutdown.changed() => return None,
                        _ = tokio::time::sleep(self.resubscribe_delay) => {}
                    }
                }
            }
        }
    }
}

// == Dispatcher ==
async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<Signal>,
    client: QueryClient,
    config: Arc<BridgeConfig>,
    counters: Arc<Counters>,
) {
    while let Some(signal) = rx.recv().await {
        let table = match &signal {
            Signal::Change(event) => {
                counters.events_received.fetch_add(1, Ordering::SeqCst);
                debug!(table = %event.table, operation = %event.operation, "Change notification");
                event.table.as_str()
            }
            Signal::Resync(table) => {
                counters.resyncs.fetch_add(1, Ordering::SeqCst);
                table.as_str()
            }
        };

        let namespaces = config.namespaces_for(table);
        let count = client
            .invalidate_namespaces(namespaces.iter().map(String::as_str))
            .await;
        counters
            .invalidations
            .fetch_add(count as u64, Ordering::SeqCst);
        debug!(table, entries = count, "Invalidated cache entries");
    }
}
