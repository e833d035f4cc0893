//! Notification Dispatch Module
//!
//! Fire-and-forget hand-off of notification events (new requests, approvals,
//! status changes) to a delivery service. Delivery failures are logged and
//! never roll back the mutation that triggered them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewRequest,
    Approved,
    Rejected,
    Submission,
    StatusUpdate,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationKind::NewRequest => "new_request",
            NotificationKind::Approved => "approved",
            NotificationKind::Rejected => "rejected",
            NotificationKind::Submission => "submission",
            NotificationKind::StatusUpdate => "status_update",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub payload: Value,
}

impl Notification {
    pub fn new(kind: NotificationKind, payload: Value) -> Self {
        Self { kind, payload }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("notification service responded with status {0}")]
    Status(u16),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Delivery boundary for notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Records notifications in the log only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(kind = %notification.kind, payload = %notification.payload, "Notification");
        Ok(())
    }
}

/// POSTs each notification as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Sends `notification` in the background. The handle resolves to whether
/// delivery succeeded; callers are free to ignore it.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) -> JoinHandle<bool> {
    tokio::spawn(async move {
        match notifier.send(&notification).await {
            Ok(()) => true,
            Err(err) => {
                warn!(kind = %notification.kind, error = %err, "Notification dispatch failed");
                false
            }
        }
    })
}
