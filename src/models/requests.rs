//! Request DTOs for the sync service API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::QueryKey;
use crate::error::{AppError, Result};
use crate::notify::{Notification, NotificationKind};
use crate::voucher::VoucherType;

/// Request body for voucher generation (POST /api/voucher)
///
/// Fields are optional so that missing values surface as validation errors
/// rather than body rejections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoucherRequest {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default, rename = "type")]
    pub voucher_type: Option<String>,
}

impl VoucherRequest {
    /// Validates the request and returns the branch and voucher type.
    pub fn parse(&self) -> Result<(String, VoucherType)> {
        let branch = self
            .branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| AppError::Validation("branch is required".to_string()))?;

        let voucher_type = self
            .voucher_type
            .as_deref()
            .ok_or_else(|| AppError::Validation("type is required".to_string()))?
            .parse::<VoucherType>()?;

        Ok((branch.to_string(), voucher_type))
    }
}

/// Request body for explicit invalidation (POST /api/cache/invalidate)
///
/// Without `params` every entry in the namespace is invalidated.
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    pub namespace: String,
    #[serde(default)]
    pub params: Option<Vec<String>>,
}

impl InvalidateRequest {
    pub fn validate(&self) -> Option<String> {
        if self.namespace.trim().is_empty() {
            return Some("namespace cannot be empty".to_string());
        }
        None
    }

    /// The exact key addressed, if parameters were given.
    pub fn key(&self) -> Option<QueryKey> {
        self.params.as_ref().map(|params| {
            params
                .iter()
                .fold(QueryKey::new(self.namespace.clone()), |key, p| {
                    key.with_param(p.clone())
                })
        })
    }
}

/// Request body for notification dispatch (POST /api/notifications)
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRequest {
    pub kind: NotificationKind,
    #[serde(default)]
    pub payload: Value,
}

impl From<NotificationRequest> for Notification {
    fn from(req: NotificationRequest) -> Self {
        Notification::new(req.kind, req.payload)
    }
}
