//! API Handlers
//!
//! HTTP request handlers for each sync service endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    Extension, Json,
};
use axum_extra::extract::WithRejection;
use serde_json::Value;
use tracing::info;

use crate::backend::{DataService, MemoryBackend, Row, Select};
use crate::cache::{QueryClient, QueryKey};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::guard::{GuardConfig, Session};
use crate::models::{
    AcceptedResponse, HealthResponse, InvalidateRequest, InvalidateResponse, LoginResponse,
    NotificationRequest, SessionResponse, StatsResponse, TableResponse, VoucherRequest,
};
use crate::notify::{self, LogNotifier, Notifier, WebhookNotifier};
use crate::realtime::{BridgeMonitor, BridgeStatus};
use crate::voucher::{generate_voucher, Voucher};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Backend data service
    pub data: Arc<dyn DataService>,
    /// Shared query cache
    pub client: QueryClient,
    /// Status view of the realtime bridge, once started
    pub realtime: Option<BridgeMonitor>,
    pub notifier: Arc<dyn Notifier>,
    pub guard: GuardConfig,
}

impl AppState {
    pub fn new(data: Arc<dyn DataService>, client: QueryClient) -> Self {
        Self {
            data,
            client,
            realtime: None,
            notifier: Arc::new(LogNotifier),
            guard: GuardConfig::default(),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// The realtime monitor is attached separately once the bridge is up.
    pub fn from_config(config: &Config, backend: Arc<MemoryBackend>) -> Self {
        let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
            None => Arc::new(LogNotifier),
        };

        Self {
            data: backend,
            client: QueryClient::new(config.cache_config()),
            realtime: None,
            notifier,
            guard: GuardConfig::new(config.session_cookie.as_str()),
        }
    }

    pub fn with_realtime(mut self, monitor: BridgeMonitor) -> Self {
        self.realtime = Some(monitor);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

fn table_name(table: &str) -> Result<&str> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(table)
    } else {
        Err(AppError::Validation(format!("Invalid table name '{}'", table)))
    }
}

/// Handler for POST /api/voucher
///
/// Issues the next voucher number for a branch and transaction type.
pub async fn voucher_handler(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<VoucherRequest>, AppError>,
) -> Result<Json<Voucher>> {
    let (branch, voucher_type) = req.parse()?;
    let voucher = generate_voucher(state.data.as_ref(), &branch, voucher_type).await?;
    Ok(Json(voucher))
}

/// Handler for GET /api/tables/:table
///
/// Reads every row of a table through the query cache.
pub async fn table_get_handler(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<TableResponse>> {
    let table = table_name(&table)?;
    let key = QueryKey::new(table);
    let select = &Select::from(table);
    let data = state.data.as_ref();

    let result = state
        .client
        .get_or_fetch(&key, move || async move {
            data.select(select)
                .await
                .map(|rows| Value::Array(rows.into_iter().map(Value::Object).collect()))
        })
        .await?;

    Ok(Json(result.into()))
}

/// Handler for POST /api/tables/:table
///
/// Inserts a row. Cached reads of the table are invalidated right away; the
/// change notification reaches other sessions through the realtime bridge.
pub async fn table_insert_handler(
    State(state): State<AppState>,
    Path(table): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<Value>, AppError>,
) -> Result<(StatusCode, Json<Row>)> {
    let table = table_name(&table)?;
    let row = match body {
        Value::Object(row) => row,
        _ => return Err(AppError::Validation("Row must be a JSON object".to_string())),
    };

    let stored = state.data.insert(table, row).await?;
    state.client.invalidate_namespace(table).await;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Handler for POST /api/cache/invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<InvalidateRequest>, AppError>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(AppError::Validation(error_msg));
    }

    let invalidated = match req.key() {
        Some(key) => usize::from(state.client.invalidate(&key).await),
        None => state.client.invalidate_namespace(&req.namespace).await,
    };

    Ok(Json(InvalidateResponse::new(req.namespace, invalidated)))
}

/// Handler for GET /api/cache/stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.client.stats().await.into())
}

/// Handler for GET /api/realtime/status
pub async fn realtime_status_handler(State(state): State<AppState>) -> Result<Json<BridgeStatus>> {
    state
        .realtime
        .as_ref()
        .map(|monitor| Json(monitor.status()))
        .ok_or_else(|| AppError::Transport("Realtime bridge is not running".to_string()))
}

/// Handler for POST /api/notifications
///
/// Accepts the notification and dispatches it in the background.
pub async fn notification_handler(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<NotificationRequest>, AppError>,
) -> (StatusCode, Json<AcceptedResponse>) {
    info!(kind = %req.kind, "Notification queued");
    // Delivery outcome is logged by the dispatcher.
    let _ = notify::dispatch(state.notifier.clone(), req.into());
    (StatusCode::ACCEPTED, Json(AcceptedResponse::queued()))
}

/// Handler for GET /admin/* and /staff/*
///
/// Echoes the session viewing the page. Only reachable through the route guard.
pub async fn page_handler(
    uri: Uri,
    session: Option<Extension<Session>>,
) -> Result<Json<SessionResponse>> {
    let Extension(session) =
        session.ok_or_else(|| AppError::Internal("Session missing behind route guard".to_string()))?;
    Ok(Json(SessionResponse::new(uri.path(), session)))
}

/// Handler for GET /login
///
/// Public landing for redirected callers. Signed-in callers never reach it;
/// the route guard sends them home first.
pub async fn login_handler() -> Json<LoginResponse> {
    Json(LoginResponse::sign_in_required())
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
