//! Backend Types
//!
//! Rows, query descriptions, change notifications and subscription handles
//! shared by every backend implementation.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// A single table row as a JSON object.
pub type Row = serde_json::Map<String, Value>;

// == Backend Error ==
/// Failure class reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Request was malformed or rejected (4xx-like); never retried
    Client,
    /// Requested row does not exist
    NotFound,
    /// Backend failed while handling a valid request
    Server,
    /// Connection to the backend is unavailable
    Transport,
}

/// Error returned by [`DataService`](super::DataService) and
/// [`ChangeFeed`](super::ChangeFeed) calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Client, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotFound, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Server, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Transport, message)
    }

    /// Client-class failures (including missing rows) are never worth retrying.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::Client | BackendErrorKind::NotFound
        )
    }
}

// == Change Notifications ==
/// Kind of row mutation carried by a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "INSERT"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

/// Which operations a subscription wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperationFilter {
    #[default]
    All,
    Only(Operation),
}

impl OperationFilter {
    pub fn accepts(&self, operation: Operation) -> bool {
        match self {
            OperationFilter::All => true,
            OperationFilter::Only(op) => *op == operation,
        }
    }
}

impl fmt::Display for OperationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationFilter::All => write!(f, "*"),
            OperationFilter::Only(op) => write!(f, "{}", op),
        }
    }
}

/// An insert, update or delete observed on a watched table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub operation: Operation,
    /// Row after the change (absent for deletes)
    pub new: Option<Row>,
    /// Row before the change (absent for inserts)
    pub old: Option<Row>,
    pub commit_timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        table: impl Into<String>,
        operation: Operation,
        new: Option<Row>,
        old: Option<Row>,
    ) -> Self {
        Self {
            table: table.into(),
            operation,
            new,
            old,
            commit_timestamp: Utc::now(),
        }
    }
}

// == Subscriptions ==
/// Opaque identifier of an open change-feed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of the realtime transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Why a subscription stopped yielding events.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The receiver fell behind and this many notifications were dropped
    #[error("subscription lagged, {0} notifications dropped")]
    Lagged(u64),
    /// The transport closed the stream
    #[error("subscription closed")]
    Closed,
}

/// Handle for one open subscription. Events for other operations than the
/// requested filter are skipped by [`Subscription::recv`].
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub table: String,
    pub filter: OperationFilter,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(
        table: impl Into<String>,
        filter: OperationFilter,
        receiver: broadcast::Receiver<ChangeEvent>,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            table: table.into(),
            filter,
            receiver,
        }
    }

    /// Waits for the next matching change notification.
    pub async fn recv(&mut self) -> Result<ChangeEvent, SubscriptionError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.accepts(event.operation) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    return Err(SubscriptionError::Lagged(n))
                }
                Err(broadcast::error::RecvError::Closed) => return Err(SubscriptionError::Closed),
            }
        }
    }
}

// == Queries ==
/// Row predicate used by [`Select`].
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { column: String, value: Value },
    StartsWith { column: String, prefix: String },
}

impl Filter {
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq { column, value } => row.get(column) == Some(value),
            Filter::StartsWith { column, prefix } => row
                .get(column)
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// Table-scoped read: filter, order, limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn starts_with(mut self, column: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.filters.push(Filter::StartsWith {
            column: column.into(),
            prefix: prefix.into(),
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Applies filters, ordering and limit to a set of rows.
    pub fn apply<'a>(&self, rows: impl IntoIterator<Item = &'a Row>) -> Vec<Row> {
        let mut matched: Vec<Row> = rows
            .into_iter()
            .filter(|row| self.filters.iter().all(|f| f.matches(row)))
            .cloned()
            .collect();

        if let Some(order) = &self.order {
            matched.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// Orders JSON scalars: missing/null first, then numbers, then strings.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
