//! Response DTOs for the sync service API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheSource, CacheStats, QueryResult};
use crate::guard::{Role, Session};

/// Response body for cached table reads (GET /api/tables/:table)
#[derive(Debug, Clone, Serialize)]
pub struct TableResponse {
    pub data: Value,
    pub source: CacheSource,
    /// True when the data is a last-known value rather than a fresh read
    pub stale: bool,
    /// Fetch failure behind a stale answer
    pub error: Option<String>,
    pub fetched_at: u64,
}

impl From<QueryResult> for TableResponse {
    fn from(result: QueryResult) -> Self {
        Self {
            stale: result.is_stale(),
            data: result.data,
            source: result.source,
            error: result.error,
            fetched_at: result.fetched_at,
        }
    }
}

/// Response body for explicit invalidation (POST /api/cache/invalidate)
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub namespace: String,
    /// Number of entries marked stale
    pub invalidated: usize,
}

impl InvalidateResponse {
    pub fn new(namespace: impl Into<String>, invalidated: usize) -> Self {
        Self {
            namespace: namespace.into(),
            invalidated,
        }
    }
}

/// Response body for the cache stats endpoint (GET /api/cache/stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// Response body for accepted background work (POST /api/notifications)
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedResponse {
    pub status: String,
}

impl AcceptedResponse {
    pub fn queued() -> Self {
        Self {
            status: "queued".to_string(),
        }
    }
}

/// Page stand-in for protected routes: who is viewing what.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub path: String,
    pub role: Role,
    pub name: String,
    pub staff_id: Option<String>,
}

impl SessionResponse {
    pub fn new(path: impl Into<String>, session: Session) -> Self {
        Self {
            path: path.into(),
            role: session.role,
            name: session.name,
            staff_id: session.staff_id,
        }
    }
}

/// Login page stand-in (GET /login): where unauthenticated callers land.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub path: String,
    pub message: String,
}

impl LoginResponse {
    pub fn sign_in_required() -> Self {
        Self {
            path: crate::guard::LOGIN_PATH.to_string(),
            message: "Sign in required".to_string(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_response_marks_stale() {
        let resp = TableResponse::from(QueryResult {
            data: json!([{"id": 1}]),
            source: CacheSource::Stale,
            fetched_at: 10,
            error: Some("backend down".into()),
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["stale"], json!(true));
        assert_eq!(json["error"], json!("backend down"));
        assert_eq!(json["data"][0]["id"], json!(1));
    }

    #[test]
    fn test_stats_response_flattens_counters() {
        let stats = CacheStats {
            hits: 8,
            misses: 2,
            ..CacheStats::default()
        };
        let json = serde_json::to_value(StatsResponse::from(stats)).unwrap();
        assert_eq!(json["hits"], json!(8));
        assert!((json["hit_rate"].as_f64().unwrap() - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_session_response_serialize() {
        let session = Session::new(Role::Staff, "Ida", Some("9".into()));
        let json = serde_json::to_value(SessionResponse::new("/staff/tasks", session)).unwrap();
        assert_eq!(json["role"], json!("staff"));
        assert_eq!(json["staffId"], json!("9"));
        assert_eq!(json["path"], json!("/staff/tasks"));
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Something went wrong"));
    }
}
