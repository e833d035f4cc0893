//! API Module
//!
//! HTTP handlers and routing for the sync service REST API.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `POST /api/voucher` - Issue the next voucher number
//! - `GET /api/tables/:table` - Cached table read
//! - `POST /api/tables/:table` - Insert a row
//! - `POST /api/cache/invalidate` - Explicit invalidation
//! - `GET /api/cache/stats` - Cache statistics
//! - `GET /api/realtime/status` - Realtime bridge status
//! - `POST /api/notifications` - Dispatch a notification
//! - `GET /admin/*`, `GET /staff/*` - Guarded pages

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
