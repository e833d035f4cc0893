//! taskdesk-sync - data synchronization layer for a task-management back office
//!
//! Provides a query cache kept coherent by backend change notifications, a
//! voucher sequence generator, and a role-based route guard.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod models;
pub mod notify;
pub mod realtime;
pub mod tasks;
pub mod voucher;

pub use api::AppState;
pub use config::Config;
pub use tasks::spawn_cleanup_task;
