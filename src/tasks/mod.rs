//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Cache eviction: Drops cached queries older than the retained age

mod cleanup;

pub use cleanup::spawn_cleanup_task;
