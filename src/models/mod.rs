//! Request and Response models for the sync service API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{InvalidateRequest, NotificationRequest, VoucherRequest};
pub use responses::{
    AcceptedResponse, ErrorResponse, HealthResponse, InvalidateResponse, LoginResponse,
    SessionResponse, StatsResponse, TableResponse,
};
