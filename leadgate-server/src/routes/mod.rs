//! Routes for [axum::Router].

pub mod fallback;
pub mod health;
pub mod lead_capture;
pub mod ping;
pub mod privacy;
