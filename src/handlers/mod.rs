//! Axum handlers, grouped by resource.

pub mod client_handlers;
pub mod health_handlers;
pub mod oauth_handlers;
pub mod publish_handlers;
