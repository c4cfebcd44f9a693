//! Business logic, one service per concern. Handlers and the scheduler call
//! into these; nothing here knows about HTTP.

pub mod client_service;
pub mod credential_service;
pub mod oauth_providers;
pub mod oauth_service;
pub mod post_service;
pub mod publisher_manager;
pub mod scheduler;
pub mod title;
