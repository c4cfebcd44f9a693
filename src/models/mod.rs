//! Core data models for the publisher engine.
//!
//! These entities represent clients, their connected platform accounts and
//! the posts scheduled on their behalf. They map to database tables via
//! `sqlx::FromRow` and serialize as JSON via `serde`.

pub mod client;
pub mod credential;
pub mod platform;
pub mod post;
