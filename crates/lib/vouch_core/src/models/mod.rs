//! Shared domain models.

pub mod auth;
