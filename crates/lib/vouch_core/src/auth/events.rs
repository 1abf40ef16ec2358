//! Session lifecycle notifications.
//!
//! Delivery is best effort: a failing sink is logged by the caller and never
//! fails the authentication operation that produced the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Something that happened to a user's sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    LoggedIn {
        user_id: String,
        ip: Option<String>,
        user_agent: Option<String>,
        at: DateTime<Utc>,
    },
    Refreshed {
        user_id: String,
        ip: Option<String>,
        user_agent: Option<String>,
        at: DateTime<Utc>,
    },
    LoggedOut {
        user_id: String,
        at: DateTime<Utc>,
    },
    LoggedOutAll {
        user_id: String,
        revoked: u64,
        at: DateTime<Utc>,
    },
    /// A revoked refresh token was presented again.
    ReuseDetected {
        user_id: String,
        revoked: u64,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn user_id(&self) -> &str {
        match self {
            SessionEvent::LoggedIn { user_id, .. }
            | SessionEvent::Refreshed { user_id, .. }
            | SessionEvent::LoggedOut { user_id, .. }
            | SessionEvent::LoggedOutAll { user_id, .. }
            | SessionEvent::ReuseDetected { user_id, .. } => user_id,
        }
    }
}

/// Event sink errors.
#[derive(Debug, Error)]
pub enum EventSinkError {
    #[error("Event sink unavailable: {0}")]
    Unavailable(String),
}

/// Receives session events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &SessionEvent) -> Result<(), EventSinkError>;
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _event: &SessionEvent) -> Result<(), EventSinkError> {
        Ok(())
    }
}

/// Writes every event to the `tracing` log.
#[derive(Debug, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: &SessionEvent) -> Result<(), EventSinkError> {
        info!(user_id = event.user_id(), event = ?event, "session event");
        Ok(())
    }
}
