//! Status values published to the UI alongside the data views.

use chrono::{DateTime, Utc};
use serde::Serialize;

use tandem_shared::ErrorKind;

/// Health of the push channel as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PushHealth {
    /// First connection not established yet.
    Connecting,
    Connected,
    /// Lost; `attempt` of the configured maximum is scheduled.
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted. Polling alone keeps data fresh.
    Degraded,
}

impl PushHealth {
    pub fn is_degraded(self) -> bool {
        matches!(self, PushHealth::Degraded)
    }
}

/// Last poll failure, kept until a poll succeeds or the user dismisses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Scheduler status exposed through `EngineHandle::sync_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub push: PushHealth,
    pub poll_error: Option<PollFailure>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            push: PushHealth::Connecting,
            poll_error: None,
        }
    }
}

impl SyncStatus {
    /// Push is gone for good and only polling remains.
    pub fn is_poll_only(&self) -> bool {
        self.push.is_degraded()
    }
}
