//! Storage ports used by the attendance core.
//!
//! The orchestrator only ever talks to these traits. [`mysql::MySqlStore`]
//! backs them in production; tests use the in-memory adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::attendance::{AttendanceRecord, ScanKind};
use crate::model::event::GatedEvent;
use crate::model::user::UserProfile;

#[cfg(test)]
pub mod memory;
pub mod mysql;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness or state precondition was violated by a concurrent writer.
    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Event lookup plus the gate columns of the event row.
#[async_trait]
pub trait EventGateStore: Send + Sync {
    async fn find_event(&self, event_id: u64) -> Result<Option<GatedEvent>, StoreError>;

    /// Returns `false` when the event does not exist.
    async fn set_gate_open(
        &self,
        event_id: u64,
        kind: ScanKind,
        open: bool,
    ) -> Result<bool, StoreError>;

    /// Stores `candidate` only if the event has no code yet for `kind` and
    /// returns whichever code is current afterwards.
    async fn ensure_code(
        &self,
        event_id: u64,
        kind: ScanKind,
        candidate: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Unconditionally replaces the code. Returns `false` when the event does not exist.
    async fn replace_code(
        &self,
        event_id: u64,
        kind: ScanKind,
        code: &str,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find(
        &self,
        event_id: u64,
        attendee_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Insert-if-absent. Fails with [`StoreError::Conflict`] when the pair already has a record.
    async fn create_checked_in(
        &self,
        event_id: u64,
        attendee_id: u64,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the record is already checked out.
    async fn mark_checked_out(
        &self,
        record: &AttendanceRecord,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StoreError>;

    async fn list_for_event(&self, event_id: u64) -> Result<Vec<AttendanceRecord>, StoreError>;

    async fn list_for_attendee(
        &self,
        attendee_id: u64,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: u64) -> Result<Option<UserProfile>, StoreError>;
}
