//! Attendance check-in/check-out state machine.
//!
//! Each (event, attendee) pair moves NOT_PRESENT -> CHECKED_IN -> CHECKED_OUT,
//! never skipping or reversing a step. A scan is accepted only when:
//! - the token decodes and names an existing event,
//! - the event's gate for that operation is open,
//! - the token is of the right kind, fresh, and carries the gate's current code,
//! - the attendee's record is in the state preceding the operation.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use mockable::Clock;
use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use super::error::AttendanceError;
use super::gate::EventGates;
use super::qr_token::QrTokenCodec;
use crate::model::attendance::{AttendanceRecord, ScanKind};
use crate::store::{AttendanceStore, EventGateStore, StoreError, UserDirectory};

/// A freshly minted token for one gate of one event.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub kind: ScanKind,
    pub event_id: u64,
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScanOutcome {
    #[serde(rename = "type")]
    pub kind: ScanKind,
    #[schema(example = "Check-in successful")]
    pub message: String,
    #[schema(example = "Jane Doe")]
    pub user_name: String,
    #[schema(example = "RustConf Meetup")]
    pub event_title: String,
    pub record: AttendanceRecord,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttendanceEntry {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    #[schema(example = "Jane Doe")]
    pub user_name: String,
    #[schema(example = "jane@example.com")]
    pub user_email: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttendanceHistoryEntry {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    #[schema(example = "RustConf Meetup")]
    pub event_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AttendanceSummary {
    pub event_id: u64,
    pub event_title: String,
    pub total_registered: usize,
    pub total_checked_in: usize,
    pub total_checked_out: usize,
    pub check_in_started: bool,
    pub check_out_started: bool,
}

pub struct AttendanceService {
    gates: EventGates,
    events: Arc<dyn EventGateStore>,
    records: Arc<dyn AttendanceStore>,
    users: Arc<dyn UserDirectory>,
    codec: QrTokenCodec,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl AttendanceService {
    pub fn new(
        events: Arc<dyn EventGateStore>,
        records: Arc<dyn AttendanceStore>,
        users: Arc<dyn UserDirectory>,
        codec: QrTokenCodec,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            gates: EventGates::new(events.clone()),
            events,
            records,
            users,
            codec,
            clock,
        }
    }

    pub fn gates(&self) -> &EventGates {
        &self.gates
    }

    /// Mints a token bound to the event's current code for `kind`.
    pub async fn mint(&self, event_id: u64, kind: ScanKind) -> Result<MintedToken, AttendanceError> {
        let code = self.gates.current_code(event_id, kind).await?;
        self.sign(event_id, kind, &code)
    }

    /// Rotates the code for `kind` and mints a token with the new one.
    pub async fn rotate_and_mint(
        &self,
        event_id: u64,
        kind: ScanKind,
    ) -> Result<MintedToken, AttendanceError> {
        let code = self.gates.rotate_code(event_id, kind).await?;
        self.sign(event_id, kind, &code)
    }

    fn sign(&self, event_id: u64, kind: ScanKind, code: &str) -> Result<MintedToken, AttendanceError> {
        // tokens carry whole seconds; expires_at must match what validate() sees
        let issued_at = self.clock.utc().trunc_subsecs(0);
        let token = self
            .codec
            .mint(kind, event_id, code, issued_at)
            .map_err(|e| AttendanceError::Render(e.to_string()))?;
        Ok(MintedToken {
            kind,
            event_id,
            token,
            issued_at,
            expires_at: issued_at + self.codec.max_age(),
        })
    }

    pub async fn scan_check_in(
        &self,
        raw_token: &str,
        attendee_id: u64,
    ) -> Result<ScanOutcome, AttendanceError> {
        self.scan(ScanKind::CheckIn, raw_token, attendee_id).await
    }

    pub async fn scan_check_out(
        &self,
        raw_token: &str,
        attendee_id: u64,
    ) -> Result<ScanOutcome, AttendanceError> {
        self.scan(ScanKind::CheckOut, raw_token, attendee_id).await
    }

    /// Tries check-in, then check-out. When both fail the check-in
    /// `GateClosed` wins, then the check-out one, else a generic invalid code.
    /// Storage failures are returned immediately.
    pub async fn scan_auto(
        &self,
        raw_token: &str,
        attendee_id: u64,
    ) -> Result<ScanOutcome, AttendanceError> {
        let mut failures = Vec::with_capacity(2);
        for kind in [ScanKind::CheckIn, ScanKind::CheckOut] {
            match self.scan(kind, raw_token, attendee_id).await {
                Ok(outcome) => return Ok(outcome),
                Err(e @ AttendanceError::Storage(_)) => return Err(e),
                Err(e) => {
                    debug!(%kind, error = %e, "Auto scan attempt rejected");
                    failures.push(e);
                }
            }
        }
        Err(most_specific_failure(failures))
    }

    pub async fn scan(
        &self,
        kind: ScanKind,
        raw_token: &str,
        attendee_id: u64,
    ) -> Result<ScanOutcome, AttendanceError> {
        let now = self.clock.utc();

        let token = self.codec.decode(raw_token).map_err(|e| {
            debug!(error = %e, "Rejected undecodable QR token");
            AttendanceError::invalid_token("Invalid QR code data")
        })?;

        let event = self.gates.event(token.event_id).await?;

        if !event.gate.is_open(kind) {
            return Err(AttendanceError::GateClosed(kind));
        }

        if !self.codec.validate(&token, event.id, kind, now) {
            return Err(AttendanceError::invalid_token("Invalid or expired QR code"));
        }

        if event.gate.code(kind) != Some(token.code.as_str()) {
            return Err(AttendanceError::invalid_token("Invalid QR code for this event"));
        }

        let attendee = self
            .users
            .find_user(attendee_id)
            .await?
            .ok_or(AttendanceError::NotFound("User"))?;

        let record = match kind {
            ScanKind::CheckIn => self.check_in(event.id, attendee.id, now).await?,
            ScanKind::CheckOut => self.check_out(event.id, attendee.id, now).await?,
        };

        info!(event_id = event.id, attendee_id, %kind, "Attendance scan accepted");

        Ok(ScanOutcome {
            kind,
            message: format!("{} successful", kind.label()),
            user_name: attendee.display_name().to_owned(),
            event_title: event.title,
            record,
        })
    }

    async fn check_in(
        &self,
        event_id: u64,
        attendee_id: u64,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AttendanceError> {
        if self.records.find(event_id, attendee_id).await?.is_some() {
            return Err(AttendanceError::AlreadyCheckedIn);
        }

        match self.records.create_checked_in(event_id, attendee_id, now).await {
            Ok(record) => Ok(record),
            // lost the insert race to a concurrent scan for the same pair
            Err(StoreError::Conflict(_)) => Err(AttendanceError::AlreadyCheckedIn),
            Err(e) => Err(e.into()),
        }
    }

    async fn check_out(
        &self,
        event_id: u64,
        attendee_id: u64,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let record = self
            .records
            .find(event_id, attendee_id)
            .await?
            .ok_or(AttendanceError::NoCheckInRecord)?;

        if !record.check_in_confirmed {
            return Err(AttendanceError::NoCheckInRecord);
        }
        if record.check_out_confirmed {
            return Err(AttendanceError::AlreadyCheckedOut);
        }

        match self.records.mark_checked_out(&record, now).await {
            Ok(record) => Ok(record),
            Err(StoreError::Conflict(_)) => Err(AttendanceError::AlreadyCheckedOut),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn event_attendance(
        &self,
        event_id: u64,
    ) -> Result<Vec<AttendanceEntry>, AttendanceError> {
        self.gates.event(event_id).await?;

        let records = self.records.list_for_event(event_id).await?;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let user = self.users.find_user(record.user_id).await?;
            let (user_name, user_email) = match user {
                Some(u) => (u.display_name().to_owned(), u.email),
                None => ("Unknown".to_owned(), "Unknown".to_owned()),
            };
            entries.push(AttendanceEntry {
                record,
                user_name,
                user_email,
            });
        }
        Ok(entries)
    }

    pub async fn summary(&self, event_id: u64) -> Result<AttendanceSummary, AttendanceError> {
        let event = self.gates.event(event_id).await?;
        let records = self.records.list_for_event(event_id).await?;

        Ok(AttendanceSummary {
            event_id: event.id,
            event_title: event.title,
            total_registered: records.len(),
            total_checked_in: records.iter().filter(|r| r.check_in_confirmed).count(),
            total_checked_out: records.iter().filter(|r| r.check_out_confirmed).count(),
            check_in_started: event.gate.check_in_open,
            check_out_started: event.gate.check_out_open,
        })
    }

    pub async fn attendee_history(
        &self,
        attendee_id: u64,
    ) -> Result<Vec<AttendanceHistoryEntry>, AttendanceError> {
        let records = self.records.list_for_attendee(attendee_id).await?;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let event_title = self
                .events
                .find_event(record.event_id)
                .await?
                .map(|e| e.title)
                .unwrap_or_else(|| "Unknown Event".to_owned());
            entries.push(AttendanceHistoryEntry {
                record,
                event_title,
            });
        }
        Ok(entries)
    }
}

fn most_specific_failure(failures: Vec<AttendanceError>) -> AttendanceError {
    failures
        .into_iter()
        .find(|e| matches!(e, AttendanceError::GateClosed(_)))
        .unwrap_or_else(|| AttendanceError::invalid_token("Invalid QR code"))
}

#[cfg(test)]
#[path = "attendance_tests.rs"]
mod tests;
