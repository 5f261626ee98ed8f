use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::attendance::ScanKind;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 12,
        "title": "RustConf Meetup",
        "description": "Monthly meetup",
        "location": "Hall A",
        "starts_at": "2026-05-01T09:00:00Z",
        "ends_at": "2026-05-01T17:00:00Z",
        "max_capacity": 120,
        "organizer_id": 2,
        "status": "published",
        "published_at": "2026-04-02T08:00:00Z",
        "check_in_open": false,
        "check_out_open": false,
        "created_at": "2026-04-01T10:00:00Z"
    })
)]
pub struct Event {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    #[schema(value_type = String, format = "date-time")]
    pub starts_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub ends_at: DateTime<Utc>,
    pub max_capacity: Option<u32>,
    pub organizer_id: u64,
    pub status: String,
    #[schema(value_type = String, format = "date-time", nullable = true)]
    pub published_at: Option<DateTime<Utc>>,
    pub check_in_open: bool,
    pub check_out_open: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// Gate switches and secret codes stored on an event row.
///
/// Only the toggle and rotate operations of the gate service mutate these
/// columns; everything else reads them through this value.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct EventGate {
    pub check_in_open: bool,
    pub check_out_open: bool,
    pub check_in_code: Option<String>,
    pub check_out_code: Option<String>,
}

impl EventGate {
    pub fn is_open(&self, kind: ScanKind) -> bool {
        match kind {
            ScanKind::CheckIn => self.check_in_open,
            ScanKind::CheckOut => self.check_out_open,
        }
    }

    pub fn code(&self, kind: ScanKind) -> Option<&str> {
        match kind {
            ScanKind::CheckIn => self.check_in_code.as_deref(),
            ScanKind::CheckOut => self.check_out_code.as_deref(),
        }
    }
}

/// Event identity plus its gate, as seen by the attendance core.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GatedEvent {
    pub id: u64,
    pub title: String,
    #[sqlx(flatten)]
    pub gate: EventGate,
}
