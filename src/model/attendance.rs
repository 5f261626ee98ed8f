use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Which half of the attendance flow a token or gate belongs to.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanKind {
    CheckIn,
    CheckOut,
}

impl ScanKind {
    /// Human phrase used in error messages, e.g. "Check-in".
    pub fn label(self) -> &'static str {
        match self {
            ScanKind::CheckIn => "Check-in",
            ScanKind::CheckOut => "Check-out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 12)]
    pub event_id: u64,
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub checked_in_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub checked_out_at: Option<DateTime<Utc>>,
    pub check_in_confirmed: bool,
    pub check_out_confirmed: bool,
    pub notes: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// Position of an attendee in the NOT_PRESENT -> CHECKED_IN -> CHECKED_OUT flow.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceState {
    NotPresent,
    CheckedIn,
    CheckedOut,
}

impl AttendanceRecord {
    pub fn state(&self) -> AttendanceState {
        match (self.check_in_confirmed, self.check_out_confirmed) {
            (_, true) => AttendanceState::CheckedOut,
            (true, false) => AttendanceState::CheckedIn,
            (false, false) => AttendanceState::NotPresent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn scan_kind_uses_snake_case_on_the_wire() {
        assert_eq!(ScanKind::CheckIn.to_string(), "check_in");
        assert_eq!(ScanKind::from_str("check_out").ok(), Some(ScanKind::CheckOut));
        assert_eq!(
            serde_json::to_string(&ScanKind::CheckOut).ok().as_deref(),
            Some("\"check_out\"")
        );
    }
}
