use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::model::attendance::ScanKind;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{} is not started for this event", .0.label())]
    GateClosed(ScanKind),

    #[error("{0}")]
    InvalidToken(String),

    #[error("Already checked in for this event")]
    AlreadyCheckedIn,

    #[error("Already checked out for this event")]
    AlreadyCheckedOut,

    #[error("No attendance record found. Please check in first.")]
    NoCheckInRecord,

    #[error("Conflicting attendance update: {0}")]
    Conflict(String),

    #[error("Failed to render QR code: {0}")]
    Render(String),

    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for AttendanceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(reason) => AttendanceError::Conflict(reason),
            other => AttendanceError::Storage(other),
        }
    }
}

impl AttendanceError {
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        AttendanceError::InvalidToken(reason.into())
    }

    /// Stable machine-readable kind, returned next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            AttendanceError::NotFound(_) => "not_found",
            AttendanceError::GateClosed(_) => "gate_closed",
            AttendanceError::InvalidToken(_) => "invalid_token",
            AttendanceError::AlreadyCheckedIn => "already_checked_in",
            AttendanceError::AlreadyCheckedOut => "already_checked_out",
            AttendanceError::NoCheckInRecord => "no_check_in_record",
            AttendanceError::Conflict(_) => "conflict",
            AttendanceError::Render(_) | AttendanceError::Storage(_) => "internal_error",
        }
    }
}

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::NotFound(_) => StatusCode::NOT_FOUND,
            AttendanceError::GateClosed(_)
            | AttendanceError::InvalidToken(_)
            | AttendanceError::AlreadyCheckedIn
            | AttendanceError::AlreadyCheckedOut
            | AttendanceError::NoCheckInRecord => StatusCode::BAD_REQUEST,
            AttendanceError::Conflict(_) => StatusCode::CONFLICT,
            AttendanceError::Render(_) | AttendanceError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AttendanceError::Render(_) | AttendanceError::Storage(_) => {
                tracing::error!(error = %self, "Attendance request failed");
                "Internal Server Error".to_owned()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": self.kind(),
            "message": message,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AttendanceError::NotFound("Event"), StatusCode::NOT_FOUND)]
    #[case(AttendanceError::GateClosed(ScanKind::CheckIn), StatusCode::BAD_REQUEST)]
    #[case(AttendanceError::invalid_token("Invalid QR code"), StatusCode::BAD_REQUEST)]
    #[case(AttendanceError::AlreadyCheckedIn, StatusCode::BAD_REQUEST)]
    #[case(AttendanceError::NoCheckInRecord, StatusCode::BAD_REQUEST)]
    #[case(AttendanceError::Conflict("dup".into()), StatusCode::CONFLICT)]
    fn maps_kinds_to_status(#[case] error: AttendanceError, #[case] status: StatusCode) {
        assert_eq!(error.status_code(), status);
    }

    #[test]
    fn gate_closed_names_the_operation() {
        assert_eq!(
            AttendanceError::GateClosed(ScanKind::CheckOut).to_string(),
            "Check-out is not started for this event"
        );
    }

    #[test]
    fn store_conflicts_keep_their_kind() {
        let error = AttendanceError::from(StoreError::Conflict("dup".into()));
        assert_eq!(error.kind(), "conflict");
    }
}
