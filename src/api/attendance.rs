use crate::{
    auth::auth::AuthUser,
    model::attendance::ScanKind,
    service::{
        attendance::{AttendanceService, MintedToken},
        error::AttendanceError,
    },
    utils::qr_image::render_svg_base64,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct QrCodeResponse {
    #[schema(example = 12)]
    pub event_id: u64,
    pub kind: ScanKind,
    /// Opaque token to be scanned
    pub qr_code_data: String,
    /// Base64 encoded SVG of the QR symbol
    pub qr_code_image: String,
    #[schema(value_type = String, format = "date-time")]
    pub expires_at: DateTime<Utc>,
}

impl QrCodeResponse {
    fn render(minted: MintedToken) -> Result<Self, AttendanceError> {
        let qr_code_image =
            render_svg_base64(&minted.token).map_err(|e| AttendanceError::Render(e.to_string()))?;
        Ok(Self {
            event_id: minted.event_id,
            kind: minted.kind,
            qr_code_data: minted.token,
            qr_code_image,
            expires_at: minted.expires_at,
        })
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ScanRequest {
    #[schema(example = "eyJ0eXAiOiJKV1QiLCJhbGciOiJIUzI1NiJ9...")]
    pub qr_code: String,
}

fn path_kind(segment: &str) -> Option<ScanKind> {
    match segment {
        "check-in" => Some(ScanKind::CheckIn),
        "check-out" => Some(ScanKind::CheckOut),
        _ => None,
    }
}

fn gate_message(kind: ScanKind, open: bool) -> String {
    format!(
        "{} {}",
        kind.label(),
        if open { "started" } else { "stopped" }
    )
}

async fn toggle(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    event_id: u64,
    kind: ScanKind,
    open: bool,
) -> actix_web::Result<HttpResponse> {
    auth.require_permission("event:update")?;

    let gates = service.gates();
    match (kind, open) {
        (ScanKind::CheckIn, true) => gates.open_check_in(event_id).await?,
        (ScanKind::CheckIn, false) => gates.close_check_in(event_id).await?,
        (ScanKind::CheckOut, true) => gates.open_check_out(event_id).await?,
        (ScanKind::CheckOut, false) => gates.close_check_out(event_id).await?,
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": gate_message(kind, open),
        "event_id": event_id,
    })))
}

/// Open the check-in gate
#[utoipa::path(
    post,
    path = "/api/attendance/events/{event_id}/start-check-in",
    params(("event_id", Path, description = "Event ID")),
    responses(
        (status = 200, description = "Check-in opened", body = Object, example = json!({
            "message": "Check-in started", "event_id": 12
        })),
        (status = 403, description = "Missing event:update"),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn start_check_in(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    toggle(auth, service, path.into_inner(), ScanKind::CheckIn, true).await
}

/// Close the check-in gate
#[utoipa::path(
    post,
    path = "/api/attendance/events/{event_id}/stop-check-in",
    params(("event_id", Path, description = "Event ID")),
    responses(
        (status = 200, description = "Check-in closed"),
        (status = 403, description = "Missing event:update"),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn stop_check_in(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    toggle(auth, service, path.into_inner(), ScanKind::CheckIn, false).await
}

/// Open the check-out gate
#[utoipa::path(
    post,
    path = "/api/attendance/events/{event_id}/start-check-out",
    params(("event_id", Path, description = "Event ID")),
    responses(
        (status = 200, description = "Check-out opened"),
        (status = 403, description = "Missing event:update"),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn start_check_out(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    toggle(auth, service, path.into_inner(), ScanKind::CheckOut, true).await
}

/// Close the check-out gate
#[utoipa::path(
    post,
    path = "/api/attendance/events/{event_id}/stop-check-out",
    params(("event_id", Path, description = "Event ID")),
    responses(
        (status = 200, description = "Check-out closed"),
        (status = 403, description = "Missing event:update"),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn stop_check_out(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    toggle(auth, service, path.into_inner(), ScanKind::CheckOut, false).await
}

/// Mint a QR token for the current gate code
#[utoipa::path(
    get,
    path = "/api/attendance/events/{event_id}/qr/{kind}",
    params(
        ("event_id", Path, description = "Event ID"),
        ("kind", Path, description = "`check-in` or `check-out`")
    ),
    responses(
        (status = 200, description = "QR token and image", body = QrCodeResponse),
        (status = 403, description = "Missing attendance:update"),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn qr_code(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<(u64, String)>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("attendance:update")?;

    let (event_id, segment) = path.into_inner();
    let kind = path_kind(&segment).ok_or(AttendanceError::NotFound("QR code type"))?;

    let minted = service.mint(event_id, kind).await?;
    Ok(HttpResponse::Ok().json(QrCodeResponse::render(minted)?))
}

/// Rotate the gate code and mint a QR token for the new one
///
/// Every token minted before the rotation stops validating.
#[utoipa::path(
    post,
    path = "/api/attendance/events/{event_id}/qr/{kind}/rotate",
    params(
        ("event_id", Path, description = "Event ID"),
        ("kind", Path, description = "`check-in` or `check-out`")
    ),
    responses(
        (status = 200, description = "QR token and image for the new code", body = QrCodeResponse),
        (status = 403, description = "Missing event:update"),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn rotate_qr_code(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<(u64, String)>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("event:update")?;

    let (event_id, segment) = path.into_inner();
    let kind = path_kind(&segment).ok_or(AttendanceError::NotFound("QR code type"))?;

    let minted = service.rotate_and_mint(event_id, kind).await?;
    Ok(HttpResponse::Ok().json(QrCodeResponse::render(minted)?))
}

/// Check the caller in with a scanned token
#[utoipa::path(
    post,
    path = "/api/attendance/scan/check-in",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Checked in", body = crate::service::attendance::ScanOutcome),
        (status = 400, description = "Gate closed, invalid token or already checked in", body = Object, example = json!({
            "error": "already_checked_in", "message": "Already checked in"
        })),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn scan_check_in(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<ScanRequest>,
) -> actix_web::Result<impl Responder> {
    let outcome = service.scan_check_in(&body.qr_code, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Check the caller out with a scanned token
#[utoipa::path(
    post,
    path = "/api/attendance/scan/check-out",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Checked out", body = crate::service::attendance::ScanOutcome),
        (status = 400, description = "Gate closed, invalid token, no check-in or already checked out"),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn scan_check_out(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<ScanRequest>,
) -> actix_web::Result<impl Responder> {
    let outcome = service.scan_check_out(&body.qr_code, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Scan a token of either kind
///
/// Check-in is attempted first, then check-out.
#[utoipa::path(
    post,
    path = "/api/attendance/scan/qr",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Checked in or out", body = crate::service::attendance::ScanOutcome),
        (status = 400, description = "Neither operation accepted the token")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn scan_qr(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<ScanRequest>,
) -> actix_web::Result<impl Responder> {
    let outcome = service.scan_auto(&body.qr_code, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Attendance records of an event with attendee names
#[utoipa::path(
    get,
    path = "/api/attendance/events/{event_id}/list",
    params(("event_id", Path, description = "Event ID")),
    responses(
        (status = 200, description = "Attendance records", body = Vec<crate::service::attendance::AttendanceEntry>),
        (status = 403, description = "Missing event:update"),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn event_attendance(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("event:update")?;

    let entries = service.event_attendance(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(entries))
}

/// Attendance counts and gate state of an event
#[utoipa::path(
    get,
    path = "/api/attendance/events/{event_id}/summary",
    params(("event_id", Path, description = "Event ID")),
    responses(
        (status = 200, description = "Summary", body = crate::service::attendance::AttendanceSummary),
        (status = 403, description = "Missing event:update"),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn event_summary(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("event:update")?;

    let summary = service.summary(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// The caller's attendance history
#[utoipa::path(
    get,
    path = "/api/attendance/my-attendance",
    responses(
        (status = 200, description = "Attendance history", body = Vec<crate::service::attendance::AttendanceHistoryEntry>)
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_attendance(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
) -> actix_web::Result<impl Responder> {
    let history = service.attendee_history(auth.user_id).await?;
    Ok(HttpResponse::Ok().json(history))
}
