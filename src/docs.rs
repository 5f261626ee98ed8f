use crate::api::attendance::{QrCodeResponse, ScanRequest};
use crate::api::event::{CreateEvent, EventListResponse};
use crate::model::attendance::{AttendanceRecord, ScanKind};
use crate::model::event::Event;
use crate::api::user::{UpdateUser, UserListResponse};
use crate::model::user::User;
use crate::models::{LoginReqDto, RegisterReq, TokenPair};
use crate::service::attendance::{
    AttendanceEntry, AttendanceHistoryEntry, AttendanceSummary, ScanOutcome,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "EventHub Attendance API",
        version = "1.0.0",
        description = r#"
## Event attendance backend

Organizers run events and open **check-in** and **check-out** gates.
While a gate is open, its QR code can be displayed; attendees scan it from
their own session to record arrival and departure.

### 🔹 Key Features
- **Events**
  - Create, update, list, publish, and delete events
- **Users**
  - Admins list, update, and deactivate accounts
- **Gates**
  - Start/stop check-in and check-out per event
  - Rotate the QR code to invalidate every token shown so far
- **Scanning**
  - Dedicated check-in/check-out scans, or a single endpoint that picks the right one
- **Reporting**
  - Per-event attendance list and summary, personal attendance history

### 🔐 Security
Endpoints under `/api` require a **JWT Bearer** access token.
Gate control and reporting require the `event:update` permission;
QR codes are only served to roles with `attendance:update`.

### 📦 Response Format
- JSON-based RESTful responses
- Errors: `{"error": "<kind>", "message": "<reason>"}`

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::user::me,
        crate::api::user::list_users,
        crate::api::user::get_user,
        crate::api::user::update_user,
        crate::api::user::deactivate_user,

        crate::api::event::create_event,
        crate::api::event::list_events,
        crate::api::event::get_event,
        crate::api::event::update_event,
        crate::api::event::delete_event,
        crate::api::event::publish_event,

        crate::api::attendance::start_check_in,
        crate::api::attendance::stop_check_in,
        crate::api::attendance::start_check_out,
        crate::api::attendance::stop_check_out,
        crate::api::attendance::qr_code,
        crate::api::attendance::rotate_qr_code,
        crate::api::attendance::scan_check_in,
        crate::api::attendance::scan_check_out,
        crate::api::attendance::scan_qr,
        crate::api::attendance::event_attendance,
        crate::api::attendance::event_summary,
        crate::api::attendance::my_attendance
    ),
    components(
        schemas(
            RegisterReq,
            LoginReqDto,
            TokenPair,
            User,
            UserListResponse,
            UpdateUser,
            Event,
            CreateEvent,
            EventListResponse,
            ScanKind,
            AttendanceRecord,
            QrCodeResponse,
            ScanRequest,
            ScanOutcome,
            AttendanceEntry,
            AttendanceHistoryEntry,
            AttendanceSummary
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration and token APIs"),
        (name = "User", description = "Account APIs"),
        (name = "Event", description = "Event management APIs"),
        (name = "Attendance", description = "Gate control, QR scanning and reporting APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
