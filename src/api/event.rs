use crate::{
    auth::auth::AuthUser,
    model::{event::Event, role::Role},
    utils::db_utils::{build_update_sql, execute_update},
};
use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

/// Columns a client may change through `PUT /events/{id}`.
///
/// Gate flags and codes only change through the attendance endpoints.
const UPDATABLE_COLUMNS: &[&str] = &[
    "title",
    "description",
    "location",
    "starts_at",
    "ends_at",
    "max_capacity",
    "status",
];

const EVENT_COLUMNS: &str = "id, title, description, location, starts_at, ends_at, max_capacity, \
     organizer_id, status, published_at, check_in_open, check_out_open, created_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateEvent {
    #[schema(example = "RustConf Meetup")]
    pub title: String,
    #[schema(example = "Monthly meetup", nullable = true)]
    pub description: Option<String>,
    #[schema(example = "Hall A")]
    pub location: String,
    #[schema(example = "2026-05-01T09:00:00Z", value_type = String, format = "date-time")]
    pub starts_at: DateTime<Utc>,
    #[schema(example = "2026-05-01T17:00:00Z", value_type = String, format = "date-time")]
    pub ends_at: DateTime<Utc>,
    #[schema(example = 120, nullable = true)]
    pub max_capacity: Option<u32>,
    #[schema(example = "draft", nullable = true)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EventQuery {
    /// Page number, starting at 1
    pub page: Option<u32>,
    /// Items per page (max 100)
    pub per_page: Option<u32>,
    /// Filter by status
    pub status: Option<String>,
    /// Search title, description or location
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct EventListResponse {
    pub data: Vec<Event>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

/// Create Event
#[utoipa::path(
    post,
    path = "/api/events",
    request_body = CreateEvent,
    responses(
        (status = 201, description = "Event created", body = Object, example = json!({
            "message": "Event created successfully", "id": 12
        })),
        (status = 400, description = "Invalid time range"),
        (status = 403, description = "Missing event:create"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Event",
    security(("bearer_auth" = []))
)]
pub async fn create_event(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEvent>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("event:create")?;

    if payload.title.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Title must not be empty"
        })));
    }
    if payload.ends_at <= payload.starts_at {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Event must end after it starts"
        })));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO events
        (title, description, location, starts_at, ends_at, max_capacity, organizer_id, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.title.trim())
    .bind(&payload.description)
    .bind(&payload.location)
    .bind(payload.starts_at)
    .bind(payload.ends_at)
    .bind(payload.max_capacity)
    .bind(auth.user_id)
    .bind(payload.status.as_deref().unwrap_or("draft"))
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to create event");
        ErrorInternalServerError("Something went wrong, Contact with system admin")
    })?;

    let id = result.last_insert_id();
    info!(event_id = id, organizer_id = auth.user_id, "Event created");

    Ok(HttpResponse::Created().json(json!({
        "message": "Event created successfully",
        "id": id
    })))
}

#[utoipa::path(
    get,
    path = "/api/events",
    params(EventQuery),
    responses(
        (status = 200, description = "Paginated event list", body = EventListResponse)
    ),
    tag = "Event",
    security(("bearer_auth" = []))
)]
pub async fn list_events(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EventQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("event:read")?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(status) = &query.status {
        conditions.push("status = ?");
        bindings.push(status.clone());
    }

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push("(title LIKE ? OR description LIKE ? OR location LIKE ?)");
        let like = format!("%{}%", search);
        bindings.push(like.clone());
        bindings.push(like.clone());
        bindings.push(like);
    }

    let where_clause = if conditions.is_empty() {
        "".to_string()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) AS total FROM events {}", where_clause);
    debug!(sql = %count_sql, bindings = ?bindings, "Counting events");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &bindings {
        count_query = count_query.bind(b);
    }

    let total = count_query.fetch_one(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %count_sql, "Failed to count events");
        ErrorInternalServerError("Database error")
    })?;

    let data_sql = format!(
        "SELECT {} FROM events {} ORDER BY starts_at DESC, id DESC LIMIT ? OFFSET ?",
        EVENT_COLUMNS, where_clause
    );
    debug!(sql = %data_sql, page, per_page, offset, "Fetching events");

    let mut data_query = sqlx::query_as::<_, Event>(&data_sql);
    for b in &bindings {
        data_query = data_query.bind(b);
    }
    data_query = data_query.bind(per_page as i64).bind(offset as i64);

    let events = data_query.fetch_all(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %data_sql, "Failed to fetch events");
        ErrorInternalServerError("Database error")
    })?;

    Ok(HttpResponse::Ok().json(EventListResponse {
        data: events,
        page,
        per_page,
        total,
    }))
}

/// Get Event by ID
#[utoipa::path(
    get,
    path = "/api/events/{event_id}",
    params(("event_id", Path, description = "Event ID")),
    responses(
        (status = 200, description = "Event found", body = Event),
        (status = 404, description = "Event not found", body = Object, example = json!({
            "message": "Event not found"
        }))
    ),
    tag = "Event",
    security(("bearer_auth" = []))
)]
pub async fn get_event(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("event:read")?;
    let event_id = path.into_inner();

    let event = sqlx::query_as::<_, Event>(&format!(
        "SELECT {} FROM events WHERE id = ?",
        EVENT_COLUMNS
    ))
    .bind(event_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, event_id, "Failed to fetch event");
        ErrorInternalServerError("Internal Server Error")
    })?;

    match event {
        Some(event) => Ok(HttpResponse::Ok().json(event)),
        None => Ok(HttpResponse::NotFound().json(json!({
            "message": "Event not found"
        }))),
    }
}

/// Update Event
///
/// Accepts any subset of title, description, location, starts_at, ends_at,
/// max_capacity and status.
#[utoipa::path(
    put,
    path = "/api/events/{event_id}",
    params(("event_id", Path, description = "Event ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Event updated", body = Object, example = json!({
            "message": "Event updated successfully"
        })),
        (status = 400, description = "Empty payload or field not updatable"),
        (status = 404, description = "Event not found")
    ),
    tag = "Event",
    security(("bearer_auth" = []))
)]
pub async fn update_event(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("event:update")?;
    let event_id = path.into_inner();

    let update = build_update_sql("events", &body, UPDATABLE_COLUMNS, "id", event_id)?;

    let affected = execute_update(pool.get_ref(), update).await.map_err(|e| {
        error!(error = %e, event_id, "Failed to update event");
        ErrorInternalServerError("Internal Server Error")
    })?;

    // MySQL reports 0 for an unchanged row as well
    if affected == 0 {
        let exists = sqlx::query_scalar::<_, i64>("SELECT EXISTS(SELECT 1 FROM events WHERE id = ?)")
            .bind(event_id)
            .fetch_one(pool.get_ref())
            .await
            .map_err(ErrorInternalServerError)?;
        if exists == 0 {
            return Ok(HttpResponse::NotFound().json(json!({
                "message": "Event not found"
            })));
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": "Event updated successfully"
    })))
}

/// Delete Event
///
/// Attendance records of the event are removed with it.
#[utoipa::path(
    delete,
    path = "/api/events/{event_id}",
    params(("event_id", Path, description = "Event ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 404, description = "Event not found")
    ),
    tag = "Event",
    security(("bearer_auth" = []))
)]
pub async fn delete_event(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("event:delete")?;
    let event_id = path.into_inner();

    let result = sqlx::query("DELETE FROM events WHERE id = ?")
        .bind(event_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, event_id, "Failed to delete event");
            ErrorInternalServerError("Internal Server Error")
        })?;

    if result.rows_affected() == 0 {
        return Ok(HttpResponse::NotFound().json(json!({
            "message": "Event not found"
        })));
    }

    info!(event_id, "Event deleted");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Successfully deleted"
    })))
}

/// Admins publish any event, everyone else only their own.
fn can_publish(auth: &AuthUser, organizer_id: u64) -> bool {
    auth.role == Role::Admin || auth.user_id == organizer_id
}

/// Publish Event
///
/// Publishing twice keeps the first `published_at`.
#[utoipa::path(
    post,
    path = "/api/events/{event_id}/publish",
    params(("event_id", Path, description = "Event ID")),
    responses(
        (status = 200, description = "Event published", body = Object, example = json!({
            "message": "Event published successfully", "id": 12
        })),
        (status = 403, description = "Missing event:publish or not the organizer"),
        (status = 404, description = "Event not found")
    ),
    tag = "Event",
    security(("bearer_auth" = []))
)]
pub async fn publish_event(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("event:publish")?;
    let event_id = path.into_inner();

    let organizer_id =
        sqlx::query_scalar::<_, u64>("SELECT organizer_id FROM events WHERE id = ?")
            .bind(event_id)
            .fetch_optional(pool.get_ref())
            .await
            .map_err(|e| {
                error!(error = %e, event_id, "Failed to fetch event organizer");
                ErrorInternalServerError("Internal Server Error")
            })?;

    let Some(organizer_id) = organizer_id else {
        return Ok(HttpResponse::NotFound().json(json!({
            "message": "Event not found"
        })));
    };

    if !can_publish(&auth, organizer_id) {
        debug!(event_id, organizer_id, user_id = auth.user_id, "Publish refused");
        return Ok(HttpResponse::Forbidden().json(json!({
            "message": "Only the organizer can publish this event"
        })));
    }

    sqlx::query(
        r#"
        UPDATE events
        SET status = 'published', published_at = COALESCE(published_at, ?)
        WHERE id = ?
        "#,
    )
    .bind(Utc::now())
    .bind(event_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, event_id, "Failed to publish event");
        ErrorInternalServerError("Internal Server Error")
    })?;

    info!(event_id, user_id = auth.user_id, "Event published");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Event published successfully",
        "id": event_id
    })))
}

#[cfg(test)]
mod tests {
    use actix_web::{App, http::StatusCode, middleware::from_fn, test::{self}};
    use rstest::rstest;
    use sqlx::mysql::MySqlPoolOptions;

    use super::*;
    use crate::auth::{jwt::generate_access_token, middleware::auth_middleware};
    use crate::config::Config;

    fn caller(user_id: u64, role: Role) -> AuthUser {
        AuthUser {
            user_id,
            email: "caller@example.com".into(),
            role,
        }
    }

    #[rstest]
    #[case(caller(2, Role::Organizer), 2, true)]
    #[case(caller(3, Role::Organizer), 2, false)]
    #[case(caller(1, Role::Admin), 2, true)]
    fn only_the_organizer_or_an_admin_publishes(
        #[case] auth: AuthUser,
        #[case] organizer_id: u64,
        #[case] allowed: bool,
    ) {
        assert_eq!(can_publish(&auth, organizer_id), allowed);
    }

    #[actix_web::test]
    async fn attendees_cannot_publish_events() {
        let config = Config::for_tests();
        // never connects: the permission check fails first
        let pool = MySqlPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config.clone()))
                .app_data(web::Data::new(pool))
                .service(
                    web::scope("/api/events")
                        .wrap(from_fn(auth_middleware))
                        .route("/{id}/publish", web::post().to(publish_event)),
                ),
        )
        .await;

        let token = generate_access_token(
            9,
            "guest@example.com",
            Role::User.id(),
            &config.jwt_secret,
            config.access_token_ttl,
        )
        .unwrap();
        let req = test::TestRequest::post()
            .uri("/api/events/1/publish")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();

        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }
}
