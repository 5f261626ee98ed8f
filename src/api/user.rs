use crate::{
    auth::auth::AuthUser,
    model::{role::Role, user::User},
    utils::db_utils::{build_update_sql, execute_update},
};
use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

const USER_COLUMNS: &str = "id, email, full_name, role_id, is_active, created_at";

/// Columns an admin may change through `PUT /users/{id}`.
const UPDATABLE_COLUMNS: &[&str] = &["full_name", "role_id", "is_active"];

#[derive(Debug, Deserialize, IntoParams)]
pub struct UserQuery {
    /// Page number, starting at 1
    pub page: Option<u32>,
    /// Items per page (max 100)
    pub per_page: Option<u32>,
    /// Filter by role id
    pub role_id: Option<u8>,
    /// Filter by active flag
    pub is_active: Option<bool>,
    /// Search email or full name
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UserListResponse {
    pub data: Vec<User>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct UpdateUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "Jane Doe", nullable = true)]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 2, nullable = true)]
    pub role_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = true, nullable = true)]
    pub is_active: Option<bool>,
}

/// Rejects updates an admin may not apply, either at all or to their own account.
fn check_update(auth: &AuthUser, user_id: u64, update: &UpdateUser) -> Result<(), &'static str> {
    if update.full_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err("Full name must not be empty");
    }
    if update.role_id.is_some_and(|id| Role::from_id(id).is_none()) {
        return Err("Unknown role");
    }
    if auth.user_id == user_id {
        if update.is_active == Some(false) {
            return Err("Cannot deactivate yourself");
        }
        if update.role_id.is_some_and(|id| id != auth.role.id()) {
            return Err("Cannot change your own role");
        }
    }
    Ok(())
}

async fn revoke_refresh_tokens(pool: &MySqlPool, user_id: u64) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ? AND revoked = FALSE")
            .bind(user_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

async fn user_exists(pool: &MySqlPool, user_id: u64) -> actix_web::Result<bool> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(ErrorInternalServerError)?;
    Ok(exists > 0)
}

/// The authenticated caller's profile
#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Caller profile", body = User),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Account no longer exists")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, user_id = auth.user_id, "Failed to fetch user");
            ErrorInternalServerError("Internal Server Error")
        })?;

    match user {
        Some(user) => Ok(HttpResponse::Ok().json(json!({
            "user": user,
            "role": auth.role.to_string(),
            "permissions": auth.role.permissions(),
        }))),
        None => Ok(HttpResponse::NotFound().json(json!({
            "message": "User not found"
        }))),
    }
}

#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Paginated user list", body = UserListResponse),
        (status = 403, description = "Missing user:read")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("user:read")?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(role_id) = query.role_id {
        conditions.push("role_id = ?");
        bindings.push(role_id.to_string());
    }

    if let Some(is_active) = query.is_active {
        conditions.push("is_active = ?");
        bindings.push(u8::from(is_active).to_string());
    }

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push("(email LIKE ? OR full_name LIKE ?)");
        let like = format!("%{}%", search);
        bindings.push(like.clone());
        bindings.push(like);
    }

    let where_clause = if conditions.is_empty() {
        "".to_string()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) AS total FROM users {}", where_clause);
    debug!(sql = %count_sql, bindings = ?bindings, "Counting users");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &bindings {
        count_query = count_query.bind(b);
    }

    let total = count_query.fetch_one(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %count_sql, "Failed to count users");
        ErrorInternalServerError("Database error")
    })?;

    let data_sql = format!(
        "SELECT {} FROM users {} ORDER BY id LIMIT ? OFFSET ?",
        USER_COLUMNS, where_clause
    );

    let mut data_query = sqlx::query_as::<_, User>(&data_sql);
    for b in &bindings {
        data_query = data_query.bind(b);
    }
    data_query = data_query.bind(per_page as i64).bind(offset as i64);

    let users = data_query.fetch_all(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %data_sql, "Failed to fetch users");
        ErrorInternalServerError("Database error")
    })?;

    Ok(HttpResponse::Ok().json(UserListResponse {
        data: users,
        page,
        per_page,
        total,
    }))
}

/// Get User by ID
#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id", Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = User),
        (status = 403, description = "Missing user:read"),
        (status = 404, description = "User not found")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("user:read")?;
    let user_id = path.into_inner();

    let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(user_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, user_id, "Failed to fetch user");
            ErrorInternalServerError("Internal Server Error")
        })?;

    match user {
        Some(user) => Ok(HttpResponse::Ok().json(user)),
        None => Ok(HttpResponse::NotFound().json(json!({
            "message": "User not found"
        }))),
    }
}

/// Update User
///
/// Changes name, role or active flag. Deactivating an account revokes its
/// refresh tokens.
#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    params(("user_id", Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = Object, example = json!({
            "message": "User updated successfully"
        })),
        (status = 400, description = "Empty payload, unknown role or change to own role/status"),
        (status = 403, description = "Missing user:update"),
        (status = 404, description = "User not found")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateUser>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("user:update")?;
    let user_id = path.into_inner();
    let mut update = body.into_inner();
    update.full_name = update.full_name.map(|n| n.trim().to_string());

    if let Err(message) = check_update(&auth, user_id, &update) {
        return Ok(HttpResponse::BadRequest().json(json!({ "message": message })));
    }

    let payload = serde_json::to_value(&update).map_err(ErrorInternalServerError)?;
    let sql = build_update_sql("users", &payload, UPDATABLE_COLUMNS, "id", user_id)?;

    let affected = execute_update(pool.get_ref(), sql).await.map_err(|e| {
        error!(error = %e, user_id, "Failed to update user");
        ErrorInternalServerError("Internal Server Error")
    })?;

    // MySQL reports 0 for an unchanged row as well
    if affected == 0 && !user_exists(pool.get_ref(), user_id).await? {
        return Ok(HttpResponse::NotFound().json(json!({
            "message": "User not found"
        })));
    }

    if update.is_active == Some(false) {
        let revoked = revoke_refresh_tokens(pool.get_ref(), user_id)
            .await
            .map_err(|e| {
                error!(error = %e, user_id, "Failed to revoke refresh tokens");
                ErrorInternalServerError("Internal Server Error")
            })?;
        debug!(user_id, revoked, "Refresh tokens revoked");
    }

    info!(user_id, admin_id = auth.user_id, "User updated");
    Ok(HttpResponse::Ok().json(json!({
        "message": "User updated successfully"
    })))
}

/// Deactivate User
///
/// Accounts are never removed, since attendance history refers to them.
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    params(("user_id", Path, description = "User ID")),
    responses(
        (status = 200, description = "User deactivated", body = Object, example = json!({
            "message": "User deactivated successfully"
        })),
        (status = 400, description = "Cannot deactivate yourself"),
        (status = 403, description = "Missing user:delete"),
        (status = 404, description = "User not found")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn deactivate_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_permission("user:delete")?;
    let user_id = path.into_inner();

    if user_id == auth.user_id {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Cannot deactivate yourself"
        })));
    }

    let result = sqlx::query("UPDATE users SET is_active = FALSE WHERE id = ?")
        .bind(user_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, user_id, "Failed to deactivate user");
            ErrorInternalServerError("Internal Server Error")
        })?;

    if result.rows_affected() == 0 && !user_exists(pool.get_ref(), user_id).await? {
        return Ok(HttpResponse::NotFound().json(json!({
            "message": "User not found"
        })));
    }

    let revoked = revoke_refresh_tokens(pool.get_ref(), user_id)
        .await
        .map_err(|e| {
            error!(error = %e, user_id, "Failed to revoke refresh tokens");
            ErrorInternalServerError("Internal Server Error")
        })?;

    info!(user_id, revoked, admin_id = auth.user_id, "User deactivated");
    Ok(HttpResponse::Ok().json(json!({
        "message": "User deactivated successfully"
    })))
}
