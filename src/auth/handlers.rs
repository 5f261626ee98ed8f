use crate::{
    auth::{
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    model::role::Role,
    models::{Claims, LoginReqDto, RegisterReq, TokenPair, TokenType, UserSql},
    utils::email_registry,
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

/// Inserts a new user and records the address in the email registry.
async fn insert_user(
    email: &str,
    password: &str,
    full_name: Option<&str>,
    pool: &MySqlPool,
) -> Result<(), HttpResponse> {
    let hashed = hash_password(password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        HttpResponse::InternalServerError().json(json!({
            "error": "Failed to register user"
        }))
    })?;

    let result = sqlx::query(
        r#"INSERT INTO users (email, password, full_name, role_id) VALUES (?, ?, ?, ?)"#,
    )
    .bind(email)
    .bind(hashed)
    .bind(full_name)
    .bind(Role::DEFAULT.id())
    .execute(pool)
    .await;

    match result {
        Ok(_) => {
            email_registry::mark_taken(email).await;
            Ok(())
        }
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return Err(HttpResponse::Conflict().json(json!({
                        "error": "Email already registered"
                    })));
                }
            }

            error!(error = %e, "Failed to insert user");
            Err(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to register user"
            })))
        }
    }
}

/// true  => email AVAILABLE
/// false => email TAKEN
pub async fn is_email_available(email: &str, pool: &MySqlPool) -> bool {
    let email = email_registry::normalize(email);

    // cuckoo filter: fast negative
    if !email_registry::might_exist(&email) {
        return true;
    }

    // moka cache: fast positive
    if email_registry::is_taken(&email).await {
        return false;
    }

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1)",
    )
    .bind(&email)
    .fetch_one(pool)
    .await
    .map(|found| found > 0)
    .unwrap_or(true); // fail-safe

    !exists
}

/// Register a new account with the default `user` role
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "User registered", body = Object, example = json!({
            "message": "User registered successfully"
        })),
        (status = 400, description = "Missing email or password"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(user, pool), fields(email = %user.email))]
pub async fn register(user: web::Json<RegisterReq>, pool: web::Data<MySqlPool>) -> impl Responder {
    let email = email_registry::normalize(&user.email);
    let password = &user.password;
    let full_name = user
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    if email.is_empty() || !email.contains('@') || password.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "A valid email and a password are required"
        }));
    }

    if !is_email_available(&email, pool.get_ref()).await {
        return HttpResponse::Conflict().json(json!({
            "error": "Email already registered"
        }));
    }

    match insert_user(&email, password, full_name, pool.get_ref()).await {
        Ok(_) => {
            info!("User registered");
            HttpResponse::Created().json(json!({
                "message": "User registered successfully"
            }))
        }
        Err(err_resp) => err_resp,
    }
}

async fn store_refresh_token(pool: &MySqlPool, claims: &Claims) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(claims.user_id)
    .bind(&claims.jti)
    .bind(claims.exp as i64)
    .execute(pool)
    .await
    .map(|_| ())
}

fn issue_pair(
    user_id: u64,
    email: &str,
    role_id: u8,
    config: &Config,
) -> Result<(TokenPair, Claims), jsonwebtoken::errors::Error> {
    let access_token = generate_access_token(
        user_id,
        email,
        role_id,
        &config.jwt_secret,
        config.access_token_ttl,
    )?;
    let (refresh_token, refresh_claims) = generate_refresh_token(
        user_id,
        email,
        role_id,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )?;
    Ok((
        TokenPair {
            access_token,
            refresh_token,
        },
        refresh_claims,
    ))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Access and refresh tokens", body = TokenPair),
        (status = 400, description = "Missing email or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    info!("Login request received");

    if user.email.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return HttpResponse::BadRequest().body("Email or password required");
    }

    let email = email_registry::normalize(&user.email);
    debug!("Fetching user from database");

    let db_user = match sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, email, password, role_id, is_active
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await
    {
        Ok(Some(user)) => {
            debug!(user_id = user.id, "User found");
            user
        }
        Ok(None) => {
            info!("Invalid credentials: user not found");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    if !db_user.is_active {
        info!(user_id = db_user.id, "Login refused: account disabled");
        return HttpResponse::Unauthorized().body("Account disabled");
    }

    let (pair, refresh_claims) = match issue_pair(db_user.id, &db_user.email, db_user.role_id, &config)
    {
        Ok(issued) => issued,
        Err(e) => {
            error!(error = %e, "Failed to sign tokens");
            return HttpResponse::InternalServerError().finish();
        }
    };

    debug!(user_id = db_user.id, jti = %refresh_claims.jti, "Storing refresh token");

    if let Err(e) = store_refresh_token(pool.get_ref(), &refresh_claims).await {
        error!(error = %e, "Failed to store refresh token");
        return HttpResponse::InternalServerError().finish();
    }

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!("Login successful");

    HttpResponse::Ok().json(pair)
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Rotated token pair", body = TokenPair),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let token = match bearer(&req) {
        Some(t) => t,
        None => return HttpResponse::Unauthorized().body("No token"),
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return HttpResponse::Unauthorized().finish(),
    };

    if claims.token_type != TokenType::Refresh {
        return HttpResponse::Unauthorized().finish();
    }

    // single-use: revoking only succeeds for a live token
    let revoked = sqlx::query(
        "UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ? AND revoked = FALSE",
    )
    .bind(&claims.jti)
    .execute(pool.get_ref())
    .await;

    match revoked {
        Ok(res) if res.rows_affected() == 1 => {}
        Ok(_) => return HttpResponse::Unauthorized().finish(),
        Err(e) => {
            error!(error = %e, "Failed to revoke refresh token");
            return HttpResponse::InternalServerError().finish();
        }
    }

    // role and active flag may have changed since the token was issued
    let db_user = match sqlx::query_as::<_, UserSql>(
        "SELECT id, email, password, role_id, is_active FROM users WHERE id = ?",
    )
    .bind(claims.user_id)
    .fetch_optional(pool.get_ref())
    .await
    {
        Ok(Some(user)) if user.is_active => user,
        Ok(_) => return HttpResponse::Unauthorized().finish(),
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let (pair, new_claims) = match issue_pair(db_user.id, &db_user.email, db_user.role_id, &config)
    {
        Ok(issued) => issued,
        Err(e) => {
            error!(error = %e, "Failed to sign tokens");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if let Err(e) = store_refresh_token(pool.get_ref(), &new_claims).await {
        error!(error = %e, "Failed to store refresh token");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok().json(pair)
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logged out (idempotent)")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let token = match bearer(&req) {
        Some(t) => t,
        None => return HttpResponse::NoContent().finish(),
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return HttpResponse::NoContent().finish(),
    };

    // only refresh tokens can logout
    if claims.token_type != TokenType::Refresh {
        return HttpResponse::NoContent().finish();
    }

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    // success even if the token didn't exist
    HttpResponse::NoContent().finish()
}
