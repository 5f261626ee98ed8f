use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct RegisterReq {
    #[schema(example = "jane@example.com", format = "email")]
    pub email: String,
    #[schema(example = "s3cret-pass")]
    pub password: String,
    #[schema(example = "Jane Doe")]
    pub full_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "jane@example.com", format = "email")]
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(FromRow)]
pub struct UserSql {
    pub id: u64, // BIGINT UNSIGNED
    pub email: String,
    pub password: String,
    pub role_id: u8,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    /// Account email
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
