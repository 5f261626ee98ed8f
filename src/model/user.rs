use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct User {
    #[schema(example = 7)]
    pub id: u64,
    #[schema(example = "jane@example.com")]
    pub email: String,
    #[schema(example = "Jane Doe", nullable = true)]
    pub full_name: Option<String>,
    #[schema(example = 3)]
    pub role_id: u8,
    pub is_active: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// What the attendance core needs to know about an attendee.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserProfile {
    pub id: u64,
    pub email: String,
    pub full_name: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.email)
    }
}
