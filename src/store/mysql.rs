use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

use super::{AttendanceStore, EventGateStore, StoreError, UserDirectory};
use crate::model::attendance::{AttendanceRecord, ScanKind};
use crate::model::event::GatedEvent;
use crate::model::user::UserProfile;

const RECORD_COLUMNS: &str = r#"
    id, event_id, user_id, checked_in_at, checked_out_at,
    check_in_confirmed, check_out_confirmed, notes, created_at
"#;

fn gate_flag_column(kind: ScanKind) -> &'static str {
    match kind {
        ScanKind::CheckIn => "check_in_open",
        ScanKind::CheckOut => "check_out_open",
    }
}

fn gate_code_column(kind: ScanKind) -> &'static str {
    match kind {
        ScanKind::CheckIn => "check_in_code",
        ScanKind::CheckOut => "check_out_code",
    }
}

/// sqlx-backed implementation of every storage port.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn event_exists(&self, event_id: u64) -> Result<bool, StoreError> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM events WHERE id = ? LIMIT 1)",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found > 0)
    }

    async fn record_by_id(&self, id: u64) -> Result<AttendanceRecord, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM attendances WHERE id = ?");
        let record = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(record)
    }
}

#[async_trait]
impl EventGateStore for MySqlStore {
    async fn find_event(&self, event_id: u64) -> Result<Option<GatedEvent>, StoreError> {
        let event = sqlx::query_as::<_, GatedEvent>(
            r#"
            SELECT id, title, check_in_open, check_out_open, check_in_code, check_out_code
            FROM events
            WHERE id = ?
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn set_gate_open(
        &self,
        event_id: u64,
        kind: ScanKind,
        open: bool,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE events SET {} = ? WHERE id = ?",
            gate_flag_column(kind)
        );
        let result = sqlx::query(&sql)
            .bind(open)
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        // MySQL reports changed rows, so a no-op toggle looks like a miss.
        if result.rows_affected() == 0 {
            return self.event_exists(event_id).await;
        }
        Ok(true)
    }

    async fn ensure_code(
        &self,
        event_id: u64,
        kind: ScanKind,
        candidate: &str,
    ) -> Result<Option<String>, StoreError> {
        let column = gate_code_column(kind);

        let update = format!("UPDATE events SET {column} = COALESCE({column}, ?) WHERE id = ?");
        sqlx::query(&update)
            .bind(candidate)
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        let select = format!("SELECT {column} FROM events WHERE id = ?");
        let code = sqlx::query_scalar::<_, Option<String>>(&select)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(code.flatten())
    }

    async fn replace_code(
        &self,
        event_id: u64,
        kind: ScanKind,
        code: &str,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE events SET {} = ? WHERE id = ?",
            gate_code_column(kind)
        );
        let result = sqlx::query(&sql)
            .bind(code)
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return self.event_exists(event_id).await;
        }
        Ok(true)
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn find(
        &self,
        event_id: u64,
        attendee_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendances WHERE event_id = ? AND user_id = ?"
        );
        let record = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(event_id)
            .bind(attendee_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn create_checked_in(
        &self,
        event_id: u64,
        attendee_id: u64,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendances (event_id, user_id, checked_in_at, check_in_confirmed)
            VALUES (?, ?, ?, TRUE)
            "#,
        )
        .bind(event_id)
        .bind(attendee_id)
        .bind(at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => self.record_by_id(done.last_insert_id()).await,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Conflict(format!(
                    "attendance for event {event_id} and user {attendee_id} already exists"
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn mark_checked_out(
        &self,
        record: &AttendanceRecord,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendances
            SET checked_out_at = ?, check_out_confirmed = TRUE
            WHERE id = ?
            AND check_out_confirmed = FALSE
            "#,
        )
        .bind(at)
        .bind(record.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "attendance {} is already checked out",
                record.id
            )));
        }

        self.record_by_id(record.id).await
    }

    async fn list_for_event(&self, event_id: u64) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM attendances WHERE event_id = ? ORDER BY id");
        let records = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn list_for_attendee(
        &self,
        attendee_id: u64,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM attendances WHERE user_id = ? ORDER BY id");
        let records = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(attendee_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}

#[async_trait]
impl UserDirectory for MySqlStore {
    async fn find_user(&self, user_id: u64) -> Result<Option<UserProfile>, StoreError> {
        let user = sqlx::query_as::<_, UserProfile>(
            "SELECT id, email, full_name FROM users WHERE id = ? AND is_active = TRUE",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
