use actix_web::error::ErrorBadRequest;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::MySqlPool;

/// Value that can be bound to a dynamically built statement.
#[derive(Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Null,
}

#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn to_sql_value(value: &Value) -> Result<SqlValue, actix_web::Error> {
    Ok(match value {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                SqlValue::DateTime(dt.with_timezone(&Utc).naive_utc())
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                SqlValue::DateTime(dt)
            } else {
                SqlValue::String(s.clone())
            }
        }
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => SqlValue::I64(i),
            (None, Some(f)) => SqlValue::F64(f),
            (None, None) => return Err(ErrorBadRequest("Unsupported number")),
        },
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Null => SqlValue::Null,
        _ => return Err(ErrorBadRequest("Unsupported JSON value type")),
    })
}

/// Builds `UPDATE <table> SET ... WHERE <id_column> = ?` from a JSON object.
///
/// Only keys listed in `allowed_columns` may appear in the payload; anything
/// else is rejected so clients cannot touch columns such as gate flags.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed_columns: &[&str],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, actix_web::Error> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ErrorBadRequest("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ErrorBadRequest("No fields provided for update"));
    }

    let mut assignments = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        if !allowed_columns.contains(&key.as_str()) {
            return Err(ErrorBadRequest(format!("Field '{}' cannot be updated", key)));
        }
        assignments.push(format!("{} = ?", key));
        values.push(to_sql_value(value)?);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        assignments.join(", "),
        id_column
    );
    values.push(SqlValue::I64(id_value as i64));

    Ok(SqlUpdate { sql, values })
}

pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}
