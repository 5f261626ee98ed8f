use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};

/// Connection options with the session pinned to UTC, so `CURRENT_TIMESTAMP`
/// defaults decode correctly as `DateTime<Utc>`.
fn connect_options(database_url: &str) -> Result<MySqlConnectOptions> {
    let options = MySqlConnectOptions::from_str(database_url).context("Invalid DATABASE_URL")?;
    Ok(options.timezone(Some("+00:00".to_string())))
}

pub async fn init_db(database_url: &str) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .connect_with(connect_options(database_url)?)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(pool)
}
