//! Fast email-availability checks for registration.
//!
//! Two in-memory layers sit in front of the `users` table:
//! a cuckoo filter answers "definitely unused" without touching anything
//! else, and a moka cache answers "definitely taken" for recently active
//! accounts. Only the remaining cases reach the database.

use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;

const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static EMAIL_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

static TAKEN_CACHE: Lazy<Cache<String, ()>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(500_000)
        .time_to_live(Duration::from_secs(86400))
        .build()
});

#[inline]
pub fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// False means the address has certainly never been registered.
pub fn might_exist(email: &str) -> bool {
    let email = normalize(email);
    match EMAIL_FILTER.read() {
        Ok(filter) => filter.contains(&email),
        // a poisoned filter cannot rule anything out
        Err(_) => true,
    }
}

pub async fn is_taken(email: &str) -> bool {
    TAKEN_CACHE.contains_key(&normalize(email))
}

/// Records a newly registered address in both layers.
pub async fn mark_taken(email: &str) {
    let email = normalize(email);
    if let Ok(mut filter) = EMAIL_FILTER.write() {
        filter.add(&email);
    }
    TAKEN_CACHE.insert(email, ()).await;
}

fn add_to_filter(emails: &[String]) -> Result<()> {
    let mut filter = EMAIL_FILTER
        .write()
        .map_err(|_| anyhow!("email filter lock poisoned"))?;
    for email in emails {
        filter.add(email);
    }
    Ok(())
}

/// Streams every registered address into the filter, and recently active
/// ones (last `recent_days`) into the cache.
pub async fn warmup(pool: &MySqlPool, recent_days: u32, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT email, COALESCE(last_login_at >= NOW() - INTERVAL ? DAY, FALSE) AS recent
        FROM users
        "#,
    )
    .bind(recent_days)
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;
    let mut cached = 0usize;

    while let Some(row) = stream.next().await {
        let (email, recent) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;
        let email = normalize(&email);
        total += 1;

        if recent > 0 {
            TAKEN_CACHE.insert(email.clone(), ()).await;
            cached += 1;
        }

        batch.push(email);
        if batch.len() == batch_size {
            add_to_filter(&batch)?;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        add_to_filter(&batch)?;
    }

    log::info!(
        "Email registry warmup complete: {} users, {} cached as recent (last {} days)",
        total,
        cached,
        recent_days
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize("  Jane@Example.COM "), "jane@example.com");
    }

    #[actix_web::test]
    async fn marked_addresses_are_seen_by_both_layers() {
        let email = "Registry.Test@Example.com";
        mark_taken(email).await;

        assert!(might_exist("registry.test@example.com"));
        assert!(is_taken(" registry.test@example.com").await);
        assert!(!is_taken("never-registered@example.com").await);
    }
}
