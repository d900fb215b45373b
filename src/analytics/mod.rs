/// App-open analytics
///
/// Records one row per app-open beacon and reports simple counts.
use crate::{error::CmsResult, metrics};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Longest accepted platform label
const MAX_PLATFORM_LEN: usize = 32;

/// One recorded app open
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppOpenEvent {
    pub id: Uuid,
    pub platform: String,
    pub opened_at: DateTime<Utc>,
}

/// Count of opens for one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformCount {
    pub platform: String,
    pub count: i64,
}

/// Aggregate app-open counts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppOpenSummary {
    pub total: i64,
    pub last_24_hours: i64,
    pub unique_clients: i64,
    pub by_platform: Vec<PlatformCount>,
}

/// Normalize a client-supplied platform label
pub fn normalize_platform(platform: Option<&str>) -> String {
    let platform = platform.unwrap_or_default().trim().to_ascii_lowercase();
    let valid = !platform.is_empty()
        && platform.len() <= MAX_PLATFORM_LEN
        && platform
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        platform
    } else {
        "unknown".to_string()
    }
}

/// App-open analytics store
#[derive(Clone)]
pub struct AnalyticsStore {
    db: SqlitePool,
}

impl AnalyticsStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record an app open
    pub async fn record_app_open(
        &self,
        platform: Option<&str>,
        client_key: &str,
    ) -> CmsResult<AppOpenEvent> {
        let event = AppOpenEvent {
            id: Uuid::new_v4(),
            platform: normalize_platform(platform),
            opened_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO app_open (id, platform, client_key, opened_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(event.id.to_string())
        .bind(&event.platform)
        .bind(client_key)
        .bind(event.opened_at)
        .execute(&self.db)
        .await?;

        metrics::record_app_open(&event.platform);
        tracing::debug!(platform = %event.platform, "Recorded app open");

        Ok(event)
    }

    /// Aggregate counts as of `now`
    pub async fn summary(&self, now: DateTime<Utc>) -> CmsResult<AppOpenSummary> {
        let since = now - Duration::hours(24);

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN opened_at >= ?1 THEN 1 ELSE 0 END), 0) AS recent,
                COUNT(DISTINCT client_key) AS clients
            FROM app_open
            "#,
        )
        .bind(since)
        .fetch_one(&self.db)
        .await?;

        let by_platform = sqlx::query(
            r#"
            SELECT platform, COUNT(*) AS count
            FROM app_open
            GROUP BY platform
            ORDER BY count DESC, platform ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|row| {
            Ok(PlatformCount {
                platform: row.try_get("platform")?,
                count: row.try_get("count")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(AppOpenSummary {
            total: row.try_get("total")?,
            last_24_hours: row.try_get("recent")?,
            unique_clients: row.try_get("clients")?,
            by_platform,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_normalize_platform() {
        assert_eq!(normalize_platform(Some(" Android ")), "android");
        assert_eq!(normalize_platform(Some("ios")), "ios");
        assert_eq!(normalize_platform(Some("<script>")), "unknown");
        assert_eq!(normalize_platform(Some(&"x".repeat(40))), "unknown");
        assert_eq!(normalize_platform(None), "unknown");
    }

    #[tokio::test]
    async fn test_record_and_summarize() {
        let dir = tempfile::tempdir().unwrap();
        let store = AnalyticsStore::new(db::test_pool(dir.path()).await);

        store.record_app_open(Some("android"), "10.0.0.1").await.unwrap();
        store.record_app_open(Some("android"), "10.0.0.2").await.unwrap();
        store.record_app_open(Some("ios"), "10.0.0.1").await.unwrap();

        let summary = store.summary(Utc::now()).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.last_24_hours, 3);
        assert_eq!(summary.unique_clients, 2);
        assert_eq!(
            summary.by_platform,
            vec![
                PlatformCount { platform: "android".to_string(), count: 2 },
                PlatformCount { platform: "ios".to_string(), count: 1 },
            ]
        );

        let later = store.summary(Utc::now() + Duration::days(2)).await.unwrap();
        assert_eq!(later.total, 3);
        assert_eq!(later.last_24_hours, 0);
    }

    #[tokio::test]
    async fn test_empty_summary() {
        let dir = tempfile::tempdir().unwrap();
        let store = AnalyticsStore::new(db::test_pool(dir.path()).await);

        let summary = store.summary(Utc::now()).await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.last_24_hours, 0);
        assert!(summary.by_platform.is_empty());
    }
}
