//! Invocation record repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use tailor_core::{
    Error, InvocationRecord, InvocationRepository, PerformanceSummary, Result, TaskType,
};

/// PostgreSQL implementation of InvocationRepository.
#[derive(Clone)]
pub struct PgInvocationRepository {
    pool: PgPool,
}

impl PgInvocationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_i64(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::InvalidInput(format!("{} out of range: {}", field, value)))
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<InvocationRecord> {
    let task_type: String = row.get("task_type");
    let task_type: TaskType = task_type.parse().map_err(Error::Serialization)?;
    let latency_ms: i64 = row.get("latency_ms");
    let tokens_in: i64 = row.get("tokens_in");
    let tokens_out: i64 = row.get("tokens_out");

    Ok(InvocationRecord {
        id: row.get("id"),
        model_id: row.get("model_id"),
        task_type,
        latency_ms: latency_ms.max(0) as u64,
        tokens_in: tokens_in.max(0) as u64,
        tokens_out: tokens_out.max(0) as u64,
        cost_usd: row.get("cost_usd"),
        success: row.get("success"),
        quality_score: row.get("quality_score"),
        timestamp: row.get("created_at"),
    })
}

#[async_trait]
impl InvocationRepository for PgInvocationRepository {
    async fn insert(&self, record: &InvocationRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO invocation_record
                (id, model_id, task_type, latency_ms, tokens_in, tokens_out,
                 cost_usd, success, quality_score, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id)
        .bind(&record.model_id)
        .bind(record.task_type.as_str())
        .bind(to_i64(record.latency_ms, "latency_ms")?)
        .bind(to_i64(record.tokens_in, "tokens_in")?)
        .bind(to_i64(record.tokens_out, "tokens_out")?)
        .bind(record.cost_usd)
        .bind(record.success)
        .bind(record.quality_score)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn aggregate(
        &self,
        model_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<PerformanceSummary> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS invocations,
                    COUNT(*) FILTER (WHERE success) AS successes,
                    COALESCE(AVG(latency_ms), 0)::float8 AS avg_latency_ms,
                    COALESCE(SUM(cost_usd), 0)::float8 AS total_cost_usd,
                    AVG(quality_score)::float8 AS avg_quality_score
             FROM invocation_record
             WHERE model_id = $1 AND created_at >= $2 AND created_at <= $3",
        )
        .bind(model_id)
        .bind(since)
        .bind(until)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let invocations: i64 = row.get("invocations");
        let successes: i64 = row.get("successes");
        let invocations = invocations.max(0) as u64;
        let successes = successes.max(0) as u64;

        Ok(PerformanceSummary {
            model_id: model_id.to_string(),
            since,
            until,
            invocations,
            successes,
            success_rate: if invocations > 0 {
                successes as f64 / invocations as f64
            } else {
                0.0
            },
            avg_latency_ms: row.get("avg_latency_ms"),
            total_cost_usd: row.get("total_cost_usd"),
            avg_quality_score: row.get("avg_quality_score"),
        })
    }

    async fn list_recent(&self, model_id: Option<&str>, limit: i64) -> Result<Vec<InvocationRecord>> {
        let rows = sqlx::query(
            "SELECT id, model_id, task_type, latency_ms, tokens_in, tokens_out,
                    cost_usd, success, quality_score, created_at
             FROM invocation_record
             WHERE ($1::text IS NULL OR model_id = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
        )
        .bind(model_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::TestDatabase;
    use chrono::Duration;

    #[test]
    fn test_to_i64_rejects_overflow() {
        assert_eq!(to_i64(42, "tokens_in").unwrap(), 42);
        assert!(matches!(
            to_i64(u64::MAX, "tokens_in"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_insert_and_aggregate() {
        let test_db = TestDatabase::new().await;
        let repo = PgInvocationRepository::new(test_db.pool.clone());
        let model = test_db.unique_name("gpt-4o-mini");

        let now = Utc::now();
        repo.insert(
            &InvocationRecord::success(&model, TaskType::JobParsing, 120, 1000, 200, 0.00027)
                .with_quality(0.9),
        )
        .await
        .unwrap();
        repo.insert(&InvocationRecord::failure(&model, TaskType::JobParsing, 30_000))
            .await
            .unwrap();

        let summary = repo
            .aggregate(&model, now - Duration::minutes(5), now + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(summary.invocations, 2);
        assert_eq!(summary.successes, 1);
        assert!((summary.success_rate - 0.5).abs() < 1e-9);
        assert!((summary.avg_latency_ms - 15_060.0).abs() < 1e-6);
        assert_eq!(summary.avg_quality_score, Some(0.9));

        let recent = repo.list_recent(Some(&model), 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(!recent[0].success);

        test_db.cleanup().await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_records_are_append_only() {
        let test_db = TestDatabase::new().await;
        let repo = PgInvocationRepository::new(test_db.pool.clone());
        let record = InvocationRecord::success(
            test_db.unique_name("gpt-4o"),
            TaskType::CvGeneration,
            800,
            4000,
            1500,
            0.025,
        );
        repo.insert(&record).await.unwrap();

        let result = sqlx::query("UPDATE invocation_record SET success = FALSE WHERE id = $1")
            .bind(record.id)
            .execute(&test_db.pool)
            .await;
        assert!(result.is_err());

        test_db.cleanup().await;
    }
}
