//! Embedding vector repository implementation.
//!
//! Nearest-neighbour search is delegated to pgvector: `<=>` (cosine
//! distance), `<->` (L2 distance) and `<#>` (negated inner product). Only
//! the latest row per owner and content type takes part in a search.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use tailor_core::{
    DistanceMethod, EmbeddingRepository, EmbeddingVector, Error, RankedCandidate, Result, Vector,
};

/// pgvector HNSW indexes cover at most this many dimensions.
const HNSW_MAX_DIMENSION: usize = 2000;

/// PostgreSQL implementation of EmbeddingRepository.
#[derive(Clone)]
pub struct PgEmbeddingRepository {
    pool: PgPool,
}

impl PgEmbeddingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_embedding(row: &sqlx::postgres::PgRow) -> EmbeddingVector {
    EmbeddingVector {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        content_type: row.get("content_type"),
        content_hash: row.get("content_hash"),
        model_id: row.get("model_id"),
        vector: row.get("vector"),
        created_at: row.get("created_at"),
    }
}

/// SQL for a nearest-neighbour query.
///
/// Queries small enough for the HNSW index cast the column to a typed vector
/// so the expression index can serve the ordering.
fn nearest_sql(method: DistanceMethod, dimension: usize) -> String {
    let column = if dimension <= HNSW_MAX_DIMENSION {
        format!("e.vector::vector({})", dimension)
    } else {
        "e.vector".to_string()
    };
    let op = method.pgvector_operator();
    let score = match method {
        // <#> yields the negated inner product.
        DistanceMethod::InnerProduct => format!("-({} {} $1)", column, op),
        DistanceMethod::Cosine | DistanceMethod::L2 => format!("{} {} $1", column, op),
    };

    format!(
        "SELECT e.owner_id, ({score})::float4 AS score
         FROM embedding_vector e
         WHERE e.content_type = $2
           AND e.model_id = $3
           AND vector_dims(e.vector) = {dimension}
           AND NOT EXISTS (
               SELECT 1 FROM embedding_vector newer
               WHERE newer.owner_id = e.owner_id
                 AND newer.content_type = e.content_type
                 AND (newer.created_at, newer.id) > (e.created_at, e.id)
           )
         ORDER BY {column} {op} $1, e.created_at, e.id
         LIMIT $4",
    )
}

#[async_trait]
impl EmbeddingRepository for PgEmbeddingRepository {
    async fn find_by_hash(
        &self,
        owner_id: Uuid,
        content_type: &str,
        content_hash: &str,
        model_id: &str,
    ) -> Result<Option<EmbeddingVector>> {
        let row = sqlx::query(
            "SELECT id, owner_id, content_type, content_hash, model_id, vector, created_at
             FROM embedding_vector
             WHERE owner_id = $1 AND content_type = $2 AND content_hash = $3 AND model_id = $4
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(owner_id)
        .bind(content_type)
        .bind(content_hash)
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(row_to_embedding))
    }

    async fn insert(&self, embedding: &EmbeddingVector) -> Result<()> {
        sqlx::query(
            "INSERT INTO embedding_vector
                (id, owner_id, content_type, content_hash, model_id, vector, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(embedding.id)
        .bind(embedding.owner_id)
        .bind(&embedding.content_type)
        .bind(&embedding.content_hash)
        .bind(&embedding.model_id)
        .bind(&embedding.vector)
        .bind(embedding.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn latest_for_owner(
        &self,
        owner_id: Uuid,
        content_type: &str,
    ) -> Result<Option<EmbeddingVector>> {
        let row = sqlx::query(
            "SELECT id, owner_id, content_type, content_hash, model_id, vector, created_at
             FROM embedding_vector
             WHERE owner_id = $1 AND content_type = $2
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(owner_id)
        .bind(content_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(row_to_embedding))
    }

    async fn nearest(
        &self,
        query: &Vector,
        content_type: &str,
        model_id: &str,
        method: DistanceMethod,
        limit: usize,
        ef_search: Option<i32>,
    ) -> Result<Vec<RankedCandidate<Uuid>>> {
        let dimension = query.as_slice().len();
        if dimension == 0 || limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = nearest_sql(method, dimension);

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        if let Some(ef) = ef_search {
            // SET does not accept bind parameters; ef is an integer.
            sqlx::query(&format!("SET LOCAL hnsw.ef_search = {}", ef.max(1)))
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }

        let rows = sqlx::query(&sql)
            .bind(query)
            .bind(content_type)
            .bind(model_id)
            .bind(limit)
            .fetch_all(&mut *tx)
            .await
            .map_err(Error::Database)?;
        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            op = "nearest",
            model = model_id,
            method = ?method,
            ef_search,
            result_count = rows.len(),
            "Nearest-neighbour query finished"
        );

        Ok(rows
            .iter()
            .map(|row| RankedCandidate {
                id: row.get("owner_id"),
                score: row.get("score"),
            })
            .collect())
    }

    async fn prune_superseded(&self, owner_id: Uuid, content_type: &str) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM embedding_vector e
             WHERE e.owner_id = $1 AND e.content_type = $2
               AND EXISTS (
                   SELECT 1 FROM embedding_vector newer
                   WHERE newer.owner_id = e.owner_id
                     AND newer.content_type = e.content_type
                     AND (newer.created_at, newer.id) > (e.created_at, e.id)
               )",
        )
        .bind(owner_id)
        .bind(content_type)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
