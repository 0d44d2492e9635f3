//! In-memory repositories.
//!
//! Used by tests and by deployments that run without PostgreSQL. They follow
//! the same contracts as the Pg implementations: invocation records are
//! append-only, and similarity queries only see the latest embedding per
//! owner and content type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use tailor_core::{
    DistanceMethod, EmbeddingRepository, EmbeddingVector, Error, InvocationRecord,
    InvocationRepository, PerformanceSummary, RankedCandidate, Result, Vector,
};
use tailor_search::rank_candidates;

/// Invocation records held in a vector.
#[derive(Default)]
pub struct MemoryInvocationRepository {
    records: RwLock<Vec<InvocationRecord>>,
    failing: AtomicBool,
}

impl MemoryInvocationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records in insertion order.
    pub fn records(&self) -> Vec<InvocationRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make subsequent inserts fail, simulating a storage outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl InvocationRepository for MemoryInvocationRepository {
    async fn insert(&self, record: &InvocationRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Internal("invocation store unavailable".to_string()));
        }
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    async fn aggregate(
        &self,
        model_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<PerformanceSummary> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(PerformanceSummary::from_records(
            model_id,
            since,
            until,
            records.iter(),
        ))
    }

    async fn list_recent(&self, model_id: Option<&str>, limit: i64) -> Result<Vec<InvocationRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<InvocationRecord> = records
            .iter()
            .filter(|r| model_id.map_or(true, |m| r.model_id == m))
            .cloned()
            .collect();
        matching.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        matching.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(matching)
    }
}

/// Embedding rows held in a vector, ranked with the in-process ranker.
#[derive(Default)]
pub struct MemoryEmbeddingRepository {
    rows: RwLock<Vec<EmbeddingVector>>,
}

impl MemoryEmbeddingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Latest row per (owner, content type) among `rows`.
fn latest_per_owner<'a>(
    rows: &'a [EmbeddingVector],
    content_type: &'a str,
) -> impl Iterator<Item = &'a EmbeddingVector> + 'a {
    rows.iter().filter(move |row| {
        row.content_type == content_type
            && !rows.iter().any(|newer| {
                newer.owner_id == row.owner_id
                    && newer.content_type == row.content_type
                    && (newer.created_at, newer.id) > (row.created_at, row.id)
            })
    })
}

#[async_trait]
impl EmbeddingRepository for MemoryEmbeddingRepository {
    async fn find_by_hash(
        &self,
        owner_id: Uuid,
        content_type: &str,
        content_hash: &str,
        model_id: &str,
    ) -> Result<Option<EmbeddingVector>> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows
            .iter()
            .filter(|r| {
                r.owner_id == owner_id
                    && r.content_type == content_type
                    && r.content_hash == content_hash
                    && r.model_id == model_id
            })
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn insert(&self, embedding: &EmbeddingVector) -> Result<()> {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(embedding.clone());
        Ok(())
    }

    async fn latest_for_owner(
        &self,
        owner_id: Uuid,
        content_type: &str,
    ) -> Result<Option<EmbeddingVector>> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows
            .iter()
            .filter(|r| r.owner_id == owner_id && r.content_type == content_type)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn nearest(
        &self,
        query: &Vector,
        content_type: &str,
        model_id: &str,
        method: DistanceMethod,
        limit: usize,
        _ef_search: Option<i32>,
    ) -> Result<Vec<RankedCandidate<Uuid>>> {
        let query = query.as_slice();
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let candidates = latest_per_owner(&rows, content_type)
            .filter(|r| r.model_id == model_id && r.dimension() == query.len())
            .map(|r| (r.owner_id, r.vector.as_slice()));
        let ranked = rank_candidates(query, candidates, method, limit)?;

        debug!(
            subsystem = "db",
            op = "nearest",
            model = model_id,
            result_count = ranked.len(),
            "In-memory nearest-neighbour query finished"
        );
        Ok(ranked)
    }

    async fn prune_superseded(&self, owner_id: Uuid, content_type: &str) -> Result<u64> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let latest = rows
            .iter()
            .filter(|r| r.owner_id == owner_id && r.content_type == content_type)
            .max_by_key(|r| (r.created_at, r.id))
            .map(|r| r.id);
        let Some(latest) = latest else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| r.owner_id != owner_id || r.content_type != content_type || r.id == latest);
        Ok((before - rows.len()) as u64)
    }
}
