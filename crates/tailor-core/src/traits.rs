//! Core traits for tailor routing abstractions.
//!
//! These traits define the seams between selection logic, provider backends,
//! indexing, and persistence so each can be swapped for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// PROVIDER BACKEND
// =============================================================================

/// A provider that can serve completion and embedding calls.
///
/// Implementations map transport failures to [`crate::Error::ProviderUnavailable`]
/// and credential failures to [`crate::Error::ProviderAuth`].
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// Provider this backend talks to.
    fn provider(&self) -> Provider;

    /// Run a chat completion on `model_id`.
    async fn complete(&self, model_id: &str, request: &CompletionRequest) -> Result<Completion>;

    /// Embed each text with `model_id`, preserving input order.
    async fn embed(&self, model_id: &str, texts: &[String]) -> Result<Embeddings>;

    /// Check that the provider is reachable.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

// =============================================================================
// TEXT EMBEDDER
// =============================================================================

/// Routed embedding generation, as seen by the indexer.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Model that would serve `ctx` right now.
    fn embedding_model(&self, ctx: &TaskContext) -> Result<String>;

    /// Embed `texts` for `ctx`. Returns the model that actually produced the
    /// vectors, which differs from [`TextEmbedder::embedding_model`] when a
    /// fallback answered.
    async fn embed_texts(&self, ctx: &TaskContext, texts: &[String]) -> Result<(String, Vec<Vector>)>;
}

// =============================================================================
// INVOCATION REPOSITORY
// =============================================================================

/// Append-only store of invocation records.
#[async_trait]
pub trait InvocationRepository: Send + Sync {
    /// Persist one record. Records are never updated.
    async fn insert(&self, record: &InvocationRecord) -> Result<()>;

    /// Aggregate the records of `model_id` within `[since, until]`.
    async fn aggregate(
        &self,
        model_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<PerformanceSummary>;

    /// Most recent records, newest first.
    async fn list_recent(&self, model_id: Option<&str>, limit: i64) -> Result<Vec<InvocationRecord>>;
}

// =============================================================================
// EMBEDDING REPOSITORY
// =============================================================================

/// Store of embedding vectors keyed by owner and content type.
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Find an existing embedding for identical content produced by `model_id`.
    async fn find_by_hash(
        &self,
        owner_id: Uuid,
        content_type: &str,
        content_hash: &str,
        model_id: &str,
    ) -> Result<Option<EmbeddingVector>>;

    /// Store a new embedding row.
    async fn insert(&self, embedding: &EmbeddingVector) -> Result<()>;

    /// Latest embedding for an owner and content type.
    async fn latest_for_owner(
        &self,
        owner_id: Uuid,
        content_type: &str,
    ) -> Result<Option<EmbeddingVector>>;

    /// Nearest latest-per-owner embeddings of `content_type` produced by
    /// `model_id`, ordered per `method`.
    ///
    /// `ef_search` tunes the HNSW index when the backend has one.
    async fn nearest(
        &self,
        query: &Vector,
        content_type: &str,
        model_id: &str,
        method: DistanceMethod,
        limit: usize,
        ef_search: Option<i32>,
    ) -> Result<Vec<RankedCandidate<Uuid>>>;

    /// Delete rows superseded by a newer embedding for the same owner and
    /// content type. Returns the number of rows removed.
    async fn prune_superseded(&self, owner_id: Uuid, content_type: &str) -> Result<u64>;
}
