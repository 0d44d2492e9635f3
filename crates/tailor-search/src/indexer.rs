//! Embedding indexing and similarity search.
//!
//! Content is embedded at most once per (owner, content type, content hash,
//! model): unchanged text reuses the stored vector. Searches embed the query
//! and let the repository rank stored vectors, tuning `ef_search` for the
//! requested recall.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use tailor_core::{
    content_hash, defaults, DistanceMethod, EmbeddingRepository, EmbeddingUseCase,
    EmbeddingVector, Error, RankedCandidate, Result, TaskContext, TextEmbedder, Vector,
};

use crate::hnsw_tuning::{compute_ef, RecallTarget};

/// Result of [`EmbeddingIndexer::ensure_embedding`].
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub embedding: EmbeddingVector,
    /// Whether a stored vector was reused instead of calling a model.
    pub reused: bool,
}

/// Options for similarity searches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub method: DistanceMethod,
    pub top_k: usize,
    pub recall: RecallTarget,
    /// Approximate number of stored vectors, used to size `ef_search`.
    pub corpus_size: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            method: DistanceMethod::Cosine,
            top_k: defaults::TOP_K,
            recall: RecallTarget::Balanced,
            corpus_size: 0,
        }
    }
}

impl SearchOptions {
    fn ef_search(&self) -> i32 {
        compute_ef(self.recall, self.corpus_size)
    }
}

/// Stores embeddings and serves similarity queries.
pub struct EmbeddingIndexer {
    embedder: Arc<dyn TextEmbedder>,
    repository: Arc<dyn EmbeddingRepository>,
}

impl EmbeddingIndexer {
    pub fn new(embedder: Arc<dyn TextEmbedder>, repository: Arc<dyn EmbeddingRepository>) -> Self {
        Self {
            embedder,
            repository,
        }
    }

    /// Make sure `text` has a stored embedding for `owner_id`.
    ///
    /// Identical content already embedded by the routed model is reused
    /// without a model call. When the owner's content changed in between
    /// (A, then B, then A again), the stored vector is re-inserted as a new
    /// row so it becomes the owner's latest embedding again.
    pub async fn ensure_embedding(
        &self,
        owner_id: Uuid,
        content_type: &str,
        text: &str,
        use_case: EmbeddingUseCase,
    ) -> Result<IndexOutcome> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("Cannot embed empty content".to_string()));
        }

        let ctx = TaskContext::embedding(use_case).with_input_text(text);
        let hash = content_hash(text);
        let model_id = self.embedder.embedding_model(&ctx)?;

        if let Some(existing) = self.find(owner_id, content_type, &hash, &model_id).await? {
            return Ok(existing);
        }

        let (actual_model, vectors) = self.embedder.embed_texts(&ctx, &[text.to_string()]).await?;
        if actual_model != model_id {
            // A fallback answered; its vector may already be stored.
            if let Some(existing) = self.find(owner_id, content_type, &hash, &actual_model).await? {
                return Ok(existing);
            }
        }
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("Embedder returned no vector".to_string()))?;

        let embedding = EmbeddingVector::new(owner_id, content_type, hash, actual_model, vector);
        self.repository.insert(&embedding).await?;

        info!(
            subsystem = "search",
            op = "index",
            owner_id = %owner_id,
            content_type,
            model = %embedding.model_id,
            dimension = embedding.dimension(),
            "Stored new embedding"
        );
        Ok(IndexOutcome {
            embedding,
            reused: false,
        })
    }

    async fn find(
        &self,
        owner_id: Uuid,
        content_type: &str,
        hash: &str,
        model_id: &str,
    ) -> Result<Option<IndexOutcome>> {
        let Some(found) = self
            .repository
            .find_by_hash(owner_id, content_type, hash, model_id)
            .await?
        else {
            return Ok(None);
        };

        let latest = self
            .repository
            .latest_for_owner(owner_id, content_type)
            .await?;
        if latest.as_ref().map(|l| l.id) == Some(found.id) {
            debug!(
                subsystem = "search",
                op = "index",
                owner_id = %owner_id,
                content_type,
                model = model_id,
                "Content unchanged, reusing stored embedding"
            );
            return Ok(Some(IndexOutcome {
                embedding: found,
                reused: true,
            }));
        }

        let current = EmbeddingVector::new(
            owner_id,
            content_type,
            found.content_hash,
            found.model_id,
            found.vector,
        );
        self.repository.insert(&current).await?;
        debug!(
            subsystem = "search",
            op = "index",
            owner_id = %owner_id,
            content_type,
            model = model_id,
            "Content reverted, re-activated stored embedding"
        );
        Ok(Some(IndexOutcome {
            embedding: current,
            reused: true,
        }))
    }

    /// Owners of `content_type` whose latest embedding is closest to `query`.
    pub async fn search_similar(
        &self,
        query: &str,
        content_type: &str,
        use_case: EmbeddingUseCase,
        options: SearchOptions,
    ) -> Result<Vec<RankedCandidate<Uuid>>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("Search query cannot be empty".to_string()));
        }
        let ctx = TaskContext::embedding(use_case).with_input_text(query);
        let (model_id, vectors) = self.embedder.embed_texts(&ctx, &[query.to_string()]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("Embedder returned no vector".to_string()))?;
        self.nearest(&vector, content_type, &model_id, options).await
    }

    /// Owners of `target_content_type` closest to the latest
    /// `source_content_type` embedding of `source_owner`, e.g. artifacts that
    /// best match a job description.
    pub async fn match_owner(
        &self,
        source_owner: Uuid,
        source_content_type: &str,
        target_content_type: &str,
        options: SearchOptions,
    ) -> Result<Vec<RankedCandidate<Uuid>>> {
        let source = self
            .repository
            .latest_for_owner(source_owner, source_content_type)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "No {} embedding for {}",
                    source_content_type, source_owner
                ))
            })?;
        self.nearest(&source.vector, target_content_type, &source.model_id, options)
            .await
    }

    async fn nearest(
        &self,
        vector: &Vector,
        content_type: &str,
        model_id: &str,
        options: SearchOptions,
    ) -> Result<Vec<RankedCandidate<Uuid>>> {
        let ef_search = options.ef_search();
        let hits = self
            .repository
            .nearest(
                vector,
                content_type,
                model_id,
                options.method,
                options.top_k,
                Some(ef_search),
            )
            .await?;
        debug!(
            subsystem = "search",
            op = "search",
            content_type,
            model = model_id,
            ef_search,
            result_count = hits.len(),
            "Similarity search finished"
        );
        Ok(hits)
    }

    /// Drop embeddings superseded by newer content for `owner_id`.
    pub async fn prune(&self, owner_id: Uuid, content_type: &str) -> Result<u64> {
        self.repository.prune_superseded(owner_id, content_type).await
    }
}
