//! Indexer behaviour against the in-memory embedding store.
//!
//! Vectors come from a keyword embedder so the expected ranking is obvious
//! from the test text.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use tailor_db::MemoryEmbeddingRepository;
use tailor_search::{
    DistanceMethod, EmbeddingIndexer, EmbeddingRepository, EmbeddingUseCase, Error, Result,
    SearchOptions, TaskContext, TextEmbedder, Vector,
};

const KEYWORDS: [&str; 4] = ["rust", "postgres", "design", "sales"];

/// Embeds text as keyword counts over [`KEYWORDS`].
struct KeywordEmbedder {
    routed_model: String,
    answering_model: String,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    fn new(model: &str) -> Self {
        Self::with_fallback(model, model)
    }

    /// Routes to `routed` but answers as `answering`, like a breaker fallback.
    fn with_fallback(routed: &str, answering: &str) -> Self {
        Self {
            routed_model: routed.to_string(),
            answering_model: answering.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn keyword_vector(text: &str) -> Vector {
    let lower = text.to_lowercase();
    Vector::from(
        KEYWORDS
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .collect::<Vec<_>>(),
    )
}

#[async_trait]
impl TextEmbedder for KeywordEmbedder {
    fn embedding_model(&self, _ctx: &TaskContext) -> Result<String> {
        Ok(self.routed_model.clone())
    }

    async fn embed_texts(&self, _ctx: &TaskContext, texts: &[String]) -> Result<(String, Vec<Vector>)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((
            self.answering_model.clone(),
            texts.iter().map(|t| keyword_vector(t)).collect(),
        ))
    }
}

fn indexer(embedder: Arc<KeywordEmbedder>, repo: Arc<MemoryEmbeddingRepository>) -> EmbeddingIndexer {
    EmbeddingIndexer::new(embedder, repo)
}

#[tokio::test]
async fn test_unchanged_content_reuses_embedding() {
    let embedder = Arc::new(KeywordEmbedder::new("text-embedding-3-small"));
    let repo = Arc::new(MemoryEmbeddingRepository::new());
    let indexer = indexer(embedder.clone(), repo.clone());
    let owner = Uuid::now_v7();

    let first = indexer
        .ensure_embedding(owner, "artifact", "Rust services on Postgres", EmbeddingUseCase::General)
        .await
        .unwrap();
    assert!(!first.reused);
    assert_eq!(first.embedding.model_id, "text-embedding-3-small");

    let second = indexer
        .ensure_embedding(owner, "artifact", "Rust services on Postgres", EmbeddingUseCase::General)
        .await
        .unwrap();
    assert!(second.reused);
    assert_eq!(second.embedding.id, first.embedding.id);
    assert_eq!(embedder.calls(), 1);
    assert_eq!(repo.len(), 1);
}

#[tokio::test]
async fn test_reverted_content_becomes_current_again() {
    let embedder = Arc::new(KeywordEmbedder::new("text-embedding-3-small"));
    let repo = Arc::new(MemoryEmbeddingRepository::new());
    let indexer = indexer(embedder.clone(), repo.clone());
    let job = Uuid::now_v7();
    let artifact = Uuid::now_v7();

    indexer
        .ensure_embedding(job, "job_description", "Rust and Postgres", EmbeddingUseCase::General)
        .await
        .unwrap();
    let original = indexer
        .ensure_embedding(artifact, "artifact", "Rust on Postgres", EmbeddingUseCase::General)
        .await
        .unwrap();
    indexer
        .ensure_embedding(artifact, "artifact", "Sales pitch", EmbeddingUseCase::General)
        .await
        .unwrap();
    let reverted = indexer
        .ensure_embedding(artifact, "artifact", "Rust on Postgres", EmbeddingUseCase::General)
        .await
        .unwrap();

    assert!(reverted.reused);
    assert_eq!(embedder.calls(), 3);
    assert_ne!(reverted.embedding.id, original.embedding.id);
    assert_eq!(reverted.embedding.content_hash, original.embedding.content_hash);

    let latest = repo
        .latest_for_owner(artifact, "artifact")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, reverted.embedding.id);

    let hits = indexer
        .match_owner(job, "job_description", "artifact", SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].score.abs() < 1e-6);

    // A further identical call reuses the re-activated row as is.
    let again = indexer
        .ensure_embedding(artifact, "artifact", "Rust on Postgres", EmbeddingUseCase::General)
        .await
        .unwrap();
    assert_eq!(again.embedding.id, reverted.embedding.id);
    assert_eq!(repo.len(), 4);
}

#[tokio::test]
async fn test_changed_content_supersedes_previous() {
    let embedder = Arc::new(KeywordEmbedder::new("text-embedding-3-small"));
    let repo = Arc::new(MemoryEmbeddingRepository::new());
    let indexer = indexer(embedder.clone(), repo.clone());
    let owner = Uuid::now_v7();

    indexer
        .ensure_embedding(owner, "artifact", "Sales lead", EmbeddingUseCase::General)
        .await
        .unwrap();
    let updated = indexer
        .ensure_embedding(owner, "artifact", "Rust lead", EmbeddingUseCase::General)
        .await
        .unwrap();
    assert!(!updated.reused);
    assert_eq!(embedder.calls(), 2);

    let latest = repo.latest_for_owner(owner, "artifact").await.unwrap().unwrap();
    assert_eq!(latest.id, updated.embedding.id);

    assert_eq!(indexer.prune(owner, "artifact").await.unwrap(), 1);
    assert_eq!(repo.len(), 1);
}

#[tokio::test]
async fn test_fallback_model_is_stored_under_its_own_id() {
    let embedder = Arc::new(KeywordEmbedder::with_fallback(
        "text-embedding-3-large",
        "text-embedding-3-small",
    ));
    let repo = Arc::new(MemoryEmbeddingRepository::new());
    let indexer = indexer(embedder, repo);

    let outcome = indexer
        .ensure_embedding(
            Uuid::now_v7(),
            "job_description",
            "Design systems in Rust",
            EmbeddingUseCase::ComplexMatching,
        )
        .await
        .unwrap();
    assert_eq!(outcome.embedding.model_id, "text-embedding-3-small");
}

#[tokio::test]
async fn test_match_owner_ranks_artifacts() {
    let embedder = Arc::new(KeywordEmbedder::new("text-embedding-3-small"));
    let repo = Arc::new(MemoryEmbeddingRepository::new());
    let indexer = indexer(embedder, repo);

    let job = Uuid::now_v7();
    let rust_artifact = Uuid::now_v7();
    let sales_artifact = Uuid::now_v7();
    let mixed_artifact = Uuid::now_v7();

    for (owner, content_type, text) in [
        (job, "job_description", "Rust engineer, Postgres experience"),
        (rust_artifact, "artifact", "Built Rust services backed by Postgres"),
        (sales_artifact, "artifact", "Sales pipeline and sales enablement"),
        (mixed_artifact, "artifact", "Rust tooling and design reviews"),
    ] {
        indexer
            .ensure_embedding(owner, content_type, text, EmbeddingUseCase::General)
            .await
            .unwrap();
    }

    let hits = indexer
        .match_owner(job, "job_description", "artifact", SearchOptions::default())
        .await
        .unwrap();
    let ids: Vec<Uuid> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![rust_artifact, mixed_artifact, sales_artifact]);
    assert!(hits[0].score.abs() < 1e-6);

    let top = indexer
        .match_owner(
            job,
            "job_description",
            "artifact",
            SearchOptions {
                method: DistanceMethod::InnerProduct,
                top_k: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].id, rust_artifact);
}

#[tokio::test]
async fn test_search_similar_embeds_query_without_storing() {
    let embedder = Arc::new(KeywordEmbedder::new("text-embedding-3-small"));
    let repo = Arc::new(MemoryEmbeddingRepository::new());
    let indexer = indexer(embedder.clone(), repo.clone());

    let design = Uuid::now_v7();
    indexer
        .ensure_embedding(design, "artifact", "Design portfolio", EmbeddingUseCase::General)
        .await
        .unwrap();

    let hits = indexer
        .search_similar("design", "artifact", EmbeddingUseCase::General, SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, design);
    assert_eq!(embedder.calls(), 2);
    assert_eq!(repo.len(), 1);
}

#[tokio::test]
async fn test_empty_content_is_rejected() {
    let embedder = Arc::new(KeywordEmbedder::new("text-embedding-3-small"));
    let indexer = indexer(embedder.clone(), Arc::new(MemoryEmbeddingRepository::new()));

    let err = indexer
        .ensure_embedding(Uuid::now_v7(), "artifact", "   ", EmbeddingUseCase::General)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_match_owner_without_source_embedding() {
    let embedder = Arc::new(KeywordEmbedder::new("text-embedding-3-small"));
    let indexer = indexer(embedder, Arc::new(MemoryEmbeddingRepository::new()));

    let err = indexer
        .match_owner(Uuid::now_v7(), "job_description", "artifact", SearchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
