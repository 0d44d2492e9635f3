//! # tailor-search
//!
//! Similarity ranking for CV tailoring: which artifacts best match a job
//! description.
//!
//! This crate provides:
//! - Cosine, L2, and inner-product ranking of in-memory candidates
//! - HNSW `ef_search` tuning from a recall target and corpus size
//! - An indexer that embeds content once per content hash and serves
//!   nearest-neighbour queries through an [`EmbeddingRepository`]
//!
//! ## Example
//!
//! ```ignore
//! use tailor_search::{EmbeddingIndexer, EmbeddingUseCase, SearchOptions};
//!
//! let indexer = EmbeddingIndexer::new(invoker, embeddings);
//! indexer
//!     .ensure_embedding(job_id, "job_description", &job_text, EmbeddingUseCase::ComplexMatching)
//!     .await?;
//! let matches = indexer
//!     .match_owner(job_id, "job_description", "artifact", SearchOptions::default())
//!     .await?;
//! ```

pub mod hnsw_tuning;
pub mod indexer;
pub mod ranker;

// Re-export core types
pub use tailor_core::*;

pub use hnsw_tuning::{compute_ef, RecallTarget};
pub use indexer::{EmbeddingIndexer, IndexOutcome, SearchOptions};
pub use ranker::{cosine_distance, inner_product, l2_distance, rank_candidates, score};
