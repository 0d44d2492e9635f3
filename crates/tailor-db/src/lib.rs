//! # tailor-db
//!
//! PostgreSQL persistence for tailor model routing.
//!
//! This crate provides:
//! - Connection pool management
//! - The append-only invocation record store
//! - Embedding storage with pgvector nearest-neighbour search
//! - In-memory implementations of both repositories
//!
//! ## Example
//!
//! ```rust,ignore
//! use tailor_db::{Database, InvocationRepository, InvocationRecord, TaskType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/tailor").await?;
//!     db.migrate().await?;
//!
//!     db.invocations
//!         .insert(&InvocationRecord::success("gpt-4o-mini", TaskType::JobParsing, 140, 900, 120, 0.0002))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod embeddings;
pub mod invocations;
pub mod memory;
pub mod pool;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use tailor_core::*;

pub use embeddings::PgEmbeddingRepository;
pub use invocations::PgInvocationRepository;
pub use memory::{MemoryEmbeddingRepository, MemoryInvocationRepository};
pub use pool::{create_pool, log_pool_metrics, PoolConfig};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Append-only invocation records.
    pub invocations: PgInvocationRepository,
    /// Embedding vector storage.
    pub embeddings: PgEmbeddingRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            invocations: PgInvocationRepository::new(pool.clone()),
            embeddings: PgEmbeddingRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool(url, &config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
