//! # tidy-db
//!
//! Storage layer for tidy.
//!
//! This crate provides:
//! - Connection pool setup ([`PoolConfig`])
//! - [`PgDocumentStore`]: PostgreSQL-backed document hierarchy
//! - [`PgHistoryStore`]: change history kept in the user profile metadata
//! - [`MemoryStore`]: in-process store for tests and embedded use
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidy_db::{Database, DocumentStore, NewDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/tidy").await?;
//!     let id = db.documents.create(NewDocument::container("Work", None)).await?;
//!     println!("Created container: {}", id);
//!     Ok(())
//! }
//! ```
pub mod documents;
pub mod memory;
pub mod pool;
pub mod profiles;

// Always compiled so integration tests in tests/ can reach it.
pub mod test_fixtures;

pub use tidy_core::*;

pub use documents::PgDocumentStore;
pub use memory::MemoryStore;
pub use pool::{open_pool, PoolConfig};
pub use profiles::PgHistoryStore;

/// Combined database context.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Document hierarchy store.
    pub documents: PgDocumentStore,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            documents: PgDocumentStore::new(pool.clone()),
            pool,
        }
    }

    /// Connect to `url` with pool settings from [`PoolConfig::from_env`].
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = open_pool(url, PoolConfig::from_env()).await?;
        Ok(Self::new(pool))
    }

    /// History store for one user profile.
    pub fn history_for(&self, profile_id: uuid::Uuid, capacity: usize) -> PgHistoryStore {
        PgHistoryStore::new(self.pool.clone(), profile_id, capacity)
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
