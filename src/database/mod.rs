pub mod filters;
pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::Duration as TokenTtl;
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use filters::{Filters, Metadata};
use models::{Movie, Permissions, Scope, Token, User};

pub use manager::DatabaseManager;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Deadline applied to every individual store operation
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors surfaced by store implementations
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("record not found")]
    NotFound,

    #[error("edit conflict")]
    EditConflict,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("store operation exceeded {0:?} deadline")]
    Timeout(Duration),

    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Runs a store operation under `QUERY_TIMEOUT`.
pub async fn with_deadline<T, F>(operation: F) -> Result<T, DatabaseError>
where
    F: Future<Output = Result<T, DatabaseError>>,
{
    with_timeout(QUERY_TIMEOUT, operation).await
}

pub async fn with_timeout<T, F>(limit: Duration, operation: F) -> Result<T, DatabaseError>
where
    F: Future<Output = Result<T, DatabaseError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(DatabaseError::Timeout(limit)),
    }
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Persists a draft and returns it with id, created_at and version = 1.
    async fn insert(&self, movie: &Movie) -> Result<Movie, DatabaseError>;

    async fn get(&self, id: i64) -> Result<Movie, DatabaseError>;

    /// Writes `movie` only if the stored version still equals `movie.version`,
    /// returning the stored row with the incremented version. A missing row
    /// and a stale version both report `EditConflict`.
    async fn update(&self, movie: &Movie) -> Result<Movie, DatabaseError>;

    async fn delete(&self, id: i64) -> Result<(), DatabaseError>;

    async fn get_all(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), DatabaseError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `DuplicateEmail` when the address is taken.
    async fn insert(&self, user: &User) -> Result<User, DatabaseError>;

    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError>;

    /// Same version precondition as `MovieStore::update`.
    async fn update(&self, user: &User) -> Result<User, DatabaseError>;

    /// Resolves an unexpired token of `scope` to its owner.
    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, DatabaseError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn new_token(&self, user_id: i64, ttl: TokenTtl, scope: Scope) -> Result<Token, DatabaseError> {
        let token = Token::generate(user_id, ttl, scope);
        self.insert(&token).await?;
        Ok(token)
    }

    async fn insert(&self, token: &Token) -> Result<(), DatabaseError>;

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, DatabaseError>;

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), DatabaseError>;
}

/// Store handles shared by every request
#[derive(Clone)]
pub struct Models {
    pub movies: Arc<dyn MovieStore>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
}

impl Models {
    pub fn postgres(pool: PgPool) -> Self {
        Self::from_store(Arc::new(PgStore::new(pool)))
    }

    pub fn memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }

    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: MovieStore + UserStore + TokenStore + PermissionStore + 'static,
    {
        Self {
            movies: store.clone(),
            users: store.clone(),
            tokens: store.clone(),
            permissions: store,
        }
    }
}
