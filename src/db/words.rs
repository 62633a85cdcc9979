//! Read access to the `words` table.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;

/// The slice of a vocabulary word this server cares about.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Word {
    pub id: i64,
    /// Path relative to the audio directory. `None` or empty means the word
    /// has no reference recording.
    pub audio_filename: Option<String>,
}

impl Word {
    /// The stored filename, treating an empty string the same as NULL.
    pub fn audio_filename(&self) -> Option<&str> {
        self.audio_filename.as_deref().filter(|name| !name.is_empty())
    }
}

/// Lookup interface for vocabulary words.
///
/// Implementations must be safe to share between concurrently running
/// requests; each call acquires whatever connection it needs and releases it
/// before returning.
#[async_trait]
pub trait WordStore: Send + Sync {
    /// Fetch a word by id, `Ok(None)` if there is no such row.
    async fn find_word(&self, word_id: i64) -> Result<Option<Word>>;

    /// Cheap liveness probe used by the health endpoint.
    async fn ping(&self) -> Result<()>;
}

/// `WordStore` backed by a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteWordStore {
    pool: SqlitePool,
}

impl SqliteWordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WordStore for SqliteWordStore {
    async fn find_word(&self, word_id: i64) -> Result<Option<Word>> {
        // The pooled connection goes back to the pool when `conn` drops,
        // on the error paths too.
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire database connection")?;

        let word = sqlx::query_as::<_, Word>("SELECT id, audio_filename FROM words WHERE id = ?")
            .bind(word_id)
            .fetch_optional(&mut *conn)
            .await
            .with_context(|| format!("failed to look up word {}", word_id))?;

        Ok(word)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire database connection")?;

        sqlx::query("SELECT 1")
            .execute(&mut *conn)
            .await
            .context("database ping failed")?;

        Ok(())
    }
}

/// In-memory store for handler tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryWordStore {
    words: std::collections::HashMap<i64, Word>,
}

#[cfg(test)]
impl MemoryWordStore {
    pub fn with_word(mut self, id: i64, audio_filename: Option<&str>) -> Self {
        self.words.insert(
            id,
            Word {
                id,
                audio_filename: audio_filename.map(str::to_string),
            },
        );
        self
    }
}

#[cfg(test)]
#[async_trait]
impl WordStore for MemoryWordStore {
    async fn find_word(&self, word_id: i64) -> Result<Option<Word>> {
        Ok(self.words.get(&word_id).cloned())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
