use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use crate::errors::LearningError;
use crate::log_store_operation;
use crate::models::Flashcard;

/// Well-known key the flashcard list is stored under
pub const FLASHCARDS_KEY: &str = "flashcards";

/// Key/value local storage backed by SQLite.
///
/// Values are opaque JSON blobs; a single connection keeps `sqlite::memory:`
/// databases coherent across calls.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, LearningError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), LearningError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<String>, LearningError> {
        let row = sqlx::query("SELECT value FROM local_state WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    pub async fn put_value(&self, key: &str, value: &str) -> Result<(), LearningError> {
        sqlx::query(
            r#"
            INSERT INTO local_state (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load persisted flashcards. Unreadable or corrupt data counts as an empty list.
    pub async fn load_flashcards(&self) -> Vec<Flashcard> {
        let raw = match self.get_value(FLASHCARDS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log_store_operation!(error, "database", "load_flashcards", error = e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Flashcard>>(&raw) {
            Ok(cards) => {
                log_store_operation!(success, "database", "load_flashcards", count = cards.len());
                cards
            }
            Err(e) => {
                log_store_operation!(
                    warn,
                    "database",
                    "load_flashcards",
                    format!("ignoring corrupt '{}' entry: {}", FLASHCARDS_KEY, e)
                );
                Vec::new()
            }
        }
    }

    /// Replace the persisted flashcard list with `cards`
    pub async fn save_flashcards(&self, cards: &[Flashcard]) -> Result<(), LearningError> {
        let json = serde_json::to_string(cards)
            .map_err(|e| LearningError::Validation(format!("flashcards not serializable: {}", e)))?;
        self.put_value(FLASHCARDS_KEY, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_value_upsert() {
        let db = Database::new("sqlite::memory:").await.unwrap();

        assert_eq!(db.get_value("k").await.unwrap(), None);
        db.put_value("k", "1").await.unwrap();
        db.put_value("k", "2").await.unwrap();
        assert_eq!(db.get_value("k").await.unwrap(), Some("2".to_string()));
        assert_eq!(db.get_value("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_flashcards_load_as_empty() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.put_value(FLASHCARDS_KEY, "{not json").await.unwrap();

        assert!(db.load_flashcards().await.is_empty());
    }

    #[tokio::test]
    async fn test_flashcards_round_trip_timestamps() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let card = Flashcard {
            id: Uuid::new_v4(),
            source_document_id: "42".to_string(),
            front: "Mitochondria".to_string(),
            back: "Powerhouse of the cell".to_string(),
            created_at: Utc::now(),
            last_viewed_at: Some(Utc::now()),
        };

        db.save_flashcards(std::slice::from_ref(&card)).await.unwrap();
        let loaded = db.load_flashcards().await;

        assert_eq!(loaded, vec![card]);
    }
}
