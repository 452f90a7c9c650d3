use sqlx::{Row, sqlite::SqliteRow};

use super::{StoreError, SyncStore};

pub const HISTORY_LAST_SYNC_KEY: &str = "history_last_sync_timestamp";

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItemInput {
    pub item_id: String,
    pub song_id: String,
    pub video_id: String,
    pub title: String,
    pub artist: Option<String>,
    pub played_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItemRecord {
    pub position: i64,
    pub item_id: String,
    pub song_id: String,
    pub video_id: String,
    pub title: String,
    pub artist: Option<String>,
    pub played_at: i64,
}

impl SyncStore {
    pub async fn metadata_value(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row.try_get::<i64, _>("value"))
            .transpose()
            .map_err(StoreError::from)
    }

    pub async fn set_metadata_value(&self, key: &str, value: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_metadata (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn history_items(&self) -> Result<Vec<HistoryItemRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT position, item_id, song_id, video_id, title, artist, played_at FROM history_items ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_history).collect()
    }

    /// Clears history, writes `items` in order and records `synced_at` under
    /// [`HISTORY_LAST_SYNC_KEY`], all or nothing.
    pub async fn replace_history(
        &self,
        items: &[HistoryItemInput],
        synced_at: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM history_items")
            .execute(&mut *tx)
            .await?;
        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO history_items (position, item_id, song_id, video_id, title, artist, played_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(position as i64)
            .bind(&item.item_id)
            .bind(&item.song_id)
            .bind(&item.video_id)
            .bind(&item.title)
            .bind(&item.artist)
            .bind(item.played_at)
            .execute(&mut *tx)
            .await?;
        }
        if let Some(synced_at) = synced_at {
            sqlx::query(
                "INSERT INTO sync_metadata (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(HISTORY_LAST_SYNC_KEY)
            .bind(synced_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn map_history(row: &SqliteRow) -> Result<HistoryItemRecord, StoreError> {
    Ok(HistoryItemRecord {
        position: row.try_get("position")?,
        item_id: row.try_get("item_id")?,
        song_id: row.try_get("song_id")?,
        video_id: row.try_get("video_id")?,
        title: row.try_get("title")?,
        artist: row.try_get("artist")?,
        played_at: row.try_get("played_at")?,
    })
}
