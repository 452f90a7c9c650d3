use sqlx::{Row, sqlite::SqliteRow};

use super::{DownstreamBatch, StoreError, SyncStore, status_column};
use crate::sync::status::{LocalRemoval, SyncStatus};
use crate::sync::timestamp::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeKind {
    Segment,
    Video,
    Channel,
}

impl LikeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikeKind::Segment => "SEGMENT",
            LikeKind::Video => "VIDEO",
            LikeKind::Channel => "CHANNEL",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "SEGMENT" => Ok(LikeKind::Segment),
            "VIDEO" => Ok(LikeKind::Video),
            "CHANNEL" => Ok(LikeKind::Channel),
            other => Err(StoreError::InvalidLikeKind(other.to_string())),
        }
    }
}

/// Payload of a like as the user (or a downstream insert) provides it.
#[derive(Debug, Clone, PartialEq)]
pub struct LikeInput {
    pub item_id: String,
    pub kind: LikeKind,
    pub title: String,
    pub artist: Option<String>,
    pub video_id: Option<String>,
    pub start_secs: Option<i64>,
    pub end_secs: Option<i64>,
    pub art_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LikeRecord {
    pub item_id: String,
    pub server_id: Option<String>,
    pub kind: LikeKind,
    pub title: String,
    pub artist: Option<String>,
    pub video_id: Option<String>,
    pub start_secs: Option<i64>,
    pub end_secs: Option<i64>,
    pub art_url: Option<String>,
    pub sync_status: SyncStatus,
    pub last_modified_at: i64,
}

const LIKE_COLUMNS: &str = "item_id, server_id, kind, title, artist, video_id, start_secs, \
     end_secs, art_url, sync_status, last_modified_at";

impl SyncStore {
    /// Records a like made by the user. Liking again something already synced keeps it
    /// synced; anything else (new or pending delete) becomes dirty.
    pub async fn add_like(&self, like: &LikeInput) -> Result<LikeRecord, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO likes (
                item_id, server_id, kind, title, artist, video_id,
                start_secs, end_secs, art_url, sync_status, last_modified_at
            )
            VALUES (?1, NULL, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'DIRTY', ?9)
            ON CONFLICT(item_id) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                art_url = excluded.art_url,
                sync_status = CASE
                    WHEN likes.sync_status = 'SYNCED' THEN 'SYNCED'
                    ELSE 'DIRTY'
                END,
                last_modified_at = excluded.last_modified_at
            "#,
        )
        .bind(&like.item_id)
        .bind(like.kind.as_str())
        .bind(&like.title)
        .bind(&like.artist)
        .bind(&like.video_id)
        .bind(like.start_secs)
        .bind(like.end_secs)
        .bind(&like.art_url)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        self.get_like(&like.item_id)
            .await?
            .ok_or_else(|| StoreError::Sqlx(sqlx::Error::RowNotFound))
    }

    /// Removes a like on the user's behalf; returns false when there was nothing to remove.
    pub async fn remove_like(&self, item_id: &str) -> Result<bool, StoreError> {
        let Some(existing) = self.get_like(item_id).await? else {
            return Ok(false);
        };
        match SyncStatus::removal(existing.server_id.as_deref()) {
            LocalRemoval::DeleteRow => self.delete_like(item_id).await?,
            LocalRemoval::MarkPendingDelete => {
                sqlx::query(
                    "UPDATE likes SET sync_status = 'PENDING_DELETE', last_modified_at = ?2 WHERE item_id = ?1",
                )
                .bind(item_id)
                .bind(now_millis())
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(true)
    }

    pub async fn get_like(&self, item_id: &str) -> Result<Option<LikeRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {LIKE_COLUMNS} FROM likes WHERE item_id = ?1"))
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| map_like(&row)).transpose()
    }

    pub async fn likes_by_status(&self, status: SyncStatus) -> Result<Vec<LikeRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LIKE_COLUMNS} FROM likes WHERE sync_status = ?1 ORDER BY item_id"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_like).collect()
    }

    pub async fn all_likes(&self) -> Result<Vec<LikeRecord>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {LIKE_COLUMNS} FROM likes ORDER BY item_id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_like).collect()
    }

    /// Stamps a server id without touching the sync status.
    pub async fn set_like_server_id(&self, item_id: &str, server_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE likes SET server_id = ?2 WHERE item_id = ?1")
            .bind(item_id)
            .bind(server_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Marks a dirty like as synced. A like removed meanwhile keeps its tombstone.
    pub async fn mark_like_synced(&self, item_id: &str, server_id: Option<&str>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE likes
            SET sync_status = 'SYNCED', server_id = COALESCE(?2, server_id)
            WHERE item_id = ?1 AND sync_status = 'DIRTY'
            "#,
        )
        .bind(item_id)
        .bind(server_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_like(&self, item_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM likes WHERE item_id = ?1")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes the like only while it still has `status`; false if the user touched it
    /// in the meantime.
    pub async fn delete_like_in_status(
        &self,
        item_id: &str,
        status: SyncStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM likes WHERE item_id = ?1 AND sync_status = ?2")
            .bind(item_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Applies a downstream pass. Inserts never overwrite an existing row, so a
    /// tombstoned like cannot be recreated here.
    pub async fn apply_like_batch(
        &self,
        batch: &DownstreamBatch<LikeRecord>,
    ) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for like in &batch.insert {
            sqlx::query(
                r#"
                INSERT INTO likes (
                    item_id, server_id, kind, title, artist, video_id,
                    start_secs, end_secs, art_url, sync_status, last_modified_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(item_id) DO NOTHING
                "#,
            )
            .bind(&like.item_id)
            .bind(&like.server_id)
            .bind(like.kind.as_str())
            .bind(&like.title)
            .bind(&like.artist)
            .bind(&like.video_id)
            .bind(like.start_secs)
            .bind(like.end_secs)
            .bind(&like.art_url)
            .bind(like.sync_status.as_str())
            .bind(like.last_modified_at)
            .execute(&mut *tx)
            .await?;
        }
        for like in &batch.update {
            sqlx::query(
                "UPDATE likes SET title = ?2, artist = ?3, art_url = ?4 WHERE item_id = ?1 AND sync_status = 'SYNCED'",
            )
            .bind(&like.item_id)
            .bind(&like.title)
            .bind(&like.artist)
            .bind(&like.art_url)
            .execute(&mut *tx)
            .await?;
        }
        // a like re-added since the snapshot is DIRTY and must survive
        for item_id in &batch.delete {
            sqlx::query("DELETE FROM likes WHERE item_id = ?1 AND sync_status <> 'DIRTY'")
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        }
        for item_id in &batch.revert_to_synced {
            sqlx::query(
                "UPDATE likes SET sync_status = 'SYNCED' WHERE item_id = ?1 AND sync_status = 'PENDING_DELETE'",
            )
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn map_like(row: &SqliteRow) -> Result<LikeRecord, StoreError> {
    let kind: String = row.try_get("kind")?;
    Ok(LikeRecord {
        item_id: row.try_get("item_id")?,
        server_id: row.try_get("server_id")?,
        kind: LikeKind::parse(&kind)?,
        title: row.try_get("title")?,
        artist: row.try_get("artist")?,
        video_id: row.try_get("video_id")?,
        start_secs: row.try_get("start_secs")?,
        end_secs: row.try_get("end_secs")?,
        art_url: row.try_get("art_url")?,
        sync_status: status_column(row)?,
        last_modified_at: row.try_get("last_modified_at")?,
    })
}
