use sqlx::{Row, Sqlite, Transaction, sqlite::SqliteRow};

use super::{StoreError, SyncStore, status_column};
use crate::sync::status::{LocalRemoval, SyncStatus};
use crate::sync::timestamp::now_millis;

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistRecord {
    pub local_id: i64,
    pub server_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    /// Server `updated_at` of the content last applied locally.
    pub remote_updated_at: Option<i64>,
    pub sync_status: SyncStatus,
    pub last_modified_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistItemInput {
    pub item_id: String,
    pub song_id: Option<String>,
    pub video_id: String,
    pub start_secs: i64,
    pub end_secs: i64,
    pub title: String,
    pub artist: Option<String>,
    pub is_local_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistItemRecord {
    pub position: i64,
    pub item_id: String,
    pub song_id: Option<String>,
    pub video_id: String,
    pub start_secs: i64,
    pub end_secs: i64,
    pub title: String,
    pub artist: Option<String>,
    pub is_local_only: bool,
}

impl From<PlaylistItemRecord> for PlaylistItemInput {
    fn from(item: PlaylistItemRecord) -> Self {
        Self {
            item_id: item.item_id,
            song_id: item.song_id,
            video_id: item.video_id,
            start_secs: item.start_secs,
            end_secs: item.end_secs,
            title: item.title,
            artist: item.artist,
            is_local_only: item.is_local_only,
        }
    }
}

const PLAYLIST_COLUMNS: &str =
    "local_id, server_id, title, description, remote_updated_at, sync_status, last_modified_at";

impl SyncStore {
    pub async fn create_playlist(
        &self,
        title: &str,
        description: Option<&str>,
        items: &[PlaylistItemInput],
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO playlists (server_id, title, description, remote_updated_at, sync_status, last_modified_at)
            VALUES (NULL, ?1, ?2, NULL, 'DIRTY', ?3)
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(now_millis())
        .execute(&mut *tx)
        .await?;
        let local_id = result.last_insert_rowid();
        write_items(&mut tx, local_id, items.iter()).await?;
        tx.commit().await?;
        Ok(local_id)
    }

    /// Replaces title, description and items on the user's behalf and marks the
    /// playlist dirty.
    pub async fn edit_playlist(
        &self,
        local_id: i64,
        title: &str,
        description: Option<&str>,
        items: &[PlaylistItemInput],
    ) -> Result<(), StoreError> {
        let existing = self
            .get_playlist(local_id)
            .await?
            .ok_or(StoreError::MissingPlaylist(local_id))?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE playlists
            SET title = ?2, description = ?3, sync_status = ?4, last_modified_at = ?5
            WHERE local_id = ?1
            "#,
        )
        .bind(local_id)
        .bind(title)
        .bind(description)
        .bind(existing.sync_status.after_local_edit().as_str())
        .bind(now_millis())
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM playlist_items WHERE playlist_id = ?1")
            .bind(local_id)
            .execute(&mut *tx)
            .await?;
        write_items(&mut tx, local_id, items.iter()).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_playlist(&self, local_id: i64) -> Result<bool, StoreError> {
        let Some(existing) = self.get_playlist(local_id).await? else {
            return Ok(false);
        };
        match SyncStatus::removal(existing.server_id.as_deref()) {
            LocalRemoval::DeleteRow => self.delete_playlist_row(local_id).await?,
            LocalRemoval::MarkPendingDelete => {
                sqlx::query(
                    "UPDATE playlists SET sync_status = 'PENDING_DELETE', last_modified_at = ?2 WHERE local_id = ?1",
                )
                .bind(local_id)
                .bind(now_millis())
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(true)
    }

    pub async fn get_playlist(&self, local_id: i64) -> Result<Option<PlaylistRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE local_id = ?1"
        ))
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| map_playlist(&row)).transpose()
    }

    pub async fn all_playlists(&self) -> Result<Vec<PlaylistRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PLAYLIST_COLUMNS} FROM playlists ORDER BY local_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_playlist).collect()
    }

    pub async fn playlists_by_status(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<PlaylistRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE sync_status = ?1 ORDER BY local_id"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_playlist).collect()
    }

    pub async fn playlist_items(&self, local_id: i64) -> Result<Vec<PlaylistItemRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT position, item_id, song_id, video_id, start_secs, end_secs, title, artist, is_local_only
            FROM playlist_items
            WHERE playlist_id = ?1
            ORDER BY position
            "#,
        )
        .bind(local_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_item).collect()
    }

    pub async fn set_playlist_item_song_id(
        &self,
        local_id: i64,
        position: i64,
        song_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE playlist_items SET song_id = ?3 WHERE playlist_id = ?1 AND position = ?2")
            .bind(local_id)
            .bind(position)
            .bind(song_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_playlist_row(&self, local_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM playlists WHERE local_id = ?1")
            .bind(local_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Confirms an upstream upsert. Only a row that is still dirty is marked synced;
    /// the server id and timestamp are stamped either way.
    pub async fn confirm_playlist_upload(
        &self,
        local_id: i64,
        server_id: &str,
        remote_updated_at: Option<i64>,
        pushed_at: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE playlists
            SET server_id = ?2,
                remote_updated_at = COALESCE(?3, remote_updated_at),
                sync_status = CASE
                    WHEN sync_status = 'DIRTY' AND last_modified_at <= ?4 THEN 'SYNCED'
                    ELSE sync_status
                END
            WHERE local_id = ?1
            "#,
        )
        .bind(local_id)
        .bind(server_id)
        .bind(remote_updated_at)
        .bind(pushed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Detaches a playlist from a server copy that no longer exists, so the next upload
    /// creates a new one.
    pub async fn forget_playlist_server_id(&self, local_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE playlists SET server_id = NULL, remote_updated_at = NULL WHERE local_id = ?1",
        )
        .bind(local_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts a playlist first seen on the server. No content timestamp is recorded
    /// so the content pass picks it up.
    pub async fn insert_remote_playlist(
        &self,
        server_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO playlists (server_id, title, description, remote_updated_at, sync_status, last_modified_at)
            VALUES (?1, ?2, ?3, NULL, 'SYNCED', ?4)
            "#,
        )
        .bind(server_id)
        .bind(title)
        .bind(description)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Downstream metadata update; a row that is no longer synced is left alone.
    pub async fn update_playlist_metadata(
        &self,
        local_id: i64,
        title: &str,
        description: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE playlists SET title = ?2, description = ?3 WHERE local_id = ?1 AND sync_status = 'SYNCED'",
        )
        .bind(local_id)
        .bind(title)
        .bind(description)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_synced_playlists(&self, local_ids: &[i64]) -> Result<(), StoreError> {
        if local_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for local_id in local_ids {
            sqlx::query("DELETE FROM playlists WHERE local_id = ?1 AND sync_status = 'SYNCED'")
                .bind(local_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Opens the transaction that swaps a playlist's content for the server's.
    ///
    /// The first statement is a write on the playlist row, so the transaction holds the
    /// database write lock from the start and never has to upgrade a read snapshot.
    /// Returns `None` when the playlist is gone or no longer `SYNCED`.
    pub async fn begin_playlist_reconcile(
        &self,
        local_id: i64,
    ) -> Result<Option<PlaylistReconcile>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query(
            "UPDATE playlists SET sync_status = sync_status WHERE local_id = ?1 AND sync_status = 'SYNCED'",
        )
        .bind(local_id)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(PlaylistReconcile { tx, local_id }))
    }
}

/// One playlist's content reconciliation. Nothing is visible to other readers until
/// [`PlaylistReconcile::commit`]; dropping the handle rolls everything back.
pub struct PlaylistReconcile {
    tx: Transaction<'static, Sqlite>,
    local_id: i64,
}

impl PlaylistReconcile {
    /// Writes `remote` in order followed by the playlist's local-only items.
    /// Returns the number of local-only items kept.
    pub async fn replace_items(&mut self, remote: &[PlaylistItemInput]) -> Result<usize, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT position, item_id, song_id, video_id, start_secs, end_secs, title, artist, is_local_only
            FROM playlist_items
            WHERE playlist_id = ?1 AND is_local_only = 1
            ORDER BY position
            "#,
        )
        .bind(self.local_id)
        .fetch_all(&mut *self.tx)
        .await?;
        let local_only = rows
            .iter()
            .map(map_item)
            .map(|item| item.map(PlaylistItemInput::from))
            .collect::<Result<Vec<_>, _>>()?;

        sqlx::query("DELETE FROM playlist_items WHERE playlist_id = ?1")
            .bind(self.local_id)
            .execute(&mut *self.tx)
            .await?;
        let remote = remote.iter().filter(|item| !item.is_local_only);
        write_items(&mut self.tx, self.local_id, remote.chain(local_only.iter())).await?;
        Ok(local_only.len())
    }

    pub async fn apply_metadata(
        &mut self,
        title: &str,
        description: Option<&str>,
        remote_updated_at: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE playlists
            SET title = ?2, description = ?3, remote_updated_at = ?4
            WHERE local_id = ?1
            "#,
        )
        .bind(self.local_id)
        .bind(title)
        .bind(description)
        .bind(remote_updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

async fn write_items<'a>(
    tx: &mut Transaction<'static, Sqlite>,
    local_id: i64,
    items: impl Iterator<Item = &'a PlaylistItemInput>,
) -> Result<(), StoreError> {
    for (position, item) in items.enumerate() {
        sqlx::query(
            r#"
            INSERT INTO playlist_items (
                playlist_id, position, item_id, song_id, video_id,
                start_secs, end_secs, title, artist, is_local_only
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(local_id)
        .bind(position as i64)
        .bind(&item.item_id)
        .bind(&item.song_id)
        .bind(&item.video_id)
        .bind(item.start_secs)
        .bind(item.end_secs)
        .bind(&item.title)
        .bind(&item.artist)
        .bind(item.is_local_only)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn map_playlist(row: &SqliteRow) -> Result<PlaylistRecord, StoreError> {
    Ok(PlaylistRecord {
        local_id: row.try_get("local_id")?,
        server_id: row.try_get("server_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        remote_updated_at: row.try_get("remote_updated_at")?,
        sync_status: status_column(row)?,
        last_modified_at: row.try_get("last_modified_at")?,
    })
}

fn map_item(row: &SqliteRow) -> Result<PlaylistItemRecord, StoreError> {
    Ok(PlaylistItemRecord {
        position: row.try_get("position")?,
        item_id: row.try_get("item_id")?,
        song_id: row.try_get("song_id")?,
        video_id: row.try_get("video_id")?,
        start_secs: row.try_get("start_secs")?,
        end_secs: row.try_get("end_secs")?,
        title: row.try_get("title")?,
        artist: row.try_get("artist")?,
        is_local_only: row.try_get("is_local_only")?,
    })
}
