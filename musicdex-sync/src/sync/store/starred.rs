use std::collections::HashSet;

use sqlx::{Row, sqlite::SqliteRow};

use super::{StoreError, SyncStore, status_column};
use crate::sync::status::SyncStatus;
use crate::sync::timestamp::now_millis;

#[derive(Debug, Clone, PartialEq)]
pub struct StarredPlaylistInput {
    pub playlist_id: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StarredPlaylistRecord {
    pub playlist_id: String,
    pub title: String,
    pub description: Option<String>,
    pub sync_status: SyncStatus,
    pub last_modified_at: i64,
}

const STARRED_COLUMNS: &str = "playlist_id, title, description, sync_status, last_modified_at";

impl SyncStore {
    pub async fn star_playlist(&self, playlist: &StarredPlaylistInput) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO starred_playlists (playlist_id, title, description, sync_status, last_modified_at)
            VALUES (?1, ?2, ?3, 'DIRTY', ?4)
            ON CONFLICT(playlist_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                sync_status = CASE
                    WHEN starred_playlists.sync_status IN ('SYNCED', 'PENDING_DELETE') THEN 'SYNCED'
                    ELSE 'DIRTY'
                END,
                last_modified_at = excluded.last_modified_at
            "#,
        )
        .bind(&playlist.playlist_id)
        .bind(&playlist.title)
        .bind(&playlist.description)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn unstar_playlist(&self, playlist_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM starred_playlists WHERE playlist_id = ?1 AND sync_status = 'DIRTY'",
        )
        .bind(playlist_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let result = sqlx::query(
            r#"
            UPDATE starred_playlists
            SET sync_status = 'PENDING_DELETE', last_modified_at = ?2
            WHERE playlist_id = ?1 AND sync_status = 'SYNCED'
            "#,
        )
        .bind(playlist_id)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn starred_by_status(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<StarredPlaylistRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {STARRED_COLUMNS} FROM starred_playlists WHERE sync_status = ?1 ORDER BY playlist_id"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_starred).collect()
    }

    pub async fn all_starred(&self) -> Result<Vec<StarredPlaylistRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {STARRED_COLUMNS} FROM starred_playlists ORDER BY playlist_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_starred).collect()
    }

    /// Deletes the star only while it still has `status`.
    pub async fn delete_starred(
        &self,
        playlist_id: &str,
        status: SyncStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM starred_playlists WHERE playlist_id = ?1 AND sync_status = ?2",
        )
        .bind(playlist_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_starred_synced(&self, playlist_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE starred_playlists SET sync_status = 'SYNCED' WHERE playlist_id = ?1 AND sync_status = 'DIRTY'",
        )
        .bind(playlist_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Makes the synced stars match `remote`, in one transaction. Ids that are locally
    /// dirty or pending delete keep their local row, and unchanged rows are not rewritten.
    pub async fn replace_synced_starred(
        &self,
        remote: &[StarredPlaylistInput],
    ) -> Result<(), StoreError> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;
        for playlist in remote {
            sqlx::query(
                r#"
                INSERT INTO starred_playlists (playlist_id, title, description, sync_status, last_modified_at)
                VALUES (?1, ?2, ?3, 'SYNCED', ?4)
                ON CONFLICT(playlist_id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description
                WHERE starred_playlists.sync_status = 'SYNCED'
                    AND (starred_playlists.title IS NOT excluded.title
                        OR starred_playlists.description IS NOT excluded.description)
                "#,
            )
            .bind(&playlist.playlist_id)
            .bind(&playlist.title)
            .bind(&playlist.description)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let remote_ids: HashSet<&str> = remote.iter().map(|p| p.playlist_id.as_str()).collect();
        let synced: Vec<String> =
            sqlx::query_scalar("SELECT playlist_id FROM starred_playlists WHERE sync_status = 'SYNCED'")
                .fetch_all(&mut *tx)
                .await?;
        for playlist_id in synced.iter().filter(|id| !remote_ids.contains(id.as_str())) {
            sqlx::query(
                "DELETE FROM starred_playlists WHERE playlist_id = ?1 AND sync_status = 'SYNCED'",
            )
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn map_starred(row: &SqliteRow) -> Result<StarredPlaylistRecord, StoreError> {
    Ok(StarredPlaylistRecord {
        playlist_id: row.try_get("playlist_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        sync_status: status_column(row)?,
        last_modified_at: row.try_get("last_modified_at")?,
    })
}
