use sqlx::{Row, sqlite::SqliteRow};

use super::{DownstreamBatch, StoreError, SyncStore, status_column};
use crate::sync::status::SyncStatus;
use crate::sync::timestamp::now_millis;

#[derive(Debug, Clone, PartialEq)]
pub struct FavoriteChannelInput {
    pub channel_id: String,
    pub name: Option<String>,
    pub english_name: Option<String>,
    pub photo_url: Option<String>,
    pub org: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FavoriteChannelRecord {
    pub channel_id: String,
    pub name: Option<String>,
    pub english_name: Option<String>,
    pub photo_url: Option<String>,
    pub org: Option<String>,
    pub sync_status: SyncStatus,
    pub last_modified_at: i64,
}

impl FavoriteChannelRecord {
    pub fn display_name(&self) -> &str {
        self.english_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.channel_id)
    }

    pub fn same_display(&self, other: &FavoriteChannelInput) -> bool {
        self.name == other.name
            && self.english_name == other.english_name
            && self.photo_url == other.photo_url
            && self.org == other.org
    }
}

const FAVORITE_COLUMNS: &str =
    "channel_id, name, english_name, photo_url, org, sync_status, last_modified_at";

impl SyncStore {
    /// Re-adding a channel whose removal was never pushed simply cancels the removal.
    pub async fn add_favorite_channel(&self, channel: &FavoriteChannelInput) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO favorite_channels (
                channel_id, name, english_name, photo_url, org, sync_status, last_modified_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, 'DIRTY', ?6)
            ON CONFLICT(channel_id) DO UPDATE SET
                name = excluded.name,
                english_name = excluded.english_name,
                photo_url = excluded.photo_url,
                org = excluded.org,
                sync_status = CASE
                    WHEN favorite_channels.sync_status IN ('SYNCED', 'PENDING_DELETE') THEN 'SYNCED'
                    ELSE 'DIRTY'
                END,
                last_modified_at = excluded.last_modified_at
            "#,
        )
        .bind(&channel.channel_id)
        .bind(&channel.name)
        .bind(&channel.english_name)
        .bind(&channel.photo_url)
        .bind(&channel.org)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// A favorite that was never pushed is dropped outright; otherwise it waits as a
    /// pending delete for the next push.
    pub async fn remove_favorite_channel(&self, channel_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM favorite_channels WHERE channel_id = ?1 AND sync_status = 'DIRTY'",
        )
        .bind(channel_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let result = sqlx::query(
            r#"
            UPDATE favorite_channels
            SET sync_status = 'PENDING_DELETE', last_modified_at = ?2
            WHERE channel_id = ?1 AND sync_status = 'SYNCED'
            "#,
        )
        .bind(channel_id)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn favorite_channels_by_status(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<FavoriteChannelRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {FAVORITE_COLUMNS} FROM favorite_channels WHERE sync_status = ?1 ORDER BY channel_id"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_favorite).collect()
    }

    pub async fn all_favorite_channels(&self) -> Result<Vec<FavoriteChannelRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {FAVORITE_COLUMNS} FROM favorite_channels ORDER BY channel_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_favorite).collect()
    }

    /// Settles a successful push: removed channels disappear, added ones become synced.
    pub async fn confirm_favorite_push(
        &self,
        removed: &[String],
        added: &[String],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for channel_id in removed {
            sqlx::query(
                "DELETE FROM favorite_channels WHERE channel_id = ?1 AND sync_status = 'PENDING_DELETE'",
            )
            .bind(channel_id)
            .execute(&mut *tx)
            .await?;
        }
        for channel_id in added {
            sqlx::query(
                "UPDATE favorite_channels SET sync_status = 'SYNCED' WHERE channel_id = ?1 AND sync_status = 'DIRTY'",
            )
            .bind(channel_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn apply_favorite_batch(
        &self,
        batch: &DownstreamBatch<FavoriteChannelInput>,
    ) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let now = now_millis();
        let mut tx = self.pool.begin().await?;
        for channel in &batch.insert {
            sqlx::query(
                r#"
                INSERT INTO favorite_channels (
                    channel_id, name, english_name, photo_url, org, sync_status, last_modified_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, 'SYNCED', ?6)
                ON CONFLICT(channel_id) DO NOTHING
                "#,
            )
            .bind(&channel.channel_id)
            .bind(&channel.name)
            .bind(&channel.english_name)
            .bind(&channel.photo_url)
            .bind(&channel.org)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        for channel in &batch.update {
            sqlx::query(
                r#"
                UPDATE favorite_channels
                SET name = ?2, english_name = ?3, photo_url = ?4, org = ?5
                WHERE channel_id = ?1 AND sync_status = 'SYNCED'
                "#,
            )
            .bind(&channel.channel_id)
            .bind(&channel.name)
            .bind(&channel.english_name)
            .bind(&channel.photo_url)
            .bind(&channel.org)
            .execute(&mut *tx)
            .await?;
        }
        for channel_id in &batch.delete {
            sqlx::query("DELETE FROM favorite_channels WHERE channel_id = ?1 AND sync_status = 'SYNCED'")
                .bind(channel_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn map_favorite(row: &SqliteRow) -> Result<FavoriteChannelRecord, StoreError> {
    Ok(FavoriteChannelRecord {
        channel_id: row.try_get("channel_id")?,
        name: row.try_get("name")?,
        english_name: row.try_get("english_name")?,
        photo_url: row.try_get("photo_url")?,
        org: row.try_get("org")?,
        sync_status: status_column(row)?,
        last_modified_at: row.try_get("last_modified_at")?,
    })
}
