use std::{fs, path::PathBuf, time::Duration};

use sqlx::{
    Row, SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow},
};
use thiserror::Error;

use super::status::SyncStatus;

mod favorites;
mod history;
mod likes;
mod playlists;
mod starred;

pub use favorites::{FavoriteChannelInput, FavoriteChannelRecord};
pub use history::{HISTORY_LAST_SYNC_KEY, HistoryItemInput, HistoryItemRecord};
pub use likes::{LikeInput, LikeKind, LikeRecord};
pub use playlists::{PlaylistItemInput, PlaylistItemRecord, PlaylistReconcile, PlaylistRecord};
pub use starred::{StarredPlaylistInput, StarredPlaylistRecord};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// How long a connection waits for another family's write transaction.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
    #[error("invalid sync status: {0}")]
    InvalidStatus(String),
    #[error("invalid like kind: {0}")]
    InvalidLikeKind(String),
    #[error("playlist {0} not found")]
    MissingPlaylist(i64),
}

/// Local rows a downstream pass wants to change, applied in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct DownstreamBatch<T> {
    pub insert: Vec<T>,
    pub update: Vec<T>,
    pub delete: Vec<String>,
    pub revert_to_synced: Vec<String>,
}

impl<T> Default for DownstreamBatch<T> {
    fn default() -> Self {
        Self {
            insert: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
            revert_to_synced: Vec::new(),
        }
    }
}

impl<T> DownstreamBatch<T> {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty()
            && self.update.is_empty()
            && self.delete.is_empty()
            && self.revert_to_synced.is_empty()
    }
}

/// SQLite-backed store for every syncable entity family.
#[derive(Clone)]
pub struct SyncStore {
    pool: SqlitePool,
}

impl SyncStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn open(db_path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn new_default() -> Result<Self, StoreError> {
        Self::open(&default_db_path()?).await
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn memory() -> Self {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Self::from_pool(pool);
        store.init().await.unwrap();
        store
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub fn default_db_path() -> Result<PathBuf, StoreError> {
    let mut path = dirs::data_dir().ok_or(StoreError::MissingDataDir)?;
    path.push("musicdex-sync");
    path.push("sync.db");
    Ok(path)
}

fn status_column(row: &SqliteRow) -> Result<SyncStatus, StoreError> {
    let raw: String = row.try_get("sync_status")?;
    SyncStatus::parse(&raw)
}
