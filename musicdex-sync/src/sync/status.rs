use super::store::StoreError;

/// Sync lifecycle carried by every syncable row.
///
/// Rows start `Dirty` when created locally and `Synced` when inserted from the
/// server. A local removal of a row the server knows about moves it to
/// `PendingDelete`; the row itself disappears only once the deletion is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    Synced,
    Dirty,
    PendingDelete,
}

/// What a local removal does to a row, depending on whether it was ever pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalRemoval {
    DeleteRow,
    MarkPendingDelete,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Dirty => "DIRTY",
            SyncStatus::PendingDelete => "PENDING_DELETE",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "SYNCED" => Ok(SyncStatus::Synced),
            "DIRTY" => Ok(SyncStatus::Dirty),
            "PENDING_DELETE" => Ok(SyncStatus::PendingDelete),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }

    pub fn removal(server_id: Option<&str>) -> LocalRemoval {
        match server_id {
            Some(_) => LocalRemoval::MarkPendingDelete,
            None => LocalRemoval::DeleteRow,
        }
    }

    /// Status a row takes after a local edit. A pending delete stays pending.
    pub fn after_local_edit(self) -> SyncStatus {
        match self {
            SyncStatus::PendingDelete => SyncStatus::PendingDelete,
            SyncStatus::Synced | SyncStatus::Dirty => SyncStatus::Dirty,
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_values() {
        for status in [
            SyncStatus::Synced,
            SyncStatus::Dirty,
            SyncStatus::PendingDelete,
        ] {
            assert_eq!(SyncStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn rejects_unknown_value() {
        let err = SyncStatus::parse("DELETED").unwrap_err();
        assert!(matches!(err, StoreError::InvalidStatus(value) if value == "DELETED"));
    }

    #[test]
    fn removal_without_server_id_deletes_row() {
        assert_eq!(SyncStatus::removal(None), LocalRemoval::DeleteRow);
        assert_eq!(
            SyncStatus::removal(Some("srv-1")),
            LocalRemoval::MarkPendingDelete
        );
    }

    #[test]
    fn local_edit_does_not_revive_pending_delete() {
        assert_eq!(SyncStatus::Synced.after_local_edit(), SyncStatus::Dirty);
        assert_eq!(
            SyncStatus::PendingDelete.after_local_edit(),
            SyncStatus::PendingDelete
        );
    }
}
