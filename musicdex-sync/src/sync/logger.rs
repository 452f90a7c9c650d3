use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-item reconciliation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogAction {
    UpstreamDeleteSuccess,
    UpstreamDeleteFailed,
    UpstreamUpsertSuccess,
    UpstreamUpsertFailed,
    DownstreamInsertLocal,
    DownstreamDeleteLocal,
    DownstreamUpdateLocal,
    ReconcileSkip,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::UpstreamDeleteSuccess => "UPSTREAM_DELETE_SUCCESS",
            LogAction::UpstreamDeleteFailed => "UPSTREAM_DELETE_FAILED",
            LogAction::UpstreamUpsertSuccess => "UPSTREAM_UPSERT_SUCCESS",
            LogAction::UpstreamUpsertFailed => "UPSTREAM_UPSERT_FAILED",
            LogAction::DownstreamInsertLocal => "DOWNSTREAM_INSERT_LOCAL",
            LogAction::DownstreamDeleteLocal => "DOWNSTREAM_DELETE_LOCAL",
            LogAction::DownstreamUpdateLocal => "DOWNSTREAM_UPDATE_LOCAL",
            LogAction::ReconcileSkip => "RECONCILE_SKIP",
        }
    }

    fn is_failure(&self) -> bool {
        matches!(
            self,
            LogAction::UpstreamDeleteFailed | LogAction::UpstreamUpsertFailed
        )
    }
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAction {
    pub action: LogAction,
    pub item: String,
    pub local_id: Option<String>,
    pub server_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncLogEntry {
    SectionStart(String),
    SectionEnd { section: String, success: bool },
    Info(String),
    Warning(String),
    Error(String),
    Item(ItemAction),
}

impl fmt::Display for SyncLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncLogEntry::SectionStart(section) => {
                write!(f, "===== START SYNC: {section} =====")
            }
            SyncLogEntry::SectionEnd { section, success } => {
                write!(f, "===== END SYNC: {section} (Success: {success}) =====")
            }
            SyncLogEntry::Info(message) => f.write_str(message),
            SyncLogEntry::Warning(message) => write!(f, "WARNING: {message}"),
            SyncLogEntry::Error(message) => write!(f, "ERROR: {message}"),
            SyncLogEntry::Item(entry) => {
                write!(
                    f,
                    "-> [{}] Item: '{}' (LID: {}, SID: {})",
                    entry.action,
                    entry.item,
                    entry.local_id.as_deref().unwrap_or("N/A"),
                    entry.server_id.as_deref().unwrap_or("N/A"),
                )?;
                if let Some(reason) = &entry.reason {
                    write!(f, " | Reason: {reason}")?;
                }
                Ok(())
            }
        }
    }
}

/// Append-only audit trail of a sync run.
///
/// Every entry is mirrored to `tracing`; the journal itself is kept so callers and
/// tests can inspect exactly which branch each item went through.
#[derive(Debug, Default)]
pub struct SyncLogger {
    entries: Mutex<Vec<SyncLogEntry>>,
    terminal_failure: AtomicBool,
}

impl SyncLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_section(&self, section: &str) {
        tracing::info!(section, "===== START SYNC: {section} =====");
        self.push(SyncLogEntry::SectionStart(section.to_string()));
    }

    pub fn end_section(&self, section: &str, success: bool) {
        if success {
            tracing::info!(section, success, "===== END SYNC: {section} =====");
        } else {
            tracing::warn!(section, success, "===== END SYNC: {section} =====");
        }
        self.push(SyncLogEntry::SectionEnd {
            section: section.to_string(),
            success,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.push(SyncLogEntry::Info(message));
    }

    pub fn warning(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.push(SyncLogEntry::Warning(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.push(SyncLogEntry::Error(message));
    }

    /// Records an error that another attempt with the same session cannot fix.
    pub fn terminal_error(&self, message: impl Into<String>) {
        self.terminal_failure.store(true, Ordering::SeqCst);
        self.error(message);
    }

    pub fn has_terminal_failure(&self) -> bool {
        self.terminal_failure.load(Ordering::SeqCst)
    }

    pub fn log_item_action(
        &self,
        action: LogAction,
        item: &str,
        local_id: Option<&str>,
        server_id: Option<&str>,
        reason: Option<&str>,
    ) {
        let entry = ItemAction {
            action,
            item: item.to_string(),
            local_id: local_id.map(str::to_string),
            server_id: server_id.map(str::to_string),
            reason: reason.map(str::to_string),
        };
        if action.is_failure() {
            tracing::warn!(
                action = action.as_str(),
                item,
                local_id,
                server_id,
                reason,
                "item action"
            );
        } else {
            tracing::info!(
                action = action.as_str(),
                item,
                local_id,
                server_id,
                reason,
                "item action"
            );
        }
        self.push(SyncLogEntry::Item(entry));
    }

    pub fn entries(&self) -> Vec<SyncLogEntry> {
        self.lock().clone()
    }

    /// Item actions recorded so far, in order.
    pub fn item_actions(&self) -> Vec<ItemAction> {
        self.lock()
            .iter()
            .filter_map(|entry| match entry {
                SyncLogEntry::Item(item) => Some(item.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn actions_for(&self, item: &str) -> Vec<LogAction> {
        self.item_actions()
            .into_iter()
            .filter(|entry| entry.item == item)
            .map(|entry| entry.action)
            .collect()
    }

    fn push(&self, entry: SyncLogEntry) {
        self.lock().push(entry);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SyncLogEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
