//! ConflictDetector: a path-keyed read/write lock manager with timeout and
//! reentrancy, guarding concurrent sub-agent tool execution against the
//! shared workspace.

use crate::errors::{BuckleyError, LockMode};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Clone)]
struct LockEntry {
    writer: Option<String>,
    writer_count: u32,
    readers: HashMap<String, u32>,
}

impl LockEntry {
    fn is_empty(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }
}

fn normalize_path(path: &str) -> Result<String, BuckleyError> {
    let trimmed = path.trim().replace('\\', "/");
    if trimmed.is_empty() {
        return Err(BuckleyError::InvalidArgument(
            "lock path must not be empty".into(),
        ));
    }
    Ok(trimmed)
}

pub struct ConflictDetector {
    locks: Mutex<HashMap<String, LockEntry>>,
    notify: Notify,
    default_timeout: Duration,
}

impl ConflictDetector {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_timeout(default_timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            default_timeout,
        }
    }

    pub async fn acquire_read(&self, task: &str, path: &str) -> Result<(), BuckleyError> {
        self.acquire_read_timeout(task, path, self.default_timeout)
            .await
    }

    pub async fn acquire_write(&self, task: &str, path: &str) -> Result<(), BuckleyError> {
        self.acquire_write_timeout(task, path, self.default_timeout)
            .await
    }

    pub async fn acquire_read_timeout(
        &self,
        task: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<(), BuckleyError> {
        let path = normalize_path(path)?;
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut locks = self.locks.lock().expect("conflict lock table poisoned");
                let entry = locks.entry(path.clone()).or_default();
                let grantable = match &entry.writer {
                    None => true,
                    Some(w) => w == task,
                };
                if grantable {
                    *entry.readers.entry(task.to_string()).or_insert(0) += 1;
                    debug!("acquired read lock on '{}' for task '{}'", path, task);
                    return Ok(());
                }
            }
            if !self.wait_until(deadline).await {
                let locks = self.locks.lock().expect("conflict lock table poisoned");
                let holder = locks
                    .get(&path)
                    .and_then(|e| e.writer.clone())
                    .unwrap_or_default();
                return Err(BuckleyError::LockConflict {
                    path,
                    holder,
                    mode: LockMode::Read,
                    timeout: true,
                });
            }
        }
    }

    pub async fn acquire_write_timeout(
        &self,
        task: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<(), BuckleyError> {
        let path = normalize_path(path)?;
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut locks = self.locks.lock().expect("conflict lock table poisoned");
                let entry = locks.entry(path.clone()).or_default();
                let already_writer = entry.writer.as_deref() == Some(task);
                let only_reader_is_self = entry.readers.is_empty()
                    || (entry.readers.len() == 1 && entry.readers.contains_key(task));
                let grantable =
                    already_writer || (entry.writer.is_none() && only_reader_is_self);
                if grantable {
                    entry.readers.remove(task);
                    entry.writer = Some(task.to_string());
                    entry.writer_count += 1;
                    debug!("acquired write lock on '{}' for task '{}'", path, task);
                    return Ok(());
                }
            }
            if !self.wait_until(deadline).await {
                let locks = self.locks.lock().expect("conflict lock table poisoned");
                let holder = locks
                    .get(&path)
                    .and_then(|e| e.writer.clone())
                    .unwrap_or_default();
                return Err(BuckleyError::LockConflict {
                    path,
                    holder,
                    mode: LockMode::Write,
                    timeout: true,
                });
            }
        }
    }

    pub fn release_read(&self, task: &str, path: &str) {
        let Ok(path) = normalize_path(path) else {
            return;
        };
        let mut locks = self.locks.lock().expect("conflict lock table poisoned");
        if let Some(entry) = locks.get_mut(&path) {
            if let Some(count) = entry.readers.get_mut(task) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    entry.readers.remove(task);
                }
            }
            if entry.is_empty() {
                locks.remove(&path);
            }
        }
        drop(locks);
        self.notify.notify_waiters();
    }

    pub fn release_write(&self, task: &str, path: &str) {
        let Ok(path) = normalize_path(path) else {
            return;
        };
        let mut locks = self.locks.lock().expect("conflict lock table poisoned");
        if let Some(entry) = locks.get_mut(&path) {
            if entry.writer.as_deref() == Some(task) {
                entry.writer_count = entry.writer_count.saturating_sub(1);
                if entry.writer_count == 0 {
                    entry.writer = None;
                }
            }
            if entry.is_empty() {
                locks.remove(&path);
            }
        }
        drop(locks);
        self.notify.notify_waiters();
    }

    /// Release every lock (read and write) held by `task`, across all paths.
    pub fn release_all(&self, task: &str) {
        let mut locks = self.locks.lock().expect("conflict lock table poisoned");
        locks.retain(|_, entry| {
            entry.readers.remove(task);
            if entry.writer.as_deref() == Some(task) {
                entry.writer = None;
                entry.writer_count = 0;
            }
            !entry.is_empty()
        });
        drop(locks);
        self.notify.notify_waiters();
    }

    async fn wait_until(&self, deadline: Instant) -> bool {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::select! {
            _ = self.notify.notified() => true,
            _ = tokio::time::sleep_until(deadline) => false,
        }
    }

    #[cfg(test)]
    fn writer_count(&self, path: &str) -> usize {
        let locks = self.locks.lock().expect("mutex poisoned");
        locks
            .get(&normalize_path(path).unwrap())
            .map(|e| usize::from(e.writer.is_some()))
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn reader_count(&self, path: &str) -> usize {
        let locks = self.locks.lock().expect("mutex poisoned");
        locks
            .get(&normalize_path(path).unwrap())
            .map(|e| e.readers.len())
            .unwrap_or(0)
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Tools requiring a read lock before registry execution (§4.7 mapping).
pub const READ_LOCK_TOOLS: &[&str] = &[
    "read_file",
    "list_directory",
    "find_files",
    "file_exists",
    "get_file_info",
    "search_text",
];

/// Tools requiring a write lock before registry execution (§4.7 mapping).
pub const WRITE_LOCK_TOOLS: &[&str] = &[
    "write_file",
    "patch_file",
    "edit_file",
    "insert_text",
    "delete_lines",
    "search_replace",
    "rename_symbol",
    "extract_function",
    "mark_resolved",
];

/// Lock mode a tool call requires, if any, derived from the tool name and
/// its `path` argument.
pub enum LockRequirement {
    Read(String),
    Write(String),
    None,
}

pub fn lock_requirement_for(tool_name: &str, params: &serde_json::Value) -> LockRequirement {
    let path = params
        .get("path")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    if path.is_empty() {
        return LockRequirement::None;
    }
    if READ_LOCK_TOOLS.contains(&tool_name) {
        LockRequirement::Read(path)
    } else if WRITE_LOCK_TOOLS.contains(&tool_name) {
        LockRequirement::Write(path)
    } else {
        LockRequirement::None
    }
}
