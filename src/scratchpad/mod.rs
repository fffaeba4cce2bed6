//! Scratchpad (§4.6): a bounded, TTL'd, LRU/FIFO-evicted entry store for
//! sub-agent outputs, with optional durable persistence of selected entry
//! classes and coordinator-visible summaries.

pub mod store;

use crate::errors::BuckleyError;
use crate::utils::truncate_chars;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use store::{Store, StoreRow};
use tracing::{debug, warn};

const SUMMARY_TRUNCATE_CHARS: usize = 200;
const ULID_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Mint a ULID-like sortable id: 10 Crockford-base32 chars of millisecond
/// timestamp followed by 16 random chars.
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut out = String::with_capacity(26);
    for i in (0..10).rev() {
        let shift = i * 5;
        let idx = ((millis >> shift) & 0x1F) as usize;
        out.push(ULID_ALPHABET[idx] as char);
    }
    for _ in 0..16 {
        let idx = fastrand::usize(0..ULID_ALPHABET.len());
        out.push(ULID_ALPHABET[idx] as char);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    File,
    Command,
    Analysis,
    Decision,
    Artifact,
    Strategy,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Command => "command",
            Self::Analysis => "analysis",
            Self::Decision => "decision",
            Self::Artifact => "artifact",
            Self::Strategy => "strategy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Self::File),
            "command" => Some(Self::Command),
            "analysis" => Some(Self::Analysis),
            "decision" => Some(Self::Decision),
            "artifact" => Some(Self::Artifact),
            "strategy" => Some(Self::Strategy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    Lru,
    Fifo,
}

/// Declarative config surface for the Scratchpad, matching the crate's
/// `coordinator`/`sub_agent`/etc. sibling config structs one-for-one.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScratchpadConfig {
    #[serde(rename = "maxEntriesMemory", default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(rename = "maxRawBytesMemory", default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(rename = "defaultTtlSecs", default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    #[serde(rename = "evictionPolicy", default)]
    pub eviction_policy: EvictionPolicy,
    #[serde(rename = "persistArtifacts", default)]
    pub persist_artifacts: bool,
    #[serde(rename = "persistDecisions", default)]
    pub persist_decisions: bool,
}

fn default_max_entries() -> usize {
    500
}

fn default_max_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_ttl_secs() -> u64 {
    24 * 3600
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::Lru
    }
}

impl Default for ScratchpadConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_bytes: default_max_bytes(),
            default_ttl_secs: default_ttl_secs(),
            eviction_policy: EvictionPolicy::default(),
            persist_artifacts: false,
            persist_decisions: false,
        }
    }
}

impl ScratchpadConfig {
    pub fn default_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.default_ttl_secs)
    }
}

pub struct WriteRequest {
    pub key: Option<String>,
    pub entry_type: EntryType,
    pub raw: Vec<u8>,
    pub summary: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_by: String,
}

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    entry_type: EntryType,
    raw: Vec<u8>,
    summary: String,
    metadata: HashMap<String, serde_json::Value>,
    created_by: String,
    created_at: DateTime<Utc>,
    created_at_monotonic: Instant,
    last_access: Instant,
}

/// Coordinator-safe projection of an entry: summary + metadata, no raw.
#[derive(Debug, Clone)]
pub struct SummaryView {
    pub key: String,
    pub entry_type: EntryType,
    pub summary: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Full entry including raw bytes, returned only from `inspect_raw`.
#[derive(Debug, Clone)]
pub struct RawView {
    pub key: String,
    pub entry_type: EntryType,
    pub raw: Vec<u8>,
    pub summary: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    fn summary_view(&self) -> SummaryView {
        SummaryView {
            key: self.key.clone(),
            entry_type: self.entry_type,
            summary: self.summary.clone(),
            metadata: self.metadata.clone(),
            created_by: self.created_by.clone(),
            created_at: self.created_at,
        }
    }

    fn raw_view(&self) -> RawView {
        RawView {
            key: self.key.clone(),
            entry_type: self.entry_type,
            raw: self.raw.clone(),
            summary: self.summary.clone(),
            metadata: self.metadata.clone(),
            created_by: self.created_by.clone(),
            created_at: self.created_at,
        }
    }
}

type OnWrite = Box<dyn Fn(&str, &str) + Send + Sync>;

pub struct Scratchpad {
    config: ScratchpadConfig,
    entries: Mutex<HashMap<String, Entry>>,
    total_bytes: Mutex<usize>,
    store: Option<Store>,
    on_write: Option<OnWrite>,
}

impl Scratchpad {
    pub fn new(config: ScratchpadConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            total_bytes: Mutex::new(0),
            store: None,
            on_write: None,
        }
    }

    pub fn with_store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_on_write(mut self, callback: OnWrite) -> Self {
        self.on_write = Some(callback);
        self
    }

    fn should_persist(&self, entry_type: EntryType) -> bool {
        match entry_type {
            EntryType::Artifact => self.config.persist_artifacts,
            EntryType::Decision | EntryType::Strategy => self.config.persist_decisions,
            _ => false,
        }
    }

    pub fn write(&self, request: WriteRequest) -> Result<String, BuckleyError> {
        let key = request
            .key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(generate_id);

        let summary = match request.summary {
            Some(s) if !s.is_empty() => s,
            _ => {
                let raw_str = String::from_utf8_lossy(&request.raw);
                truncate_chars(&raw_str, SUMMARY_TRUNCATE_CHARS, "...")
            }
        };

        let entry = Entry {
            key: key.clone(),
            entry_type: request.entry_type,
            raw: request.raw,
            summary: summary.clone(),
            metadata: request.metadata,
            created_by: request.created_by,
            created_at: Utc::now(),
            created_at_monotonic: Instant::now(),
            last_access: Instant::now(),
        };

        self.purge_expired();

        let size = entry.raw.len();
        let persist = self.should_persist(entry.entry_type);
        let store_row = persist.then(|| StoreRow {
            key: entry.key.clone(),
            entry_type: entry.entry_type.as_str().to_string(),
            raw: entry.raw.clone(),
            summary: entry.summary.clone(),
            metadata: serde_json::to_string(&entry.metadata).unwrap_or_default(),
            created_by: entry.created_by.clone(),
            created_at: entry.created_at.to_rfc3339(),
        });

        {
            let mut entries = self.entries.lock().expect("scratchpad mutex poisoned");
            let mut total_bytes = self
                .total_bytes
                .lock()
                .expect("scratchpad byte counter poisoned");
            if let Some(old) = entries.insert(key.clone(), entry) {
                *total_bytes = total_bytes.saturating_sub(old.raw.len());
            }
            *total_bytes += size;
        }

        self.evict_if_over_limits();

        if let (Some(store), Some(row)) = (&self.store, &store_row) {
            if let Err(e) = store.upsert(row) {
                warn!("scratchpad: failed to persist entry '{}': {}", key, e);
            }
        }

        if let Some(cb) = &self.on_write {
            cb(&key, &summary);
        }

        Ok(key)
    }

    pub fn write_batch(&self, requests: Vec<WriteRequest>) -> Result<Vec<String>, BuckleyError> {
        requests.into_iter().map(|r| self.write(r)).collect()
    }

    fn purge_expired(&self) {
        let mut entries = self.entries.lock().expect("scratchpad mutex poisoned");
        let mut total_bytes = self
            .total_bytes
            .lock()
            .expect("scratchpad byte counter poisoned");
        let ttl = self.config.default_ttl();
        entries.retain(|_, e| {
            let expired = e.created_at_monotonic.elapsed() >= ttl;
            if expired {
                *total_bytes = total_bytes.saturating_sub(e.raw.len());
            }
            !expired
        });
    }

    fn evict_if_over_limits(&self) {
        let mut entries = self.entries.lock().expect("scratchpad mutex poisoned");
        let mut total_bytes = self
            .total_bytes
            .lock()
            .expect("scratchpad byte counter poisoned");

        while entries.len() > self.config.max_entries || *total_bytes > self.config.max_bytes {
            let victim = entries
                .values()
                .min_by_key(|e| match self.config.eviction_policy {
                    EvictionPolicy::Lru => e.last_access,
                    EvictionPolicy::Fifo => e.created_at_monotonic,
                })
                .map(|e| e.key.clone());
            match victim {
                Some(key) => {
                    if let Some(e) = entries.remove(&key) {
                        *total_bytes = total_bytes.saturating_sub(e.raw.len());
                        debug!("scratchpad: evicted '{}' ({} bytes)", key, e.raw.len());
                    }
                }
                None => break,
            }
        }
    }

    pub fn inspect(&self, key: &str) -> Option<SummaryView> {
        self.purge_expired();
        {
            let mut entries = self.entries.lock().expect("scratchpad mutex poisoned");
            if let Some(entry) = entries.get_mut(key) {
                entry.last_access = Instant::now();
                return Some(entry.summary_view());
            }
        }
        self.cache_in_from_store(key).map(|v| v.summary_view())
    }

    pub fn inspect_raw(&self, key: &str) -> Option<RawView> {
        self.purge_expired();
        {
            let mut entries = self.entries.lock().expect("scratchpad mutex poisoned");
            if let Some(entry) = entries.get_mut(key) {
                entry.last_access = Instant::now();
                return Some(entry.raw_view());
            }
        }
        self.cache_in_from_store(key)
    }

    fn cache_in_from_store(&self, key: &str) -> Option<RawView> {
        let store = self.store.as_ref()?;
        let row = store.get(key).ok().flatten()?;
        let entry_type = EntryType::parse(&row.entry_type)?;
        let metadata: HashMap<String, serde_json::Value> =
            serde_json::from_str(&row.metadata).unwrap_or_default();
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let entry = Entry {
            key: row.key,
            entry_type,
            raw: row.raw,
            summary: row.summary,
            metadata,
            created_by: row.created_by,
            created_at,
            created_at_monotonic: Instant::now(),
            last_access: Instant::now(),
        };
        let view = entry.raw_view();
        self.entries
            .lock()
            .expect("scratchpad mutex poisoned")
            .insert(key.to_string(), entry);
        Some(view)
    }

    pub fn list_summaries(&self, limit: usize) -> Vec<SummaryView> {
        self.purge_expired();
        let entries = self.entries.lock().expect("scratchpad mutex poisoned");
        let mut views: Vec<&Entry> = entries.values().collect();
        views.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        views
            .into_iter()
            .take(limit)
            .map(Entry::summary_view)
            .collect()
    }

    pub fn list_summaries_by_type(&self, entry_type: EntryType, limit: usize) -> Vec<SummaryView> {
        self.purge_expired();
        let entries = self.entries.lock().expect("scratchpad mutex poisoned");
        let mut views: Vec<&Entry> = entries
            .values()
            .filter(|e| e.entry_type == entry_type)
            .collect();
        views.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        views
            .into_iter()
            .take(limit)
            .map(Entry::summary_view)
            .collect()
    }

    pub fn total_bytes(&self) -> usize {
        *self.total_bytes.lock().expect("byte counter poisoned")
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().expect("scratchpad mutex poisoned").len()
    }
}
