use serde::{Deserialize, Serialize};

fn default_max_failures() -> u32 {
    5
}

fn default_circuit_timeout_secs() -> u64 {
    30
}

fn default_success_threshold() -> u32 {
    2
}

fn default_max_recent_errors() -> usize {
    5
}

/// Declarative mirror of `circuit::CircuitConfig`, embedded in
/// `DispatcherConfig`'s config surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfigDecl {
    #[serde(default = "default_max_failures", rename = "maxFailures")]
    pub max_failures: u32,
    #[serde(default = "default_circuit_timeout_secs", rename = "timeoutSecs")]
    pub timeout_secs: u64,
    #[serde(default = "default_success_threshold", rename = "successThreshold")]
    pub success_threshold: u32,
    #[serde(
        default = "default_max_recent_errors",
        rename = "maxRecentErrors"
    )]
    pub max_recent_errors: usize,
}

impl Default for CircuitConfigDecl {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            timeout_secs: default_circuit_timeout_secs(),
            success_threshold: default_success_threshold(),
            max_recent_errors: default_max_recent_errors(),
        }
    }
}

impl From<&CircuitConfigDecl> for crate::circuit::CircuitConfig {
    fn from(decl: &CircuitConfigDecl) -> Self {
        Self {
            max_failures: decl.max_failures,
            timeout: std::time::Duration::from_secs(decl.timeout_secs),
            success_threshold: decl.success_threshold,
            max_recent_errors: decl.max_recent_errors,
        }
    }
}

fn default_dispatcher_max_concurrent() -> usize {
    10
}

fn default_rate_limit() -> u32 {
    20
}

fn default_burst() -> u32 {
    5
}

fn default_dispatcher_timeout_secs() -> u64 {
    300
}

/// Declarative config for the Dispatcher (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_dispatcher_max_concurrent", rename = "maxConcurrent")]
    pub max_concurrent: usize,
    /// Requests per second admitted by the `governor` limiter.
    #[serde(default = "default_rate_limit", rename = "rateLimit")]
    pub rate_limit: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
    #[serde(default)]
    pub circuit: CircuitConfigDecl,
    #[serde(default = "default_dispatcher_timeout_secs", rename = "timeoutSecs")]
    pub timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_dispatcher_max_concurrent(),
            rate_limit: default_rate_limit(),
            burst: default_burst(),
            circuit: CircuitConfigDecl::default(),
            timeout_secs: default_dispatcher_timeout_secs(),
        }
    }
}

impl DispatcherConfig {
    pub fn base_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

fn default_rag_max_entries() -> usize {
    5_000
}

fn default_rag_max_cache_size() -> usize {
    10_000
}

fn default_embedding_ttl_secs() -> u64 {
    3600
}

fn default_min_similarity() -> f32 {
    0.3
}

fn default_cleanup_interval_secs() -> u64 {
    600
}

/// Declarative config for ScratchpadRAG (§4.2/L2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_rag_max_entries", rename = "maxEntries")]
    pub max_entries: usize,
    #[serde(default = "default_rag_max_cache_size", rename = "maxCacheSize")]
    pub max_cache_size: usize,
    #[serde(default = "default_embedding_ttl_secs", rename = "embeddingTtlSecs")]
    pub embedding_ttl_secs: u64,
    #[serde(default = "default_min_similarity", rename = "minSimilarity")]
    pub min_similarity: f32,
    #[serde(
        default = "default_cleanup_interval_secs",
        rename = "cleanupIntervalSecs"
    )]
    pub cleanup_interval_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_entries: default_rag_max_entries(),
            max_cache_size: default_rag_max_cache_size(),
            embedding_ttl_secs: default_embedding_ttl_secs(),
            min_similarity: default_min_similarity(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl RagConfig {
    pub fn embedding_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.embedding_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }
}
