use serde::{Deserialize, Serialize};

fn default_coordinator_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_iterations() -> usize {
    25
}

fn default_max_wall_time_secs() -> u64 {
    600
}

fn default_confidence_threshold() -> f32 {
    0.8
}

/// Declarative config for the Coordinator Runtime (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_coordinator_model")]
    pub model: String,
    #[serde(default = "default_max_iterations", rename = "maxIterations")]
    pub max_iterations: usize,
    /// 0 means unlimited.
    #[serde(default, rename = "maxTokensBudget")]
    pub max_tokens_budget: u64,
    #[serde(default = "default_max_wall_time_secs", rename = "maxWallTimeSecs")]
    pub max_wall_time_secs: u64,
    #[serde(
        default = "default_confidence_threshold",
        rename = "confidenceThreshold"
    )]
    pub confidence_threshold: f32,
    #[serde(default, rename = "streamPartials")]
    pub stream_partials: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            model: default_coordinator_model(),
            max_iterations: default_max_iterations(),
            max_tokens_budget: 0,
            max_wall_time_secs: default_max_wall_time_secs(),
            confidence_threshold: default_confidence_threshold(),
            stream_partials: false,
        }
    }
}

impl CoordinatorConfig {
    pub fn max_wall_time(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.max_wall_time_secs)
    }
}

fn default_subagent_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_subagent_max_concurrent() -> usize {
    5
}

fn default_subagent_timeout_secs() -> u64 {
    300
}

fn default_subagent_max_iterations() -> usize {
    25
}

/// Declarative config for SubAgent execution (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentConfig {
    #[serde(default = "default_subagent_model")]
    pub model: String,
    #[serde(default = "default_subagent_max_concurrent", rename = "maxConcurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_subagent_timeout_secs", rename = "timeoutSecs")]
    pub timeout_secs: u64,
    #[serde(
        default = "default_subagent_max_iterations",
        rename = "maxIterations"
    )]
    pub max_iterations: usize,
    /// Tool names allowed for sub-agents, further intersected with the
    /// registry and the tool policy at dispatch time.
    #[serde(default, rename = "allowedTools")]
    pub allowed_tools: Vec<String>,
}

impl Default for SubAgentConfig {
    fn default() -> Self {
        Self {
            model: default_subagent_model(),
            max_concurrent: default_subagent_max_concurrent(),
            timeout_secs: default_subagent_timeout_secs(),
            max_iterations: default_subagent_max_iterations(),
            allowed_tools: Vec::new(),
        }
    }
}

impl SubAgentConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}
