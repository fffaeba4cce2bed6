pub mod credentials;
pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{
    CircuitConfigDecl, Config, CoordinatorConfig, DispatcherConfig, ProviderConfig,
    ProvidersConfig, RagConfig, ScratchpadConfig, SubAgentConfig,
};

/// Thin facade used by `main.rs` and integration callers; `Config` is the
/// deserialized shape, `AppConfig` is it plus the resolved workspace/home
/// paths computed at load time.
pub type AppConfig = Config;

impl Config {
    /// Load config from the default path (`$BUCKLEY_HOME/config.toml`) with
    /// environment overrides applied, or a validated default if absent.
    pub fn load() -> anyhow::Result<Self> {
        loader::load_config(None)
    }
}
