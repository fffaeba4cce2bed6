use serde::{Deserialize, Serialize};

/// Credentials and endpoint override for the Anthropic chat provider.
///
/// Never deserialized from or serialized to the config file — see
/// `ProvidersConfig`. Populated exclusively by `apply_env_overrides`
/// (`BUCKLEY_ANTHROPIC_API_KEY`) or, with the `keyring-store` feature, the
/// OS keychain.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default, rename = "apiBase")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub headers: std::collections::HashMap<String, String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted_headers: std::collections::HashMap<&String, &str> =
            self.headers.keys().map(|k| (k, "[REDACTED]")).collect();
        f.debug_struct("ProviderConfig")
            .field(
                "api_key",
                &if self.api_key.is_empty() {
                    "[empty]"
                } else {
                    "[REDACTED]"
                },
            )
            .field("api_base", &self.api_base)
            .field("headers", &redacted_headers)
            .finish()
    }
}

/// Holds the single Anthropic provider's credentials.
///
/// Deliberately absent from the declarative config surface: the whole
/// struct is `#[serde(skip)]`ed on `Config::providers`, so it can never be
/// read from or written to `config.toml`. The API key reaches the process
/// only through an environment variable (`BUCKLEY_ANTHROPIC_API_KEY`) or
/// the OS keyring, applied after the file is loaded.
#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig {
    pub anthropic: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get_api_key(&self) -> Option<&str> {
        if self.anthropic.api_key.is_empty() {
            None
        } else {
            Some(&self.anthropic.api_key)
        }
    }
}
