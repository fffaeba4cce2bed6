use serde::{Deserialize, Serialize};

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`            — printed normally via `&self.field_name`
/// - `redact(field_name)`    — `String` field: shows `[empty]` or `[REDACTED]`
/// - `redact_option(field_name)` — `Option<String>` field: shows `None` or `Some("[REDACTED]")`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, redact_option($field:ident)) => {
        $builder.field(
            stringify!($field),
            &$self.$field.as_ref().map(|_| "[REDACTED]"),
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, redact_option($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact_option($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

mod agent;
mod providers;
mod runtime;

pub use agent::*;
pub use providers::*;
pub use runtime::*;
pub use crate::scratchpad::ScratchpadConfig;

fn default_true() -> bool {
    true
}

/// Top-level config file shape. Every field is `Default`-derivable so a
/// missing or empty config file yields a fully functional runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default, rename = "subAgent")]
    pub sub_agent: SubAgentConfig,
    #[serde(default)]
    pub scratchpad: ScratchpadConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub rag: RagConfig,
    /// Anthropic credentials. Never part of the file's declarative surface —
    /// see `ProvidersConfig`.
    #[serde(skip)]
    pub providers: ProvidersConfig,
}

impl Config {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), crate::errors::BuckleyError> {
        use crate::errors::BuckleyError;

        if self.coordinator.max_iterations == 0 {
            return Err(BuckleyError::InvalidArgument(
                "coordinator.maxIterations must be > 0".into(),
            ));
        }
        if self.coordinator.confidence_threshold < 0.0 || self.coordinator.confidence_threshold > 1.0
        {
            return Err(BuckleyError::InvalidArgument(
                "coordinator.confidenceThreshold must be between 0.0 and 1.0".into(),
            ));
        }
        if self.sub_agent.max_concurrent == 0 {
            return Err(BuckleyError::InvalidArgument(
                "subAgent.maxConcurrent must be > 0".into(),
            ));
        }
        if self.scratchpad.max_entries == 0 {
            return Err(BuckleyError::InvalidArgument(
                "scratchpad.maxEntriesMemory must be > 0".into(),
            ));
        }
        if self.dispatcher.max_concurrent == 0 {
            return Err(BuckleyError::InvalidArgument(
                "dispatcher.maxConcurrent must be > 0".into(),
            ));
        }
        if self.rag.min_similarity < 0.0 || self.rag.min_similarity > 1.0 {
            return Err(BuckleyError::InvalidArgument(
                "rag.minSimilarity must be between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }

    /// The Anthropic API key, if one was supplied via env var or keyring.
    /// `model` is accepted for call-site symmetry with the prior
    /// multi-provider resolver but is unused: there is only one provider.
    pub fn get_api_key(&self, _model: Option<&str>) -> Option<&str> {
        self.providers.get_api_key()
    }

    /// Collect all non-empty secret values for leak-surface auditing.
    pub fn collect_secrets(&self) -> Vec<(&str, &str)> {
        let candidates: &[(&str, &str)] = &[("anthropic_api_key", &self.providers.anthropic.api_key)];
        candidates
            .iter()
            .copied()
            .filter(|&(_, v)| !v.is_empty())
            .collect()
    }
}
