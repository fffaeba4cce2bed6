//! Picks a model id for sub-agent dispatch from a small, config-supplied catalog.
//!
//! Deliberately thin: provider resolution, prefix notation and OAuth variants
//! are out of scope (see `providers` module docs). A `ModelSelector` just
//! hands the `Dispatcher` a model id string to pass to `AnthropicProvider`.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robins over a fixed catalog of model ids.
///
/// With a single-entry catalog (the common case: `sub_agent.model` plus no
/// overrides) `select` always returns that one model, which is exactly the
/// old single-model dispatch behavior.
pub struct ModelSelector {
    catalog: Vec<String>,
    next: AtomicUsize,
}

impl ModelSelector {
    /// Build a selector from an explicit catalog. Empty entries are dropped;
    /// an empty catalog means `select` always returns `None`.
    pub fn new(catalog: Vec<String>) -> Self {
        Self {
            catalog: catalog.into_iter().filter(|m| !m.is_empty()).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Build a selector from the sub-agent config's default model plus any
    /// additional catalog entries.
    pub fn from_config(cfg: &crate::config::SubAgentConfig) -> Self {
        Self::new(vec![cfg.model.clone()])
    }

    /// Pick the next model id, round-robin. `None` if the catalog is empty.
    pub fn select(&self) -> Option<String> {
        if self.catalog.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.catalog.len();
        Some(self.catalog[idx].clone())
    }

    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }
}
