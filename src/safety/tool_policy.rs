//! ToolPolicy & ToolApprover (§4.5): capability→tool allowlist with admin
//! bypass and a bounded audit log.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

const MAX_AUDIT_ENTRIES: usize = 10_000;
const ADMIN_CAPABILITY: &str = "admin";
const WILDCARD_TOOL: &str = "*";

/// Maps a capability name to the set of tool names it grants. `"*"` in the
/// set allows any tool.
#[derive(Debug, Clone, Default)]
pub struct ToolPolicy {
    grants: HashMap<String, HashSet<String>>,
}

impl ToolPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, capability: impl Into<String>, tool: impl Into<String>) {
        self.grants
            .entry(capability.into())
            .or_default()
            .insert(tool.into());
    }

    pub fn is_tool_allowed(&self, capability: &str, tool: &str) -> bool {
        self.grants
            .get(capability)
            .is_some_and(|tools| tools.contains(tool) || tools.contains(WILDCARD_TOOL))
    }

    pub fn is_tool_allowed_for_capabilities(&self, capabilities: &[String], tool: &str) -> bool {
        capabilities
            .iter()
            .any(|cap| self.is_tool_allowed(cap, tool))
    }

    /// The full set of tools a capability set is allowed to use. Returns
    /// `{"*"}` if any capability grants the wildcard.
    pub fn allowed_tools(&self, capabilities: &[String]) -> HashSet<String> {
        let mut allowed = HashSet::new();
        for cap in capabilities {
            if let Some(tools) = self.grants.get(cap) {
                if tools.contains(WILDCARD_TOOL) {
                    return HashSet::from([WILDCARD_TOOL.to_string()]);
                }
                allowed.extend(tools.iter().cloned());
            }
        }
        allowed
    }
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub capabilities: Vec<String>,
    pub tool: String,
    pub allowed: bool,
}

/// Caller-supplied request context: the principal's capabilities for this
/// call.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub capabilities: Vec<String>,
}

pub struct ToolApprover {
    policy: ToolPolicy,
    audit: Mutex<VecDeque<AuditEntry>>,
}

impl ToolApprover {
    pub fn new(policy: ToolPolicy) -> Self {
        Self {
            policy,
            audit: Mutex::new(VecDeque::new()),
        }
    }

    /// Admin capability bypasses all checks. Otherwise any capability
    /// granting the tool allows. Every decision is audited.
    pub fn check_tool_access(&self, ctx: &AuthContext, tool: &str) -> bool {
        let allowed = ctx.capabilities.iter().any(|c| c == ADMIN_CAPABILITY)
            || self
                .policy
                .is_tool_allowed_for_capabilities(&ctx.capabilities, tool);

        let mut audit = self.audit.lock().expect("audit log mutex poisoned");
        if audit.len() >= MAX_AUDIT_ENTRIES {
            audit.pop_front();
        }
        audit.push_back(AuditEntry {
            timestamp: Utc::now(),
            capabilities: ctx.capabilities.clone(),
            tool: tool.to_string(),
            allowed,
        });
        allowed
    }

    /// The full set of tools allowed for this context, `{"*"}` for admin.
    pub fn get_allowed_tools_for_agent(&self, ctx: &AuthContext) -> HashSet<String> {
        if ctx.capabilities.iter().any(|c| c == ADMIN_CAPABILITY) {
            return HashSet::from(["*".to_string()]);
        }
        self.policy.allowed_tools(&ctx.capabilities)
    }

    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit
            .lock()
            .expect("audit log mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }
}
