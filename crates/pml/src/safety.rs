// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Safety oracle: which tools may be pre-executed, which need validation.
//!
//! The oracle consumes a tool-permissions table and answers two questions:
//! [`SafetyOracle::can_speculate`] and [`SafetyOracle::requires_validation`].
//! On tools present in the table the two predicates are complements; unknown
//! tools are always conservative (never speculate, always validate).
//!
//! Capability ids (`cap:` prefix) denote composites; `can_speculate` over a
//! capability is the conjunction over its member tools.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Approval routing for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// May run without a human decision.
    #[default]
    Auto,
    /// Requires a human-in-the-loop decision.
    Hil,
}

/// Access scope granted to a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    #[default]
    Minimal,
    Elevated,
}

/// One row of the permissions table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPermissions {
    #[serde(default)]
    pub approval: ApprovalMode,
    #[serde(default)]
    pub scope: PermissionScope,
    #[serde(default)]
    pub read_only: bool,
    /// Argument renames applied after resolution, `from_field` to `to_field`.
    #[serde(default)]
    pub field_mappings: BTreeMap<String, String>,
}

impl ToolPermissions {
    /// Permissions for a read-only, auto-approved tool.
    pub fn read_only_auto() -> Self {
        Self {
            approval: ApprovalMode::Auto,
            scope: PermissionScope::Minimal,
            read_only: true,
            field_mappings: BTreeMap::new(),
        }
    }

    /// Permissions for a mutating tool gated on human approval.
    pub fn hil_gated() -> Self {
        Self {
            approval: ApprovalMode::Hil,
            scope: PermissionScope::Elevated,
            read_only: false,
            field_mappings: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field_mapping(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.field_mappings.insert(from.into(), to.into());
        self
    }
}

/// Source of the permissions table. Embedders feed it from config files or a
/// registry; [`StaticPermissions`] backs tests and simple deployments.
pub trait PermissionsSource: Send + Sync {
    /// Look up a single tool. `None` means unknown, which the oracle treats
    /// conservatively.
    fn permissions(&self, tool: &str) -> Option<ToolPermissions>;

    /// Member tools of a capability id, `None` when unknown.
    fn capability_members(&self, capability: &str) -> Option<Vec<String>> {
        let _ = capability;
        None
    }
}

/// Fixed in-memory permissions table.
#[derive(Default, Clone)]
pub struct StaticPermissions {
    tools: HashMap<String, ToolPermissions>,
    capabilities: HashMap<String, Vec<String>>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>, perms: ToolPermissions) -> Self {
        self.tools.insert(tool.into(), perms);
        self
    }

    #[must_use]
    pub fn with_capability<I, S>(mut self, capability: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.insert(
            capability.into(),
            members.into_iter().map(Into::into).collect(),
        );
        self
    }
}

impl PermissionsSource for StaticPermissions {
    fn permissions(&self, tool: &str) -> Option<ToolPermissions> {
        self.tools.get(tool).cloned()
    }

    fn capability_members(&self, capability: &str) -> Option<Vec<String>> {
        self.capabilities.get(capability).cloned()
    }
}

/// Decides speculation eligibility and validation requirements.
#[derive(Clone)]
pub struct SafetyOracle {
    source: Arc<dyn PermissionsSource>,
}

impl SafetyOracle {
    pub fn new(source: Arc<dyn PermissionsSource>) -> Self {
        Self { source }
    }

    /// True iff the tool is known, auto-approved, read-only, and the task
    /// itself carries no side effects. Capabilities require every member to
    /// pass.
    pub fn can_speculate(&self, tool_or_capability: &str, side_effects: bool) -> bool {
        if side_effects {
            return false;
        }
        if let Some(members) = self.source.capability_members(tool_or_capability) {
            return !members.is_empty()
                && members.iter().all(|member| self.tool_speculatable(member));
        }
        self.tool_speculatable(tool_or_capability)
    }

    fn tool_speculatable(&self, tool: &str) -> bool {
        match self.source.permissions(tool) {
            Some(perms) => perms.approval == ApprovalMode::Auto && perms.read_only,
            None => false,
        }
    }

    /// True iff the tool is unknown, HIL-gated, or mutating. The complement
    /// of [`Self::can_speculate`] on known tools.
    pub fn requires_validation(&self, tool: &str) -> bool {
        match self.source.permissions(tool) {
            Some(perms) => perms.approval == ApprovalMode::Hil || !perms.read_only,
            None => true,
        }
    }

    /// Whether the invoker may auto-retry transient failures for this tool.
    pub fn is_read_only(&self, tool: &str) -> bool {
        self.source
            .permissions(tool)
            .map(|p| p.read_only)
            .unwrap_or(false)
    }

    /// Field renames declared for a tool, empty for unknown tools.
    pub fn field_mappings(&self, tool: &str) -> BTreeMap<String, String> {
        self.source
            .permissions(tool)
            .map(|p| p.field_mappings)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> SafetyOracle {
        let table = StaticPermissions::new()
            .with_tool("fs:read_file", ToolPermissions::read_only_auto())
            .with_tool("github:push", ToolPermissions::hil_gated())
            .with_tool(
                "fs:write_file",
                ToolPermissions {
                    approval: ApprovalMode::Auto,
                    scope: PermissionScope::Minimal,
                    read_only: false,
                    field_mappings: BTreeMap::new(),
                },
            )
            .with_capability("cap:summarize_file", ["fs:read_file", "llm:summarize"])
            .with_capability("cap:read_twice", ["fs:read_file", "fs:read_file"])
            .with_tool("llm:summarize", ToolPermissions::read_only_auto());
        SafetyOracle::new(Arc::new(table))
    }

    #[test]
    fn read_only_auto_tool_is_speculatable() {
        assert!(oracle().can_speculate("fs:read_file", false));
    }

    #[test]
    fn side_effects_flag_blocks_speculation_unconditionally() {
        assert!(!oracle().can_speculate("fs:read_file", true));
    }

    #[test]
    fn hil_tool_is_never_speculatable() {
        assert!(!oracle().can_speculate("github:push", false));
    }

    #[test]
    fn mutating_auto_tool_is_not_speculatable_but_auto_approved() {
        let oracle = oracle();
        assert!(!oracle.can_speculate("fs:write_file", false));
        assert!(oracle.requires_validation("fs:write_file"));
    }

    #[test]
    fn unknown_tool_is_conservative_on_both_predicates() {
        let oracle = oracle();
        assert!(!oracle.can_speculate("mystery:tool", false));
        assert!(oracle.requires_validation("mystery:tool"));
    }

    #[test]
    fn predicates_are_complements_on_known_tools() {
        let oracle = oracle();
        for tool in ["fs:read_file", "github:push", "fs:write_file", "llm:summarize"] {
            assert_eq!(
                oracle.can_speculate(tool, false),
                !oracle.requires_validation(tool),
                "mismatch for {tool}"
            );
        }
    }

    #[test]
    fn capability_is_conjunctive_over_members() {
        let oracle = oracle();
        assert!(oracle.can_speculate("cap:summarize_file", false));
        assert!(oracle.can_speculate("cap:read_twice", false));

        let with_push = StaticPermissions::new()
            .with_tool("fs:read_file", ToolPermissions::read_only_auto())
            .with_tool("github:push", ToolPermissions::hil_gated())
            .with_capability("cap:read_and_push", ["fs:read_file", "github:push"]);
        let oracle = SafetyOracle::new(Arc::new(with_push));
        assert!(!oracle.can_speculate("cap:read_and_push", false));
    }

    #[test]
    fn empty_capability_is_not_speculatable() {
        let table =
            StaticPermissions::new().with_capability("cap:empty", Vec::<String>::new());
        let oracle = SafetyOracle::new(Arc::new(table));
        assert!(!oracle.can_speculate("cap:empty", false));
    }

    #[test]
    fn field_mappings_surface_through_the_oracle() {
        let table = StaticPermissions::new().with_tool(
            "fs:read_file",
            ToolPermissions::read_only_auto().with_field_mapping("path", "file_path"),
        );
        let oracle = SafetyOracle::new(Arc::new(table));
        let mappings = oracle.field_mappings("fs:read_file");
        assert_eq!(mappings.get("path").map(String::as_str), Some("file_path"));
    }
}
