//! JSON schema types for the registry definition.
//!
//! These types mirror `registry.json` so checks stay declarative data and the
//! engine stays a mechanical executor.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

fn default_true() -> bool {
    true
}

/// Item classification; decides which coverage denominator an item feeds.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Automatable,
    HumanRequired,
    ExternalDependent,
    EnvironmentSpecific,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Automatable,
        Category::HumanRequired,
        Category::ExternalDependent,
        Category::EnvironmentSpecific,
    ];

    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Automatable => "automatable",
            Category::HumanRequired => "human_required",
            Category::ExternalDependent => "external_dependent",
            Category::EnvironmentSpecific => "environment_specific",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
            .ok_or_else(|| {
                format!(
                    "unknown category {value:?} (expected one of automatable, human_required, external_dependent, environment_specific)"
                )
            })
    }
}

/// Registry definition loaded from `registry.json`.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegistryDefinition {
    pub schema_version: u32,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scenarios: BTreeMap<String, ScenarioDef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ResourceDef>,
    /// Installation guidance keyed by tool name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tools: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auto_resolve: Vec<AutoResolveRule>,
    /// Command printing a JSON array of capability names declared by the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities_probe: Option<String>,
}

/// A named capability of the host CLI and its checklist.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Feature {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(default)]
    pub items: Vec<ChecklistItem>,
}

/// A single testable claim about the host CLI.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ChecklistItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub automatable: bool,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Resolve `Skipped` instead of `Failed` when a required resource is absent.
    #[serde(default)]
    pub skip_if_missing: bool,
}

/// Declarative check: a single assertion or a named multi-step scenario.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckSpec {
    Assert(Assertion),
    Scenario { scenario: String },
}

/// Command plus the expectations it must meet.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Assertion {
    pub command: String,
    #[serde(default)]
    pub expect_exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputMatcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Completion events that make a cached result for this check stale.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalidated_by: Vec<EventMatcher>,
}

/// Output stream an output matcher reads.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    #[default]
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        })
    }
}

/// Output predicate applied after the exit code matched.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputMatcher {
    Exact {
        value: String,
        #[serde(default)]
        stream: Stream,
        #[serde(default = "default_true")]
        trim: bool,
    },
    Regex {
        pattern: String,
        #[serde(default)]
        stream: Stream,
    },
    JsonPath {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        equals: Option<serde_json::Value>,
        #[serde(default)]
        stream: Stream,
    },
}

/// Matches a completion event by command name and, optionally, an argument.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EventMatcher {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg_pattern: Option<String>,
}

/// Flip items to verified when a matching host command succeeds.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AutoResolveRule {
    pub on: EventMatcher,
    pub resolves: Vec<String>,
}

/// Multi-step workflow validated via before/after state capture.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDef {
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalidated_by: Vec<EventMatcher>,
}

/// One collaborator invocation and the state transition it must cause.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StepDef {
    pub name: String,
    pub invoke: String,
    #[serde(default)]
    pub expect_exit_code: i32,
    /// Probe command whose output is the captured state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<String>,
    #[serde(default)]
    pub expect: StateTransition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// Expected relation between the before and after snapshots of a step.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateTransition {
    #[default]
    Any,
    Changed,
    Unchanged,
    AfterMatches {
        pattern: String,
    },
    AfterEquals {
        value: String,
    },
}

/// External resource shared between scenarios.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ResourceDef {
    #[serde(default)]
    pub description: String,
    /// Command that exits 0 when the resource is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,
}

/// Qualify a dependency reference relative to its owning feature.
pub fn qualify(feature_id: &str, reference: &str) -> String {
    if reference.contains('/') {
        reference.to_string()
    } else {
        format!("{feature_id}/{reference}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_spec_parses_tagged_assertion_and_scenario() {
        let assert: CheckSpec = serde_json::from_str(
            r#"{"kind":"assert","command":"site list","output":{"kind":"regex","pattern":"^ok"}}"#,
        )
        .expect("parse assert");
        let CheckSpec::Assert(assertion) = assert else {
            panic!("expected assertion");
        };
        assert_eq!(assertion.expect_exit_code, 0);
        assert!(matches!(
            assertion.output,
            Some(OutputMatcher::Regex {
                stream: Stream::Stdout,
                ..
            })
        ));

        let scenario: CheckSpec =
            serde_json::from_str(r#"{"kind":"scenario","scenario":"backup_restore"}"#)
                .expect("parse scenario");
        assert_eq!(
            scenario,
            CheckSpec::Scenario {
                scenario: "backup_restore".to_string()
            }
        );
    }

    #[test]
    fn category_round_trips_through_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
        assert!("manual".parse::<Category>().is_err());
    }

    #[test]
    fn qualify_keeps_qualified_references() {
        assert_eq!(qualify("backup", "create"), "backup/create");
        assert_eq!(qualify("backup", "install/base"), "install/base");
    }
}
