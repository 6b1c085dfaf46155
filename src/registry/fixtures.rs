//! Builders for registry definitions used across unit tests.
use super::*;

pub(crate) fn assert_item(id: &str, command: &str) -> ChecklistItem {
    ChecklistItem {
        id: id.to_string(),
        title: String::new(),
        automatable: true,
        category: Category::Automatable,
        check: Some(CheckSpec::Assert(assertion(command))),
        depends_on: Vec::new(),
        skip_if_missing: false,
    }
}

pub(crate) fn assertion(command: &str) -> Assertion {
    Assertion {
        command: command.to_string(),
        expect_exit_code: 0,
        output: None,
        timeout_seconds: None,
        requires_tools: Vec::new(),
        env: BTreeMap::new(),
        invalidated_by: Vec::new(),
    }
}

pub(crate) fn manual_item(id: &str) -> ChecklistItem {
    ChecklistItem {
        id: id.to_string(),
        title: String::new(),
        automatable: false,
        category: Category::HumanRequired,
        check: None,
        depends_on: Vec::new(),
        skip_if_missing: false,
    }
}

pub(crate) fn scenario_item(id: &str, scenario: &str) -> ChecklistItem {
    ChecklistItem {
        id: id.to_string(),
        title: String::new(),
        automatable: true,
        category: Category::Automatable,
        check: Some(CheckSpec::Scenario {
            scenario: scenario.to_string(),
        }),
        depends_on: Vec::new(),
        skip_if_missing: false,
    }
}

pub(crate) fn with_deps(mut item: ChecklistItem, deps: &[&str]) -> ChecklistItem {
    item.depends_on = deps.iter().map(|dep| dep.to_string()).collect();
    item
}

pub(crate) fn feature(id: &str, items: Vec<ChecklistItem>) -> Feature {
    Feature {
        id: id.to_string(),
        name: id.to_string(),
        depends_on: Vec::new(),
        capability: None,
        items,
    }
}

pub(crate) fn definition(features: Vec<Feature>) -> RegistryDefinition {
    RegistryDefinition {
        schema_version: REGISTRY_SCHEMA_VERSION,
        features,
        scenarios: BTreeMap::new(),
        resources: BTreeMap::new(),
        tools: BTreeMap::new(),
        auto_resolve: Vec::new(),
        capabilities_probe: None,
    }
}

pub(crate) fn registry(features: Vec<Feature>) -> Registry {
    Registry::new(definition(features), BTreeMap::new()).expect("valid registry")
}

pub(crate) fn verified(result: LastResult) -> ItemState {
    ItemState {
        verified: true,
        last_result: Some(result),
        ..ItemState::default()
    }
}

pub(crate) fn failed() -> ItemState {
    ItemState {
        verified: false,
        last_result: Some(LastResult::Failed),
        ..ItemState::default()
    }
}
