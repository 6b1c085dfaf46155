use super::types::{qualify, CheckSpec, OutputMatcher, RegistryDefinition, StateTransition};
use super::REGISTRY_SCHEMA_VERSION;
use crate::check::parse_json_path;
use crate::error::EngineError;
use regex::Regex;
use std::collections::BTreeSet;

/// Validate structural integrity of a registry definition.
///
/// All problems are collected so a broken registry is fixed in one pass.
pub(super) fn validate_definition(def: &RegistryDefinition) -> Result<(), EngineError> {
    let mut problems = Vec::new();
    if def.schema_version != REGISTRY_SCHEMA_VERSION {
        problems.push(format!(
            "unsupported registry schema_version {}",
            def.schema_version
        ));
    }

    let mut feature_ids = BTreeSet::new();
    let mut item_ids = BTreeSet::new();
    for feature in &def.features {
        if !valid_id(&feature.id) {
            problems.push(format!("invalid feature id {:?}", feature.id));
        }
        if !feature_ids.insert(feature.id.as_str()) {
            problems.push(format!("duplicate feature id {:?}", feature.id));
        }
        let mut local = BTreeSet::new();
        for item in &feature.items {
            if !valid_id(&item.id) {
                problems.push(format!(
                    "invalid item id {:?} in feature {:?}",
                    item.id, feature.id
                ));
            }
            if !local.insert(item.id.as_str()) {
                problems.push(format!(
                    "duplicate item id {:?} in feature {:?}",
                    item.id, feature.id
                ));
            }
            item_ids.insert(qualify(&feature.id, &item.id));
        }
    }

    for feature in &def.features {
        for dep in &feature.depends_on {
            if dep == &feature.id {
                problems.push(format!("feature {:?} depends on itself", feature.id));
            } else if !feature_ids.contains(dep.as_str()) {
                problems.push(format!(
                    "feature {:?} depends on unknown feature {:?}",
                    feature.id, dep
                ));
            }
        }
        for item in &feature.items {
            let id = qualify(&feature.id, &item.id);
            for dep in &item.depends_on {
                if !item_ids.contains(&qualify(&feature.id, dep)) {
                    problems.push(format!("item {id:?} depends on unknown item {dep:?}"));
                }
            }
            match &item.check {
                Some(CheckSpec::Assert(assertion)) => {
                    check_command(&id, &assertion.command, &mut problems);
                    match &assertion.output {
                        Some(OutputMatcher::Regex { pattern, .. }) => {
                            check_regex(&id, pattern, &mut problems);
                        }
                        Some(OutputMatcher::JsonPath { path, .. }) => {
                            if let Err(err) = parse_json_path(path) {
                                problems.push(format!("item {id:?}: {err}"));
                            }
                        }
                        _ => {}
                    }
                    for matcher in &assertion.invalidated_by {
                        if let Some(pattern) = &matcher.arg_pattern {
                            check_regex(&id, pattern, &mut problems);
                        }
                    }
                }
                Some(CheckSpec::Scenario { scenario }) => {
                    if !def.scenarios.contains_key(scenario) {
                        problems.push(format!(
                            "item {id:?} references unknown scenario {scenario:?}"
                        ));
                    }
                }
                None => {}
            }
        }
    }

    for (name, scenario) in &def.scenarios {
        let label = format!("scenario {name}");
        if scenario.steps.is_empty() {
            problems.push(format!("{label} has no steps"));
        }
        for matcher in &scenario.invalidated_by {
            if let Some(pattern) = &matcher.arg_pattern {
                check_regex(&label, pattern, &mut problems);
            }
        }
        for resource in &scenario.resources {
            if !def.resources.contains_key(resource) {
                problems.push(format!("{label} uses unknown resource {resource:?}"));
            }
        }
        for step in &scenario.steps {
            check_command(&label, &step.invoke, &mut problems);
            if let Some(capture) = &step.capture {
                check_command(&label, capture, &mut problems);
            }
            if let StateTransition::AfterMatches { pattern } = &step.expect {
                check_regex(&label, pattern, &mut problems);
            }
            if step.capture.is_none() && step.expect != StateTransition::Any {
                problems.push(format!(
                    "{label} step {:?} expects a state transition but has no capture",
                    step.name
                ));
            }
        }
    }

    for (name, resource) in &def.resources {
        if let Some(probe) = &resource.probe {
            check_command(&format!("resource {name}"), probe, &mut problems);
        }
    }

    for rule in &def.auto_resolve {
        if let Some(pattern) = &rule.on.arg_pattern {
            check_regex("auto_resolve", pattern, &mut problems);
        }
        for target in &rule.resolves {
            if !item_ids.contains(target) {
                problems.push(format!(
                    "auto_resolve rule for {:?} resolves unknown item {target:?}",
                    rule.on.command
                ));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(EngineError::MalformedRegistry(problems.join("; ")))
    }
}

fn valid_id(id: &str) -> bool {
    !id.trim().is_empty() && !id.contains('/') && !id.chars().any(char::is_whitespace)
}

fn check_command(label: &str, command: &str, problems: &mut Vec<String>) {
    match shell_words::split(command) {
        Ok(argv) if !argv.is_empty() => {}
        Ok(_) => problems.push(format!("{label} has an empty command")),
        Err(err) => problems.push(format!("{label} command {command:?} does not parse: {err}")),
    }
}

fn check_regex(label: &str, pattern: &str, problems: &mut Vec<String>) {
    if let Err(err) = Regex::new(pattern) {
        problems.push(format!("{label} has invalid regex {pattern:?}: {err}"));
    }
}
