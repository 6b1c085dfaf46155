//! Dependency-aware execution planning.
//!
//! Turns the `depends_on` graph of a requested scope into deterministic
//! execution waves:
//! - traversal always picks the lexicographically smallest ready id,
//! - a dependency already verified (and not ignored) is satisfied and not rerun,
//! - statically unsatisfiable dependencies block their dependents with the
//!   offending id recorded,
//! - a cycle blocks only the weakly connected component it lives in.
use crate::error::EngineError;
use crate::registry::{Category, Registry};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// Requested verification scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Category(Category),
    Item(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::All => f.write_str("all"),
            Scope::Category(category) => write!(f, "category={category}"),
            Scope::Item(id) => write!(f, "item={id}"),
        }
    }
}

/// Why a planned item will not execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockReason {
    DependencyUnmet { dependency: String },
    CycleDetected { cycle: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedItem {
    pub item_id: String,
    pub reason: BlockReason,
}

/// Linear execution order for a scope, grouped into waves.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub scope: String,
    /// Items explicitly covered by the scope (dependencies pulled in are not).
    pub requested: BTreeSet<String>,
    pub waves: Vec<Vec<String>>,
    pub blocked: Vec<BlockedItem>,
    /// Participants of each detected cycle.
    pub cycles: Vec<Vec<String>>,
}

impl ExecutionPlan {
    /// Flat execution order (wave by wave).
    pub fn order(&self) -> Vec<String> {
        self.waves.iter().flatten().cloned().collect()
    }

    #[cfg(test)]
    pub fn blocked_reason(&self, id: &str) -> Option<&BlockReason> {
        self.blocked
            .iter()
            .find(|blocked| blocked.item_id == id)
            .map(|blocked| &blocked.reason)
    }
}

/// Build the execution plan for a scope. Pure over the registry.
pub fn resolve_plan(
    registry: &Registry,
    scope: &Scope,
    now_epoch_ms: u128,
) -> Result<ExecutionPlan, EngineError> {
    let requested = scope_items(registry, scope)?;

    // Closure over unsatisfied dependencies.
    let mut planned: BTreeSet<String> = BTreeSet::new();
    let mut static_unmet: BTreeMap<String, String> = BTreeMap::new();
    let mut queue: VecDeque<String> = requested.iter().cloned().collect();
    while let Some(id) = queue.pop_front() {
        if !planned.insert(id.clone()) {
            continue;
        }
        let entry = registry.require_entry(&id)?;
        for dep in &entry.depends_on {
            let dep_entry = registry.require_entry(dep)?;
            let dep_state = registry.state(dep);
            if dep_state.active_ignore(now_epoch_ms).is_some() {
                static_unmet.entry(id.clone()).or_insert_with(|| dep.clone());
                continue;
            }
            if dep_state.verified {
                continue;
            }
            if dep_entry.category() == Category::HumanRequired {
                static_unmet.entry(id.clone()).or_insert_with(|| dep.clone());
                continue;
            }
            if !planned.contains(dep) {
                queue.push_back(dep.clone());
            }
        }
    }

    // Edges restricted to planned items: dep -> dependents.
    let mut deps_in_plan: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for id in &planned {
        let deps = registry
            .require_entry(id)?
            .depends_on
            .iter()
            .filter(|dep| planned.contains(*dep))
            .cloned()
            .collect();
        deps_in_plan.insert(id.clone(), deps);
    }

    let mut blocked: BTreeMap<String, BlockReason> = BTreeMap::new();
    let mut cycles = Vec::new();
    for component in weak_components(&deps_in_plan) {
        let sccs = cyclic_sccs(&component, &deps_in_plan);
        if sccs.is_empty() {
            continue;
        }
        let cycle: Vec<String> = sccs.iter().flatten().cloned().collect();
        tracing::warn!(cycle = ?cycle, "dependency cycle detected");
        for id in &component {
            blocked.insert(
                id.clone(),
                BlockReason::CycleDetected {
                    cycle: cycle.clone(),
                },
            );
        }
        cycles.extend(sccs);
    }

    if !requested.is_empty() && requested.iter().all(|id| blocked.contains_key(id)) {
        let ids: BTreeSet<String> = cycles.iter().flatten().cloned().collect();
        return Err(EngineError::CycleDetected {
            ids: ids.into_iter().collect(),
        });
    }

    let acyclic: BTreeSet<String> = planned
        .iter()
        .filter(|id| !blocked.contains_key(*id))
        .cloned()
        .collect();
    let topo = topological_order(&acyclic, &deps_in_plan);

    let mut wave_by_id: BTreeMap<String, usize> = BTreeMap::new();
    let mut waves: Vec<Vec<String>> = Vec::new();
    for id in topo {
        let deps = deps_in_plan.get(&id).map(Vec::as_slice).unwrap_or_default();
        if let Some(dep) = static_unmet.get(&id) {
            blocked.insert(
                id.clone(),
                BlockReason::DependencyUnmet {
                    dependency: dep.clone(),
                },
            );
            continue;
        }
        if let Some(dep) = deps.iter().find(|dep| blocked.contains_key(*dep)) {
            blocked.insert(
                id.clone(),
                BlockReason::DependencyUnmet {
                    dependency: dep.clone(),
                },
            );
            continue;
        }
        let wave = deps
            .iter()
            .filter_map(|dep| wave_by_id.get(dep).copied())
            .max()
            .map_or(0, |parent| parent + 1);
        wave_by_id.insert(id.clone(), wave);
        if waves.len() <= wave {
            waves.resize_with(wave + 1, Vec::new);
        }
        waves[wave].push(id);
    }
    for wave in &mut waves {
        wave.sort();
    }

    Ok(ExecutionPlan {
        scope: scope.to_string(),
        requested,
        waves,
        blocked: blocked
            .into_iter()
            .map(|(item_id, reason)| BlockedItem { item_id, reason })
            .collect(),
        cycles,
    })
}

fn scope_items(registry: &Registry, scope: &Scope) -> Result<BTreeSet<String>, EngineError> {
    Ok(match scope {
        Scope::All => registry.entries().map(|entry| entry.id.clone()).collect(),
        Scope::Category(category) => registry
            .entries()
            .filter(|entry| entry.category() == *category)
            .map(|entry| entry.id.clone())
            .collect(),
        Scope::Item(id) => {
            registry.require_entry(id)?;
            BTreeSet::from([id.clone()])
        }
    })
}

/// Kahn's algorithm; callers pass only acyclic node sets.
fn topological_order(nodes: &BTreeSet<String>, deps: &BTreeMap<String, Vec<String>>) -> Vec<String> {
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for id in nodes {
        let node_deps = deps.get(id).map(Vec::as_slice).unwrap_or_default();
        let count = node_deps.iter().filter(|dep| nodes.contains(*dep)).count();
        indegree.insert(id.as_str(), count);
        for dep in node_deps.iter().filter(|dep| nodes.contains(*dep)) {
            dependents.entry(dep.as_str()).or_default().push(id.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = ready.pop_first() {
        order.push(id.to_string());
        for child in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = indegree.get_mut(child) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    ready.insert(child);
                }
            }
        }
    }
    order
}

fn weak_components(deps: &BTreeMap<String, Vec<String>>) -> Vec<BTreeSet<String>> {
    let mut adjacency: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (id, node_deps) in deps {
        adjacency.entry(id.as_str()).or_default();
        for dep in node_deps {
            adjacency.entry(id.as_str()).or_default().insert(dep.as_str());
            adjacency.entry(dep.as_str()).or_default().insert(id.as_str());
        }
    }

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut components = Vec::new();
    for start in adjacency.keys() {
        if seen.contains(start) {
            continue;
        }
        let mut component = BTreeSet::new();
        let mut stack = vec![*start];
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            component.insert(node.to_string());
            for next in adjacency.get(node).into_iter().flatten() {
                if !seen.contains(next) {
                    stack.push(next);
                }
            }
        }
        components.push(component);
    }
    components
}

/// Strongly connected components that form cycles (size > 1 or self-loop).
fn cyclic_sccs(
    component: &BTreeSet<String>,
    deps: &BTreeMap<String, Vec<String>>,
) -> Vec<Vec<String>> {
    struct Tarjan<'a> {
        deps: &'a BTreeMap<String, Vec<String>>,
        component: &'a BTreeSet<String>,
        index: usize,
        indices: BTreeMap<&'a str, usize>,
        lowlink: BTreeMap<&'a str, usize>,
        stack: Vec<&'a str>,
        on_stack: BTreeSet<&'a str>,
        found: Vec<Vec<String>>,
    }

    impl<'a> Tarjan<'a> {
        fn visit(&mut self, node: &'a str) {
            self.indices.insert(node, self.index);
            self.lowlink.insert(node, self.index);
            self.index += 1;
            self.stack.push(node);
            self.on_stack.insert(node);

            let next_nodes = self.deps.get(node).map(Vec::as_slice).unwrap_or_default();
            for next in next_nodes {
                let next = next.as_str();
                if !self.component.contains(next) {
                    continue;
                }
                if !self.indices.contains_key(next) {
                    self.visit(next);
                    let low = self.lowlink[node].min(self.lowlink[next]);
                    self.lowlink.insert(node, low);
                } else if self.on_stack.contains(next) {
                    let low = self.lowlink[node].min(self.indices[next]);
                    self.lowlink.insert(node, low);
                }
            }

            if self.lowlink[node] == self.indices[node] {
                let mut scc = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack.remove(member);
                    scc.push(member.to_string());
                    if member == node {
                        break;
                    }
                }
                let self_loop = scc.len() == 1
                    && self
                        .deps
                        .get(node)
                        .is_some_and(|node_deps| node_deps.iter().any(|dep| dep == node));
                if scc.len() > 1 || self_loop {
                    scc.sort();
                    self.found.push(scc);
                }
            }
        }
    }

    let mut tarjan = Tarjan {
        deps,
        component,
        index: 0,
        indices: BTreeMap::new(),
        lowlink: BTreeMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        found: Vec::new(),
    };
    for node in component {
        if !tarjan.indices.contains_key(node.as_str()) {
            tarjan.visit(node.as_str());
        }
    }
    tarjan.found.sort();
    tarjan.found
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
