//! Ordering of requested analyses by their prerequisites.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::info;

use super::registry::AnalysisRegistry;
use crate::error::AnalysisError;

/// Analyses to run, in order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionPlan {
    pub order: Vec<String>,
    /// Prerequisites pulled in without being requested.
    pub auto_added: Vec<String>,
}

impl ExecutionPlan {
    pub fn contains(&self, name: &str) -> bool {
        self.order.iter().any(|n| n == name)
    }
}

/// Close `requested` over its prerequisites and order it so every analysis
/// runs after the ones it requires. Ties are broken lexicographically.
pub fn resolve<S: AsRef<str>>(
    requested: &[S],
    registry: &AnalysisRegistry,
    auto_prerequisites: bool,
) -> Result<ExecutionPlan, AnalysisError> {
    let mut selected: BTreeSet<String> = BTreeSet::new();
    for name in requested {
        let name = name.as_ref();
        registry.get(name)?;
        selected.insert(name.to_string());
    }

    let mut auto_added = Vec::new();
    let mut pending: Vec<String> = selected.iter().cloned().collect();
    while let Some(name) = pending.pop() {
        for prerequisite in &registry.get(&name)?.prerequisites {
            if !registry.contains(prerequisite) {
                return Err(AnalysisError::UnknownPrerequisite {
                    analysis: name.clone(),
                    prerequisite: prerequisite.clone(),
                });
            }
            if selected.contains(prerequisite) {
                continue;
            }
            if !auto_prerequisites {
                return Err(AnalysisError::MissingPrerequisite {
                    analysis: name.clone(),
                    prerequisite: prerequisite.clone(),
                });
            }
            info!(
                "Adding analysis \"{}\", it is required by \"{}\"",
                prerequisite, name
            );
            selected.insert(prerequisite.clone());
            auto_added.push(prerequisite.clone());
            pending.push(prerequisite.clone());
        }
    }

    // edges point from a prerequisite to the analyses requiring it
    let mut graph: DiGraph<&str, ()> = DiGraph::with_capacity(selected.len(), selected.len());
    let nodes: BTreeMap<&str, NodeIndex> = selected
        .iter()
        .map(|name| (name.as_str(), graph.add_node(name.as_str())))
        .collect();
    for (name, &node) in &nodes {
        for prerequisite in &registry.get(name)?.prerequisites {
            if let Some(&from) = nodes.get(prerequisite.as_str()) {
                graph.update_edge(from, node, ());
            }
        }
    }

    // in-degree counts prerequisites still to be emitted
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|node| (node, graph.neighbors_directed(node, Direction::Incoming).count()))
        .collect();

    let mut frontier: BinaryHeap<Reverse<(&str, NodeIndex)>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(&node, _)| Reverse((graph[node], node)))
        .collect();

    let mut order = Vec::with_capacity(selected.len());
    while let Some(Reverse((name, node))) = frontier.pop() {
        order.push(name.to_string());
        for dependent in graph.neighbors_directed(node, Direction::Outgoing) {
            if let Some(degree) = in_degree.get_mut(&dependent) {
                *degree -= 1;
                if *degree == 0 {
                    frontier.push(Reverse((graph[dependent], dependent)));
                }
            }
        }
    }

    if order.len() < selected.len() {
        let mut unresolved: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(node, _)| graph[node].to_string())
            .collect();
        unresolved.sort();
        return Err(AnalysisError::DependencyCycle {
            cycles: cycles_of(&graph),
            unresolved,
        });
    }

    auto_added.sort();
    Ok(ExecutionPlan { order, auto_added })
}

/// Members of every cycle in the graph, each sorted, self-requirements included.
fn cycles_of(graph: &DiGraph<&str, ()>) -> Vec<Vec<String>> {
    let mut cycles: Vec<Vec<String>> = tarjan_scc(graph)
        .into_iter()
        .filter(|component| match component.as_slice() {
            [single] => graph.contains_edge(*single, *single),
            _ => true,
        })
        .map(|component| {
            let mut members: Vec<String> =
                component.iter().map(|&node| graph[node].to_string()).collect();
            members.sort();
            members
        })
        .collect();
    cycles.sort();
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::descriptor::Analysis;
    use crate::data::filters::{by_type, shared};
    use crate::data::{Data, IdentifierKind};

    fn analysis(name: &str, prerequisites: &[&str]) -> Analysis {
        Analysis::simple(name, shared(by_type(IdentifierKind::Source, true)), |_, _| {
            Ok(Data::Empty)
        })
        .requires(prerequisites.iter().copied())
    }

    fn registry(analyses: Vec<Analysis>) -> AnalysisRegistry {
        let mut registry = AnalysisRegistry::new();
        for a in analyses {
            registry.register(a).unwrap();
        }
        registry
    }

    #[test]
    fn test_auto_adds_prerequisites_in_order() {
        let registry = registry(vec![
            analysis("A", &[]),
            analysis("B", &["A"]),
            analysis("C", &["B"]),
        ]);
        let plan = resolve(&["C"], &registry, true).unwrap();
        assert_eq!(plan.order, vec!["A", "B", "C"]);
        assert_eq!(plan.auto_added, vec!["A", "B"]);
    }

    #[test]
    fn test_missing_prerequisite_without_auto() {
        let registry = registry(vec![analysis("A", &[]), analysis("B", &["A"])]);
        assert_eq!(
            resolve(&["B"], &registry, false).unwrap_err(),
            AnalysisError::MissingPrerequisite {
                analysis: "B".to_string(),
                prerequisite: "A".to_string(),
            }
        );
        let plan = resolve(&["B", "A"], &registry, false).unwrap();
        assert_eq!(plan.order, vec!["A", "B"]);
        assert!(plan.auto_added.is_empty());
    }

    #[test]
    fn test_shared_prerequisite_order() {
        let registry = registry(vec![
            analysis("A", &[]),
            analysis("B", &["A"]),
            analysis("C", &["A", "B"]),
        ]);
        let plan = resolve(&["C"], &registry, true).unwrap();
        assert_eq!(plan.order, vec!["A", "B", "C"]);
        assert_eq!(plan.auto_added, vec!["A", "B"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let registry = registry(vec![
            analysis("X", &["Y"]),
            analysis("Y", &["X"]),
            analysis("Z", &["X"]),
        ]);
        assert_eq!(
            resolve(&["Z"], &registry, true).unwrap_err(),
            AnalysisError::DependencyCycle {
                cycles: vec![vec!["X".to_string(), "Y".to_string()]],
                unresolved: vec!["X".to_string(), "Y".to_string(), "Z".to_string()],
            }
        );
    }

    #[test]
    fn test_self_requirement_is_a_cycle() {
        let registry = registry(vec![analysis("A", &[]), analysis("S", &["S", "A"])]);
        assert_eq!(
            resolve(&["S", "A"], &registry, true).unwrap_err(),
            AnalysisError::DependencyCycle {
                cycles: vec![vec!["S".to_string()]],
                unresolved: vec!["S".to_string()],
            }
        );
    }

    #[test]
    fn test_unknown_names() {
        let registry = registry(vec![analysis("A", &["ghost"])]);
        assert_eq!(
            resolve(&["nope"], &registry, true).unwrap_err(),
            AnalysisError::UnknownAnalysis("nope".to_string())
        );
        assert!(matches!(
            resolve(&["A"], &registry, true),
            Err(AnalysisError::UnknownPrerequisite { .. })
        ));
    }

    #[test]
    fn test_order_is_deterministic() {
        let registry = registry(vec![
            analysis("d", &["a"]),
            analysis("c", &[]),
            analysis("b", &["a"]),
            analysis("a", &[]),
        ]);
        let first = resolve(&["d", "c", "b"], &registry, true).unwrap();
        for _ in 0..10 {
            assert_eq!(resolve(&["b", "d", "c"], &registry, true).unwrap(), first);
        }
        assert_eq!(first.order, vec!["a", "b", "c", "d"]);
    }
}
