//! Breadth-first exploration from a seed set, with optional trace capture.

use crate::error::Result;
use crate::model::{GraphTrace, PredicateKind, Subgraph, TraceStep};
use crate::store::{ConceptStore, EdgeFilter};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

/// Options for `traverse`. `seeds` are deduplicated preserving first-seen
/// order before the walk begins.
#[derive(Debug, Clone)]
pub struct TraverseOptions {
    pub predicate_kinds: Option<Vec<PredicateKind>>,
    pub max_depth: usize,
    pub on: Option<chrono::NaiveDate>,
    pub max_nodes: Option<usize>,
    pub trace: bool,
}

impl Default for TraverseOptions {
    fn default() -> Self {
        Self {
            predicate_kinds: None,
            max_depth: 6,
            on: None,
            max_nodes: None,
            trace: false,
        }
    }
}

/// Explores the graph outward from `seeds` via outgoing edges, stopping at
/// `max_depth` hops or `max_nodes` visited nodes, whichever comes first.
pub fn traverse(
    store: &dyn ConceptStore,
    seeds: &[i64],
    options: &TraverseOptions,
) -> Result<(Subgraph, Option<GraphTrace>)> {
    let mut deduped_seeds = Vec::new();
    let mut seen_seeds = HashSet::new();
    for &s in seeds {
        if seen_seeds.insert(s) {
            deduped_seeds.push(s);
        }
    }

    info!(seeds = deduped_seeds.len(), max_depth = options.max_depth, "starting traverse");

    let mut queue: VecDeque<(i64, usize)> = VecDeque::new();
    let mut visited = HashSet::new();
    let mut subgraph = Subgraph::default();
    let mut trace = options.trace.then(|| GraphTrace {
        seeds: deduped_seeds.clone(),
        steps: Vec::new(),
        terminated_reason: None,
    });

    for &seed in &deduped_seeds {
        queue.push_back((seed, 0));
    }

    let mut filter = EdgeFilter::outgoing();
    filter.predicate_kinds = options.predicate_kinds.clone();
    filter.on = options.on;

    while let Some((node, depth)) = queue.pop_front() {
        if visited.contains(&node) {
            continue;
        }
        visited.insert(node);
        subgraph.nodes.insert(node);

        if let Some(max_nodes) = options.max_nodes {
            if visited.len() >= max_nodes {
                debug!(visited = visited.len(), "hit max_nodes");
                if let Some(t) = trace.as_mut() {
                    t.terminated_reason = Some("max_nodes".to_string());
                }
                break;
            }
        }

        if depth == options.max_depth {
            continue;
        }

        let edges = store.iter_edges(node, &filter)?;
        if let Some(t) = trace.as_mut() {
            t.steps.push(TraceStep {
                depth,
                node,
                expanded_edges: edges.clone(),
            });
        }

        for edge in edges {
            subgraph.add_edge(edge.clone());
            if !visited.contains(&edge.object_id) {
                queue.push_back((edge.object_id, depth + 1));
            }
        }
    }

    info!(nodes = subgraph.nodes.len(), edges = subgraph.edges.len(), "traverse complete");
    Ok((subgraph, trace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, PredicateKind};
    use crate::store::test_store::TestConceptStore;

    fn linear_store() -> TestConceptStore {
        TestConceptStore::new()
            .with_predicate(TestConceptStore::is_a_predicate())
            .with_concept(TestConceptStore::concept(1, "A", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(2, "B", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(3, "C", "Condition", "SNOMED", Some("S")))
            .with_edge(Edge {
                subject_id: 1,
                predicate_id: "Is a".to_string(),
                object_id: 2,
                valid_start_date: None,
                valid_end_date: None,
                invalid_reason: None,
            })
            .with_edge(Edge {
                subject_id: 2,
                predicate_id: "Is a".to_string(),
                object_id: 3,
                valid_start_date: None,
                valid_end_date: None,
                invalid_reason: None,
            })
    }

    #[test]
    fn traverses_outward_to_max_depth() {
        let store = linear_store();
        let options = TraverseOptions { max_depth: 1, trace: true, ..Default::default() };
        let (subgraph, trace) = traverse(&store, &[1], &options).unwrap();

        assert_eq!(subgraph.nodes, [1, 2].into_iter().collect());
        assert_eq!(subgraph.edges.len(), 1);
        let trace = trace.unwrap();
        assert_eq!(trace.seeds, vec![1]);
        assert!(trace.terminated_reason.is_none());
    }

    #[test]
    fn stops_at_max_nodes() {
        let store = linear_store();
        let options = TraverseOptions { max_depth: 2, max_nodes: Some(2), trace: true, ..Default::default() };
        let (subgraph, trace) = traverse(&store, &[1], &options).unwrap();

        assert_eq!(subgraph.nodes.len(), 2);
        assert_eq!(trace.unwrap().terminated_reason, Some("max_nodes".to_string()));
    }

    #[test]
    fn dedups_edges_in_result() {
        let store = linear_store();
        let options = TraverseOptions { max_depth: 5, ..Default::default() };
        let (subgraph, _) = traverse(&store, &[1, 1], &options).unwrap();
        let mut seen = HashSet::new();
        for edge in &subgraph.edges {
            assert!(seen.insert((edge.subject_id, edge.predicate_id.clone(), edge.object_id)));
        }
    }

    #[test]
    fn filters_by_predicate_kind() {
        let store = TestConceptStore::new()
            .with_predicate(TestConceptStore::is_a_predicate())
            .with_predicate(TestConceptStore::maps_to_predicate())
            .with_concept(TestConceptStore::concept(1, "A", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(2, "B", "Condition", "SNOMED", Some("S")))
            .with_edge(Edge {
                subject_id: 1,
                predicate_id: "Maps to".to_string(),
                object_id: 2,
                valid_start_date: None,
                valid_end_date: None,
                invalid_reason: None,
            });

        let options = TraverseOptions {
            max_depth: 3,
            predicate_kinds: Some(vec![PredicateKind::Ontological]),
            ..Default::default()
        };
        let (subgraph, _) = traverse(&store, &[1], &options).unwrap();
        assert_eq!(subgraph.nodes, [1].into_iter().collect());
        assert!(subgraph.edges.is_empty());
    }
}
