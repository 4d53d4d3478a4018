//! Bidirectional shortest-path search between two concepts, with per-kind
//! edge filtering and multi-path reconstruction. This is the one algorithm
//! in this crate with no direct precedent elsewhere in the codebase's graph
//! tooling (which only walks single-direction Dijkstra/BFS) - the two
//! frontiers and the multi-predecessor reconstruction below are built from
//! scratch against the termination-optimality rule in SPEC_FULL.md §4.3.

use crate::error::Result;
use crate::model::{GraphPath, GraphTrace, PathStep, PredicateKind, TraceStep};
use crate::store::{ConceptStore, EdgeFilter};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PathSearchOptions {
    pub predicate_kinds: Option<Vec<PredicateKind>>,
    pub max_depth: usize,
    pub on: Option<chrono::NaiveDate>,
    pub max_paths: usize,
    pub traced: bool,
}

impl Default for PathSearchOptions {
    fn default() -> Self {
        Self {
            predicate_kinds: None,
            max_depth: 6,
            on: None,
            max_paths: 20,
            traced: false,
        }
    }
}

/// Predecessor edges contributing to a node's shortest distance on one side
/// of the search: `(predecessor, predicate_id)`, where the predicate always
/// names the forward (source-to-target) direction of the edge.
type Predecessors = HashMap<i64, Vec<(i64, String)>>;

pub fn find_shortest_paths(
    store: &dyn ConceptStore,
    source: i64,
    target: i64,
    options: &PathSearchOptions,
) -> Result<(Vec<GraphPath>, Option<GraphTrace>)> {
    let mut trace = options.traced.then(|| GraphTrace {
        seeds: vec![source, target],
        steps: Vec::new(),
        terminated_reason: None,
    });

    if source == target {
        if let Some(t) = trace.as_mut() {
            t.terminated_reason = Some("source_equals_target".to_string());
        }
        return Ok((vec![GraphPath::empty()], trace));
    }

    info!(source, target, max_depth = options.max_depth, "starting bidirectional path search");

    let mut depth_fwd: HashMap<i64, usize> = HashMap::from([(source, 0)]);
    let mut depth_bwd: HashMap<i64, usize> = HashMap::from([(target, 0)]);
    let mut parents_fwd: Predecessors = HashMap::new();
    let mut parents_bwd: Predecessors = HashMap::new();
    let mut queue_fwd: VecDeque<i64> = VecDeque::from([source]);
    let mut queue_bwd: VecDeque<i64> = VecDeque::from([target]);
    let mut best_total_depth: Option<usize> = None;
    let mut meeting_nodes: HashSet<i64> = HashSet::new();

    let mut filter = EdgeFilter::outgoing();
    filter.predicate_kinds = options.predicate_kinds.clone();
    filter.on = options.on;
    let mut filter_bwd = EdgeFilter::incoming();
    filter_bwd.predicate_kinds = options.predicate_kinds.clone();
    filter_bwd.on = options.on;

    while !queue_fwd.is_empty() || !queue_bwd.is_empty() {
        if let Some(best) = best_total_depth {
            let min_fwd = queue_fwd.iter().filter_map(|n| depth_fwd.get(n)).min().copied();
            let min_bwd = queue_bwd.iter().filter_map(|n| depth_bwd.get(n)).min().copied();
            match (min_fwd, min_bwd) {
                (Some(mf), Some(mb)) if mf + mb >= best => break,
                (None, _) | (_, None) => break,
                _ => {}
            }
        }

        let expand_fwd = match (queue_fwd.len(), queue_bwd.len()) {
            (0, _) => false,
            (_, 0) => true,
            (f, b) => f <= b,
        };

        if expand_fwd {
            let cur = queue_fwd.pop_front().unwrap();
            let depth = depth_fwd[&cur];
            if depth >= options.max_depth {
                continue;
            }
            let edges = store.iter_edges(cur, &filter)?;
            if let Some(t) = trace.as_mut() {
                t.steps.push(TraceStep { depth, node: cur, expanded_edges: edges.clone() });
            }
            for edge in edges {
                let nxt = edge.object_id;
                let nd = depth + 1;
                if !depth_fwd.contains_key(&nxt) {
                    depth_fwd.insert(nxt, nd);
                    queue_fwd.push_back(nxt);
                }
                if depth_fwd[&nxt] == nd {
                    parents_fwd.entry(nxt).or_default().push((cur, edge.predicate_id.clone()));
                }
                if let Some(&db) = depth_bwd.get(&nxt) {
                    record_meeting(nxt, nd + db, &mut best_total_depth, &mut meeting_nodes);
                }
            }
        } else {
            let cur = queue_bwd.pop_front().unwrap();
            let depth = depth_bwd[&cur];
            if depth >= options.max_depth {
                continue;
            }
            let edges = store.iter_edges(cur, &filter_bwd)?;
            if let Some(t) = trace.as_mut() {
                t.steps.push(TraceStep { depth, node: cur, expanded_edges: edges.clone() });
            }
            for edge in edges {
                let nxt = edge.subject_id;
                let nd = depth + 1;
                if !depth_bwd.contains_key(&nxt) {
                    depth_bwd.insert(nxt, nd);
                    queue_bwd.push_back(nxt);
                }
                if depth_bwd[&nxt] == nd {
                    parents_bwd.entry(nxt).or_default().push((cur, edge.predicate_id.clone()));
                }
                if let Some(&df) = depth_fwd.get(&nxt) {
                    record_meeting(nxt, nd + df, &mut best_total_depth, &mut meeting_nodes);
                }
            }
        }
    }

    if meeting_nodes.is_empty() {
        debug!(source, target, "no meeting node found");
        if let Some(t) = trace.as_mut() {
            t.terminated_reason = Some("no_path".to_string());
        }
        return Ok((Vec::new(), trace));
    }

    let mut paths = Vec::new();
    'outer: for &meeting in &meeting_nodes {
        let prefixes = enumerate_prefixes(meeting, source, &parents_fwd, options.max_paths);
        let suffixes = enumerate_suffixes(meeting, target, &parents_bwd, options.max_paths);
        for prefix in &prefixes {
            for suffix in &suffixes {
                let mut steps = prefix.clone();
                steps.extend(suffix.iter().cloned());
                paths.push(GraphPath { steps });
                if paths.len() >= options.max_paths {
                    break 'outer;
                }
            }
        }
    }

    info!(source, target, paths_found = paths.len(), "bidirectional path search complete");
    Ok((paths, trace))
}

fn record_meeting(
    node: i64,
    total_depth: usize,
    best_total_depth: &mut Option<usize>,
    meeting_nodes: &mut HashSet<i64>,
) {
    match *best_total_depth {
        None => {
            *best_total_depth = Some(total_depth);
            meeting_nodes.clear();
            meeting_nodes.insert(node);
        }
        Some(best) if total_depth < best => {
            *best_total_depth = Some(total_depth);
            meeting_nodes.clear();
            meeting_nodes.insert(node);
        }
        Some(best) if total_depth == best => {
            meeting_nodes.insert(node);
        }
        _ => {}
    }
}

/// Enumerates every shortest prefix from `source` to `meeting` by walking
/// `parents_fwd` with an explicit stack, applying the `max_paths` cutoff
/// during enumeration rather than after (SPEC_FULL.md §9).
fn enumerate_prefixes(
    meeting: i64,
    source: i64,
    parents_fwd: &Predecessors,
    max_paths: usize,
) -> Vec<Vec<PathStep>> {
    if meeting == source {
        return vec![Vec::new()];
    }
    let mut results = Vec::new();
    let mut stack: Vec<(i64, Vec<PathStep>)> = vec![(meeting, Vec::new())];
    while let Some((node, suffix)) = stack.pop() {
        if results.len() >= max_paths {
            break;
        }
        if node == source {
            results.push(suffix);
            continue;
        }
        if let Some(preds) = parents_fwd.get(&node) {
            for (prev, predicate) in preds {
                let mut new_suffix = Vec::with_capacity(suffix.len() + 1);
                new_suffix.push(PathStep { subject: *prev, predicate_id: predicate.clone(), object: node });
                new_suffix.extend(suffix.iter().cloned());
                stack.push((*prev, new_suffix));
            }
        }
    }
    results
}

/// Enumerates every shortest suffix from `meeting` to `target` by walking
/// `parents_bwd` forward, under the same cutoff discipline.
fn enumerate_suffixes(
    meeting: i64,
    target: i64,
    parents_bwd: &Predecessors,
    max_paths: usize,
) -> Vec<Vec<PathStep>> {
    if meeting == target {
        return vec![Vec::new()];
    }
    let mut results = Vec::new();
    let mut stack: Vec<(i64, Vec<PathStep>)> = vec![(meeting, Vec::new())];
    while let Some((node, prefix)) = stack.pop() {
        if results.len() >= max_paths {
            break;
        }
        if node == target {
            results.push(prefix);
            continue;
        }
        if let Some(nexts) = parents_bwd.get(&node) {
            for (next, predicate) in nexts {
                let mut new_prefix = prefix.clone();
                new_prefix.push(PathStep { subject: node, predicate_id: predicate.clone(), object: *next });
                stack.push((*next, new_prefix));
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Edge;
    use crate::store::test_store::TestConceptStore;

    fn edge(subject: i64, predicate_id: &str, object: i64) -> Edge {
        Edge {
            subject_id: subject,
            predicate_id: predicate_id.to_string(),
            object_id: object,
            valid_start_date: None,
            valid_end_date: None,
            invalid_reason: None,
        }
    }

    #[test]
    fn trivial_path() {
        let store = TestConceptStore::new()
            .with_predicate(TestConceptStore::is_a_predicate())
            .with_concept(TestConceptStore::concept(1, "A", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(2, "B", "Condition", "SNOMED", Some("S")))
            .with_edge(edge(1, "Is a", 2));

        let options = PathSearchOptions {
            predicate_kinds: Some(vec![PredicateKind::Ontological]),
            ..Default::default()
        };
        let (paths, _) = find_shortest_paths(&store, 1, 2, &options).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].hops(), 1);
        assert_eq!(paths[0].steps[0], PathStep { subject: 1, predicate_id: "Is a".to_string(), object: 2 });
    }

    #[test]
    fn no_path_under_filter() {
        let store = TestConceptStore::new()
            .with_predicate(TestConceptStore::maps_to_predicate())
            .with_concept(TestConceptStore::concept(1, "A", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(2, "B", "Condition", "SNOMED", Some("S")))
            .with_edge(edge(1, "Maps to", 2));

        let options = PathSearchOptions {
            predicate_kinds: Some(vec![PredicateKind::Ontological]),
            traced: true,
            ..Default::default()
        };
        let (paths, trace) = find_shortest_paths(&store, 1, 2, &options).unwrap();
        assert!(paths.is_empty());
        assert_eq!(trace.unwrap().terminated_reason, Some("no_path".to_string()));
    }

    #[test]
    fn source_equals_target_returns_empty_path() {
        let store = TestConceptStore::new()
            .with_concept(TestConceptStore::concept(1, "A", "Condition", "SNOMED", Some("S")));
        let options = PathSearchOptions { traced: true, ..Default::default() };
        let (paths, trace) = find_shortest_paths(&store, 1, 1, &options).unwrap();
        assert_eq!(paths, vec![GraphPath::empty()]);
        assert_eq!(trace.unwrap().terminated_reason, Some("source_equals_target".to_string()));
    }

    #[test]
    fn finds_shortest_over_meeting_in_the_middle() {
        // 1 -> 2 -> 3 -> 4, and a longer detour 1 -> 5 -> 6 -> 3 -> 4
        let store = TestConceptStore::new()
            .with_predicate(TestConceptStore::is_a_predicate())
            .with_concept(TestConceptStore::concept(1, "A", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(2, "B", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(3, "C", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(4, "D", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(5, "E", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(6, "F", "Condition", "SNOMED", Some("S")))
            .with_edge(edge(1, "Is a", 2))
            .with_edge(edge(2, "Is a", 3))
            .with_edge(edge(3, "Is a", 4))
            .with_edge(edge(1, "Is a", 5))
            .with_edge(edge(5, "Is a", 6))
            .with_edge(edge(6, "Is a", 3));

        let options = PathSearchOptions::default();
        let (paths, _) = find_shortest_paths(&store, 1, 4, &options).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].hops(), 3);
        assert_eq!(paths[0].nodes(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn respects_max_paths_cutoff() {
        // Two equally short routes from 1 to 4.
        let store = TestConceptStore::new()
            .with_predicate(TestConceptStore::is_a_predicate())
            .with_concept(TestConceptStore::concept(1, "A", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(2, "B", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(3, "C", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(4, "D", "Condition", "SNOMED", Some("S")))
            .with_edge(edge(1, "Is a", 2))
            .with_edge(edge(1, "Is a", 3))
            .with_edge(edge(2, "Is a", 4))
            .with_edge(edge(3, "Is a", 4));

        let options = PathSearchOptions { max_paths: 1, ..Default::default() };
        let (paths, _) = find_shortest_paths(&store, 1, 4, &options).unwrap();
        assert_eq!(paths.len(), 1);
    }
}
