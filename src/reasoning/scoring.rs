//! Path quality profiling, ranking, and human-readable explanation.

use crate::error::Result;
use crate::model::{GraphPath, GraphTrace, PathProfile, PathStep, PredicateKind};
use crate::store::ConceptStore;

/// Builds the quality profile described in SPEC_FULL.md §3/§4.4.
pub fn path_profile(store: &dyn ConceptStore, path: &GraphPath) -> Result<PathProfile> {
    let mut profile = PathProfile { hops: path.hops(), ..Default::default() };

    let nodes = path.nodes();
    let mut prev_vocab: Option<String> = None;
    for &node in &nodes {
        let concept = store.concept_view(node)?;
        if concept.invalid_reason.is_some() {
            profile.invalid_concepts += 1;
        }
        if concept.standard_concept.is_none() {
            profile.non_standard_concepts += 1;
        }
        if let Some(prev) = &prev_vocab {
            if *prev != concept.vocabulary_id {
                profile.vocab_switches += 1;
            }
        }
        prev_vocab = Some(concept.vocabulary_id);
    }

    for step in &path.steps {
        match store.predicate_kind(&step.predicate_id)? {
            PredicateKind::Ontological => profile.ontological_edges += 1,
            PredicateKind::Mapping => profile.mapping_edges += 1,
            _ => profile.metadata_edges += 1,
        }
    }

    Ok(profile)
}

/// Sorts `paths` ascending by `PathProfile::rank_key`. The sort is stable,
/// so equally-ranked paths preserve their input order.
pub fn rank_paths(store: &dyn ConceptStore, paths: Vec<GraphPath>) -> Result<Vec<GraphPath>> {
    let mut keyed: Vec<(_, GraphPath)> = paths
        .into_iter()
        .map(|p| path_profile(store, &p).map(|profile| (profile.rank_key(), p)))
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, p)| p).collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepExplanation {
    pub step: PathStep,
    pub trace_depth: Option<usize>,
    pub kind: PredicateKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathExplanation {
    pub steps: Vec<StepExplanation>,
}

/// Explains each step of `path`, cross-referencing `trace` (if supplied) to
/// report the BFS depth at which the edge was actually expanded.
pub fn explain_path(
    store: &dyn ConceptStore,
    path: &GraphPath,
    trace: Option<&GraphTrace>,
) -> Result<PathExplanation> {
    let mut steps = Vec::with_capacity(path.steps.len());
    for step in &path.steps {
        let kind = store.predicate_kind(&step.predicate_id)?;
        let trace_depth = trace.and_then(|t| {
            t.steps.iter().find_map(|ts| {
                if ts.node == step.subject
                    && ts.expanded_edges.iter().any(|e| {
                        e.subject_id == step.subject
                            && e.predicate_id == step.predicate_id
                            && e.object_id == step.object
                    })
                {
                    Some(ts.depth)
                } else {
                    None
                }
            })
        });
        let reason = format!(
            "{} -> {} via {} ({})",
            step.subject,
            step.object,
            step.predicate_id,
            kind.label()
        );
        steps.push(StepExplanation { step: step.clone(), trace_depth, kind, reason });
    }
    Ok(PathExplanation { steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Edge;
    use crate::store::test_store::TestConceptStore;

    fn store_with_vocab_switch() -> TestConceptStore {
        TestConceptStore::new()
            .with_predicate(TestConceptStore::is_a_predicate())
            .with_concept(TestConceptStore::concept(1, "A", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(2, "B", "Condition", "ICD10", Some("S")))
            .with_edge(Edge {
                subject_id: 1,
                predicate_id: "Is a".to_string(),
                object_id: 2,
                valid_start_date: None,
                valid_end_date: None,
                invalid_reason: None,
            })
    }

    #[test]
    fn profile_counts_vocab_switch_and_ontological_edge() {
        let store = store_with_vocab_switch();
        let path = GraphPath {
            steps: vec![PathStep { subject: 1, predicate_id: "Is a".to_string(), object: 2 }],
        };
        let profile = path_profile(&store, &path).unwrap();
        assert_eq!(profile.hops, 1);
        assert_eq!(profile.vocab_switches, 1);
        assert_eq!(profile.ontological_edges, 1);
        assert_eq!(profile.rank_key(), (0, 0, 0, 0, 1, 1, -1));
    }

    #[test]
    fn rank_paths_prefers_fewer_vocab_switches() {
        let store = TestConceptStore::new()
            .with_predicate(TestConceptStore::is_a_predicate())
            .with_concept(TestConceptStore::concept(1, "A", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(2, "B", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(3, "C", "Condition", "ICD10", Some("S")))
            .with_edge(Edge { subject_id: 1, predicate_id: "Is a".to_string(), object_id: 2, valid_start_date: None, valid_end_date: None, invalid_reason: None })
            .with_edge(Edge { subject_id: 1, predicate_id: "Is a".to_string(), object_id: 3, valid_start_date: None, valid_end_date: None, invalid_reason: None });

        let pure = GraphPath { steps: vec![PathStep { subject: 1, predicate_id: "Is a".to_string(), object: 2 }] };
        let switched = GraphPath { steps: vec![PathStep { subject: 1, predicate_id: "Is a".to_string(), object: 3 }] };

        let ranked = rank_paths(&store, vec![switched.clone(), pure.clone()]).unwrap();
        assert_eq!(ranked[0], pure);
        assert_eq!(ranked[1], switched);
    }

    #[test]
    fn explain_path_cross_references_trace_depth() {
        let store = store_with_vocab_switch();
        let path = GraphPath {
            steps: vec![PathStep { subject: 1, predicate_id: "Is a".to_string(), object: 2 }],
        };
        let trace = GraphTrace {
            seeds: vec![1],
            steps: vec![crate::model::TraceStep {
                depth: 0,
                node: 1,
                expanded_edges: vec![Edge {
                    subject_id: 1,
                    predicate_id: "Is a".to_string(),
                    object_id: 2,
                    valid_start_date: None,
                    valid_end_date: None,
                    invalid_reason: None,
                }],
            }],
            terminated_reason: None,
        };
        let explanation = explain_path(&store, &path, Some(&trace)).unwrap();
        assert_eq!(explanation.steps[0].trace_depth, Some(0));
        assert_eq!(explanation.steps[0].kind, PredicateKind::Ontological);
    }
}
