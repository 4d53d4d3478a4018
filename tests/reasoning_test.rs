//! End-to-end scenarios against the public API, exercising the literal
//! examples from SPEC_FULL.md §8.

use concept_graph_reasoner::reasoning::paths::{find_shortest_paths, PathSearchOptions};
use concept_graph_reasoner::reasoning::scoring::{path_profile, rank_paths};
use concept_graph_reasoner::reasoning::traverse::{traverse, TraverseOptions};
use concept_graph_reasoner::reasoning::parent_cover::{find_common_parents, greedy_parent_cover, CommonParentsOptions, ParentCoverOptions};
use concept_graph_reasoner::reasoning::grounding::{ground_term, GroundingConstraints};
use concept_graph_reasoner::model::{Edge, PredicateKind};
use concept_graph_reasoner::resolver::ResolverPipeline;
use concept_graph_reasoner::store::test_store::TestConceptStore;

fn is_a(subject: i64, object: i64) -> Edge {
    Edge {
        subject_id: subject,
        predicate_id: "Is a".to_string(),
        object_id: object,
        valid_start_date: None,
        valid_end_date: None,
        invalid_reason: None,
    }
}

fn maps_to(subject: i64, object: i64) -> Edge {
    Edge {
        subject_id: subject,
        predicate_id: "Maps to".to_string(),
        object_id: object,
        valid_start_date: None,
        valid_end_date: None,
        invalid_reason: None,
    }
}

#[test]
fn scenario_trivial_path() {
    let store = TestConceptStore::new()
        .with_predicate(TestConceptStore::is_a_predicate())
        .with_concept(TestConceptStore::concept(1, "A", "Condition", "SNOMED", Some("S")))
        .with_concept(TestConceptStore::concept(2, "B", "Condition", "SNOMED", Some("S")))
        .with_edge(is_a(1, 2));

    let options = PathSearchOptions {
        predicate_kinds: Some(vec![PredicateKind::Ontological]),
        ..Default::default()
    };
    let (paths, _) = find_shortest_paths(&store, 1, 2, &options).unwrap();
    assert_eq!(paths.len(), 1);

    let profile = path_profile(&store, &paths[0]).unwrap();
    assert_eq!(profile.hops, 1);
    assert_eq!(profile.ontological_edges, 1);
    assert_eq!(profile.rank_key(), (0, 0, 0, 0, 0, 1, -1));
}

#[test]
fn scenario_no_path_under_filter() {
    let store = TestConceptStore::new()
        .with_predicate(TestConceptStore::maps_to_predicate())
        .with_concept(TestConceptStore::concept(1, "A", "Condition", "SNOMED", Some("S")))
        .with_concept(TestConceptStore::concept(2, "B", "Condition", "SNOMED", Some("S")))
        .with_edge(maps_to(1, 2));

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
fn scenario_parent_cover_over_diabetes_hierarchy() {
    let store = TestConceptStore::new()
        .with_predicate(TestConceptStore::is_a_predicate())
        .with_predicate(TestConceptStore::subsumes_predicate())
        .with_concept(TestConceptStore::concept(1, "Type 1 diabetes mellitus", "Condition", "SNOMED", Some("S")))
        .with_concept(TestConceptStore::concept(2, "Type 2 diabetes mellitus", "Condition", "SNOMED", Some("S")))
        .with_concept(TestConceptStore::concept(3, "Diabetes mellitus", "Condition", "SNOMED", Some("S")))
        .with_edge(is_a(1, 3))
        .with_edge(is_a(2, 3));

    let seeds = [1, 2];
    let candidates = find_common_parents(&store, &seeds, &CommonParentsOptions::default()).unwrap();
    assert_eq!(candidates[&3].coverage, 2);
    assert_eq!(candidates[&3].completeness, 1.0);

    let selected = greedy_parent_cover(&seeds, &candidates, &ParentCoverOptions::default());
    assert_eq!(selected, vec![3]);
}

#[test]
fn scenario_traverse_stops_at_max_nodes() {
    let mut store = TestConceptStore::new().with_predicate(TestConceptStore::is_a_predicate());
    store = store.with_concept(TestConceptStore::concept(0, "Root", "Condition", "SNOMED", Some("S")));
    for i in 1..=10 {
        store = store
            .with_concept(TestConceptStore::concept(i, &format!("Child {i}"), "Condition", "SNOMED", Some("S")))
            .with_edge(is_a(0, i));
    }

    let options = TraverseOptions { max_depth: 2, max_nodes: Some(3), trace: true, ..Default::default() };
    let (subgraph, trace) = traverse(&store, &[0], &options).unwrap();
    assert_eq!(subgraph.nodes.len(), 3);
    assert_eq!(trace.unwrap().terminated_reason, Some("max_nodes".to_string()));
}

#[test]
fn scenario_tie_break_on_vocab_switch() {
    let store = TestConceptStore::new()
        .with_predicate(TestConceptStore::is_a_predicate())
        .with_concept(TestConceptStore::concept(1, "A", "Condition", "SNOMED", Some("S")))
        .with_concept(TestConceptStore::concept(2, "X", "Condition", "SNOMED", Some("S")))
        .with_concept(TestConceptStore::concept(3, "Y", "Condition", "ICD10", Some("S")))
        .with_concept(TestConceptStore::concept(4, "B", "Condition", "SNOMED", Some("S")))
        .with_edge(is_a(1, 2))
        .with_edge(is_a(2, 4))
        .with_edge(is_a(1, 3))
        .with_edge(is_a(3, 4));

    let options = PathSearchOptions {
        predicate_kinds: Some(vec![PredicateKind::Ontological]),
        max_paths: 10,
        ..Default::default()
    };
    let (paths, _) = find_shortest_paths(&store, 1, 4, &options).unwrap();
    assert_eq!(paths.len(), 2);

    let ranked = rank_paths(&store, paths).unwrap();
    assert_eq!(ranked[0].nodes(), vec![1, 2, 4]);
    assert_eq!(ranked[1].nodes(), vec![1, 3, 4]);

    let best_profile = path_profile(&store, &ranked[0]).unwrap();
    let worst_profile = path_profile(&store, &ranked[1]).unwrap();
    assert_eq!(best_profile.vocab_switches, 0);
    assert_eq!(worst_profile.vocab_switches, 2);
}

#[test]
fn scenario_grounding_rejects_domain() {
    let store = TestConceptStore::new()
        .with_predicate(TestConceptStore::is_a_predicate())
        .with_concept(TestConceptStore::concept(1, "Diabetes", "Drug", "SNOMED", Some("S")))
        .with_concept(TestConceptStore::concept(2, "Diabetes", "Condition", "SNOMED", Some("S")))
        .with_concept(TestConceptStore::concept(99, "Endocrine disorder", "Condition", "SNOMED", Some("S")))
        .with_edge(is_a(2, 99));

    let constraints = GroundingConstraints {
        parent_ids: vec![99],
        allowed_domains: Some(vec!["Condition".to_string()]),
        ..Default::default()
    };
    let pipeline = ResolverPipeline::default_pipeline();
    let candidates = ground_term(&store, "diabetes", &constraints, &pipeline).unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].concept_id, 2);
}
