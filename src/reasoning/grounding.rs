//! Grounds free text to concept ids: resolve lexical candidates, filter by
//! domain/vocabulary/standard constraints, then require (and rank by) an
//! ontological path to at least one caller-supplied ancestor.

use crate::error::Result;
use crate::model::{GraphPath, PathProfile, PredicateKind};
use crate::reasoning::paths::{find_shortest_paths, PathSearchOptions};
use crate::reasoning::scoring::path_profile;
use crate::resolver::ResolverPipeline;
use crate::store::ConceptStore;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct GroundingConstraints {
    pub parent_ids: Vec<i64>,
    pub allowed_domains: Option<Vec<String>>,
    pub allowed_vocabularies: Option<Vec<String>>,
    pub require_standard: bool,
    pub max_depth: usize,
}

impl Default for GroundingConstraints {
    fn default() -> Self {
        Self {
            parent_ids: Vec::new(),
            allowed_domains: None,
            allowed_vocabularies: None,
            require_standard: false,
            max_depth: 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroundingCandidate {
    pub concept_id: i64,
    pub label: String,
    pub best_path_profile: PathProfile,
    pub reasons: Vec<String>,
    pub paths: Vec<GraphPath>,
}

/// Resolves `text` against `pipeline`, filters by `constraints`, and keeps
/// only candidates with at least one ontological path to a constraint
/// parent. Candidates that fail a constraint are skipped, never raised
/// (SPEC_FULL.md §7).
pub fn ground_term(
    store: &dyn ConceptStore,
    text: &str,
    constraints: &GroundingConstraints,
    pipeline: &ResolverPipeline,
) -> Result<Vec<GroundingCandidate>> {
    info!(text, "grounding term");
    let resolved = pipeline.resolve(store, text, None)?;
    let mut candidates = Vec::new();

    for hit in resolved {
        let concept = store.concept_view(hit.concept_id)?;
        let mut reasons = vec![format!("resolved by {}", hit.resolver_name)];

        if let Some(domains) = &constraints.allowed_domains {
            if !domains.contains(&concept.domain_id) {
                debug!(concept_id = hit.concept_id, "rejected: domain not allowed");
                continue;
            }
        }
        if let Some(vocabs) = &constraints.allowed_vocabularies {
            if !vocabs.contains(&concept.vocabulary_id) {
                debug!(concept_id = hit.concept_id, "rejected: vocabulary not allowed");
                continue;
            }
        }
        if constraints.require_standard && !concept.is_standard() {
            debug!(concept_id = hit.concept_id, "rejected: not standard");
            continue;
        }

        let mut paths = Vec::new();
        for &parent_id in &constraints.parent_ids {
            let options = PathSearchOptions {
                predicate_kinds: Some(vec![PredicateKind::Ontological]),
                max_depth: constraints.max_depth,
                max_paths: 3,
                ..Default::default()
            };
            let (found, _) = find_shortest_paths(store, hit.concept_id, parent_id, &options)?;
            paths.extend(found);
        }

        if paths.is_empty() {
            debug!(concept_id = hit.concept_id, "rejected: no ontological path to any constraint parent");
            continue;
        }

        let mut best: Option<PathProfile> = None;
        for path in &paths {
            let profile = path_profile(store, path)?;
            best = Some(match best {
                None => profile,
                Some(current) if profile.rank_key() < current.rank_key() => profile,
                Some(current) => current,
            });
        }

        reasons.push(format!("{} candidate path(s) to constraint parents", paths.len()));
        candidates.push(GroundingCandidate {
            concept_id: hit.concept_id,
            label: concept.concept_name,
            best_path_profile: best.unwrap_or_default(),
            reasons,
            paths,
        });
    }

    candidates.sort_by_key(|c| c.best_path_profile.rank_key());
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Edge;
    use crate::store::test_store::TestConceptStore;

    #[test]
    fn rejects_candidate_outside_allowed_domain() {
        let store = TestConceptStore::new()
            .with_predicate(TestConceptStore::is_a_predicate())
            .with_concept(TestConceptStore::concept(1, "Diabetes", "Drug", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(2, "Diabetes mellitus", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(99, "Endocrine disorder", "Condition", "SNOMED", Some("S")))
            .with_edge(Edge {
                subject_id: 2,
                predicate_id: "Is a".to_string(),
                object_id: 99,
                valid_start_date: None,
                valid_end_date: None,
                invalid_reason: None,
            });

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

    #[test]
    fn rejects_candidate_without_path_to_parent() {
        let store = TestConceptStore::new()
            .with_predicate(TestConceptStore::is_a_predicate())
            .with_concept(TestConceptStore::concept(1, "Diabetes", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(99, "Unrelated", "Condition", "SNOMED", Some("S")));

        let constraints = GroundingConstraints { parent_ids: vec![99], ..Default::default() };
        let pipeline = ResolverPipeline::default_pipeline();
        let candidates = ground_term(&store, "diabetes", &constraints, &pipeline).unwrap();
        assert!(candidates.is_empty());
    }
}
