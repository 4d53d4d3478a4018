//! Lexical resolver pipeline: ordered fan-out over resolvers with confidence
//! gating and concept-id dedup. This is deliberately thin - anything beyond
//! simple label/synonym matching (embeddings, external services) is an
//! external collaborator the core only talks to through the `Resolver`
//! trait.

use crate::error::Result;
use crate::store::{normalize_label, ConceptStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResolverConfidence {
    Exact = 0,
    Partial = 1,
    Embedding = 2,
    External = 3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCandidate {
    pub concept_id: i64,
    pub resolver_name: String,
    pub confidence: ResolverConfidence,
}

pub trait Resolver {
    fn name(&self) -> &str;
    fn confidence(&self) -> ResolverConfidence;
    fn resolve(
        &self,
        store: &dyn ConceptStore,
        text: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ResolvedCandidate>>;
}

/// Exact (case/whitespace-normalized) label match.
pub struct ExactLabelResolver;

impl Resolver for ExactLabelResolver {
    fn name(&self) -> &str {
        "exact_label"
    }

    fn confidence(&self) -> ResolverConfidence {
        ResolverConfidence::Exact
    }

    fn resolve(&self, store: &dyn ConceptStore, text: &str, limit: Option<usize>) -> Result<Vec<ResolvedCandidate>> {
        let mut matches = store.label_lookup(text, false)?;
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        Ok(matches
            .into_iter()
            .map(|m| ResolvedCandidate {
                concept_id: m.concept_id,
                resolver_name: self.name().to_string(),
                confidence: self.confidence(),
            })
            .collect())
    }
}

/// Exact (case/whitespace-normalized) synonym match.
pub struct ExactSynonymResolver;

impl Resolver for ExactSynonymResolver {
    fn name(&self) -> &str {
        "exact_synonym"
    }

    fn confidence(&self) -> ResolverConfidence {
        ResolverConfidence::Exact
    }

    fn resolve(&self, store: &dyn ConceptStore, text: &str, limit: Option<usize>) -> Result<Vec<ResolvedCandidate>> {
        let mut matches = store.synonym_lookup(text, false)?;
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        Ok(matches
            .into_iter()
            .map(|m| ResolvedCandidate {
                concept_id: m.concept_id,
                resolver_name: self.name().to_string(),
                confidence: self.confidence(),
            })
            .collect())
    }
}

/// Fuzzy (substring) label match, ranked by closeness to the query.
pub struct PartialLabelResolver;

impl Resolver for PartialLabelResolver {
    fn name(&self) -> &str {
        "partial_label"
    }

    fn confidence(&self) -> ResolverConfidence {
        ResolverConfidence::Partial
    }

    fn resolve(&self, store: &dyn ConceptStore, text: &str, limit: Option<usize>) -> Result<Vec<ResolvedCandidate>> {
        let query = normalize_label(text);
        let mut matches = store.label_lookup(text, true)?;
        matches.sort_by_key(|m| {
            let label = normalize_label(&m.matched_label);
            let starts_with_query = label.starts_with(&query);
            let word_count = label.split_whitespace().count();
            let len_delta = (label.len() as i64 - query.len() as i64).unsigned_abs();
            (!starts_with_query, word_count, len_delta)
        });
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        Ok(matches
            .into_iter()
            .map(|m| ResolvedCandidate {
                concept_id: m.concept_id,
                resolver_name: self.name().to_string(),
                confidence: self.confidence(),
            })
            .collect())
    }
}

/// Runs resolvers in order, deduplicating candidate concept ids across all
/// resolvers (first writer wins) and honoring `stop_after_confidence`.
pub struct ResolverPipeline {
    resolvers: Vec<Box<dyn Resolver>>,
    pub stop_after_confidence: Option<ResolverConfidence>,
}

impl ResolverPipeline {
    pub fn new(resolvers: Vec<Box<dyn Resolver>>) -> Self {
        Self { resolvers, stop_after_confidence: None }
    }

    pub fn with_stop_after_confidence(mut self, confidence: ResolverConfidence) -> Self {
        self.stop_after_confidence = Some(confidence);
        self
    }

    /// The default pipeline: exact label, then exact synonym, then partial
    /// label, per SPEC_FULL.md §4.7.
    pub fn default_pipeline() -> Self {
        Self::new(vec![
            Box::new(ExactLabelResolver),
            Box::new(ExactSynonymResolver),
            Box::new(PartialLabelResolver),
        ])
    }

    pub fn resolve(
        &self,
        store: &dyn ConceptStore,
        text: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ResolvedCandidate>> {
        let mut seen = std::collections::HashSet::new();
        let mut hits_found = false;
        let mut results = Vec::new();

        for resolver in &self.resolvers {
            if hits_found {
                if let Some(stop_at) = self.stop_after_confidence {
                    if resolver.confidence() > stop_at {
                        continue;
                    }
                }
            }
            let candidates = resolver.resolve(store, text, limit)?;
            for candidate in candidates {
                if seen.insert(candidate.concept_id) {
                    results.push(candidate);
                }
            }
            if !results.is_empty() {
                hits_found = true;
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_store::TestConceptStore;

    fn store() -> TestConceptStore {
        TestConceptStore::new()
            .with_concept(TestConceptStore::concept(1, "Diabetes mellitus", "Condition", "SNOMED", Some("S")))
            .with_concept(TestConceptStore::concept(2, "Diabetes", "Condition", "SNOMED", Some("S")))
            .with_synonym(1, "Sugar diabetes")
    }

    #[test]
    fn dedups_across_resolvers() {
        let pipeline = ResolverPipeline::default_pipeline();
        let candidates = pipeline.resolve(&store(), "diabetes mellitus", None).unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.concept_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn synonym_resolver_finds_synonym_match() {
        let candidates = ExactSynonymResolver.resolve(&store(), "Sugar diabetes", None).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].concept_id, 1);
    }

    #[test]
    fn partial_label_prefers_closer_length_match() {
        let candidates = PartialLabelResolver.resolve(&store(), "diabetes", None).unwrap();
        assert_eq!(candidates.first().map(|c| c.concept_id), Some(2));
    }
}
