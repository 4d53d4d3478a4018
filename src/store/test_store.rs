//! An in-memory `ConceptStore` built from literal fixtures, used by the
//! algorithm test suites. Exercising SPEC_FULL.md §8's properties against a
//! real Postgres instance is out of scope for unit tests.

use super::{normalize_label, ConceptStore, EdgeDirection, EdgeFilter, PredicateRef};
use crate::error::{GraphError, Result};
use crate::model::{Concept, Edge, LabelMatch, MatchKind, Predicate, PredicateKind};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct TestConceptStore {
    concepts: HashMap<i64, Concept>,
    predicates: HashMap<String, Predicate>,
    edges: Vec<Edge>,
    synonyms: HashMap<i64, Vec<String>>,
}

impl TestConceptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concept(mut self, concept: Concept) -> Self {
        self.concepts.insert(concept.concept_id, concept);
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.insert(predicate.relationship_id.clone(), predicate);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn with_synonym(mut self, concept_id: i64, synonym: impl Into<String>) -> Self {
        self.synonyms.entry(concept_id).or_default().push(synonym.into());
        self
    }

    /// Builds a concept with sensible test defaults; override fields via the
    /// returned struct before passing to `with_concept` if needed.
    pub fn concept(
        id: i64,
        name: &str,
        domain: &str,
        vocab: &str,
        standard: Option<&str>,
    ) -> Concept {
        Concept {
            concept_id: id,
            concept_name: name.to_string(),
            concept_code: format!("CODE{id}"),
            vocabulary_id: vocab.to_string(),
            domain_id: domain.to_string(),
            concept_class_id: "Clinical Finding".to_string(),
            standard_concept: standard.map(|s| s.to_string()),
            valid_start_date: chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            valid_end_date: chrono::NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
            invalid_reason: None,
        }
    }

    /// Builds the standard `"Is a"` predicate (ontological, hierarchical).
    pub fn is_a_predicate() -> Predicate {
        Predicate {
            relationship_id: "Is a".to_string(),
            name: "Is a".to_string(),
            reverse_id: Some("Subsumes".to_string()),
            is_hierarchical: true,
            defines_ancestry: true,
        }
    }

    pub fn subsumes_predicate() -> Predicate {
        Predicate {
            relationship_id: "Subsumes".to_string(),
            name: "Subsumes".to_string(),
            reverse_id: Some("Is a".to_string()),
            is_hierarchical: true,
            defines_ancestry: true,
        }
    }

    pub fn maps_to_predicate() -> Predicate {
        Predicate {
            relationship_id: "Maps to".to_string(),
            name: "Maps to".to_string(),
            reverse_id: Some("Mapped from".to_string()),
            is_hierarchical: false,
            defines_ancestry: false,
        }
    }

    pub fn mapped_from_predicate() -> Predicate {
        Predicate {
            relationship_id: "Mapped from".to_string(),
            name: "Mapped from".to_string(),
            reverse_id: Some("Maps to".to_string()),
            is_hierarchical: false,
            defines_ancestry: false,
        }
    }
}

impl ConceptStore for TestConceptStore {
    fn concept_view(&self, id: i64) -> Result<Concept> {
        self.concepts.get(&id).cloned().ok_or_else(|| GraphError::NotFound {
            kind: "concept".to_string(),
            id: id.to_string(),
        })
    }

    fn concept_id_by_code(&self, vocabulary_id: &str, concept_code: &str) -> Result<i64> {
        self.concepts
            .values()
            .find(|c| c.vocabulary_id == vocabulary_id && c.concept_code == concept_code)
            .map(|c| c.concept_id)
            .ok_or_else(|| GraphError::NotFound {
                kind: "concept_code".to_string(),
                id: format!("{vocabulary_id}/{concept_code}"),
            })
    }

    fn predicate(&self, relationship_id: &str) -> Result<Predicate> {
        self.predicates.get(relationship_id).cloned().ok_or_else(|| GraphError::NotFound {
            kind: "predicate".to_string(),
            id: relationship_id.to_string(),
        })
    }

    fn predicate_kind(&self, relationship_id: &str) -> Result<PredicateKind> {
        let predicate = self.predicate(relationship_id)?;
        let reverse = predicate
            .reverse_id
            .as_ref()
            .and_then(|rid| self.predicates.get(rid));
        Ok(PredicateKind::classify(&predicate, reverse))
    }

    fn iter_edges(&self, id: i64, filter: &EdgeFilter) -> Result<Vec<Edge>> {
        let mut result = Vec::new();
        for edge in &self.edges {
            let matches_node = match filter.direction {
                EdgeDirection::Outgoing => edge.subject_id == id,
                EdgeDirection::Incoming => edge.object_id == id,
            };
            if !matches_node {
                continue;
            }
            if filter.active_only && !edge.is_active_on(filter.on) {
                continue;
            }
            if filter.within_domain {
                let subject = self.concept_view(edge.subject_id)?;
                let object = self.concept_view(edge.object_id)?;
                if subject.domain_id != object.domain_id {
                    continue;
                }
            }
            if let Some(kinds) = &filter.predicate_kinds {
                let kind = self.predicate_kind(&edge.predicate_id)?;
                if !kinds.contains(&kind) {
                    continue;
                }
            }
            if let PredicateRef::ById(rid) = &filter.predicate {
                if &edge.predicate_id != rid {
                    continue;
                }
            }
            if let PredicateRef::Full(p) = &filter.predicate {
                if edge.predicate_id != p.relationship_id {
                    continue;
                }
            }
            result.push(edge.clone());
        }
        Ok(result)
    }

    fn parents(&self, id: i64) -> Result<Vec<i64>> {
        let filter = EdgeFilter::outgoing().with_predicate(PredicateRef::ById("Is a".to_string()));
        Ok(self.iter_edges(id, &filter)?.into_iter().map(|e| e.object_id).collect())
    }

    fn roots(&self, domain_id: Option<&str>, vocabulary_id: Option<&str>) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = self
            .concepts
            .values()
            .filter(|c| domain_id.map_or(true, |d| c.domain_id == d))
            .filter(|c| vocabulary_id.map_or(true, |v| c.vocabulary_id == v))
            .filter(|c| self.parents(c.concept_id).map(|p| p.is_empty()).unwrap_or(false))
            .map(|c| c.concept_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn leaves(&self, domain_id: Option<&str>, vocabulary_id: Option<&str>) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = self
            .concepts
            .values()
            .filter(|c| domain_id.map_or(true, |d| c.domain_id == d))
            .filter(|c| vocabulary_id.map_or(true, |v| c.vocabulary_id == v))
            .filter(|c| {
                !self.edges.iter().any(|e| e.object_id == c.concept_id && e.predicate_id == "Is a")
            })
            .map(|c| c.concept_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn singletons(&self, domain_id: Option<&str>, vocabulary_id: Option<&str>) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = self
            .concepts
            .values()
            .filter(|c| domain_id.map_or(true, |d| c.domain_id == d))
            .filter(|c| vocabulary_id.map_or(true, |v| c.vocabulary_id == v))
            .filter(|c| !self.edges.iter().any(|e| e.subject_id == c.concept_id || e.object_id == c.concept_id))
            .map(|c| c.concept_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn label_lookup(&self, text: &str, fuzzy: bool) -> Result<Vec<LabelMatch>> {
        let normalized = normalize_label(text);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let mut concept_ids: Vec<i64> = self.concepts.keys().copied().collect();
        concept_ids.sort_unstable();

        let mut matches = Vec::new();
        for concept_id in concept_ids {
            let concept = &self.concepts[&concept_id];
            let label_norm = normalize_label(&concept.concept_name);
            let is_match = if fuzzy { label_norm.contains(&normalized) } else { label_norm == normalized };
            if is_match {
                matches.push(LabelMatch {
                    input_label: normalized.clone(),
                    matched_label: concept.concept_name.clone(),
                    concept_id: concept.concept_id,
                    match_kind: MatchKind::Direct,
                    is_standard: concept.is_standard(),
                    is_active: concept.is_active_on(None),
                });
            }
        }
        Ok(matches)
    }

    fn synonym_lookup(&self, text: &str, fuzzy: bool) -> Result<Vec<LabelMatch>> {
        let normalized = normalize_label(text);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let mut concept_ids: Vec<i64> = self.synonyms.keys().copied().collect();
        concept_ids.sort_unstable();

        let mut matches = Vec::new();
        for concept_id in concept_ids {
            let concept = self.concept_view(concept_id)?;
            for synonym in &self.synonyms[&concept_id] {
                let synonym_norm = normalize_label(synonym);
                let is_match = if fuzzy { synonym_norm.contains(&normalized) } else { synonym_norm == normalized };
                if is_match {
                    matches.push(LabelMatch {
                        input_label: normalized.clone(),
                        matched_label: synonym.clone(),
                        concept_id,
                        match_kind: MatchKind::Synonym,
                        is_standard: concept.is_standard(),
                        is_active: concept.is_active_on(None),
                    });
                }
            }
        }
        Ok(matches)
    }

    fn synonyms_for_concept(&self, id: i64) -> Result<Vec<String>> {
        Ok(self.synonyms.get(&id).cloned().unwrap_or_default())
    }
}
