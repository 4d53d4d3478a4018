//! Domain types for the OMOP-CDM vocabulary graph: concepts, predicates,
//! edges, and the derived path/subgraph/trace shapes the algorithms produce.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A vocabulary concept. Immutable once read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub concept_id: i64,
    pub concept_name: String,
    pub concept_code: String,
    pub vocabulary_id: String,
    pub domain_id: String,
    pub concept_class_id: String,
    /// `None` / `Some("S")` / `Some("C")` / other.
    pub standard_concept: Option<String>,
    pub valid_start_date: chrono::NaiveDate,
    pub valid_end_date: chrono::NaiveDate,
    /// `"D"` (deleted), `"U"` (updated), or `None`.
    pub invalid_reason: Option<String>,
}

impl Concept {
    pub fn is_standard(&self) -> bool {
        self.standard_concept.as_deref() == Some("S")
    }

    pub fn is_active_on(&self, on: Option<chrono::NaiveDate>) -> bool {
        if self.invalid_reason.is_some() {
            return false;
        }
        match on {
            None => true,
            Some(d) => d >= self.valid_start_date && d <= self.valid_end_date,
        }
    }
}

/// A relationship type between two concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub relationship_id: String,
    pub name: String,
    pub reverse_id: Option<String>,
    pub is_hierarchical: bool,
    pub defines_ancestry: bool,
}

/// The classification bucket a predicate falls into. Computed once per
/// predicate and memoized by the store adapter (see `store::ConceptStore`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredicateKind {
    Ontological,
    Mapping,
    Versioning,
    Attribute,
    Metadata,
}

impl PredicateKind {
    /// Classify a predicate given its own record and, when it exists, its
    /// reverse predicate's record. Rule order matters: the first matching
    /// rule wins.
    pub fn classify(predicate: &Predicate, reverse: Option<&Predicate>) -> Self {
        if predicate.defines_ancestry || predicate.is_hierarchical {
            return PredicateKind::Ontological;
        }

        let lower = predicate.name.to_lowercase();
        if lower.contains("maps to") || lower.contains("mapped from") || lower.contains("equivalent") {
            return PredicateKind::Mapping;
        }
        if lower.contains("replaced") || lower.contains("replaces") {
            return PredicateKind::Versioning;
        }
        if lower.starts_with("has ") {
            return PredicateKind::Attribute;
        }
        if let Some(rev) = reverse {
            if rev.name.to_lowercase().starts_with("has ") {
                return PredicateKind::Metadata;
            }
        }
        // No reverse predicate and no matching name pattern: treated as
        // Metadata per the open-question default (see SPEC_FULL.md §9).
        PredicateKind::Metadata
    }

    pub fn label(self) -> &'static str {
        match self {
            PredicateKind::Ontological => "ontological",
            PredicateKind::Mapping => "mapping",
            PredicateKind::Versioning => "versioning",
            PredicateKind::Attribute => "attribute",
            PredicateKind::Metadata => "metadata",
        }
    }
}

/// A directed edge in the concept graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub subject_id: i64,
    pub predicate_id: String,
    pub object_id: i64,
    pub valid_start_date: Option<chrono::NaiveDate>,
    pub valid_end_date: Option<chrono::NaiveDate>,
    pub invalid_reason: Option<String>,
}

impl Edge {
    pub fn is_active_on(&self, on: Option<chrono::NaiveDate>) -> bool {
        if self.invalid_reason.is_some() {
            return false;
        }
        let Some(d) = on else { return true };
        if let Some(start) = self.valid_start_date {
            if d < start {
                return false;
            }
        }
        if let Some(end) = self.valid_end_date {
            if d > end {
                return false;
            }
        }
        true
    }
}

/// A label or synonym match surfaced by `ConceptStore::label_lookup` /
/// `synonym_lookup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMatch {
    pub input_label: String,
    pub matched_label: String,
    pub concept_id: i64,
    pub match_kind: MatchKind,
    pub is_standard: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    Direct,
    Synonym,
}

impl LabelMatch {
    /// Ascending rank key: lower is better. Standard beats non-standard,
    /// active beats inactive, direct beats synonym.
    pub fn rank_key(&self) -> (bool, bool, bool) {
        (!self.is_standard, !self.is_active, self.match_kind == MatchKind::Synonym)
    }
}

/// One hop in a `GraphPath`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub subject: i64,
    pub predicate_id: String,
    pub object: i64,
}

/// An ordered sequence of steps from a source concept to a target concept.
/// An empty path represents `source == target`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphPath {
    pub steps: Vec<PathStep>,
}

impl GraphPath {
    pub fn empty() -> Self {
        GraphPath { steps: Vec::new() }
    }

    pub fn hops(&self) -> usize {
        self.steps.len()
    }

    /// Node sequence: source, then each step's object. Length is always
    /// `hops() + 1`.
    pub fn nodes(&self) -> Vec<i64> {
        if self.steps.is_empty() {
            return Vec::new();
        }
        let mut nodes = Vec::with_capacity(self.steps.len() + 1);
        nodes.push(self.steps[0].subject);
        for step in &self.steps {
            nodes.push(step.object);
        }
        nodes
    }

    pub fn source(&self) -> Option<i64> {
        self.steps.first().map(|s| s.subject)
    }

    pub fn target(&self) -> Option<i64> {
        self.steps.last().map(|s| s.object)
    }
}

/// Quality profile of a `GraphPath`, used both for ranking and for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathProfile {
    pub hops: usize,
    pub invalid_concepts: usize,
    pub non_standard_concepts: usize,
    pub vocab_switches: usize,
    pub ontological_edges: usize,
    pub mapping_edges: usize,
    pub metadata_edges: usize,
}

impl PathProfile {
    /// Lexicographic rank key, ascending (lower is better). See
    /// SPEC_FULL.md §4.4 for the rationale behind the ordering.
    pub fn rank_key(&self) -> (usize, usize, usize, usize, usize, usize, i64) {
        (
            self.invalid_concepts,
            self.non_standard_concepts,
            self.metadata_edges,
            self.mapping_edges,
            self.vocab_switches,
            self.hops,
            -(self.ontological_edges as i64),
        )
    }
}

/// A node/edge set produced by `traverse`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: HashSet<i64>,
    pub edges: Vec<Edge>,
}

impl Subgraph {
    /// Insert an edge, deduplicating on `(subject, predicate, object)`.
    pub fn add_edge(&mut self, edge: Edge) {
        let exists = self.edges.iter().any(|e| {
            e.subject_id == edge.subject_id
                && e.predicate_id == edge.predicate_id
                && e.object_id == edge.object_id
        });
        if !exists {
            self.nodes.insert(edge.subject_id);
            self.nodes.insert(edge.object_id);
            self.edges.push(edge);
        }
    }
}

/// One step of a breadth-first exploration, captured for explanation/replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub depth: usize,
    pub node: i64,
    pub expanded_edges: Vec<Edge>,
}

/// The record of a `traverse` or `find_shortest_paths` run, independent of
/// its result value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphTrace {
    pub seeds: Vec<i64>,
    pub steps: Vec<TraceStep>,
    pub terminated_reason: Option<String>,
}

/// Aggregated statistics for one ancestor candidate in the parent-cover
/// algorithm (`algorithms::parent_cover`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParentStatistics {
    pub descendants: HashSet<i64>,
    pub found: HashSet<i64>,
    pub coverage: usize,
    pub pollution: usize,
    pub completeness: f64,
    pub purity: f64,
    pub max_depth: usize,
}
