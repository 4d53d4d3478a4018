//! The `ConceptStore` trait: the sole dependency boundary between the
//! reasoning core and the vocabulary database. All methods are synchronous
//! and blocking - per the concurrency model, algorithms run to completion on
//! the caller's thread and the store carries its own timeout.

pub mod postgres;

/// In-memory fixture store for the algorithm test suites. Exposed behind the
/// `test-support` feature (rather than plain `cfg(test)`) so integration
/// tests under `tests/` can build fixtures too.
#[cfg(any(test, feature = "test-support"))]
pub mod test_store;

use crate::error::Result;
use crate::model::{Concept, LabelMatch, Predicate, PredicateKind};

/// Direction to read edges in, relative to a given concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    Outgoing,
    Incoming,
}

/// A predicate referenced either by its relationship id, as a resolved
/// record, or left unconstrained. Mirrors the dynamic predicate argument the
/// distilled source accepts as a string id, a full record, or `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateRef {
    Any,
    ById(String),
    Full(Predicate),
}

impl PredicateRef {
    pub fn relationship_id(&self) -> Option<&str> {
        match self {
            PredicateRef::Any => None,
            PredicateRef::ById(id) => Some(id.as_str()),
            PredicateRef::Full(p) => Some(p.relationship_id.as_str()),
        }
    }
}

/// Filter applied by `ConceptStore::iter_edges`. Constructed with `Default`
/// and adjusted via builder methods so call sites read like the filter they
/// express.
#[derive(Debug, Clone)]
pub struct EdgeFilter {
    pub direction: EdgeDirection,
    pub predicate: PredicateRef,
    pub predicate_kinds: Option<Vec<PredicateKind>>,
    pub active_only: bool,
    pub on: Option<chrono::NaiveDate>,
    pub within_domain: bool,
}

impl Default for EdgeFilter {
    fn default() -> Self {
        Self {
            direction: EdgeDirection::Outgoing,
            predicate: PredicateRef::Any,
            predicate_kinds: None,
            active_only: true,
            on: None,
            within_domain: false,
        }
    }
}

impl EdgeFilter {
    pub fn outgoing() -> Self {
        Self { direction: EdgeDirection::Outgoing, ..Default::default() }
    }

    pub fn incoming() -> Self {
        Self { direction: EdgeDirection::Incoming, ..Default::default() }
    }

    pub fn with_predicate(mut self, predicate: PredicateRef) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_predicate_kinds(mut self, kinds: Vec<PredicateKind>) -> Self {
        self.predicate_kinds = Some(kinds);
        self
    }

    pub fn with_on(mut self, on: chrono::NaiveDate) -> Self {
        self.on = Some(on);
        self
    }

    pub fn within_domain(mut self) -> Self {
        self.within_domain = true;
        self
    }
}

/// Normalizes a label before lookup: trim, lower-case, collapse internal
/// whitespace runs to a single space.
pub fn normalize_label(text: &str) -> String {
    text.trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Read-only access to the vocabulary graph. Implementations must be
/// deterministic within a session and memoize reads per SPEC_FULL.md §4.1 /
/// §10.4; the trait itself only promises behavior, not caching.
pub trait ConceptStore {
    fn concept_view(&self, id: i64) -> Result<Concept>;

    fn concept_id_by_code(&self, vocabulary_id: &str, concept_code: &str) -> Result<i64>;

    fn predicate(&self, relationship_id: &str) -> Result<Predicate>;

    fn predicate_kind(&self, relationship_id: &str) -> Result<PredicateKind>;

    /// Edges out of or into `id`, filtered per `filter`. This is the single
    /// generator every algorithm in this crate consumes; see SPEC_FULL.md
    /// §4.1 for the exact filter-ordering semantics.
    fn iter_edges(&self, id: i64, filter: &EdgeFilter) -> Result<Vec<crate::model::Edge>>;

    /// One-hop ancestry parents (`min_levels_of_separation == 1`).
    fn parents(&self, id: i64) -> Result<Vec<i64>>;

    fn roots(&self, domain_id: Option<&str>, vocabulary_id: Option<&str>) -> Result<Vec<i64>>;

    fn leaves(&self, domain_id: Option<&str>, vocabulary_id: Option<&str>) -> Result<Vec<i64>>;

    fn singletons(&self, domain_id: Option<&str>, vocabulary_id: Option<&str>) -> Result<Vec<i64>>;

    fn label_lookup(&self, text: &str, fuzzy: bool) -> Result<Vec<LabelMatch>>;

    fn synonym_lookup(&self, text: &str, fuzzy: bool) -> Result<Vec<LabelMatch>>;

    fn synonyms_for_concept(&self, id: i64) -> Result<Vec<String>>;

    /// Drops every memoized read. Implementations with no cache may no-op.
    fn clear_caches(&self) {}
}
