//! Concept graph reasoning engine
//!
//! A reasoning layer over the OMOP-CDM vocabulary schema: predicate
//! classification, bidirectional shortest-path search, hierarchical
//! traversal with tracing, multi-criteria path ranking, term grounding, and
//! the parent-cover (phenotype simplifier) algorithm.

pub mod error;
pub mod model;
pub mod reasoning;
pub mod resolver;
pub mod store;

pub use error::{CircuitBreaker, ErrorContext, GraphError, ResultExt, RetryExecutor, RetryPolicy, Result};
pub use model::*;
pub use reasoning::*;
pub use resolver::*;
pub use store::{normalize_label, ConceptStore, EdgeDirection, EdgeFilter, PredicateRef};
