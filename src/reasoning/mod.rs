//! The reasoning core: traversal, bidirectional shortest paths, path
//! scoring, term grounding, and the parent-cover (phenotype simplifier)
//! algorithm. Every function here takes a `&dyn ConceptStore` (or a generic
//! bound on `ConceptStore`) and runs to completion on the caller's thread -
//! no internal parallelism, per the concurrency model.

pub mod grounding;
pub mod parent_cover;
pub mod paths;
pub mod scoring;
pub mod traverse;

pub use grounding::{ground_term, GroundingCandidate, GroundingConstraints};
pub use parent_cover::{
    find_common_parents, greedy_parent_cover, group_relations, CommonParentsOptions, GroupRelation,
    ParentCoverOptions,
};
pub use paths::{find_shortest_paths, PathSearchOptions};
pub use scoring::{explain_path, path_profile, rank_paths, PathExplanation, StepExplanation};
pub use traverse::{traverse, TraverseOptions};
