//! The phenotype simplifier: aggregates a compact set of ancestor concepts
//! that cover a seed set, then greedily selects the smallest high-purity
//! cover. Mirrors the five-stage aggregation pipeline (standardize, walk up,
//! standardize again, measure pollution, filter) described in
//! SPEC_FULL.md §4.6.

use crate::error::Result;
use crate::model::ParentStatistics;
use crate::store::{ConceptStore, EdgeFilter, PredicateRef};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::info;

#[derive(Debug, Clone)]
pub struct CommonParentsOptions {
    pub min_coverage: usize,
    pub max_up_depth: Option<usize>,
}

impl Default for CommonParentsOptions {
    fn default() -> Self {
        Self { min_coverage: 2, max_up_depth: None }
    }
}

#[derive(Debug, Clone)]
pub struct ParentCoverOptions {
    pub target_coverage_ratio: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub min_gain: usize,
}

impl Default for ParentCoverOptions {
    fn default() -> Self {
        Self {
            target_coverage_ratio: 1.0,
            alpha: 1.0,
            beta: 1.0,
            gamma: 0.3,
            delta: 0.7,
            min_gain: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupRelation {
    pub subsumed: i64,
    pub subsumes: i64,
    pub overlap: usize,
}

const IS_A: &str = "Is a";
const MAPS_TO: &str = "Maps to";
const SUBSUMES: &str = "Subsumes";

fn standardize(store: &dyn ConceptStore, id: i64) -> Result<i64> {
    let filter = EdgeFilter::outgoing().with_predicate(PredicateRef::ById(MAPS_TO.to_string()));
    let edges = store.iter_edges(id, &filter)?;
    Ok(edges.first().map(|e| e.object_id).unwrap_or(id))
}

/// Stages 1-5: aggregate ancestor statistics for `seeds`, filtered to
/// candidates with at least `min_coverage` seed descendants.
pub fn find_common_parents(
    store: &dyn ConceptStore,
    seeds: &[i64],
    options: &CommonParentsOptions,
) -> Result<HashMap<i64, ParentStatistics>> {
    let seed_set: HashSet<i64> = seeds.iter().copied().collect();

    // Stage 1: standardize seeds.
    let mut standard_seeds = HashSet::new();
    for &seed in seeds {
        standard_seeds.insert(standardize(store, seed)?);
    }

    // Stage 2: upward walk via "Is a", one origin at a time.
    let mut raw: HashMap<i64, ParentStatistics> = HashMap::new();
    for &origin in &standard_seeds {
        let mut visited = HashSet::new();
        visited.insert(origin);
        let mut frontier: VecDeque<(i64, usize)> = VecDeque::from([(origin, 0)]);

        while let Some((current, depth)) = frontier.pop_front() {
            if let Some(max_depth) = options.max_up_depth {
                if depth >= max_depth {
                    continue;
                }
            }
            let filter = EdgeFilter::outgoing().with_predicate(PredicateRef::ById(IS_A.to_string()));
            for edge in store.iter_edges(current, &filter)? {
                let parent = edge.object_id;
                if parent == current {
                    continue;
                }
                let next_depth = depth + 1;
                let stats = raw.entry(parent).or_default();
                stats.found.insert(origin);
                stats.descendants.insert(origin);
                stats.max_depth = stats.max_depth.max(next_depth);

                if visited.insert(parent) {
                    frontier.push_back((parent, next_depth));
                }
            }
        }
    }

    // Stage 3: standardize parents, merging statistics that share a
    // standard id.
    let mut merged: HashMap<i64, ParentStatistics> = HashMap::new();
    for (parent_id, stats) in raw {
        let standard = standardize(store, parent_id)?;
        let entry = merged.entry(standard).or_default();
        entry.found.extend(stats.found);
        entry.descendants.extend(stats.descendants);
        entry.max_depth = entry.max_depth.max(stats.max_depth);
    }
    for stats in merged.values_mut() {
        stats.coverage = stats.descendants.len();
    }

    // Stage 4: pollution via "Subsumes" closure, not descending back into
    // seeds/standard_seeds.
    for (&parent_id, stats) in merged.iter_mut() {
        let closure = subsumes_closure(store, parent_id, &seed_set, &standard_seeds)?;
        stats.descendants.extend(closure.iter().copied());
        let pollution_set: HashSet<i64> = closure
            .difference(&standard_seeds)
            .copied()
            .filter(|id| !seed_set.contains(id))
            .collect();
        stats.pollution = pollution_set.len();
        stats.purity = if stats.coverage + stats.pollution == 0 {
            0.0
        } else {
            stats.coverage as f64 / (stats.coverage + stats.pollution) as f64
        };
        stats.completeness = stats.coverage as f64 / (seed_set.len().max(1) as f64);
    }

    // Stage 5: filter by min_coverage.
    merged.retain(|_, stats| stats.coverage >= options.min_coverage);

    info!(candidates = merged.len(), seeds = seeds.len(), "found common parent candidates");
    Ok(merged)
}

fn subsumes_closure(
    store: &dyn ConceptStore,
    root: i64,
    seed_set: &HashSet<i64>,
    standard_seeds: &HashSet<i64>,
) -> Result<HashSet<i64>> {
    let mut closure = HashSet::new();
    let mut visited = HashSet::new();
    visited.insert(root);
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        let filter = EdgeFilter::outgoing().with_predicate(PredicateRef::ById(SUBSUMES.to_string()));
        for edge in store.iter_edges(node, &filter)? {
            let child = edge.object_id;
            if !visited.insert(child) {
                continue;
            }
            closure.insert(child);
            if seed_set.contains(&child) || standard_seeds.contains(&child) {
                continue;
            }
            stack.push(child);
        }
    }

    Ok(closure)
}

fn score(gain: usize, purity: f64, pollution: usize, max_depth: usize, options: &ParentCoverOptions) -> f64 {
    let numerator = (gain as f64).powf(options.alpha) * purity.powf(options.beta);
    let denominator = (1.0 + pollution as f64).powf(options.gamma) * (1.0 + max_depth as f64).powf(options.delta);
    numerator / denominator
}

/// Greedily selects ancestors from `candidates` until `target_coverage_ratio`
/// of `seeds` is covered or no candidate clears `min_gain`. Ties break on
/// ascending concept id (first-encountered, in a stable iteration order).
pub fn greedy_parent_cover(
    seeds: &[i64],
    candidates: &HashMap<i64, ParentStatistics>,
    options: &ParentCoverOptions,
) -> Vec<i64> {
    let seed_set: HashSet<i64> = seeds.iter().copied().collect();
    let total = seed_set.len().max(1);
    let mut remaining = seed_set.clone();
    let mut selected = Vec::new();

    let mut ordered_ids: Vec<i64> = candidates.keys().copied().collect();
    ordered_ids.sort_unstable();

    loop {
        let covered = total - remaining.len();
        if covered as f64 / total as f64 >= options.target_coverage_ratio {
            break;
        }

        let mut best: Option<(i64, f64)> = None;
        for &id in &ordered_ids {
            let stats = &candidates[&id];
            let gain = stats.found.intersection(&remaining).count();
            if gain < options.min_gain {
                continue;
            }
            let candidate_score = score(gain, stats.purity, stats.pollution, stats.max_depth, options);
            match best {
                Some((_, best_score)) if candidate_score <= best_score => {}
                _ => best = Some((id, candidate_score)),
            }
        }

        match best {
            Some((id, _)) => {
                let stats = &candidates[&id];
                remaining.retain(|s| !stats.found.contains(s));
                selected.push(id);
            }
            None => break,
        }
    }

    selected
}

/// Computes `subsumed_by` relations between every pair of selected groups:
/// `g1` is subsumed by `g2` when `g1.found` is a (possibly non-strict)
/// subset of `g2.found`.
pub fn group_relations(
    selected: &[i64],
    candidates: &HashMap<i64, ParentStatistics>,
) -> Vec<GroupRelation> {
    let mut relations = Vec::new();
    for &g1 in selected {
        for &g2 in selected {
            if g1 == g2 {
                continue;
            }
            let (Some(s1), Some(s2)) = (candidates.get(&g1), candidates.get(&g2)) else { continue };
            if s1.found.is_subset(&s2.found) {
                let overlap = s1.found.intersection(&s2.found).count();
                relations.push(GroupRelation { subsumed: g1, subsumes: g2, overlap });
            }
        }
    }
    relations
}
