//! `PostgresConceptStore`: a concrete, read-only `ConceptStore` over the
//! standard OMOP-CDM vocabulary tables (`concept`, `concept_relationship`,
//! `concept_ancestor`, `concept_synonym`). This is a reference adapter, not a
//! requirement of the reasoning core - any `ConceptStore` implementation
//! works - but OMOP-CDM is natively relational, so Postgres is the natural
//! backing store.

use crate::error::{CircuitBreaker, ErrorContext, GraphError, Result, RetryExecutor, RetryPolicy, ResultExt};
use crate::model::{Concept, Edge, LabelMatch, MatchKind, Predicate, PredicateKind};
use crate::store::{normalize_label, ConceptStore, EdgeDirection, EdgeFilter, PredicateRef};
use lru::LruCache;
use sqlx::{PgPool, Row};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use tokio::runtime::Handle;

/// Cache capacities, per SPEC_FULL.md §4.1 / §10.3.
#[derive(Debug, Clone, Copy)]
pub struct CacheSizes {
    pub concepts: usize,
    pub edges: usize,
    pub synonym_lists: usize,
    pub set_queries: usize,
    pub predicates: usize,
}

impl Default for CacheSizes {
    fn default() -> Self {
        Self {
            concepts: 200_000,
            edges: 200_000,
            synonym_lists: 50_000,
            set_queries: 20_000,
            predicates: 10_000,
        }
    }
}

/// Env-driven connection configuration, mirroring the `DgraphConfig`
/// env-loading pattern this codebase's service entrypoint used for its
/// previous graph backend.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub query_timeout_ms: u64,
    pub cache_sizes: CacheSizes,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("OMOP_DATABASE_URL").map_err(|_| GraphError::InvalidArgument {
            message: "OMOP_DATABASE_URL is not set".to_string(),
            argument: "OMOP_DATABASE_URL".to_string(),
        })?;
        let max_connections = std::env::var("OMOP_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let query_timeout_ms = std::env::var("OMOP_QUERY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30_000);
        Ok(Self {
            database_url,
            max_connections,
            query_timeout_ms,
            cache_sizes: CacheSizes::default(),
        })
    }
}

fn cache_of(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size.max(1)).unwrap()
}

pub struct PostgresConceptStore {
    pool: PgPool,
    runtime: Handle,
    retry: RetryExecutor,
    concepts: Mutex<LruCache<i64, Concept>>,
    predicates: Mutex<LruCache<String, Predicate>>,
    predicate_kinds: Mutex<LruCache<String, PredicateKind>>,
    synonyms: Mutex<LruCache<i64, Vec<String>>>,
    set_queries: Mutex<LruCache<String, Vec<i64>>>,
    /// Keyed by `{id}:{direction:?}:{predicate_id:?}` - the raw DB fetch
    /// before the caller's active/domain/kind filters are applied, since
    /// those filters are cheap to re-run per call and don't change the rows.
    edges: Mutex<LruCache<String, Vec<Edge>>>,
}

impl PostgresConceptStore {
    pub fn new(pool: PgPool, runtime: Handle, sizes: CacheSizes) -> Self {
        let breaker = CircuitBreaker::new("omop_store", 5, 2, std::time::Duration::from_secs(30));
        let retry = RetryExecutor::new(RetryPolicy::default()).with_circuit_breaker(breaker);
        Self {
            pool,
            runtime,
            retry,
            concepts: Mutex::new(LruCache::new(cache_of(sizes.concepts))),
            predicates: Mutex::new(LruCache::new(cache_of(sizes.predicates))),
            predicate_kinds: Mutex::new(LruCache::new(cache_of(sizes.predicates))),
            synonyms: Mutex::new(LruCache::new(cache_of(sizes.synonym_lists))),
            set_queries: Mutex::new(LruCache::new(cache_of(sizes.set_queries))),
            edges: Mutex::new(LruCache::new(cache_of(sizes.edges))),
        }
    }

    /// Runs a blocking query against the async pool. On a must-rollback
    /// state the pool itself already rolled back (sqlx pools return the
    /// connection on error); we surface the original error and never touch
    /// the caches above, per SPEC_FULL.md §5's failure-isolation rule.
    fn block_on<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut operation = operation;
        self.retry.execute(move || operation())
    }

    fn fetch_concept(&self, id: i64) -> Result<Concept> {
        let pool = self.pool.clone();
        let runtime = self.runtime.clone();
        self.block_on(move || {
            runtime.block_on(async {
                let row = sqlx::query(
                    "SELECT concept_id, concept_name, concept_code, vocabulary_id, domain_id, \
                     concept_class_id, standard_concept, valid_start_date, valid_end_date, invalid_reason \
                     FROM concept WHERE concept_id = $1",
                )
                .bind(id)
                .fetch_optional(&pool)
                .await
                .context("fetch_concept")?;

                let row = row.ok_or_else(|| GraphError::NotFound {
                    kind: "concept".to_string(),
                    id: id.to_string(),
                })?;

                Ok(Concept {
                    concept_id: row.try_get("concept_id").context("fetch_concept")?,
                    concept_name: row.try_get("concept_name").context("fetch_concept")?,
                    concept_code: row.try_get("concept_code").context("fetch_concept")?,
                    vocabulary_id: row.try_get("vocabulary_id").context("fetch_concept")?,
                    domain_id: row.try_get("domain_id").context("fetch_concept")?,
                    concept_class_id: row.try_get("concept_class_id").context("fetch_concept")?,
                    standard_concept: row.try_get("standard_concept").ok(),
                    valid_start_date: row.try_get("valid_start_date").context("fetch_concept")?,
                    valid_end_date: row.try_get("valid_end_date").context("fetch_concept")?,
                    invalid_reason: row.try_get("invalid_reason").ok(),
                })
            })
        })
    }

    fn fetch_predicate(&self, relationship_id: &str) -> Result<Predicate> {
        let pool = self.pool.clone();
        let runtime = self.runtime.clone();
        let relationship_id = relationship_id.to_string();
        self.block_on(move || {
            let relationship_id = relationship_id.clone();
            runtime.block_on(async {
                let row = sqlx::query(
                    "SELECT relationship_id, relationship_name, reverse_relationship_id, \
                     is_hierarchical, defines_ancestry FROM relationship WHERE relationship_id = $1",
                )
                .bind(&relationship_id)
                .fetch_optional(&pool)
                .await
                .context("fetch_predicate")?;

                let row = row.ok_or_else(|| GraphError::NotFound {
                    kind: "predicate".to_string(),
                    id: relationship_id.clone(),
                })?;

                let is_hierarchical: String = row.try_get("is_hierarchical").unwrap_or_default();
                let defines_ancestry: String = row.try_get("defines_ancestry").unwrap_or_default();

                Ok(Predicate {
                    relationship_id: row.try_get("relationship_id").context("fetch_predicate")?,
                    name: row.try_get("relationship_name").context("fetch_predicate")?,
                    reverse_id: row.try_get("reverse_relationship_id").ok(),
                    is_hierarchical: is_hierarchical == "1",
                    defines_ancestry: defines_ancestry == "1",
                })
            })
        })
    }
}

impl ConceptStore for PostgresConceptStore {
    fn concept_view(&self, id: i64) -> Result<Concept> {
        if let Some(hit) = self.concepts.lock().unwrap().get(&id).cloned() {
            return Ok(hit);
        }
        let concept = self.fetch_concept(id)?;
        self.concepts.lock().unwrap().put(id, concept.clone());
        Ok(concept)
    }

    fn concept_id_by_code(&self, vocabulary_id: &str, concept_code: &str) -> Result<i64> {
        let pool = self.pool.clone();
        let runtime = self.runtime.clone();
        let vocabulary_id = vocabulary_id.to_string();
        let concept_code = concept_code.to_string();
        self.block_on(move || {
            let vocabulary_id = vocabulary_id.clone();
            let concept_code = concept_code.clone();
            runtime.block_on(async {
                let row = sqlx::query(
                    "SELECT concept_id FROM concept WHERE vocabulary_id = $1 AND concept_code = $2",
                )
                .bind(&vocabulary_id)
                .bind(&concept_code)
                .fetch_optional(&pool)
                .await
                .with_context(|| ErrorContext::new("concept_id_by_code").with_store("postgres"))?;

                row.ok_or_else(|| GraphError::NotFound {
                    kind: "concept_code".to_string(),
                    id: format!("{vocabulary_id}/{concept_code}"),
                })
                .and_then(|r| r.try_get("concept_id").context("concept_id_by_code"))
            })
        })
    }

    fn predicate(&self, relationship_id: &str) -> Result<Predicate> {
        if let Some(hit) = self.predicates.lock().unwrap().get(relationship_id).cloned() {
            return Ok(hit);
        }
        let predicate = self.fetch_predicate(relationship_id)?;
        self.predicates.lock().unwrap().put(relationship_id.to_string(), predicate.clone());
        Ok(predicate)
    }

    fn predicate_kind(&self, relationship_id: &str) -> Result<PredicateKind> {
        if let Some(hit) = self.predicate_kinds.lock().unwrap().get(relationship_id).copied() {
            return Ok(hit);
        }
        let predicate = self.predicate(relationship_id)?;
        let reverse = match &predicate.reverse_id {
            Some(rid) => Some(self.predicate(rid)?),
            None => None,
        };
        let kind = PredicateKind::classify(&predicate, reverse.as_ref());
        self.predicate_kinds.lock().unwrap().put(relationship_id.to_string(), kind);
        Ok(kind)
    }

    fn iter_edges(&self, id: i64, filter: &EdgeFilter) -> Result<Vec<Edge>> {
        let predicate_id = filter.predicate.relationship_id().map(|s| s.to_string());
        let direction = filter.direction;
        let cache_key = format!("{id}:{direction:?}:{predicate_id:?}");

        let rows: Vec<Edge> = if let Some(hit) = self.edges.lock().unwrap().get(&cache_key).cloned() {
            hit
        } else {
            let pool = self.pool.clone();
            let runtime = self.runtime.clone();
            let fetched: Vec<Edge> = self.block_on(move || {
                let predicate_id = predicate_id.clone();
                runtime.block_on(async {
                    let (node_column, other_column) = match direction {
                        EdgeDirection::Outgoing => ("concept_id_1", "concept_id_2"),
                        EdgeDirection::Incoming => ("concept_id_2", "concept_id_1"),
                    };
                    let query = format!(
                        "SELECT {node_column} AS subject_id, relationship_id, {other_column} AS object_id, \
                         valid_start_date, valid_end_date, invalid_reason FROM concept_relationship \
                         WHERE {node_column} = $1 AND ($2::text IS NULL OR relationship_id = $2)",
                    );
                    let rows = sqlx::query(&query)
                        .bind(id)
                        .bind(predicate_id.as_deref())
                        .fetch_all(&pool)
                        .await
                        .context("iter_edges")?;

                    rows.into_iter()
                        .map(|row| {
                            Ok(Edge {
                                subject_id: row.try_get("subject_id").context("iter_edges")?,
                                predicate_id: row.try_get("relationship_id").context("iter_edges")?,
                                object_id: row.try_get("object_id").context("iter_edges")?,
                                valid_start_date: row.try_get("valid_start_date").ok(),
                                valid_end_date: row.try_get("valid_end_date").ok(),
                                invalid_reason: row.try_get("invalid_reason").ok(),
                            })
                        })
                        .collect::<Result<Vec<_>>>()
                })
            })?;
            self.edges.lock().unwrap().put(cache_key, fetched.clone());
            fetched
        };

        // Filters (b)-(d) mirror the direction-agnostic ordering in
        // SPEC_FULL.md §4.1: active window, domain match, predicate kind.
        let mut result = Vec::with_capacity(rows.len());
        for edge in rows {
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
            result.push(edge);
        }
        Ok(result)
    }

    fn parents(&self, id: i64) -> Result<Vec<i64>> {
        let cache_key = format!("parents:{id}");
        if let Some(hit) = self.set_queries.lock().unwrap().get(&cache_key).cloned() {
            return Ok(hit);
        }
        let pool = self.pool.clone();
        let runtime = self.runtime.clone();
        let parents: Vec<i64> = self.block_on(move || {
            runtime.block_on(async {
                let rows = sqlx::query(
                    "SELECT ancestor_concept_id FROM concept_ancestor \
                     WHERE descendant_concept_id = $1 AND min_levels_of_separation = 1",
                )
                .bind(id)
                .fetch_all(&pool)
                .await
                .context("parents")?;
                rows.into_iter()
                    .map(|r| r.try_get("ancestor_concept_id").context("parents"))
                    .collect::<Result<Vec<_>>>()
            })
        })?;
        self.set_queries.lock().unwrap().put(cache_key, parents.clone());
        Ok(parents)
    }

    fn roots(&self, domain_id: Option<&str>, vocabulary_id: Option<&str>) -> Result<Vec<i64>> {
        let cache_key = format!("roots:{domain_id:?}:{vocabulary_id:?}");
        if let Some(hit) = self.set_queries.lock().unwrap().get(&cache_key).cloned() {
            return Ok(hit);
        }
        let pool = self.pool.clone();
        let runtime = self.runtime.clone();
        let domain_id = domain_id.map(|s| s.to_string());
        let vocabulary_id = vocabulary_id.map(|s| s.to_string());
        let ids: Vec<i64> = self.block_on(move || {
            let domain_id = domain_id.clone();
            let vocabulary_id = vocabulary_id.clone();
            runtime.block_on(async {
                let rows = sqlx::query(
                    "SELECT c.concept_id FROM concept c \
                     WHERE ($1::text IS NULL OR c.domain_id = $1) \
                       AND ($2::text IS NULL OR c.vocabulary_id = $2) \
                       AND NOT EXISTS ( \
                         SELECT 1 FROM concept_ancestor ca \
                         WHERE ca.descendant_concept_id = c.concept_id AND ca.min_levels_of_separation = 1)",
                )
                .bind(domain_id.as_deref())
                .bind(vocabulary_id.as_deref())
                .fetch_all(&pool)
                .await
                .context("roots")?;
                rows.into_iter()
                    .map(|r| r.try_get("concept_id").context("roots"))
                    .collect::<Result<Vec<_>>>()
            })
        })?;
        self.set_queries.lock().unwrap().put(cache_key, ids.clone());
        Ok(ids)
    }

    fn leaves(&self, domain_id: Option<&str>, vocabulary_id: Option<&str>) -> Result<Vec<i64>> {
        let cache_key = format!("leaves:{domain_id:?}:{vocabulary_id:?}");
        if let Some(hit) = self.set_queries.lock().unwrap().get(&cache_key).cloned() {
            return Ok(hit);
        }
        let pool = self.pool.clone();
        let runtime = self.runtime.clone();
        let domain_id = domain_id.map(|s| s.to_string());
        let vocabulary_id = vocabulary_id.map(|s| s.to_string());
        let ids: Vec<i64> = self.block_on(move || {
            let domain_id = domain_id.clone();
            let vocabulary_id = vocabulary_id.clone();
            runtime.block_on(async {
                let rows = sqlx::query(
                    "SELECT c.concept_id FROM concept c \
                     WHERE ($1::text IS NULL OR c.domain_id = $1) \
                       AND ($2::text IS NULL OR c.vocabulary_id = $2) \
                       AND NOT EXISTS ( \
                         SELECT 1 FROM concept_ancestor ca \
                         WHERE ca.ancestor_concept_id = c.concept_id AND ca.min_levels_of_separation = 1)",
                )
                .bind(domain_id.as_deref())
                .bind(vocabulary_id.as_deref())
                .fetch_all(&pool)
                .await
                .context("leaves")?;
                rows.into_iter()
                    .map(|r| r.try_get("concept_id").context("leaves"))
                    .collect::<Result<Vec<_>>>()
            })
        })?;
        self.set_queries.lock().unwrap().put(cache_key, ids.clone());
        Ok(ids)
    }

    fn singletons(&self, domain_id: Option<&str>, vocabulary_id: Option<&str>) -> Result<Vec<i64>> {
        let cache_key = format!("singletons:{domain_id:?}:{vocabulary_id:?}");
        if let Some(hit) = self.set_queries.lock().unwrap().get(&cache_key).cloned() {
            return Ok(hit);
        }
        let pool = self.pool.clone();
        let runtime = self.runtime.clone();
        let domain_id = domain_id.map(|s| s.to_string());
        let vocabulary_id = vocabulary_id.map(|s| s.to_string());
        let ids: Vec<i64> = self.block_on(move || {
            let domain_id = domain_id.clone();
            let vocabulary_id = vocabulary_id.clone();
            runtime.block_on(async {
                let rows = sqlx::query(
                    "SELECT c.concept_id FROM concept c \
                     WHERE ($1::text IS NULL OR c.domain_id = $1) \
                       AND ($2::text IS NULL OR c.vocabulary_id = $2) \
                       AND NOT EXISTS (SELECT 1 FROM concept_relationship cr \
                         WHERE cr.concept_id_1 = c.concept_id OR cr.concept_id_2 = c.concept_id)",
                )
                .bind(domain_id.as_deref())
                .bind(vocabulary_id.as_deref())
                .fetch_all(&pool)
                .await
                .context("singletons")?;
                rows.into_iter()
                    .map(|r| r.try_get("concept_id").context("singletons"))
                    .collect::<Result<Vec<_>>>()
            })
        })?;
        self.set_queries.lock().unwrap().put(cache_key, ids.clone());
        Ok(ids)
    }

    fn label_lookup(&self, text: &str, fuzzy: bool) -> Result<Vec<LabelMatch>> {
        let normalized = normalize_label(text);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self.pool.clone();
        let runtime = self.runtime.clone();
        let pattern = if fuzzy { format!("%{normalized}%") } else { normalized.clone() };
        let op = if fuzzy { "ILIKE" } else { "=" };
        let query = format!(
            "SELECT concept_id, concept_name, standard_concept, invalid_reason, \
             valid_start_date, valid_end_date FROM concept WHERE lower(concept_name) {op} $1",
        );
        let rows = self.block_on(move || {
            let query = query.clone();
            let pattern = pattern.clone();
            runtime.block_on(async {
                sqlx::query(&query).bind(&pattern).fetch_all(&pool).await.context("label_lookup")
            })
        })?;

        rows.into_iter()
            .map(|row| {
                let standard: Option<String> = row.try_get("standard_concept").ok();
                let invalid: Option<String> = row.try_get("invalid_reason").ok();
                Ok(LabelMatch {
                    input_label: normalized.clone(),
                    matched_label: row.try_get("concept_name").context("label_lookup")?,
                    concept_id: row.try_get("concept_id").context("label_lookup")?,
                    match_kind: MatchKind::Direct,
                    is_standard: standard.as_deref() == Some("S"),
                    is_active: invalid.is_none(),
                })
            })
            .collect()
    }

    fn synonym_lookup(&self, text: &str, fuzzy: bool) -> Result<Vec<LabelMatch>> {
        let normalized = normalize_label(text);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self.pool.clone();
        let runtime = self.runtime.clone();
        let pattern = if fuzzy { format!("%{normalized}%") } else { normalized.clone() };
        let op = if fuzzy { "ILIKE" } else { "=" };
        let query = format!(
            "SELECT cs.concept_id, cs.concept_synonym_name, c.standard_concept, c.invalid_reason \
             FROM concept_synonym cs JOIN concept c ON c.concept_id = cs.concept_id \
             WHERE lower(cs.concept_synonym_name) {op} $1",
        );
        let rows = self.block_on(move || {
            let query = query.clone();
            let pattern = pattern.clone();
            runtime.block_on(async {
                sqlx::query(&query).bind(&pattern).fetch_all(&pool).await.context("synonym_lookup")
            })
        })?;

        rows.into_iter()
            .map(|row| {
                let standard: Option<String> = row.try_get("standard_concept").ok();
                let invalid: Option<String> = row.try_get("invalid_reason").ok();
                Ok(LabelMatch {
                    input_label: normalized.clone(),
                    matched_label: row.try_get("concept_synonym_name").context("synonym_lookup")?,
                    concept_id: row.try_get("concept_id").context("synonym_lookup")?,
                    match_kind: MatchKind::Synonym,
                    is_standard: standard.as_deref() == Some("S"),
                    is_active: invalid.is_none(),
                })
            })
            .collect()
    }

    fn synonyms_for_concept(&self, id: i64) -> Result<Vec<String>> {
        if let Some(hit) = self.synonyms.lock().unwrap().get(&id).cloned() {
            return Ok(hit);
        }
        let pool = self.pool.clone();
        let runtime = self.runtime.clone();
        let names: Vec<String> = self.block_on(move || {
            runtime.block_on(async {
                let rows = sqlx::query(
                    "SELECT concept_synonym_name FROM concept_synonym WHERE concept_id = $1",
                )
                .bind(id)
                .fetch_all(&pool)
                .await
                .context("synonyms_for_concept")?;
                rows.into_iter()
                    .map(|r| r.try_get("concept_synonym_name").context("synonyms_for_concept"))
                    .collect::<Result<Vec<_>>>()
            })
        })?;
        self.synonyms.lock().unwrap().put(id, names.clone());
        Ok(names)
    }

    fn clear_caches(&self) {
        self.concepts.lock().unwrap().clear();
        self.predicates.lock().unwrap().clear();
        self.predicate_kinds.lock().unwrap().clear();
        self.synonyms.lock().unwrap().clear();
        self.set_queries.lock().unwrap().clear();
        self.edges.lock().unwrap().clear();
    }
}
