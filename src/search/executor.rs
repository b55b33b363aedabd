//! Query execution, skip-same deduplication and pagination
//!
//! Execution is a two-step pipeline. [`SearchExecutor::prepare`] resolves the
//! dedup decision of a [`SearchQuerySpec`] (at most one extra backend round
//! trip) and yields a [`PreparedSearch`]. Every read on a prepared search
//! consumes it, so a spec is executed exactly once and every read honors the
//! same dedup decision.

use crate::search::backend::{BackendQuery, ProjectionRow, SearchBackend, SearchHit};
use crate::search::config::SearchConfig;
use crate::search::error::{SearchError, SearchResult};
use crate::search::filter::FilterPredicate;
use crate::search::query::{SearchQuerySpec, Window, DEFAULT_LIMIT, DEFAULT_MAX_RESULTS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A window of ranked results plus the total match count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPage<T> {
    /// Results in relevance order
    pub items: Vec<T>,

    /// Offset used for pagination
    pub offset: usize,

    /// Limit used for pagination
    pub limit: usize,

    /// Total number of matches before pagination
    pub total: u64,

    /// Whether matches exist past this page
    pub has_more: bool,
}

impl<T> ResultPage<T> {
    pub fn empty(offset: usize, limit: usize) -> Self {
        Self {
            items: Vec::new(),
            offset,
            limit,
            total: 0,
            has_more: false,
        }
    }

    /// Convert every item, keeping the paging metadata
    pub fn map<U, F>(self, f: F) -> ResultPage<U>
    where
        F: FnMut(T) -> U,
    {
        ResultPage {
            items: self.items.into_iter().map(f).collect(),
            offset: self.offset,
            limit: self.limit,
            total: self.total,
            has_more: self.has_more,
        }
    }

    /// Convert every item, failing on the first conversion error
    pub fn try_map<U, E, F>(self, f: F) -> Result<ResultPage<U>, E>
    where
        F: FnMut(T) -> Result<U, E>,
    {
        Ok(ResultPage {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            offset: self.offset,
            limit: self.limit,
            total: self.total,
            has_more: self.has_more,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Dedup values already claimed by earlier hits, possibly of an earlier search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenValues(HashSet<String>);

impl SeenValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value`; returns `true` the first time it is seen
    pub fn insert(&mut self, value: &str) -> bool {
        if self.0.contains(value) {
            false
        } else {
            self.0.insert(value.to_string())
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.contains(value)
    }

    pub fn extend_from(&mut self, other: &SeenValues) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// First-match-wins pass over ranked `(identity, dedup value)` rows.
///
/// A row is retained the first time its value is seen; rows without a value
/// are always retained and claim nothing. Returns retained identities in rank
/// order.
pub fn skip_same<I>(rows: I, seen: &mut SeenValues) -> Vec<String>
where
    I: IntoIterator<Item = (String, Option<String>)>,
{
    rows.into_iter()
        .filter_map(|(id, value)| match value {
            None => Some(id),
            Some(value) if seen.insert(&value) => Some(id),
            Some(_) => None,
        })
        .collect()
}

/// Runs [`SearchQuerySpec`]s against a [`SearchBackend`]
pub struct SearchExecutor<B> {
    backend: B,
    identity_field: String,
    default_limit: usize,
    max_results: usize,
}

impl<B: SearchBackend> SearchExecutor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            identity_field: "id".to_string(),
            default_limit: DEFAULT_LIMIT,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Take identity field and window limits from `config`
    pub fn with_config(mut self, config: &SearchConfig) -> Self {
        self.identity_field = config.identity_field.clone();
        self.default_limit = config.default_limit;
        self.max_results = config.max_results;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Resolve the dedup decision of `spec`
    pub fn prepare(&self, spec: SearchQuerySpec) -> SearchResult<PreparedSearch<'_, B>> {
        self.prepare_after(spec, None)
    }

    /// Resolve the dedup decision of `spec`, treating every value seen by an
    /// earlier search as already claimed
    pub fn prepare_after(
        &self,
        spec: SearchQuerySpec,
        previous: Option<&SeenValues>,
    ) -> SearchResult<PreparedSearch<'_, B>> {
        let mut seen = SeenValues::new();
        if let Some(previous) = previous {
            seen.extend_from(previous);
        }

        let Some(dedup_field) = spec.dedup_field().map(str::to_string) else {
            return Ok(self.prepared(spec, seen, false));
        };

        let predicate = spec.filter_predicate();
        let query = BackendQuery {
            relevance: spec.relevance(),
            filter: &predicate,
        };
        let fields = [self.identity_field.clone(), dedup_field.clone()];
        let rows = self.backend.project(&query, &fields, Window::all())?;
        let scanned = rows.len();

        let keyed = rows.into_iter().filter_map(|mut row| {
            let value = row.pop().flatten();
            let id = row.pop().flatten()?;
            Some((id, value))
        });
        let retained = skip_same(keyed, &mut seen);

        tracing::debug!(
            dedup_field = %dedup_field,
            scanned,
            retained = retained.len(),
            "Resolved skip-same dedup"
        );

        match spec.narrowed(&self.identity_field, retained) {
            Some(narrowed) => Ok(self.prepared(narrowed, seen, false)),
            None => Ok(self.prepared(spec, seen, true)),
        }
    }

    fn prepared(&self, spec: SearchQuerySpec, seen: SeenValues, short_circuit: bool) -> PreparedSearch<'_, B> {
        let predicate = spec.filter_predicate();
        PreparedSearch {
            executor: self,
            spec,
            predicate,
            seen,
            short_circuit,
        }
    }

    /// At most one hit; more than one is an error
    pub fn unique_result(&self, spec: SearchQuerySpec) -> SearchResult<Option<SearchHit>> {
        self.prepare(spec)?.unique_result()
    }

    /// Every matching hit in relevance order
    pub fn list(&self, spec: SearchQuerySpec) -> SearchResult<Vec<SearchHit>> {
        self.prepare(spec)?.list()
    }

    /// One page of hits; missing offset/limit fall back to the defaults
    pub fn list_page(
        &self,
        spec: SearchQuerySpec,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> SearchResult<ResultPage<SearchHit>> {
        self.prepare(spec)?.list_page(offset, limit)
    }

    /// Total number of matches
    pub fn count(&self, spec: SearchQuerySpec) -> SearchResult<u64> {
        self.prepare(spec)?.count()
    }

    /// Values of `fields` for every matching hit
    pub fn project_fields(&self, spec: SearchQuerySpec, fields: &[String]) -> SearchResult<Vec<ProjectionRow>> {
        self.prepare(spec)?.project_fields(fields)
    }
}

/// A spec whose dedup decision is resolved; each read consumes it
pub struct PreparedSearch<'e, B> {
    executor: &'e SearchExecutor<B>,
    spec: SearchQuerySpec,
    predicate: FilterPredicate,
    seen: SeenValues,
    short_circuit: bool,
}

impl<'e, B: SearchBackend> PreparedSearch<'e, B> {
    /// Dedup values claimed by this search, for chaining a dependent search
    pub fn seen_values(&self) -> &SeenValues {
        &self.seen
    }

    /// Whether dedup retained nothing, so every read is empty without a
    /// backend call
    pub fn is_short_circuited(&self) -> bool {
        self.short_circuit
    }

    /// The spec as it will be executed, including the retained-identity filter
    pub fn spec(&self) -> &SearchQuerySpec {
        &self.spec
    }

    fn query(&self) -> BackendQuery<'_> {
        BackendQuery {
            relevance: self.spec.relevance(),
            filter: &self.predicate,
        }
    }

    fn fetch(&self, window: Window) -> SearchResult<Vec<SearchHit>> {
        let window = window.capped(self.executor.max_results);
        tracing::debug!(
            relevance = %self.spec.relevance(),
            filter = %self.predicate,
            offset = window.offset,
            limit = ?window.size(),
            "Executing search"
        );
        self.executor.backend.search(&self.query(), window)
    }

    pub fn unique_result(self) -> SearchResult<Option<SearchHit>> {
        if self.short_circuit {
            return Ok(None);
        }

        let mut hits = self.fetch(Window::new(0, 2))?;
        match hits.len() {
            0 => Ok(None),
            1 => Ok(hits.pop()),
            count => Err(SearchError::NonUniqueResult { count }),
        }
    }

    pub fn list(self) -> SearchResult<Vec<SearchHit>> {
        if self.short_circuit {
            return Ok(Vec::new());
        }
        self.fetch(Window::all())
    }

    /// Read the window configured on the spec
    pub fn page(self) -> SearchResult<ResultPage<SearchHit>> {
        let window = self.spec.window();
        self.read_page(window)
    }

    pub fn list_page(self, offset: Option<usize>, limit: Option<usize>) -> SearchResult<ResultPage<SearchHit>> {
        let window = Window::page_with_default(offset, limit, self.executor.default_limit);
        self.read_page(window)
    }

    fn read_page(self, window: Window) -> SearchResult<ResultPage<SearchHit>> {
        let window = window.capped(self.executor.max_results);
        let limit = window.size().unwrap_or(usize::MAX);
        if self.short_circuit {
            return Ok(ResultPage::empty(window.offset, limit));
        }

        let total = self.executor.backend.count(&self.query())?;
        let items = if limit == 0 || window.offset as u64 >= total {
            Vec::new()
        } else {
            self.fetch(window)?
        };
        let has_more = ((window.offset + items.len()) as u64) < total;

        Ok(ResultPage {
            items,
            offset: window.offset,
            limit,
            total,
            has_more,
        })
    }

    pub fn count(self) -> SearchResult<u64> {
        if self.short_circuit {
            return Ok(0);
        }
        self.executor.backend.count(&self.query())
    }

    pub fn project_fields(self, fields: &[String]) -> SearchResult<Vec<ProjectionRow>> {
        if fields.is_empty() {
            return Err(SearchError::InvalidInput("at least one projection field is required".to_string()));
        }
        if self.short_circuit {
            return Ok(Vec::new());
        }
        self.executor.backend.project(&self.query(), fields, Window::all())
    }

    /// Project the fields configured on the spec
    pub fn project(self) -> SearchResult<Vec<ProjectionRow>> {
        let fields = self
            .spec
            .projection()
            .map(<[String]>::to_vec)
            .ok_or_else(|| SearchError::InvalidInput("spec has no projection fields".to_string()))?;
        self.project_fields(&fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::backend::testing::RankedBackend;
    use crate::search::filter::{FilterClause, FilterSet};
    use proptest::prelude::*;

    fn hit(id: &str, concept: Option<&str>) -> SearchHit {
        let hit = SearchHit::new(id, 1.0).with_field("class", "1");
        match concept {
            Some(concept) => hit.with_field("concept_id", concept),
            None => hit,
        }
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.id.as_str()).collect()
    }

    fn ranked() -> RankedBackend {
        RankedBackend::new(vec![
            hit("n1", Some("c1")),
            hit("n2", Some("c2")),
            hit("n3", Some("c1")),
            hit("n4", None),
            hit("n5", None),
            hit("n6", Some("c2")),
            hit("n7", Some("c3")),
        ])
    }

    #[test]
    fn test_unique_result_contract() {
        let backend = RankedBackend::new(vec![]);
        let executor = SearchExecutor::new(&backend);
        assert_eq!(executor.unique_result(SearchQuerySpec::match_all()).unwrap(), None);

        let backend = RankedBackend::new(vec![hit("only", Some("c1"))]);
        let executor = SearchExecutor::new(&backend);
        assert_eq!(executor.unique_result(SearchQuerySpec::match_all()).unwrap().unwrap().id, "only");

        let backend = RankedBackend::new(vec![hit("a", Some("c1")), hit("b", Some("c2"))]);
        let executor = SearchExecutor::new(&backend);
        let err = executor.unique_result(SearchQuerySpec::match_all()).unwrap_err();
        assert!(matches!(err, SearchError::NonUniqueResult { count: 2 }));
    }

    #[test]
    fn test_dedup_keeps_first_ranked_and_null_keys() {
        let backend = ranked();
        let executor = SearchExecutor::new(&backend);
        let spec = SearchQuerySpec::match_all().with_dedup_field("concept_id");

        let hits = executor.list(spec).unwrap();
        assert_eq!(ids(&hits), vec!["n1", "n2", "n4", "n5", "n7"]);
    }

    #[test]
    fn test_dedup_applies_to_count_and_pages() {
        let backend = ranked();
        let executor = SearchExecutor::new(&backend);
        let spec = SearchQuerySpec::match_all().with_dedup_field("concept_id");

        assert_eq!(executor.count(spec.clone()).unwrap(), 5);

        let page = executor.list_page(spec, Some(1), Some(2)).unwrap();
        assert_eq!(ids(&page.items), vec!["n2", "n4"]);
        assert_eq!(page.total, 5);
        assert!(page.has_more);
    }

    #[test]
    fn test_retained_identities_become_include_filter() {
        let backend = ranked();
        let executor = SearchExecutor::new(&backend);
        let prepared = executor
            .prepare(SearchQuerySpec::match_all().with_dedup_field("concept_id"))
            .unwrap();

        let retained = prepared.spec().filters().included("id").unwrap();
        assert_eq!(retained.len(), 5);
        assert!(!retained.contains("n3"));
        assert!(!prepared.is_short_circuited());
    }

    #[test]
    fn test_dedup_honors_existing_identity_filter() {
        let backend = ranked();
        let executor = SearchExecutor::new(&backend);
        let mut filters = FilterSet::new();
        filters.include("id", ["n1", "n3"]);
        let spec = SearchQuerySpec::match_all()
            .with_filters(filters)
            .with_dedup_field("concept_id");

        assert_eq!(ids(&executor.list(spec.clone()).unwrap()), vec!["n1"]);
        assert_eq!(executor.count(spec).unwrap(), 1);
    }

    #[test]
    fn test_short_circuit_skips_backend() {
        let backend = ranked();
        let executor = SearchExecutor::new(&backend);
        let mut filters = FilterSet::new();
        filters.include("class", ["9"]);
        let spec = SearchQuerySpec::match_all()
            .with_filters(filters)
            .with_dedup_field("concept_id");

        let prepared = executor.prepare(spec).unwrap();
        assert!(prepared.is_short_circuited());
        let calls_after_dedup = backend.calls.get();
        assert_eq!(calls_after_dedup, 1);

        let page = prepared.list_page(None, None).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.limit, 100);
        assert_eq!(backend.calls.get(), calls_after_dedup);
    }

    #[test]
    fn test_dedup_failure_aborts_search() {
        let mut backend = ranked();
        backend.fail_projection = true;
        let executor = SearchExecutor::new(&backend);

        let err = executor
            .list(SearchQuerySpec::match_all().with_dedup_field("concept_id"))
            .unwrap_err();
        assert!(err.is_backend());
        assert_eq!(backend.calls.get(), 1);
    }

    #[test]
    fn test_chained_dedup_shares_seen_values() {
        let backend = ranked();
        let executor = SearchExecutor::new(&backend);

        let mut first_filters = FilterSet::new();
        first_filters.include("id", ["n1", "n2"]);
        let first = executor
            .prepare(
                SearchQuerySpec::match_all()
                    .with_filters(first_filters)
                    .with_dedup_field("concept_id"),
            )
            .unwrap();
        let seen = first.seen_values().clone();
        assert_eq!(ids(&first.list().unwrap()), vec!["n1", "n2"]);

        let second = executor
            .prepare_after(SearchQuerySpec::match_all().with_dedup_field("concept_id"), Some(&seen))
            .unwrap();
        assert_eq!(ids(&second.list().unwrap()), vec!["n4", "n5", "n7"]);
    }

    #[test]
    fn test_filters_reach_backend() {
        let backend = ranked();
        let executor = SearchExecutor::new(&backend);
        let mut filters = FilterSet::new();
        filters.exclude("concept_id", ["c1"]);

        let hits = executor.list(SearchQuerySpec::match_all().with_filters(filters)).unwrap();
        assert_eq!(ids(&hits), vec!["n2", "n4", "n5", "n6", "n7"]);
        let filter = backend.last_filter.borrow().clone().unwrap();
        assert!(matches!(&filter.clauses[0], FilterClause::MustNot { field, .. } if field == "concept_id"));
    }

    #[test]
    fn test_projection_reads() {
        let backend = ranked();
        let executor = SearchExecutor::new(&backend);
        let spec = SearchQuerySpec::match_all()
            .with_dedup_field("concept_id")
            .with_projection(["concept_id"]);

        let rows = executor.prepare(spec.clone()).unwrap().project().unwrap();
        assert_eq!(rows[0], vec![Some("c1".to_string())]);
        assert_eq!(rows[2], vec![None]);

        let err = executor.project_fields(spec, &[]).unwrap_err();
        assert!(matches!(err, SearchError::InvalidInput(_)));
    }

    #[test]
    fn test_page_past_end() {
        let backend = ranked();
        let executor = SearchExecutor::new(&backend);
        let page = executor.list_page(SearchQuerySpec::match_all(), Some(50), Some(10)).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total, 7);
        assert!(!page.has_more);
    }

    #[test]
    fn test_caller_limit_is_capped() {
        let backend = ranked();
        let executor = SearchExecutor::new(&backend);
        let page = executor
            .list_page(SearchQuerySpec::match_all(), None, Some(usize::MAX))
            .unwrap();
        assert_eq!(page.limit, DEFAULT_MAX_RESULTS);
        assert_eq!(page.len(), 7);

        let small = SearchExecutor::new(&backend).with_config(&SearchConfig::builder().max_results(3).build());
        let page = small.list_page(SearchQuerySpec::match_all(), None, Some(50)).unwrap();
        assert_eq!(page.limit, 3);
        assert_eq!(ids(&page.items), vec!["n1", "n2", "n3"]);
        assert!(page.has_more);
    }

    proptest! {
        #[test]
        fn prop_skip_same_uniqueness(values in prop::collection::vec(prop::option::of(0u8..6), 0..40)) {
            let rows: Vec<(String, Option<String>)> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.map(|v| v.to_string())))
                .collect();
            let retained = skip_same(rows.clone(), &mut SeenValues::new());

            let mut keys = HashSet::new();
            for id in &retained {
                let index: usize = id.parse().unwrap();
                if let Some(value) = &rows[index].1 {
                    prop_assert!(keys.insert(value.clone()));
                    // first-ranked occurrence wins
                    let first = rows.iter().position(|(_, v)| v.as_ref() == Some(value)).unwrap();
                    prop_assert_eq!(first, index);
                }
            }
        }

        #[test]
        fn prop_skip_same_null_pass_through(values in prop::collection::vec(prop::option::of(0u8..3), 0..40)) {
            let rows: Vec<(String, Option<String>)> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.map(|v| v.to_string())))
                .collect();
            let retained: HashSet<String> = skip_same(rows.clone(), &mut SeenValues::new()).into_iter().collect();

            for (id, value) in &rows {
                if value.is_none() {
                    prop_assert!(retained.contains(id));
                }
            }
        }

        #[test]
        fn prop_pages_concatenate_to_list(n in 0usize..8, m in 0usize..8) {
            let backend = ranked();
            let executor = SearchExecutor::new(&backend);
            let spec = SearchQuerySpec::match_all().with_dedup_field("concept_id");

            let first = executor.list_page(spec.clone(), Some(0), Some(n)).unwrap();
            let second = executor.list_page(spec.clone(), Some(n), Some(m)).unwrap();
            let all = executor.list(spec).unwrap();

            let mut joined = ids(&first.items);
            let second_ids = ids(&second.items);
            prop_assert!(second_ids.iter().all(|id| !joined.contains(id)));
            joined.extend(second_ids);

            let expected: Vec<&str> = ids(&all).into_iter().take(n + m).collect();
            prop_assert_eq!(joined, expected);
        }
    }
}
