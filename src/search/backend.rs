//! The search backend capability consumed by the executor
//!
//! Query construction never depends on a concrete index. Anything that can
//! rank records for a [`Clause`] under a [`FilterPredicate`] implements
//! [`SearchBackend`]; the bundled implementation is
//! [`crate::search::TantivyBackend`].

use crate::search::clause::Clause;
use crate::search::error::SearchResult;
use crate::search::filter::FilterPredicate;
use crate::search::query::Window;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Values of the requested fields of one hit, in request order; `None` when
/// the record has no value for a field
pub type ProjectionRow = Vec<Option<String>>;

/// A ranked record returned by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Identity key of the record
    pub id: String,

    /// Relevance score
    pub score: f32,

    /// Stored field values
    pub fields: BTreeMap<String, Vec<String>>,
}

impl SearchHit {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.entry(field.into()).or_default().push(value.into());
        self
    }

    /// First stored value of `field`
    pub fn first(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.first()).map(String::as_str)
    }

    /// Every stored value of `field`
    pub fn all(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Relevance clause plus filter layer, as submitted to a backend
#[derive(Debug, Clone, Copy)]
pub struct BackendQuery<'a> {
    pub relevance: &'a Clause,
    pub filter: &'a FilterPredicate,
}

/// Ranked retrieval over an inverted index.
///
/// Implementations must return hits in a deterministic order for a fixed
/// query and index state: relevance first, ties in backend-native order.
pub trait SearchBackend {
    /// Ranked hits inside `window`
    fn search(&self, query: &BackendQuery<'_>, window: Window) -> SearchResult<Vec<SearchHit>>;

    /// Ranked rows of `fields` inside `window`
    fn project(&self, query: &BackendQuery<'_>, fields: &[String], window: Window) -> SearchResult<Vec<ProjectionRow>>;

    /// Number of matching records irrespective of any window
    fn count(&self, query: &BackendQuery<'_>) -> SearchResult<u64>;
}

impl<B: SearchBackend + ?Sized> SearchBackend for &B {
    fn search(&self, query: &BackendQuery<'_>, window: Window) -> SearchResult<Vec<SearchHit>> {
        (**self).search(query, window)
    }

    fn project(&self, query: &BackendQuery<'_>, fields: &[String], window: Window) -> SearchResult<Vec<ProjectionRow>> {
        (**self).project(query, fields, window)
    }

    fn count(&self, query: &BackendQuery<'_>) -> SearchResult<u64> {
        (**self).count(query)
    }
}

impl<B: SearchBackend + ?Sized> SearchBackend for Arc<B> {
    fn search(&self, query: &BackendQuery<'_>, window: Window) -> SearchResult<Vec<SearchHit>> {
        (**self).search(query, window)
    }

    fn project(&self, query: &BackendQuery<'_>, fields: &[String], window: Window) -> SearchResult<Vec<ProjectionRow>> {
        (**self).project(query, fields, window)
    }

    fn count(&self, query: &BackendQuery<'_>) -> SearchResult<u64> {
        (**self).count(query)
    }
}
