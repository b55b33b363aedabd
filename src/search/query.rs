//! Composed search query descriptions and paging windows

use crate::search::clause::Clause;
use crate::search::filter::{FilterPredicate, FilterSet};
use serde::{Deserialize, Serialize};

/// Offset used when a caller does not supply one
pub const DEFAULT_OFFSET: usize = 0;
/// Limit used when a caller does not supply one
pub const DEFAULT_LIMIT: usize = 100;
/// Largest bounded window read in one request
pub const DEFAULT_MAX_RESULTS: usize = 10_000;

/// Upper bound of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Limit {
    Bounded(usize),
    /// Every match from the offset on
    All,
}

/// Offset-based slice of a ranked result stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub offset: usize,
    pub limit: Limit,
}

impl Window {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Limit::Bounded(limit),
        }
    }

    /// Every match
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: Limit::All,
        }
    }

    /// Window from optional caller input, filling gaps with the defaults
    pub fn page(offset: Option<usize>, limit: Option<usize>) -> Self {
        Self::page_with_default(offset, limit, DEFAULT_LIMIT)
    }

    pub fn page_with_default(offset: Option<usize>, limit: Option<usize>, default_limit: usize) -> Self {
        Self::new(offset.unwrap_or(DEFAULT_OFFSET), limit.unwrap_or(default_limit))
    }

    /// Number of hits the window can hold, `None` when unbounded
    pub fn size(&self) -> Option<usize> {
        match self.limit {
            Limit::Bounded(limit) => Some(limit),
            Limit::All => None,
        }
    }

    /// Clamp a bounded window to `max`
    pub fn capped(self, max: usize) -> Self {
        match self.limit {
            Limit::Bounded(limit) if limit > max => Self::new(self.offset, max),
            _ => self,
        }
    }

    /// Apply this window to an already ranked sequence
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Limit::Bounded(limit) => iter.take(limit).collect(),
            Limit::All => iter.collect(),
        }
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new(DEFAULT_OFFSET, DEFAULT_LIMIT)
    }
}

/// Immutable description of one search: what to score, what to filter, how
/// to deduplicate and which window to read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuerySpec {
    relevance: Clause,
    filters: FilterSet,
    dedup_field: Option<String>,
    projection: Option<Vec<String>>,
    window: Window,
}

impl SearchQuerySpec {
    /// Create a spec scored by `relevance`
    pub fn new(relevance: Clause) -> Self {
        Self {
            relevance,
            filters: FilterSet::default(),
            dedup_field: None,
            projection: None,
            window: Window::default(),
        }
    }

    /// Spec matching every record
    pub fn match_all() -> Self {
        Self::new(Clause::MatchAll)
    }

    /// Set filters
    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Keep only the first-ranked record for each value of `field`
    pub fn with_dedup_field(mut self, field: impl Into<String>) -> Self {
        self.dedup_field = Some(field.into());
        self
    }

    /// Fields returned by projection reads
    pub fn with_projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Set window
    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    /// Copy of this spec that additionally requires `field` to hold one of
    /// `values`; `None` when that contradicts an existing include on `field`
    pub fn narrowed<I, V>(&self, field: &str, values: I) -> Option<Self>
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let mut narrowed = self.clone();
        narrowed.filters.restrict(field, values).then_some(narrowed)
    }

    pub fn relevance(&self) -> &Clause {
        &self.relevance
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn filter_predicate(&self) -> FilterPredicate {
        self.filters.to_predicate()
    }

    pub fn dedup_field(&self) -> Option<&str> {
        self.dedup_field.as_deref()
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    pub fn window(&self) -> Window {
        self.window
    }
}
