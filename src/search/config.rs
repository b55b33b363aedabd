//! Search configuration

use crate::search::error::{SearchError, SearchResult};
use crate::search::query::DEFAULT_MAX_RESULTS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Search engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Path to the search index directory; `None` keeps the index in RAM
    pub index_path: Option<PathBuf>,

    /// Index writer heap size in bytes (default: 50MB)
    pub writer_heap_size: usize,

    /// Page size used when a caller does not supply a limit
    pub default_limit: usize,

    /// Hard cap on the size of a bounded window
    pub max_results: usize,

    /// Maximum number of concept ids OR'd into the drug concept fallback clause
    pub max_concept_id_clauses: usize,

    /// Field holding the identity key of every indexed record
    pub identity_field: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            writer_heap_size: 50_000_000, // 50MB
            default_limit: 100,
            max_results: DEFAULT_MAX_RESULTS,
            max_concept_id_clauses: 512,
            identity_field: "id".to_string(),
        }
    }
}

impl SearchConfig {
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::new()
    }

    /// Reject settings no search can run with
    pub fn validate(&self) -> SearchResult<()> {
        if self.default_limit == 0 {
            return Err(SearchError::Configuration("default_limit must be at least 1".to_string()));
        }
        if self.max_results == 0 {
            return Err(SearchError::Configuration("max_results must be at least 1".to_string()));
        }
        if self.identity_field.trim().is_empty() {
            return Err(SearchError::Configuration("identity_field must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn index_path(mut self, path: PathBuf) -> Self {
        self.config.index_path = Some(path);
        self
    }

    pub fn in_memory(mut self) -> Self {
        self.config.index_path = None;
        self
    }

    pub fn writer_heap_size(mut self, size: usize) -> Self {
        self.config.writer_heap_size = size;
        self
    }

    pub fn default_limit(mut self, limit: usize) -> Self {
        self.config.default_limit = limit;
        self
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.config.max_results = max;
        self
    }

    pub fn max_concept_id_clauses(mut self, max: usize) -> Self {
        self.config.max_concept_id_clauses = max;
        self
    }

    pub fn identity_field(mut self, field: impl Into<String>) -> Self {
        self.config.identity_field = field.into();
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
