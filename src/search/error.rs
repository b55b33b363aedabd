//! Error types for search operations

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while building or executing a search
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A required argument was missing or malformed; raised before any backend call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A unique-result read matched more than one hit
    #[error("Expected a unique result but found {count} matches")]
    NonUniqueResult { count: usize },

    /// The search backend was unreachable, rejected the query, or timed out
    #[error("Search backend error: {0}")]
    Backend(String),

    /// Index initialization failed
    #[error("Index initialization failed: {0}")]
    IndexInitFailed(String),

    /// Document indexing or deletion failed
    #[error("Document indexing failed: {0}")]
    IndexingFailed(String),

    /// A relational collaborator lookup failed
    #[error("Lookup failed: {0}")]
    Lookup(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl SearchError {
    /// Whether the error originated in the search backend
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            SearchError::Backend(_) | SearchError::IndexInitFailed(_) | SearchError::IndexingFailed(_)
        )
    }
}

impl From<tantivy::TantivyError> for SearchError {
    fn from(err: tantivy::TantivyError) -> Self {
        SearchError::Backend(err.to_string())
    }
}

impl From<validator::ValidationErrors> for SearchError {
    fn from(err: validator::ValidationErrors) -> Self {
        SearchError::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_unique_carries_count() {
        let err = SearchError::NonUniqueResult { count: 2 };
        assert_eq!(err.to_string(), "Expected a unique result but found 2 matches");
        assert!(!err.is_backend());
    }

    #[test]
    fn test_backend_classification() {
        assert!(SearchError::Backend("down".into()).is_backend());
        assert!(SearchError::IndexingFailed("disk".into()).is_backend());
        assert!(!SearchError::InvalidInput("phrase".into()).is_backend());
        assert!(!SearchError::Lookup("db".into()).is_backend());
    }
}
