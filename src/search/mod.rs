//! Full-text search-query construction engine
//!
//! This module turns a free-text phrase plus structured constraints into a
//! ranked, paginated, deduplicated result set over an inverted index:
//!
//! - **Normalization**: escaping of query syntax, boolean keyword folding,
//!   whitespace and custom-separator tokenization, stop-word removal
//! - **Weighted clauses**: exact phrase over exact term over prefix over fuzzy
//! - **Locale clauses**: language-prefix and full-tag matching
//! - **Filters**: include/exclude term sets applied outside scoring
//! - **Execution**: unique result, list, page, count, projection and
//!   first-match-wins deduplication
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │        Search Policies (crate::policy)           │
//! ├─────────────────────────────────────────────────┤
//! │  - search_concept_names()  - search_drugs()     │
//! │  - concept_by_name()       - count_*()          │
//! └─────────────────────────────────────────────────┘
//!                      │ SearchQuerySpec
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │           Search Executor                        │
//! ├─────────────────────────────────────────────────┤
//! │  - skip-same dedup (project, retain, narrow)    │
//! │  - unique / list / page / count / project       │
//! └─────────────────────────────────────────────────┘
//!                      │ Clause + FilterPredicate
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │        SearchBackend (TantivyBackend)            │
//! ├─────────────────────────────────────────────────┤
//! │  - Inverted Index (name, code)                  │
//! │  - Keyword Fields (ids, locale, flags)          │
//! │  - Doc Store (projection)                       │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use concept_search::search::{
//!     ConceptNameDocument, QueryTextNormalizer, SearchConfig, SearchExecutor, SearchQuerySpec,
//!     StopWords, TantivyBackend, WeightedClauseBuilder,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = TantivyBackend::open::<ConceptNameDocument>(&SearchConfig::default())?;
//!     let executor = SearchExecutor::new(&backend);
//!
//!     let phrase = QueryTextNormalizer::escape("chest pain");
//!     let tokens = QueryTextNormalizer::tokenize(&phrase, &StopWords::none());
//!     if let Some(clause) = WeightedClauseBuilder::new("name").build_name_clause(&tokens, &phrase, true) {
//!         let page = executor.list_page(SearchQuerySpec::new(clause).with_dedup_field("concept_id"), None, Some(20))?;
//!         println!("Found {} names", page.total);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod backend;
mod clause;
mod config;
mod document;
mod error;
mod executor;
mod filter;
mod index;
mod locale;
mod normalizer;
mod query;

pub use backend::{BackendQuery, ProjectionRow, SearchBackend, SearchHit};
pub use clause::{
    BoolClause, Clause, FieldMatch, MatchKind, WeightedClauseBuilder, ANY_NAME_WEIGHT, CODE_WEIGHT, EXACT_TERM_WEIGHT,
    FUZZY_SIMILARITY, FUZZY_WEIGHT, PHRASE_WEIGHT, PREFERRED_NAME_WEIGHT, PREFIX_WEIGHT, TOKEN_GROUP_WEIGHT,
};
pub use config::{SearchConfig, SearchConfigBuilder};
pub use document::{
    build_concept_name_schema, build_drug_schema, fields, register_analyzers, ConceptNameDocument, DrugDocument,
    IndexDocument, CONCEPT_NAME_ANALYZER,
};
pub use error::{SearchError, SearchResult};
pub use executor::{skip_same, PreparedSearch, ResultPage, SearchExecutor, SeenValues};
pub use filter::{FilterClause, FilterPredicate, FilterSet};
pub use index::{IndexStats, TantivyBackend};
pub use locale::{Locale, LocaleClauseBuilder, COUNTRY_MATCH_WEIGHT};
pub use normalizer::{EscapedText, QueryTextNormalizer, StopWords, Token};
pub use query::{Limit, SearchQuerySpec, Window, DEFAULT_LIMIT, DEFAULT_MAX_RESULTS, DEFAULT_OFFSET};
