//! Search-query construction engine for clinical concept and drug lookup
//!
//! A free-text phrase plus structured filters (locale, class, datatype,
//! retired and voided status, answer restrictions) becomes a ranked,
//! paginated, deduplicated result set over an inverted text index.
//!
//! - [`search`] holds the engine: normalization, weighted clauses, locale
//!   clauses, filters, query specs, the executor and the tantivy backend.
//! - [`policy`] holds the concept-name and drug search assemblers.
//!
//! ```no_run
//! use concept_search::config::Config;
//! use concept_search::policy::{ConceptNameSearchPolicy, ConceptSearchRequest, InMemoryTerminology};
//! use concept_search::search::{ConceptNameDocument, TantivyBackend};
//!
//! fn main() -> concept_search::Result<()> {
//!     concept_search::telemetry::init_tracing(concept_search::telemetry::DEFAULT_FILTER);
//!     let config = Config::load()?;
//!
//!     let backend = TantivyBackend::open::<ConceptNameDocument>(&config.search)?;
//!     let policy = ConceptNameSearchPolicy::new(&backend, InMemoryTerminology::new()).with_config(&config.search);
//!
//!     let page = policy.search_concept_names(&ConceptSearchRequest::new("aspirin"), &config.search_context())?;
//!     for hit in page.items {
//!         println!("{} {}", hit.concept_id, hit.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod policy;
pub mod search;
pub mod telemetry;

pub use error::{Error, Result};
