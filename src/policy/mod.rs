//! Domain assemblers for concept-name and drug searches
//!
//! Policies know which fields to search and which constraints a clinical
//! lookup implies (locale, voided names, retired concepts and drugs, answer
//! restrictions). They turn caller requests into
//! [`SearchQuerySpec`](crate::search::SearchQuerySpec)s and run them through a
//! [`SearchExecutor`](crate::search::SearchExecutor). Settings that would
//! otherwise be global travel in an explicit [`SearchContext`].

mod concept;
mod context;
mod drug;

pub use concept::{
    ConceptCandidate, ConceptNameSearchPolicy, ConceptSearchHit, ConceptSearchRequest, FirstLiteralMatch,
    RejectAmbiguous, TieBreak,
};
pub use context::{InMemoryTerminology, SearchContext, TerminologyLookup};
pub use drug::{DrugHit, DrugSearchPolicy, DrugSearchRequest, DRUG_CODE_WEIGHT, DRUG_CONCEPT_WEIGHT, DRUG_NAME_WEIGHT};
