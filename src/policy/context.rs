//! Request context and terminology collaborators of the search policies

use crate::search::{Locale, SearchError, SearchResult, StopWords};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Settings of the caller that the policies would otherwise read from global
/// state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchContext {
    /// Locale used when a request names none
    pub locale: Locale,

    /// Whether literal name comparisons respect case
    #[serde(default)]
    pub case_sensitive: bool,
}

impl SearchContext {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            case_sensitive: false,
        }
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// `requested`, or the current locale when it is empty
    pub fn resolve_locales(&self, requested: &[Locale]) -> Vec<Locale> {
        if requested.is_empty() {
            vec![self.locale.clone()]
        } else {
            requested.to_vec()
        }
    }

    /// Compare two names honoring the case sensitivity of this context
    pub fn names_equal(&self, left: &str, right: &str) -> bool {
        if self.case_sensitive {
            left == right
        } else {
            left.to_lowercase() == right.to_lowercase()
        }
    }
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::new(Locale::new("en"))
    }
}

/// Relational lookups consumed by the search policies.
///
/// Failures are reported as [`SearchError::Lookup`] and propagate unchanged.
pub trait TerminologyLookup {
    /// Stop words of `locale`, in any case
    fn stop_words(&self, locale: &Locale) -> SearchResult<Vec<String>>;

    /// Concept ids of the non-retired answers of `concept_id`
    fn answers_of(&self, concept_id: i64) -> SearchResult<Vec<i64>>;

    /// Union of the stop words of every locale
    fn stop_words_for(&self, locales: &[Locale]) -> SearchResult<StopWords> {
        let mut stop_words = StopWords::none();
        for locale in locales {
            stop_words.extend(self.stop_words(locale)?);
        }
        Ok(stop_words)
    }
}

impl<T: TerminologyLookup + ?Sized> TerminologyLookup for &T {
    fn stop_words(&self, locale: &Locale) -> SearchResult<Vec<String>> {
        (**self).stop_words(locale)
    }

    fn answers_of(&self, concept_id: i64) -> SearchResult<Vec<i64>> {
        (**self).answers_of(concept_id)
    }
}

/// Terminology lookups served from memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryTerminology {
    stop_words: HashMap<Locale, Vec<String>>,
    answers: HashMap<i64, Vec<i64>>,
    unavailable: bool,
}

impl InMemoryTerminology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stop_words<I, S>(mut self, locale: Locale, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_words
            .entry(locale)
            .or_default()
            .extend(words.into_iter().map(Into::into));
        self
    }

    pub fn with_answers(mut self, concept_id: i64, answers: impl IntoIterator<Item = i64>) -> Self {
        self.answers.entry(concept_id).or_default().extend(answers);
        self
    }

    /// Fail every lookup, as a disconnected store would
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn check(&self) -> SearchResult<()> {
        if self.unavailable {
            return Err(SearchError::Lookup("terminology store unavailable".to_string()));
        }
        Ok(())
    }
}

impl TerminologyLookup for InMemoryTerminology {
    fn stop_words(&self, locale: &Locale) -> SearchResult<Vec<String>> {
        self.check()?;
        Ok(self.stop_words.get(locale).cloned().unwrap_or_default())
    }

    fn answers_of(&self, concept_id: i64) -> SearchResult<Vec<i64>> {
        self.check()?;
        Ok(self.answers.get(&concept_id).cloned().unwrap_or_default())
    }
}
