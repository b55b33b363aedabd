//! Locale values and locale clause construction

use crate::search::clause::{Clause, MatchKind};
use crate::search::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Boost of a full `language_COUNTRY` match relative to a language-only match
pub const COUNTRY_MATCH_WEIGHT: f32 = 2.0;

/// A language with an optional country, rendered as `en` or `en_GB`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locale {
    language: String,
    country: Option<String>,
}

impl Locale {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into().to_lowercase(),
            country: None,
        }
    }

    pub fn with_country(language: impl Into<String>, country: impl Into<String>) -> Self {
        let country = country.into().to_uppercase();
        Self {
            language: language.into().to_lowercase(),
            country: if country.is_empty() { None } else { Some(country) },
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.country {
            Some(country) => write!(f, "{}_{}", self.language, country),
            None => f.write_str(&self.language),
        }
    }
}

impl FromStr for Locale {
    type Err = SearchError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let mut parts = tag.trim().splitn(3, ['_', '-']);
        let language = parts.next().unwrap_or_default();
        if language.is_empty() || !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SearchError::InvalidInput(format!("Malformed locale tag: '{}'", tag)));
        }

        match parts.next() {
            Some(country) if !country.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Err(SearchError::InvalidInput(format!("Malformed locale tag: '{}'", tag)))
            }
            Some(country) => Ok(Locale::with_country(language, country)),
            None => Ok(Locale::new(language)),
        }
    }
}

impl TryFrom<String> for Locale {
    type Error = SearchError;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        tag.parse()
    }
}

impl From<Locale> for String {
    fn from(locale: Locale) -> Self {
        locale.to_string()
    }
}

/// Builds the locale restriction of a name search
#[derive(Debug, Clone)]
pub struct LocaleClauseBuilder {
    field: String,
}

impl LocaleClauseBuilder {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }

    /// Disjunction over `locales`.
    ///
    /// With `exact_match` a record's locale must equal one of the given tags.
    /// Otherwise each locale contributes a language-prefix clause and, when it
    /// carries a country, a full-tag clause at double weight.
    pub fn build(&self, locales: &[Locale], exact_match: bool) -> SearchResult<Clause> {
        if locales.is_empty() {
            return Err(SearchError::InvalidInput(
                "at least one locale is required for a locale clause".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        let mut alternatives = Vec::with_capacity(locales.len() * 2);
        for locale in locales.iter().filter(|l| seen.insert(*l)) {
            if exact_match {
                alternatives.push(Clause::term(&self.field, locale.to_string()));
                continue;
            }

            alternatives.push(Clause::field_match(&self.field, MatchKind::Prefix, locale.language(), 1.0));
            if locale.country().is_some() {
                alternatives.push(Clause::field_match(
                    &self.field,
                    MatchKind::ExactTerm,
                    locale.to_string(),
                    COUNTRY_MATCH_WEIGHT,
                ));
            }
        }

        Ok(Clause::any_of(alternatives, 1.0))
    }
}
