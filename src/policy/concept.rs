//! Concept-name search

use crate::policy::context::{SearchContext, TerminologyLookup};
use crate::search::{
    fields, Clause, FilterSet, Locale, LocaleClauseBuilder, MatchKind, QueryTextNormalizer, ResultPage, SearchBackend,
    SearchConfig, SearchError, SearchExecutor, SearchHit, SearchQuerySpec, SearchResult, SeenValues,
    WeightedClauseBuilder,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Caller input of a concept-name search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConceptSearchRequest {
    /// Free text; blank matches every name
    #[validate(length(max = 255))]
    pub phrase: String,

    /// Locales to search; empty means the current locale of the context
    pub locales: Vec<Locale>,

    /// Require the exact locale tag instead of a language match
    pub exact_locale: bool,

    /// Match the phrase as a whole instead of per keyword
    pub search_on_phrase: bool,

    pub required_classes: Vec<i64>,
    pub excluded_classes: Vec<i64>,
    pub required_datatypes: Vec<i64>,
    pub excluded_datatypes: Vec<i64>,

    /// Restrict results to the answers of this concept
    pub answers_to_concept: Option<i64>,

    pub include_retired: bool,

    pub offset: Option<usize>,

    #[validate(range(min = 1))]
    pub limit: Option<usize>,
}

impl ConceptSearchRequest {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            ..Default::default()
        }
    }

    pub fn with_locales(mut self, locales: Vec<Locale>) -> Self {
        self.locales = locales;
        self
    }

    pub fn with_exact_locale(mut self, exact_locale: bool) -> Self {
        self.exact_locale = exact_locale;
        self
    }

    pub fn with_search_on_phrase(mut self, search_on_phrase: bool) -> Self {
        self.search_on_phrase = search_on_phrase;
        self
    }

    pub fn with_required_classes(mut self, classes: Vec<i64>) -> Self {
        self.required_classes = classes;
        self
    }

    pub fn with_excluded_classes(mut self, classes: Vec<i64>) -> Self {
        self.excluded_classes = classes;
        self
    }

    pub fn with_required_datatypes(mut self, datatypes: Vec<i64>) -> Self {
        self.required_datatypes = datatypes;
        self
    }

    pub fn with_excluded_datatypes(mut self, datatypes: Vec<i64>) -> Self {
        self.excluded_datatypes = datatypes;
        self
    }

    pub fn with_answers_to(mut self, concept_id: i64) -> Self {
        self.answers_to_concept = Some(concept_id);
        self
    }

    pub fn with_include_retired(mut self, include_retired: bool) -> Self {
        self.include_retired = include_retired;
        self
    }

    pub fn with_page(mut self, offset: Option<usize>, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// The best-ranked name of one concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptSearchHit {
    pub concept_id: i64,
    pub concept_name_id: i64,
    pub name: String,
    pub locale: Option<Locale>,
    pub locale_preferred: bool,
    pub score: f32,
}

pub(crate) fn parse_id(hit: &SearchHit, field: &str) -> SearchResult<i64> {
    let raw = hit
        .first(field)
        .ok_or_else(|| SearchError::Backend(format!("hit {} has no stored '{}'", hit.id, field)))?;
    raw.parse()
        .map_err(|_| SearchError::Backend(format!("hit {} has a malformed '{}': {}", hit.id, field, raw)))
}

pub(crate) fn parse_flag(hit: &SearchHit, field: &str) -> bool {
    hit.first(field) == Some("true")
}

impl TryFrom<SearchHit> for ConceptSearchHit {
    type Error = SearchError;

    fn try_from(hit: SearchHit) -> Result<Self, Self::Error> {
        Ok(Self {
            concept_id: parse_id(&hit, fields::CONCEPT_ID)?,
            concept_name_id: hit
                .id
                .parse()
                .map_err(|_| SearchError::Backend(format!("malformed concept name id: {}", hit.id)))?,
            name: hit.first(fields::NAME).unwrap_or_default().to_string(),
            locale: hit.first(fields::LOCALE).and_then(|l| l.parse().ok()),
            locale_preferred: parse_flag(&hit, fields::LOCALE_PREFERRED),
            score: hit.score,
        })
    }
}

/// A concept whose names tied in a by-name lookup, with its matching names
/// in rank order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCandidate {
    pub concept_id: i64,
    pub names: Vec<String>,
}

/// Decides between several concepts matching a by-name lookup
pub trait TieBreak {
    fn resolve(&self, name: &str, candidates: &[ConceptCandidate], context: &SearchContext) -> SearchResult<Option<i64>>;
}

/// Pick the first-ranked concept with a name literally equal to the input
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstLiteralMatch;

impl TieBreak for FirstLiteralMatch {
    fn resolve(&self, name: &str, candidates: &[ConceptCandidate], context: &SearchContext) -> SearchResult<Option<i64>> {
        let found = candidates
            .iter()
            .find(|c| c.names.iter().any(|n| context.names_equal(n, name)))
            .map(|c| c.concept_id);
        if found.is_none() {
            tracing::warn!(name, candidates = candidates.len(), "No literal name match among tied concepts");
        }
        Ok(found)
    }
}

/// Fail every tie
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAmbiguous;

impl TieBreak for RejectAmbiguous {
    fn resolve(&self, _name: &str, candidates: &[ConceptCandidate], _context: &SearchContext) -> SearchResult<Option<i64>> {
        Err(SearchError::NonUniqueResult {
            count: candidates.len(),
        })
    }
}

/// Assembles and runs concept-name searches
pub struct ConceptNameSearchPolicy<B, L> {
    executor: SearchExecutor<B>,
    lookup: L,
    clauses: WeightedClauseBuilder,
    locales: LocaleClauseBuilder,
}

impl<B: SearchBackend, L: TerminologyLookup> ConceptNameSearchPolicy<B, L> {
    pub fn new(backend: B, lookup: L) -> Self {
        Self {
            executor: SearchExecutor::new(backend),
            lookup,
            clauses: WeightedClauseBuilder::new(fields::NAME)
                .with_code_field(fields::CODE)
                .with_preferred_field(fields::LOCALE_PREFERRED),
            locales: LocaleClauseBuilder::new(fields::LOCALE),
        }
    }

    pub fn with_config(mut self, config: &SearchConfig) -> Self {
        self.executor = self.executor.with_config(config);
        self
    }

    pub fn executor(&self) -> &SearchExecutor<B> {
        &self.executor
    }

    /// Scored part of a concept-name search: the composite name clause AND the
    /// locale clause AND not voided. A blank phrase matches everything.
    pub fn relevance_clause(
        &self,
        phrase: &str,
        locales: &[Locale],
        search_keywords: bool,
        exact_locale: bool,
        context: &SearchContext,
    ) -> SearchResult<Clause> {
        if phrase.trim().is_empty() {
            return Ok(Clause::MatchAll);
        }

        let locales = context.resolve_locales(locales);
        let escaped = QueryTextNormalizer::escape(phrase);
        let stop_words = self.lookup.stop_words_for(&locales)?;
        let tokens = QueryTextNormalizer::tokenize(&escaped, &stop_words);

        let Some(names) = self
            .clauses
            .build_composite_concept_name_clause(&tokens, &escaped, search_keywords)
        else {
            return Ok(Clause::MatchAll);
        };

        Ok(Clause::all_of(
            vec![
                names,
                self.locales.build(&locales, exact_locale)?,
                Clause::term(fields::VOIDED, "false"),
            ],
            1.0,
        ))
    }

    /// Query of `request`: one best-ranked name per concept
    pub fn concept_name_spec(&self, request: &ConceptSearchRequest, context: &SearchContext) -> SearchResult<SearchQuerySpec> {
        request.validate()?;

        let relevance = self.relevance_clause(
            &request.phrase,
            &request.locales,
            !request.search_on_phrase,
            request.exact_locale,
            context,
        )?;

        let mut filters = FilterSet::new();
        filters
            .include(fields::CLASS_ID, &request.required_classes)
            .exclude(fields::CLASS_ID, &request.excluded_classes)
            .include(fields::DATATYPE_ID, &request.required_datatypes)
            .exclude(fields::DATATYPE_ID, &request.excluded_datatypes);

        if let Some(question) = request.answers_to_concept {
            filters.include(fields::CONCEPT_ID, self.lookup.answers_of(question)?);
        }
        if !request.include_retired {
            filters.include(fields::CONCEPT_RETIRED, [false]);
        }

        let spec = SearchQuerySpec::new(relevance)
            .with_filters(filters)
            .with_dedup_field(fields::CONCEPT_ID)
            .with_projection([fields::CONCEPT_ID]);

        tracing::debug!(
            relevance = %spec.relevance(),
            filter = %spec.filter_predicate(),
            "Built concept name query"
        );
        Ok(spec)
    }

    /// One page of concepts matching `request`
    pub fn search_concept_names(
        &self,
        request: &ConceptSearchRequest,
        context: &SearchContext,
    ) -> SearchResult<ResultPage<ConceptSearchHit>> {
        let (page, _) = self.search_concept_names_after(request, context, None)?;
        Ok(page)
    }

    /// Like [`Self::search_concept_names`], also skipping concepts already
    /// returned by a related search. Returns the concepts claimed by both.
    pub fn search_concept_names_after(
        &self,
        request: &ConceptSearchRequest,
        context: &SearchContext,
        previous: Option<&SeenValues>,
    ) -> SearchResult<(ResultPage<ConceptSearchHit>, SeenValues)> {
        let spec = self.concept_name_spec(request, context)?;
        let prepared = self.executor.prepare_after(spec, previous)?;
        let seen = prepared.seen_values().clone();

        let page = prepared
            .list_page(request.offset, request.limit)?
            .try_map(ConceptSearchHit::try_from)?;
        Ok((page, seen))
    }

    /// Number of concepts matching `request`
    pub fn count_concept_names(&self, request: &ConceptSearchRequest, context: &SearchContext) -> SearchResult<u64> {
        let spec = self.concept_name_spec(request, context)?;
        self.executor.count(spec)
    }

    /// Distinct ids of the concepts matching `request`, in rank order
    pub fn matching_concept_ids(&self, request: &ConceptSearchRequest, context: &SearchContext) -> SearchResult<Vec<i64>> {
        let spec = self.concept_name_spec(request, context)?;
        let rows = self.executor.prepare(spec)?.project()?;

        rows.into_iter()
            .filter_map(|row| row.into_iter().next().flatten())
            .map(|id| {
                id.parse()
                    .map_err(|_| SearchError::Backend(format!("malformed concept id: {}", id)))
            })
            .collect()
    }

    /// Keyword search for `name` in one locale, returning distinct concepts
    pub fn concepts_by_name(
        &self,
        name: &str,
        locale: Option<Locale>,
        exact_locale: bool,
        context: &SearchContext,
    ) -> SearchResult<Vec<i64>> {
        let request = ConceptSearchRequest::new(name)
            .with_locales(context.resolve_locales(&locale.into_iter().collect::<Vec<_>>()))
            .with_exact_locale(exact_locale);
        self.matching_concept_ids(&request, context)
    }

    /// The single non-retired concept having a non-voided name equal to
    /// `name` in the current language; ties are settled by `tie_break`.
    /// Names compare ignoring case unless `context` is case-sensitive.
    pub fn concept_by_name(
        &self,
        name: &str,
        tie_break: &dyn TieBreak,
        context: &SearchContext,
    ) -> SearchResult<Option<i64>> {
        if name.trim().is_empty() {
            return Err(SearchError::InvalidInput("concept name is required".to_string()));
        }

        let escaped = QueryTextNormalizer::escape(name);
        let relevance = Clause::all_of(
            vec![
                Clause::field_match(fields::NAME, MatchKind::ExactPhrase, escaped.as_str().trim(), 1.0),
                self.locales.build(std::slice::from_ref(&context.locale), false)?,
            ],
            1.0,
        );
        let mut filters = FilterSet::new();
        filters
            .include(fields::VOIDED, [false])
            .include(fields::CONCEPT_RETIRED, [false]);

        let hits = self
            .executor
            .list(SearchQuerySpec::new(relevance).with_filters(filters))?;

        let mut candidates: Vec<ConceptCandidate> = Vec::new();
        for hit in hits {
            let hit_name = hit.first(fields::NAME).unwrap_or_default();
            if !context.names_equal(hit_name, name) {
                continue;
            }
            let concept_id = parse_id(&hit, fields::CONCEPT_ID)?;
            let hit_name = hit_name.to_string();
            match candidates.iter_mut().find(|c| c.concept_id == concept_id) {
                Some(candidate) => candidate.names.push(hit_name),
                None => candidates.push(ConceptCandidate {
                    concept_id,
                    names: vec![hit_name],
                }),
            }
        }

        match candidates.len() {
            0 => {
                tracing::warn!(name, "No concept found");
                Ok(None)
            }
            1 => Ok(Some(candidates[0].concept_id)),
            count => {
                tracing::warn!(name, count, "Multiple concepts found");
                tie_break.resolve(name, &candidates, context)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::context::InMemoryTerminology;
    use crate::search::TantivyBackend;

    fn policy() -> ConceptNameSearchPolicy<TantivyBackend, InMemoryTerminology> {
        let backend = TantivyBackend::open::<crate::search::ConceptNameDocument>(&SearchConfig::default()).unwrap();
        let lookup = InMemoryTerminology::new()
            .with_stop_words(Locale::new("en"), ["OF"])
            .with_answers(100, [1, 2]);
        ConceptNameSearchPolicy::new(backend, lookup)
    }

    #[test]
    fn test_blank_phrase_matches_all() {
        let clause = policy()
            .relevance_clause("  ", &[], true, false, &SearchContext::default())
            .unwrap();
        assert_eq!(clause, Clause::MatchAll);
    }

    #[test]
    fn test_relevance_clause_layout() {
        let clause = policy()
            .relevance_clause("fracture of femur", &[], true, false, &SearchContext::default())
            .unwrap();

        let Clause::Bool(root) = &clause else {
            panic!("expected a conjunction");
        };
        assert_eq!(root.must.len(), 3);
        assert_eq!(root.must[1].to_string(), "(locale:(en*))");
        assert_eq!(root.must[2], Clause::term(fields::VOIDED, "false"));

        // "of" is a stop word: phrase leaf plus two tokens of three leaves, per name variant
        let name_leaves = root.must[0]
            .leaves()
            .into_iter()
            .filter(|m| m.field == fields::NAME)
            .count();
        assert_eq!(name_leaves, 2 * (1 + 2 * 3));
    }

    #[test]
    fn test_spec_filters() {
        let request = ConceptSearchRequest::new("pain")
            .with_required_classes(vec![5])
            .with_excluded_datatypes(vec![4, 7])
            .with_answers_to(100);
        let spec = policy().concept_name_spec(&request, &SearchContext::default()).unwrap();

        assert_eq!(spec.dedup_field(), Some(fields::CONCEPT_ID));
        let predicate = spec.filter_predicate();
        assert_eq!(
            predicate.to_string(),
            "(MUST class_id IN {5}) AND (MUST concept_id IN {1, 2}) AND (MUST concept_retired IN {false}) \
             AND (MUST-NOT datatype_id = 4) AND (MUST-NOT datatype_id = 7)"
        );
    }

    #[test]
    fn test_answers_without_answers_do_not_restrict() {
        let request = ConceptSearchRequest::new("pain")
            .with_answers_to(42)
            .with_include_retired(true);
        let spec = policy().concept_name_spec(&request, &SearchContext::default()).unwrap();
        assert!(spec.filter_predicate().is_empty());
    }

    #[test]
    fn test_validation() {
        let policy = policy();
        let context = SearchContext::default();

        let zero_limit = ConceptSearchRequest::new("pain").with_page(None, Some(0));
        assert!(matches!(
            policy.concept_name_spec(&zero_limit, &context),
            Err(SearchError::InvalidInput(_))
        ));

        let long = ConceptSearchRequest::new("x".repeat(300));
        assert!(matches!(policy.concept_name_spec(&long, &context), Err(SearchError::InvalidInput(_))));
    }

    #[test]
    fn test_lookup_failure_propagates() {
        let backend = TantivyBackend::open::<crate::search::ConceptNameDocument>(&SearchConfig::default()).unwrap();
        let policy = ConceptNameSearchPolicy::new(backend, InMemoryTerminology::new().unavailable());
        let result = policy.concept_name_spec(&ConceptSearchRequest::new("pain"), &SearchContext::default());
        assert!(matches!(result, Err(SearchError::Lookup(_))));
    }

    #[test]
    fn test_tie_breaks() {
        let candidates = vec![
            ConceptCandidate {
                concept_id: 1,
                names: vec!["COLD".to_string()],
            },
            ConceptCandidate {
                concept_id: 2,
                names: vec!["Cold".to_string()],
            },
        ];
        let insensitive = SearchContext::default();
        let sensitive = SearchContext::default().with_case_sensitive(true);

        assert_eq!(FirstLiteralMatch.resolve("cold", &candidates, &insensitive).unwrap(), Some(1));
        assert_eq!(FirstLiteralMatch.resolve("Cold", &candidates, &sensitive).unwrap(), Some(2));
        assert_eq!(FirstLiteralMatch.resolve("cold", &candidates, &sensitive).unwrap(), None);

        let err = RejectAmbiguous.resolve("cold", &candidates, &insensitive).unwrap_err();
        assert!(matches!(err, SearchError::NonUniqueResult { count: 2 }));
    }

    #[test]
    fn test_blank_concept_name_rejected() {
        let result = policy().concept_by_name(" ", &FirstLiteralMatch, &SearchContext::default());
        assert!(matches!(result, Err(SearchError::InvalidInput(_))));
    }

    #[test]
    fn test_hit_conversion() {
        let hit = SearchHit::new("11", 1.5)
            .with_field(fields::CONCEPT_ID, "1")
            .with_field(fields::NAME, "Aspirin")
            .with_field(fields::LOCALE, "en_GB")
            .with_field(fields::LOCALE_PREFERRED, "true");
        let converted = ConceptSearchHit::try_from(hit).unwrap();
        assert_eq!(converted.concept_name_id, 11);
        assert_eq!(converted.locale, Some(Locale::with_country("en", "GB")));
        assert!(converted.locale_preferred);

        let broken = SearchHit::new("12", 1.0);
        assert!(ConceptSearchHit::try_from(broken).unwrap_err().is_backend());
    }
}
