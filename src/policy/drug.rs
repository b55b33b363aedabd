//! Drug search

use crate::policy::concept::{parse_flag, parse_id, ConceptNameSearchPolicy, ConceptSearchRequest};
use crate::policy::context::{SearchContext, TerminologyLookup};
use crate::search::{
    fields, Clause, FilterSet, Locale, MatchKind, QueryTextNormalizer, ResultPage, SearchBackend, SearchConfig,
    SearchError, SearchExecutor, SearchHit, SearchQuerySpec, SearchResult, StopWords, Window, WeightedClauseBuilder,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Boost of the drug name alternative
pub const DRUG_NAME_WEIGHT: f32 = 0.3;
/// Boost of the drug reference code alternative
pub const DRUG_CODE_WEIGHT: f32 = 0.6;
/// Boost of the concept id alternative
pub const DRUG_CONCEPT_WEIGHT: f32 = 0.1;

/// Separator between the ingredients of a combination drug name
const INGREDIENT_SEPARATOR: char = '+';

/// Caller input of a drug search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DrugSearchRequest {
    /// Drug name; ingredients of a combination are separated by `+`
    #[validate(length(max = 255))]
    pub name: String,

    /// Concept the drug formulates
    pub concept_id: Option<i64>,

    pub search_keywords: bool,

    /// Also match drugs whose concept has a name matching `name`
    pub search_drug_concept_names: bool,

    /// Locale of the concept-name match; the current locale when absent
    pub locale: Option<Locale>,
    pub exact_locale: bool,

    pub include_retired: bool,

    pub offset: Option<usize>,

    #[validate(range(min = 1))]
    pub limit: Option<usize>,
}

impl DrugSearchRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            search_keywords: true,
            ..Default::default()
        }
    }

    /// Every drug of `concept_id`
    pub fn for_concept(concept_id: i64) -> Self {
        Self {
            concept_id: Some(concept_id),
            ..Default::default()
        }
    }

    pub fn with_concept(mut self, concept_id: i64) -> Self {
        self.concept_id = Some(concept_id);
        self
    }

    pub fn with_search_keywords(mut self, search_keywords: bool) -> Self {
        self.search_keywords = search_keywords;
        self
    }

    pub fn with_concept_names(mut self, search_drug_concept_names: bool) -> Self {
        self.search_drug_concept_names = search_drug_concept_names;
        self
    }

    pub fn with_locale(mut self, locale: Locale, exact_locale: bool) -> Self {
        self.locale = Some(locale);
        self.exact_locale = exact_locale;
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

/// A ranked drug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugHit {
    pub drug_id: i64,
    pub name: String,
    pub concept_id: Option<i64>,
    pub retired: bool,
    pub score: f32,
}

impl TryFrom<SearchHit> for DrugHit {
    type Error = SearchError;

    fn try_from(hit: SearchHit) -> Result<Self, Self::Error> {
        let concept_id = match hit.first(fields::CONCEPT_ID) {
            Some(_) => Some(parse_id(&hit, fields::CONCEPT_ID)?),
            None => None,
        };
        Ok(Self {
            drug_id: hit
                .id
                .parse()
                .map_err(|_| SearchError::Backend(format!("malformed drug id: {}", hit.id)))?,
            name: hit.first(fields::NAME).unwrap_or_default().to_string(),
            concept_id,
            retired: parse_flag(&hit, fields::RETIRED),
            score: hit.score,
        })
    }
}

/// Assembles and runs drug searches; concept-name matches come from `C`
pub struct DrugSearchPolicy<B, C, L> {
    executor: SearchExecutor<B>,
    concepts: ConceptNameSearchPolicy<C, L>,
    clauses: WeightedClauseBuilder,
    max_concept_id_clauses: usize,
}

impl<B, C, L> DrugSearchPolicy<B, C, L>
where
    B: SearchBackend,
    C: SearchBackend,
    L: TerminologyLookup,
{
    pub fn new(backend: B, concepts: ConceptNameSearchPolicy<C, L>) -> Self {
        Self {
            executor: SearchExecutor::new(backend),
            concepts,
            clauses: WeightedClauseBuilder::new(fields::NAME),
            max_concept_id_clauses: SearchConfig::default().max_concept_id_clauses,
        }
    }

    pub fn with_config(mut self, config: &SearchConfig) -> Self {
        self.executor = self.executor.with_config(config);
        self.max_concept_id_clauses = config.max_concept_id_clauses;
        self
    }

    pub fn concepts(&self) -> &ConceptNameSearchPolicy<C, L> {
        &self.concepts
    }

    /// Query of `request`, or `None` when there is neither a name nor a
    /// concept to search for
    pub fn drug_spec(&self, request: &DrugSearchRequest, context: &SearchContext) -> SearchResult<Option<SearchQuerySpec>> {
        request.validate()?;

        let has_name = !request.name.trim().is_empty();
        if !has_name && request.concept_id.is_none() {
            return Ok(None);
        }

        let mut alternatives = Vec::with_capacity(3);
        if has_name {
            let escaped = QueryTextNormalizer::escape(&request.name);
            let tokens = QueryTextNormalizer::tokenize_on(&escaped, INGREDIENT_SEPARATOR, &StopWords::none());
            if let Some(name) = self.clauses.build_name_clause(&tokens, &escaped, request.search_keywords) {
                alternatives.push(name.boosted(DRUG_NAME_WEIGHT));
            }
            alternatives.push(Clause::field_match(
                fields::CODE,
                MatchKind::ExactPhrase,
                escaped.as_str().trim(),
                DRUG_CODE_WEIGHT,
            ));
        }

        if let Some(concept_id) = request.concept_id {
            alternatives.push(Clause::field_match(
                fields::CONCEPT_ID,
                MatchKind::ExactTerm,
                concept_id.to_string(),
                DRUG_CONCEPT_WEIGHT,
            ));
        } else if request.search_drug_concept_names {
            let ids = self.concept_ids_named(request, context)?;
            if !ids.is_empty() {
                alternatives.push(Clause::any_term(
                    fields::CONCEPT_ID,
                    ids.iter().map(i64::to_string),
                    DRUG_CONCEPT_WEIGHT,
                ));
            }
        }

        let mut filters = FilterSet::new();
        if !request.include_retired {
            filters.include(fields::RETIRED, [false]);
        }

        let spec = SearchQuerySpec::new(Clause::any_of(alternatives, 1.0)).with_filters(filters);
        tracing::debug!(
            relevance = %spec.relevance(),
            filter = %spec.filter_predicate(),
            "Built drug query"
        );
        Ok(Some(spec))
    }

    /// Concepts with a name matching the drug name, capped at the configured
    /// number of id clauses
    fn concept_ids_named(&self, request: &DrugSearchRequest, context: &SearchContext) -> SearchResult<Vec<i64>> {
        let concept_request = ConceptSearchRequest::new(request.name.clone())
            .with_locales(request.locale.iter().cloned().collect())
            .with_exact_locale(request.exact_locale)
            .with_search_on_phrase(!request.search_keywords)
            .with_include_retired(request.include_retired);

        let mut ids = self.concepts.matching_concept_ids(&concept_request, context)?;
        if ids.len() > self.max_concept_id_clauses {
            tracing::warn!(
                matched = ids.len(),
                kept = self.max_concept_id_clauses,
                "Truncated concept-name matches of drug search"
            );
            ids.truncate(self.max_concept_id_clauses);
        }
        Ok(ids)
    }

    /// One page of drugs matching `request`
    pub fn search_drugs(&self, request: &DrugSearchRequest, context: &SearchContext) -> SearchResult<ResultPage<DrugHit>> {
        let Some(spec) = self.drug_spec(request, context)? else {
            let window = Window::page(request.offset, request.limit);
            return Ok(ResultPage::empty(window.offset, window.size().unwrap_or_default()));
        };

        self.executor
            .list_page(spec, request.offset, request.limit)?
            .try_map(DrugHit::try_from)
    }

    /// Every drug matching `request`, ignoring its window
    pub fn list_drugs(&self, request: &DrugSearchRequest, context: &SearchContext) -> SearchResult<Vec<DrugHit>> {
        let Some(spec) = self.drug_spec(request, context)? else {
            return Ok(Vec::new());
        };

        self.executor
            .list(spec)?
            .into_iter()
            .map(DrugHit::try_from)
            .collect()
    }

    /// Number of drugs matching `request`
    pub fn count_drugs(&self, request: &DrugSearchRequest, context: &SearchContext) -> SearchResult<u64> {
        match self.drug_spec(request, context)? {
            Some(spec) => self.executor.count(spec),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::context::InMemoryTerminology;
    use crate::search::{ConceptNameDocument, DrugDocument, TantivyBackend};

    fn policy() -> DrugSearchPolicy<TantivyBackend, TantivyBackend, InMemoryTerminology> {
        let config = SearchConfig::default();
        let drugs = TantivyBackend::open::<DrugDocument>(&config).unwrap();
        let names = TantivyBackend::open::<ConceptNameDocument>(&config).unwrap();
        DrugSearchPolicy::new(drugs, ConceptNameSearchPolicy::new(names, InMemoryTerminology::new()))
    }

    #[test]
    fn test_blank_name_without_concept_builds_nothing() {
        let policy = policy();
        let context = SearchContext::default();
        let request = DrugSearchRequest::new("  ");

        assert!(policy.drug_spec(&request, &context).unwrap().is_none());
        assert_eq!(policy.count_drugs(&request, &context).unwrap(), 0);
        let page = policy.search_drugs(&request, &context).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.limit, 100);
    }

    #[test]
    fn test_combination_name_clause() {
        let spec = policy()
            .drug_spec(&DrugSearchRequest::new("amoxicillin + clavulanate"), &SearchContext::default())
            .unwrap()
            .unwrap();

        let Clause::Bool(root) = spec.relevance() else {
            panic!("expected a disjunction");
        };
        let boosts: Vec<f32> = root.should.iter().map(Clause::boost).collect();
        assert_eq!(boosts, vec![DRUG_NAME_WEIGHT, DRUG_CODE_WEIGHT]);

        let prefixes: Vec<&str> = spec
            .relevance()
            .leaves()
            .into_iter()
            .filter(|m| m.kind == MatchKind::Prefix)
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(prefixes, vec!["amoxicillin", "clavulanate"]);
        assert_eq!(spec.filter_predicate().to_string(), "(MUST retired IN {false})");
    }

    #[test]
    fn test_concept_alternative() {
        let spec = policy()
            .drug_spec(&DrugSearchRequest::for_concept(42).with_include_retired(true), &SearchContext::default())
            .unwrap()
            .unwrap();

        assert_eq!(spec.relevance().to_string(), "(concept_id:(42)^0.1)");
        assert!(spec.filter_predicate().is_empty());
    }

    #[test]
    fn test_concept_names_without_matches_add_nothing() {
        let spec = policy()
            .drug_spec(
                &DrugSearchRequest::new("aspirin").with_concept_names(true),
                &SearchContext::default(),
            )
            .unwrap()
            .unwrap();

        assert!(spec.relevance().leaves().iter().all(|m| m.field != fields::CONCEPT_ID));
    }

    #[test]
    fn test_invalid_limit() {
        let request = DrugSearchRequest::new("aspirin").with_page(None, Some(0));
        let result = policy().search_drugs(&request, &SearchContext::default());
        assert!(matches!(result, Err(SearchError::InvalidInput(_))));
    }
}
