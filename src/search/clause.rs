//! Weighted relevance clauses and the builder for name queries
//!
//! A [`Clause`] is a backend-neutral description of the scored part of a
//! query. Leaves are [`FieldMatch`]es (one field, one [`MatchKind`], one boost),
//! inner nodes are boolean groups carrying their own boost. Backends translate
//! the tree into their native query types; [`fmt::Display`] renders it in the
//! classic query-parser syntax for logging.

use crate::search::normalizer::{EscapedText, Token};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Boost of the exact-phrase alternative in a keyword name search
pub const PHRASE_WEIGHT: f32 = 0.7;
/// Boost of the grouped per-token alternatives in a keyword name search
pub const TOKEN_GROUP_WEIGHT: f32 = 0.3;
/// Per-token boost of an exact term match
pub const EXACT_TERM_WEIGHT: f32 = 0.6;
/// Per-token boost of a prefix match
pub const PREFIX_WEIGHT: f32 = 0.3;
/// Per-token boost of a fuzzy match
pub const FUZZY_WEIGHT: f32 = 0.1;
/// Minimum similarity of a fuzzy match, in `[0, 1)`
pub const FUZZY_SIMILARITY: f32 = 0.8;

/// Composite concept-name query: reference code alternative
pub const CODE_WEIGHT: f32 = 0.4;
/// Composite concept-name query: locale-preferred name alternative
pub const PREFERRED_NAME_WEIGHT: f32 = 0.4;
/// Composite concept-name query: any name alternative
pub const ANY_NAME_WEIGHT: f32 = 0.2;

/// How a leaf clause compares its text to a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchKind {
    /// The whole text as a phrase
    ExactPhrase,
    /// Every analyzed term of the text
    ExactTerm,
    /// Terms starting with the text
    Prefix,
    /// Terms within [`FUZZY_SIMILARITY`] of the text
    Fuzzy,
}

/// A single-field match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field: String,
    pub kind: MatchKind,
    /// Escaped text, see [`crate::search::normalizer::QueryTextNormalizer::escape`]
    pub text: String,
    pub boost: f32,
}

/// A boolean group of clauses
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoolClause {
    pub must: Vec<Clause>,
    pub should: Vec<Clause>,
    pub must_not: Vec<Clause>,
    pub boost: f32,
}

/// Relevance clause tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    /// Matches every record with a constant score
    MatchAll,
    Match(FieldMatch),
    Bool(BoolClause),
}

impl Clause {
    pub fn field_match(field: impl Into<String>, kind: MatchKind, text: impl Into<String>, boost: f32) -> Self {
        Clause::Match(FieldMatch {
            field: field.into(),
            kind,
            text: text.into(),
            boost,
        })
    }

    /// Exact term on an unboosted field, e.g. `voided:false`
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::field_match(field, MatchKind::ExactTerm, value, 1.0)
    }

    /// Disjunction: at least one clause must match
    pub fn any_of(clauses: Vec<Clause>, boost: f32) -> Self {
        Clause::Bool(BoolClause {
            should: clauses,
            boost,
            ..Default::default()
        })
    }

    /// Conjunction: every clause must match
    pub fn all_of(clauses: Vec<Clause>, boost: f32) -> Self {
        Clause::Bool(BoolClause {
            must: clauses,
            boost,
            ..Default::default()
        })
    }

    /// Exact match against any of `values` in `field`
    pub fn any_term<I, S>(field: &str, values: I, boost: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::any_of(values.into_iter().map(|v| Self::term(field, v)).collect(), boost)
    }

    /// Boost of this node
    pub fn boost(&self) -> f32 {
        match self {
            Clause::MatchAll => 1.0,
            Clause::Match(m) => m.boost,
            Clause::Bool(b) => b.boost,
        }
    }

    /// Apply `boost` to this node; an already boosted node is wrapped so that
    /// the inner weights are kept
    pub fn boosted(self, boost: f32) -> Self {
        match self {
            Clause::Match(mut m) if m.boost == 1.0 => {
                m.boost = boost;
                Clause::Match(m)
            }
            Clause::Bool(mut b) if b.boost == 1.0 => {
                b.boost = boost;
                Clause::Bool(b)
            }
            other => Self::all_of(vec![other], boost),
        }
    }

    /// All leaves of the tree, depth first
    pub fn leaves(&self) -> Vec<&FieldMatch> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a FieldMatch>) {
        match self {
            Clause::MatchAll => {}
            Clause::Match(m) => out.push(m),
            Clause::Bool(b) => {
                for clause in b.must.iter().chain(&b.should).chain(&b.must_not) {
                    clause.collect_leaves(out);
                }
            }
        }
    }
}

fn write_boost(f: &mut fmt::Formatter<'_>, boost: f32) -> fmt::Result {
    if boost != 1.0 {
        write!(f, "^{}", boost)?;
    }
    Ok(())
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::MatchAll => f.write_str("*:*"),
            Clause::Match(m) => {
                match m.kind {
                    MatchKind::ExactPhrase => write!(f, "{}:\"{}\"", m.field, m.text)?,
                    MatchKind::ExactTerm => write!(f, "{}:({})", m.field, m.text)?,
                    MatchKind::Prefix => write!(f, "{}:({}*)", m.field, m.text)?,
                    MatchKind::Fuzzy => write!(f, "{}:({}~{})", m.field, m.text, FUZZY_SIMILARITY)?,
                }
                write_boost(f, m.boost)
            }
            Clause::Bool(b) => {
                let mut parts = Vec::with_capacity(b.must.len() + b.should.len() + b.must_not.len());
                parts.extend(b.must.iter().map(|c| format!("+{}", c)));
                if b.must.is_empty() {
                    parts.push(b.should.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" OR "));
                } else {
                    parts.extend(b.should.iter().map(|c| c.to_string()));
                }
                parts.extend(b.must_not.iter().map(|c| format!("-{}", c)));
                parts.retain(|p| !p.is_empty());
                write!(f, "({})", parts.join(" "))?;
                write_boost(f, b.boost)
            }
        }
    }
}

/// Builds boosted name clauses over a configurable set of fields
#[derive(Debug, Clone)]
pub struct WeightedClauseBuilder {
    name_field: String,
    code_field: String,
    preferred_field: String,
}

impl WeightedClauseBuilder {
    pub fn new(name_field: impl Into<String>) -> Self {
        Self {
            name_field: name_field.into(),
            code_field: "code".to_string(),
            preferred_field: "locale_preferred".to_string(),
        }
    }

    pub fn with_code_field(mut self, field: impl Into<String>) -> Self {
        self.code_field = field.into();
        self
    }

    pub fn with_preferred_field(mut self, field: impl Into<String>) -> Self {
        self.preferred_field = field.into();
        self
    }

    /// Name clause for `phrase`.
    ///
    /// Without keyword search the phrase must match as a whole. With keyword
    /// search the exact phrase (0.7) competes with a group (0.3) in which every
    /// token must match exactly (0.6), by prefix (0.3) or fuzzily (0.1).
    ///
    /// Returns `None` when there is nothing to search for; callers then rely on
    /// locale and filter clauses alone.
    pub fn build_name_clause(&self, tokens: &[Token], phrase: &EscapedText, search_keywords: bool) -> Option<Clause> {
        if phrase.is_empty() && tokens.is_empty() {
            return None;
        }

        let phrase_text = phrase.as_str().trim();
        if !search_keywords {
            if phrase_text.is_empty() {
                return None;
            }
            return Some(Clause::field_match(&self.name_field, MatchKind::ExactPhrase, phrase_text, 1.0));
        }

        let mut alternatives = Vec::with_capacity(2);
        if !phrase_text.is_empty() {
            alternatives.push(Clause::field_match(
                &self.name_field,
                MatchKind::ExactPhrase,
                phrase_text,
                PHRASE_WEIGHT,
            ));
        }

        if !tokens.is_empty() {
            let per_token = tokens.iter().map(|token| self.token_clause(token)).collect();
            alternatives.push(Clause::all_of(per_token, TOKEN_GROUP_WEIGHT));
        }

        Some(Clause::any_of(alternatives, 1.0))
    }

    fn token_clause(&self, token: &Token) -> Clause {
        Clause::any_of(
            vec![
                Clause::field_match(&self.name_field, MatchKind::ExactTerm, &token.text, EXACT_TERM_WEIGHT),
                Clause::field_match(&self.name_field, MatchKind::Prefix, &token.text, PREFIX_WEIGHT),
                Clause::field_match(&self.name_field, MatchKind::Fuzzy, &token.text, FUZZY_WEIGHT),
            ],
            1.0,
        )
    }

    /// Reference code (0.4) OR locale-preferred name (0.4) OR any name (0.2)
    pub fn build_composite_concept_name_clause(
        &self,
        tokens: &[Token],
        phrase: &EscapedText,
        search_keywords: bool,
    ) -> Option<Clause> {
        let name_clause = self.build_name_clause(tokens, phrase, search_keywords)?;

        let code_clause = Clause::field_match(&self.code_field, MatchKind::ExactTerm, phrase.as_str().trim(), CODE_WEIGHT);
        let preferred_clause = Clause::all_of(
            vec![name_clause.clone(), Clause::term(&self.preferred_field, "true")],
            PREFERRED_NAME_WEIGHT,
        );

        Some(Clause::any_of(
            vec![code_clause, preferred_clause, name_clause.boosted(ANY_NAME_WEIGHT)],
            1.0,
        ))
    }
}
