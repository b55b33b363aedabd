//! Query text normalization: escaping, keyword neutralization and tokenization
//!
//! Raw user input is first escaped so that none of its characters can be read
//! as query syntax, and the boolean keywords `AND`, `OR` and `NOT` are folded
//! to lowercase so they are searched for as ordinary words. The escaped text is
//! then split into [`Token`]s with locale stop words removed.

use crate::search::error::{SearchError, SearchResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Characters with a meaning in the query language
const RESERVED: &[char] = &[
    '\\', '+', '-', '!', '(', ')', ':', '^', '[', ']', '"', '{', '}', '~', '*', '?', '|', '&', '/',
];

static BOOLEAN_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(AND|OR|NOT)\b").expect("static regex"));

/// Text that is safe to embed in a query: reserved characters are escaped
/// and boolean operators are neutralized
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EscapedText(String);

impl EscapedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Literal text with the escapes removed
    pub fn unescaped(&self) -> String {
        QueryTextNormalizer::unescape(&self.0)
    }
}

impl fmt::Display for EscapedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized search term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Escaped term text, never empty
    pub text: String,

    /// Position of the term in the split input, counting dropped pieces
    pub position: usize,
}

/// Upper-cased stop words of one or more locales
#[derive(Debug, Clone, Default)]
pub struct StopWords(HashSet<String>);

impl StopWords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            words
                .into_iter()
                .map(|w| w.as_ref().trim().to_uppercase())
                .filter(|w| !w.is_empty())
                .collect(),
        )
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn extend<I, S>(&mut self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.0.extend(
            words
                .into_iter()
                .map(|w| w.as_ref().trim().to_uppercase())
                .filter(|w| !w.is_empty()),
        );
    }

    /// Whether `word` is a stop word, compared by its upper-case form
    pub fn contains(&self, word: &str) -> bool {
        self.0.contains(&word.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Stateless normalizer for raw search phrases
pub struct QueryTextNormalizer;

impl QueryTextNormalizer {
    /// Escape reserved characters and lowercase standalone `AND`/`OR`/`NOT`.
    ///
    /// An empty string is legal and denotes "match all".
    pub fn escape(raw: &str) -> EscapedText {
        let mut escaped = String::with_capacity(raw.len() + 8);
        for c in raw.chars() {
            if RESERVED.contains(&c) {
                escaped.push('\\');
            }
            escaped.push(c);
        }

        let neutralized = BOOLEAN_KEYWORD.replace_all(&escaped, |caps: &regex::Captures<'_>| caps[1].to_lowercase());
        EscapedText(neutralized.into_owned())
    }

    /// Escape a phrase that the caller must supply
    pub fn escape_required(raw: Option<&str>) -> SearchResult<EscapedText> {
        raw.map(Self::escape)
            .ok_or_else(|| SearchError::InvalidInput("search phrase is required".to_string()))
    }

    /// Remove query-language escapes, recovering the literal text
    pub fn unescape(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Split on whitespace, dropping empty pieces and stop words
    pub fn tokenize(escaped: &EscapedText, stop_words: &StopWords) -> Vec<Token> {
        Self::collect_tokens(escaped.as_str().split_whitespace(), stop_words)
    }

    /// Split on an arbitrary literal separator, e.g. `+` between the parts of a
    /// combination drug name
    pub fn tokenize_on(escaped: &EscapedText, separator: char, stop_words: &StopWords) -> Vec<Token> {
        let escaped_separator = Self::escape(&separator.to_string());
        Self::collect_tokens(escaped.as_str().split(escaped_separator.as_str()), stop_words)
    }

    fn collect_tokens<'a>(pieces: impl Iterator<Item = &'a str>, stop_words: &StopWords) -> Vec<Token> {
        pieces
            .enumerate()
            .filter_map(|(position, piece)| {
                let text = piece.trim();
                if text.is_empty() || stop_words.contains(text) {
                    None
                } else {
                    Some(Token {
                        text: text.to_string(),
                        position,
                    })
                }
            })
            .collect()
    }
}
