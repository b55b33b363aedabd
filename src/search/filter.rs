//! Include/exclude term constraints applied outside relevance scoring

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Field → allowed values and field → disallowed values.
///
/// Include sets narrow: a record must carry at least one allowed value of
/// every included field. Exclude sets subtract: a record carrying any
/// disallowed value is dropped. Empty value lists never create an entry, so
/// they can not narrow a search to nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    include: BTreeMap<String, BTreeSet<String>>,
    exclude: BTreeMap<String, BTreeSet<String>>,
}

/// One boolean layer of a [`FilterPredicate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterClause {
    /// The field must hold at least one of the values
    MustAnyOf { field: String, values: BTreeSet<String> },
    /// The field must not hold the value
    MustNot { field: String, value: String },
}

/// Backend-neutral form of a [`FilterSet`]: the conjunction of its clauses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub clauses: Vec<FilterClause>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `values` for `field`. Accepts a single value, an `Option` or any
    /// collection; `None` and empty collections are no-ops.
    pub fn include<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Self::add(&mut self.include, field, values);
        self
    }

    /// Disallow `values` for `field`, with the same no-op rules as [`Self::include`]
    pub fn exclude<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Self::add(&mut self.exclude, field, values);
        self
    }

    fn add<I, V>(target: &mut BTreeMap<String, BTreeSet<String>>, field: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let mut values = values.into_iter().map(|v| v.to_string()).peekable();
        if field.is_empty() || values.peek().is_none() {
            return;
        }
        target.entry(field.to_string()).or_default().extend(values);
    }

    /// Require `field` to hold one of `values`, intersected with any values
    /// already allowed for it. Returns false when no value survives, leaving
    /// the set unchanged.
    pub fn restrict<I, V>(&mut self, field: &str, values: I) -> bool
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let mut values: BTreeSet<String> = values.into_iter().map(|v| v.to_string()).collect();
        if let Some(allowed) = self.include.get(field) {
            values.retain(|v| allowed.contains(v));
        }
        if field.is_empty() || values.is_empty() {
            return false;
        }
        self.include.insert(field.to_string(), values);
        true
    }

    /// Add every constraint of `other`
    pub fn merge(&mut self, other: &FilterSet) -> &mut Self {
        for (field, values) in &other.include {
            self.include.entry(field.clone()).or_default().extend(values.iter().cloned());
        }
        for (field, values) in &other.exclude {
            self.exclude.entry(field.clone()).or_default().extend(values.iter().cloned());
        }
        self
    }

    pub fn included(&self, field: &str) -> Option<&BTreeSet<String>> {
        self.include.get(field)
    }

    pub fn excluded(&self, field: &str) -> Option<&BTreeSet<String>> {
        self.exclude.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.include.values().all(BTreeSet::is_empty) && self.exclude.values().all(BTreeSet::is_empty)
    }

    /// One MUST (OR across allowed values) per included field, then one
    /// MUST-NOT per disallowed value
    pub fn to_predicate(&self) -> FilterPredicate {
        let mut clauses = Vec::new();

        for (field, values) in &self.include {
            if values.is_empty() {
                continue;
            }
            clauses.push(FilterClause::MustAnyOf {
                field: field.clone(),
                values: values.clone(),
            });
        }

        for (field, values) in &self.exclude {
            for value in values {
                clauses.push(FilterClause::MustNot {
                    field: field.clone(),
                    value: value.clone(),
                });
            }
        }

        FilterPredicate { clauses }
    }
}

impl FilterPredicate {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate against a record whose field values are produced by `values_of`
    pub fn matches<'a, F>(&self, values_of: F) -> bool
    where
        F: Fn(&str) -> Vec<&'a str>,
    {
        self.clauses.iter().all(|clause| match clause {
            FilterClause::MustAnyOf { field, values } => values_of(field).iter().any(|v| values.contains(*v)),
            FilterClause::MustNot { field, value } => !values_of(field).iter().any(|v| *v == value.as_str()),
        })
    }
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .clauses
            .iter()
            .map(|clause| match clause {
                FilterClause::MustAnyOf { field, values } => {
                    let values: Vec<&str> = values.iter().map(String::as_str).collect();
                    format!("(MUST {} IN {{{}}})", field, values.join(", "))
                }
                FilterClause::MustNot { field, value } => format!("(MUST-NOT {} = {})", field, value),
            })
            .collect();
        f.write_str(&parts.join(" AND "))
    }
}
