//! A small boolean query AST.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A boolean search query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    /// A search term or phrase.
    Term(String),
    /// All operands must match.
    And(Vec<Query>),
    /// Any operand may match.
    Or(Vec<Query>),
    /// The operand must not match.
    Not(Box<Query>),
}

impl Query {
    /// A term.
    #[must_use]
    pub fn term(text: impl Into<String>) -> Self {
        Self::Term(text.into())
    }

    /// A conjunction.
    #[must_use]
    pub fn and(operands: impl IntoIterator<Item = Self>) -> Self {
        Self::And(operands.into_iter().collect())
    }

    /// A disjunction.
    #[must_use]
    pub fn or(operands: impl IntoIterator<Item = Self>) -> Self {
        Self::Or(operands.into_iter().collect())
    }

    /// A negation.
    #[must_use]
    pub fn negate(operand: Self) -> Self {
        Self::Not(Box::new(operand))
    }

    /// Expands the query into disjunctive normal form and returns its
    /// conjunctions, each either a single literal or an `And` of literals.
    #[must_use]
    pub fn conjunctions(&self) -> Vec<Self> {
        dnf(self, false)
            .into_iter()
            .map(|mut literals| {
                if literals.len() == 1 {
                    literals.remove(0)
                } else {
                    Self::And(literals)
                }
            })
            .collect()
    }

    /// The terms of the query, negated ones included, in order.
    #[must_use]
    pub fn terms(&self) -> Vec<&str> {
        match self {
            Self::Term(text) => vec![text.as_str()],
            Self::And(operands) | Self::Or(operands) => {
                operands.iter().flat_map(Self::terms).collect()
            }
            Self::Not(operand) => operand.terms(),
        }
    }
}

/// Pushes negations to the terms and distributes `And` over `Or`.
fn dnf(query: &Query, negated: bool) -> Vec<Vec<Query>> {
    match (query, negated) {
        (Query::Term(_), false) => vec![vec![query.clone()]],
        (Query::Term(_), true) => vec![vec![Query::negate(query.clone())]],
        (Query::Not(operand), _) => dnf(operand, !negated),
        (Query::Or(operands), false) | (Query::And(operands), true) => operands
            .iter()
            .flat_map(|operand| dnf(operand, negated))
            .collect(),
        (Query::And(operands), false) | (Query::Or(operands), true) => {
            operands.iter().fold(vec![Vec::new()], |product, operand| {
                let expanded = dnf(operand, negated);
                product
                    .iter()
                    .flat_map(|prefix| {
                        expanded.iter().map(move |suffix| {
                            let mut conjunction = prefix.clone();
                            conjunction.extend(suffix.iter().cloned());
                            conjunction
                        })
                    })
                    .collect()
            })
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term(text) if text.contains(char::is_whitespace) => write!(f, "\"{text}\""),
            Self::Term(text) => write!(f, "{text}"),
            Self::And(operands) => write_joined(f, operands, " AND "),
            Self::Or(operands) => write_joined(f, operands, " OR "),
            Self::Not(operand) => write!(f, "NOT {operand}"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, operands: &[Query], separator: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            write!(f, "{separator}")?;
        }
        write!(f, "{operand}")?;
    }
    write!(f, ")")
}
