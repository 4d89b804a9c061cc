//! Boolean query language.
//!
//! Queries are bare words, quoted phrases, `field:value` pairs, `AND`/`OR`/`NOT`, parentheses,
//! and a leading `-` for negation. [`parse`] builds an [`Expr`] tree; [`compile`] renders it in
//! the index's textual syntax and [`CompiledQuery::from_expr`] lowers it to an executable
//! SQL predicate over the FTS5 index.
//!
//! ```
//! use dossier::query::{compile, parse};
//!
//! let expr = parse(r#"title:"Bug Fix" AND -deprecated"#);
//! assert_eq!(compile(&expr), "(title:Bug Fix AND -deprecated)");
//! ```

pub mod compile;
pub mod lexer;
pub mod parser;

pub use compile::{compile, CompiledQuery};
pub use parser::parse;

use std::fmt;

/// Field vocabulary accepted in `field:value` terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Content,
    Description,
    Tags,
    Type,
}

impl Field {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "title" => Some(Self::Title),
            "content" => Some(Self::Content),
            "description" => Some(Self::Description),
            "tags" => Some(Self::Tags),
            "type" => Some(Self::Type),
            _ => None,
        }
    }

    /// Column name in the full-text index.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Content => "content",
            Self::Description => "description",
            Self::Tags => "tags",
            Self::Type => "type",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// A leaf of the query tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub field: Option<Field>,
    /// Term text with surrounding quotes removed.
    pub value: String,
    /// Written as a quoted phrase.
    pub phrase: bool,
    pub negated: bool,
}

impl Term {
    pub fn empty() -> Self {
        Self {
            field: None,
            value: String::new(),
            phrase: false,
            negated: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Term(Term),
    /// `NOT` applied to a parenthesized group.
    Not(Box<Expr>),
    Binary {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn empty() -> Self {
        Self::Term(Term::empty())
    }

    /// True when the tree carries no searchable text at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Term(term) => term.is_empty(),
            Self::Not(inner) => inner.is_empty(),
            Self::Binary { left, right, .. } => left.is_empty() && right.is_empty(),
        }
    }

    pub(crate) fn binary(op: BoolOp, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Negate, folding into leaf terms so `NOT -x` cancels out.
    pub(crate) fn negate(self) -> Self {
        match self {
            Self::Term(mut term) => {
                term.negated = !term.negated;
                Self::Term(term)
            }
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}
