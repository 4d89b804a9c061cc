//! Query compilation.
//!
//! [`compile`] renders the tree in the index's textual syntax (`title:x`, `-y`,
//! `(a AND b)`), used for logging and diagnostics. [`CompiledQuery`] lowers the same tree to an
//! SQL predicate whose leaves are FTS5 `MATCH` sub-selects. FTS5 has no unary negation, so each
//! leaf is matched on its own and boolean structure lives in SQL.

use super::{parse, Expr, Term};

/// Render an expression tree. Empty operands are dropped; an all-empty tree renders as `""`.
pub fn compile(expr: &Expr) -> String {
    match expr {
        Expr::Term(term) => compile_term(term),
        Expr::Not(inner) => {
            let inner = compile(inner);
            if inner.is_empty() {
                inner
            } else {
                format!("-{inner}")
            }
        }
        Expr::Binary { op, left, right } => {
            let left = compile(left);
            let right = compile(right);
            match (left.is_empty(), right.is_empty()) {
                (true, true) => String::new(),
                (true, false) => right,
                (false, true) => left,
                (false, false) => format!("({left} {} {right})", op.as_str()),
            }
        }
    }
}

fn compile_term(term: &Term) -> String {
    let value = term.value.replace('"', "");
    let value = value.trim();
    if value.is_empty() {
        return String::new();
    }
    let body = match term.field {
        Some(field) => format!("{field}:{value}"),
        None => value.to_string(),
    };
    if term.negated {
        format!("-{body}")
    } else {
        body
    }
}

/// Sub-select matching one FTS5 expression against the records table aliased `r`.
const LEAF_SQL: &str = "r.rowid IN (SELECT rowid FROM records_fts WHERE records_fts MATCH ?)";

/// A query lowered for execution against the search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    /// Textual form, as produced by [`compile`].
    pub text: String,
    /// SQL boolean expression, `None` when the query has no searchable terms.
    pub(crate) predicate: Option<String>,
    /// FTS5 expressions bound to the predicate's placeholders, in order.
    pub(crate) params: Vec<String>,
    /// Disjunction of the positive leaves, used for BM25 ranking.
    pub(crate) rank_match: Option<String>,
}

impl CompiledQuery {
    pub fn parse(query: &str) -> Self {
        Self::from_expr(&parse(query))
    }

    pub fn from_expr(expr: &Expr) -> Self {
        let mut params = Vec::new();
        let mut positives = Vec::new();
        let predicate = lower(expr, &mut params, &mut positives);
        let rank_match = if positives.is_empty() {
            None
        } else {
            Some(positives.join(" OR "))
        };
        Self {
            text: compile(expr),
            predicate,
            params,
            rank_match,
        }
    }

    /// True when the query matches nothing meaningful; callers list instead of search.
    pub fn is_empty(&self) -> bool {
        self.predicate.is_none()
    }

    pub fn predicate(&self) -> Option<&str> {
        self.predicate.as_deref()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

fn lower(expr: &Expr, params: &mut Vec<String>, positives: &mut Vec<String>) -> Option<String> {
    match expr {
        Expr::Term(term) => {
            let fts = fts_expression(term)?;
            params.push(fts.clone());
            if term.negated {
                Some(format!("NOT {LEAF_SQL}"))
            } else {
                positives.push(fts);
                Some(LEAF_SQL.to_string())
            }
        }
        Expr::Not(inner) => {
            // terms under a negated group never contribute to ranking
            let mut ignored = Vec::new();
            lower(inner, params, &mut ignored).map(|sql| format!("NOT ({sql})"))
        }
        Expr::Binary { op, left, right } => {
            let left = lower(left, params, positives);
            let right = lower(right, params, positives);
            match (left, right) {
                (None, None) => None,
                (Some(sql), None) | (None, Some(sql)) => Some(sql),
                (Some(l), Some(r)) => Some(format!("({l} {} {r})", op.as_str())),
            }
        }
    }
}

/// Quote a term as an FTS5 string, scoped to a column when the term has a field.
fn fts_expression(term: &Term) -> Option<String> {
    let value = term.value.trim();
    if !value.chars().any(char::is_alphanumeric) {
        return None;
    }

    let quoted = match value.strip_suffix('*') {
        Some(stem) if !term.phrase && stem.chars().any(char::is_alphanumeric) => {
            format!("\"{}\"*", stem.replace('"', "\"\""))
        }
        _ => format!("\"{}\"", value.replace('"', "\"\"")),
    };

    Some(match term.field {
        Some(field) => format!("{} : {quoted}", field.as_str()),
        None => quoted,
    })
}
