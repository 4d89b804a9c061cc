//! Recursive-descent parser.
//!
//! ```text
//! query   := or_expr
//! or_expr := and_expr ("OR" and_expr)*
//! and_expr:= unary (("AND")? unary)*      -- adjacency is an implicit AND
//! unary   := "NOT" unary | primary
//! primary := "(" or_expr ")"? | term
//! ```
//!
//! The parser never fails. A missing `)` closes at end of input, a `)` with no open group is
//! skipped where it stands, and an operator with nothing to bind to gets an empty operand, which
//! compilation drops.

use super::lexer::{tokenize, Token};
use super::{BoolOp, Expr, Term};

/// Parse a query string. Empty or whitespace-only input yields a single empty term.
pub fn parse(input: &str) -> Expr {
    let tokens = tokenize(input);
    if tokens.is_empty() {
        return Expr::empty();
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.or_expr()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open groups; a `)` at depth zero closes nothing.
    depth: usize,
}

impl Parser {
    /// Next token, stepping over any `)` that has no open group to close.
    fn peek(&mut self) -> Option<&Token> {
        while self.depth == 0 && self.tokens.get(self.pos) == Some(&Token::RParen) {
            self.pos += 1;
        }
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn or_expr(&mut self) -> Expr {
        let mut left = self.and_expr();
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and_expr();
            left = Expr::binary(BoolOp::Or, left, right);
        }
        left
    }

    fn and_expr(&mut self) -> Expr {
        let mut left = self.unary();
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.pos += 1;
                }
                Some(Token::Term { .. } | Token::LParen | Token::Not) => {}
                _ => break,
            }
            let right = self.unary();
            left = Expr::binary(BoolOp::And, left, right);
        }
        left
    }

    fn unary(&mut self) -> Expr {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return self.unary().negate();
        }
        self.primary()
    }

    fn primary(&mut self) -> Expr {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                self.depth += 1;
                let inner = self.or_expr();
                if self.peek() == Some(&Token::RParen) {
                    self.pos += 1;
                }
                self.depth -= 1;
                inner
            }
            Some(Token::Term { .. }) => match self.advance() {
                Some(Token::Term {
                    field,
                    value,
                    quoted,
                    negated,
                }) => Expr::Term(Term {
                    field,
                    value,
                    phrase: quoted,
                    negated,
                }),
                _ => Expr::empty(),
            },
            // operator, `)`, or end of input: nothing to bind to
            _ => Expr::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Field;

    fn word(value: &str) -> Expr {
        Expr::Term(Term {
            field: None,
            value: value.into(),
            phrase: false,
            negated: false,
        })
    }

    fn not_word(value: &str) -> Expr {
        word(value).negate()
    }

    #[test]
    fn empty_query_is_single_empty_term() {
        assert_eq!(parse(""), Expr::empty());
        assert_eq!(parse("   \t"), Expr::empty());
    }

    #[test]
    fn adjacency_is_implicit_and() {
        assert_eq!(parse("a b"), parse("a AND b"));
        assert_eq!(parse("a b"), Expr::binary(BoolOp::And, word("a"), word("b")));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expected = Expr::binary(
            BoolOp::Or,
            word("a"),
            Expr::binary(BoolOp::And, word("b"), word("c")),
        );
        assert_eq!(parse("a OR b AND c"), expected);
        assert_eq!(parse("a or b c"), expected);
    }

    #[test]
    fn operators_are_left_associative() {
        let expected = Expr::binary(
            BoolOp::Or,
            Expr::binary(BoolOp::Or, word("a"), word("b")),
            word("c"),
        );
        assert_eq!(parse("a OR b OR c"), expected);
    }

    #[test]
    fn not_binds_to_next_primary() {
        let expected = Expr::binary(BoolOp::And, not_word("a"), word("b"));
        assert_eq!(parse("NOT a b"), expected);
        assert_eq!(parse("NOT NOT a"), word("a"));
        assert_eq!(parse("NOT -a"), word("a"));
    }

    #[test]
    fn not_applies_to_groups() {
        let group = Expr::binary(BoolOp::Or, word("a"), word("b"));
        assert_eq!(parse("NOT (a OR b)"), Expr::Not(Box::new(group)));
    }

    #[test]
    fn parentheses_reset_precedence() {
        let expected = Expr::binary(
            BoolOp::And,
            Expr::binary(BoolOp::Or, word("a"), word("b")),
            word("c"),
        );
        assert_eq!(parse("(a OR b) AND c"), expected);
    }

    #[test]
    fn unbalanced_parentheses_are_tolerated() {
        assert_eq!(
            parse("(a OR b"),
            Expr::binary(BoolOp::Or, word("a"), word("b"))
        );
        assert_eq!(
            parse("a) b"),
            Expr::binary(BoolOp::And, word("a"), word("b"))
        );
        assert_eq!(parse(")"), Expr::empty());
    }

    #[test]
    fn stray_close_paren_keeps_operators() {
        let a_or_b = Expr::binary(BoolOp::Or, word("a"), word("b"));
        assert_eq!(parse("a) OR b"), a_or_b);
        assert_eq!(parse("a OR b) OR c"), parse("a OR b OR c"));
        assert_eq!(parse("a AND ) b"), parse("a AND b"));
        assert_eq!(parse("(a) b) OR c"), parse("a b OR c"));
        assert_eq!(parse("a OR )"), Expr::binary(BoolOp::Or, word("a"), Expr::empty()));
    }

    #[test]
    fn field_terms_keep_their_field() {
        let expr = parse("type:issues");
        assert_eq!(
            expr,
            Expr::Term(Term {
                field: Some(Field::Type),
                value: "issues".into(),
                phrase: false,
                negated: false,
            })
        );
    }
}
