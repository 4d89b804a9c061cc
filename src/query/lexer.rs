//! Tokenizer for the boolean query language.

use super::Field;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A bare word, quoted phrase, or `field:value` pair.
    Term {
        field: Option<Field>,
        value: String,
        quoted: bool,
        negated: bool,
    },
    And,
    Or,
    Not,
    LParen,
    RParen,
}

/// Split a query string into tokens. Never fails; unterminated quotes run to end of input.
pub fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
            continue;
        }
        if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
            continue;
        }

        // Leading dash negates the following term, unless it stands alone.
        let mut negated = false;
        if c == '-' && i + 1 < len && starts_term(chars[i + 1]) {
            negated = true;
            i += 1;
        }

        if chars[i] == '"' {
            let (phrase, next) = read_quoted(&chars, i);
            tokens.push(Token::Term {
                field: None,
                value: phrase,
                quoted: true,
                negated,
            });
            i = next;
            continue;
        }

        let start = i;
        while i < len && !ends_word(chars[i]) {
            i += 1;
        }
        let word: String = chars[start..i].iter().collect();

        // field:"quoted value"
        if word.ends_with(':') && i < len && chars[i] == '"' {
            let name = &word[..word.len() - 1];
            let (value, next) = read_quoted(&chars, i);
            let raw: String = chars[start..next].iter().collect();
            i = next;
            tokens.push(match Field::parse(name) {
                Some(field) => Token::Term {
                    field: Some(field),
                    value,
                    quoted: true,
                    negated,
                },
                None => Token::Term {
                    field: None,
                    value: raw,
                    quoted: false,
                    negated,
                },
            });
            continue;
        }

        if !negated {
            let keyword = match word.to_ascii_uppercase().as_str() {
                "AND" => Some(Token::And),
                "OR" => Some(Token::Or),
                "NOT" => Some(Token::Not),
                _ => None,
            };
            if let Some(keyword) = keyword {
                tokens.push(keyword);
                continue;
            }
        }

        let field_pair = word
            .split_once(':')
            .filter(|(_, value)| !value.is_empty())
            .and_then(|(name, value)| Field::parse(name).map(|f| (f, value.to_string())));
        tokens.push(match field_pair {
            Some((field, value)) => Token::Term {
                field: Some(field),
                value,
                quoted: false,
                negated,
            },
            None => Token::Term {
                field: None,
                value: word,
                quoted: false,
                negated,
            },
        });
    }

    tokens
}

fn starts_term(c: char) -> bool {
    !c.is_whitespace() && c != '-' && c != '(' && c != ')'
}

fn ends_word(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ')' || c == '"'
}

/// Read a `"..."` run starting at the opening quote. Returns the inner text and the index after
/// the closing quote (or end of input).
fn read_quoted(chars: &[char], open: usize) -> (String, usize) {
    let mut j = open + 1;
    let start = j;
    while j < chars.len() && chars[j] != '"' {
        j += 1;
    }
    let inner: String = chars[start..j].iter().collect();
    if j < chars.len() {
        j += 1;
    }
    (inner, j)
}
