//! Canonical record file format: a `---` delimited metadata block followed by a free-text body.
//!
//! ```text
//! ---
//! title: Login fails on Safari
//! tags: [auth, bug]
//! priority: high
//! ---
//! Body text, stored byte-for-byte.
//! ```
//!
//! [`decode`] never fails. Anything it cannot read as a metadata block is treated as body, so a
//! hand-edited file with a broken header still shows up in scans and rebuilds.

use std::collections::BTreeMap;

use super::types::MetaValue;

/// Marker line opening and closing the metadata block.
pub const DELIMITER: &str = "---";

/// Decoded metadata, keyed by field name.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Keys whose values are always string lists.
const LIST_KEYS: &[&str] = &["tags", "related", "labels", "links"];

fn is_list_key(key: &str) -> bool {
    LIST_KEYS.contains(&key)
}

/// Split a file into metadata and body.
pub fn decode(text: &str) -> (Metadata, String) {
    match split_block(text) {
        Some((block, body)) => (parse_block(block), body.to_string()),
        None => (Metadata::new(), text.to_string()),
    }
}

/// Serialize metadata and body. `decode(&encode(m, b)) == (m, b)` for any `m` produced by `decode`.
pub fn encode(metadata: &Metadata, body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 64 * metadata.len() + 8);
    out.push_str(DELIMITER);
    out.push('\n');
    for (key, value) in metadata {
        encode_entry(&mut out, key, value);
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    out
}

/// Locate the metadata block. Returns `(block, body)` or `None` when the header is malformed.
fn split_block(text: &str) -> Option<(&str, &str)> {
    let mut lines = LineCursor::new(text);
    let (first, _) = lines.next()?;
    if first.trim_end() != DELIMITER {
        return None;
    }
    let block_start = lines.offset();
    loop {
        let line_start = lines.offset();
        let (line, _) = lines.next()?;
        if line.trim_end() == DELIMITER {
            return Some((&text[block_start..line_start], &text[lines.offset()..]));
        }
    }
}

/// Iterates lines while tracking the byte offset just past each consumed newline.
struct LineCursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn offset(&self) -> usize {
        self.pos
    }

    fn next(&mut self) -> Option<(&'a str, bool)> {
        if self.pos >= self.text.len() {
            return None;
        }
        let rest = &self.text[self.pos..];
        match rest.find('\n') {
            Some(idx) => {
                self.pos += idx + 1;
                Some((&rest[..idx], true))
            }
            None => {
                self.pos = self.text.len();
                Some((rest, false))
            }
        }
    }
}

fn parse_block(block: &str) -> Metadata {
    let mut metadata = Metadata::new();
    let mut pending: Option<(String, Vec<String>)> = None;

    for raw in block.lines() {
        let line = raw.trim();

        if let Some(item) = list_item(line) {
            if let Some((_, items)) = pending.as_mut() {
                items.push(item.to_string());
            }
            continue;
        }

        if let Some((key, items)) = pending.take() {
            let value = if items.is_empty() {
                MetaValue::Null
            } else {
                MetaValue::List(items)
            };
            metadata.insert(key, value);
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        if value.is_empty() {
            pending = Some((key.to_string(), Vec::new()));
        } else {
            metadata.insert(key.to_string(), coerce(key, value));
        }
    }

    if let Some((key, items)) = pending {
        let value = if items.is_empty() {
            MetaValue::Null
        } else {
            MetaValue::List(items)
        };
        metadata.insert(key, value);
    }

    metadata
}

/// `- item` or a bare `-` (empty item).
fn list_item(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('-')?;
    if rest.is_empty() {
        return Some("");
    }
    if rest.starts_with(char::is_whitespace) {
        return Some(rest.trim());
    }
    None
}

fn coerce(key: &str, value: &str) -> MetaValue {
    if is_list_key(key) {
        return MetaValue::List(parse_list_value(value));
    }

    if let Some(text) = quoted_scalar(value) {
        return MetaValue::String(text);
    }

    if value.contains(',') {
        let items: Vec<String> = value.split(',').map(|s| s.trim().to_string()).collect();
        let numbers: Option<Vec<f64>> = items.iter().map(|s| parse_number(s)).collect();
        return match numbers {
            Some(numbers) => MetaValue::Numbers(numbers),
            None => MetaValue::List(items),
        };
    }

    match value {
        "true" => MetaValue::Bool(true),
        "false" => MetaValue::Bool(false),
        _ => match parse_number(value) {
            Some(n) => MetaValue::Number(n),
            None => MetaValue::String(value.to_string()),
        },
    }
}

/// A JSON string literal (`"1.10"`, `"a,b"`) read back as exactly that text.
fn quoted_scalar(value: &str) -> Option<String> {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        serde_json::from_str::<String>(value).ok()
    } else {
        None
    }
}

/// List-key values: `["a", "b"]`, `[a, b]`, or `a, b`.
fn parse_list_value(value: &str) -> Vec<String> {
    if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(value) {
            return items;
        }
        return split_items(inner);
    }
    split_items(value)
}

fn split_items(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strict decimal: `-?digits(.digits)?([eE][+-]?digits)?`. Rejects `inf`, `NaN`, `1.`, `.5`.
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut i = 0;
    if bytes.first() == Some(&b'-') {
        i += 1;
    }
    let digits = |i: &mut usize| {
        let start = *i;
        while *i < bytes.len() && bytes[*i].is_ascii_digit() {
            *i += 1;
        }
        *i > start
    };
    if !digits(&mut i) {
        return None;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        if !digits(&mut i) {
            return None;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        if !digits(&mut i) {
            return None;
        }
    }
    if i != bytes.len() {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Render a number so that [`parse_number`] reads back the same value.
pub(crate) fn format_number(n: f64) -> String {
    let text = n.to_string();
    if parse_number(&text).is_some() {
        text
    } else {
        format!("{n:e}")
    }
}

fn encode_entry(out: &mut String, key: &str, value: &MetaValue) {
    match value {
        MetaValue::Null => {
            out.push_str(key);
            out.push_str(":\n");
        }
        MetaValue::Bool(b) => push_line(out, key, if *b { "true" } else { "false" }),
        MetaValue::Number(n) => push_line(out, key, &format_number(*n)),
        MetaValue::String(s) => push_line(out, key, &scalar_text(key, s)),
        MetaValue::Numbers(ns) => {
            let joined = ns
                .iter()
                .map(|n| format_number(*n))
                .collect::<Vec<_>>()
                .join(", ");
            push_line(out, key, &joined);
        }
        MetaValue::List(items) if is_list_key(key) => {
            push_line(out, key, &flow_list(items));
        }
        MetaValue::List(items) => {
            out.push_str(key);
            out.push_str(":\n");
            for item in items {
                out.push_str("  - ");
                out.push_str(item);
                out.push('\n');
            }
        }
    }
}

/// `s` as written, or JSON-quoted when decoding it bare would not yield the same string.
fn scalar_text(key: &str, s: &str) -> String {
    let reads_back = !s.is_empty()
        && s.trim() == s
        && !s.contains(['\n', '\r'])
        && coerce(key, s) == MetaValue::String(s.to_string());
    if is_list_key(key) || reads_back {
        s.to_string()
    } else {
        serde_json::to_string(s).unwrap_or_else(|_| s.to_string())
    }
}

fn push_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
}

/// `[a, b]` when every item survives comma splitting unchanged, JSON otherwise.
fn flow_list(items: &[String]) -> String {
    let plain = items.iter().all(|item| {
        !item.is_empty()
            && item.trim() == item
            && !item.contains([',', '[', ']', '"', '\'', '\n'])
    });
    if plain {
        format!("[{}]", items.join(", "))
    } else {
        serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
    }
}
