//! Scans SQL text for `@name` placeholders ahead of query compilation.
//!
//! Runs its own lightweight tokenizer rather than going through `sqlparser`:
//! it only needs to recognize string literals and comments well enough to
//! skip over them, not to parse the statement.

use common::{DbError, DbResult};
use std::collections::HashMap;

/// Ordered, deduplicated record of the named parameters found in a SQL string.
///
/// Parameter names are matched case-insensitively but the first-seen casing
/// is preserved in `parameters` and returned to callers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParameterDescriptor {
    /// Unique parameter names, in first-appearance order.
    pub parameters: Vec<String>,
    /// Lowercased name -> byte offsets of each `@` occurrence, in source order.
    occurrences: HashMap<String, Vec<usize>>,
}

impl ParameterDescriptor {
    /// Byte offsets at which `name` appears (empty slice if never referenced).
    pub fn occurrences(&self, name: &str) -> &[usize] {
        self.occurrences
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `name` was referenced anywhere in the source.
    pub fn contains(&self, name: &str) -> bool {
        self.occurrences.contains_key(&name.to_ascii_lowercase())
    }

    /// Number of unique parameter names.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// Scan `sql` and extract its `@name` placeholders.
///
/// # Errors
///
/// Returns `DbError::Parser` for an unterminated string literal, a `@`
/// immediately followed by a digit, or a `@` with no identifier after it.
pub fn extract_parameters(sql: &str) -> DbResult<ParameterDescriptor> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut descriptor = ParameterDescriptor::default();
    let mut i = 0;

    while i < len {
        match bytes[i] {
            b'\'' => {
                i = skip_string_literal(bytes, i)?;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = skip_line_comment(bytes, i);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(bytes, i);
            }
            b'@' => {
                i = scan_placeholder(sql, bytes, i, &mut descriptor)?;
            }
            _ => i += 1,
        }
    }

    Ok(descriptor)
}

/// Consume a `'...'` literal (with `''` as an escaped quote), returning the
/// index just past the closing quote.
fn skip_string_literal(bytes: &[u8], start: usize) -> DbResult<usize> {
    let len = bytes.len();
    let mut i = start + 1;
    loop {
        if i >= len {
            return Err(DbError::Parser(
                "unterminated string literal in SQL text".into(),
            ));
        }
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    let len = bytes.len();
    let mut i = start + 2;
    while i < len && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let len = bytes.len();
    let mut i = start + 2;
    while i + 1 < len {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    len
}

/// Rewrite every `@name` placeholder in `sql` to `:name`.
///
/// `sqlparser`'s generic dialect tokenizes `:name` as a bind-parameter
/// placeholder but has no notion of `@name`, so the database facade runs
/// this ahead of `parse_sql` to get a string the parser can understand
/// while keeping `@name` as the user-facing placeholder syntax. Runs the
/// same literal/comment-skipping scan as [`extract_parameters`] so it never
/// touches an `@` inside a string or comment.
pub fn rewrite_placeholders(sql: &str) -> DbResult<String> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        match bytes[i] {
            b'\'' => {
                let end = skip_string_literal(bytes, i)?;
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = skip_line_comment(bytes, i);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = skip_block_comment(bytes, i);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'@' => {
                let mut descriptor = ParameterDescriptor::default();
                let end = scan_placeholder(sql, bytes, i, &mut descriptor)?;
                out.push(':');
                out.push_str(&sql[i + 1..end]);
                i = end;
            }
            _ => {
                let ch = sql[i..].chars().next().expect("i < len implies a char remains");
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }

    Ok(out)
}

/// Parse the identifier following an `@` at byte offset `at`, recording it
/// into `descriptor`. Returns the index just past the identifier.
fn scan_placeholder(
    sql: &str,
    bytes: &[u8],
    at: usize,
    descriptor: &mut ParameterDescriptor,
) -> DbResult<usize> {
    let len = bytes.len();
    let mut j = at + 1;

    match bytes.get(j) {
        Some(c) if c.is_ascii_digit() => {
            return Err(DbError::Parser(format!(
                "parameter name cannot start with a digit at offset {at}"
            )));
        }
        Some(c) if *c == b'_' || c.is_ascii_alphabetic() => {}
        _ => {
            return Err(DbError::Parser(format!(
                "empty parameter name at offset {at}"
            )));
        }
    }

    while j < len && (bytes[j] == b'_' || bytes[j].is_ascii_alphanumeric()) {
        j += 1;
    }

    let name = &sql[at + 1..j];
    let key = name.to_ascii_lowercase();
    if !descriptor.occurrences.contains_key(&key) {
        descriptor.parameters.push(name.to_string());
    }
    descriptor.occurrences.entry(key).or_default().push(at);

    Ok(j)
}
