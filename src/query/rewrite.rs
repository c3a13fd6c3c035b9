//! SQL text rewriting shared by derived and declared queries.
//!
//! Everything here works on text and only ever looks at *top-level* SQL: characters
//! inside parentheses, string literals, quoted identifiers or comments are skipped
//! when searching for clauses, so a subquery's `ORDER BY` or a literal containing
//! `from` never confuses the rewrite.

use crate::domain::Sort;
use crate::metadata::EntityInformation;
use crate::query::error::BindingError;
use once_cell::sync::Lazy;
use regex::Regex;

static SELECT: Lazy<Regex> = Lazy::new(|| keyword(r"select"));
static FROM: Lazy<Regex> = Lazy::new(|| keyword(r"from"));
static DISTINCT: Lazy<Regex> = Lazy::new(|| keyword(r"distinct"));
static ORDER_BY: Lazy<Regex> = Lazy::new(|| keyword(r"order\s+by"));
static GROUP_BY: Lazy<Regex> = Lazy::new(|| keyword(r"group\s+by"));
static TAIL: Lazy<Regex> = Lazy::new(|| keyword(r"(?:limit|offset|fetch|for\s+update)"));
static SET_OPERATION: Lazy<Regex> = Lazy::new(|| keyword(r"(?:union|intersect|except)"));
static FROM_ALIAS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^from\s+("[^"]+"|[\w.]+)(?:\s+(?:as\s+)?("[^"]+"|\w+))?"#)
        .expect("valid alias regex")
});

/// Words that can follow a table name without being its alias.
const NOT_ALIASES: [&str; 15] = [
    "where", "join", "inner", "left", "right", "full", "cross", "natural", "on", "group",
    "order", "limit", "offset", "having", "union",
];

fn keyword(pattern: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b{pattern}\b")).expect("valid keyword regex")
}

/// Per-byte flag: `true` where the byte is plain SQL at nesting depth zero.
fn top_level_mask(sql: &str) -> Vec<bool> {
    let bytes = sql.as_bytes();
    let mut mask = vec![false; bytes.len()];
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == quote {
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ => mask[i] = depth == 0,
        }
        i += 1;
    }
    mask
}

/// Matches of `re` at depth zero. A word qualified by `.` (`t.offset`) is an
/// identifier, not a keyword.
fn top_level_matches(re: &Regex, sql: &str, mask: &[bool]) -> Vec<(usize, usize)> {
    re.find_iter(sql)
        .filter(|m| mask.get(m.start()).copied().unwrap_or(false))
        .filter(|m| m.start() == 0 || sql.as_bytes()[m.start() - 1] != b'.')
        .map(|m| (m.start(), m.end()))
        .collect()
}

fn first_top_level(re: &Regex, sql: &str, mask: &[bool]) -> Option<(usize, usize)> {
    top_level_matches(re, sql, mask).first().copied()
}

fn last_top_level(re: &Regex, sql: &str, mask: &[bool]) -> Option<(usize, usize)> {
    top_level_matches(re, sql, mask).last().copied()
}

/// Removes a trailing top-level `ORDER BY` and any `LIMIT`/`OFFSET` tail.
fn strip_ordering(sql: &str) -> &str {
    let mask = top_level_mask(sql);
    let cut = [
        last_top_level(&ORDER_BY, sql, &mask).map(|(s, _)| s),
        first_top_level(&TAIL, sql, &mask).map(|(s, _)| s),
    ]
    .into_iter()
    .flatten()
    .min();
    match cut {
        Some(pos) => sql[..pos].trim_end(),
        None => sql.trim_end(),
    }
}

/// Builds the count query for `sql`.
///
/// The projection between the top-level `SELECT` and `FROM` becomes `COUNT(*)` and
/// the ordering tail is dropped; every other byte is kept, so both queries filter
/// identically and bind the same values in the same order. Queries whose row count
/// depends on the projection (`DISTINCT`, `GROUP BY`, set operations) or whose
/// projection holds placeholders are wrapped instead:
/// `SELECT COUNT(*) FROM (<query>) AS count_subquery`.
pub fn derive_count_query(sql: &str) -> String {
    let cleaned = strip_ordering(sql.trim());
    let mask = top_level_mask(cleaned);

    let wrap = || format!("SELECT COUNT(*) FROM ({cleaned}) AS count_subquery");

    let Some((select_start, select_end)) = first_top_level(&SELECT, cleaned, &mask) else {
        return wrap();
    };
    if select_start != 0 {
        return wrap();
    }
    let Some((from_start, _)) = first_top_level(&FROM, cleaned, &mask) else {
        return wrap();
    };
    let projection = &cleaned[select_end..from_start];
    let projection_mask = &mask[select_end..from_start];

    let distinct = DISTINCT
        .find_iter(projection)
        .any(|m| projection_mask.get(m.start()).copied().unwrap_or(false));
    if distinct
        || projection.contains('$')
        || projection.contains('?')
        || projection.contains(':')
        || first_top_level(&GROUP_BY, cleaned, &mask).is_some()
        || first_top_level(&SET_OPERATION, cleaned, &mask).is_some()
    {
        return wrap();
    }

    format!("SELECT COUNT(*) {}", &cleaned[from_start..])
}

/// Whether `sql` ends in its own top-level `LIMIT`/`OFFSET`/`FETCH` or locking tail.
pub fn has_row_limit(sql: &str) -> bool {
    let mask = top_level_mask(sql);
    first_top_level(&TAIL, sql, &mask).is_some()
}

/// Alias of the first top-level `FROM` item, if any (`users u` -> `u`).
pub fn detect_alias(sql: &str) -> Option<String> {
    let mask = top_level_mask(sql);
    let (from_start, _) = first_top_level(&FROM, sql, &mask)?;
    let caps = FROM_ALIAS.captures(&sql[from_start..])?;
    let alias = caps.get(2)?.as_str();
    if NOT_ALIASES.iter().any(|k| k.eq_ignore_ascii_case(alias)) {
        None
    } else {
        Some(alias.to_string())
    }
}

/// Appends `sort` to the query's top-level ordering.
///
/// Sort properties are mapped to columns through `entity` and qualified with the
/// query's `FROM` alias when it has one. An existing `ORDER BY` is extended; the new
/// terms always go before a `LIMIT`/`OFFSET` tail.
///
/// # Errors
///
/// `BindingError::UnknownSortProperty` if a property is not mapped.
pub fn apply_sorting(sql: &str, sort: &Sort, entity: &dyn EntityInformation) -> Result<String, BindingError> {
    if !sort.is_sorted() {
        return Ok(sql.to_string());
    }

    let alias = detect_alias(sql);
    let mut terms = Vec::new();
    for order in sort {
        let column = entity
            .column_for(&order.property)
            .ok_or_else(|| BindingError::UnknownSortProperty {
                property: order.property.clone(),
            })?;
        let reference = match &alias {
            Some(alias) => format!("{alias}.\"{column}\""),
            None => format!("\"{column}\""),
        };
        let reference = if order.ignore_case {
            format!("LOWER({reference})")
        } else {
            reference
        };
        terms.push(format!("{reference} {}", order.direction.to_sql()));
    }
    let terms = terms.join(", ");

    let trimmed = sql.trim_end();
    let mask = top_level_mask(trimmed);
    let order_by = last_top_level(&ORDER_BY, trimmed, &mask);
    let tail = first_top_level(&TAIL, trimmed, &mask)
        .filter(|(start, _)| order_by.map_or(true, |(o, _)| *start > o))
        .map(|(start, _)| start);

    let (head, rest) = match tail {
        Some(pos) => (trimmed[..pos].trim_end(), &trimmed[pos..]),
        None => (trimmed, ""),
    };
    let joiner = if order_by.is_some() { ", " } else { " ORDER BY " };
    let mut out = format!("{head}{joiner}{terms}");
    if !rest.is_empty() {
        out.push(' ');
        out.push_str(rest);
    }
    Ok(out)
}

/// One piece of declared query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// `?N`
    Positional(usize),
    /// `:name`
    Named(String),
}

/// Splits declared query text into text and placeholder segments.
///
/// `?N` and `:name` are placeholders outside literals, quoted identifiers and
/// comments. `::` casts, a bare `?` (a Postgres JSON operator) and `$N` are text.
pub fn parse_placeholders(sql: &str) -> Vec<Segment> {
    let bytes = sql.as_bytes();
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    let flush = |segments: &mut Vec<Segment>, from: usize, to: usize| {
        if to > from {
            segments.push(Segment::Text(sql[from..to].to_string()));
        }
    };

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == quote {
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            b'?' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                flush(&mut segments, text_start, i);
                // digits only, parse cannot fail short of overflow
                let position = sql[start..end].parse().unwrap_or(usize::MAX);
                segments.push(Segment::Positional(position));
                i = end;
                text_start = end;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                i += 2;
            }
            b':' if bytes
                .get(i + 1)
                .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_')
                && (i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b':')) =>
            {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                    end += 1;
                }
                flush(&mut segments, text_start, i);
                segments.push(Segment::Named(sql[start..end].to_string()));
                i = end;
                text_start = end;
            }
            _ => i += 1,
        }
    }
    flush(&mut segments, text_start, bytes.len());
    segments
}

/// Number of distinct placeholders among `segments`.
pub fn placeholder_count(segments: &[Segment]) -> usize {
    let mut seen: Vec<&Segment> = Vec::new();
    for segment in segments {
        if !matches!(segment, Segment::Text(_)) && !seen.contains(&segment) {
            seen.push(segment);
        }
    }
    seen.len()
}
