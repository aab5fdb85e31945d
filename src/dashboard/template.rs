// src/dashboard/template.rs

//! `${with.<name>.<column>}` runtime-reference parsing and substitution.
//!
//! A leaf's query text may reference the output of a with-run. References
//! are substituted with literal values taken from the first row of the
//! publisher's terminal data, producing a fully resolved statement before
//! execution.

use std::collections::HashMap;

use crate::query::QueryResult;

/// A single parsed `${with.<name>.<column>}` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WithRef {
    pub with_name: String,
    pub column: String,
}

/// Scan query text for `${with.<name>.<column>}` references.
///
/// Malformed `${...}` groups (missing the `with.` prefix or the column
/// part) are left alone here; substitution reports them when asked to
/// resolve the text.
pub fn references(text: &str) -> Vec<WithRef> {
    let mut refs = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        if let Some(reference) = parse_ref(&after[..end]) {
            if !refs.contains(&reference) {
                refs.push(reference);
            }
        }
        rest = &after[end + 1..];
    }

    refs
}

fn parse_ref(body: &str) -> Option<WithRef> {
    let rest = body.strip_prefix("with.")?;
    let (name, column) = rest.split_once('.')?;
    if name.is_empty() || column.is_empty() {
        return None;
    }
    Some(WithRef {
        with_name: name.to_string(),
        column: column.to_string(),
    })
}

/// True if the text contains at least one runtime reference.
pub fn has_references(text: &str) -> bool {
    !references(text).is_empty()
}

/// Substitute every runtime reference in `text` with a literal value drawn
/// from the named publisher's terminal data.
///
/// The value comes from the first row of the publisher's result; a missing
/// publisher entry, empty result or unknown column is an error (the
/// publisher completed, but did not produce the value the subscriber
/// declared it needs).
pub fn resolve(text: &str, published: &HashMap<String, QueryResult>) -> Result<String, String> {
    let mut resolved = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        resolved.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // unterminated group; keep the raw text
            resolved.push_str(&rest[start..]);
            return Ok(resolved);
        };
        let body = &after[..end];

        match parse_ref(body) {
            Some(reference) => {
                let value = lookup(&reference, published)?;
                resolved.push_str(&value);
            }
            None => {
                return Err(format!(
                    "malformed runtime reference '${{{body}}}' \
                     (expected ${{with.<name>.<column>}})"
                ));
            }
        }

        rest = &after[end + 1..];
    }

    resolved.push_str(rest);
    Ok(resolved)
}

fn lookup(reference: &WithRef, published: &HashMap<String, QueryResult>) -> Result<String, String> {
    let data = published.get(&reference.with_name).ok_or_else(|| {
        format!(
            "no published data for with '{}' (reference ${{with.{}.{}}})",
            reference.with_name, reference.with_name, reference.column
        )
    })?;

    let row = data.rows.first().ok_or_else(|| {
        format!(
            "with '{}' returned no rows; cannot resolve column '{}'",
            reference.with_name, reference.column
        )
    })?;

    let cell = row.get(&reference.column).ok_or_else(|| {
        format!(
            "with '{}' has no column '{}' in its result",
            reference.with_name, reference.column
        )
    })?;

    Ok(cell.as_literal())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CellValue, Row};

    fn published_with(name: &str, column: &str, value: CellValue) -> HashMap<String, QueryResult> {
        let mut row = Row::default();
        row.cells.insert(column.to_string(), value);
        let result = QueryResult {
            columns: vec![column.to_string()],
            rows: vec![row],
        };
        HashMap::from([(name.to_string(), result)])
    }

    #[test]
    fn finds_references() {
        let refs = references("select * from t where id = ${with.w.id} and x = ${with.w2.x}");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].with_name, "w");
        assert_eq!(refs[0].column, "id");
        assert_eq!(refs[1].with_name, "w2");
    }

    #[test]
    fn ignores_non_with_groups() {
        assert!(references("select '${HOME}' as path").is_empty());
        assert!(!has_references("select 1"));
    }

    #[test]
    fn substitutes_text_as_quoted_literal() {
        let published = published_with("w", "id", CellValue::Text("x".to_string()));
        let resolved = resolve("select * from t where id = ${with.w.id}", &published).unwrap();
        assert_eq!(resolved, "select * from t where id = 'x'");
    }

    #[test]
    fn substitutes_integers_unquoted() {
        let published = published_with("w", "n", CellValue::Integer(42));
        let resolved = resolve("select ${with.w.n}", &published).unwrap();
        assert_eq!(resolved, "select 42");
    }

    #[test]
    fn missing_column_is_an_error() {
        let published = published_with("w", "id", CellValue::Text("x".to_string()));
        let err = resolve("select ${with.w.other}", &published).unwrap_err();
        assert!(err.contains("no column 'other'"));
    }

    #[test]
    fn empty_result_is_an_error() {
        let published = HashMap::from([("w".to_string(), QueryResult::default())]);
        let err = resolve("select ${with.w.id}", &published).unwrap_err();
        assert!(err.contains("no rows"));
    }
}
