//! Schema Rewriter — component C.
//!
//! Rewrites qualified references `schema.table` to `dev_schema.table` for
//! every `(schema, table)` pair in a given replace set, leaving everything
//! else — including comments, string literals, and unrelated punctuation —
//! byte-for-byte untouched (spec.md §4.C).

use std::collections::HashSet;

use crate::task::TaskId;
use crate::tokenizer::{tokenize, Token, TokenKind};

/// Case-insensitive comparison for unquoted names, exact comparison for
/// quoted ones, matching spec.md §4.C's rule.
fn schema_table_matches(schema: &str, schema_quoted: bool, table: &str, table_quoted: bool, replace: &HashSet<TaskId>) -> bool {
    replace.iter().any(|id| {
        let schema_eq = if schema_quoted {
            id.schema == schema
        } else {
            id.schema.eq_ignore_ascii_case(schema)
        };
        let table_eq = if table_quoted {
            id.table == table
        } else {
            id.table.eq_ignore_ascii_case(table)
        };
        schema_eq && table_eq
    })
}

/// Rewrite `src`, replacing the schema half of any `schema.table` reference
/// whose `(schema, table)` is in `replace` with the unquoted `dev_schema`.
///
/// Rewriting with an empty `replace` set returns `src` unchanged
/// byte-for-byte, and rewriting twice with identical parameters is
/// idempotent (spec.md §8).
pub fn rewrite_schema(src: &str, replace: &HashSet<TaskId>, dev_schema: &str) -> String {
    if replace.is_empty() {
        return src.to_string();
    }

    let tokens = tokenize(src);
    let mut out = String::with_capacity(src.len());
    let mut i = 0usize;

    while i < tokens.len() {
        if let Some((schema, table, span_end)) = try_qualified_at(&tokens, i) {
            let schema_quoted = matches!(tokens[i].kind, TokenKind::Quoted(_));
            let table_quoted = matches!(tokens[span_end - 1].kind, TokenKind::Quoted(_));

            if schema_table_matches(&schema, schema_quoted, &table, table_quoted, replace) {
                out.push_str(dev_schema);
                out.push('.');
                out.push_str(&table);
                i = span_end;
                continue;
            }
        }

        out.push_str(tokens[i].text(src));
        i += 1;
    }

    out
}

/// If tokens starting at `idx` form `<word_or_quoted> . <word_or_quoted>`,
/// return `(schema, table, end_index)`.
fn try_qualified_at(tokens: &[Token], idx: usize) -> Option<(String, String, usize)> {
    let schema_tok = tokens.get(idx)?;
    let dot_tok = tokens.get(idx + 1)?;
    let table_tok = tokens.get(idx + 2)?;

    if !matches!(dot_tok.kind, TokenKind::Punct('.')) {
        return None;
    }

    let schema = match &schema_tok.kind {
        TokenKind::Word(w) => w.clone(),
        TokenKind::Quoted(q) => q.clone(),
        _ => return None,
    };
    let table = match &table_tok.kind {
        TokenKind::Word(w) => w.clone(),
        TokenKind::Quoted(q) => q.clone(),
        _ => return None,
    };

    Some((schema, table, idx + 3))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, &str)]) -> HashSet<TaskId> {
        pairs.iter().map(|(s, t)| TaskId::new(*s, *t)).collect()
    }

    #[test]
    fn rewrites_matching_schema_only() {
        let replace = set(&[("s", "b"), ("s", "c")]);
        let out = rewrite_schema("SELECT * FROM s.b JOIN s.c ON true, raw.z z", &replace, "dev");
        assert_eq!(out, "SELECT * FROM dev.b JOIN dev.c ON true, raw.z z");
    }

    #[test]
    fn leaves_tables_outside_replace_set_untouched() {
        let replace = set(&[("s", "c")]);
        let out = rewrite_schema("SELECT * FROM s.a, raw.z", &replace, "dev");
        assert_eq!(out, "SELECT * FROM s.a, raw.z");
    }

    #[test]
    fn empty_replace_set_is_byte_for_byte_identity() {
        let src = "SELECT * FROM s.a /* comment FROM s.a */ -- trailer\n";
        let out = rewrite_schema(src, &HashSet::new(), "dev");
        assert_eq!(out, src);
    }

    #[test]
    fn rewriting_twice_is_idempotent() {
        let replace = set(&[("s", "a")]);
        let once = rewrite_schema("FROM s.a", &replace, "dev");
        let twice = rewrite_schema(&once, &replace, "dev");
        assert_eq!(once, twice);
    }

    #[test]
    fn never_rewrites_inside_comments_or_string_literals() {
        let replace = set(&[("s", "a")]);
        let src = "SELECT 's.a' AS lit FROM s.a /* s.a mentioned here too */";
        let out = rewrite_schema(src, &replace, "dev");
        assert_eq!(out, "SELECT 's.a' AS lit FROM dev.a /* s.a mentioned here too */");
    }

    #[test]
    fn quoted_identifiers_compare_case_sensitively() {
        let replace = set(&[("s", "Orders")]);
        let out = rewrite_schema(r#"FROM s."Orders""#, &replace, "dev");
        assert_eq!(out, "FROM dev.Orders");
        let out2 = rewrite_schema(r#"FROM s."orders""#, &replace, "dev");
        assert_eq!(out2, r#"FROM s."orders""#);
    }

    #[test]
    fn unquoted_identifiers_compare_case_insensitively() {
        let replace = set(&[("s", "orders")]);
        let out = rewrite_schema("FROM S.ORDERS", &replace, "dev");
        assert_eq!(out, "FROM dev.ORDERS");
    }

    #[test]
    fn preserves_byte_positions_outside_rewritten_spans() {
        let replace = set(&[("s", "b")]);
        let src = "SELECT *\nFROM s.a\nJOIN s.b ON true\n";
        let out = rewrite_schema(src, &replace, "dev");
        // Everything up to "JOIN " is untouched, including the newline count.
        let join_idx = out.find("JOIN ").unwrap();
        assert_eq!(&out[..join_idx], &src[..join_idx]);
    }
}
