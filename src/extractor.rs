//! Reference Extractor — component B.
//!
//! Walks a tokenized INSERT script looking for `FROM`/`JOIN` read references
//! and `INSERT INTO`/`UPDATE`/`DELETE FROM`/`CREATE TABLE`/`DROP TABLE` write
//! targets (spec.md §4.B). Comments are skipped entirely so that keywords
//! appearing inside them never produce a reference.

use crate::task::TaskId;
use crate::tokenizer::{tokenize, Token, TokenKind};

/// The references found in one script: every distinct schema-qualified
/// table read, and every distinct table written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedReferences {
    pub reads: Vec<TaskId>,
    pub writes: Vec<TaskId>,
}

/// Significant (non-whitespace, non-comment) tokens, keeping their index
/// into the original token stream so callers can recover byte spans.
fn significant(tokens: &[Token]) -> Vec<&Token> {
    tokens
        .iter()
        .filter(|t| !matches!(t.kind, TokenKind::Whitespace) && !t.is_comment())
        .collect()
}

fn word_eq(tok: &Token, kw: &str) -> bool {
    tok.as_word().is_some_and(|w| w.eq_ignore_ascii_case(kw))
}

/// Parse `a.b` (two identifier/quoted tokens joined by `.`) starting at
/// `idx` in `sig`. Returns the qualified id and the index just past it.
fn parse_qualified(sig: &[&Token], idx: usize, src: &str) -> Option<(TaskId, usize)> {
    let schema_tok = sig.get(idx)?;
    let dot_tok = sig.get(idx + 1)?;
    let table_tok = sig.get(idx + 2)?;

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
    let _ = src;
    Some((TaskId::new(schema, table), idx + 3))
}

/// True if `sig[idx..]` starts with the given case-insensitive keyword
/// sequence (each element one token).
fn matches_seq(sig: &[&Token], idx: usize, seq: &[&str]) -> bool {
    if idx + seq.len() > sig.len() {
        return false;
    }
    seq.iter()
        .enumerate()
        .all(|(offset, kw)| word_eq(sig[idx + offset], kw))
}

/// Extract read/write references from an INSERT script's source text.
pub fn extract_references(src: &str) -> ExtractedReferences {
    let tokens = tokenize(src);
    let sig = significant(&tokens);
    let mut reads = Vec::new();
    let mut writes = Vec::new();

    let write_seqs: &[&[&str]] = &[
        &["insert", "into"],
        &["update"],
        &["delete", "from"],
        &["create", "table", "if", "not", "exists"],
        &["create", "table"],
        &["drop", "table", "if", "exists"],
        &["drop", "table"],
    ];

    let read_seqs: &[&[&str]] = &[
        &["from"],
        &["join"],
        &["inner", "join"],
        &["left", "join"],
        &["right", "join"],
        &["full", "outer", "join"],
        &["full", "join"],
        &["cross", "join"],
    ];

    let mut i = 0;
    while i < sig.len() {
        let mut matched = false;

        for seq in write_seqs {
            if matches_seq(&sig, i, seq) {
                let after = i + seq.len();
                if let Some((id, next)) = parse_qualified(&sig, after, src) {
                    if !writes.contains(&id) {
                        writes.push(id);
                    }
                    i = next;
                    matched = true;
                    break;
                }
            }
        }
        if matched {
            continue;
        }

        for seq in read_seqs {
            if matches_seq(&sig, i, seq) {
                let after = i + seq.len();
                if let Some((id, next)) = parse_qualified(&sig, after, src) {
                    if !reads.contains(&id) {
                        reads.push(id);
                    }
                    i = next;
                    matched = true;
                    break;
                }
            }
        }
        if matched {
            continue;
        }

        i += 1;
    }

    ExtractedReferences { reads, writes }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_insert_into_write_target() {
        let refs = extract_references("INSERT INTO s.a SELECT * FROM raw.src");
        assert_eq!(refs.writes, vec![TaskId::new("s", "a")]);
        assert_eq!(refs.reads, vec![TaskId::new("raw", "src")]);
    }

    #[test]
    fn recognizes_all_join_variants_case_insensitively() {
        let sql = "insert into s.a select * from s.b \
                   JOIN s.c ON true \
                   inner join s.d on true \
                   Left Join s.e on true \
                   right join s.f on true \
                   full outer join s.g on true \
                   cross join s.h";
        let refs = extract_references(sql);
        for t in ["b", "c", "d", "e", "f", "g", "h"] {
            assert!(refs.reads.contains(&TaskId::new("s", t)), "missing {t}");
        }
    }

    #[test]
    fn ignores_unqualified_tables() {
        let refs = extract_references("INSERT INTO s.a SELECT * FROM unqualified");
        assert!(refs.reads.is_empty());
    }

    #[test]
    fn deduplicates_repeated_references() {
        let refs = extract_references(
            "INSERT INTO s.a SELECT * FROM raw.x JOIN raw.x ON true WHERE 1 IN (SELECT 1 FROM raw.x)",
        );
        assert_eq!(refs.reads, vec![TaskId::new("raw", "x")]);
    }

    #[test]
    fn comments_never_contribute_references() {
        let refs = extract_references(
            "/* references FROM public.x just in a comment */\n-- JOIN public.y\nINSERT INTO s.a SELECT * FROM raw.z",
        );
        assert_eq!(refs.reads, vec![TaskId::new("raw", "z")]);
        assert!(!refs.reads.iter().any(|t| t.schema == "public"));
    }

    #[test]
    fn multiple_write_statements_all_captured() {
        let refs = extract_references(
            "DELETE FROM s.a WHERE 1=1; INSERT INTO s.a SELECT * FROM raw.x;",
        );
        assert_eq!(refs.writes, vec![TaskId::new("s", "a")]);
    }

    #[test]
    fn create_and_drop_table_targets() {
        let refs = extract_references("DROP TABLE IF EXISTS s.a; CREATE TABLE s.a (id int);");
        assert_eq!(refs.writes, vec![TaskId::new("s", "a")]);
    }
}
