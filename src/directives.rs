//! Test-Directive Parser — component D.
//!
//! Scans block comments inside an INSERT script for `granularity:`,
//! `not_null:`, and `relationship:` lines (spec.md §4.D). Directives keep
//! their source order so test failures are reported deterministically.

use crate::error::LoadError;
use crate::task::{TaskId, TestDirective};
use crate::tokenizer::{tokenize, TokenKind};

/// Parse all test directives out of `src`'s block comments, in source order.
///
/// `task` is only used to attribute a [`LoadError::MalformedDirective`] to
/// the right task.
pub fn parse_directives(src: &str, task: &TaskId) -> Result<Vec<TestDirective>, LoadError> {
    let tokens = tokenize(src);
    let mut directives = Vec::new();

    for tok in &tokens {
        let TokenKind::BlockComment(body) = &tok.kind else {
            continue;
        };

        for line in body.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(directive) = parse_directive_line(trimmed, task)? {
                directives.push(directive);
            }
        }
    }

    Ok(directives)
}

/// Parse one `kind: payload` line. Returns `None` for lines that don't
/// match any known directive kind (e.g. ordinary comment prose).
fn parse_directive_line(line: &str, task: &TaskId) -> Result<Option<TestDirective>, LoadError> {
    let Some((kind, payload)) = line.split_once(':') else {
        return Ok(None);
    };
    let kind = kind.trim();
    let payload = payload.trim();

    match kind {
        "granularity" => {
            let columns = split_columns(payload);
            if columns.is_empty() {
                return Err(malformed(task, line));
            }
            Ok(Some(TestDirective::Granularity { columns }))
        }
        "not_null" => {
            let columns = split_columns(payload);
            if columns.is_empty() {
                return Err(malformed(task, line));
            }
            Ok(Some(TestDirective::NotNull { columns }))
        }
        "relationship" => parse_relationship(payload, task, line).map(Some),
        _ => Ok(None),
    }
}

fn split_columns(payload: &str) -> Vec<String> {
    payload
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// `<local_col> = <schema>.<table>.<col>`
fn parse_relationship(payload: &str, task: &TaskId, line: &str) -> Result<TestDirective, LoadError> {
    let (local, foreign) = payload.split_once('=').ok_or_else(|| malformed(task, line))?;
    let local_column = local.trim().to_string();
    if local_column.is_empty() {
        return Err(malformed(task, line));
    }

    let parts: Vec<&str> = foreign.trim().split('.').map(str::trim).collect();
    let [schema, table, column] = parts.as_slice() else {
        return Err(malformed(task, line));
    };
    if schema.is_empty() || table.is_empty() || column.is_empty() {
        return Err(malformed(task, line));
    }

    Ok(TestDirective::Relationship {
        local_column,
        foreign_schema: schema.to_string(),
        foreign_table: table.to_string(),
        foreign_column: column.to_string(),
    })
}

fn malformed(task: &TaskId, line: &str) -> LoadError {
    LoadError::MalformedDirective {
        task: task.clone(),
        line: line.to_string(),
    }
}
