//! Suite Loader — component E.
//!
//! Discovers `<schema>.<table>.sql` file pairs across a DDL directory and an
//! INSERT directory, reads them, and builds one [`Task`] per pair by running
//! the Reference Extractor (B) and Test-Directive Parser (D) over the
//! INSERT script (spec.md §4.E).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::directives;
use crate::error::LoadError;
use crate::extractor::extract_references;
use crate::task::{Task, TaskId};

const INCREMENTAL_SENTINEL: &str = "--sql-scheduler-incremental";

/// Load every DDL/INSERT pair found under `ddl_dir`/`insert_dir` into
/// `Task`s, sorted by id for deterministic iteration regardless of the
/// order the filesystem returns entries in (spec.md §8, round-trip
/// property).
pub fn load_suite(ddl_dir: &Path, insert_dir: &Path) -> Result<Vec<Task>, LoadError> {
    let ddl_files = scan_sql_files(ddl_dir)?;
    let insert_files = scan_sql_files(insert_dir)?;

    for stem in ddl_files.keys() {
        if !insert_files.contains_key(stem) {
            return Err(LoadError::MissingInsertPartner(stem.to_string()));
        }
    }
    for stem in insert_files.keys() {
        if !ddl_files.contains_key(stem) {
            return Err(LoadError::MissingDdlPartner(stem.to_string()));
        }
    }

    let mut tasks = Vec::with_capacity(ddl_files.len());
    let mut seen = std::collections::HashSet::new();

    for (stem, ddl_path) in &ddl_files {
        let id = parse_stem(stem)?;
        if !seen.insert(id.clone()) {
            return Err(LoadError::DuplicateTask(id));
        }

        let insert_path = &insert_files[stem];
        let ddl_sql = read_file(ddl_path)?;
        let insert_sql = read_file(insert_path)?;

        let refs = extract_references(&insert_sql);
        if refs.writes.is_empty() {
            return Err(LoadError::NoWriteTarget { task: id });
        }
        for write in &refs.writes {
            if write != &id {
                return Err(LoadError::WriteTargetMismatch {
                    expected: id,
                    actual: write.clone(),
                });
            }
        }

        let tests = directives::parse_directives(&insert_sql, &id)?;
        let is_incremental = has_incremental_sentinel(&insert_sql);

        tasks.push(Task {
            id,
            ddl_sql,
            insert_sql,
            reads: refs.reads,
            tests,
            is_incremental,
            params: Vec::new(),
        });
    }

    tasks.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(tasks)
}

/// Enumerate `*.sql` files in `dir`, keyed by filename stem (without the
/// extension). Directory entries are collected into a `BTreeMap` so
/// iteration order never depends on the filesystem's own ordering.
fn scan_sql_files(dir: &Path) -> Result<BTreeMap<String, PathBuf>, LoadError> {
    let mut files = BTreeMap::new();
    let entries = std::fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| LoadError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        files.insert(stem, path);
    }

    Ok(files)
}

/// Parse a `<schema>.<table>` filename stem into a [`TaskId`].
fn parse_stem(stem: &str) -> Result<TaskId, LoadError> {
    let mut parts = stem.splitn(2, '.');
    let schema = parts.next().filter(|s| !s.is_empty());
    let table = parts.next().filter(|s| !s.is_empty());
    match (schema, table) {
        (Some(schema), Some(table)) if !table.contains('.') => {
            Ok(TaskId::new(schema, table))
        }
        _ => Err(LoadError::MalformedFilename(stem.to_string())),
    }
}

fn read_file(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// A line comment `--sql-scheduler-incremental` appearing before any
/// statement marks the task as incremental (spec.md §6).
fn has_incremental_sentinel(insert_sql: &str) -> bool {
    use crate::tokenizer::{tokenize, TokenKind};

    for tok in tokenize(insert_sql) {
        match &tok.kind {
            TokenKind::Whitespace => continue,
            TokenKind::LineComment(text) if text.trim() == INCREMENTAL_SENTINEL.trim_start_matches("--") => {
                return true;
            }
            TokenKind::LineComment(_) | TokenKind::BlockComment(_) => continue,
            _ => return false,
        }
    }
    false
}
