// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concat-list stitch manifest.
//!
//! One entry per line, `file '<path>'`, single-quoted with the shell
//! escape `'\''` for embedded quotes. Paths may not contain newlines
//! (the format is line-delimited).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConcatError {
    #[error("line {line} is not a file entry: {content:?}")]
    NotAFileEntry { line: usize, content: String },
    #[error("path contains a newline: {0:?}")]
    NewlineInPath(String),
}

/// Build a concat list from segment output paths in sequence order.
pub fn build_concat_list<I, S>(paths: I) -> Result<String, ConcatError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for path in paths {
        let path = path.as_ref();
        if path.contains('\n') {
            return Err(ConcatError::NewlineInPath(path.to_string()));
        }
        out.push_str("file '");
        out.push_str(&path.replace('\'', "'\\''"));
        out.push_str("'\n");
    }
    Ok(out)
}

/// Parse a concat list back into its paths. Blank lines and `#` comments
/// are tolerated (the demuxer accepts them).
pub fn parse_concat_list(list: &str) -> Result<Vec<String>, ConcatError> {
    let mut paths = Vec::new();
    for (idx, raw) in list.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let quoted = line.strip_prefix("file ").ok_or_else(|| ConcatError::NotAFileEntry {
            line: idx + 1,
            content: raw.to_string(),
        })?;
        let inner = quoted
            .strip_prefix('\'')
            .and_then(|q| q.strip_suffix('\''))
            .ok_or_else(|| ConcatError::NotAFileEntry { line: idx + 1, content: raw.to_string() })?;
        paths.push(inner.replace("'\\''", "'"));
    }
    Ok(paths)
}

#[cfg(test)]
#[path = "concat_tests.rs"]
mod tests;
