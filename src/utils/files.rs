use crate::utils::error::{PartsError, Result};
use crate::utils::progress::Progress;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Number(&'a str),
    Text(String),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits = None;

    for (idx, c) in s.char_indices() {
        let is_digit = c.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != is_digit => {
                out.push(make_chunk(&s[start..idx], prev));
                start = idx;
            }
            _ => {}
        }
        in_digits = Some(is_digit);
    }
    if let Some(prev) = in_digits {
        out.push(make_chunk(&s[start..], prev));
    }
    out
}

fn make_chunk(s: &str, digits: bool) -> Chunk<'_> {
    if digits {
        Chunk::Number(s)
    } else {
        Chunk::Text(s.to_lowercase())
    }
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Human ordering: digit runs compare by value, everything else case-insensitively.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (chunks(a), chunks(b));
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x, y) {
            (Chunk::Number(x), Chunk::Number(y)) => compare_numbers(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len())
}

pub fn natural_sort<S: AsRef<str>>(mut items: Vec<S>) -> Vec<S> {
    items.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
    items
}

/// Named capture groups of the first match of `pattern` in `s`.
pub fn parse_string_regex(s: &str, pattern: &str) -> Result<HashMap<String, String>> {
    let re = Regex::new(pattern)?;
    let caps = re
        .captures(s)
        .ok_or_else(|| PartsError::ProcessingError {
            message: format!("'{}' does not match /{}/", s, pattern),
        })?;

    Ok(re
        .capture_names()
        .flatten()
        .filter_map(|name| {
            caps.name(name)
                .map(|m| (name.to_string(), m.as_str().to_string()))
        })
        .collect())
}

fn collapse_slashes(src: &str) -> String {
    let mut out = src.to_string();
    while out.contains("//") {
        out = out.replace("//", "/");
    }
    out
}

fn walk(dir: &Path, re: &Regex, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect::<Vec<_>>();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            walk(&path, re, out)?;
        } else if path.is_file() && re.is_match(&path.to_string_lossy()) {
            out.push(path);
        }
    }
    Ok(())
}

/// Recursively list the files under each source whose path matches `pattern`.
pub fn get_file_list<S: AsRef<str>>(sources: &[S], pattern: &str) -> Result<Vec<PathBuf>> {
    let re = Regex::new(pattern)?;
    let progress = Progress::new(sources.len(), "Listing files");
    let mut files = Vec::new();

    for src in sources {
        let src = collapse_slashes(src.as_ref());
        let path = Path::new(&src);
        if path.is_file() {
            if re.is_match(&src) {
                files.push(path.to_path_buf());
            }
        } else {
            walk(path, &re, &mut files)?;
        }
        progress.inc();
    }
    progress.finish();

    tracing::debug!("Found {} file(s) matching /{}/", files.len(), pattern);
    Ok(files)
}

/// Run shell commands in order, stopping at the first failure.
pub fn run_cmd_list<S: AsRef<str>>(commands: &[S], debug: bool) -> Result<()> {
    for cmd in commands {
        let cmd = cmd.as_ref();
        if debug {
            tracing::info!("Trying command: {}", cmd);
        }

        let status = Command::new("sh").arg("-c").arg(cmd).status()?;
        if !status.success() {
            return Err(PartsError::CommandFailed {
                command: cmd.to_string(),
                status: status.code().unwrap_or(-1),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_natural_sort_orders_digit_runs_by_value() {
        let sorted = natural_sort(vec!["sm10", "SM2", "sm1", "sm02b"]);
        assert_eq!(sorted, vec!["sm1", "SM2", "sm02b", "sm10"]);
    }

    #[test]
    fn test_natural_sort_barcodes() {
        let sorted = natural_sort(vec![
            "32110040000110".to_string(),
            "32110040000019".to_string(),
            "32110040000101".to_string(),
        ]);
        assert_eq!(
            sorted,
            vec!["32110040000019", "32110040000101", "32110040000110"]
        );
    }

    #[test]
    fn test_natural_cmp_digits_before_text() {
        assert_eq!(natural_cmp("10", "abc"), Ordering::Less);
        assert_eq!(natural_cmp("a", "a1"), Ordering::Less);
    }

    #[test]
    fn test_parse_string_regex() {
        let groups = parse_string_regex(
            "run_0042/module_32110040000123.root",
            r"run_(?P<run>\d+)/module_(?P<barcode>\d+)\.root",
        )
        .unwrap();
        assert_eq!(groups["run"], "0042");
        assert_eq!(groups["barcode"], "32110040000123");

        assert!(parse_string_regex("nothing here", r"(?P<x>\d+)").is_err());
    }

    #[test]
    fn test_get_file_list_recurses_and_filters() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("keep.root"), b"").unwrap();
        std::fs::write(nested.join("skip.txt"), b"").unwrap();
        std::fs::write(dir.path().join("top.root"), b"").unwrap();

        let src = format!("{}//", dir.path().display());
        let files = get_file_list(&[src], r"\.root$").unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "root"));
    }

    #[test]
    fn test_run_cmd_list_stops_on_failure() {
        assert!(run_cmd_list(&["true", "true"], false).is_ok());
        let err = run_cmd_list(&["true", "exit 3", "true"], true).unwrap_err();
        match err {
            PartsError::CommandFailed { status, .. } => assert_eq!(status, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
