//! Discovery and parsing of persisted knowledge files

use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::error::ImportError;

/// File name fragments that mark bookkeeping files rather than data
const SKIPPED_FRAGMENTS: [&str; 2] = ["report", "progress"];

/// Files to import from `dir`.
///
/// An explicit list wins; otherwise every `.json`/`.jsonl` file whose name
/// does not look like a report or progress file, sorted by name.
pub async fn discover_files(dir: &Path, explicit: &[String]) -> Result<Vec<PathBuf>, ImportError> {
    if !fs::try_exists(dir).await.unwrap_or(false) {
        return Err(ImportError::MissingDirectory(dir.to_path_buf()));
    }

    if !explicit.is_empty() {
        let mut files = Vec::new();
        for name in explicit {
            let path = dir.join(name);
            if fs::try_exists(&path).await.unwrap_or(false) {
                files.push(path);
            } else {
                warn!("Listed data file {} is missing", path.display());
            }
        }
        return Ok(files);
    }

    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await.map_err(|source| ImportError::Read {
        path: dir.to_path_buf(),
        source,
    })?;
    while let Some(entry) = entries.next_entry().await.map_err(|source| ImportError::Read {
        path: dir.to_path_buf(),
        source,
    })? {
        let path = entry.path();
        let is_data = path
            .extension()
            .is_some_and(|ext| ext == "json" || ext == "jsonl");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if is_data && !SKIPPED_FRAGMENTS.iter().any(|f| name.contains(f)) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read one file and return its raw items
pub async fn load_records_file(path: &Path) -> Result<Vec<Value>, ImportError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| ImportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse_records(&text).map_err(|message| ImportError::Format {
        path: path.to_path_buf(),
        message,
    })
}

/// Detect the format of `text`: a JSON array, a single JSON object, or JSON-Lines
pub fn parse_records(text: &str) -> Result<Vec<Value>, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => return Ok(items),
        Ok(object @ Value::Object(_)) => return Ok(vec![object]),
        Ok(other) => return Err(format!("expected an array or object, found {}", other)),
        Err(e) => debug!("Not a single JSON document ({}), trying JSON-Lines", e),
    }

    let mut items = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => items.push(value),
            Err(e) => warn!("Skipping line {}: {}", number + 1, e),
        }
    }
    if items.is_empty() {
        return Err("no valid JSON-Lines records".to_string());
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detects_array_object_and_lines() {
        assert_eq!(parse_records(r#"[{"title": "a"}, {"title": "b"}]"#).unwrap().len(), 2);
        assert_eq!(parse_records(r#"{"title": "a"}"#).unwrap().len(), 1);

        let lines = "{\"武器名\": \"铜短剑\"}\nnot json\n\n{\"武器名\": \"铁短剑\"}\n";
        let items = parse_records(lines).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["武器名"], "铁短剑");
    }

    #[test]
    fn test_zero_valid_lines_is_an_error() {
        assert!(parse_records("garbage\nmore garbage").is_err());
        assert!(parse_records("42").is_err());
    }

    #[tokio::test]
    async fn test_discovery_skips_reports() {
        let dir = TempDir::new().unwrap();
        for name in [
            "b.json",
            "a.jsonl",
            "crawl_report.json",
            "progress_state.json",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), "[]").unwrap();
        }

        let files = discover_files(dir.path(), &[]).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jsonl", "b.json"]);

        let files = discover_files(dir.path(), &["b.json".to_string(), "gone.json".to_string()])
            .await
            .unwrap();
        assert_eq!(files, vec![dir.path().join("b.json")]);
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = discover_files(&dir.path().join("nope"), &[]).await;
        assert!(matches!(result, Err(ImportError::MissingDirectory(_))));
    }
}
