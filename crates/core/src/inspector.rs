//! Read-only views over the semantic index's persisted key/value stores.
//!
//! Nothing here is cached: every call re-reads the store files so the answer always
//! matches what is on disk.

use crate::models::StorageStats;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub const FULL_DOCS_STORE: &str = "kv_store_full_docs.json";
pub const TEXT_CHUNKS_STORE: &str = "kv_store_text_chunks.json";
pub const ENTITIES_STORE: &str = "kv_store_full_entities.json";

const MARKER_PREFIX: &str = "[Document: ";

/// Header every inserted body starts with. A `]` in the name becomes `\]`; backslashes
/// are doubled only when they sit right before a `]` or at the end of the name, so
/// other backslashes are written exactly as older stores wrote them.
pub fn document_header(name: &str) -> String {
    let mut header = String::with_capacity(MARKER_PREFIX.len() + name.len() + 1);
    header.push_str(MARKER_PREFIX);
    let mut backslashes = 0;
    for ch in name.chars() {
        match ch {
            '\\' => {
                backslashes += 1;
                continue;
            }
            ']' => {
                push_backslashes(&mut header, backslashes * 2 + 1);
                header.push(']');
            }
            other => {
                push_backslashes(&mut header, backslashes);
                header.push(other);
            }
        }
        backslashes = 0;
    }
    push_backslashes(&mut header, backslashes * 2);
    header.push(']');
    header
}

fn push_backslashes(target: &mut String, count: usize) {
    target.extend(std::iter::repeat('\\').take(count));
}

pub fn wrap_with_header(name: &str, body: &str) -> String {
    format!("{}\n\n{}", document_header(name), body)
}

/// Recovers the document name from the leading marker of a stored body. Only a marker
/// at the very start counts, so body text quoting `[Document: ...]` is ignored.
pub fn parse_document_marker(text: &str) -> Option<String> {
    let rest = text.trim_start().strip_prefix(MARKER_PREFIX)?;
    let mut name = String::new();
    let mut chars = rest.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let mut run = 1;
                while chars.next_if_eq(&'\\').is_some() {
                    run += 1;
                }
                if chars.peek() == Some(&']') {
                    push_backslashes(&mut name, run / 2);
                    if run % 2 == 1 {
                        chars.next();
                        name.push(']');
                    }
                } else {
                    push_backslashes(&mut name, run);
                }
            }
            ']' => return (!name.is_empty()).then_some(name),
            '\n' | '\r' => return None,
            other => name.push(other),
        }
    }

    None
}

pub fn list_indexed(storage_dir: &Path) -> BTreeSet<String> {
    let Some(records) = read_store(&storage_dir.join(FULL_DOCS_STORE)) else {
        return BTreeSet::new();
    };

    records
        .values()
        .filter_map(stored_text)
        .filter_map(parse_document_marker)
        .collect()
}

pub fn stats(storage_dir: &Path) -> StorageStats {
    let count = |name: &str| {
        read_store(&storage_dir.join(name))
            .map(|records| records.len())
            .unwrap_or(0)
    };

    StorageStats {
        document_count: count(FULL_DOCS_STORE),
        chunk_count: count(TEXT_CHUNKS_STORE),
        entity_count: count(ENTITIES_STORE),
        storage_size_bytes: top_level_size(storage_dir),
    }
}

fn stored_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(text) => Some(text),
        Value::Object(record) => record.get("content").and_then(Value::as_str),
        _ => None,
    }
}

fn read_store(path: &Path) -> Option<Map<String, Value>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "store file absent");
            return None;
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "unable to read store file");
            return None;
        }
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(records)) => Some(records),
        Ok(_) => {
            warn!(path = %path.display(), "store file is not a JSON object");
            None
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "store file is not valid JSON");
            None
        }
    }
}

fn top_level_size(storage_dir: &Path) -> u64 {
    let entries = match fs::read_dir(storage_dir) {
        Ok(entries) => entries,
        Err(error) => {
            debug!(path = %storage_dir.display(), %error, "storage directory unreadable");
            return 0;
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok())
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn header_round_trips_plain_and_escaped_names() {
        for name in [
            "a.pdf",
            "report [draft].pdf",
            r"odd\name.pdf",
            r"trailing\",
            r"slash\]bracket.pdf",
            r"two\\]",
        ] {
            let body = wrap_with_header(name, "[Page 1]\nhello");
            assert_eq!(parse_document_marker(&body).as_deref(), Some(name));
        }
        assert_eq!(document_header("a.pdf"), "[Document: a.pdf]");
    }

    #[test]
    fn backslashes_away_from_brackets_are_written_verbatim() {
        assert_eq!(document_header(r"a\b.pdf"), r"[Document: a\b.pdf]");
        assert_eq!(
            parse_document_marker("[Document: a\\b.pdf]\n\nbody").as_deref(),
            Some(r"a\b.pdf")
        );
        assert_eq!(
            parse_document_marker(r"[Document: dir\\share\x.pdf]").as_deref(),
            Some(r"dir\\share\x.pdf")
        );
    }

    #[test]
    fn marker_must_lead_the_text() {
        assert_eq!(parse_document_marker("intro [Document: x.pdf] more"), None);
        assert_eq!(parse_document_marker("[Document: ]"), None);
        assert_eq!(parse_document_marker("[Document: unterminated"), None);
        assert_eq!(
            parse_document_marker("\n  [Document: b.pdf]\n\n[Document: fake.pdf]").as_deref(),
            Some("b.pdf")
        );
    }

    #[test]
    fn missing_storage_yields_empty_set_and_zero_stats() {
        let dir = tempdir().expect("tempdir");
        let absent = dir.path().join("nope");

        assert!(list_indexed(&absent).is_empty());
        assert_eq!(stats(&absent), StorageStats::default());
        assert_eq!(stats(dir.path()), StorageStats::default());
    }

    #[test]
    fn list_indexed_skips_malformed_records() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let records = json!({
            "doc-1": "[Document: a.pdf]\n\ntext",
            "doc-2": {"content": "[Document: b.pdf]\n\ntext", "file_path": "b.pdf"},
            "doc-3": 42,
            "doc-4": "no marker here",
            "doc-5": {"other": "field"},
        });
        fs::write(dir.path().join(FULL_DOCS_STORE), records.to_string())?;

        let names = list_indexed(dir.path());
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["a.pdf".to_string(), "b.pdf".to_string()]
        );
        Ok(())
    }

    #[test]
    fn corrupt_store_degrades_only_its_own_count() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join(FULL_DOCS_STORE), "{not json")?;
        fs::write(
            dir.path().join(TEXT_CHUNKS_STORE),
            json!({"c1": {}, "c2": {}, "c3": {}}).to_string(),
        )?;
        fs::write(dir.path().join(ENTITIES_STORE), "[1, 2]")?;
        fs::create_dir(dir.path().join("nested"))?;
        fs::write(dir.path().join("nested").join("ignored.bin"), vec![0u8; 4096])?;

        let snapshot = stats(dir.path());
        assert_eq!(snapshot.document_count, 0);
        assert_eq!(snapshot.chunk_count, 3);
        assert_eq!(snapshot.entity_count, 0);

        let expected: u64 = [FULL_DOCS_STORE, TEXT_CHUNKS_STORE, ENTITIES_STORE]
            .iter()
            .map(|name| fs::metadata(dir.path().join(name)).map(|m| m.len()))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .sum();
        assert_eq!(snapshot.storage_size_bytes, expected);
        assert!(list_indexed(dir.path()).is_empty());
        Ok(())
    }
}
