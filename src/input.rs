use std::path::Path;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::raw::RawRecord;

/// Envelope keys that hold a list of lots.
const LIST_KEYS: &[&str] = &["results", "items", "lots"];

/// Load raw lots from a capture file.
///
/// Accepted shapes: a JSON array of objects, a search-API response
/// (`{"results": [...]}` or `{"hits": {"hits": [{"_source": {...}}]}}`),
/// a single object, or JSON lines.
pub fn load_records(path: &Path) -> Result<Vec<RawRecord>, Error> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse_records_from(&text, path)?;
    info!(path = %path.display(), records = records.len(), "loaded raw lots");
    Ok(records)
}

pub fn parse_records(text: &str) -> Result<Vec<RawRecord>, Error> {
    parse_records_from(text, Path::new("<input>"))
}

pub fn parse_records_from(text: &str, origin: &Path) -> Result<Vec<RawRecord>, Error> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => {
            extract_records(value).ok_or_else(|| Error::UnsupportedShape(origin.to_path_buf()))
        }
        // Several top-level objects: JSON lines
        Err(_) if trimmed.starts_with('{') && trimmed.lines().nth(1).is_some() => {
            parse_lines(trimmed, origin)
        }
        Err(source) => Err(Error::Json {
            path: origin.to_path_buf(),
            source,
        }),
    }
}

fn parse_lines(text: &str, origin: &Path) -> Result<Vec<RawRecord>, Error> {
    let mut records = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|source| Error::JsonLine {
            path: origin.to_path_buf(),
            line: i + 1,
            source,
        })?;
        match RawRecord::from_value(value) {
            Some(r) => records.push(r),
            None => warn!(line = i + 1, "skipping non-object JSON line"),
        }
    }
    debug!(records = records.len(), "parsed JSON lines");
    Ok(records)
}

fn extract_records(value: Value) -> Option<Vec<RawRecord>> {
    match value {
        Value::Array(items) => Some(collect_objects(items)),
        Value::Object(mut map) => {
            for key in LIST_KEYS {
                if !matches!(map.get(*key), Some(Value::Array(_))) {
                    continue;
                }
                if let Some(Value::Array(items)) = map.remove(*key) {
                    return Some(collect_objects(items));
                }
            }
            if let Some(hits) = map
                .get_mut("hits")
                .and_then(|h| h.get_mut("hits"))
                .and_then(Value::as_array_mut)
            {
                let items = std::mem::take(hits).into_iter().map(unwrap_hit).collect();
                return Some(collect_objects(items));
            }
            Some(vec![RawRecord::new(map)])
        }
        _ => None,
    }
}

/// Search hits wrap the lot in `_source`.
fn unwrap_hit(hit: Value) -> Value {
    match hit {
        Value::Object(mut map) => match map.remove("_source") {
            Some(source @ Value::Object(_)) => source,
            Some(other) => {
                map.insert("_source".to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

fn collect_objects(items: Vec<Value>) -> Vec<RawRecord> {
    let total = items.len();
    let records: Vec<RawRecord> = items.into_iter().filter_map(RawRecord::from_value).collect();
    if records.len() < total {
        warn!(skipped = total - records.len(), "skipping non-object entries");
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_array() {
        let records = parse_records(r#"[{"id": 1}, {"id": 2}, 3, "x"]"#).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].text("id").as_deref(), Some("2"));
    }

    #[test]
    fn results_envelope() {
        let records = parse_records(r#"{"perPage": 48, "results": [{"id": 7}]}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text("id").as_deref(), Some("7"));
    }

    #[test]
    fn hits_envelope_fixture() {
        let text = std::fs::read_to_string("tests/fixtures/search_api_hits.json").unwrap();
        let records = parse_records(&text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("lot_name").as_deref(), Some("FIAT UNO MILLE 2010"));
        // hit without _source is kept whole
        assert_eq!(records[1].text("_id").as_deref(), Some("2"));
    }

    #[test]
    fn single_object() {
        let records = parse_records(r#"{"id": 1, "title": "Casa"}"#).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn json_lines() {
        let text = "{\"id\": 1}\n\n{\"id\": 2}\n";
        let records = parse_records(text).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn json_lines_error_reports_line() {
        let text = "{\"id\": 1}\n{\"id\": \n";
        match parse_records(text) {
            Err(Error::JsonLine { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn empty_and_unsupported() {
        assert!(parse_records("  ").unwrap().is_empty());
        assert!(matches!(parse_records("42"), Err(Error::UnsupportedShape(_))));
        assert!(matches!(parse_records("[1, 2"), Err(Error::Json { .. })));
    }

    #[test]
    fn missing_file() {
        let err = load_records(Path::new("tests/fixtures/does_not_exist.json")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
