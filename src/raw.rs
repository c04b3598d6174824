use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A lot as handed over by the acquisition side: arbitrary keys, arbitrary value types.
///
/// Accessors are total. A key that is missing, `null`, or holds a value of the
/// wrong shape simply reads as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        RawRecord(fields)
    }

    /// Wrap a JSON value; only objects are records.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(RawRecord(map)),
            _ => None,
        }
    }

    /// Non-null value under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Textual view of a field. Strings come back as-is, numbers are rendered
    /// as decimal text; booleans, arrays and objects are not text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }

    /// Copy of this record where each canonical key that is missing or null is
    /// filled from the first non-null alias, in declaration order.
    pub fn with_aliases(&self, aliases: &[(String, Vec<String>)]) -> RawRecord {
        let mut fields = self.0.clone();
        for (canonical, sources) in aliases {
            if self.get(canonical).is_some() {
                continue;
            }
            if let Some(value) = sources.iter().find_map(|k| self.get(k)) {
                fields.insert(canonical.clone(), value.clone());
            }
        }
        RawRecord(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> RawRecord {
        RawRecord::from_value(v).unwrap()
    }

    #[test]
    fn text_renders_numbers() {
        let r = record(json!({ "id": 12840014, "price": 5.0, "name": "Casa" }));
        assert_eq!(r.text("id").as_deref(), Some("12840014"));
        assert_eq!(r.text("price").as_deref(), Some("5.0"));
        assert_eq!(r.text("name").as_deref(), Some("Casa"));
    }

    #[test]
    fn wrong_shapes_read_as_absent() {
        let r = record(json!({ "a": null, "b": [1, 2], "c": { "x": 1 }, "d": true }));
        assert!(r.get("a").is_none());
        assert!(r.text("a").is_none());
        assert!(r.text("b").is_none());
        assert!(r.text("c").is_none());
        assert!(r.text("d").is_none());
        assert!(r.object("c").is_some());
        assert!(r.object("b").is_none());
        assert!(r.text("missing").is_none());
    }

    #[test]
    fn non_objects_are_not_records() {
        assert!(RawRecord::from_value(json!([1, 2])).is_none());
        assert!(RawRecord::from_value(json!("lot")).is_none());
    }

    #[test]
    fn aliases_fill_only_missing_keys() {
        let r = record(json!({
            "lot_name": "Portão de ferro",
            "name": "ignored",
            "title": null,
            "lot_city": "Santos",
            "city": "São Paulo",
        }));
        let aliases = vec![
            ("title".to_string(), vec!["lot_name".to_string(), "name".to_string()]),
            ("city".to_string(), vec!["lot_city".to_string()]),
            ("state".to_string(), vec!["lot_state".to_string()]),
        ];
        let resolved = r.with_aliases(&aliases);
        assert_eq!(resolved.text("title").as_deref(), Some("Portão de ferro"));
        assert_eq!(resolved.text("city").as_deref(), Some("São Paulo"));
        assert!(resolved.get("state").is_none());
        // source record untouched
        assert!(r.get("title").is_none());
    }
}
