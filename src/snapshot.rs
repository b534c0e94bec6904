use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A single secret field as returned by the store
///
/// Values keep their original type until they are rendered for output.
#[derive(Debug, Clone, PartialEq)]
pub enum SecretValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
    /// Nested objects or arrays
    Structured(serde_json::Value),
}

impl SecretValue {
    /// Convert a loosely typed JSON value into a secret value
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => SecretValue::Text(s),
            serde_json::Value::Number(n) => SecretValue::Number(n),
            serde_json::Value::Bool(b) => SecretValue::Bool(b),
            serde_json::Value::Null => SecretValue::Null,
            other => SecretValue::Structured(other),
        }
    }

    /// Render the value as the string written to the output file and environment
    pub fn render(&self) -> String {
        match self {
            SecretValue::Text(s) => s.clone(),
            SecretValue::Number(n) => n.to_string(),
            SecretValue::Bool(b) => b.to_string(),
            SecretValue::Null => String::new(),
            SecretValue::Structured(v) => v.to_string(),
        }
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        SecretValue::Text(value.to_string())
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        SecretValue::Text(value)
    }
}

/// One observation of a secret: its fields plus an opaque version identifier
#[derive(Debug, Clone, PartialEq)]
pub struct SecretSnapshot {
    version: String,
    data: BTreeMap<String, SecretValue>,
}

impl SecretSnapshot {
    pub fn new(version: impl Into<String>, data: BTreeMap<String, SecretValue>) -> Self {
        Self {
            version: version.into(),
            data,
        }
    }

    /// Build a snapshot from string pairs
    pub fn from_pairs<K, V>(version: impl Into<String>, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<SecretValue>,
    {
        let data = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(version, data)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn data(&self) -> &BTreeMap<String, SecretValue> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All fields with their values rendered to strings
    pub fn rendered(&self) -> BTreeMap<String, String> {
        self.data
            .iter()
            .map(|(k, v)| (k.clone(), v.render()))
            .collect()
    }

    /// SHA-256 over the rendered content, safe to put in logs
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in self.rendered() {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        let result = hasher.finalize();

        format!("sha256:{}", hex::encode(&result))
    }
}

// Helper module for hex encoding
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_keeps_primitive_types() {
        assert_eq!(SecretValue::from_json(json!("abc")), SecretValue::Text("abc".to_string()));
        assert_eq!(SecretValue::from_json(json!(true)), SecretValue::Bool(true));
        assert_eq!(SecretValue::from_json(json!(null)), SecretValue::Null);
        assert!(matches!(SecretValue::from_json(json!(42)), SecretValue::Number(_)));
        assert!(matches!(SecretValue::from_json(json!({"a": 1})), SecretValue::Structured(_)));
    }

    #[test]
    fn render_stringifies_every_variant() {
        assert_eq!(SecretValue::from_json(json!("abc")).render(), "abc");
        assert_eq!(SecretValue::from_json(json!(42)).render(), "42");
        assert_eq!(SecretValue::from_json(json!(1.5)).render(), "1.5");
        assert_eq!(SecretValue::from_json(json!(false)).render(), "false");
        assert_eq!(SecretValue::from_json(json!(null)).render(), "");
        assert_eq!(SecretValue::from_json(json!(["a", 1])).render(), r#"["a",1]"#);
    }

    #[test]
    fn empty_snapshot_is_valid() {
        let snapshot = SecretSnapshot::new("1", BTreeMap::new());
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
        assert_eq!(snapshot.version(), "1");
    }

    #[test]
    fn fingerprint_has_correct_format() {
        let snapshot = SecretSnapshot::from_pairs("1", [("a", "1")]);
        let fingerprint = snapshot.fingerprint();
        assert!(fingerprint.starts_with("sha256:"));
        assert_eq!(fingerprint.len(), 71);
    }

    #[test]
    fn fingerprint_ignores_version_and_insertion_order() {
        let a = SecretSnapshot::from_pairs("1", [("a", "1"), ("b", "2")]);
        let b = SecretSnapshot::from_pairs("2", [("b", "2"), ("a", "1")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_differs_for_different_values() {
        let a = SecretSnapshot::from_pairs("1", [("a", "1")]);
        let b = SecretSnapshot::from_pairs("1", [("a", "2")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn rendered_converts_all_values() {
        let mut data = BTreeMap::new();
        data.insert("port".to_string(), SecretValue::from_json(json!(5432)));
        data.insert("user".to_string(), SecretValue::from("admin"));
        let snapshot = SecretSnapshot::new("3", data);

        let rendered = snapshot.rendered();
        assert_eq!(rendered.get("port").map(String::as_str), Some("5432"));
        assert_eq!(rendered.get("user").map(String::as_str), Some("admin"));
    }
}
