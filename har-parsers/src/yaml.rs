//! YAML ingestion helpers shared by the YAML dialects.
//!
//! The IR value tree is JSON-shaped, so YAML documents are converted once
//! at the parser boundary. Non-string mapping keys are stringified and
//! tagged values collapse to their inner value; both appear in real-world
//! playbooks and manifests often enough to handle rather than reject.

use har_core::Value;
use serde_json::Number;

/// Convert a YAML value into the IR value tree.
pub fn to_value(yaml: &serde_yaml_ng::Value) -> Value {
    match yaml {
        serde_yaml_ng::Value::Null => Value::Null,
        serde_yaml_ng::Value::Bool(b) => Value::Bool(*b),
        serde_yaml_ng::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml_ng::Value::String(s) => Value::String(s.clone()),
        serde_yaml_ng::Value::Sequence(seq) => {
            Value::Array(seq.iter().map(to_value).collect())
        }
        serde_yaml_ng::Value::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                out.insert(key_to_string(key), to_value(value));
            }
            Value::Object(out)
        }
        serde_yaml_ng::Value::Tagged(tagged) => to_value(&tagged.value),
    }
}

fn key_to_string(key: &serde_yaml_ng::Value) -> String {
    match key {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Null => "null".to_string(),
        other => serde_yaml_ng::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Parse a single YAML document into the IR value tree.
pub fn parse_document(content: &str) -> Result<Value, String> {
    serde_yaml_ng::from_str::<serde_yaml_ng::Value>(content)
        .map(|yaml| to_value(&yaml))
        .map_err(|err| err.to_string())
}

/// Split a multi-document YAML stream on `---` separators.
///
/// Leading separators and empty documents are dropped, matching how the
/// Kubernetes tooling treats manifest bundles.
pub fn split_documents(content: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current = String::new();
    for line in content.lines() {
        if line.trim_end() == "---" || line.trim_end().starts_with("--- ") {
            if !current.trim().is_empty() {
                docs.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        docs.push(current);
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_value_basic_shapes() {
        let parsed = parse_document("name: nginx\ncount: 2\nenabled: true\nitems:\n  - a\n  - b\n").unwrap();
        assert_eq!(
            parsed,
            json!({"name": "nginx", "count": 2, "enabled": true, "items": ["a", "b"]})
        );
    }

    #[test]
    fn test_non_string_keys_stringified() {
        let parsed = parse_document("80: http\n443: https\n").unwrap();
        assert_eq!(parsed, json!({"80": "http", "443": "https"}));
    }

    #[test]
    fn test_split_documents() {
        let docs = split_documents("---\na: 1\n---\nb: 2\n---\n");
        assert_eq!(docs.len(), 2);
        assert!(docs[0].contains("a: 1"));
        assert!(docs[1].contains("b: 2"));
    }

    #[test]
    fn test_split_single_document() {
        let docs = split_documents("a: 1\n");
        assert_eq!(docs.len(), 1);
    }
}
