//! Schema-less access to fetched Kubernetes objects
//!
//! Objects come back from the API server as JSON trees. [`Document`] reads
//! nested fields by path and returns `None` for anything missing or of the
//! wrong shape, so callers never have to cast through `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An untyped Kubernetes object
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Value);

/// One entry of a `status.conditions` list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    /// Condition type, e.g. "Ready"
    pub type_: String,
    /// Condition status, usually "True", "False" or "Unknown"
    pub status: String,
    /// Human readable detail, empty when the controller set none
    pub message: String,
}

impl Document {
    /// Wrap a JSON value
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the underlying JSON value
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume the document, returning the JSON value
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Value at `path`, walking object keys
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.0, |node, key| node.get(key))
    }

    /// String at `path`
    pub fn get_str(&self, path: &[&str]) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// List at `path`
    pub fn get_list(&self, path: &[&str]) -> Option<&Vec<Value>> {
        self.get(path).and_then(Value::as_array)
    }

    /// Object at `path`
    pub fn get_map(&self, path: &[&str]) -> Option<&Map<String, Value>> {
        self.get(path).and_then(Value::as_object)
    }

    /// `kind` of the object, empty when unset
    pub fn kind(&self) -> &str {
        self.get_str(&["kind"]).unwrap_or_default()
    }

    /// `metadata.name` of the object, empty when unset
    pub fn name(&self) -> &str {
        self.get_str(&["metadata", "name"]).unwrap_or_default()
    }

    /// `metadata.namespace` of the object
    pub fn namespace(&self) -> Option<&str> {
        self.get_str(&["metadata", "namespace"])
    }

    /// Entries of `status.conditions`.
    ///
    /// Returns `None` when the list is absent. Entries that are not objects
    /// or lack a string `type` are skipped.
    pub fn conditions(&self) -> Option<Vec<Condition>> {
        let list = self.get_list(&["status", "conditions"])?;
        Some(
            list.iter()
                .filter_map(|entry| {
                    let type_ = entry.get("type")?.as_str()?;
                    Some(Condition {
                        type_: type_.to_string(),
                        status: entry
                            .get("status")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        message: entry
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect(),
        )
    }

    /// Last condition of the given type.
    ///
    /// A later duplicate overrides an earlier one.
    pub fn condition(&self, condition_type: &str) -> Option<Condition> {
        self.conditions()?
            .into_iter()
            .rev()
            .find(|c| c.type_ == condition_type)
    }

    /// Top-level `status` field rendered as a string.
    ///
    /// Strings are returned as-is; numbers and booleans use their JSON form.
    pub fn status_field(&self, key: &str) -> Option<String> {
        match self.get_map(&["status"])?.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(conditions: Value) -> Document {
        Document::new(json!({
            "apiVersion": "openmcp.cloud/v1alpha1",
            "kind": "ServiceProvider",
            "metadata": {"name": "crossplane"},
            "status": {"conditions": conditions, "phase": "Ready", "observedGeneration": 3}
        }))
    }

    #[test]
    fn test_path_access() {
        let doc = provider(json!([]));
        assert_eq!(doc.kind(), "ServiceProvider");
        assert_eq!(doc.name(), "crossplane");
        assert_eq!(doc.namespace(), None);
        assert_eq!(doc.get_str(&["status", "phase"]), Some("Ready"));
        assert!(doc.get(&["spec", "image"]).is_none());
        assert!(doc.get_str(&["status", "observedGeneration"]).is_none());
    }

    #[test]
    fn test_condition_last_entry_wins() {
        let doc = provider(json!([
            {"type": "Ready", "status": "False", "message": "installing"},
            {"type": "Synced", "status": "True"},
            {"type": "Ready", "status": "True", "message": "done"}
        ]));
        let ready = doc.condition("Ready").unwrap();
        assert_eq!(ready.status, "True");
        assert_eq!(ready.message, "done");
        assert_eq!(doc.condition("Synced").unwrap().message, "");
        assert!(doc.condition("Healthy").is_none());
    }

    #[test]
    fn test_conditions_absent_or_malformed() {
        let doc = Document::new(json!({"metadata": {"name": "x"}}));
        assert!(doc.conditions().is_none());

        let doc = provider(json!(["garbage", {"status": "True"}, {"type": "Ready"}]));
        let conditions = doc.conditions().unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "");
    }

    #[test]
    fn test_status_field_stringifies_scalars() {
        let doc = provider(json!([]));
        assert_eq!(doc.status_field("phase").as_deref(), Some("Ready"));
        assert_eq!(doc.status_field("observedGeneration").as_deref(), Some("3"));
        assert_eq!(doc.status_field("conditions"), None);
        assert_eq!(doc.status_field("missing"), None);
        assert_eq!(Document::default().status_field("phase"), None);
    }
}
