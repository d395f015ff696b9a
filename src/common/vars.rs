use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// A JSON object used for trigger payloads, execution data and action outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars {
    inner: Map<String, Value>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Vars::set`].
    pub fn with(
        mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) {
        self.inner.insert(key.to_string(), value.into());
    }

    /// Typed read of a top-level key; `None` when missing or of another shape.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Option<T> {
        self.inner.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Resolve a dotted path such as `order.customer.email`.
    ///
    /// An exact top-level key wins over path traversal, so keys that contain
    /// dots stay addressable.
    pub fn lookup(
        &self,
        path: &str,
    ) -> Option<&Value> {
        if let Some(value) = self.inner.get(path) {
            return Some(value);
        }
        let mut parts = path.split('.');
        let mut current = self.inner.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Shallow merge; keys of `other` overwrite existing keys.
    pub fn merge(
        &mut self,
        other: Vars,
    ) {
        self.inner.extend(other.inner);
    }
}

impl Deref for Vars {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for Vars {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl From<Map<String, Value>> for Vars {
    fn from(inner: Map<String, Value>) -> Self {
        Self {
            inner,
        }
    }
}

/// Objects convert field by field; `null` becomes empty and any other
/// value is kept under the `value` key.
impl From<Value> for Vars {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(inner) => Self {
                inner,
            },
            Value::Null => Self::new(),
            other => Self::new().with("value", other),
        }
    }
}

impl From<Vars> for Value {
    fn from(vars: Vars) -> Self {
        Value::Object(vars.inner)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Vars;

    #[test]
    fn test_get_typed() {
        let vars = Vars::new().with("count", 3).with("name", "lead");
        assert_eq!(vars.get::<u32>("count"), Some(3));
        assert_eq!(vars.get::<String>("name"), Some("lead".to_string()));
        assert_eq!(vars.get::<u32>("name"), None);
    }

    #[test]
    fn test_lookup_nested_path() {
        let vars = Vars::from(json!({"order": {"items": [{"sku": "A1"}], "total": 10}}));
        assert_eq!(vars.lookup("order.total"), Some(&json!(10)));
        assert_eq!(vars.lookup("order.items.0.sku"), Some(&json!("A1")));
        assert_eq!(vars.lookup("order.missing"), None);
    }

    #[test]
    fn test_lookup_prefers_exact_key() {
        let vars = Vars::from(json!({"a.b": 1, "a": {"b": 2}}));
        assert_eq!(vars.lookup("a.b"), Some(&json!(1)));
    }

    #[test]
    fn test_from_non_object() {
        assert!(Vars::from(json!(null)).is_empty());
        assert_eq!(Vars::from(json!(5)).get::<i32>("value"), Some(5));
    }

    #[test]
    fn test_merge_overwrites() {
        let mut vars = Vars::new().with("a", 1).with("b", 1);
        vars.merge(Vars::new().with("b", 2));
        assert_eq!(serde_json::Value::from(vars), json!({"a": 1, "b": 2}));
    }
}
