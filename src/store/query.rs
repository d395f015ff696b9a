use std::{cmp::Ordering, collections::HashMap};

use serde_json::Value;

const DEFAULT_LIMIT: usize = 100;

/// Collection query: equality filters joined with AND, ordering and paging.
#[derive(Debug, Clone)]
pub struct Query {
    filters: Vec<(String, Value)>,
    order_by: Vec<(String, bool)>,
    limit: usize,
    offset: usize,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    /// Keeps documents whose `key` equals `value`.
    pub fn filter(
        mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push((key.to_string(), value.into()));
        self
    }

    /// Sorts on `key`, descending when `rev` is set. Later calls break ties.
    pub fn order(
        mut self,
        key: &str,
        rev: bool,
    ) -> Self {
        self.order_by.push((key.to_string(), rev));
        self
    }

    /// Page size, at least 1.
    pub fn set_limit(
        mut self,
        limit: usize,
    ) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn set_offset(
        mut self,
        offset: usize,
    ) -> Self {
        self.offset = offset;
        self
    }

    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    pub fn order_by(&self) -> &[(String, bool)] {
        &self.order_by
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_match(
        &self,
        doc: &HashMap<String, Value>,
    ) -> bool {
        self.filters.iter().all(|(key, value)| doc.get(key).is_some_and(|v| v == value))
    }

    /// Ordering of two documents under this query's `order_by`.
    pub fn compare(
        &self,
        a: &HashMap<String, Value>,
        b: &HashMap<String, Value>,
    ) -> Ordering {
        for (key, rev) in self.order_by.iter() {
            let ord = compare_values(a.get(key), b.get(key));
            let ord = if *rev { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

fn compare_values(
    a: Option<&Value>,
    b: Option<&Value>,
) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.as_f64().unwrap_or_default().total_cmp(&b.as_f64().unwrap_or_default()),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None, Some(_)) | (Some(Value::Null), Some(_)) => Ordering::Less,
        (Some(_), None) | (Some(_), Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_filters_are_anded() {
        let q = Query::new().filter("owner", "u1").filter("status", "active");
        assert!(q.is_match(&doc(&[("owner", json!("u1")), ("status", json!("active"))])));
        assert!(!q.is_match(&doc(&[("owner", json!("u1")), ("status", json!("paused"))])));
        assert!(!q.is_match(&doc(&[("status", json!("active"))])));
    }

    #[test]
    fn test_compare_with_tie_break() {
        let q = Query::new().order("start_time", true).order("id", false);
        let a = doc(&[("start_time", json!(10)), ("id", json!("a"))]);
        let b = doc(&[("start_time", json!(20)), ("id", json!("b"))]);
        let c = doc(&[("start_time", json!(20)), ("id", json!("c"))]);
        assert_eq!(q.compare(&a, &b), Ordering::Greater);
        assert_eq!(q.compare(&b, &c), Ordering::Less);
    }

    #[test]
    fn test_limit_is_at_least_one() {
        assert_eq!(Query::new().limit(), 100);
        assert_eq!(Query::new().set_limit(0).limit(), 1);
    }
}
