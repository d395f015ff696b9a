//! Condition clauses evaluated against trigger payloads.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AutoflowError, Result, common::Vars, model::ConditionModel};

/// Comparison applied between the payload field and the clause value.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConditionOperator {
    // any value
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    NotExists,
    Empty,
    NotEmpty,
    // string or array
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    // number
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
}

/// One `{field, operator, value}` clause. `field` is a dotted path.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Option<Value>,
}

impl TryFrom<&ConditionModel> for Condition {
    type Error = AutoflowError;

    fn try_from(model: &ConditionModel) -> Result<Self> {
        let operator = ConditionOperator::from_str(&model.operator)
            .map_err(|_| AutoflowError::Trigger(format!("unknown condition operator '{}' on field '{}'", model.operator, model.field)))?;
        if model.field.is_empty() {
            return Err(AutoflowError::Trigger("condition field must not be empty".to_string()));
        }
        Ok(Self {
            field: model.field.clone(),
            operator,
            value: model.value.clone(),
        })
    }
}

impl Condition {
    pub fn evaluate(
        &self,
        payload: &Vars,
    ) -> bool {
        let actual = payload.lookup(&self.field);
        match self.operator {
            ConditionOperator::Exists => !matches!(actual, None | Some(Value::Null)),
            ConditionOperator::NotExists => matches!(actual, None | Some(Value::Null)),
            ConditionOperator::Empty => is_empty(actual),
            ConditionOperator::NotEmpty => !is_empty(actual),
            _ => {
                let (Some(actual), Some(expected)) = (actual, self.value.as_ref()) else {
                    // a missing field only satisfies the negated comparisons
                    return matches!(self.operator, ConditionOperator::NotEquals | ConditionOperator::NotIn | ConditionOperator::NotContains);
                };
                self.compare(actual, expected)
            }
        }
    }

    fn compare(
        &self,
        actual: &Value,
        expected: &Value,
    ) -> bool {
        match self.operator {
            ConditionOperator::Equals => loose_eq(actual, expected),
            ConditionOperator::NotEquals => !loose_eq(actual, expected),
            ConditionOperator::In => eval_in(actual, expected),
            ConditionOperator::NotIn => !eval_in(actual, expected),
            ConditionOperator::Contains => eval_contains(actual, expected),
            ConditionOperator::NotContains => !eval_contains(actual, expected),
            ConditionOperator::StartsWith => match (actual, expected) {
                (Value::String(s), Value::String(e)) => s.starts_with(e.as_str()),
                _ => false,
            },
            ConditionOperator::EndsWith => match (actual, expected) {
                (Value::String(s), Value::String(e)) => s.ends_with(e.as_str()),
                _ => false,
            },
            ConditionOperator::GreaterThan => eval_cmp(actual, expected, |a, b| a > b),
            ConditionOperator::LessThan => eval_cmp(actual, expected, |a, b| a < b),
            ConditionOperator::GreaterOrEqual => eval_cmp(actual, expected, |a, b| a >= b),
            ConditionOperator::LessOrEqual => eval_cmp(actual, expected, |a, b| a <= b),
            ConditionOperator::Exists | ConditionOperator::NotExists | ConditionOperator::Empty | ConditionOperator::NotEmpty => false,
        }
    }
}

/// Every clause must hold; an empty list always holds.
pub fn all_hold(
    conditions: &[Condition],
    payload: &Vars,
) -> bool {
    conditions.iter().all(|c| c.evaluate(payload))
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(arr)) => arr.is_empty(),
        Some(Value::Object(obj)) => obj.is_empty(),
        _ => false,
    }
}

/// Parse a number out of a JSON number or a numeric string.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Equality that tolerates `"42"` vs `42` and `"true"` vs `true`.
fn loose_eq(
    actual: &Value,
    expected: &Value,
) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => match (as_number(actual), as_number(expected)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => s.eq_ignore_ascii_case(&b.to_string()),
        _ => false,
    }
}

fn eval_in(
    actual: &Value,
    expected: &Value,
) -> bool {
    match expected {
        Value::Array(items) => items.iter().any(|item| loose_eq(actual, item)),
        Value::String(s) => s.split(',').map(str::trim).any(|item| loose_eq(actual, &Value::String(item.to_string()))),
        _ => false,
    }
}

fn eval_contains(
    actual: &Value,
    expected: &Value,
) -> bool {
    match (actual, expected) {
        (Value::String(s), Value::String(e)) => s.contains(e.as_str()),
        (Value::Array(items), e) => items.iter().any(|item| loose_eq(item, e)),
        (Value::Object(obj), Value::String(key)) => obj.contains_key(key),
        _ => false,
    }
}

fn eval_cmp(
    actual: &Value,
    expected: &Value,
    cmp: impl Fn(f64, f64) -> bool,
) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn clause(
        field: &str,
        operator: &str,
        value: Option<Value>,
    ) -> Condition {
        Condition::try_from(&ConditionModel {
            field: field.to_string(),
            operator: operator.to_string(),
            value,
        })
        .unwrap()
    }

    fn payload() -> Vars {
        Vars::from(json!({
            "lead": {"score": 72, "source": "webinar", "tags": ["b2b", "eu"]},
            "plan": "pro",
            "amount": "120.5",
            "notes": ""
        }))
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let err = Condition::try_from(&ConditionModel {
            field: "x".to_string(),
            operator: "roughly".to_string(),
            value: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("roughly"));
    }

    #[test]
    fn test_equality_is_loose_on_numbers() {
        let p = payload();
        assert!(clause("lead.score", "equals", Some(json!("72"))).evaluate(&p));
        assert!(clause("plan", "not_equals", Some(json!("free"))).evaluate(&p));
        assert!(!clause("plan", "equals", Some(json!("free"))).evaluate(&p));
    }

    #[test]
    fn test_numeric_comparisons() {
        let p = payload();
        assert!(clause("lead.score", "greater_than", Some(json!(50))).evaluate(&p));
        assert!(clause("amount", "less_or_equal", Some(json!(120.5))).evaluate(&p));
        assert!(!clause("plan", "greater_than", Some(json!(1))).evaluate(&p));
    }

    #[test]
    fn test_string_and_array_operators() {
        let p = payload();
        assert!(clause("lead.source", "starts_with", Some(json!("web"))).evaluate(&p));
        assert!(clause("lead.source", "ends_with", Some(json!("nar"))).evaluate(&p));
        assert!(clause("lead.tags", "contains", Some(json!("eu"))).evaluate(&p));
        assert!(clause("plan", "in", Some(json!(["pro", "enterprise"]))).evaluate(&p));
        assert!(clause("plan", "in", Some(json!("basic, pro"))).evaluate(&p));
        assert!(clause("plan", "not_in", Some(json!(["free"]))).evaluate(&p));
    }

    #[test]
    fn test_presence_operators() {
        let p = payload();
        assert!(clause("lead.score", "exists", None).evaluate(&p));
        assert!(clause("lead.owner", "not_exists", None).evaluate(&p));
        assert!(clause("notes", "empty", None).evaluate(&p));
        assert!(clause("lead.tags", "not_empty", None).evaluate(&p));
    }

    #[test]
    fn test_missing_field_only_satisfies_negations() {
        let p = payload();
        assert!(!clause("missing", "equals", Some(json!(1))).evaluate(&p));
        assert!(clause("missing", "not_equals", Some(json!(1))).evaluate(&p));
    }

    #[test]
    fn test_all_hold() {
        let p = payload();
        let conditions = vec![clause("plan", "equals", Some(json!("pro"))), clause("lead.score", "greater_than", Some(json!(90)))];
        assert!(!all_hold(&conditions, &p));
        assert!(all_hold(&conditions[..1], &p));
        assert!(all_hold(&[], &p));
    }
}
