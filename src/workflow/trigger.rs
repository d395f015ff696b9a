//! Workflow triggers: cron schedules and signal-driven starts.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    AutoflowError, Result,
    common::Vars,
    model::{ConditionModel, TriggerModel},
    workflow::condition::{self, Condition},
};

/// What starts a workflow run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerType {
    /// Cron expression in `config.cron`.
    Schedule,
    /// Named event, `config.event`.
    Event,
    /// Inbound webhook, `config.path`.
    Webhook,
    /// Any signal whose payload satisfies the conditions.
    Condition,
    /// Explicit user action, `config.action`.
    UserAction,
    /// Reported metric crossing `config.threshold`.
    MetricThreshold,
}

impl TriggerType {
    /// Config key naming the signal a trigger listens to.
    fn key_field(&self) -> Option<&'static str> {
        match self {
            TriggerType::Event => Some("event"),
            TriggerType::Webhook => Some("path"),
            TriggerType::UserAction => Some("action"),
            TriggerType::MetricThreshold => Some("metric"),
            TriggerType::Schedule | TriggerType::Condition => None,
        }
    }
}

/// A parsed cron expression, evaluated in UTC.
///
/// Five-field expressions (minute resolution) are accepted and run at second
/// zero; six and seven field expressions carry seconds and years.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let normalized = if !trimmed.starts_with('@') && trimmed.split_whitespace().count() == 5 {
            format!("0 {}", trimmed)
        } else {
            trimmed.to_string()
        };
        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| AutoflowError::Trigger(format!("invalid cron expression '{}': {}", expression, e)))?;
        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`.
    pub fn next_after(
        &self,
        after: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// An external signal offered to the active workflows.
#[derive(Debug, Clone)]
pub struct TriggerSignal {
    pub trigger_type: TriggerType,
    /// event name, webhook path, user action or metric name
    pub key: Option<String>,
    /// becomes the execution's trigger data
    pub payload: Vars,
}

impl TriggerSignal {
    pub fn event(
        name: &str,
        payload: Vars,
    ) -> Self {
        Self {
            trigger_type: TriggerType::Event,
            key: Some(name.to_string()),
            payload,
        }
    }

    pub fn webhook(
        path: &str,
        payload: Vars,
    ) -> Self {
        Self {
            trigger_type: TriggerType::Webhook,
            key: Some(path.to_string()),
            payload,
        }
    }

    pub fn user_action(
        action: &str,
        payload: Vars,
    ) -> Self {
        Self {
            trigger_type: TriggerType::UserAction,
            key: Some(action.to_string()),
            payload,
        }
    }

    /// The metric value is exposed to conditions as `value`.
    pub fn metric(
        name: &str,
        value: f64,
    ) -> Self {
        Self {
            trigger_type: TriggerType::MetricThreshold,
            key: Some(name.to_string()),
            payload: Vars::new().with("metric", name).with("value", value),
        }
    }

    pub fn condition(payload: Vars) -> Self {
        Self {
            trigger_type: TriggerType::Condition,
            key: None,
            payload,
        }
    }
}

/// Runtime trigger built from a [`TriggerModel`].
#[derive(Debug, Clone)]
pub struct Trigger {
    pub trigger_type: TriggerType,
    pub config: Vars,
    pub conditions: Vec<Condition>,
    schedule: Option<CronSchedule>,
    threshold: Option<Condition>,
}

impl Trigger {
    pub fn schedule(&self) -> Option<&CronSchedule> {
        self.schedule.as_ref()
    }

    /// Whether `signal` should start a run of this trigger's workflow.
    ///
    /// Schedule triggers never match a signal. Condition triggers match any
    /// signal whose payload satisfies every clause.
    pub fn matches(
        &self,
        signal: &TriggerSignal,
    ) -> bool {
        match self.trigger_type {
            TriggerType::Schedule => false,
            TriggerType::Condition => condition::all_hold(&self.conditions, &signal.payload),
            expected => {
                if signal.trigger_type != expected {
                    return false;
                }
                if let Some(field) = expected.key_field() {
                    if let Some(configured) = self.config.get::<String>(field) {
                        if signal.key.as_deref() != Some(configured.as_str()) {
                            return false;
                        }
                    }
                }
                if let Some(threshold) = &self.threshold {
                    if !threshold.evaluate(&signal.payload) {
                        return false;
                    }
                }
                condition::all_hold(&self.conditions, &signal.payload)
            }
        }
    }
}

impl TryFrom<&TriggerModel> for Trigger {
    type Error = AutoflowError;

    fn try_from(model: &TriggerModel) -> Result<Self> {
        let trigger_type = TriggerType::from_str(&model.trigger_type).map_err(|_| AutoflowError::Trigger(format!("unknown trigger type '{}'", model.trigger_type)))?;
        let config = Vars::from(model.config.clone());
        let conditions = model.conditions.iter().map(Condition::try_from).collect::<Result<Vec<_>>>()?;

        let mut schedule = None;
        let mut threshold = None;
        match trigger_type {
            TriggerType::Schedule => {
                let expression = config
                    .get::<String>("cron")
                    .or_else(|| config.get::<String>("cron_expression"))
                    .ok_or_else(|| AutoflowError::Trigger("schedule trigger requires config.cron".to_string()))?;
                schedule = Some(CronSchedule::parse(&expression)?);
            }
            TriggerType::Condition if conditions.is_empty() => {
                return Err(AutoflowError::Trigger("condition trigger requires at least one condition".to_string()));
            }
            TriggerType::MetricThreshold => {
                let value = config
                    .get::<serde_json::Value>("threshold")
                    .filter(|v| condition::as_number(v).is_some())
                    .ok_or_else(|| AutoflowError::Trigger("metric_threshold trigger requires a numeric config.threshold".to_string()))?;
                let operator = config.get::<String>("operator").unwrap_or_else(|| "greater_than".to_string());
                threshold = Some(Condition::try_from(&ConditionModel {
                    field: "value".to_string(),
                    operator,
                    value: Some(value),
                })?);
            }
            _ => {}
        }

        Ok(Self {
            trigger_type,
            config,
            conditions,
            schedule,
            threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;

    fn trigger(value: serde_json::Value) -> Result<Trigger> {
        let model: TriggerModel = serde_json::from_value(value).unwrap();
        Trigger::try_from(&model)
    }

    #[test]
    fn test_every_minute_fires_within_a_minute() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let now = Utc::now();
        let next = schedule.next_after(now).unwrap();
        assert!(next > now);
        assert!(next - now <= Duration::seconds(60));
    }

    #[test]
    fn test_five_field_runs_at_second_zero() {
        let schedule = CronSchedule::parse("30 9 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(schedule.next_after(after).unwrap(), Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_six_field_has_seconds() {
        let schedule = CronSchedule::parse("*/10 * * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 1).unwrap();
        assert_eq!(schedule.next_after(after).unwrap(), Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 10).unwrap());
    }

    #[test]
    fn test_invalid_cron_is_rejected() {
        assert!(CronSchedule::parse("every tuesday").is_err());
        assert!(trigger(json!({"type": "schedule", "config": {}})).is_err());
    }

    #[test]
    fn test_unknown_trigger_type() {
        let err = trigger(json!({"type": "telepathy"})).unwrap_err();
        assert!(err.to_string().contains("telepathy"));
    }

    #[test]
    fn test_schedule_trigger_never_matches_signals() {
        let t = trigger(json!({"type": "schedule", "config": {"cron": "0 9 * * 1"}})).unwrap();
        assert_eq!(t.schedule().unwrap().expression(), "0 9 * * 1");
        assert!(!t.matches(&TriggerSignal::condition(Vars::new())));
    }

    #[test]
    fn test_event_trigger_matches_name_and_conditions() {
        let t = trigger(json!({
            "type": "event",
            "config": {"event": "lead.created"},
            "conditions": [{"field": "score", "operator": "greater_or_equal", "value": 50}]
        }))
        .unwrap();

        assert!(t.matches(&TriggerSignal::event("lead.created", Vars::new().with("score", 80))));
        assert!(!t.matches(&TriggerSignal::event("lead.created", Vars::new().with("score", 10))));
        assert!(!t.matches(&TriggerSignal::event("lead.deleted", Vars::new().with("score", 80))));
        assert!(!t.matches(&TriggerSignal::webhook("lead.created", Vars::new().with("score", 80))));
    }

    #[test]
    fn test_event_trigger_without_name_matches_any_event() {
        let t = trigger(json!({"type": "event"})).unwrap();
        assert!(t.matches(&TriggerSignal::event("anything", Vars::new())));
    }

    #[test]
    fn test_metric_threshold() {
        let t = trigger(json!({"type": "metric_threshold", "config": {"metric": "churn", "threshold": 0.2}})).unwrap();
        assert!(t.matches(&TriggerSignal::metric("churn", 0.35)));
        assert!(!t.matches(&TriggerSignal::metric("churn", 0.1)));
        assert!(!t.matches(&TriggerSignal::metric("mrr", 0.35)));

        let below = trigger(json!({"type": "metric_threshold", "config": {"metric": "mrr", "operator": "less_than", "threshold": "1000"}})).unwrap();
        assert!(below.matches(&TriggerSignal::metric("mrr", 900.0)));
        assert!(trigger(json!({"type": "metric_threshold", "config": {"metric": "mrr"}})).is_err());
    }

    #[test]
    fn test_condition_trigger() {
        assert!(trigger(json!({"type": "condition"})).is_err());
        let t = trigger(json!({
            "type": "condition",
            "conditions": [{"field": "ticket.priority", "operator": "equals", "value": "urgent"}]
        }))
        .unwrap();
        assert!(t.matches(&TriggerSignal::event("ticket.updated", Vars::from(json!({"ticket": {"priority": "urgent"}})))));
        assert!(!t.matches(&TriggerSignal::condition(Vars::from(json!({"ticket": {"priority": "low"}})))));
    }
}
