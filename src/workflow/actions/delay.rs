use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    common::Vars,
    runtime::Context,
    workflow::{
        actions::{Action, ActionOutput, ActionType},
        step::ActionId,
    },
};

/// Sleeps for `seconds` or `milliseconds`. The wait still counts against
/// the action timeout, so long delays need `timeout_seconds: 0`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DelayAction {
    #[serde(default)]
    seconds: Option<f64>,
    #[serde(default)]
    milliseconds: Option<u64>,
}

impl DelayAction {
    fn duration(&self) -> std::result::Result<Duration, String> {
        match (self.milliseconds, self.seconds) {
            (Some(ms), _) => Ok(Duration::from_millis(ms)),
            (None, Some(secs)) => Duration::try_from_secs_f64(secs.max(0.0)).map_err(|e| format!("invalid delay of {} seconds: {}", secs, e)),
            (None, None) => Ok(Duration::ZERO),
        }
    }
}

#[async_trait]
#[typetag::serde]
impl Action for DelayAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        let action = serde_json::from_value::<Self>(params)?;
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "anyOf": [{ "required": ["seconds"] }, { "required": ["milliseconds"] }],
            "properties": {
                "seconds": { "type": "number", "minimum": 0 },
                "milliseconds": { "type": "integer", "minimum": 0 }
            }
        })
    }

    fn action_type(&self) -> ActionType {
        ActionType::Delay
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _aid: ActionId,
    ) -> Result<ActionOutput> {
        let duration = match self.duration() {
            Ok(duration) => duration,
            Err(err) => return Ok(ActionOutput::failed(err)),
        };
        tokio::select! {
            _ = ctx.wait_shutdown() => Ok(ActionOutput::stopped()),
            _ = tokio::time::sleep(duration) => Ok(ActionOutput::success(Vars::new().with("waited_ms", duration.as_millis() as u64))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::workflow::actions::ActionStatus;

    #[tokio::test]
    async fn test_short_delay_succeeds() {
        let action = DelayAction::create(json!({"milliseconds": 5})).unwrap();
        let output = action.run(Context::for_test(Vars::new()), "wait".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Succeeded);
        assert_eq!(output.outputs.get::<u64>("waited_ms"), Some(5));
    }

    #[tokio::test]
    async fn test_stop_interrupts_delay() {
        let ctx = Context::for_test(Vars::new());
        let action = DelayAction::create(json!({"seconds": 60})).unwrap();
        ctx.done();
        let output = action.run(ctx, "wait".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Stopped);
    }

    #[test]
    fn test_fractional_seconds() {
        let action = DelayAction::create(json!({"seconds": 1.5})).unwrap();
        assert_eq!(action.duration(), Ok(Duration::from_millis(1500)));
    }

    #[tokio::test]
    async fn test_oversized_delay_fails() {
        let action = DelayAction::create(json!({"seconds": 1e30})).unwrap();
        let output = action.run(Context::for_test(Vars::new()), "wait".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Failed);
        assert!(output.error.unwrap().starts_with("invalid delay"));
    }
}
