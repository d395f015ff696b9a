use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    AutoflowError, Result,
    common::Vars,
    runtime::Context,
    workflow::{
        actions::{Action, ActionOutput, ActionType},
        step::ActionId,
        template,
    },
};

use super::executor::{JavascriptExecutor, ScriptLanguage};

/// Raises the interrupt flag of a script when the attempt is dropped, which
/// happens on timeout and on stop.
struct InterruptOnDrop(Arc<AtomicBool>);

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Calls the first function declared in `code` with the resolved
/// `variables` object. An object result becomes the outputs; any other
/// value is exposed as `result`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunScriptAction {
    code: String,
    #[serde(default)]
    language: ScriptLanguage,
    #[serde(default)]
    variables: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
#[typetag::serde]
impl Action for RunScriptAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        let action = serde_json::from_value::<Self>(params)?;
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["code"],
            "properties": {
                "code": {
                    "type": "string",
                    "minLength": 1,
                    "description": "JavaScript source declaring a function that takes one object argument"
                },
                "language": { "type": "string", "enum": ["javascript"] },
                "variables": {
                    "type": "object",
                    "description": "Argument object, string values support {placeholders}"
                }
            }
        })
    }

    fn action_type(&self) -> ActionType {
        ActionType::RunScript
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        aid: ActionId,
    ) -> Result<ActionOutput> {
        let params = template::resolve_json_value(&ctx.data(), &serde_json::Value::Object(self.variables.clone()));
        let code = self.code.clone();
        let language = self.language;
        let interrupt = Arc::new(AtomicBool::new(false));
        let _guard = InterruptOnDrop(interrupt.clone());

        let result = tokio::task::spawn_blocking(move || match language {
            ScriptLanguage::Javascript => JavascriptExecutor::execute(&code, &params, interrupt),
        })
        .await
        .map_err(|err| AutoflowError::Script(format!("script task failed: {}", err)))?;

        let result = match result {
            Ok(result) => result,
            Err(err @ AutoflowError::Exception { .. }) => return Ok(ActionOutput::exception(err.to_string())),
            Err(err) => return Err(err),
        };

        for line in result.logs {
            ctx.emit_log(&aid, line);
        }
        let outputs = match result.value {
            serde_json::Value::Object(map) => Vars::from(map),
            other => Vars::new().with("result", other),
        };
        Ok(ActionOutput::success(outputs))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::workflow::actions::ActionStatus;

    #[tokio::test]
    async fn test_outputs_from_returned_object() {
        let ctx = Context::for_test(Vars::new().with("lead", json!({"score": 40})));
        let action = RunScriptAction::create(json!({
            "code": "function score({points}) { return { points: points + 10, hot: points > 30 }; }",
            "variables": {"points": "{lead.score}"}
        }))
        .unwrap();

        let output = action.run(ctx, "score".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Succeeded);
        assert_eq!(output.outputs.get::<i64>("points"), Some(50));
        assert_eq!(output.outputs.get::<bool>("hot"), Some(true));
    }

    #[tokio::test]
    async fn test_scalar_result() {
        let ctx = Context::for_test(Vars::new());
        let action = RunScriptAction::create(json!({"code": "function main() { return 'ok'; }"})).unwrap();
        let output = action.run(ctx, "s".to_string()).await.unwrap();
        assert_eq!(output.outputs.get::<String>("result"), Some("ok".to_string()));
    }

    #[tokio::test]
    async fn test_throw_is_exception() {
        let ctx = Context::for_test(Vars::new());
        let action = RunScriptAction::create(json!({"code": "function main() { throw new Error('nope'); }"})).unwrap();
        let output = action.run(ctx, "s".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Exception);
        assert!(output.error.unwrap().contains("nope"));
    }

    #[test]
    fn test_timeout_interrupts_looping_script() {
        let rt = tokio::runtime::Builder::new_multi_thread().worker_threads(1).max_blocking_threads(1).enable_all().build().unwrap();
        rt.block_on(async {
            let ctx = Context::for_test(Vars::new());
            let looping = RunScriptAction::create(json!({"code": "function main() { while (true) {} }"})).unwrap();
            let timed_out = tokio::time::timeout(Duration::from_millis(300), looping.run(ctx.clone(), "spin".to_string())).await;
            assert!(timed_out.is_err());

            // the only blocking thread must be free again for the next script
            let quick = RunScriptAction::create(json!({"code": "function main() { return 1; }"})).unwrap();
            let output = tokio::time::timeout(Duration::from_secs(5), quick.run(ctx, "quick".to_string())).await.unwrap().unwrap();
            assert_eq!(output.status, ActionStatus::Succeeded);
        });
    }

    #[test]
    fn test_python_is_not_accepted() {
        assert!(RunScriptAction::create(json!({"code": "def main(): pass", "language": "python3"})).is_err());
    }
}
