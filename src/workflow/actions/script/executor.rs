use std::sync::{
    Arc, LazyLock,
    atomic::{AtomicBool, Ordering},
};

use regex::Regex;
use rquickjs::{Context as JsContext, Ctx, FromJs, Runtime as JsRuntime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AutoflowError, Result};

/// Heap ceiling for one script run.
const MEMORY_LIMIT: usize = 64 * 1024 * 1024;
const MAX_STACK_SIZE: usize = 1024 * 1024;

static FUNCTION_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"function\s+([a-zA-Z_$][a-zA-Z0-9_$]*)\s*\(").expect("function pattern is valid"));

/// Captures console output so it can be forwarded to the execution log.
const PRELUDE: &str = r#"
var __logs = [];
var console = {
    log: function () {
        __logs.push(Array.prototype.slice.call(arguments).map(function (a) {
            return typeof a === "string" ? a : JSON.stringify(a);
        }).join(" "));
    }
};
console.info = console.log;
console.warn = console.log;
console.error = console.log;
"#;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptLanguage {
    #[default]
    Javascript,
}

/// Return value and console lines of one script run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptResult {
    pub value: Value,
    pub logs: Vec<String>,
}

pub struct JavascriptExecutor;

impl JavascriptExecutor {
    /// Runs the first function declared in `code` with `params` as its only
    /// argument. Blocking; call it off the async workers. The script is
    /// interrupted as soon as `interrupt` is raised.
    pub fn execute(
        code: &str,
        params: &Value,
        interrupt: Arc<AtomicBool>,
    ) -> Result<ScriptResult> {
        let func_name = Self::extract_function_name(code).ok_or_else(|| AutoflowError::Script("no function found in code".to_string()))?;

        let runtime = JsRuntime::new().map_err(|e| AutoflowError::Script(e.to_string()))?;
        runtime.set_memory_limit(MEMORY_LIMIT);
        runtime.set_max_stack_size(MAX_STACK_SIZE);
        runtime.set_interrupt_handler(Some(Box::new(move || interrupt.load(Ordering::SeqCst))));
        let ctx = JsContext::full(&runtime).map_err(|e| AutoflowError::Script(e.to_string()))?;

        ctx.with(|ctx| {
            if let Err(err) = ctx.eval::<(), _>(PRELUDE) {
                return Err(AutoflowError::Script(err.to_string()));
            }
            if let Err(err) = ctx.eval::<(), _>(code) {
                return Err(Self::exception(&ctx, err, "JS_EVAL_ERROR"));
            }

            let call_code = format!("JSON.stringify({{ value: {}({}), logs: __logs }})", func_name, serde_json::to_string(params)?);
            let json_str = ctx.eval::<String, _>(call_code).map_err(|err| Self::exception(&ctx, err, "JS_EXEC_ERROR"))?;

            let mut result: serde_json::Map<String, Value> = serde_json::from_str(&json_str)?;
            let logs = match result.remove("logs") {
                Some(Value::Array(lines)) => lines.into_iter().filter_map(|l| l.as_str().map(str::to_string)).collect(),
                _ => Vec::new(),
            };
            Ok(ScriptResult {
                value: result.remove("value").unwrap_or(Value::Null),
                logs,
            })
        })
    }

    fn exception(
        ctx: &Ctx<'_>,
        err: rquickjs::Error,
        ecode: &str,
    ) -> AutoflowError {
        if !matches!(err, rquickjs::Error::Exception) {
            return AutoflowError::Script(err.to_string());
        }
        let message = rquickjs::Exception::from_js(ctx, ctx.catch()).ok().and_then(|e| e.message()).unwrap_or_else(|| "uncaught exception".to_string());
        AutoflowError::Exception {
            ecode: ecode.to_string(),
            message,
        }
    }

    fn extract_function_name(code: &str) -> Option<String> {
        FUNCTION_NAME.captures(code).map(|caps| caps[1].to_string())
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::Duration,
    };

    use serde_json::{Value, json};

    use super::{JavascriptExecutor, ScriptResult};
    use crate::{AutoflowError, Result};

    fn execute(
        code: &str,
        params: &Value,
    ) -> Result<ScriptResult> {
        JavascriptExecutor::execute(code, params, Arc::default())
    }

    #[test]
    fn test_extract_function_name() {
        assert_eq!(JavascriptExecutor::extract_function_name("function main() {}"), Some("main".to_string()));
        assert_eq!(JavascriptExecutor::extract_function_name("  function  score_lead ({a}) {}"), Some("score_lead".to_string()));
        assert_eq!(JavascriptExecutor::extract_function_name("const x = 1;"), None);
    }

    #[test]
    fn test_execute_with_params() {
        let code = r#"
        function main({arg1, arg2}) {
            return { result: arg1 + arg2 };
        }
        "#;
        let result = execute(code, &json!({"arg1": 10, "arg2": 20})).unwrap();
        assert_eq!(result.value, json!({"result": 30}));
        assert!(result.logs.is_empty());
    }

    #[test]
    fn test_console_is_captured() {
        let code = r#"
        function main({value}) {
            console.log("value:", value);
            return { doubled: value * 2 };
        }
        "#;
        let result = execute(code, &json!({"value": 5})).unwrap();
        assert_eq!(result.value, json!({"doubled": 10}));
        assert_eq!(result.logs, vec!["value: 5".to_string()]);
    }

    #[test]
    fn test_thrown_error_is_exception() {
        let code = r#"function main() { throw new Error("bad lead"); }"#;
        let err = execute(code, &json!({})).unwrap_err();
        assert_eq!(
            err,
            AutoflowError::Exception {
                ecode: "JS_EXEC_ERROR".to_string(),
                message: "bad lead".to_string()
            }
        );
    }

    #[test]
    fn test_syntax_error_is_exception() {
        let err = execute("function main( {", &json!({})).unwrap_err();
        assert!(matches!(err, AutoflowError::Exception { ref ecode, .. } if ecode == "JS_EVAL_ERROR"));
    }

    #[test]
    fn test_undefined_return_is_null() {
        let result = execute("function main() {}", &json!({})).unwrap();
        assert_eq!(result.value, serde_json::Value::Null);
    }

    #[test]
    fn test_interrupt_ends_endless_loop() {
        let interrupt = Arc::new(AtomicBool::new(false));
        let flag = interrupt.clone();
        let worker = thread::spawn(move || JavascriptExecutor::execute("function main() { while (true) {} }", &json!({}), flag));

        thread::sleep(Duration::from_millis(100));
        interrupt.store(true, Ordering::SeqCst);
        assert!(worker.join().unwrap().is_err());
    }
}
