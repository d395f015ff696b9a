mod action;
mod executor;

pub use action::RunScriptAction;
pub use executor::{JavascriptExecutor, ScriptLanguage, ScriptResult};
