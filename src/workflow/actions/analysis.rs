use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    runtime::Context,
    services::AnalysisRequest,
    workflow::{
        actions::{Action, ActionOutput, ActionType},
        step::ActionId,
        template,
    },
};

/// Hands data to the configured [`crate::Analyzer`]; fails without one.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AiAnalysisAction {
    analysis_type: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    prompt: Option<String>,
}

#[async_trait]
#[typetag::serde]
impl Action for AiAnalysisAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        let action = serde_json::from_value::<Self>(params)?;
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["analysis_type"],
            "properties": {
                "analysis_type": { "type": "string", "minLength": 1 },
                "data": {},
                "prompt": { "type": ["string", "null"] }
            }
        })
    }

    fn action_type(&self) -> ActionType {
        ActionType::AiAnalysis
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _aid: ActionId,
    ) -> Result<ActionOutput> {
        let Some(analyzer) = ctx.services().analyzer.clone() else {
            return Ok(ActionOutput::failed("no analyzer configured"));
        };

        let vars = ctx.data();
        let request = AnalysisRequest {
            analysis_type: self.analysis_type.clone(),
            data: template::resolve_json_value(&vars, &self.data),
            prompt: self.prompt.as_ref().map(|p| template::resolve_template(&vars, p)),
        };

        match analyzer.analyze(&request).await {
            Ok(mut outputs) => {
                outputs.entry("analysis_type").or_insert_with(|| self.analysis_type.clone().into());
                Ok(ActionOutput::success(outputs))
            }
            Err(err) => Ok(ActionOutput::failed(format!("{} analysis failed: {}", self.analysis_type, err))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        common::Vars,
        services::{Analyzer, Services},
        store::{DbStore, MemStore, Store},
        workflow::actions::ActionStatus,
    };

    struct SentimentAnalyzer;

    #[async_trait]
    impl Analyzer for SentimentAnalyzer {
        async fn analyze(
            &self,
            request: &AnalysisRequest,
        ) -> Result<Vars> {
            let text = request.data["text"].as_str().unwrap_or_default();
            let sentiment = if text.contains("love") { "positive" } else { "neutral" };
            Ok(Vars::new().with("sentiment", sentiment).with("prompt", request.prompt.clone()))
        }
    }

    fn context_with(analyzer: Option<Arc<dyn Analyzer>>) -> Arc<Context> {
        let store = Arc::new(Store::new());
        MemStore::new().init(&store).unwrap();
        let mut services = Services::new(store);
        services.analyzer = analyzer;
        Context::for_test_with(Vars::new().with("review", "I love it"), services)
    }

    #[tokio::test]
    async fn test_fails_without_analyzer() {
        let action = AiAnalysisAction::create(json!({"analysis_type": "sentiment"})).unwrap();
        let output = action.run(context_with(None), "mood".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Failed);
        assert_eq!(output.error.as_deref(), Some("no analyzer configured"));
    }

    #[tokio::test]
    async fn test_resolved_data_reaches_analyzer() {
        let action = AiAnalysisAction::create(json!({
            "analysis_type": "sentiment",
            "data": {"text": "{review}"},
            "prompt": "Rate: {review}"
        }))
        .unwrap();

        let output = action.run(context_with(Some(Arc::new(SentimentAnalyzer))), "mood".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Succeeded);
        assert_eq!(output.outputs.get::<String>("sentiment"), Some("positive".to_string()));
        assert_eq!(output.outputs.get::<String>("prompt"), Some("Rate: I love it".to_string()));
        assert_eq!(output.outputs.get::<String>("analysis_type"), Some("sentiment".to_string()));
    }
}
