use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
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

use super::models::*;

const STATUS_CODE_KEY: &str = "status_code";
const BODY_KEY: &str = "body";
const HEADERS_KEY: &str = "headers";
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HttpRequestAction {
    url: String,
    #[serde(default)]
    method: HttpRequestMethod,
    #[serde(default)]
    auth: Authorization,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    params: HashMap<String, String>,
    #[serde(default)]
    content_type: ContentType,
    #[serde(default)]
    body: Option<serde_json::Value>,
    /// request timeout in milliseconds, bounded by the action timeout anyway
    #[serde(default)]
    timeout_ms: Option<u64>,
}

impl HttpRequestAction {
    fn apply_auth_headers(
        &self,
        data: &Vars,
        headers: &mut HeaderMap,
    ) -> Result<()> {
        let (name, value) = match &self.auth {
            Authorization::None => return Ok(()),
            Authorization::Bearer {
                token,
            } => ("Authorization", format!("Bearer {}", template::resolve_template(data, token))),
            Authorization::Basic {
                username,
                password,
            } => {
                let credentials = format!("{}:{}", template::resolve_template(data, username), template::resolve_template(data, password));
                ("Authorization", format!("Basic {}", STANDARD.encode(credentials.as_bytes())))
            }
            Authorization::ApiKey {
                key,
                header,
            } => (header.as_deref().unwrap_or("Authorization"), template::resolve_template(data, key)),
        };

        let header_key: HeaderName = name.parse().map_err(|err: reqwest::header::InvalidHeaderName| AutoflowError::Action(err.to_string()))?;
        headers.insert(header_key, value.parse().map_err(|err: InvalidHeaderValue| AutoflowError::Action(err.to_string()))?);
        Ok(())
    }

    fn build_request(
        &self,
        ctx: &Context,
    ) -> Result<reqwest::RequestBuilder> {
        let data = ctx.data();
        let resolved_url = template::resolve_template(&data, &self.url);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("accept"), HeaderValue::from_static("*/*"));
        self.apply_auth_headers(&data, &mut headers)?;

        for (key, value) in &self.headers {
            let resolved_value = template::resolve_template(&data, value);
            headers.insert(
                key.parse::<HeaderName>().map_err(|err| AutoflowError::Action(err.to_string()))?,
                resolved_value.parse().map_err(|err: InvalidHeaderValue| AutoflowError::Action(err.to_string()))?,
            );
        }

        let query = self.params.iter().map(|(key, value)| (key.clone(), template::resolve_template(&data, value))).collect::<Vec<_>>();

        let method = self.method.as_ref().parse::<reqwest::Method>().map_err(|_| AutoflowError::Action(format!("invalid method '{:?}'", self.method)))?;
        let mut request = ctx.services().http.request(method, &resolved_url).headers(headers).query(&query);

        if let Some(body) = &self.body {
            let resolved = template::resolve_json_value(&data, body);
            request = match self.content_type {
                ContentType::Json => request.json(&resolved),
                ContentType::Text => match resolved {
                    serde_json::Value::String(text) => request.body(text),
                    other => request.body(other.to_string()),
                },
                ContentType::UrlEncoded => {
                    let form = resolved.as_object().ok_or(AutoflowError::Action("urlencoded body must be an object".to_string()))?;
                    let pairs = form
                        .iter()
                        .map(|(k, v)| {
                            let v = match v {
                                serde_json::Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            (k.clone(), v)
                        })
                        .collect::<Vec<_>>();
                    request.form(&pairs)
                }
            };
        }

        if let Some(ms) = self.timeout_ms {
            request = request.timeout(Duration::from_millis(ms));
        }

        Ok(request)
    }
}

#[async_trait]
#[typetag::serde]
impl Action for HttpRequestAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        let action = serde_json::from_value::<Self>(params)?;
        Ok(action)
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Request URL, supports {placeholders}"
                },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
                },
                "auth": {
                    "type": "object",
                    "required": ["type"],
                    "properties": {
                        "type": { "type": "string", "enum": ["none", "bearer", "basic", "api_key"] }
                    }
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "params": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "content_type": {
                    "type": "string",
                    "enum": ["json", "text", "url_encoded", "form"]
                },
                "body": {
                    "description": "Request body, string values support {placeholders}"
                },
                "timeout_ms": {
                    "type": ["integer", "null"],
                    "minimum": 0
                }
            }
        })
    }

    fn action_type(&self) -> ActionType {
        ActionType::HttpRequest
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        aid: ActionId,
    ) -> Result<ActionOutput> {
        let request = self.build_request(&ctx)?;
        let res = match request.send().await {
            Ok(res) => res,
            Err(err) => return Ok(ActionOutput::failed(format!("http error: {}", err))),
        };

        let status = res.status();
        let headers_map: HashMap<String, String> = res.headers().iter().map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string())).collect();
        let text = res.text().await.map_err(|err| AutoflowError::Action(err.to_string()))?;
        ctx.emit_log(&aid, format!("{} {} -> {}", self.method.as_ref(), self.url, status.as_u16()));

        if status.is_client_error() || status.is_server_error() {
            let preview: String = text.chars().take(ERROR_BODY_PREVIEW).collect();
            return Ok(ActionOutput::failed(format!("http status {}: {}", status.as_u16(), preview)));
        }

        // json bodies stay addressable as {action.body.field}
        let body = serde_json::from_str::<serde_json::Value>(&text).unwrap_or(serde_json::Value::String(text));
        let outputs = Vars::new().with(STATUS_CODE_KEY, status.as_u16()).with(HEADERS_KEY, serde_json::to_value(headers_map)?).with(BODY_KEY, body);

        Ok(ActionOutput::success(outputs))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::{runtime::Context, workflow::actions::ActionStatus};

    /// Answers a single request with `status` and `body`, returning the raw request.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_get_with_placeholders() {
        let (base, server) = serve_once("200 OK", r#"{"ok": true, "id": 7}"#).await;
        let ctx = Context::for_test(Vars::new().with("base", base).with("lead", json!({"id": "l-1"})));
        let action = HttpRequestAction::create(json!({
            "url": "{base}/leads/{lead.id}",
            "auth": {"type": "bearer", "token": "secret"},
            "params": {"source": "{lead.id}"}
        }))
        .unwrap();

        let output = action.run(ctx, "fetch".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Succeeded);
        assert_eq!(output.outputs.get::<u16>(STATUS_CODE_KEY), Some(200));
        assert_eq!(output.outputs.lookup("body.id"), Some(&json!(7)));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /leads/l-1?source=l-1 "));
        assert!(raw.to_lowercase().contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let (base, server) = serve_once("503 Service Unavailable", r#"{"error": "busy"}"#).await;
        let ctx = Context::for_test(Vars::new());
        let action = HttpRequestAction::create(json!({"url": base, "method": "POST", "body": {"a": 1}})).unwrap();

        let output = action.run(ctx, "post".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Failed);
        assert!(output.error.unwrap().contains("503"));
        assert!(server.await.unwrap().starts_with("POST / "));
    }

    #[tokio::test]
    async fn test_connection_refused_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ctx = Context::for_test(Vars::new());
        let action = HttpRequestAction::create(json!({"url": format!("http://{}", addr)})).unwrap();
        let output = action.run(ctx, "down".to_string()).await.unwrap();
        assert_eq!(output.status, ActionStatus::Failed);
    }

    #[test]
    fn test_schema_rejects_bad_method() {
        assert!(HttpRequestAction::create(json!({"url": "http://x", "method": "FETCH"})).is_err());
    }
}
