use serde::{Deserialize, Serialize};

fn default_retry_count() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionModel {
    pub id: String,
    /// one of the `ActionType` names, e.g. `send_email`
    #[serde(rename = "type")]
    pub uses: String,
    #[serde(default)]
    pub config: serde_json::Value,
    /// extra attempts after the first failure
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// per-attempt limit, `0` disables it
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl ActionModel {
    pub fn new(
        id: &str,
        uses: &str,
        config: serde_json::Value,
    ) -> Self {
        Self {
            id: id.to_string(),
            uses: uses.to_string(),
            config,
            retry_count: default_retry_count(),
            timeout_seconds: default_timeout_seconds(),
        }
    }

    pub fn with_retry_count(
        mut self,
        retry_count: u32,
    ) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_timeout_seconds(
        mut self,
        timeout_seconds: u64,
    ) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}
