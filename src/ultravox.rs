use crate::ports::{ProviderFuture, VoiceSession, VoiceSessionApi};
use crate::ultravox_types::{CallConfig, CreateCallResponse};
use crate::utils::send_json;

use tracing::{debug, info};

pub const ULTRAVOX_API_URL: &str = "https://api.ultravox.ai/api/calls";
const SERVICE: &str = "ultravox";

pub struct UltravoxClient {
    http_client: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl UltravoxClient {
    pub fn new(http_client: reqwest::Client, api_key: String) -> Self {
        Self {
            http_client,
            api_key,
            api_url: ULTRAVOX_API_URL.to_string(),
        }
    }
}

impl VoiceSessionApi for UltravoxClient {
    fn create_session(&self, config: CallConfig) -> ProviderFuture<'_, VoiceSession> {
        Box::pin(async move {
            debug!(prompt_len = config.system_prompt.len(), "creating ultravox call");
            let rq = self
                .http_client
                .post(&self.api_url)
                .header("X-API-KEY", &self.api_key)
                .json(&config);
            let created: CreateCallResponse = send_json(SERVICE, rq).await?;
            info!(join_url = %created.join_url, call_id = ?created.call_id, "ultravox call created");
            Ok(VoiceSession {
                join_url: created.join_url,
            })
        })
    }
}
