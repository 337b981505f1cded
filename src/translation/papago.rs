use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use super::Translator;
use crate::config::TranslatorConfig;

const DEFAULT_ENDPOINT: &str = "https://openapi.naver.com/v1/papago/n2mt";

/// Naver Papago NMT. Used for short category labels by default.
pub struct PapagoTranslator {
    endpoint: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    source_lang: String,
    target_lang: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct PapagoResponse {
    message: PapagoMessage,
}

#[derive(Debug, Deserialize)]
struct PapagoMessage {
    result: PapagoResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PapagoResult {
    translated_text: String,
}

impl PapagoTranslator {
    pub fn new(config: &TranslatorConfig) -> Self {
        Self {
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            client_id: config.client_id.clone(),
            client_secret: config.api_key.clone(),
            source_lang: config.source_lang.to_lowercase(),
            target_lang: config.target_lang.to_lowercase(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build(),
        }
    }
}

impl Translator for PapagoTranslator {
    fn translate(&self, text: &str) -> Result<String> {
        let mut req = self.agent.post(&self.endpoint);
        if let Some(ref id) = self.client_id {
            req = req.set("X-Naver-Client-Id", id);
        }
        if let Some(ref secret) = self.client_secret {
            req = req.set("X-Naver-Client-Secret", secret);
        }

        let response: PapagoResponse = req
            .send_form(&[
                ("source", self.source_lang.as_str()),
                ("target", self.target_lang.as_str()),
                ("text", text),
            ])
            .map_err(|e| anyhow!("Papago request failed: {}", e))?
            .into_json()
            .context("Failed to parse Papago response")?;

        Ok(response.message.result.translated_text)
    }

    fn provider_name(&self) -> &'static str {
        "Papago"
    }
}
