use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use super::Translator;
use crate::config::TranslatorConfig;

const DEFAULT_ENDPOINT: &str = "https://api-free.deepl.com/v2/translate";

/// DeepL REST API. Used for captions by default.
pub struct DeepLTranslator {
    endpoint: String,
    auth_key: Option<String>,
    source_lang: String,
    target_lang: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
}

impl DeepLTranslator {
    pub fn new(config: &TranslatorConfig) -> Self {
        Self {
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            auth_key: config.api_key.clone(),
            source_lang: config.source_lang.to_uppercase(),
            target_lang: config.target_lang.to_uppercase(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build(),
        }
    }
}

impl Translator for DeepLTranslator {
    fn translate(&self, text: &str) -> Result<String> {
        let mut req = self.agent.post(&self.endpoint);
        if let Some(ref key) = self.auth_key {
            req = req.set("Authorization", &format!("DeepL-Auth-Key {}", key));
        }

        let response: DeepLResponse = req
            .send_form(&[
                ("text", text),
                ("source_lang", self.source_lang.as_str()),
                ("target_lang", self.target_lang.as_str()),
            ])
            .map_err(|e| anyhow!("DeepL request failed: {}", e))?
            .into_json()
            .context("Failed to parse DeepL response")?;

        response
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| anyhow!("No translation in DeepL response"))
    }

    fn provider_name(&self) -> &'static str {
        "DeepL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranslatorProviderType;
    use crate::test_support::serve_once;

    fn translator(endpoint: &str) -> DeepLTranslator {
        DeepLTranslator::new(&TranslatorConfig {
            provider: TranslatorProviderType::DeepL,
            endpoint: Some(endpoint.to_string()),
            api_key: Some("deepl-key".to_string()),
            ..TranslatorConfig::default()
        })
    }

    #[test]
    fn test_translate_sends_form_and_parses() {
        let server = serve_once(
            200,
            r#"{"translations":[{"detected_source_language":"EN","text":"잔디 위의 개"}]}"#,
        );

        let translated = translator(&format!("{}/v2/translate", server.url))
            .translate("a dog on grass")
            .unwrap();
        assert_eq!(translated, "잔디 위의 개");

        let request = server.request();
        assert!(request.starts_with("POST /v2/translate "));
        assert!(request.contains("DeepL-Auth-Key deepl-key"));
        assert!(
            request.contains("text=a+dog+on+grass")
                || request.contains("text=a%20dog%20on%20grass")
        );
        assert!(request.contains("target_lang=KO"));
        assert!(request.contains("source_lang=EN"));
    }

    #[test]
    fn test_empty_translation_list_is_error() {
        let server = serve_once(200, r#"{"translations":[]}"#);
        assert!(translator(&server.url).translate("x").is_err());
    }

    #[test]
    fn test_forbidden_is_error() {
        let server = serve_once(403, r#"{"message":"Forbidden"}"#);
        let err = translator(&server.url).translate("x").unwrap_err();
        assert!(err.to_string().contains("DeepL request failed"));
    }
}
