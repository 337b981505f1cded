//! Client for the remote captioning and classification services.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::config::InferenceConfig;
use crate::error::{AnnotationError, Result};

const ACCEPT: &str = "text/plain;charset=UTF-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceOperation {
    Captioning,
    Classification,
}

impl InferenceOperation {
    /// Path segment of the operation's endpoint.
    pub fn path(&self) -> &'static str {
        match self {
            InferenceOperation::Captioning => "captioning",
            InferenceOperation::Classification => "classification",
        }
    }
}

impl fmt::Display for InferenceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Caption and category inference for an image reachable at a signed URL.
///
/// Every call is a fresh remote request: no retries, no caching.
pub trait InferenceGateway: Send + Sync {
    fn request_caption(&self, signed_url: &str) -> Result<String>;

    /// Raw category labels. Order carries no meaning.
    fn request_categories(&self, signed_url: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct CaptionResponse {
    caption: String,
}

#[derive(Debug, Deserialize)]
struct CategoryResponse {
    categories: Vec<String>,
}

pub struct HttpInferenceGateway {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpInferenceGateway {
    pub fn new(config: &InferenceConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            agent,
        }
    }

    /// POST `body` to the operation's endpoint and return the raw response text.
    fn post(&self, operation: InferenceOperation, body: serde_json::Value) -> Result<String> {
        let fail = |reason: String| AnnotationError::Inference { operation, reason };
        let url = format!("{}/{}", self.endpoint, operation.path());

        tracing::debug!(%operation, url = %url, "Sending inference request");

        let response = self
            .agent
            .post(&url)
            .set("Accept", ACCEPT)
            .send_json(body)
            .map_err(|e| fail(format!("request failed: {}", e)))?;

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(fail(format!("unexpected status {}", status)));
        }

        // The services answer with text/plain, so the JSON is parsed by hand.
        response
            .into_string()
            .map_err(|e| fail(format!("failed to read response: {}", e)))
    }
}

impl InferenceGateway for HttpInferenceGateway {
    fn request_caption(&self, signed_url: &str) -> Result<String> {
        let operation = InferenceOperation::Captioning;
        let text = self.post(operation, serde_json::json!({ "url": signed_url }))?;
        let parsed: CaptionResponse =
            serde_json::from_str(&text).map_err(|e| AnnotationError::Inference {
                operation,
                reason: format!("malformed response: {}", e),
            })?;
        Ok(parsed.caption)
    }

    fn request_categories(&self, signed_url: &str) -> Result<Vec<String>> {
        let operation = InferenceOperation::Classification;
        let text = self.post(operation, serde_json::json!({ "pic_path": signed_url }))?;
        let parsed: CategoryResponse =
            serde_json::from_str(&text).map_err(|e| AnnotationError::Inference {
                operation,
                reason: format!("malformed response: {}", e),
            })?;
        Ok(parsed.categories)
    }
}
