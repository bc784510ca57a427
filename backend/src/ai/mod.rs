//! AI Module for header discovery and plan selection
//!
//! Uses the Anthropic Messages API to answer two questions about a client
//! export: where its data table starts, and how that table maps onto the
//! target schema. The answers are plain JSON; everything after that is
//! deterministic.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use orderload::ai::AiClient;
//!
//! let client = AiClient::from_env()?;
//! let header_row = client.find_header_row(&sheet).await?;
//! let plan = client.select_plan(&table, &schema, 20).await?;
//! ```

pub mod prompt;

use serde::Deserialize;
use serde_json::Value;
use std::env;

use crate::api::logs::{log_info, log_warning};
use crate::error::{AiError, AiResult};
use crate::models::{Table, TargetSchema};
use crate::parser::RawSheet;
use crate::transform::plan::PlanDocument;

/// Rows shown to the model when looking for the header.
pub const HEADER_PREVIEW_ROWS: usize = 20;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default number of attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Anthropic API client
#[derive(Clone)]
pub struct AiClient {
    api_key: String,
    model: String,
    max_tokens: u32,
}

/// Anthropic API response structure
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

/// Anthropic API error response
#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl AiClient {
    /// Create a new client with explicit API key
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
        }
    }

    /// Create a client from `ANTHROPIC_API_KEY`, with an optional
    /// `ORDERLOAD_AI_MODEL` override
    pub fn from_env() -> AiResult<Self> {
        let _ = dotenvy::dotenv();

        let api_key = env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AiError::MissingApiKey("ANTHROPIC_API_KEY not set".to_string()))?;

        let client = Self::new(api_key);
        Ok(match env::var("ORDERLOAD_AI_MODEL") {
            Ok(model) if !model.trim().is_empty() => client.with_model(model.trim()),
            _ => client,
        })
    }

    /// Set the model to use
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Find the header row of the main data table.
    ///
    /// `Ok(None)` when the answer carries no usable index.
    pub async fn find_header_row(&self, sheet: &RawSheet) -> AiResult<Option<usize>> {
        log_info("AI is scanning for the main table header...");
        let prompt = prompt::header_prompt(&sheet.preview_text(HEADER_PREVIEW_ROWS));
        let text = self.complete_with_retries(prompt).await?;
        let answer = parse_json_object(&text)?;
        Ok(parse_header_row(&answer))
    }

    /// Ask for a plan mapping `table` onto `schema`.
    pub async fn select_plan(
        &self,
        table: &Table,
        schema: &TargetSchema,
        sample_rows: usize,
    ) -> AiResult<PlanDocument> {
        log_info("AI is analyzing table structure to create a transformation plan...");
        let prompt = prompt::plan_prompt(table, schema, sample_rows);
        let text = self.complete_with_retries(prompt).await?;
        let document = parse_json_object(&text)?;

        let plan = PlanDocument::from_value(&document)
            .map_err(|e| AiError::InvalidResponse(e.to_string()))?;
        log_info(format!(
            "AI generated a '{}' plan",
            plan.discriminator().unwrap_or("unknown")
        ));
        Ok(plan)
    }

    /// Send a prompt, retrying transport and API failures.
    async fn complete_with_retries(&self, prompt: String) -> AiResult<String> {
        let mut last_error = None;

        for attempt in 1..=DEFAULT_MAX_RETRIES {
            match self.call_api(&prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() => {
                    log_warning(format!(
                        "Attempt {}/{} failed: {}",
                        attempt, DEFAULT_MAX_RETRIES, e
                    ));
                    last_error = Some(e);

                    if attempt < DEFAULT_MAX_RETRIES {
                        tokio::time::sleep(tokio::time::Duration::from_millis(RETRY_DELAY_MS)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| AiError::ApiError("Unknown error".to_string())))
    }

    /// Call Anthropic API
    async fn call_api(&self, content: &str) -> AiResult<String> {
        let client = reqwest::Client::new();

        let request_body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0,
            "system": prompt::system_prompt(),
            "messages": prompt::build_messages(content.to_string())
        });

        let response = client
            .post(API_URL)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<AnthropicError>(&body) {
                return Err(AiError::ApiError(error.error.message));
            }
            return Err(AiError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        let response: AnthropicResponse =
            serde_json::from_str(&body).map_err(|e| AiError::InvalidResponse(e.to_string()))?;

        let text = response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(AiError::InvalidResponse("Empty response".to_string()));
        }

        Ok(text)
    }
}

/// Parse the JSON object in a model answer.
fn parse_json_object(text: &str) -> AiResult<Value> {
    let json_str = extract_json(text);
    let value: Value = serde_json::from_str(&json_str).map_err(|e| {
        AiError::InvalidResponse(format!(
            "{}. Response was: {}",
            e,
            text.chars().take(500).collect::<String>()
        ))
    })?;

    if value.is_object() {
        Ok(value)
    } else {
        Err(AiError::InvalidResponse("Expected a JSON object".to_string()))
    }
}

/// `header_row_index` when it is a non-negative integer.
fn parse_header_row(answer: &Value) -> Option<usize> {
    answer
        .get("header_row_index")
        .and_then(Value::as_u64)
        .and_then(|index| usize::try_from(index).ok())
}

/// Extract JSON from a response that may contain markdown code blocks
fn extract_json(text: &str) -> String {
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return text[json_start..json_start + end].trim().to_string();
        }
    }

    if let Some(start) = text.find("```") {
        let after_start = start + 3;
        // Skip language identifier if present
        let content_start = text[after_start..]
            .find('\n')
            .map(|i| after_start + i + 1)
            .unwrap_or(after_start);

        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim().to_string();
        }
    }

    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if start < end {
                return text[start..=end].to_string();
            }
        }
    }

    text.to_string()
}
