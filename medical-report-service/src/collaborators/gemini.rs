use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use report_flow::{
    AnalysisReport, DocumentExtractor, InputDocument, Language, MediaType, ReportAnalyzer,
    ReportTranslator, WorkflowError,
};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::prompts::{EXTRACTION_PROMPT, analysis_prompt, analysis_schema, translation_prompt};
use crate::config::GeminiConfig;

/// Client for Gemini `generateContent`, serving all three workflow roles.
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Centralized call to the model. With a `schema`, the model is asked for
    /// JSON matching it.
    async fn generate(
        &self,
        parts: Vec<Value>,
        schema: Option<Value>,
    ) -> report_flow::Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(WorkflowError::Configuration)?;

        let mut payload = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": parts
                }
            ]
        });
        if let Some(schema) = schema {
            payload["generationConfig"] = json!({
                "responseMimeType": "application/json",
                "responseSchema": schema
            });
        }

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                WorkflowError::collaborator(format!("Gemini API request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkflowError::collaborator(format!(
                "Gemini API error {}: {}",
                status,
                body.trim()
            )));
        }

        let response_json: Value = response.json().await.map_err(|e| {
            WorkflowError::collaborator(format!("Failed to read Gemini response: {}", e))
        })?;

        response_text(&response_json)
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(response: &Value) -> report_flow::Result<String> {
    let Some(parts) = response["candidates"][0]["content"]["parts"].as_array() else {
        let reason = response["promptFeedback"]["blockReason"]
            .as_str()
            .unwrap_or("no candidates returned");
        return Err(WorkflowError::collaborator(format!(
            "The AI did not return a response ({}).",
            reason
        )));
    };

    Ok(parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join(""))
}

/// Remove a surrounding markdown code fence, if the model added one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

fn parse_report(raw: &str, context: &'static str) -> report_flow::Result<AnalysisReport> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|e| {
        warn!(context, error = %e, response = raw, "Failed to parse Gemini response");
        WorkflowError::malformed(context, e.to_string())
    })
}

#[async_trait]
impl DocumentExtractor for GeminiClient {
    async fn extract(&self, document: &InputDocument) -> report_flow::Result<String> {
        match &document.media_type {
            MediaType::PlainText => Ok(document.text_lossy()),
            media @ (MediaType::Pdf | MediaType::Png | MediaType::Jpeg) => {
                info!(
                    file = %document.name,
                    media_type = %media,
                    "Extracting text with Gemini vision"
                );
                let parts = vec![
                    json!({ "text": EXTRACTION_PROMPT }),
                    json!({
                        "inline_data": {
                            "mime_type": media.mime(),
                            "data": STANDARD.encode(&document.bytes)
                        }
                    }),
                ];
                let text = self.generate(parts, None).await?;
                info!(characters = text.len(), "Gemini extraction finished");
                Ok(text)
            }
            MediaType::Other(mime) => Err(WorkflowError::UnsupportedFileType(mime.clone())),
        }
    }
}

#[async_trait]
impl ReportAnalyzer for GeminiClient {
    async fn analyze(&self, text: &str) -> report_flow::Result<AnalysisReport> {
        let parts = vec![json!({ "text": analysis_prompt(text) })];
        let raw = self.generate(parts, Some(analysis_schema())).await?;
        parse_report(&raw, "analysis")
    }
}

#[async_trait]
impl ReportTranslator for GeminiClient {
    async fn translate(
        &self,
        report: &AnalysisReport,
        target: Language,
    ) -> report_flow::Result<AnalysisReport> {
        let report_json = serde_json::to_string_pretty(report)
            .map_err(|e| WorkflowError::collaborator(format!("Failed to encode report: {}", e)))?;
        let parts = vec![json!({ "text": translation_prompt(&report_json, target) })];
        let raw = self.generate(parts, Some(analysis_schema())).await?;
        parse_report(&raw, "translation")
    }
}
