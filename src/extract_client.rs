// src/extract_client.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::OpenAiSection;

/// Instruction requiring a strict JSON object with the fixed field set.
/// The document text is sent as a separate serde-encoded message, so
/// embedded quotes or newlines can never break the request body.
const EXTRACTION_PROMPT: &str = r#"Analyze this invoice text and return a JSON object with these exact fields:
vendor (string), invoiceNumber (string), amount (number), date (YYYY-MM-DD), category (string).
Rules:
1. Vendor: Standardize to the main brand (e.g., 'Whse 802' -> 'Costco').
2. Category: Choose one: [Groceries, Equipment, Services, Utilities, Other].
3. Return ONLY valid JSON. No markdown fences, no commentary."#;

const SYSTEM_PROMPT: &str = "You are a financial assistant. Return only raw JSON.";

/// Truncate very long documents to stay within context limits.
const MAX_PROMPT_CHARS: usize = 12_000;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// The structured field set the model may return. Every field is
/// optionally present; callers re-check each one instead of assuming
/// shape. A non-numeric amount degrades to `None` rather than failing
/// the whole parse.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedFields {
    pub vendor: Option<String>,
    pub invoice_number: Option<String>,
    #[serde(deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,
    pub date: Option<String>,
    pub category: Option<String>,
}

/// Parse cleaned response content into the structured field set. A hard
/// failure here means the model ignored the JSON mandate entirely.
pub fn parse_fields(raw: &str) -> Result<ExtractedFields, serde_json::Error> {
    serde_json::from_str(raw)
}

fn lenient_amount<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse()
            .ok(),
        _ => None,
    })
}

/// Seam for the outbound structured-extraction call. Returns the cleaned
/// JSON content of the model's reply, or `None` when the call itself did
/// not succeed.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, document_text: &str) -> Option<String>;
}

/// Chat-completions client against an OpenAI-compatible endpoint.
pub struct OpenAiExtractor {
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
    api_key: String,
}

impl OpenAiExtractor {
    pub fn new(section: &OpenAiSection, api_key: String) -> Result<Self, Box<dyn std::error::Error>> {
        // reqwest has no default timeout; without one a stalled call
        // would hang the pipeline indefinitely.
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            base_url: section.base_url.clone(),
            model: section.model.clone(),
            temperature: section.temperature,
            api_key,
        })
    }
}

#[async_trait]
impl FieldExtractor for OpenAiExtractor {
    async fn extract(&self, document_text: &str) -> Option<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "{EXTRACTION_PROMPT}\n\nINVOICE TEXT:\n{}",
                        clip(document_text)
                    ),
                },
            ],
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "Extraction API unreachable");
                return None;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Extraction API error");
            return None;
        }

        let chat_response: ChatResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Extraction API returned a malformed envelope");
                return None;
            }
        };

        let cleaned = chat_response
            .choices
            .first()
            .map(|c| clean_content(&c.message.content))
            .unwrap_or_else(|| "{}".to_string());
        info!(content_len = cleaned.len(), model = %self.model, "Extraction response received");
        Some(cleaned)
    }
}

/// Strip code fences the model may have added despite instructions and
/// isolate the outermost JSON object. Content with no object literal in
/// it degrades to `{}` — present but empty, so the caller merges nothing.
fn clean_content(content: &str) -> String {
    let stripped = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    match extract_json_object(stripped) {
        Some(obj) => obj.to_string(),
        None => "{}".to_string(),
    }
}

/// Find the outermost `{…}` in a string that may carry surrounding prose.
fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&s[start..=end])
}

fn clip(text: &str) -> &str {
    match text.char_indices().nth(MAX_PROMPT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_field_set() {
        let fields = parse_fields(
            r#"{"vendor":"Costco","invoiceNumber":"INV-42","amount":150.25,"date":"2025-06-01","category":"Groceries"}"#,
        )
        .unwrap();
        assert_eq!(fields.vendor.as_deref(), Some("Costco"));
        assert_eq!(fields.invoice_number.as_deref(), Some("INV-42"));
        assert_eq!(fields.amount, Some(150.25));
        assert_eq!(fields.date.as_deref(), Some("2025-06-01"));
        assert_eq!(fields.category.as_deref(), Some("Groceries"));
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let fields = parse_fields(r#"{"vendor":"Acme","amount":12.5}"#).unwrap();
        assert_eq!(fields.vendor.as_deref(), Some("Acme"));
        assert_eq!(fields.amount, Some(12.5));
        assert!(fields.invoice_number.is_none());
        assert!(fields.date.is_none());
        assert!(fields.category.is_none());
    }

    #[test]
    fn test_empty_object_parses_to_nothing() {
        let fields = parse_fields("{}").unwrap();
        assert!(fields.vendor.is_none());
        assert!(fields.amount.is_none());
    }

    #[test]
    fn test_amount_as_numeric_string_is_accepted() {
        let fields = parse_fields(r#"{"amount":"$1,234.50"}"#).unwrap();
        assert_eq!(fields.amount, Some(1234.50));
    }

    #[test]
    fn test_non_numeric_amount_becomes_absent_not_error() {
        let fields = parse_fields(r#"{"vendor":"Acme","amount":"unknown"}"#).unwrap();
        assert_eq!(fields.vendor.as_deref(), Some("Acme"));
        assert!(fields.amount.is_none());
    }

    #[test]
    fn test_malformed_content_is_a_parse_error() {
        assert!(parse_fields("the invoice is from Costco").is_err());
        assert!(parse_fields("").is_err());
    }

    #[test]
    fn test_clean_content_strips_fences() {
        let cleaned = clean_content("```json\n{\"vendor\":\"Pepsi\"}\n```");
        assert_eq!(cleaned, "{\"vendor\":\"Pepsi\"}");
    }

    #[test]
    fn test_clean_content_isolates_object_from_prose() {
        let cleaned = clean_content("Sure! Here you go: {\"vendor\":\"Pepsi\"} Let me know!");
        assert_eq!(cleaned, "{\"vendor\":\"Pepsi\"}");
    }

    #[test]
    fn test_clean_content_without_object_degrades_to_empty() {
        assert_eq!(clean_content("I could not read the document."), "{}");
        assert!(parse_fields(&clean_content("no json here")).unwrap().vendor.is_none());
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        let long = "é".repeat(MAX_PROMPT_CHARS + 100);
        let clipped = clip(&long);
        assert_eq!(clipped.chars().count(), MAX_PROMPT_CHARS);
    }
}
