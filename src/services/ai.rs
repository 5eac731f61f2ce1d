//! Meeting brief generation
//!
//! Uses a local Ollama model to turn a meeting's title, description and
//! attendee list into a structured preparation brief.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::models::ChecklistItem;

/// Confidence reported for a successfully parsed model response
const BASE_CONFIDENCE: u8 = 85;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Context service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

/// Input to a brief generation call
#[derive(Debug, Clone)]
pub struct MeetingBriefRequest {
    pub title: String,
    pub description: String,
    pub attendee_emails: Vec<String>,
    pub start_time: DateTime<Utc>,
}

/// Structured brief returned by the generator
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContext {
    pub brief: String,
    pub meeting_type: String,
    pub key_topics: Vec<String>,
    pub checklist: Vec<ChecklistItem>,
    pub attendee_context: HashMap<String, String>,
    /// 0-100
    pub confidence: u8,
    /// Model tag recorded on the stored context
    pub model: String,
}

/// Opaque AI collaborator: prompt in, structured brief out
#[async_trait]
pub trait ContextGenerator: Send + Sync {
    async fn generate_context(
        &self,
        request: &MeetingBriefRequest,
    ) -> Result<GeneratedContext, GenerationError>;
}

/// Ollama generate response
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Checklist entries arrive either as plain strings or as `{task, done}` objects
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawChecklistItem {
    Text(String),
    Item(ChecklistItem),
}

#[derive(Debug, Default, Deserialize)]
struct RawBrief {
    #[serde(default, alias = "brief")]
    ai_brief: String,
    #[serde(default)]
    meeting_type: Option<String>,
    #[serde(default, alias = "topics")]
    key_topics: Vec<String>,
    #[serde(default, alias = "checklist")]
    preparation_checklist: Vec<RawChecklistItem>,
    #[serde(default, alias = "attendee_context")]
    attendee_roles: HashMap<String, String>,
}

/// Ollama-backed generator
pub struct OllamaContextGenerator {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaContextGenerator {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }

    fn build_prompt(request: &MeetingBriefRequest) -> String {
        let attendees = if request.attendee_emails.is_empty() {
            "No attendees listed".to_string()
        } else {
            request.attendee_emails.join(", ")
        };
        let description = if request.description.trim().is_empty() {
            "No description provided"
        } else {
            request.description.as_str()
        };

        format!(
            "You help professionals prepare for meetings. Analyze this meeting.\n\n\
             Meeting Details:\n\
             - Title: {}\n\
             - Description: {}\n\
             - Start Time: {}\n\
             - Attendees: {}\n\n\
             Respond ONLY with JSON in this shape:\n\
             {{\"meeting_type\": \"one_on_one|team_sync|client_call|brainstorm|review|planning|general\", \
             \"ai_brief\": \"2-3 sentence summary\", \
             \"key_topics\": [\"topic\"], \
             \"preparation_checklist\": [\"action\"], \
             \"attendee_roles\": {{\"email\": \"likely role\"}}}}",
            request.title,
            description,
            request.start_time.format("%Y-%m-%d %H:%M"),
            attendees
        )
    }

    /// Extract the JSON object from a model response that may carry extra prose
    pub fn parse_response(&self, raw: &str) -> Result<GeneratedContext, GenerationError> {
        let start = raw.find('{');
        let end = raw.rfind('}');
        let json = match (start, end) {
            (Some(s), Some(e)) if e > s => &raw[s..=e],
            _ => return Err(GenerationError::InvalidResponse("no JSON object found".into())),
        };

        let parsed: RawBrief = serde_json::from_str(json)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        if parsed.ai_brief.trim().is_empty() {
            return Err(GenerationError::InvalidResponse("empty brief".into()));
        }

        let checklist = parsed
            .preparation_checklist
            .into_iter()
            .map(|item| match item {
                RawChecklistItem::Text(task) => ChecklistItem::new(&task),
                RawChecklistItem::Item(item) => item,
            })
            .collect();

        Ok(GeneratedContext {
            brief: parsed.ai_brief.trim().to_string(),
            meeting_type: parsed
                .meeting_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "general".to_string()),
            key_topics: parsed.key_topics,
            checklist,
            attendee_context: parsed.attendee_roles,
            confidence: BASE_CONFIDENCE,
            model: self.model.clone(),
        })
    }
}

#[async_trait]
impl ContextGenerator for OllamaContextGenerator {
    async fn generate_context(
        &self,
        request: &MeetingBriefRequest,
    ) -> Result<GeneratedContext, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": Self::build_prompt(request),
                "stream": false,
                "options": {
                    "temperature": 0.7,
                    "top_p": 0.9,
                }
            }))
            .send()
            .await
            .map_err(|e| GenerationError::ServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::ServiceUnavailable(format!("Ollama error {}: {}", status, body)));
        }

        let result: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        debug!("Generated brief for '{}' ({} chars)", request.title, result.response.len());
        self.parse_response(&result.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> OllamaContextGenerator {
        OllamaContextGenerator::new("http://localhost:11434/", "mistral:latest", Duration::from_secs(1))
    }

    #[test]
    fn test_parse_response_with_surrounding_prose() {
        let raw = r#"Sure! Here it is:
        {"meeting_type": "review", "ai_brief": "Quarterly review of the budget.",
         "key_topics": ["budget", "hiring"],
         "preparation_checklist": ["Read Q3 report", {"task": "Draft asks", "done": true}],
         "attendee_roles": {"cfo@example.com": "Finance lead"}}
        Let me know if you need more."#;

        let ctx = generator().parse_response(raw).unwrap();
        assert_eq!(ctx.meeting_type, "review");
        assert_eq!(ctx.key_topics, vec!["budget", "hiring"]);
        assert_eq!(ctx.checklist[0], ChecklistItem::new("Read Q3 report"));
        assert!(ctx.checklist[1].done);
        assert_eq!(ctx.attendee_context["cfo@example.com"], "Finance lead");
        assert_eq!(ctx.confidence, BASE_CONFIDENCE);
        assert_eq!(ctx.model, "mistral:latest");
    }

    #[test]
    fn test_parse_response_accepts_short_keys() {
        let raw = r#"{"brief": "Kickoff.", "topics": ["scope"], "checklist": ["agenda"]}"#;
        let ctx = generator().parse_response(raw).unwrap();
        assert_eq!(ctx.brief, "Kickoff.");
        assert_eq!(ctx.meeting_type, "general");
        assert_eq!(ctx.key_topics, vec!["scope"]);
    }

    #[test]
    fn test_parse_response_rejects_garbage() {
        assert!(matches!(
            generator().parse_response("no json here"),
            Err(GenerationError::InvalidResponse(_))
        ));
        assert!(matches!(
            generator().parse_response(r#"{"ai_brief": ""}"#),
            Err(GenerationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_prompt_mentions_meeting_fields() {
        let request = MeetingBriefRequest {
            title: "Design review".into(),
            description: String::new(),
            attendee_emails: vec!["a@example.com".into()],
            start_time: Utc::now(),
        };
        let prompt = OllamaContextGenerator::build_prompt(&request);
        assert!(prompt.contains("Design review"));
        assert!(prompt.contains("No description provided"));
        assert!(prompt.contains("a@example.com"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let generator = OllamaContextGenerator::new("http://127.0.0.1:9", "m", Duration::from_millis(200));
        let request = MeetingBriefRequest {
            title: "x".into(),
            description: String::new(),
            attendee_emails: vec![],
            start_time: Utc::now(),
        };
        let result = generator.generate_context(&request).await;
        assert!(matches!(result, Err(GenerationError::ServiceUnavailable(_))));
    }
}
