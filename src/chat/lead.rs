use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{prompt, render_transcript, Attribution, ChatMessage};
use crate::{
    llm::{CompletionRequest, PromptMessage, PromptRole},
    mail::templates::{self, LeadEmail},
    models::NewLead,
    schema::leads,
    state::AppState,
};

const SUMMARY_TEMPERATURE: f32 = 0.2;
const MISSING_SUMMARY: &str = "No summary.";

/// A finished conversation handed over for lead capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSubmission {
    pub messages: Vec<ChatMessage>,
    #[serde(default, rename = "utm", skip_serializing_if = "Attribution::is_empty")]
    pub attribution: Attribution,
}

/// Destination for leads produced by a chat session.
#[async_trait]
pub trait LeadSink: Send + Sync {
    async fn submit(&self, submission: &LeadSubmission) -> Result<()>;
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadSummary {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub client_data: ClientData,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub need: Option<String>,
}

impl ClientData {
    fn normalized(self) -> Self {
        Self {
            name: non_blank(self.name),
            company: non_blank(self.company),
            email: non_blank(self.email),
            phone: non_blank(self.phone),
            need: non_blank(self.need),
        }
    }

    fn render(&self) -> String {
        let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        format!(
            "Name: {}\nCompany: {}\nEmail: {}\nPhone: {}\nNeed: {}",
            field(&self.name),
            field(&self.company),
            field(&self.email),
            field(&self.phone),
            field(&self.need)
        )
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "...")
}

/// Interprets the summarization reply. Anything that is not the expected JSON
/// object is kept verbatim as the summary.
pub fn parse_summary(raw: &str) -> LeadSummary {
    let trimmed = strip_code_fence(raw.trim());
    let parsed = match serde_json::from_str::<LeadSummary>(trimmed) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(error = %err, "lead summary is not valid JSON, keeping raw text");
            LeadSummary {
                summary: Some(raw.trim().to_string()),
                ..LeadSummary::default()
            }
        }
    };

    LeadSummary {
        summary: non_blank(parsed.summary).or_else(|| Some(MISSING_SUMMARY.to_string())),
        client_data: parsed.client_data.normalized(),
        next_steps: parsed
            .next_steps
            .into_iter()
            .map(|step| step.trim().to_string())
            .filter(|step| !step.is_empty())
            .collect(),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    raw.strip_prefix("```json")
        .or_else(|| raw.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(raw)
}

/// Server-side lead capture: summarize, persist, relay by email.
#[derive(Clone)]
pub struct LeadPipeline {
    state: AppState,
}

pub struct CapturedLead {
    pub lead_id: Option<Uuid>,
    pub summary: LeadSummary,
}

impl LeadPipeline {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Only the summarization call can fail the capture; persistence and the
    /// notification email are logged and skipped on error.
    pub async fn capture(&self, submission: &LeadSubmission) -> Result<CapturedLead> {
        let transcript = render_transcript(&submission.messages);
        let attribution = submission.attribution.sanitized();
        let campaign = if attribution.is_empty() {
            "-".to_string()
        } else {
            attribution
                .pairs()
                .into_iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let raw = self
            .state
            .llm
            .complete(CompletionRequest {
                model: self.state.config.summary_model.clone(),
                messages: vec![
                    PromptMessage::new(PromptRole::System, prompt::SUMMARY_SYSTEM_PROMPT),
                    PromptMessage::new(
                        PromptRole::User,
                        prompt::summary_prompt(&transcript, &campaign),
                    ),
                ],
                temperature: Some(SUMMARY_TEMPERATURE),
            })
            .await?;

        let summary = parse_summary(&raw);
        let summary_text = summary
            .summary
            .clone()
            .unwrap_or_else(|| MISSING_SUMMARY.to_string());

        let lead_id = match self.persist(&summary, &summary_text, &transcript, &attribution) {
            Ok(id) => {
                info!(lead_id = %id, has_email = summary.client_data.email.is_some(), "lead stored");
                Some(id)
            }
            Err(err) => {
                error!(error = %err, "failed to store lead");
                None
            }
        };

        if let Some(recipient) = &self.state.config.lead_email_to {
            let email = templates::lead_notification(
                recipient,
                &LeadEmail {
                    summary: &summary_text,
                    client_block: &summary.client_data.render(),
                    next_steps: &summary.next_steps,
                    attribution: &attribution.pairs(),
                    transcript: &transcript,
                },
            );
            if let Err(err) = self.state.mailer.send(email).await {
                error!(error = %err, "failed to relay lead by email");
            }
        }

        Ok(CapturedLead { lead_id, summary })
    }

    fn persist(
        &self,
        summary: &LeadSummary,
        summary_text: &str,
        transcript: &str,
        attribution: &Attribution,
    ) -> Result<Uuid> {
        let mut conn = self.state.db()?;
        let client = &summary.client_data;
        let new_lead = NewLead {
            id: Uuid::new_v4(),
            name: client.name.clone(),
            company: client.company.clone(),
            email: client.email.clone(),
            phone: client.phone.clone(),
            need: client.need.clone(),
            summary: summary_text.to_string(),
            transcript: transcript.to_string(),
            attribution: attribution.to_json(),
        };
        diesel::insert_into(leads::table)
            .values(&new_lead)
            .execute(&mut conn)?;
        Ok(new_lead.id)
    }
}

#[async_trait]
impl LeadSink for LeadPipeline {
    async fn submit(&self, submission: &LeadSubmission) -> Result<()> {
        self.capture(submission).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structured_summary() {
        let summary = parse_summary(
            r#"{"summary":"Wants OCR for invoices.","client_data":{"name":"Jan","company":"Acme","email":"jan@acme.pl","phone":"","need":"OCR"},"next_steps":["Call"," "]}"#,
        );
        assert_eq!(summary.summary.as_deref(), Some("Wants OCR for invoices."));
        assert_eq!(summary.client_data.email.as_deref(), Some("jan@acme.pl"));
        assert!(summary.client_data.phone.is_none());
        assert_eq!(summary.next_steps, vec!["Call".to_string()]);
    }

    #[test]
    fn accepts_fenced_json() {
        let summary = parse_summary("```json\n{\"summary\":\"ok\"}\n```");
        assert_eq!(summary.summary.as_deref(), Some("ok"));
    }

    #[test]
    fn keeps_non_json_reply_as_summary() {
        let summary = parse_summary("The client wants a call back.");
        assert_eq!(
            summary.summary.as_deref(),
            Some("The client wants a call back.")
        );
        assert!(summary.client_data.email.is_none());
    }

    #[test]
    fn missing_summary_gets_placeholder() {
        let summary = parse_summary(r#"{"client_data":{"email":"a@b.com"}}"#);
        assert_eq!(summary.summary.as_deref(), Some(MISSING_SUMMARY));
    }

    #[test]
    fn submission_reads_utm_field() {
        let submission: LeadSubmission = serde_json::from_str(
            r#"{"messages":[{"role":"user","text":"a@b.com"}],"utm":{"utm_source":"ads"}}"#,
        )
        .unwrap();
        assert_eq!(
            submission.attribution.pairs(),
            vec![("utm_source".to_string(), "ads".to_string())]
        );
    }
}
