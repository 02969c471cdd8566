use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    chat::{
        lead::{LeadPipeline, LeadSubmission},
        prompt::CONSULTANT_PROMPT,
        ChatMessage,
    },
    error::{AppError, AppResult},
    llm::{CompletionRequest, PromptMessage, PromptRole},
    state::AppState,
    utils::json::ApiJson,
};

const EMPTY_REPLY_APOLOGY: &str =
    "Sorry, I could not come up with an answer. Could you rephrase your question?";

#[derive(Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
pub struct ChatReply {
    pub reply: String,
}

#[derive(Serialize)]
pub struct LeadAccepted {
    pub ok: bool,
}

pub async fn chat_reply(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ChatRequest>,
) -> AppResult<Json<ChatReply>> {
    let mut messages = Vec::with_capacity(payload.messages.len() + 1);
    messages.push(PromptMessage::new(PromptRole::System, CONSULTANT_PROMPT));
    messages.extend(payload.messages.iter().map(ChatMessage::to_prompt));

    let reply = state
        .llm
        .complete(CompletionRequest {
            model: state.config.chat_model.clone(),
            messages,
            temperature: None,
        })
        .await
        .map_err(|err| {
            error!(error = %err, "chat completion failed");
            AppError::internal(err)
        })?;

    let reply = match reply.trim() {
        "" => EMPTY_REPLY_APOLOGY.to_string(),
        text => text.to_string(),
    };

    Ok(Json(ChatReply { reply }))
}

pub async fn capture_lead(
    State(state): State<AppState>,
    ApiJson(submission): ApiJson<LeadSubmission>,
) -> AppResult<Json<LeadAccepted>> {
    if submission.messages.is_empty() {
        return Err(AppError::bad_request("messages must not be empty"));
    }

    let captured = LeadPipeline::new(state)
        .capture(&submission)
        .await
        .map_err(|err| AppError::internal(format!("lead summarization failed: {err:#}")))?;

    info!(
        lead_id = ?captured.lead_id,
        messages = submission.messages.len(),
        "chat lead captured"
    );
    Ok(Json(LeadAccepted { ok: true }))
}
