use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    lead::{LeadSink, LeadSubmission},
    ChatMessage,
};

/// HTTP client for the public chat endpoints, used by the terminal chat.
#[derive(Clone)]
pub struct ChatApiClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ReplyRequest<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ReplyResponse {
    reply: String,
}

impl ChatApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn reply(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/api/inteli-chat", self.base_url))
            .json(&ReplyRequest { messages })
            .send()
            .await
            .context("chat request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("chat endpoint returned {status}");
        }

        let body: ReplyResponse = response.json().await?;
        Ok(body.reply)
    }
}

#[async_trait]
impl LeadSink for ChatApiClient {
    async fn submit(&self, submission: &LeadSubmission) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/api/inteli-chat/lead", self.base_url))
            .json(submission)
            .send()
            .await
            .context("lead request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("lead endpoint returned {status}");
        }
        Ok(())
    }
}
