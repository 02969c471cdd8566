//! Website chat: conversation types, the consultant prompt relay and the lead
//! capture pipeline that turns a finished conversation into a sales lead.

pub mod client;
pub mod lead;
pub mod prompt;
pub mod session;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::llm::{PromptMessage, PromptRole};

/// Campaign parameters recognised in the landing URL.
pub const ATTRIBUTION_KEYS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
];

const MAX_ATTRIBUTION_VALUE_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }

    pub fn to_prompt(&self) -> PromptMessage {
        let role = match self.role {
            ChatRole::User => PromptRole::User,
            ChatRole::Assistant => PromptRole::Assistant,
        };
        PromptMessage::new(role, self.text.clone())
    }
}

/// Campaign attribution captured when the chat widget was opened. Only the
/// known `utm_*` keys survive, values are trimmed and capped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attribution(BTreeMap<String, String>);

impl Attribution {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let map = pairs
            .into_iter()
            .filter_map(|(key, value)| {
                let key = key.as_ref();
                let value = value.as_ref().trim();
                (ATTRIBUTION_KEYS.contains(&key) && !value.is_empty()).then(|| {
                    (
                        key.to_string(),
                        value.chars().take(MAX_ATTRIBUTION_VALUE_CHARS).collect(),
                    )
                })
            })
            .collect();
        Self(map)
    }

    /// Reads `utm_*` parameters from a landing page URL.
    pub fn from_url(url: &url::Url) -> Self {
        Self::from_pairs(url.query_pairs())
    }

    pub fn sanitized(&self) -> Self {
        Self::from_pairs(self.0.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// Plain-text transcript, one paragraph per message.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|message| {
            let speaker = match message.role {
                ChatRole::User => "Client",
                ChatRole::Assistant => "Bot",
            };
            format!("{speaker}: {}", message.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
