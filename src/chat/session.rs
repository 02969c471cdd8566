use tracing::{debug, warn};

use super::{
    lead::{LeadSink, LeadSubmission},
    Attribution, ChatMessage, ChatRole,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    Pl,
    En,
}

impl Lang {
    pub fn welcome(self) -> &'static str {
        match self {
            Lang::Pl => "Cześć! Jestem wirtualnym asystentem. W czym mogę Ci pomóc w kwestii automatyzacji?",
            Lang::En => "Hello! I am the virtual assistant. How can I help you with automation?",
        }
    }

    pub fn lead_confirmation(self) -> &'static str {
        match self {
            Lang::Pl => "Przekazałem transkrypt tej rozmowy do zespołu. Ktoś odezwie się do Ciebie w sprawie dalszych kroków.",
            Lang::En => "I have sent this conversation to the team. Someone will reach out to you regarding next steps.",
        }
    }

    pub fn connection_error(self) -> &'static str {
        match self {
            Lang::Pl => "Przepraszam, wystąpił błąd połączenia z serwerem. Spróbuj ponownie za chwilę.",
            Lang::En => "Sorry, there was a server error. Please try again.",
        }
    }
}

impl std::str::FromStr for Lang {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pl" => Ok(Lang::Pl),
            "en" => Ok(Lang::En),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadySent,
    NoUserMessage,
    NoContactHint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Skipped(SkipReason),
    Sent,
    Failed,
}

/// One visitor conversation. Closing it hands the transcript to a
/// [`LeadSink`] at most once, and only when the visitor left something that
/// looks like an email address.
#[derive(Debug, Clone)]
pub struct ChatSession {
    lang: Lang,
    messages: Vec<ChatMessage>,
    attribution: Attribution,
    lead_sent: bool,
}

impl ChatSession {
    pub fn new(lang: Lang) -> Self {
        Self {
            lang,
            messages: vec![ChatMessage::assistant(lang.welcome())],
            attribution: Attribution::default(),
            lead_sent: false,
        }
    }

    pub fn with_attribution(mut self, attribution: Attribution) -> Self {
        self.attribution = attribution;
        self
    }

    pub fn lang(&self) -> Lang {
        self.lang
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn lead_sent(&self) -> bool {
        self.lead_sent
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(text));
    }

    /// Reason the lead would not be sent right now, if any.
    pub fn lead_guard(&self) -> Option<SkipReason> {
        if self.lead_sent {
            return Some(SkipReason::AlreadySent);
        }
        let mut user_messages = self
            .messages
            .iter()
            .filter(|message| message.role == ChatRole::User)
            .peekable();
        if user_messages.peek().is_none() {
            return Some(SkipReason::NoUserMessage);
        }
        if !user_messages.any(|message| message.text.contains('@')) {
            return Some(SkipReason::NoContactHint);
        }
        None
    }

    pub async fn close(&mut self, sink: &dyn LeadSink) -> CloseOutcome {
        if let Some(reason) = self.lead_guard() {
            debug!(?reason, "chat closed without sending a lead");
            return CloseOutcome::Skipped(reason);
        }

        let submission = LeadSubmission {
            messages: self.messages.clone(),
            attribution: self.attribution.clone(),
        };

        match sink.submit(&submission).await {
            Ok(()) => {
                self.lead_sent = true;
                self.push_assistant(self.lang.lead_confirmation());
                CloseOutcome::Sent
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to submit chat lead");
                CloseOutcome::Failed
            }
        }
    }
}
