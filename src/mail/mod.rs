//! Outbound notification email.
//!
//! Handlers only see [`Mailer`]; the concrete backend is picked at startup from
//! configuration. With no provider configured a [`DisabledMailer`] logs and
//! drops messages so local development works without credentials.

pub mod templates;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AppConfig;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("mail provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// A rendered plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

pub fn build_mailer(config: &AppConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    if let Some(api_key) = &config.resend_api_key {
        info!("mail delivery via Resend API");
        return Ok(Arc::new(ResendMailer::new(
            api_key.clone(),
            config.mail_from.clone(),
        )?));
    }

    if let Some(host) = &config.smtp_host {
        info!(host = %host, port = config.smtp_port, "mail delivery via SMTP");
        return Ok(Arc::new(SmtpMailer::new(
            host,
            config.smtp_port,
            config.smtp_user.clone(),
            config.smtp_password.clone(),
            config.mail_from.clone(),
        )?));
    }

    warn!("no mail provider configured, outgoing email will be dropped");
    Ok(Arc::new(DisabledMailer))
}

pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, "mail disabled, message dropped");
        Ok(())
    }
}

pub struct ResendMailer {
    http: reqwest::Client,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

impl ResendMailer {
    pub fn new(api_key: String, from: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let response = self
            .http
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&ResendRequest {
                from: &self.from,
                to: [&email.to],
                subject: &email.subject,
                text: &email.text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(to = %email.to, subject = %email.subject, "email sent via Resend");
        Ok(())
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        user: Option<String>,
        password: Option<String>,
        from: String,
    ) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(port);
        if let (Some(user), Some(password)) = (user, password) {
            builder = builder.credentials(Credentials::new(user, password));
        }
        let from = from
            .parse()
            .map_err(|err| anyhow::anyhow!("MAIL_FROM is not a valid mailbox: {err}"))?;
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse()?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.text)
            .map_err(|err| MailError::Build(err.to_string()))?;

        self.transport.send(message).await?;
        info!(to = %email.to, subject = %email.subject, "email sent via SMTP");
        Ok(())
    }
}
