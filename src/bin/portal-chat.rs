use std::env;

use anyhow::Result;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use portal::chat::{
    client::ChatApiClient,
    session::{ChatSession, CloseOutcome, Lang},
    Attribution,
};

const DEFAULT_API_URL: &str = "http://127.0.0.1:4000";

/// Terminal front end for the website chat. The conversation is handed over as
/// a lead when the user quits with `/quit` or end of input.
#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let base_url = env::var("PORTAL_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    let lang = env::var("CHAT_LANG")
        .ok()
        .and_then(|value| value.parse::<Lang>().ok())
        .unwrap_or_default();
    let attribution = env::var("CHAT_LANDING_URL")
        .ok()
        .and_then(|value| url::Url::parse(&value).ok())
        .map(|url| Attribution::from_url(&url))
        .unwrap_or_default();

    let client = ChatApiClient::new(base_url)?;
    let mut session = ChatSession::new(lang).with_attribution(attribution);

    let mut stdout = io::stdout();
    let mut lines = BufReader::new(io::stdin()).lines();
    stdout
        .write_all(format!("Bot: {}\n> ", lang.welcome()).as_bytes())
        .await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text == "/quit" {
            break;
        }
        if text.is_empty() {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
            continue;
        }

        session.push_user(text);
        let reply = match client.reply(session.messages()).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "chat request failed");
                lang.connection_error().to_string()
            }
        };
        stdout
            .write_all(format!("Bot: {reply}\n> ").as_bytes())
            .await?;
        stdout.flush().await?;
        session.push_assistant(reply);
    }

    if session.close(&client).await == CloseOutcome::Sent {
        if let Some(last) = session.messages().last() {
            stdout
                .write_all(format!("\nBot: {}\n", last.text).as_bytes())
                .await?;
        }
    }
    stdout.flush().await?;
    Ok(())
}
