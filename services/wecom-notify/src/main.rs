//! WeCom notification CLI
//!
//! One-shot binary that:
//! 1. Loads TOML config and the corp secret
//! 2. Obtains an access token (persisted token file first)
//! 3. Sends one message or uploads one media file
//! 4. Stops the token refresh task and exits

mod cli;
mod config;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wecom_message::{Article, MediaType, MessageClient, SendReceipt};

use crate::cli::Command;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = cli::parse(&args)?;

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        corp_id = %config.corp.corp_id,
        agent_id = config.corp.agent_id,
        api_base = %config.client.api_base,
        retry = config.client.retry,
        "configuration loaded"
    );

    let mut client = MessageClient::new(config.client_config()?)
        .await
        .context("failed to build message client")?;
    client.set_default_fields(config.default_fields());

    let outcome = run(&client, cli.command, cli.safe).await;

    // Close explicitly so the refresh task is not left to process teardown.
    client.close().await;
    outcome
}

/// Execute one command against the client.
async fn run(client: &MessageClient, command: Command, safe: bool) -> Result<()> {
    let receipt = match command {
        Command::Text(content) => client.send_text(content, safe).await?,
        Command::Markdown(content) => client.send_markdown(content).await?,
        Command::TextCard {
            title,
            description,
            url,
        } => client.send_text_card(title, description, url).await?,
        Command::News {
            title,
            description,
            url,
            picurl,
        } => {
            let mut article = Article::new(title, description, url);
            if let Some(picurl) = picurl {
                article = article.with_picurl(picurl);
            }
            client.send_news(vec![article], safe).await?
        }
        Command::Image(path) => {
            let media_id = client
                .upload_media(&path, MediaType::Image)
                .await
                .with_context(|| format!("failed to upload {}", path.display()))?;
            client.send_image(media_id, safe).await?
        }
        Command::File(path) => {
            let media_id = client
                .upload_media(&path, MediaType::File)
                .await
                .with_context(|| format!("failed to upload {}", path.display()))?;
            client.send_file(media_id, safe).await?
        }
        Command::Upload { media_type, path } => {
            let media_id = client
                .upload_media(&path, media_type)
                .await
                .with_context(|| format!("failed to upload {}", path.display()))?;
            println!("{media_id}");
            return Ok(());
        }
    };

    report(&receipt);
    Ok(())
}

fn report(receipt: &SendReceipt) {
    if receipt.has_invalid_recipients() {
        info!(
            invalid_user = %receipt.invalid_user,
            invalid_party = %receipt.invalid_party,
            invalid_tag = %receipt.invalid_tag,
            "message delivered to valid recipients only"
        );
    } else {
        info!(msgid = %receipt.msgid, "message sent");
    }
}
