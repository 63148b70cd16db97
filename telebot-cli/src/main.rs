//! telebot CLI: bootstrap the client from env (and `.env`), then wait for or watch updates.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use telebot_client::{TelegramClient, TelegramConfig};
use telebot_core::Content;
use telebot_wait::{wait_for, Condition, Filter};
use tracing::info;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = TelegramConfig::from_env(cli.token)?;
    telebot_core::init_tracing(config.log_file.as_deref())?;

    let client = Arc::new(TelegramClient::new(&config)?);
    client.bootstrap().await.context("bootstrap failed")?;
    client.start_daemon()?;

    let outcome = match cli.command {
        Commands::Wait { text, timeout } => handle_wait(&client, text, timeout).await,
        Commands::Watch { seconds } => handle_watch(&client, seconds).await,
    };

    client.stop_daemon().await;
    outcome
}

async fn handle_wait(client: &TelegramClient, text: String, timeout: Option<u64>) -> Result<()> {
    info!(text = %text, "waiting for message");
    let conditions = vec![Condition::new([
        Filter::fallible(move |c: &Content| Ok(c.text()? == text)).named("text"),
    ])
    .stop_with_fn(|c: &Content| c.chat().map(|chat| chat.id).ok())];

    match wait_for(client, &conditions, timeout.map(Duration::from_secs), None).await? {
        Some(Some(chat_id)) => println!("{}", chat_id),
        Some(None) => println!("matched a message without chat"),
        None => println!("timed out"),
    }
    Ok(())
}

async fn handle_watch(client: &TelegramClient, seconds: u64) -> Result<()> {
    let conditions: Vec<Condition<Content, ()>> = vec![Condition::new(Vec::new()).on_match(
        |c: &Content| {
            let chat = c.chat().map(|chat| chat.id).ok();
            let sender = c.sender().ok().and_then(|u| u.username.clone());
            info!(kind = c.kind(), chat = ?chat, sender = ?sender, text = ?c.text().ok(), "update");
        },
    )];
    wait_for(client, &conditions, Some(Duration::from_secs(seconds)), None).await?;
    Ok(())
}
