//! Echo Bot Example
//!
//! Replies to every message that mentions the bot, and to every direct
//! message, with the treated text.
//!
//! # Usage
//!
//! ```bash
//! QGATE_BOT__APP_ID=... QGATE_BOT__TOKEN=... cargo run --package echo-bot -- --sandbox
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use clap::Parser;
use qgate::prelude::*;
use qgate::runtime::ConfigLoader;
use serde_json::json;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(about = "Echo bot built on qgate")]
struct Args {
    /// Configuration file (defaults to qgate.toml in the working directory).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(short, long)]
    profile: Option<String>,

    /// Use the sandbox API.
    #[arg(long)]
    sandbox: bool,
}

type SharedHttp = Arc<OnceLock<HttpClient>>;

/// Sends `content` back to where `event` came from.
async fn reply(http: &SharedHttp, event: &Event, content: String) -> anyhow::Result<()> {
    let http = http.get().context("HTTP client not ready")?;
    let msg_id = event.get("id").cloned().unwrap_or_default();
    let target = match event.kind() {
        Some(EventKind::DirectMessage) => {
            let guild_id = event
                .get("guild_id")
                .and_then(|v| v.as_str())
                .context("direct message without guild_id")?;
            format!("/dms/{guild_id}/messages")
        }
        _ => {
            let channel_id = event
                .get("channel_id")
                .and_then(|v| v.as_str())
                .context("message without channel_id")?;
            format!("/channels/{channel_id}/messages")
        }
    };

    let response = http
        .post(&target, json!({"content": content, "msg_id": msg_id}))
        .await?;
    if !response.is_success() {
        anyhow::bail!("reply failed with status {}", response.status());
    }
    Ok(())
}

fn echo_callback(http: SharedHttp) -> Callback<Event> {
    Callback::asynchronous(move |event: Event| {
        let http = Arc::clone(&http);
        async move {
            let Some(treated) = event.treated() else {
                return Ok(());
            };
            if treated.text.is_empty() {
                return Ok(());
            }
            info!(kind = ?event.kind(), text = %treated.text, "Echoing");
            reply(&http, &event, treated.text).await
        }
    })
}

async fn run(args: Args) -> Result<(), RuntimeError> {
    let mut loader = ConfigLoader::new().with_current_dir().with_user_config_dir();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    if let Some(profile) = &args.profile {
        loader = loader.profile(profile);
    }
    let mut config = loader.load()?;
    config.bot.sandbox |= args.sandbox;

    let http: SharedHttp = Arc::default();
    let runtime = BotRuntime::builder()
        .config(config)
        .on_start(Callback::sync(|bot: BotIdentity| {
            info!(id = %bot.id, name = %bot.username, "Echo bot is online");
            Ok(())
        }))
        .on(EventKind::Message, echo_callback(Arc::clone(&http)))
        .on(EventKind::DirectMessage, echo_callback(Arc::clone(&http)))
        .build()?;
    let _ = http.set(runtime.http().clone());

    runtime.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Echo bot stopped");
            eprintln!("echo-bot: {e}");
            ExitCode::FAILURE
        }
    }
}
