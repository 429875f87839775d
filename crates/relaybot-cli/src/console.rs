//! Console transport: stdin lines become direct-message events, replies
//! print to stdout. The chat-platform boundary is the `ChatClient`
//! trait; this is the transport the binary ships with.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::io::AsyncBufReadExt;
use tracing::info;

use relaybot_engine::{BotContext, ChatClient, Dispatcher, ModuleLoader};
use relaybot_registry::Registry;
use relaybot_scheduler::Scheduler;
use relaybot_types::{ChannelType, ChatEvent};

struct ConsoleClient;

#[async_trait::async_trait]
impl ChatClient for ConsoleClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        println!("[{channel}] {text}");
        Ok(())
    }
}

pub async fn run(db_override: Option<PathBuf>, user_override: Option<String>) -> Result<()> {
    let config = relaybot_config::load_config().unwrap_or_default();
    let db_path = match db_override {
        Some(path) => path,
        None => config.database_path()?,
    };
    relaybot_config::ensure_config_dir()?;

    let registry = Arc::new(Registry::open(&db_path)?);
    let scheduler = Arc::new(Scheduler::new("main", registry.clone()));
    let ctx = Arc::new(BotContext {
        config,
        registry,
        scheduler: scheduler.clone(),
        loader: ModuleLoader::new(relaybot_modules::builtin_factories()),
        client: Arc::new(ConsoleClient),
    });

    // The core module carries the admin surface; without it there is no
    // way to enable anything else, so it is seeded enabled.
    ctx.registry.add_module(relaybot_modules::core::NAME, true)?;
    ctx.loader.discover(&ctx).await?;

    tokio::spawn(scheduler.clone().run());

    let user = user_override
        .or_else(|| ctx.config.owners.first().cloned())
        .unwrap_or_else(|| "console".to_string());
    info!("Console transport ready as user {user}. Ctrl-D to exit.");

    let dispatcher = Dispatcher::new(ctx.clone());
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim().to_string();
        if text.is_empty() {
            continue;
        }
        dispatcher
            .handle_event(ChatEvent {
                channel: "console".to_string(),
                channel_type: ChannelType::Im,
                user: user.clone(),
                user_name: Some(user.clone()),
                text,
                ts: Utc::now().timestamp(),
            })
            .await;
    }

    scheduler.stop();
    Ok(())
}
