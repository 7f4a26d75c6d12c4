//! Serenity-self based Discord listener. Filters channels and forwards parsed commands.

use serenity_self::all::{ChannelId, Client, Context, EventHandler, GatewayIntents, Http, Message};
use serenity_self::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::parser::{parse_command, Command};

/// A parsed command plus what is needed to answer it.
pub struct Inbound {
    pub http: Arc<Http>,
    pub channel_id: ChannelId,
    pub author: String,
    pub command: Command,
}

pub struct Handler {
    pub channel_ids: Vec<String>,
    pub prefix: String,
    pub tx: tokio::sync::mpsc::Sender<Inbound>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        // Channel filter (empty = all)
        let ch = msg.channel_id.get().to_string();
        if !self.channel_ids.is_empty() && !self.channel_ids.iter().any(|id| id == &ch) {
            return;
        }

        let Some(command) = parse_command(&msg.content, &self.prefix) else {
            if msg.content.trim_start().starts_with(&self.prefix) {
                debug!("Unrecognized command: {}", msg.content);
            }
            return;
        };
        let _ = self
            .tx
            .send(Inbound {
                http: Arc::clone(&ctx.http),
                channel_id: msg.channel_id,
                author: msg.author.name.clone(),
                command,
            })
            .await;
    }
}

pub async fn run(
    token: &str,
    channel_ids: Vec<String>,
    prefix: String,
    tx: tokio::sync::mpsc::Sender<Inbound>,
) -> anyhow::Result<()> {
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::MESSAGE_CONTENT;
    let handler = Handler {
        channel_ids,
        prefix,
        tx,
    };

    let mut client = Client::builder(token, intents)
        .event_handler(handler)
        .await?;

    info!("Discord bot starting...");
    client.start().await?;
    Ok(())
}
