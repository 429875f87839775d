//! The send capability the chat platform exposes to the bot.

/// Outbound boundary to the chat platform.
///
/// The engine only needs the ability to post a text message to a channel;
/// transports (Slack socket mode, a console loop, a test double) supply
/// the rest. Use `&self` — implementations hold their own interior state.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a message to a channel (or a user id, for direct messages).
    async fn post_message(&self, channel: &str, text: &str) -> anyhow::Result<()>;
}
