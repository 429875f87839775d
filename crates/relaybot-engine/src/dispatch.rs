//! Command dispatch: routes an inbound chat event to a module handler
//! exactly once, after trigger detection and authorization.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error};

use relaybot_types::{ChatEvent, CommandRecord, Scope};

use crate::BotContext;
use crate::argv::tokenize;

const INTERNAL_ERROR_REPLY: &str = "An internal error occurred while running that command.";

/// What a handler produced: zero or more reply messages, or errors.
/// Errors always render as fenced monospace; messages obey the command's
/// monospace and split_output flags.
#[derive(Debug, Default)]
pub struct CommandOutput {
    pub messages: Vec<String>,
    pub errors: Vec<String>,
}

/// A resolved, authorized command call in flight through a handler.
pub struct Invocation {
    pub event: ChatEvent,
    /// Runtime scope of the originating event, never `Scope::All`.
    pub scope: Scope,
    pub argv: Vec<String>,
    pub record: CommandRecord,
    /// Handlers set this once the command has done its work; a false
    /// value routes `output.errors` to the error formatter instead.
    pub success: bool,
    pub output: CommandOutput,
}

impl Invocation {
    /// The argument vector after the command name itself.
    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }
}

/// The event-to-handler state machine.
///
/// One `handle_event` call fully processes one event; `spawn_event`
/// wraps it in a task so a slow handler never stalls the inbound loop.
pub struct Dispatcher {
    ctx: Arc<BotContext>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self { ctx }
    }

    pub fn spawn_event(&self, event: ChatEvent) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            Dispatcher { ctx }.handle_event(event).await;
        });
    }

    pub async fn handle_event(&self, event: ChatEvent) {
        if event.text.is_empty() {
            return;
        }
        let scope = Scope::of_event(event.channel_type);

        if scope == Scope::Public {
            self.record_seen(&event);
        }

        // Trigger check. Direct messages are always eligible; channel
        // messages must start with the command prefix or a mention of
        // the bot. The matched prefix is stripped before tokenizing.
        let prefix = &self.ctx.config.command_prefix;
        let mention = self.ctx.config.mention_prefix();
        let body = if let Some(rest) = event.text.strip_prefix(prefix.as_str()) {
            rest
        } else if let Some(rest) = event.text.strip_prefix(&mention) {
            rest
        } else if scope == Scope::Private {
            event.text.as_str()
        } else {
            return;
        };

        let argv = tokenize(body);
        let Some(name) = argv.first().cloned() else {
            return;
        };

        let record = match self.ctx.registry.lookup_command(&name) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(command = %name, user = %event.user, "unknown command");
                self.send_errors(&event, scope, &[format!("Unknown command: \"{name}\"")])
                    .await;
                return;
            }
            Err(e) => {
                error!("Command lookup for \"{name}\" failed: {e}");
                self.send_errors(&event, scope, &[INTERNAL_ERROR_REPLY.to_string()])
                    .await;
                return;
            }
        };

        if let Some(rejection) = self.authorize(&record, &event, scope) {
            self.send_errors(&event, scope, &[rejection]).await;
            return;
        }

        let Some(module) = self.ctx.loader.get(&record.module).await else {
            // A command row whose owning module is not live should have
            // been pruned; treat it as an internal inconsistency.
            error!(
                "The command \"{name}\" resolves to the module \"{}\" which is not loaded.",
                record.module
            );
            self.send_errors(&event, scope, &[INTERNAL_ERROR_REPLY.to_string()])
                .await;
            return;
        };

        let mut invocation = Invocation {
            event,
            scope,
            argv,
            record,
            success: false,
            output: CommandOutput::default(),
        };
        match module.handle(&self.ctx, &mut invocation).await {
            Ok(()) => self.send_output(&invocation).await,
            Err(e) => {
                error!("The command \"{name}\" failed: {e:#}");
                self.send_errors(
                    &invocation.event,
                    invocation.scope,
                    &[INTERNAL_ERROR_REPLY.to_string()],
                )
                .await;
            }
        }
    }

    /// First failing check wins; a disabled admin-only command invoked by
    /// a non-admin reports only that it is disabled.
    fn authorize(&self, record: &CommandRecord, event: &ChatEvent, scope: Scope) -> Option<String> {
        if !record.enabled {
            return Some(format!(
                "The command \"{}\" is not currently enabled.",
                record.command
            ));
        }
        if record.is_admin {
            match self.ctx.is_admin_or_owner(&event.user) {
                Ok(true) => {}
                Ok(false) => {
                    return Some(format!(
                        "You are not permitted to use the command \"{}\".",
                        record.command
                    ));
                }
                Err(e) => {
                    error!("Admin lookup for {} failed: {e}", event.user);
                    return Some(INTERNAL_ERROR_REPLY.to_string());
                }
            }
        }
        if !record.scope.permits(scope) {
            return Some(format!(
                "The command \"{}\" cannot be used in {}.",
                record.command, record.scope
            ));
        }
        None
    }

    /// Seen tracking never gates dispatch; a failed write is logged and
    /// the event proceeds.
    fn record_seen(&self, event: &ChatEvent) {
        let name = event.user_name.as_deref().unwrap_or(&event.user);
        if let Err(e) =
            self.ctx
                .registry
                .update_seen(&event.user, name, &event.channel, Utc::now().timestamp())
        {
            error!("Failed to update seen for {}: {e}", event.user);
        }
    }

    async fn send_output(&self, invocation: &Invocation) {
        if !invocation.success {
            self.send_errors(&invocation.event, invocation.scope, &invocation.output.errors)
                .await;
            return;
        }
        let event = &invocation.event;
        if invocation.scope == Scope::Public {
            self.post(&event.channel, &format!("<@{}>", event.user)).await;
        }
        let monospace = invocation.record.monospace;
        if invocation.record.split_output {
            for message in &invocation.output.messages {
                self.post(&event.channel, &fence_if(monospace, message)).await;
            }
        } else {
            let joined = invocation.output.messages.join("\n");
            self.post(&event.channel, &fence_if(monospace, &joined)).await;
        }
    }

    async fn send_errors(&self, event: &ChatEvent, scope: Scope, errors: &[String]) {
        if errors.is_empty() {
            return;
        }
        match scope {
            Scope::Public => {
                let at = format!("<@{}>", event.user);
                for error in errors {
                    self.post(&event.channel, &format!("```{at} {error}```")).await;
                }
            }
            _ => {
                self.post(&event.channel, &format!("```{}```", errors.join("\n")))
                    .await;
            }
        }
    }

    async fn post(&self, channel: &str, text: &str) {
        if let Err(e) = self.ctx.client.post_message(channel, text).await {
            error!("Failed to post a message to {channel}: {e:#}");
        }
    }
}

fn fence_if(monospace: bool, text: &str) -> String {
    if monospace {
        format!("```{text}```")
    } else {
        text.to_string()
    }
}
