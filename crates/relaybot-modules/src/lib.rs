//! relaybot-modules: the builtin module set.
//!
//! `core` carries the informational and administrative command surface;
//! `extras` carries leaf commands and a scheduled job. The loader is
//! handed these through [`builtin_factories`].

pub mod args;
pub mod core;
pub mod extras;
pub mod table;

use std::collections::HashMap;
use std::sync::Arc;

use relaybot_engine::{BotModule, ModuleFactory};

/// Factory map for every builtin module, keyed by module name.
pub fn builtin_factories() -> HashMap<String, ModuleFactory> {
    let mut factories: HashMap<String, ModuleFactory> = HashMap::new();
    factories.insert(
        core::NAME.to_string(),
        Box::new(|_ctx| Ok(Arc::new(core::CoreModule::new()) as Arc<dyn BotModule>)),
    );
    factories.insert(
        extras::NAME.to_string(),
        Box::new(|_ctx| Ok(Arc::new(extras::ExtrasModule) as Arc<dyn BotModule>)),
    );
    factories
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use relaybot_config::BotConfig;
    use relaybot_engine::{BotContext, ChatClient, CommandOutput, Invocation, ModuleLoader};
    use relaybot_registry::Registry;
    use relaybot_scheduler::Scheduler;
    use relaybot_types::{ChannelType, ChatEvent, Scope};

    #[derive(Default)]
    struct CaptureClient {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl ChatClient for CaptureClient {
        async fn post_message(&self, channel: &str, text: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((channel.to_string(), text.to_string()));
            Ok(())
        }
    }

    async fn setup() -> (Arc<BotContext>, Arc<CaptureClient>) {
        let client = Arc::new(CaptureClient::default());
        let registry = Arc::new(Registry::open_in_memory().unwrap());
        let scheduler = Arc::new(Scheduler::new("main", registry.clone()));
        let ctx = Arc::new(BotContext {
            config: BotConfig {
                bot_user_id: "U0BOT".to_string(),
                owners: vec!["UOWNER".to_string()],
                ..BotConfig::default()
            },
            registry,
            scheduler,
            loader: ModuleLoader::new(builtin_factories()),
            client: client.clone(),
        });
        ctx.registry.add_module(crate::core::NAME, true).unwrap();
        ctx.registry.add_module(extras::NAME, true).unwrap();
        ctx.loader.discover(&ctx).await.unwrap();
        (ctx, client)
    }

    /// Run a command line through its live module the way the dispatcher
    /// would, after lookup, as the given user in a direct message.
    async fn invoke(ctx: &Arc<BotContext>, user: &str, line: &str) -> Invocation {
        let argv = relaybot_engine::argv::tokenize(line);
        let record = ctx.registry.lookup_command(&argv[0]).unwrap().unwrap();
        let module = ctx.loader.get(&record.module).await.unwrap();
        let mut invocation = Invocation {
            event: ChatEvent {
                channel: "D1".to_string(),
                channel_type: ChannelType::Im,
                user: user.to_string(),
                user_name: Some("tester".to_string()),
                text: line.to_string(),
                ts: 1_700_000_000,
            },
            scope: Scope::Private,
            argv,
            record,
            success: false,
            output: CommandOutput::default(),
        };
        module.handle(ctx, &mut invocation).await.unwrap();
        invocation
    }

    #[tokio::test]
    async fn test_help_listing_filters_admin_commands() {
        let (ctx, _) = setup().await;
        let plain = invoke(&ctx, "U1", "help").await;
        assert!(plain.success);
        let listing = plain.output.messages.join("\n");
        assert!(listing.contains("8ball"));
        assert!(!listing.contains("whisper"));

        let owner = invoke(&ctx, "UOWNER", "help").await;
        assert!(owner.output.messages.join("\n").contains("whisper"));
    }

    #[tokio::test]
    async fn test_hidden_command_excluded_from_listing_but_still_helpable() {
        let (ctx, _) = setup().await;
        ctx.registry.set_command_hidden("8ball", true).unwrap();

        let listing = invoke(&ctx, "U1", "help").await;
        assert!(!listing.output.messages.join("\n").contains("8ball"));

        let direct = invoke(&ctx, "U1", "help 8ball").await;
        assert!(direct.success);
        assert!(direct.output.messages[0].contains("8ball"));
    }

    #[tokio::test]
    async fn test_help_unknown_command() {
        let (ctx, _) = setup().await;
        let invocation = invoke(&ctx, "U1", "help nosuch").await;
        assert!(!invocation.success);
        assert_eq!(invocation.output.errors, vec!["No help found for \"nosuch\""]);
    }

    #[tokio::test]
    async fn test_commands_disable_guard() {
        let (ctx, _) = setup().await;
        let invocation = invoke(&ctx, "UOWNER", "commands --disable help").await;
        assert!(!invocation.success);
        assert_eq!(
            invocation.output.errors,
            vec!["The command \"help\" cannot be disabled."]
        );
        assert!(ctx.registry.lookup_command("help").unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn test_commands_disable_and_reenable() {
        let (ctx, _) = setup().await;
        let disabled = invoke(&ctx, "UOWNER", "commands --disable 8ball").await;
        assert!(disabled.success);
        assert!(!ctx.registry.lookup_command("8ball").unwrap().unwrap().enabled);

        let again = invoke(&ctx, "UOWNER", "commands --disable 8ball").await;
        assert_eq!(
            again.output.errors,
            vec!["The command \"8ball\" is already disabled."]
        );

        let enabled = invoke(&ctx, "UOWNER", "commands --enable 8ball").await;
        assert!(enabled.success);
        assert!(ctx.registry.lookup_command("8ball").unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn test_admins_grant_list_revoke() {
        let (ctx, _) = setup().await;
        let granted = invoke(&ctx, "UOWNER", "admins --grant alice").await;
        assert!(granted.success);
        assert!(ctx.registry.is_admin("alice").unwrap());

        let listing = invoke(&ctx, "UOWNER", "admins").await;
        assert!(listing.output.messages[0].contains("alice"));

        let revoked = invoke(&ctx, "UOWNER", "admins --revoke alice").await;
        assert!(revoked.success);
        assert!(!ctx.registry.is_admin("alice").unwrap());

        let missing = invoke(&ctx, "UOWNER", "admins --revoke alice").await;
        assert_eq!(missing.output.errors, vec!["User \"alice\" is not an admin."]);
    }

    #[tokio::test]
    async fn test_modules_disable_prunes_and_enable_restores() {
        let (ctx, _) = setup().await;
        let disabled = invoke(&ctx, "UOWNER", "modules --disable extras").await;
        assert!(disabled.success);
        assert!(
            disabled.output.messages[1].contains("8ball"),
            "disable should report the commands going away"
        );
        assert!(ctx.registry.lookup_command("8ball").unwrap().is_none());
        assert!(!ctx.loader.is_loaded(extras::NAME).await);

        let enabled = invoke(&ctx, "UOWNER", "modules --enable extras").await;
        assert!(enabled.success);
        assert!(enabled.output.messages[1].contains("8ball"));
        assert!(ctx.registry.lookup_command("8ball").unwrap().is_some());
        assert!(ctx.loader.is_loaded(extras::NAME).await);
    }

    #[tokio::test]
    async fn test_core_module_cannot_be_disabled() {
        let (ctx, _) = setup().await;
        let invocation = invoke(&ctx, "UOWNER", "modules --disable core").await;
        assert!(!invocation.success);
        assert_eq!(
            invocation.output.errors,
            vec!["The module \"core\" cannot be disabled."]
        );
        assert!(ctx.loader.is_loaded(crate::core::NAME).await);
    }

    #[tokio::test]
    async fn test_jobs_list_toggle_and_run() {
        let (ctx, _) = setup().await;
        let listing = invoke(&ctx, "UOWNER", "jobs").await;
        assert!(listing.success);
        assert!(listing.output.messages[0].contains("heartbeat"));
        assert!(listing.output.messages[0].contains("60"));

        let job = ctx
            .registry
            .get_job_by_name(extras::NAME, "heartbeat")
            .unwrap()
            .unwrap();

        let disabled = invoke(&ctx, "UOWNER", &format!("jobs --disable {}", job.id)).await;
        assert!(disabled.success);
        assert!(!ctx.registry.get_job(job.id).unwrap().unwrap().enabled);

        let ran = invoke(&ctx, "UOWNER", &format!("jobs --run {}", job.id)).await;
        assert!(ran.success);
        assert_eq!(
            ran.output.messages,
            vec!["Successfully executed the job extras.heartbeat.".to_string()]
        );

        let missing = invoke(&ctx, "UOWNER", "jobs --run 9999").await;
        assert_eq!(
            missing.output.errors,
            vec!["The scheduled job with the ID 9999 could not be found."]
        );
    }

    #[tokio::test]
    async fn test_reload_keeps_modules_loaded() {
        let (ctx, _) = setup().await;
        let invocation = invoke(&ctx, "UOWNER", "reload").await;
        assert!(invocation.success);
        assert_eq!(
            ctx.loader.loaded_modules().await,
            vec![crate::core::NAME.to_string(), extras::NAME.to_string()]
        );
    }

    #[tokio::test]
    async fn test_seen_roundtrip() {
        let (ctx, _) = setup().await;
        ctx.registry
            .update_seen("U9", "carol", "C5", 1_700_000_000)
            .unwrap();
        let found = invoke(&ctx, "U1", "seen carol").await;
        assert!(found.success);
        assert!(found.output.messages[0].contains("<@carol> was last seen at"));

        let missing = invoke(&ctx, "U1", "seen nobody").await;
        assert_eq!(missing.output.messages, vec!["I haven't seen <@nobody>."]);
    }

    #[tokio::test]
    async fn test_whisper_sends_direct_message() {
        let (ctx, client) = setup().await;
        let invocation = invoke(&ctx, "UOWNER", "whisper -u bob -m \"hello there\"").await;
        assert!(invocation.success);
        assert_eq!(
            client.sent.lock().unwrap().clone(),
            vec![("bob".to_string(), "hello there".to_string())]
        );
    }

    #[tokio::test]
    async fn test_whisper_missing_args_yields_usage() {
        let (ctx, _) = setup().await;
        let invocation = invoke(&ctx, "UOWNER", "whisper -u bob").await;
        assert!(!invocation.success);
        assert!(invocation.output.errors[0].contains("--message"));
    }

    #[tokio::test]
    async fn test_ball() {
        let (ctx, _) = setup().await;
        let unasked = invoke(&ctx, "U1", "8ball").await;
        assert_eq!(unasked.output.messages, vec!["No question specified."]);

        let asked = invoke(&ctx, "U1", "8ball will it rain?").await;
        assert!(asked.success);
        assert!(!asked.output.messages[0].is_empty());
        assert_ne!(asked.output.messages[0], "No question specified.");
    }

    #[tokio::test]
    async fn test_bytes_conversion_table() {
        let (ctx, _) = setup().await;
        let invocation = invoke(&ctx, "U1", "bytes -a 1 -u kb").await;
        assert!(invocation.success);
        let rendered = &invocation.output.messages[0];
        assert!(rendered.contains("1024.0"));
        assert!(rendered.contains("bytes"));
        assert!(rendered.contains("KiB") || rendered.contains("kb"));
    }

    #[tokio::test]
    async fn test_informational_commands() {
        let (ctx, _) = setup().await;
        let about = invoke(&ctx, "U1", "about").await;
        assert!(about.success);
        assert!(about.output.messages[0].starts_with("relaybot version"));

        let time = invoke(&ctx, "U1", "time").await;
        assert!(time.output.messages[0].starts_with("It is now"));

        let uptime = invoke(&ctx, "U1", "uptime").await;
        assert!(uptime.output.messages[0].contains("up"));
    }
}
