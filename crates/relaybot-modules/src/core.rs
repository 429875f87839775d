//! The core module: informational commands plus the administrative
//! surface for managing modules, commands, admins, and scheduled jobs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Arg, Command};
use tracing::error;

use relaybot_engine::{BotContext, BotModule, Invocation, LoadError};
use relaybot_scheduler::SchedulerError;
use relaybot_types::{AdminRecord, CommandSpec, Scope};

use crate::args;
use crate::table;

pub const NAME: &str = "core";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct CoreModule {
    started: DateTime<Utc>,
}

impl CoreModule {
    pub fn new() -> Self {
        Self {
            started: Utc::now(),
        }
    }
}

impl Default for CoreModule {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Parsers ───
//
// One builder parser per command. The rendered help doubles as the usage
// text stored in the registry.

fn about_parser() -> Command {
    Command::new("about")
        .about("Display information about this bot.")
        .disable_help_flag(true)
}

fn help_parser() -> Command {
    Command::new("help")
        .about("Display a list of commands or usage for a specific command.")
        .disable_help_flag(true)
        .arg(Arg::new("command").value_name("command").required(false))
}

fn seen_parser() -> Command {
    Command::new("seen")
        .about("Show when a user was last seen.")
        .disable_help_flag(true)
        .arg(Arg::new("username").value_name("username").required(true))
}

fn time_parser() -> Command {
    Command::new("time")
        .about("Display the current time.")
        .disable_help_flag(true)
}

fn uptime_parser() -> Command {
    Command::new("uptime")
        .about("Display the bot's uptime.")
        .disable_help_flag(true)
}

fn admins_parser() -> Command {
    Command::new("admins")
        .about("List bot admins, grant or revoke admin access.")
        .disable_help_flag(true)
        .arg(
            Arg::new("grant")
                .short('g')
                .long("grant")
                .value_name("username")
                .help("Grant admin access to a user."),
        )
        .arg(
            Arg::new("revoke")
                .short('r')
                .long("revoke")
                .value_name("username")
                .help("Revoke admin access from a user."),
        )
}

fn commands_parser() -> Command {
    Command::new("commands")
        .about("List, enable, disable, hide, or unhide bot commands.")
        .disable_help_flag(true)
        .arg(
            Arg::new("enable")
                .short('e')
                .long("enable")
                .value_name("command")
                .help("Enable a bot command."),
        )
        .arg(
            Arg::new("disable")
                .short('d')
                .long("disable")
                .value_name("command")
                .help("Disable a bot command."),
        )
        .arg(
            Arg::new("hide")
                .short('h')
                .long("hide")
                .value_name("command")
                .help("Hide a bot command."),
        )
        .arg(
            Arg::new("unhide")
                .short('u')
                .long("unhide")
                .value_name("command")
                .help("Unhide a bot command."),
        )
}

fn modules_parser() -> Command {
    Command::new("modules")
        .about("List, enable, or disable bot modules. Use \"modules\" without arguments to list modules.")
        .disable_help_flag(true)
        .arg(
            Arg::new("enable")
                .short('e')
                .long("enable")
                .value_name("module")
                .help("Enable a module and all of its commands."),
        )
        .arg(
            Arg::new("disable")
                .short('d')
                .long("disable")
                .value_name("module")
                .help("Disable a module and all of its commands."),
        )
}

fn jobs_parser() -> Command {
    Command::new("jobs")
        .about("Manage the job scheduler. Use \"jobs\" without arguments to list scheduled jobs.")
        .disable_help_flag(true)
        .arg(
            Arg::new("enable")
                .short('e')
                .long("enable")
                .value_name("id")
                .value_parser(clap::value_parser!(i64))
                .help("The ID of the job to enable."),
        )
        .arg(
            Arg::new("disable")
                .short('d')
                .long("disable")
                .value_name("id")
                .value_parser(clap::value_parser!(i64))
                .help("The ID of the job to disable."),
        )
        .arg(
            Arg::new("run")
                .short('r')
                .long("run")
                .value_name("id")
                .value_parser(clap::value_parser!(i64))
                .help("The ID of the job to run."),
        )
}

fn reload_parser() -> Command {
    Command::new("reload")
        .about("Reload all configured modules.")
        .disable_help_flag(true)
}

fn whisper_parser() -> Command {
    Command::new("whisper")
        .about("Ask the bot to whisper something to another user.")
        .disable_help_flag(true)
        .arg(
            Arg::new("username")
                .short('u')
                .long("username")
                .value_name("username")
                .required(true)
                .help("The user to whisper to."),
        )
        .arg(
            Arg::new("message")
                .short('m')
                .long("message")
                .value_name("message")
                .required(true)
                .help("The message to whisper."),
        )
}

fn spec(
    parser: &Command,
    is_admin: bool,
    can_be_disabled: bool,
    scope: Scope,
    monospace: bool,
) -> CommandSpec {
    CommandSpec {
        description: args::description(parser),
        usage: args::usage(parser),
        method: String::new(),
        is_admin,
        can_be_disabled,
        scope,
        hidden: false,
        monospace,
        split_output: false,
    }
}

// ─── Handlers ───

impl CoreModule {
    fn about(&self, invocation: &mut Invocation) {
        let out = &mut invocation.output.messages;
        out.push(format!("relaybot version {}", env!("CARGO_PKG_VERSION")));
        out.push("Bot Information".to_string());
        let info = [
            ("os", std::env::consts::OS.to_string()),
            ("architecture", std::env::consts::ARCH.to_string()),
            ("pid", std::process::id().to_string()),
            ("started", self.started.format(TIME_FORMAT).to_string()),
        ];
        let width = info.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in info {
            out.push(format!("  {key:<width$} = {value}"));
        }
        invocation.success = true;
    }

    async fn help(&self, ctx: &Arc<BotContext>, invocation: &mut Invocation) -> anyhow::Result<()> {
        if let Some(name) = invocation.args().first().cloned() {
            // Hidden commands are excluded from the listing but still
            // answer a direct help request.
            match ctx.registry.lookup_command(&name)? {
                Some(record) if record.enabled => {
                    invocation.output.messages.push(record.usage);
                    invocation.success = true;
                }
                _ => {
                    invocation
                        .output
                        .errors
                        .push(format!("No help found for \"{name}\""));
                }
            }
            return Ok(());
        }

        let include_admin = ctx.is_admin_or_owner(&invocation.event.user)?;
        let commands = ctx.registry.list_enabled_commands(include_admin)?;
        if commands.is_empty() {
            invocation
                .output
                .errors
                .push("No commands are currently available.".to_string());
            return Ok(());
        }
        let width = commands
            .iter()
            .map(|c| c.command.len())
            .max()
            .unwrap_or(0);
        let out = &mut invocation.output.messages;
        out.push("Commands available to you:".to_string());
        out.push(String::new());
        for record in &commands {
            out.push(format!("   {:<width$}       {}", record.command, record.description));
        }
        out.push(String::new());
        out.push("Use \"help <command>\" for command-specific help.".to_string());
        invocation.success = true;
        Ok(())
    }

    fn seen(&self, ctx: &Arc<BotContext>, invocation: &mut Invocation) -> anyhow::Result<()> {
        let parser = seen_parser();
        let Some(matches) = args::parse(&parser, invocation) else {
            return Ok(());
        };
        let name = matches
            .get_one::<String>("username")
            .cloned()
            .unwrap_or_default();
        let message = match ctx.registry.get_seen_by_name(&name)? {
            Some(record) => {
                let when = DateTime::<Utc>::from_timestamp(record.seen_time, 0)
                    .map(|t| t.format(TIME_FORMAT).to_string())
                    .unwrap_or_else(|| "an unknown time".to_string());
                format!("<@{name}> was last seen at {when}.")
            }
            None => format!("I haven't seen <@{name}>."),
        };
        invocation.output.messages.push(message);
        invocation.success = true;
        Ok(())
    }

    fn time(&self, invocation: &mut Invocation) {
        invocation
            .output
            .messages
            .push(format!("It is now {} UTC.", Utc::now().format(TIME_FORMAT)));
        invocation.success = true;
    }

    fn uptime(&self, invocation: &mut Invocation) {
        let now = Utc::now();
        let seconds = (now - self.started).num_seconds().max(1);
        let days = seconds / 86_400;
        let hours = (seconds % 86_400) / 3_600;
        let minutes = (seconds % 3_600) / 60;
        let secs = seconds % 60;

        let mut message = format!("{} up ", now.format("%H:%M"));
        if days > 0 {
            let unit = if days == 1 { "day" } else { "days" };
            message.push_str(&format!("{days} {unit} "));
        }
        message.push_str(&format!("{hours:02}:{minutes:02}:{secs:02}"));
        invocation.output.messages.push(message);
        invocation.success = true;
    }

    fn admins(&self, ctx: &Arc<BotContext>, invocation: &mut Invocation) -> anyhow::Result<()> {
        let parser = admins_parser();
        let Some(matches) = args::parse(&parser, invocation) else {
            return Ok(());
        };

        if let Some(user) = matches.get_one::<String>("grant").cloned() {
            if ctx.registry.get_admin(&user)?.is_some() {
                invocation
                    .output
                    .errors
                    .push(format!("User \"{user}\" is already an admin."));
            } else {
                ctx.registry.grant_admin(&AdminRecord {
                    id: user.clone(),
                    name: user.clone(),
                    real_name: None,
                })?;
                invocation
                    .output
                    .messages
                    .push(format!("User \"{user}\" was successfully granted admin access."));
                invocation.success = true;
            }
        } else if let Some(user) = matches.get_one::<String>("revoke").cloned() {
            if ctx.registry.revoke_admin(&user)? {
                invocation
                    .output
                    .messages
                    .push(format!("Admin access for \"{user}\" was successfully revoked."));
                invocation.success = true;
            } else {
                invocation
                    .output
                    .errors
                    .push(format!("User \"{user}\" is not an admin."));
            }
        } else {
            let admins = ctx.registry.list_admins()?;
            if admins.is_empty() {
                invocation.output.errors.push("No admins found.".to_string());
            } else {
                let rows: Vec<Vec<String>> = admins
                    .iter()
                    .map(|a| {
                        vec![
                            a.real_name.clone().unwrap_or_else(|| "-".to_string()),
                            a.name.clone(),
                        ]
                    })
                    .collect();
                invocation
                    .output
                    .messages
                    .push(table::render(&["Name", "Username"], &rows));
                invocation.success = true;
            }
        }
        Ok(())
    }

    fn commands(&self, ctx: &Arc<BotContext>, invocation: &mut Invocation) -> anyhow::Result<()> {
        let parser = commands_parser();
        let Some(matches) = args::parse(&parser, invocation) else {
            return Ok(());
        };

        if let Some(name) = matches.get_one::<String>("enable").cloned() {
            match ctx.registry.lookup_command(&name)? {
                None => not_found(invocation, &name),
                Some(record) if record.enabled => invocation
                    .output
                    .errors
                    .push(format!("The command \"{name}\" is already enabled.")),
                Some(_) => {
                    ctx.registry.set_command_enabled(&name, true)?;
                    invocation
                        .output
                        .messages
                        .push(format!("The command \"{name}\" was enabled."));
                    invocation.success = true;
                }
            }
        } else if let Some(name) = matches.get_one::<String>("disable").cloned() {
            match ctx.registry.lookup_command(&name)? {
                None => not_found(invocation, &name),
                Some(record) if !record.enabled => invocation
                    .output
                    .errors
                    .push(format!("The command \"{name}\" is already disabled.")),
                Some(record) if !record.can_be_disabled => invocation
                    .output
                    .errors
                    .push(format!("The command \"{name}\" cannot be disabled.")),
                Some(_) => {
                    ctx.registry.set_command_enabled(&name, false)?;
                    invocation
                        .output
                        .messages
                        .push(format!("The command \"{name}\" was disabled."));
                    invocation.success = true;
                }
            }
        } else if let Some(name) = matches.get_one::<String>("hide").cloned() {
            match ctx.registry.lookup_command(&name)? {
                None => not_found(invocation, &name),
                Some(record) if record.hidden => invocation
                    .output
                    .errors
                    .push(format!("The command \"{name}\" is already hidden.")),
                Some(_) => {
                    ctx.registry.set_command_hidden(&name, true)?;
                    invocation
                        .output
                        .messages
                        .push(format!("The command \"{name}\" was hidden."));
                    invocation.success = true;
                }
            }
        } else if let Some(name) = matches.get_one::<String>("unhide").cloned() {
            match ctx.registry.lookup_command(&name)? {
                None => not_found(invocation, &name),
                Some(record) if !record.hidden => invocation
                    .output
                    .errors
                    .push(format!("The command \"{name}\" is already unhidden.")),
                Some(_) => {
                    ctx.registry.set_command_hidden(&name, false)?;
                    invocation
                        .output
                        .messages
                        .push(format!("The command \"{name}\" was unhidden."));
                    invocation.success = true;
                }
            }
        } else {
            let mut rows = Vec::new();
            for name in ctx.registry.all_command_names()? {
                if let Some(record) = ctx.registry.lookup_command(&name)? {
                    let status = if record.enabled { "Enabled" } else { "Disabled" };
                    rows.push(vec![record.command, record.module, status.to_string()]);
                }
            }
            if rows.is_empty() {
                invocation.output.errors.push("No commands found.".to_string());
            } else {
                invocation
                    .output
                    .messages
                    .push(table::render(&["Command", "Module", "Status"], &rows));
                invocation.success = true;
            }
        }
        Ok(())
    }

    async fn modules(&self, ctx: &Arc<BotContext>, invocation: &mut Invocation) -> anyhow::Result<()> {
        let parser = modules_parser();
        let Some(matches) = args::parse(&parser, invocation) else {
            return Ok(());
        };

        if let Some(name) = matches.get_one::<String>("enable").cloned() {
            match ctx.registry.get_module(&name)? {
                None => invocation
                    .output
                    .errors
                    .push(format!("The module \"{name}\" was not found.")),
                Some(module) if module.enabled => invocation
                    .output
                    .errors
                    .push(format!("The module \"{name}\" is already enabled.")),
                Some(_) => {
                    ctx.registry.set_module_enabled(&name, true)?;
                    invocation
                        .output
                        .messages
                        .push(format!("The module \"{name}\" was enabled."));
                    ctx.loader.discover(ctx).await?;
                    let mut commands = ctx.registry.module_commands(&name)?;
                    commands.sort();
                    if !commands.is_empty() {
                        invocation.output.messages.push(format!(
                            "The following commands are now available: {}",
                            commands.join(", ")
                        ));
                    }
                    invocation.success = true;
                }
            }
        } else if let Some(name) = matches.get_one::<String>("disable").cloned() {
            match ctx.registry.get_module(&name)? {
                None => invocation
                    .output
                    .errors
                    .push(format!("The module \"{name}\" was not found.")),
                Some(module) if !module.enabled => invocation
                    .output
                    .errors
                    .push(format!("The module \"{name}\" is already disabled.")),
                Some(module) if !module.can_be_disabled => invocation
                    .output
                    .errors
                    .push(format!("The module \"{name}\" cannot be disabled.")),
                Some(_) => {
                    let mut commands = ctx.registry.module_commands(&name)?;
                    commands.sort();
                    ctx.registry.set_module_enabled(&name, false)?;
                    match ctx.loader.unload(ctx, &name).await {
                        Ok(()) | Err(LoadError::NotLoaded(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                    invocation
                        .output
                        .messages
                        .push(format!("The module \"{name}\" was disabled."));
                    if !commands.is_empty() {
                        invocation.output.messages.push(format!(
                            "The following commands will no longer be available: {}",
                            commands.join(", ")
                        ));
                    }
                    invocation.success = true;
                }
            }
        } else {
            let modules = ctx.registry.list_modules()?;
            if modules.is_empty() {
                invocation.output.errors.push("No modules found.".to_string());
            } else {
                let rows: Vec<Vec<String>> = modules
                    .iter()
                    .map(|m| {
                        let status = if m.enabled { "Enabled" } else { "Disabled" };
                        vec![m.module.clone(), status.to_string()]
                    })
                    .collect();
                invocation
                    .output
                    .messages
                    .push(table::render(&["Module", "Status"], &rows));
                invocation.success = true;
            }
        }
        Ok(())
    }

    async fn jobs(&self, ctx: &Arc<BotContext>, invocation: &mut Invocation) -> anyhow::Result<()> {
        let parser = jobs_parser();
        let Some(matches) = args::parse(&parser, invocation) else {
            return Ok(());
        };

        if let Some(&id) = matches.get_one::<i64>("enable") {
            self.toggle_job(ctx, invocation, id, true)?;
        } else if let Some(&id) = matches.get_one::<i64>("disable") {
            self.toggle_job(ctx, invocation, id, false)?;
        } else if let Some(&id) = matches.get_one::<i64>("run") {
            match ctx.scheduler.run_now(id).await {
                Ok(job) => {
                    invocation.output.messages.push(format!(
                        "Successfully executed the job {}.{}.",
                        job.module, job.name
                    ));
                    invocation.success = true;
                }
                Err(SchedulerError::NotFound(_)) => job_not_found(invocation, id),
                Err(SchedulerError::ModuleNotLoaded { module, name }) => {
                    invocation.output.errors.push(format!(
                        "The job {module}.{name} cannot run because its module is not loaded."
                    ));
                }
                Err(SchedulerError::Execution { module, name, source }) => {
                    error!("The job {module}.{name} failed: {source:#}");
                    invocation
                        .output
                        .errors
                        .push(format!("Failed to execute the job {module}.{name}."));
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            let jobs = ctx.scheduler.list_jobs()?;
            if jobs.is_empty() {
                invocation
                    .output
                    .errors
                    .push("No scheduled jobs found.".to_string());
            } else {
                let rows: Vec<Vec<String>> = jobs
                    .iter()
                    .map(|j| {
                        let status = if j.enabled { "Enabled" } else { "Disabled" };
                        vec![
                            j.id.to_string(),
                            j.module.clone(),
                            j.name.clone(),
                            j.interval.to_string(),
                            status.to_string(),
                        ]
                    })
                    .collect();
                invocation.output.messages.push(table::render(
                    &["Job ID", "Module", "Name", "Interval", "Status"],
                    &rows,
                ));
                invocation.success = true;
            }
        }
        Ok(())
    }

    fn toggle_job(
        &self,
        ctx: &Arc<BotContext>,
        invocation: &mut Invocation,
        id: i64,
        enabled: bool,
    ) -> anyhow::Result<()> {
        let verb = if enabled { "enabled" } else { "disabled" };
        match ctx.scheduler.get_job(id)? {
            None => job_not_found(invocation, id),
            Some(job) if job.enabled == enabled => {
                invocation.output.errors.push(format!(
                    "The scheduled job {}.{} is already {verb}.",
                    job.module, job.name
                ));
            }
            Some(job) => {
                ctx.scheduler.set_enabled(id, enabled)?;
                invocation.output.messages.push(format!(
                    "The scheduled job {}.{} was successfully {verb}.",
                    job.module, job.name
                ));
                invocation.success = true;
            }
        }
        Ok(())
    }

    async fn reload(&self, ctx: &Arc<BotContext>, invocation: &mut Invocation) -> anyhow::Result<()> {
        ctx.loader.reload_all(ctx).await?;
        let loaded = ctx.loader.loaded_modules().await;
        invocation
            .output
            .messages
            .push("Reloaded all modules.".to_string());
        if loaded.is_empty() {
            invocation
                .output
                .messages
                .push("No modules are loaded.".to_string());
        } else {
            invocation
                .output
                .messages
                .push(format!("Loaded modules: {}", loaded.join(", ")));
        }
        invocation.success = true;
        Ok(())
    }

    async fn whisper(&self, ctx: &Arc<BotContext>, invocation: &mut Invocation) -> anyhow::Result<()> {
        let parser = whisper_parser();
        let Some(matches) = args::parse(&parser, invocation) else {
            return Ok(());
        };
        let user = matches
            .get_one::<String>("username")
            .cloned()
            .unwrap_or_default();
        let message = matches
            .get_one::<String>("message")
            .cloned()
            .unwrap_or_default();
        match ctx.client.post_message(&user, &message).await {
            Ok(()) => {
                invocation
                    .output
                    .messages
                    .push(format!("Successfully whispered to <@{user}>"));
                invocation.success = true;
            }
            Err(e) => {
                error!("Failed to whisper to {user}: {e:#}");
                invocation
                    .output
                    .errors
                    .push(format!("Failed to whisper to <@{user}>"));
            }
        }
        Ok(())
    }
}

fn not_found(invocation: &mut Invocation, name: &str) {
    invocation
        .output
        .errors
        .push(format!("The command \"{name}\" was not found."));
}

fn job_not_found(invocation: &mut Invocation, id: i64) {
    invocation
        .output
        .errors
        .push(format!("The scheduled job with the ID {id} could not be found."));
}

#[async_trait::async_trait]
impl BotModule for CoreModule {
    fn name(&self) -> &str {
        NAME
    }

    fn can_be_disabled(&self) -> bool {
        false
    }

    fn commands(&self) -> HashMap<String, CommandSpec> {
        HashMap::from([
            (
                "about".to_string(),
                spec(&about_parser(), false, false, Scope::All, true),
            ),
            (
                "help".to_string(),
                spec(&help_parser(), false, false, Scope::All, true),
            ),
            (
                "seen".to_string(),
                spec(&seen_parser(), false, true, Scope::All, false),
            ),
            (
                "time".to_string(),
                spec(&time_parser(), false, true, Scope::All, false),
            ),
            (
                "uptime".to_string(),
                spec(&uptime_parser(), false, true, Scope::All, true),
            ),
            (
                "admins".to_string(),
                spec(&admins_parser(), true, false, Scope::All, true),
            ),
            (
                "commands".to_string(),
                spec(&commands_parser(), true, true, Scope::All, true),
            ),
            (
                "modules".to_string(),
                spec(&modules_parser(), true, true, Scope::All, true),
            ),
            (
                "jobs".to_string(),
                spec(&jobs_parser(), true, true, Scope::Private, true),
            ),
            (
                "reload".to_string(),
                spec(&reload_parser(), true, false, Scope::All, true),
            ),
            (
                "whisper".to_string(),
                spec(&whisper_parser(), true, true, Scope::Private, false),
            ),
        ])
    }

    async fn handle(&self, ctx: &Arc<BotContext>, invocation: &mut Invocation) -> anyhow::Result<()> {
        match invocation.record.method.as_str() {
            "about" => self.about(invocation),
            "help" => self.help(ctx, invocation).await?,
            "seen" => self.seen(ctx, invocation)?,
            "time" => self.time(invocation),
            "uptime" => self.uptime(invocation),
            "admins" => self.admins(ctx, invocation)?,
            "commands" => self.commands(ctx, invocation)?,
            "modules" => self.modules(ctx, invocation).await?,
            "jobs" => self.jobs(ctx, invocation).await?,
            "reload" => self.reload(ctx, invocation).await?,
            "whisper" => self.whisper(ctx, invocation).await?,
            other => anyhow::bail!("no handler for method \"{other}\""),
        }
        Ok(())
    }
}
