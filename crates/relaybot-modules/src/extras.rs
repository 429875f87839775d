//! The extras module: leaf commands with no administrative weight, plus
//! a heartbeat job that exercises scheduler registration.

use std::collections::HashMap;
use std::sync::Arc;

use clap::{Arg, Command};
use rand::seq::SliceRandom;
use tracing::info;

use relaybot_engine::{BotContext, BotModule, Invocation, JobSpec};
use relaybot_types::{CommandSpec, Scope};

use crate::args;
use crate::table;

pub const NAME: &str = "extras";

const ANSWERS: &[&str] = &[
    "As I see it, yes.",
    "Ask again later.",
    "Better not tell you now.",
    "Cannot predict now.",
    "Concentrate and ask again.",
    "Don't count on it.",
    "It is certain.",
    "It is decidedly so.",
    "Most likely.",
    "My reply is no.",
    "My sources say no.",
    "Outlook good.",
    "Outlook not so good.",
    "Reply hazy, try again.",
    "Signs point to yes.",
    "Very doubtful.",
    "Without a doubt.",
    "Yes, definitely.",
    "Yes.",
    "You may rely on it.",
];

const BASE: i64 = 1024;

// (registry key, display suffix, power of 1024)
const UNITS: &[(&str, &str, u32)] = &[
    ("bytes", "bytes", 0),
    ("kb", "KiB", 1),
    ("mb", "MiB", 2),
    ("gb", "GiB", 3),
    ("tb", "TiB", 4),
    ("pb", "PiB", 5),
    ("eb", "EiB", 6),
];

pub struct ExtrasModule;

fn ball_parser() -> Command {
    Command::new("8ball")
        .about("8ball <question> -- Ask the 8ball a question.")
        .disable_help_flag(true)
}

fn bytes_parser() -> Command {
    Command::new("bytes")
        .about("Perform byte conversions based on input.")
        .disable_help_flag(true)
        .arg(
            Arg::new("amount")
                .short('a')
                .long("amount")
                .value_name("int")
                .required(true)
                .value_parser(clap::value_parser!(i64))
                .help("The amount to convert, without the suffix."),
        )
        .arg(
            Arg::new("unit")
                .short('u')
                .long("unit")
                .value_name("unit")
                .required(true)
                .value_parser(["bytes", "kb", "mb", "gb", "tb", "pb", "eb"])
                .help("What to convert from, e.g., mb."),
        )
}

impl ExtrasModule {
    fn ball(&self, invocation: &mut Invocation) {
        let message = if invocation.args().is_empty() {
            "No question specified.".to_string()
        } else {
            ANSWERS
                .choose(&mut rand::thread_rng())
                .map(|s| s.to_string())
                .unwrap_or_default()
        };
        invocation.output.messages.push(message);
        invocation.success = true;
    }

    fn bytes(&self, invocation: &mut Invocation) {
        let parser = bytes_parser();
        let Some(matches) = args::parse(&parser, invocation) else {
            return;
        };
        let amount = matches.get_one::<i64>("amount").copied().unwrap_or(0);
        let unit = matches.get_one::<String>("unit").cloned().unwrap_or_default();

        let Some(&(_, _, from_power)) = UNITS.iter().find(|(key, _, _)| *key == unit) else {
            invocation.output.errors.push(args::usage(&parser));
            return;
        };
        let total_bytes = amount as f64 * (BASE as f64).powi(from_power as i32);

        let mut rows = vec![vec![amount.to_string(), unit.clone()]];
        for &(key, display, power) in UNITS {
            if key == unit {
                continue;
            }
            let converted = total_bytes / (BASE as f64).powi(power as i32);
            if converted <= 0.0 {
                continue;
            }
            let rendered = if converted >= 1.0 {
                format!("{converted:.1}")
            } else {
                format!("{converted:.6}")
            };
            rows.push(vec![rendered, display.to_string()]);
        }
        invocation
            .output
            .messages
            .push(table::render(&["Amount", "Unit"], &rows));
        invocation.success = true;
    }
}

#[async_trait::async_trait]
impl BotModule for ExtrasModule {
    fn name(&self) -> &str {
        NAME
    }

    fn commands(&self) -> HashMap<String, CommandSpec> {
        let ball = ball_parser();
        let bytes = bytes_parser();
        HashMap::from([
            (
                "8ball".to_string(),
                CommandSpec {
                    description: args::description(&ball),
                    usage: args::usage(&ball),
                    method: "ball".to_string(),
                    is_admin: false,
                    can_be_disabled: true,
                    scope: Scope::All,
                    hidden: false,
                    monospace: false,
                    split_output: false,
                },
            ),
            (
                "bytes".to_string(),
                CommandSpec {
                    description: args::description(&bytes),
                    usage: args::usage(&bytes),
                    method: String::new(),
                    is_admin: false,
                    can_be_disabled: true,
                    scope: Scope::All,
                    hidden: false,
                    monospace: true,
                    split_output: false,
                },
            ),
        ])
    }

    fn jobs(&self) -> Vec<JobSpec> {
        vec![JobSpec {
            name: "heartbeat".to_string(),
            interval: 60,
            runner: Arc::new(|| {
                Box::pin(async {
                    info!("The extras heartbeat job is alive.");
                    Ok(())
                })
            }),
        }]
    }

    async fn handle(&self, _ctx: &Arc<BotContext>, invocation: &mut Invocation) -> anyhow::Result<()> {
        match invocation.record.method.as_str() {
            "ball" => self.ball(invocation),
            "bytes" => self.bytes(invocation),
            other => anyhow::bail!("no handler for method \"{other}\""),
        }
        Ok(())
    }
}
