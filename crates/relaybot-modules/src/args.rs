//! Shared helpers for clap-based per-command argument parsing.
//!
//! Each command owns a builder-style `clap::Command`; the same parser
//! renders the usage text stored in the registry, so `help <command>`
//! always matches what the parser actually accepts.

use clap::{ArgMatches, Command};
use relaybot_engine::Invocation;

/// Render a parser's full help text, used as the command's stored usage.
pub fn usage(parser: &Command) -> String {
    parser
        .clone()
        .render_long_help()
        .to_string()
        .trim_end()
        .to_string()
}

/// The parser's one-line description, used as the command's stored
/// description.
pub fn description(parser: &Command) -> String {
    parser
        .get_about()
        .map(|about| about.to_string())
        .unwrap_or_default()
}

/// Parse the invocation's argv. On a parse failure the rendered usage is
/// pushed as the command's error output and `None` is returned.
pub fn parse(parser: &Command, invocation: &mut Invocation) -> Option<ArgMatches> {
    match parser.clone().try_get_matches_from(&invocation.argv) {
        Ok(matches) => Some(matches),
        Err(_) => {
            invocation.output.errors.push(usage(parser));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Arg;

    fn parser() -> Command {
        Command::new("whisper")
            .about("Ask the bot to whisper something to another user.")
            .disable_help_flag(true)
            .arg(
                Arg::new("username")
                    .short('u')
                    .long("username")
                    .value_name("username")
                    .required(true),
            )
    }

    #[test]
    fn test_usage_contains_flag() {
        let text = usage(&parser());
        assert!(text.contains("--username"));
        assert!(text.contains("whisper"));
    }

    #[test]
    fn test_description() {
        assert_eq!(
            description(&parser()),
            "Ask the bot to whisper something to another user."
        );
    }
}
