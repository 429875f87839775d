use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ──────────────────── Event Types ────────────────────

/// Kind of conversation an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// Direct (instant) message with the bot.
    Im,
    /// Shared channel.
    Channel,
}

/// A structured event delivered by the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Channel the event originated in.
    pub channel: String,
    /// Whether the event came from a direct message or a channel.
    pub channel_type: ChannelType,
    /// External identifier of the sending user.
    pub user: String,
    /// Display name of the sender, when the platform provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Raw message text.
    pub text: String,
    /// Event timestamp (unix seconds).
    pub ts: i64,
}

// ──────────────────── Command Types ────────────────────

/// Where a command may be invoked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Usable anywhere.
    All,
    /// Channels only.
    Public,
    /// Direct messages only.
    Private,
}

impl Scope {
    /// The runtime scope of an inbound event.
    pub fn of_event(channel_type: ChannelType) -> Self {
        match channel_type {
            ChannelType::Im => Scope::Private,
            ChannelType::Channel => Scope::Public,
        }
    }

    /// Whether a command declared with this scope may run in `runtime` scope.
    pub fn permits(self, runtime: Scope) -> bool {
        self == Scope::All || self == runtime
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::All => "all",
            Scope::Public => "public",
            Scope::Private => "private",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Scope::All),
            "public" => Ok(Scope::Public),
            "private" => Ok(Scope::Private),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}

/// Metadata a module declares for one of its commands.
///
/// The loader upserts this into the commands table on every load; the
/// operator-toggled settings row (enabled/hidden) is only created once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// One-line description shown in help listings.
    pub description: String,
    /// Full usage text shown by `help <command>`.
    pub usage: String,
    /// Handler method name within the owning module. Defaults to the
    /// command name when empty.
    #[serde(default)]
    pub method: String,
    /// Whether the command is restricted to admins and owners.
    #[serde(default)]
    pub is_admin: bool,
    /// Whether operators may disable this command.
    #[serde(default = "default_true")]
    pub can_be_disabled: bool,
    /// Declared scope.
    #[serde(default = "default_scope")]
    pub scope: Scope,
    /// Initial hidden state for the settings row.
    #[serde(default)]
    pub hidden: bool,
    /// Wrap output in a fixed-width block.
    #[serde(default)]
    pub monospace: bool,
    /// Send one platform message per output chunk instead of joining.
    #[serde(default)]
    pub split_output: bool,
}

fn default_true() -> bool {
    true
}

fn default_scope() -> Scope {
    Scope::All
}

// ──────────────────── Registry Rows ────────────────────

/// A modules-table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub module: String,
    pub enabled: bool,
    pub can_be_disabled: bool,
}

/// A commands-table row joined with its settings row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: String,
    pub description: String,
    pub usage: String,
    pub is_admin: bool,
    pub can_be_disabled: bool,
    pub module: String,
    pub method: String,
    pub scope: Scope,
    pub monospace: bool,
    pub split_output: bool,
    /// From the settings row; survives reloads.
    pub enabled: bool,
    /// From the settings row; survives reloads.
    pub hidden: bool,
}

/// A scheduler-table row. The invocable runner is resolved at execution
/// time from the in-memory runner table, never from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub module: String,
    pub name: String,
    /// Fires when minutes-since-epoch is divisible by this and seconds == 0.
    pub interval: u32,
    pub enabled: bool,
}

/// An admins-table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
}

/// A seen-table row: when and where a user last spoke in public.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenRecord {
    pub id: String,
    pub name: String,
    pub seen_time: i64,
    pub seen_channel: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_scope() {
        assert_eq!(Scope::of_event(ChannelType::Im), Scope::Private);
        assert_eq!(Scope::of_event(ChannelType::Channel), Scope::Public);
    }

    #[test]
    fn test_scope_permits() {
        assert!(Scope::All.permits(Scope::Public));
        assert!(Scope::All.permits(Scope::Private));
        assert!(Scope::Private.permits(Scope::Private));
        assert!(!Scope::Private.permits(Scope::Public));
        assert!(!Scope::Public.permits(Scope::Private));
    }

    #[test]
    fn test_scope_str_round_trip() {
        for scope in [Scope::All, Scope::Public, Scope::Private] {
            assert_eq!(scope.as_str().parse::<Scope>().unwrap(), scope);
        }
        assert!("everywhere".parse::<Scope>().is_err());
    }

    #[test]
    fn test_chat_event_serde() {
        let json = r#"{"channel":"C123","channel_type":"im","user":"U1","text":"!help","ts":1700000000}"#;
        let event: ChatEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.channel_type, ChannelType::Im);
        assert!(event.user_name.is_none());
    }

    #[test]
    fn test_command_spec_defaults() {
        let json = r#"{"description":"d","usage":"u"}"#;
        let spec: CommandSpec = serde_json::from_str(json).unwrap();
        assert!(!spec.is_admin);
        assert!(spec.can_be_disabled);
        assert_eq!(spec.scope, Scope::All);
        assert!(!spec.hidden);
        assert!(!spec.monospace);
        assert!(!spec.split_output);
        assert!(spec.method.is_empty());
    }
}
