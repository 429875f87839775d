//! The module trait: a unit of loadable command-providing code.

use std::collections::HashMap;
use std::sync::Arc;

use relaybot_scheduler::JobRunner;
use relaybot_types::CommandSpec;

use crate::BotContext;
use crate::dispatch::Invocation;

/// A scheduled job a module registers at load time: the persisted half is
/// (name, interval); the runner is rebound on every load.
pub struct JobSpec {
    pub name: String,
    pub interval: u32,
    pub runner: JobRunner,
}

/// A loadable bot module.
///
/// Modules declare their command map, optionally register interval jobs,
/// and handle invocations the dispatcher has already authorized. Use
/// `&self` throughout — modules needing mutable state should use interior
/// mutability.
#[async_trait::async_trait]
pub trait BotModule: Send + Sync {
    /// Unique module name, used as the registry key.
    fn name(&self) -> &str;

    /// The command map this module declares: name → metadata. Synced into
    /// the registry on every load.
    fn commands(&self) -> HashMap<String, CommandSpec>;

    /// Whether operators may disable this module. Defaults to true.
    fn can_be_disabled(&self) -> bool {
        true
    }

    /// Interval jobs to register on load. Defaults to none.
    fn jobs(&self) -> Vec<JobSpec> {
        Vec::new()
    }

    /// Execute a resolved, authorized invocation.
    ///
    /// Handlers report user-visible outcomes through `invocation.output`;
    /// an `Err` return is an infrastructure failure the dispatcher logs
    /// and surfaces as a generic failure reply.
    async fn handle(&self, ctx: &Arc<BotContext>, invocation: &mut Invocation)
        -> anyhow::Result<()>;
}

/// Constructor for a module, keyed by module name in the loader's factory
/// map. This is the plugin-discovery boundary: a statically compiled
/// target enumerates its available modules here.
pub type ModuleFactory =
    Box<dyn Fn(&BotContext) -> anyhow::Result<Arc<dyn BotModule>> + Send + Sync>;
