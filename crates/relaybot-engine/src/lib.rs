//! relaybot-engine: module loading and command dispatch.
//!
//! The engine owns the two subsystems where correctness matters: the
//! module loader, which keeps the registry's command set consistent with
//! the live module instances, and the dispatcher, which routes inbound
//! chat events to handlers exactly once after authorization.
//!
//! # Architecture
//!
//! ```text
//! Chat platform
//!     ↓ (ChatEvent)
//! Dispatcher (one task per event)
//!     ↓ consults Registry (metadata) + ModuleLoader (live instances)
//! BotModule::handle()
//!     ↓ (CommandOutput)
//! Dispatcher reply formatting → ChatClient::post_message()
//! ```

pub mod argv;
pub mod client;
pub mod dispatch;
pub mod loader;
pub mod module;

use std::sync::Arc;

use relaybot_config::BotConfig;
use relaybot_registry::Registry;
use relaybot_scheduler::Scheduler;

pub use client::ChatClient;
pub use dispatch::{CommandOutput, Dispatcher, Invocation};
pub use loader::{LoadError, ModuleLoader};
pub use module::{BotModule, JobSpec, ModuleFactory};

/// The process-root context shared by the dispatcher, loader, scheduler,
/// and command handlers. Built once at startup and passed by reference
/// everywhere a handler needs to reach a subsystem.
pub struct BotContext {
    pub config: BotConfig,
    pub registry: Arc<Registry>,
    pub scheduler: Arc<Scheduler>,
    pub loader: ModuleLoader,
    pub client: Arc<dyn ChatClient>,
}

impl BotContext {
    /// Whether a user may pass the admin gate: owners bypass the admin
    /// table unconditionally.
    pub fn is_admin_or_owner(&self, user: &str) -> Result<bool, relaybot_registry::StorageError> {
        if self.config.owners.iter().any(|owner| owner == user) {
            return Ok(true);
        }
        self.registry.is_admin(user)
    }
}
