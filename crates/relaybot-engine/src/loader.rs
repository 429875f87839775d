//! Module loader — maintains the live instance table and keeps the
//! registry's command set in sync with it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use relaybot_registry::StorageError;
use relaybot_scheduler::SchedulerError;

use crate::BotContext;
use crate::module::{BotModule, ModuleFactory};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("the module \"{0}\" is already loaded")]
    AlreadyLoaded(String),
    #[error("no module named \"{0}\" is available")]
    UnknownModule(String),
    #[error("the module \"{0}\" is not loaded")]
    NotLoaded(String),
    #[error("failed to construct the module \"{module}\": {source}")]
    Init {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Maps module names to live, instantiated handler objects.
///
/// The registry holds metadata and authorization state; only the live
/// table holds actually-invokable handlers. Store writes always happen
/// before live-table writes so the dispatcher never finds an instance
/// whose commands are missing from the registry.
pub struct ModuleLoader {
    factories: HashMap<String, ModuleFactory>,
    live: RwLock<HashMap<String, Arc<dyn BotModule>>>,
}

impl ModuleLoader {
    pub fn new(factories: HashMap<String, ModuleFactory>) -> Self {
        Self {
            factories,
            live: RwLock::new(HashMap::new()),
        }
    }

    /// Names of every module a factory exists for, sorted.
    pub fn available_modules(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot-read a live instance. The returned Arc stays valid for an
    /// in-flight dispatch even if the module is unloaded mid-handler.
    pub async fn get(&self, module: &str) -> Option<Arc<dyn BotModule>> {
        self.live.read().await.get(module).cloned()
    }

    pub async fn is_loaded(&self, module: &str) -> bool {
        self.live.read().await.contains_key(module)
    }

    pub async fn loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<_> = self.live.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Enumerate available modules, inserting registry rows for new ones
    /// (enabled per the auto-enable policy) and loading every enabled
    /// module that is not already live. Finishes with a prune pass.
    pub async fn discover(&self, ctx: &BotContext) -> Result<(), LoadError> {
        for name in self.available_modules() {
            if self.is_loaded(&name).await {
                debug!("The module \"{name}\" is already loaded. Skipping.");
                continue;
            }
            match ctx.registry.get_module(&name)? {
                Some(module) if module.enabled => {
                    info!("Loading module {name}.");
                    self.load(ctx, &name).await?;
                }
                Some(_) => {
                    info!("Not loading module {name} because it is disabled.");
                }
                None => {
                    let auto_enable = ctx.config.auto_enable_modules;
                    ctx.registry.add_module(&name, auto_enable)?;
                    if auto_enable {
                        info!("Found a new module named \"{name}\". Loading it.");
                        self.load(ctx, &name).await?;
                    } else {
                        info!(
                            "Found a new module named \"{name}\" which is not in the database. Inserting it and leaving it disabled."
                        );
                    }
                }
            }
        }
        self.prune_commands(ctx).await?;
        Ok(())
    }

    /// Instantiate a module, sync its declared commands and jobs into the
    /// registry, and register the live instance.
    ///
    /// The live-table write lock is held for the whole load so a
    /// concurrent load of the same module waits and then fails the
    /// idempotency check instead of instantiating twice.
    pub async fn load(&self, ctx: &BotContext, module: &str) -> Result<(), LoadError> {
        let mut live = self.live.write().await;
        if live.contains_key(module) {
            return Err(LoadError::AlreadyLoaded(module.to_string()));
        }
        let factory = self
            .factories
            .get(module)
            .ok_or_else(|| LoadError::UnknownModule(module.to_string()))?;
        let instance = factory(ctx).map_err(|source| LoadError::Init {
            module: module.to_string(),
            source,
        })?;

        ctx.registry
            .set_module_can_be_disabled(module, instance.can_be_disabled())?;

        info!("Updating bot commands for the module {module}.");
        for (name, spec) in instance.commands() {
            ctx.registry.upsert_command(module, &name, &spec)?;
        }

        let jobs = instance.jobs();
        let declared: Vec<String> = jobs.iter().map(|j| j.name.clone()).collect();
        for job in jobs {
            ctx.scheduler
                .add_job(module, &job.name, job.interval, job.runner)
                .await?;
        }
        ctx.scheduler.prune_module_jobs(module, &declared).await?;

        live.insert(module.to_string(), instance);
        Ok(())
    }

    /// Remove the live instance, delete its scheduled jobs, and prune
    /// commands no longer backed by any loaded module.
    pub async fn unload(&self, ctx: &BotContext, module: &str) -> Result<(), LoadError> {
        let removed = self.live.write().await.remove(module);
        if removed.is_none() {
            return Err(LoadError::NotLoaded(module.to_string()));
        }
        ctx.scheduler.delete_jobs_for_module(module).await?;
        self.prune_commands(ctx).await?;
        Ok(())
    }

    /// Unload then load. Re-instantiates the module with current
    /// configuration and re-syncs the registry; operator overrides of
    /// enabled/hidden survive. Code changes require a process restart.
    pub async fn reload(&self, ctx: &BotContext, module: &str) -> Result<(), LoadError> {
        match self.unload(ctx, module).await {
            Ok(()) | Err(LoadError::NotLoaded(_)) => {}
            Err(e) => return Err(e),
        }
        self.load(ctx, module).await
    }

    /// Reload every loaded module, then run discovery so modules enabled
    /// since the last pass get picked up.
    pub async fn reload_all(&self, ctx: &BotContext) -> Result<(), LoadError> {
        info!("Reloading the plugins");
        for name in self.loaded_modules().await {
            self.unload(ctx, &name).await?;
        }
        self.discover(ctx).await
    }

    /// Delete command rows not declared by any currently loaded module.
    pub async fn prune_commands(&self, ctx: &BotContext) -> Result<usize, LoadError> {
        let mut declared: Vec<String> = Vec::new();
        {
            let live = self.live.read().await;
            for instance in live.values() {
                declared.extend(instance.commands().into_keys());
            }
        }
        let stale: Vec<String> = ctx
            .registry
            .all_command_names()?
            .into_iter()
            .filter(|name| !declared.contains(name))
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let label = if stale.len() == 1 { "command" } else { "commands" };
        info!("Pruning {} {label} from the commands table.", stale.len());
        Ok(ctx.registry.prune_commands(&stale)?)
    }
}
