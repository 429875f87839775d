//! relaybot-scheduler: minute-interval job scheduling.
//!
//! Job rows (module, name, interval, enabled) live in the registry; the
//! invocable half lives in an in-memory runner table populated by the
//! module loader when a module registers its jobs. A job whose module is
//! not currently loaded has no runner and is treated as disabled.
//!
//! Runners are awaited inline on the tick loop, so a long-running job
//! delays subsequent ticks of the same scheduler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use relaybot_registry::{Registry, StorageError};
use relaybot_types::JobRecord;

/// The invocable half of a scheduled job: a statically known function the
/// owning module bound at registration time.
pub type JobRunner =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("no scheduled job with the ID {0}")]
    NotFound(i64),
    #[error("the module owning the job {module}.{name} is not loaded")]
    ModuleNotLoaded { module: String, name: String },
    #[error("the job {module}.{name} failed: {source}")]
    Execution {
        module: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Whether a job with the given interval is due at `now`.
///
/// Fires when wall-clock minutes since the epoch divide evenly by the
/// interval and the seconds component is zero.
pub fn is_due(interval: u32, now: DateTime<Utc>) -> bool {
    if interval == 0 {
        return false;
    }
    now.second() == 0 && (now.timestamp() / 60) % i64::from(interval) == 0
}

/// Interval job scheduler backed by the registry's scheduler table.
pub struct Scheduler {
    name: String,
    registry: Arc<Registry>,
    runners: RwLock<HashMap<(String, String), JobRunner>>,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(name: impl Into<String>, registry: Arc<Registry>) -> Self {
        Self {
            name: name.into(),
            registry,
            runners: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a job, persisting its row and binding its runner.
    ///
    /// Re-registering the same (module, name) keeps the stored id and
    /// enabled flag and replaces the runner.
    pub async fn add_job(
        &self,
        module: &str,
        name: &str,
        interval: u32,
        runner: JobRunner,
    ) -> Result<JobRecord> {
        info!("Adding the scheduled job {module}.{name}.");
        let record = self.registry.upsert_job(module, name, interval)?;
        self.runners
            .write()
            .await
            .insert((module.to_string(), name.to_string()), runner);
        Ok(record)
    }

    /// Delete a job row and its runner by id.
    pub async fn delete_job(&self, id: i64) -> Result<bool> {
        let Some(job) = self.registry.get_job(id)? else {
            return Ok(false);
        };
        self.registry.delete_job(id)?;
        self.runners.write().await.remove(&(job.module, job.name));
        Ok(true)
    }

    /// Remove every job owned by a module, rows and runners both.
    /// Invoked by the module loader on unload.
    pub async fn delete_jobs_for_module(&self, module: &str) -> Result<usize> {
        let removed = self.registry.delete_jobs_for_module(module)?;
        self.runners
            .write()
            .await
            .retain(|(owner, _), _| owner != module);
        Ok(removed)
    }

    /// Drop job rows for a module that the module no longer declares.
    ///
    /// Run after a module has re-registered on load so a renamed job
    /// cannot leave an orphaned row, while surviving jobs keep their
    /// stored enabled flag.
    pub async fn prune_module_jobs(&self, module: &str, declared: &[String]) -> Result<usize> {
        let mut removed = 0;
        for job in self.registry.list_jobs()? {
            if job.module == module && !declared.contains(&job.name) {
                self.registry.delete_job(job.id)?;
                self.runners
                    .write()
                    .await
                    .remove(&(job.module.clone(), job.name.clone()));
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Pruned {removed} stale scheduled jobs for the module {module}.");
        }
        Ok(removed)
    }

    pub fn list_jobs(&self) -> Result<Vec<JobRecord>> {
        Ok(self.registry.list_jobs()?)
    }

    pub fn get_job(&self, id: i64) -> Result<Option<JobRecord>> {
        Ok(self.registry.get_job(id)?)
    }

    /// Flip a job's enabled flag by id.
    pub fn set_enabled(&self, id: i64, enabled: bool) -> Result<bool> {
        Ok(self.registry.set_job_enabled(id, enabled)?)
    }

    /// Execute a job immediately, bypassing the interval check.
    pub async fn run_now(&self, id: i64) -> Result<JobRecord> {
        let job = self.registry.get_job(id)?.ok_or(SchedulerError::NotFound(id))?;
        let runner = {
            let runners = self.runners.read().await;
            runners
                .get(&(job.module.clone(), job.name.clone()))
                .cloned()
        };
        let Some(runner) = runner else {
            return Err(SchedulerError::ModuleNotLoaded {
                module: job.module,
                name: job.name,
            });
        };
        info!("Executing the job {}.{}.", job.module, job.name);
        runner().await.map_err(|source| SchedulerError::Execution {
            module: job.module.clone(),
            name: job.name.clone(),
            source,
        })?;
        Ok(job)
    }

    /// Request the tick loop to exit at its next iteration boundary.
    /// Already-started job invocations run to completion.
    pub fn stop(&self) {
        info!("Stopping the scheduler {}.", self.name);
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the tick loop until [`Scheduler::stop`] is called.
    ///
    /// Once per second, every enabled job whose interval divides the
    /// current minute (and whose module is loaded) is executed. Job
    /// failures are logged with the job's identity and never stop the
    /// loop or disable the job.
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        match self.registry.list_jobs() {
            Ok(jobs) => {
                let plural = if jobs.len() == 1 { "job" } else { "jobs" };
                info!("Started the scheduler {} with {} {plural}.", self.name, jobs.len());
            }
            Err(e) => error!("Failed to count jobs for the scheduler {}: {e}", self.name),
        }

        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            self.tick(Utc::now()).await;
        }
        info!("Scheduler {} stopped.", self.name);
    }

    /// Evaluate one tick of the loop at the given instant.
    pub async fn tick(&self, now: DateTime<Utc>) {
        if now.second() != 0 {
            return;
        }
        let jobs = match self.registry.list_jobs() {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Failed to read the scheduled job list: {e}");
                return;
            }
        };
        for job in jobs {
            if !is_due(job.interval, now) {
                continue;
            }
            if !job.enabled {
                debug!("The job {}.{} is disabled. Skipping.", job.module, job.name);
                continue;
            }
            let runner = {
                let runners = self.runners.read().await;
                runners
                    .get(&(job.module.clone(), job.name.clone()))
                    .cloned()
            };
            let Some(runner) = runner else {
                // Module not currently loaded: equivalent to disabled.
                debug!(
                    "The job {}.{} has no loaded module. Skipping.",
                    job.module, job.name
                );
                continue;
            };
            info!("Executing the job {}.{}.", job.module, job.name);
            if let Err(e) = runner().await {
                error!("Failed to execute the job {}.{}: {e}", job.module, job.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicU32;

    fn counting_runner(counter: Arc<AtomicU32>) -> JobRunner {
        Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, second).unwrap()
    }

    #[test]
    fn test_hourly_job_fires_at_minute_zero_only() {
        assert!(is_due(60, at(9, 0, 0)));
        assert!(!is_due(60, at(9, 30, 0)));
        assert!(!is_due(60, at(9, 0, 30)));
    }

    #[test]
    fn test_five_minute_interval() {
        assert!(is_due(5, at(9, 0, 0)));
        assert!(is_due(5, at(9, 5, 0)));
        assert!(is_due(5, at(9, 55, 0)));
        assert!(!is_due(5, at(9, 7, 0)));
    }

    #[test]
    fn test_zero_interval_never_due() {
        assert!(!is_due(0, at(9, 0, 0)));
    }

    #[tokio::test]
    async fn test_add_job_round_trip() {
        let registry = Arc::new(Registry::open_in_memory().unwrap());
        let scheduler = Scheduler::new("main", registry.clone());
        let counter = Arc::new(AtomicU32::new(0));

        let job = scheduler
            .add_job("extras", "refresh", 5, counting_runner(counter))
            .await
            .unwrap();
        assert!(job.enabled);

        let fetched = registry.get_job_by_name("extras", "refresh").unwrap().unwrap();
        assert_eq!(fetched.interval, 5);
        assert!(fetched.enabled);
    }

    #[tokio::test]
    async fn test_tick_runs_due_jobs() {
        let registry = Arc::new(Registry::open_in_memory().unwrap());
        let scheduler = Scheduler::new("main", registry);
        let counter = Arc::new(AtomicU32::new(0));
        scheduler
            .add_job("extras", "refresh", 5, counting_runner(counter.clone()))
            .await
            .unwrap();

        scheduler.tick(at(9, 5, 0)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Not on the interval, and not at second zero
        scheduler.tick(at(9, 6, 0)).await;
        scheduler.tick(at(9, 10, 30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tick_skips_disabled_jobs() {
        let registry = Arc::new(Registry::open_in_memory().unwrap());
        let scheduler = Scheduler::new("main", registry.clone());
        let counter = Arc::new(AtomicU32::new(0));
        let job = scheduler
            .add_job("extras", "refresh", 5, counting_runner(counter.clone()))
            .await
            .unwrap();
        scheduler.set_enabled(job.id, false).unwrap();

        scheduler.tick(at(9, 5, 0)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tick_skips_jobs_without_runner() {
        let registry = Arc::new(Registry::open_in_memory().unwrap());
        // Row exists but no module registered a runner for it
        registry.upsert_job("ghost", "orphan", 1).unwrap();
        let scheduler = Scheduler::new("main", registry);

        // Must not panic or error the loop
        scheduler.tick(at(9, 0, 0)).await;
    }

    #[tokio::test]
    async fn test_job_failure_does_not_stop_other_jobs() {
        let registry = Arc::new(Registry::open_in_memory().unwrap());
        let scheduler = Scheduler::new("main", registry);
        let counter = Arc::new(AtomicU32::new(0));

        scheduler
            .add_job(
                "extras",
                "boom",
                1,
                Arc::new(|| Box::pin(async { anyhow::bail!("exploded") })),
            )
            .await
            .unwrap();
        scheduler
            .add_job("extras", "refresh", 1, counting_runner(counter.clone()))
            .await
            .unwrap();

        scheduler.tick(at(9, 0, 0)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_now_bypasses_interval() {
        let registry = Arc::new(Registry::open_in_memory().unwrap());
        let scheduler = Scheduler::new("main", registry);
        let counter = Arc::new(AtomicU32::new(0));
        let job = scheduler
            .add_job("extras", "refresh", 60, counting_runner(counter.clone()))
            .await
            .unwrap();

        let ran = scheduler.run_now(job.id).await.unwrap();
        assert_eq!(ran.name, "refresh");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_now_unknown_id() {
        let registry = Arc::new(Registry::open_in_memory().unwrap());
        let scheduler = Scheduler::new("main", registry);
        assert!(matches!(
            scheduler.run_now(99).await,
            Err(SchedulerError::NotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_run_now_module_not_loaded() {
        let registry = Arc::new(Registry::open_in_memory().unwrap());
        let job = registry.upsert_job("ghost", "orphan", 1).unwrap();
        let scheduler = Scheduler::new("main", registry);
        assert!(matches!(
            scheduler.run_now(job.id).await,
            Err(SchedulerError::ModuleNotLoaded { .. })
        ));
    }

    #[tokio::test]
    async fn test_prune_module_jobs_preserves_declared() {
        let registry = Arc::new(Registry::open_in_memory().unwrap());
        let scheduler = Scheduler::new("main", registry.clone());
        let counter = Arc::new(AtomicU32::new(0));

        let kept = scheduler
            .add_job("extras", "refresh", 5, counting_runner(counter.clone()))
            .await
            .unwrap();
        scheduler.set_enabled(kept.id, false).unwrap();
        scheduler
            .add_job("extras", "old_name", 5, counting_runner(counter))
            .await
            .unwrap();

        let removed = scheduler
            .prune_module_jobs("extras", &["refresh".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);

        // The surviving job kept its operator-toggled enabled flag
        let survivor = registry.get_job_by_name("extras", "refresh").unwrap().unwrap();
        assert!(!survivor.enabled);
        assert!(registry.get_job_by_name("extras", "old_name").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_jobs_for_module() {
        let registry = Arc::new(Registry::open_in_memory().unwrap());
        let scheduler = Scheduler::new("main", registry.clone());
        let counter = Arc::new(AtomicU32::new(0));
        scheduler
            .add_job("extras", "refresh", 5, counting_runner(counter.clone()))
            .await
            .unwrap();

        assert_eq!(scheduler.delete_jobs_for_module("extras").await.unwrap(), 1);
        assert!(registry.list_jobs().unwrap().is_empty());

        // Runner gone too: tick is a no-op
        scheduler.tick(at(9, 5, 0)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
