//! relaybot-registry: SQLite persistence for modules, commands, and jobs.
//!
//! Holds the durable half of the bot's state: which modules exist and are
//! enabled, which commands they declare, the operator-toggled per-command
//! settings, scheduled job rows, admins, and last-seen tracking. All
//! business logic lives in the engine; this crate is pure data access.

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, Row};

use relaybot_types::{AdminRecord, CommandRecord, CommandSpec, JobRecord, ModuleRecord, Scope, SeenRecord};

/// A persistence-layer failure, tagged with the operation that failed.
///
/// Callers treat these as fatal to the current request or job, never to
/// the process.
#[derive(Debug, thiserror::Error)]
#[error("storage operation {op} failed: {source}")]
pub struct StorageError {
    pub op: &'static str,
    #[source]
    pub source: rusqlite::Error,
}

pub type Result<T> = std::result::Result<T, StorageError>;

trait OpContext<T> {
    fn for_op(self, op: &'static str) -> Result<T>;
}

impl<T> OpContext<T> for rusqlite::Result<T> {
    fn for_op(self, op: &'static str) -> Result<T> {
        self.map_err(|source| StorageError { op, source })
    }
}

/// SQLite-backed registry store.
///
/// Reads never mutate state and are safe to call from both the dispatcher
/// and scheduler tasks; the connection mutex serializes conflicting writes.
pub struct Registry {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS modules (
        module TEXT PRIMARY KEY,
        enabled INTEGER NOT NULL DEFAULT 0,
        can_be_disabled INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS commands (
        command TEXT PRIMARY KEY,
        description TEXT NOT NULL,
        usage TEXT NOT NULL,
        is_admin INTEGER NOT NULL DEFAULT 0,
        can_be_disabled INTEGER NOT NULL DEFAULT 1,
        module TEXT NOT NULL,
        method TEXT NOT NULL,
        scope TEXT NOT NULL DEFAULT 'all',
        monospace INTEGER NOT NULL DEFAULT 0,
        split_output INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS command_settings (
        command TEXT PRIMARY KEY REFERENCES commands(command) ON DELETE CASCADE,
        enabled INTEGER NOT NULL DEFAULT 1,
        hidden INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS scheduler (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        module TEXT NOT NULL,
        name TEXT NOT NULL,
        interval INTEGER NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        UNIQUE (module, name)
    );

    CREATE TABLE IF NOT EXISTS admins (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        real_name TEXT
    );

    CREATE TABLE IF NOT EXISTS seen (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        seen_time INTEGER NOT NULL,
        seen_channel TEXT NOT NULL
    );
";

impl Registry {
    /// Open or create the registry database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path).for_op("open")?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .for_op("open")?;
        conn.execute_batch(SCHEMA).for_op("open")?;
        tracing::info!("Registry opened: {}", db_path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().for_op("open")?;
        conn.execute_batch(SCHEMA).for_op("open")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ─── Modules ────────────────────────────────────────

    /// Insert a newly discovered module. Idempotent.
    pub fn add_module(&self, module: &str, enabled: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO modules (module, enabled, can_be_disabled) VALUES (?1, ?2, 1)",
            rusqlite::params![module, enabled as i64],
        )
        .for_op("add_module")?;
        Ok(())
    }

    pub fn get_module(&self, module: &str) -> Result<Option<ModuleRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT module, enabled, can_be_disabled FROM modules WHERE module = ?1",
            rusqlite::params![module],
            module_from_row,
        )
        .optional()
        .for_op("get_module")
    }

    pub fn list_modules(&self) -> Result<Vec<ModuleRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT module, enabled, can_be_disabled FROM modules ORDER BY enabled, module")
            .for_op("list_modules")?;
        let rows = stmt
            .query_map([], module_from_row)
            .for_op("list_modules")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .for_op("list_modules")?;
        Ok(rows)
    }

    /// Flip a module's enabled flag. Returns false if the module is unknown.
    pub fn set_module_enabled(&self, module: &str, enabled: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .execute(
                "UPDATE modules SET enabled = ?1 WHERE module = ?2",
                rusqlite::params![enabled as i64, module],
            )
            .for_op("set_module_enabled")?;
        Ok(count > 0)
    }

    /// Declare whether a module may be disabled by operators.
    pub fn set_module_can_be_disabled(&self, module: &str, can_be_disabled: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .execute(
                "UPDATE modules SET can_be_disabled = ?1 WHERE module = ?2",
                rusqlite::params![can_be_disabled as i64, module],
            )
            .for_op("set_module_can_be_disabled")?;
        Ok(count > 0)
    }

    /// Names of the commands currently registered under a module.
    pub fn module_commands(&self, module: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT command FROM commands WHERE module = ?1 ORDER BY command")
            .for_op("module_commands")?;
        let rows = stmt
            .query_map(rusqlite::params![module], |row| row.get(0))
            .for_op("module_commands")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .for_op("module_commands")?;
        Ok(rows)
    }

    // ─── Commands ───────────────────────────────────────

    /// Upsert a declared command and create its settings row if absent.
    ///
    /// One transaction: the command metadata always reflects the latest
    /// loaded code, while an existing settings row (operator overrides of
    /// enabled/hidden) is left untouched.
    pub fn upsert_command(&self, module: &str, name: &str, spec: &CommandSpec) -> Result<()> {
        let method = if spec.method.is_empty() {
            name
        } else {
            spec.method.as_str()
        };
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().for_op("upsert_command")?;
        tx.execute(
            "INSERT INTO commands
                (command, description, usage, is_admin, can_be_disabled, module, method, scope, monospace, split_output)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(command) DO UPDATE SET
                description = excluded.description,
                usage = excluded.usage,
                is_admin = excluded.is_admin,
                can_be_disabled = excluded.can_be_disabled,
                module = excluded.module,
                method = excluded.method,
                scope = excluded.scope,
                monospace = excluded.monospace,
                split_output = excluded.split_output",
            rusqlite::params![
                name,
                spec.description,
                spec.usage,
                spec.is_admin as i64,
                spec.can_be_disabled as i64,
                module,
                method,
                spec.scope.as_str(),
                spec.monospace as i64,
                spec.split_output as i64,
            ],
        )
        .for_op("upsert_command")?;
        tx.execute(
            "INSERT OR IGNORE INTO command_settings (command, enabled, hidden) VALUES (?1, 1, ?2)",
            rusqlite::params![name, spec.hidden as i64],
        )
        .for_op("upsert_command")?;
        tx.commit().for_op("upsert_command")?;
        Ok(())
    }

    /// Look up a command joined with its settings row.
    pub fn lookup_command(&self, name: &str) -> Result<Option<CommandRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT c.command, c.description, c.usage, c.is_admin, c.can_be_disabled,
                    c.module, c.method, c.scope, c.monospace, c.split_output,
                    s.enabled, s.hidden
             FROM commands c JOIN command_settings s ON c.command = s.command
             WHERE c.command = ?1",
            rusqlite::params![name],
            command_from_row,
        )
        .optional()
        .for_op("lookup_command")
    }

    /// All command names currently in the commands table.
    pub fn all_command_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT command FROM commands ORDER BY command")
            .for_op("all_command_names")?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .for_op("all_command_names")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .for_op("all_command_names")?;
        Ok(rows)
    }

    /// Delete command rows (settings cascade) for names no longer declared
    /// by any loaded module. Returns the number of rows removed.
    pub fn prune_commands(&self, names: &[String]) -> Result<usize> {
        if names.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = (1..=names.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("DELETE FROM commands WHERE command IN ({placeholders})");
        let count = conn
            .execute(&sql, rusqlite::params_from_iter(names.iter()))
            .for_op("prune_commands")?;
        Ok(count)
    }

    /// Flip a command's enabled override. Returns false if unknown.
    pub fn set_command_enabled(&self, name: &str, enabled: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .execute(
                "UPDATE command_settings SET enabled = ?1 WHERE command = ?2",
                rusqlite::params![enabled as i64, name],
            )
            .for_op("set_command_enabled")?;
        Ok(count > 0)
    }

    /// Flip a command's hidden override. Returns false if unknown.
    pub fn set_command_hidden(&self, name: &str, hidden: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .execute(
                "UPDATE command_settings SET hidden = ?1 WHERE command = ?2",
                rusqlite::params![hidden as i64, name],
            )
            .for_op("set_command_hidden")?;
        Ok(count > 0)
    }

    /// Enabled, non-hidden commands for help listings. Admin-only commands
    /// are excluded unless the caller is an admin.
    pub fn list_enabled_commands(&self, include_admin: bool) -> Result<Vec<CommandRecord>> {
        let conn = self.conn.lock().unwrap();
        let where_admin = if include_admin { "" } else { "AND c.is_admin = 0" };
        let sql = format!(
            "SELECT c.command, c.description, c.usage, c.is_admin, c.can_be_disabled,
                    c.module, c.method, c.scope, c.monospace, c.split_output,
                    s.enabled, s.hidden
             FROM commands c JOIN command_settings s ON c.command = s.command
             WHERE s.enabled = 1 AND s.hidden = 0 {where_admin}
             ORDER BY c.command"
        );
        let mut stmt = conn.prepare(&sql).for_op("list_enabled_commands")?;
        let rows = stmt
            .query_map([], command_from_row)
            .for_op("list_enabled_commands")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .for_op("list_enabled_commands")?;
        Ok(rows)
    }

    // ─── Scheduled jobs ─────────────────────────────────

    /// Insert or update a job keyed by (module, name).
    ///
    /// Re-registering an existing job updates the interval in place but
    /// preserves its id and operator-toggled enabled flag. New jobs start
    /// enabled.
    pub fn upsert_job(&self, module: &str, name: &str, interval: u32) -> Result<JobRecord> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO scheduler (module, name, interval, enabled) VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(module, name) DO UPDATE SET interval = excluded.interval",
            rusqlite::params![module, name, interval],
        )
        .for_op("upsert_job")?;
        conn.query_row(
            "SELECT id, module, name, interval, enabled FROM scheduler WHERE module = ?1 AND name = ?2",
            rusqlite::params![module, name],
            job_from_row,
        )
        .for_op("upsert_job")
    }

    pub fn get_job(&self, id: i64) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, module, name, interval, enabled FROM scheduler WHERE id = ?1",
            rusqlite::params![id],
            job_from_row,
        )
        .optional()
        .for_op("get_job")
    }

    pub fn get_job_by_name(&self, module: &str, name: &str) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, module, name, interval, enabled FROM scheduler WHERE module = ?1 AND name = ?2",
            rusqlite::params![module, name],
            job_from_row,
        )
        .optional()
        .for_op("get_job_by_name")
    }

    pub fn list_jobs(&self) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, module, name, interval, enabled FROM scheduler ORDER BY id")
            .for_op("list_jobs")?;
        let rows = stmt
            .query_map([], job_from_row)
            .for_op("list_jobs")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .for_op("list_jobs")?;
        Ok(rows)
    }

    /// Flip a job's enabled flag by id. Returns false if unknown.
    pub fn set_job_enabled(&self, id: i64, enabled: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .execute(
                "UPDATE scheduler SET enabled = ?1 WHERE id = ?2",
                rusqlite::params![enabled as i64, id],
            )
            .for_op("set_job_enabled")?;
        Ok(count > 0)
    }

    /// Delete a job by id. Returns false if unknown.
    pub fn delete_job(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .execute("DELETE FROM scheduler WHERE id = ?1", rusqlite::params![id])
            .for_op("delete_job")?;
        Ok(count > 0)
    }

    /// Delete every job owned by a module. Returns the number removed.
    pub fn delete_jobs_for_module(&self, module: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .execute(
                "DELETE FROM scheduler WHERE module = ?1",
                rusqlite::params![module],
            )
            .for_op("delete_jobs_for_module")?;
        Ok(count)
    }

    // ─── Admins ─────────────────────────────────────────

    pub fn get_admin(&self, id: &str) -> Result<Option<AdminRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, real_name FROM admins WHERE id = ?1",
            rusqlite::params![id],
            admin_from_row,
        )
        .optional()
        .for_op("get_admin")
    }

    pub fn get_admin_by_name(&self, name: &str) -> Result<Option<AdminRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, real_name FROM admins WHERE name = ?1",
            rusqlite::params![name],
            admin_from_row,
        )
        .optional()
        .for_op("get_admin_by_name")
    }

    pub fn list_admins(&self) -> Result<Vec<AdminRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, name, real_name FROM admins ORDER BY name")
            .for_op("list_admins")?;
        let rows = stmt
            .query_map([], admin_from_row)
            .for_op("list_admins")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .for_op("list_admins")?;
        Ok(rows)
    }

    pub fn grant_admin(&self, admin: &AdminRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO admins (id, name, real_name) VALUES (?1, ?2, ?3)",
            rusqlite::params![admin.id, admin.name, admin.real_name],
        )
        .for_op("grant_admin")?;
        Ok(())
    }

    /// Revoke admin access by username. Returns false if not an admin.
    pub fn revoke_admin(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .execute("DELETE FROM admins WHERE name = ?1", rusqlite::params![name])
            .for_op("revoke_admin")?;
        Ok(count > 0)
    }

    /// Whether a user id is in the admins table.
    pub fn is_admin(&self, id: &str) -> Result<bool> {
        Ok(self.get_admin(id)?.is_some())
    }

    // ─── Seen tracking ──────────────────────────────────

    pub fn update_seen(&self, id: &str, name: &str, channel: &str, seen_time: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO seen (id, name, seen_time, seen_channel) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, name, seen_time, channel],
        )
        .for_op("update_seen")?;
        Ok(())
    }

    pub fn get_seen_by_name(&self, name: &str) -> Result<Option<SeenRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, seen_time, seen_channel FROM seen WHERE name = ?1",
            rusqlite::params![name],
            |row| {
                Ok(SeenRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    seen_time: row.get(2)?,
                    seen_channel: row.get(3)?,
                })
            },
        )
        .optional()
        .for_op("get_seen_by_name")
    }
}

// ─── Row mappers ────────────────────────────────────────

fn module_from_row(row: &Row<'_>) -> rusqlite::Result<ModuleRecord> {
    Ok(ModuleRecord {
        module: row.get(0)?,
        enabled: row.get::<_, i64>(1)? != 0,
        can_be_disabled: row.get::<_, i64>(2)? != 0,
    })
}

fn command_from_row(row: &Row<'_>) -> rusqlite::Result<CommandRecord> {
    let scope_text: String = row.get(7)?;
    let scope = Scope::from_str(&scope_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(CommandRecord {
        command: row.get(0)?,
        description: row.get(1)?,
        usage: row.get(2)?,
        is_admin: row.get::<_, i64>(3)? != 0,
        can_be_disabled: row.get::<_, i64>(4)? != 0,
        module: row.get(5)?,
        method: row.get(6)?,
        scope,
        monospace: row.get::<_, i64>(8)? != 0,
        split_output: row.get::<_, i64>(9)? != 0,
        enabled: row.get::<_, i64>(10)? != 0,
        hidden: row.get::<_, i64>(11)? != 0,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        module: row.get(1)?,
        name: row.get(2)?,
        interval: row.get::<_, i64>(3)? as u32,
        enabled: row.get::<_, i64>(4)? != 0,
    })
}

fn admin_from_row(row: &Row<'_>) -> rusqlite::Result<AdminRecord> {
    Ok(AdminRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        real_name: row.get(2)?,
    })
}
