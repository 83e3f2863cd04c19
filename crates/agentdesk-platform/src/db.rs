//! Platform database: SQLite schema for admins, agents and tasks.

use crate::pipeline::{AgentId, AgentRef, PersistedTask, TaskRecord, TaskStore};
use agentdesk_core::{DeskError, Result};
use rusqlite::{Connection, params};
use std::path::Path;

/// Millisecond UTC timestamp, used as the default for every `*_at` column.
const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ','now')";

/// Platform database manager.
pub struct PlatformDb {
    conn: Connection,
}

/// Admin (tenant) record.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Admin {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

/// Agent record, serialized the way the dashboard reads it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub admin_id: String,
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    pub country_code: String,
    pub is_active: bool,
    pub assigned_tasks_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for a new agent.
#[derive(Debug, Clone)]
pub struct NewAgent<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub mobile_number: &'a str,
    pub country_code: &'a str,
}

/// Partial agent edit; `None` leaves the column as is.
#[derive(Debug, Clone, Default)]
pub struct AgentPatch<'a> {
    pub name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub mobile_number: Option<&'a str>,
    pub country_code: Option<&'a str>,
}

/// Stored task as returned by the task queries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskRow {
    pub id: String,
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Notes")]
    pub notes: String,
    #[serde(rename = "assignedAgentId")]
    pub assigned_agent_id: String,
    #[serde(rename = "batchId")]
    pub batch_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// Agent fields attached to each row of the tenant-wide task listing.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentContact {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Audit log entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub event_type: String,
    pub actor_id: String,
    pub details: Option<String>,
    pub created_at: String,
}

/// Shared SELECT column list for agent queries.
const AGENT_SELECT: &str = "SELECT id,admin_id,name,email,mobile_number,country_code,is_active,assigned_tasks_count,created_at,updated_at FROM agents";

const TASK_COLUMNS: &str = "t.id,t.first_name,t.phone,t.notes,t.assigned_agent_id,t.batch_id,t.created_at";

fn row_to_agent(row: &rusqlite::Row) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?, admin_id: row.get(1)?, name: row.get(2)?, email: row.get(3)?,
        mobile_number: row.get(4)?, country_code: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
        assigned_tasks_count: row.get::<_, i64>(7)?.max(0) as u64,
        created_at: row.get(8)?, updated_at: row.get(9)?,
    })
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?, first_name: row.get(1)?, phone: row.get(2)?, notes: row.get(3)?,
        assigned_agent_id: row.get(4)?, batch_id: row.get(5)?, created_at: row.get(6)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
}

impl PlatformDb {
    /// Open or create the platform database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DeskError::database(format!("DB open error: {e}")))?;

        // WAL lets readers proceed while an upload batch is being written.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| DeskError::database(format!("DB pragma error: {e}")))?;

        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database, for tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(&format!(
                "
            CREATE TABLE IF NOT EXISTS admins (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL DEFAULT ({NOW})
            );

            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                admin_id TEXT NOT NULL,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                mobile_number TEXT NOT NULL,
                country_code TEXT NOT NULL DEFAULT '+1',
                is_active INTEGER NOT NULL DEFAULT 1,
                assigned_tasks_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT ({NOW}),
                updated_at TEXT NOT NULL DEFAULT ({NOW})
            );
            CREATE INDEX IF NOT EXISTS idx_agents_admin ON agents(admin_id, is_active);

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                phone TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                assigned_agent_id TEXT NOT NULL,
                batch_id TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT ({NOW})
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_agent ON tasks(assigned_agent_id);

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                details TEXT,
                created_at TEXT NOT NULL DEFAULT ({NOW})
            );
        "
            ))
            .map_err(|e| DeskError::database(format!("Migration error: {e}")))?;
        Ok(())
    }

    // ── Admins ────────────────────────────────────

    /// Create an admin (tenant).
    pub fn create_admin(&self, name: &str, email: &str) -> Result<Admin> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO admins (id, name, email) VALUES (?1,?2,?3)",
                params![id, name, email],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DeskError::Conflict(format!("admin {email} already exists"))
                } else {
                    DeskError::database(format!("Create admin: {e}"))
                }
            })?;
        self.get_admin(&id)?
            .ok_or_else(|| DeskError::database(format!("Admin {id} vanished after insert")))
    }

    pub fn get_admin(&self, id: &str) -> Result<Option<Admin>> {
        self.query_admin("SELECT id,name,email,created_at FROM admins WHERE id=?1", id)
    }

    pub fn get_admin_by_email(&self, email: &str) -> Result<Option<Admin>> {
        self.query_admin("SELECT id,name,email,created_at FROM admins WHERE email=?1", email)
    }

    fn query_admin(&self, sql: &str, key: &str) -> Result<Option<Admin>> {
        match self.conn.query_row(sql, params![key], |row| {
            Ok(Admin {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                created_at: row.get(3)?,
            })
        }) {
            Ok(a) => Ok(Some(a)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DeskError::database(format!("Get admin: {e}"))),
        }
    }

    // ── Agents ────────────────────────────────────

    /// Create an agent owned by `admin_id`.
    pub fn create_agent(&self, admin_id: &str, agent: &NewAgent<'_>) -> Result<Agent> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO agents (id, admin_id, name, email, mobile_number, country_code) VALUES (?1,?2,?3,?4,?5,?6)",
                params![id, admin_id, agent.name, agent.email, agent.mobile_number, agent.country_code],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DeskError::Conflict(format!("agent {} already exists", agent.email))
                } else {
                    DeskError::database(format!("Insert agent: {e}"))
                }
            })?;
        self.get_agent(admin_id, &id)?
            .ok_or_else(|| DeskError::database(format!("Agent {id} vanished after insert")))
    }

    /// True when any agent (of any admin) uses `email`.
    pub fn is_agent_email_taken(&self, email: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM agents WHERE email=?1", params![email], |row| row.get(0))
            .map_err(|e| DeskError::database(format!("Check agent email: {e}")))?;
        Ok(count > 0)
    }

    /// Get an agent, scoped to its owner.
    pub fn get_agent(&self, admin_id: &str, id: &str) -> Result<Option<Agent>> {
        match self.conn.query_row(
            &format!("{AGENT_SELECT} WHERE id=?1 AND admin_id=?2"),
            params![id, admin_id],
            row_to_agent,
        ) {
            Ok(a) => Ok(Some(a)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DeskError::database(format!("Get agent: {e}"))),
        }
    }

    /// All agents of an admin, newest first.
    pub fn list_agents(&self, admin_id: &str) -> Result<Vec<Agent>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{AGENT_SELECT} WHERE admin_id=?1 ORDER BY created_at DESC, rowid DESC"
            ))
            .map_err(|e| DeskError::database(format!("Prepare: {e}")))?;

        let agents = stmt
            .query_map(params![admin_id], row_to_agent)
            .map_err(|e| DeskError::database(format!("Query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DeskError::database(format!("Read agent: {e}")))?;
        Ok(agents)
    }

    /// Apply a partial edit. Returns `None` when the agent is not the admin's.
    pub fn update_agent(&self, admin_id: &str, id: &str, patch: &AgentPatch<'_>) -> Result<Option<Agent>> {
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE agents SET
                       name=COALESCE(?1,name),
                       email=COALESCE(?2,email),
                       mobile_number=COALESCE(?3,mobile_number),
                       country_code=COALESCE(?4,country_code),
                       updated_at={NOW}
                     WHERE id=?5 AND admin_id=?6"
                ),
                params![patch.name, patch.email, patch.mobile_number, patch.country_code, id, admin_id],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DeskError::Conflict("agent email already in use".into())
                } else {
                    DeskError::database(format!("Update agent: {e}"))
                }
            })?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_agent(admin_id, id)
    }

    /// Activate or deactivate an agent.
    pub fn set_agent_active(&self, admin_id: &str, id: &str, active: bool) -> Result<Option<Agent>> {
        let changed = self
            .conn
            .execute(
                &format!("UPDATE agents SET is_active=?1, updated_at={NOW} WHERE id=?2 AND admin_id=?3"),
                params![active as i64, id, admin_id],
            )
            .map_err(|e| DeskError::database(format!("Update agent status: {e}")))?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_agent(admin_id, id)
    }

    /// Delete an agent. Its tasks stay in place.
    pub fn delete_agent(&self, admin_id: &str, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM agents WHERE id=?1 AND admin_id=?2",
                params![id, admin_id],
            )
            .map_err(|e| DeskError::database(format!("Delete agent: {e}")))?;
        Ok(changed > 0)
    }

    // ── Tasks ────────────────────────────────────

    /// Tasks assigned to one agent, newest first.
    pub fn tasks_for_agent(&self, agent_id: &str) -> Result<Vec<TaskRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks t WHERE t.assigned_agent_id=?1 ORDER BY t.created_at DESC, t.rowid DESC"
            ))
            .map_err(|e| DeskError::database(format!("Prepare: {e}")))?;

        let tasks = stmt
            .query_map(params![agent_id], row_to_task)
            .map_err(|e| DeskError::database(format!("Query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DeskError::database(format!("Read task: {e}")))?;
        Ok(tasks)
    }

    /// Every task assigned to any of the admin's agents, newest first, with
    /// the agent's contact fields.
    pub fn tasks_for_admin(&self, admin_id: &str) -> Result<Vec<(TaskRow, AgentContact)>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {TASK_COLUMNS}, a.id, a.name, a.email
                 FROM tasks t JOIN agents a ON a.id = t.assigned_agent_id
                 WHERE a.admin_id=?1
                 ORDER BY t.created_at DESC, t.rowid DESC"
            ))
            .map_err(|e| DeskError::database(format!("Prepare: {e}")))?;

        let rows = stmt
            .query_map(params![admin_id], |row| {
                let task = row_to_task(row)?;
                let agent = AgentContact {
                    id: row.get(7)?,
                    name: row.get(8)?,
                    email: row.get(9)?,
                };
                Ok((task, agent))
            })
            .map_err(|e| DeskError::database(format!("Query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DeskError::database(format!("Read task: {e}")))?;
        Ok(rows)
    }

    // ── Audit Log ────────────────────────────────────

    /// Log an audit event.
    pub fn log_event(&self, event_type: &str, actor_id: &str, details: Option<&str>) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO audit_log (event_type, actor_id, details) VALUES (?1,?2,?3)",
                params![event_type, actor_id, details],
            )
            .map_err(|e| DeskError::database(format!("Log event: {e}")))?;
        Ok(())
    }

    /// Get recent audit entries, newest first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id,event_type,actor_id,details,created_at FROM audit_log ORDER BY id DESC LIMIT ?1")
            .map_err(|e| DeskError::database(format!("Prepare: {e}")))?;

        let entries = stmt
            .query_map(params![limit as i64], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    event_type: row.get(1)?,
                    actor_id: row.get(2)?,
                    details: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .map_err(|e| DeskError::database(format!("Query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DeskError::database(format!("Read audit entry: {e}")))?;
        Ok(entries)
    }
}

impl TaskStore for PlatformDb {
    fn fetch_active_agents(&self, tenant_id: &str) -> Result<Vec<AgentRef>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name FROM agents WHERE admin_id=?1 AND is_active=1 ORDER BY created_at DESC, rowid DESC",
            )
            .map_err(|e| DeskError::database(format!("Prepare: {e}")))?;

        let roster = stmt
            .query_map(params![tenant_id], |row| {
                Ok(AgentRef::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| DeskError::database(format!("Query roster: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DeskError::database(format!("Read roster: {e}")))?;
        Ok(roster)
    }

    fn insert_tasks(&self, tasks: &[TaskRecord]) -> Result<Vec<PersistedTask>> {
        let batch_id = uuid::Uuid::new_v4().to_string();
        // Dropping the transaction without commit rolls the batch back.
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| DeskError::database(format!("Begin batch: {e}")))?;

        let mut saved = Vec::with_capacity(tasks.len());
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO tasks (id, first_name, phone, notes, assigned_agent_id, batch_id) VALUES (?1,?2,?3,?4,?5,?6)",
                )
                .map_err(|e| DeskError::database(format!("Prepare: {e}")))?;

            for task in tasks {
                let agent_id = task.assigned_agent_id.clone().ok_or_else(|| {
                    DeskError::database(format!("Refusing to store unassigned task '{}'", task.first_name))
                })?;
                let id = uuid::Uuid::new_v4().to_string();
                stmt.execute(params![id, task.first_name, task.phone, task.notes, agent_id.as_str(), batch_id])
                    .map_err(|e| DeskError::database(format!("Insert task: {e}")))?;
                saved.push(PersistedTask {
                    id,
                    first_name: task.first_name.clone(),
                    phone: task.phone.clone(),
                    notes: task.notes.clone(),
                    assigned_agent_id: agent_id,
                });
            }
        }

        tx.commit()
            .map_err(|e| DeskError::database(format!("Commit batch: {e}")))?;
        Ok(saved)
    }

    fn increment_assigned_count(&self, agent_id: &AgentId, delta: u64) -> Result<()> {
        let delta = i64::try_from(delta)
            .map_err(|_| DeskError::database(format!("Counter delta {delta} out of range")))?;
        self.conn
            .execute(
                &format!(
                    "UPDATE agents SET assigned_tasks_count = assigned_tasks_count + ?1, updated_at={NOW} WHERE id=?2"
                ),
                params![delta, agent_id.as_str()],
            )
            .map_err(|e| DeskError::database(format!("Increment task count: {e}")))?;
        Ok(())
    }
}
