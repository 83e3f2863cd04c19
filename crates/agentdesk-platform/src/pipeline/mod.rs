//! Task ingestion pipeline: parse → distribute → persist → regroup.
//!
//! One upload runs the stages strictly in order. The roster is fetched once
//! and reused by the distributor and the responder, so a concurrent agent
//! change never splits a batch across two roster views.

pub mod distributor;
pub mod parser;
pub mod persister;
pub mod record;
pub mod responder;

use agentdesk_core::DeskError;
use serde::Serialize;
use thiserror::Error;

pub use distributor::{Assignment, Distribution, distribute};
pub use parser::{FileFormat, ParsedUpload, parse_upload};
pub use persister::{TaskStore, persist};
pub use record::{AgentId, AgentRef, CellValue, PersistedTask, RawRecord, TaskRecord};
pub use responder::{AgentTasks, group_by_agent};

/// Failure kinds of an upload. Each stage fails fast; nothing is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request carried no `file` part.
    #[error("no file uploaded")]
    NoFile,

    #[error("unsupported file format: {0:?}")]
    UnsupportedFormat(String),

    #[error("failed to parse {format} upload: {reason}")]
    ParseFailure { format: FileFormat, reason: String },

    /// Zero rows survived validation.
    #[error("no valid tasks found in the file")]
    NoTasks,

    /// The tenant has no active agents.
    #[error("no active agents for this admin")]
    NoAgents,

    #[error("failed to persist batch: {0}")]
    PersistFailure(#[source] DeskError),
}

impl PipelineError {
    /// Message safe to show the uploader. Parse and storage details stay in
    /// the server log.
    pub fn client_message(&self) -> &'static str {
        match self {
            PipelineError::NoFile => "No file uploaded",
            PipelineError::UnsupportedFormat(_) => "Only CSV, XLSX, and XLS files are allowed",
            PipelineError::ParseFailure { .. } | PipelineError::PersistFailure(_) => {
                "Error processing file"
            }
            PipelineError::NoTasks => "No valid tasks found in the file",
            PipelineError::NoAgents => "No active agents found. Please create agents first.",
        }
    }

    /// True for errors the uploader can fix themselves.
    pub fn is_user_correctable(&self) -> bool {
        !matches!(
            self,
            PipelineError::ParseFailure { .. } | PipelineError::PersistFailure(_)
        )
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub total_tasks: usize,
    pub agents_count: usize,
    pub tasks_by_agent: Vec<AgentTasks>,
}

/// Distribute parsed tasks across the tenant's active roster, store them and
/// build the agent-grouped view.
pub fn distribute_and_store<S: TaskStore + ?Sized>(
    store: &S,
    tenant_id: &str,
    tasks: Vec<TaskRecord>,
) -> Result<UploadSummary, PipelineError> {
    if tasks.is_empty() {
        return Err(PipelineError::NoTasks);
    }

    let roster = store
        .fetch_active_agents(tenant_id)
        .map_err(PipelineError::PersistFailure)?;
    tracing::debug!(
        "pipeline[{tenant_id}]: {} tasks, roster of {} agents",
        tasks.len(),
        roster.len()
    );

    let distribution = distribute(tasks, &roster)?;
    let total_tasks = distribution.total_tasks();
    let saved = persist(store, &distribution)?;

    Ok(UploadSummary {
        total_tasks,
        agents_count: roster.len(),
        tasks_by_agent: group_by_agent(&roster, &saved),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory `TaskStore` for stage tests.

    use super::*;
    use agentdesk_core::Result;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct MemoryStore {
        pub roster: Vec<AgentRef>,
        pub tasks: RefCell<Vec<PersistedTask>>,
        pub counts: RefCell<HashMap<AgentId, u64>>,
        pub fail_insert: bool,
        pub fail_increment: bool,
        pub roster_fetches: RefCell<usize>,
    }

    impl MemoryStore {
        pub fn with_agents(names: &[&str]) -> Self {
            Self {
                roster: names
                    .iter()
                    .map(|n| AgentRef::new(format!("id-{n}"), *n))
                    .collect(),
                ..Default::default()
            }
        }

        pub fn count(&self, name: &str) -> u64 {
            self.counts
                .borrow()
                .get(&AgentId::new(format!("id-{name}")))
                .copied()
                .unwrap_or(0)
        }
    }

    impl TaskStore for MemoryStore {
        fn fetch_active_agents(&self, _tenant_id: &str) -> Result<Vec<AgentRef>> {
            *self.roster_fetches.borrow_mut() += 1;
            Ok(self.roster.clone())
        }

        fn insert_tasks(&self, tasks: &[TaskRecord]) -> Result<Vec<PersistedTask>> {
            if self.fail_insert {
                return Err(DeskError::database("Insert tasks: disk I/O error"));
            }
            let mut stored = self.tasks.borrow_mut();
            let mut saved = Vec::with_capacity(tasks.len());
            for task in tasks {
                let Some(agent) = task.assigned_agent_id.clone() else {
                    return Err(DeskError::database("unassigned task"));
                };
                let persisted = PersistedTask {
                    id: format!("task-{}", stored.len() + saved.len()),
                    first_name: task.first_name.clone(),
                    phone: task.phone.clone(),
                    notes: task.notes.clone(),
                    assigned_agent_id: agent,
                };
                saved.push(persisted);
            }
            stored.extend(saved.iter().cloned());
            Ok(saved)
        }

        fn increment_assigned_count(&self, agent_id: &AgentId, delta: u64) -> Result<()> {
            if self.fail_increment {
                return Err(DeskError::database("Increment task count: database is locked"));
            }
            *self.counts.borrow_mut().entry(agent_id.clone()).or_insert(0) += delta;
            Ok(())
        }
    }

    pub fn tasks(n: usize) -> Vec<TaskRecord> {
        (0..n)
            .map(|i| TaskRecord::new(format!("Name{i}"), format!("555-{i:04}"), ""))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{MemoryStore, tasks};
    use super::*;

    #[test]
    fn test_five_tasks_three_agents() {
        let store = MemoryStore::with_agents(&["A", "B", "C"]);
        let summary = distribute_and_store(&store, "admin-1", tasks(5)).unwrap();

        assert_eq!(summary.total_tasks, 5);
        assert_eq!(summary.agents_count, 3);
        let sizes: Vec<usize> = summary.tasks_by_agent.iter().map(|g| g.tasks.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(store.count("A"), 2);
        assert_eq!(store.count("C"), 1);
        assert_eq!(*store.roster_fetches.borrow(), 1);
    }

    #[test]
    fn test_no_tasks_skips_roster_fetch() {
        let store = MemoryStore::with_agents(&["A"]);
        let err = distribute_and_store(&store, "admin-1", Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::NoTasks));
        assert_eq!(*store.roster_fetches.borrow(), 0);
    }

    #[test]
    fn test_no_agents_persists_nothing() {
        let store = MemoryStore::default();
        let err = distribute_and_store(&store, "admin-1", tasks(3)).unwrap_err();
        assert!(matches!(err, PipelineError::NoAgents));
        assert!(store.tasks.borrow().is_empty());
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let store = MemoryStore::with_agents(&["A", "B"]);
        let input = vec![
            TaskRecord::new("Ana", "5551234567", "VIP"),
            TaskRecord::new("Bo", "555-0101", ""),
            TaskRecord::new("Cy", "+44 20 7946 0000", "call back"),
        ];
        let summary = distribute_and_store(&store, "admin-1", input.clone()).unwrap();

        let mut seen: Vec<(String, String, String)> = summary
            .tasks_by_agent
            .iter()
            .flat_map(|g| g.tasks.iter())
            .map(|t| (t.first_name.clone(), t.phone.clone(), t.notes.clone()))
            .collect();
        seen.sort();
        let mut expected: Vec<(String, String, String)> = input
            .into_iter()
            .map(|t| (t.first_name, t.phone, t.notes))
            .collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_client_messages() {
        assert_eq!(
            PipelineError::NoAgents.client_message(),
            "No active agents found. Please create agents first."
        );
        let parse = PipelineError::ParseFailure {
            format: FileFormat::Csv,
            reason: "invalid UTF-8 in record 3".into(),
        };
        assert_eq!(parse.client_message(), "Error processing file");
        assert!(!parse.is_user_correctable());
        assert!(PipelineError::NoTasks.is_user_correctable());
    }
}
