//! Persister: the only pipeline stage that writes.
//!
//! Tasks go in as one batch first. Agent counters are bumped only after the
//! batch is stored, one atomic `count += delta` per agent.

use super::PipelineError;
use super::distributor::Distribution;
use super::record::{AgentId, AgentRef, PersistedTask, TaskRecord};
use agentdesk_core::{DeskError, Result};

/// Storage seam for the pipeline.
pub trait TaskStore {
    /// Active agents of `tenant_id`, newest first. Read once per upload.
    fn fetch_active_agents(&self, tenant_id: &str) -> Result<Vec<AgentRef>>;

    /// Insert all tasks or none. Returned tasks keep the input order.
    fn insert_tasks(&self, tasks: &[TaskRecord]) -> Result<Vec<PersistedTask>>;

    /// Add `delta` to the agent's assigned-task counter in place.
    fn increment_assigned_count(&self, agent_id: &AgentId, delta: u64) -> Result<()>;
}

/// Store a distribution and bump per-agent counters.
pub fn persist<S: TaskStore + ?Sized>(
    store: &S,
    distribution: &Distribution,
) -> std::result::Result<Vec<PersistedTask>, PipelineError> {
    let mut batch = Vec::with_capacity(distribution.total_tasks());
    for assignment in distribution.assignments() {
        for task in &assignment.tasks {
            if task.assigned_agent_id.as_ref() != Some(&assignment.agent.id) {
                return Err(PipelineError::PersistFailure(DeskError::database(format!(
                    "task '{}' is not assigned to agent {}",
                    task.first_name, assignment.agent.id
                ))));
            }
            batch.push(task.clone());
        }
    }

    let saved = store
        .insert_tasks(&batch)
        .map_err(PipelineError::PersistFailure)?;

    for assignment in distribution.assignments() {
        let delta = assignment.tasks.len() as u64;
        if delta == 0 {
            continue;
        }
        store
            .increment_assigned_count(&assignment.agent.id, delta)
            .map_err(PipelineError::PersistFailure)?;
    }

    tracing::debug!("persister: stored {} tasks", saved.len());
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::distribute;
    use crate::pipeline::testing::{MemoryStore, tasks};

    #[test]
    fn test_counters_follow_quotas() {
        let store = MemoryStore::with_agents(&["A", "B", "C"]);
        let d = distribute(tasks(7), &store.roster).unwrap();
        let saved = persist(&store, &d).unwrap();

        assert_eq!(saved.len(), 7);
        assert_eq!(store.count("A"), 3);
        assert_eq!(store.count("B"), 2);
        assert_eq!(store.count("C"), 2);
    }

    #[test]
    fn test_counters_accumulate_across_batches() {
        let store = MemoryStore::with_agents(&["A", "B"]);
        persist(&store, &distribute(tasks(3), &store.roster).unwrap()).unwrap();
        persist(&store, &distribute(tasks(3), &store.roster).unwrap()).unwrap();
        assert_eq!(store.count("A"), 4);
        assert_eq!(store.count("B"), 2);
        assert_eq!(store.tasks.borrow().len(), 6);
    }

    #[test]
    fn test_zero_quota_agents_untouched() {
        let store = MemoryStore::with_agents(&["A", "B", "C"]);
        persist(&store, &distribute(tasks(1), &store.roster).unwrap()).unwrap();
        assert!(!store.counts.borrow().contains_key(&AgentId::new("id-B")));
        assert!(!store.counts.borrow().contains_key(&AgentId::new("id-C")));
    }

    #[test]
    fn test_insert_failure_skips_counters() {
        let store = MemoryStore {
            fail_insert: true,
            ..MemoryStore::with_agents(&["A", "B"])
        };
        let d = distribute(tasks(4), &store.roster).unwrap();
        let err = persist(&store, &d).unwrap_err();

        assert!(matches!(err, PipelineError::PersistFailure(_)));
        assert!(store.counts.borrow().is_empty());
        assert!(store.tasks.borrow().is_empty());
    }

    #[test]
    fn test_increment_failure_keeps_inserted_tasks() {
        let store = MemoryStore {
            fail_increment: true,
            ..MemoryStore::with_agents(&["A", "B"])
        };
        let d = distribute(tasks(2), &store.roster).unwrap();
        let err = persist(&store, &d).unwrap_err();

        assert!(matches!(err, PipelineError::PersistFailure(_)));
        assert_eq!(err.client_message(), "Error processing file");
        assert_eq!(store.tasks.borrow().len(), 2);
        assert!(store.counts.borrow().is_empty());
    }
}
