//! Remainder-fair distribution of tasks over an agent roster.
//!
//! With `n` tasks and `m` agents every agent gets `n / m` tasks and the first
//! `n % m` agents in roster order get one more. Tasks are handed out in file
//! order, one agent's quota at a time.

use super::PipelineError;
use super::record::{AgentRef, TaskRecord};

/// Tasks assigned to one roster agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub agent: AgentRef,
    pub tasks: Vec<TaskRecord>,
}

/// Roster-ordered assignments covering every agent, including those with an
/// empty quota.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    assignments: Vec<Assignment>,
}

impl Distribution {
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn total_tasks(&self) -> usize {
        self.assignments.iter().map(|a| a.tasks.len()).sum()
    }

    /// Per-agent task counts in roster order.
    pub fn counts(&self) -> Vec<usize> {
        self.assignments.iter().map(|a| a.tasks.len()).collect()
    }

    /// All tasks in assignment order, each tagged with its agent.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        self.assignments.iter().flat_map(|a| a.tasks.iter())
    }
}

/// Quota per roster position for `n` tasks over `m` agents.
pub fn quotas(n: usize, m: usize) -> Vec<usize> {
    if m == 0 {
        return Vec::new();
    }
    let base = n / m;
    let rem = n % m;
    (0..m).map(|i| base + usize::from(i < rem)).collect()
}

/// Assign every task to exactly one agent.
pub fn distribute(tasks: Vec<TaskRecord>, roster: &[AgentRef]) -> Result<Distribution, PipelineError> {
    if tasks.is_empty() {
        return Err(PipelineError::NoTasks);
    }
    if roster.is_empty() {
        return Err(PipelineError::NoAgents);
    }

    let n = tasks.len();
    let mut remaining = tasks.into_iter();
    let assignments = roster
        .iter()
        .zip(quotas(n, roster.len()))
        .map(|(agent, quota)| {
            let tasks = remaining
                .by_ref()
                .take(quota)
                .map(|mut task| {
                    task.assigned_agent_id = Some(agent.id.clone());
                    task
                })
                .collect();
            Assignment {
                agent: agent.clone(),
                tasks,
            }
        })
        .collect();

    Ok(Distribution { assignments })
}
