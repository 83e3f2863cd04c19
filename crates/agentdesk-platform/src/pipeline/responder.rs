//! Responder: regroups persisted tasks by agent, in roster order.

use super::record::{AgentId, AgentRef, PersistedTask};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub name: String,
}

/// Task as shown to the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskView {
    pub id: String,
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Notes")]
    pub notes: String,
}

/// One roster agent with the tasks it received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentTasks {
    pub agent: AgentSummary,
    pub tasks: Vec<TaskView>,
}

/// Group `tasks` under their assigned agent. Every roster agent appears, in
/// roster order; tasks pointing at an agent outside the roster are skipped.
pub fn group_by_agent(roster: &[AgentRef], tasks: &[PersistedTask]) -> Vec<AgentTasks> {
    let mut groups: Vec<AgentTasks> = roster
        .iter()
        .map(|agent| AgentTasks {
            agent: AgentSummary {
                id: agent.id.clone(),
                name: agent.name.clone(),
            },
            tasks: Vec::new(),
        })
        .collect();

    let slot: HashMap<&AgentId, usize> = roster
        .iter()
        .enumerate()
        .map(|(i, agent)| (&agent.id, i))
        .collect();

    for task in tasks {
        match slot.get(&task.assigned_agent_id) {
            Some(&i) => groups[i].tasks.push(TaskView {
                id: task.id.clone(),
                first_name: task.first_name.clone(),
                phone: task.phone.clone(),
                notes: task.notes.clone(),
            }),
            None => tracing::warn!(
                "responder: task {} references agent {} outside the roster",
                task.id,
                task.assigned_agent_id
            ),
        }
    }
    groups
}
