// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The workflow driver: replay history, decide what runs next.
//!
//! The driver is deterministic given a fixed history: it never reads the
//! clock, never mutates history, and iterates nodes and edges sorted by id
//! so the same history always yields the same command sequence. Its output
//! is a list of commands the history service materializes into events.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use linkflow_api::client::{ClientError, HistoryClient};
use linkflow_api::command::{Command, Failure, FailureKind};
use linkflow_api::events::{EventAttributes, RetryState};
use linkflow_api::execution::ExecutionKey;
use linkflow_api::workflow::{is_trigger_type, JobPayload};

use crate::retry::Policy;

/// Errors from a drive pass. The worker reports them as a failed workflow
/// task.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// History could not be fetched.
    #[error("failed to fetch history: {0}")]
    History(#[from] ClientError),

    /// The execution has no events.
    #[error("history is empty")]
    EmptyHistory,

    /// The execution input does not contain a workflow definition.
    #[error("workflow definition not found in execution input: {0}")]
    MissingDefinition(String),
}

/// Per-node view derived from history.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeState {
    Scheduled,
    Completed,
    Failed { retry_state: RetryState, reason: String },
}

/// Drives workflow executions by replaying their history.
pub struct WorkflowDriver {
    history: std::sync::Arc<dyn HistoryClient>,
    retry_policy: Policy,
}

impl WorkflowDriver {
    /// Create a driver over a history client.
    pub fn new(history: std::sync::Arc<dyn HistoryClient>, retry_policy: Policy) -> Self {
        Self {
            history,
            retry_policy,
        }
    }

    /// One decision pass: fetch history, derive node states, and emit the
    /// commands that advance the DAG.
    pub async fn drive(&self, key: &ExecutionKey) -> Result<Vec<Command>, DriverError> {
        let events = self.history.get_history(key, 0, 0).await?;
        if events.is_empty() {
            return Err(DriverError::EmptyHistory);
        }
        Ok(decide(key, &events, &self.retry_policy))
    }

    /// The driver's retry policy (consulted for failed nodes).
    pub fn retry_policy(&self) -> &Policy {
        &self.retry_policy
    }
}

/// The pure decision function. Exposed for determinism tests.
pub fn decide(
    key: &ExecutionKey,
    events: &[linkflow_api::events::HistoryEvent],
    retry_policy: &Policy,
) -> Vec<Command> {
    // Recover the definition from the start event.
    let payload = match parse_payload(events) {
        Ok(payload) => payload,
        Err(message) => {
            return vec![Command::FailWorkflowExecution {
                failure: Failure {
                    message,
                    kind: FailureKind::Application,
                    retryable: false,
                    details: Vec::new(),
                },
            }];
        }
    };
    let definition = &payload.workflow;

    // event id -> node id for every schedule.
    let mut scheduled_node: BTreeMap<i64, String> = BTreeMap::new();
    for event in events {
        if let EventAttributes::NodeScheduled(attrs) = &event.attributes {
            scheduled_node.insert(event.event_id, attrs.node_id.clone());
        }
    }

    // Fold node states, outputs, inputs, and attempt counts. BTreeMaps keep
    // every later iteration ordered by node id.
    let mut states: BTreeMap<String, NodeState> = BTreeMap::new();
    let mut outputs: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut last_inputs: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut attempts: BTreeMap<String, i32> = BTreeMap::new();
    for event in events {
        match &event.attributes {
            EventAttributes::NodeScheduled(attrs) => {
                states.insert(attrs.node_id.clone(), NodeState::Scheduled);
                last_inputs.insert(attrs.node_id.clone(), attrs.input.clone());
                *attempts.entry(attrs.node_id.clone()).or_insert(0) += 1;
            }
            EventAttributes::NodeCompleted(attrs) => {
                if let Some(node_id) = scheduled_node.get(&attrs.scheduled_event_id) {
                    states.insert(node_id.clone(), NodeState::Completed);
                    outputs.insert(node_id.clone(), attrs.result.clone());
                }
            }
            EventAttributes::NodeFailed(attrs) => {
                if let Some(node_id) = scheduled_node.get(&attrs.scheduled_event_id) {
                    states.insert(
                        node_id.clone(),
                        NodeState::Failed {
                            retry_state: attrs.retry_state,
                            reason: attrs.reason.clone(),
                        },
                    );
                }
            }
            _ => {}
        }
    }

    // Nothing ran yet: schedule the unique trigger node.
    if states.is_empty() {
        if definition.nodes.is_empty() {
            return vec![Command::CompleteWorkflowExecution {
                result: b"{}".to_vec(),
            }];
        }
        let Some(trigger) = definition.trigger_node() else {
            return vec![Command::FailWorkflowExecution {
                failure: Failure {
                    message: "workflow has no unique trigger node".to_string(),
                    kind: FailureKind::Application,
                    retryable: false,
                    details: Vec::new(),
                },
            }];
        };
        let trigger_input =
            serde_json::to_vec(&payload.trigger_data).unwrap_or_else(|_| b"{}".to_vec());
        debug!(execution = %key, trigger = %trigger.id, "scheduling trigger node");
        return vec![schedule(
            &trigger.id,
            &trigger.node_type,
            trigger_input,
            config_bytes(&trigger.data),
            1,
        )];
    }

    // Failed nodes first, sorted by id: re-schedule retryable failures
    // below the attempt cap, fail the workflow otherwise.
    let mut commands = Vec::new();
    for (node_id, state) in &states {
        let NodeState::Failed { retry_state, reason } = state else {
            continue;
        };
        let attempt = attempts.get(node_id).copied().unwrap_or(1);
        let retryable = *retry_state != RetryState::NonRetryable;
        let below_cap =
            retry_policy.maximum_attempts == 0 || attempt < retry_policy.maximum_attempts;
        if retryable && below_cap {
            let Some(node) = definition.node(node_id) else {
                continue;
            };
            commands.push(schedule(
                node_id,
                &node.node_type,
                last_inputs.get(node_id).cloned().unwrap_or_default(),
                config_bytes(&node.data),
                attempt + 1,
            ));
        } else {
            return vec![Command::FailWorkflowExecution {
                failure: Failure {
                    message: format!("node {node_id} failed: {reason}"),
                    kind: FailureKind::Application,
                    retryable: false,
                    details: Vec::new(),
                },
            }];
        }
    }

    // Ready successors: for every edge u -> v with u completed and v
    // untouched, schedule v with u's output. Edges sorted by id keep the
    // batch order stable; duplicates within the batch collapse.
    let mut edges = definition.edges.clone();
    edges.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| {
        (a.source.as_str(), a.target.as_str()).cmp(&(b.source.as_str(), b.target.as_str()))
    }));
    for edge in &edges {
        if states.get(&edge.source) != Some(&NodeState::Completed) {
            continue;
        }
        if states.contains_key(&edge.target) {
            continue;
        }
        if commands.iter().any(|c| matches!(c, Command::ScheduleNode { node_id, .. } if *node_id == edge.target)) {
            continue;
        }
        let Some(node) = definition.node(&edge.target) else {
            continue;
        };
        commands.push(schedule(
            &node.id,
            &node.node_type,
            outputs.get(&edge.source).cloned().unwrap_or_default(),
            config_bytes(&node.data),
            1,
        ));
    }

    if !commands.is_empty() {
        return commands;
    }

    // Nothing to schedule. Complete once nothing is in flight and every
    // terminal (no outgoing edge, non-trigger) node has completed.
    let in_flight = states.values().any(|s| *s == NodeState::Scheduled);
    if in_flight {
        return Vec::new();
    }

    let mut terminal_nodes: Vec<&str> = definition
        .nodes
        .iter()
        .filter(|n| !is_trigger_type(&n.node_type))
        .filter(|n| !definition.edges.iter().any(|e| e.source == n.id))
        .map(|n| n.id.as_str())
        .collect();
    terminal_nodes.sort_unstable();

    let all_terminal_done = terminal_nodes
        .iter()
        .all(|id| states.get(*id) == Some(&NodeState::Completed));
    if all_terminal_done {
        return vec![Command::CompleteWorkflowExecution {
            result: b"{}".to_vec(),
        }];
    }

    // Unreachable terminal nodes: the workflow cannot make progress, but
    // nothing failed either. Leave the decision empty.
    Vec::new()
}

fn schedule(
    node_id: &str,
    node_type: &str,
    input: Vec<u8>,
    config: Vec<u8>,
    attempt: i32,
) -> Command {
    Command::ScheduleNode {
        node_id: node_id.to_string(),
        node_type: node_type.to_string(),
        input,
        config,
        attempt,
    }
}

fn config_bytes(data: &Value) -> Vec<u8> {
    match data {
        Value::Null => Vec::new(),
        other => serde_json::to_vec(other).unwrap_or_default(),
    }
}

fn parse_payload(events: &[linkflow_api::events::HistoryEvent]) -> Result<JobPayload, String> {
    for event in events {
        if let EventAttributes::ExecutionStarted(attrs) = &event.attributes {
            return serde_json::from_slice(&attrs.input)
                .map_err(|err| format!("workflow definition not found in execution input: {err}"));
        }
    }
    Err("history has no execution-started event".to_string())
}
