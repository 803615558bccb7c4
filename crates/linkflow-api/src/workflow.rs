// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow definitions and intake job payloads.
//!
//! A workflow definition is a DAG of typed nodes. The full intake payload
//! travels as the input of `EXECUTION_STARTED`, so the driver can recover
//! the definition (and callback coordinates) from history alone.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node types that start a workflow.
pub const TRIGGER_NODE_TYPES: &[&str] = &["trigger_manual", "trigger_webhook", "trigger_schedule"];

/// Whether `node_type` is a trigger.
pub fn is_trigger_type(node_type: &str) -> bool {
    TRIGGER_NODE_TYPES.contains(&node_type)
}

/// A workflow definition: nodes and directed edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Typed nodes.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Directed edges between node ids.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Free-form workflow settings.
    #[serde(default)]
    pub settings: Value,
}

impl WorkflowDefinition {
    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The unique trigger node, if the definition has exactly one.
    pub fn trigger_node(&self) -> Option<&Node> {
        let mut triggers = self.nodes.iter().filter(|n| is_trigger_type(&n.node_type));
        let first = triggers.next()?;
        if triggers.next().is_some() {
            return None;
        }
        Some(first)
    }
}

/// One node of the DAG.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Definition-unique node id.
    pub id: String,
    /// Node type, resolved against the executor registry.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Node configuration (executor-specific).
    #[serde(default)]
    pub data: Value,
}

/// A directed edge `source → target`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Edge id; used only for stable ordering.
    #[serde(default)]
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
}

/// The intake job payload, passed whole as execution input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Intake job id.
    #[serde(default)]
    pub job_id: String,
    /// Token echoed back in the completion callback.
    #[serde(default)]
    pub callback_token: String,
    /// Caller-side execution row id.
    #[serde(default)]
    pub execution_id: i64,
    /// Caller-side workflow row id.
    #[serde(default)]
    pub workflow_id: i64,
    /// Caller-side workspace id; becomes the namespace.
    #[serde(default)]
    pub workspace_id: i64,
    /// Intake partition the job arrived on.
    #[serde(default)]
    pub partition: i64,
    /// Scheduling priority label.
    #[serde(default)]
    pub priority: String,
    /// The workflow definition to run.
    #[serde(default)]
    pub workflow: WorkflowDefinition,
    /// Input handed to the trigger node.
    #[serde(default)]
    pub trigger_data: Value,
    /// Credential material resolved by executors.
    #[serde(default)]
    pub credentials: Value,
    /// Workflow variables.
    #[serde(default)]
    pub variables: Value,
    /// Completion callback URL; empty disables the callback.
    #[serde(default)]
    pub callback_url: String,
    /// Progress callback URL; unused by the core.
    #[serde(default)]
    pub progress_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_node_resolution() {
        let def = WorkflowDefinition {
            nodes: vec![
                Node {
                    id: "t".to_string(),
                    node_type: "trigger_manual".to_string(),
                    data: Value::Null,
                },
                Node {
                    id: "h".to_string(),
                    node_type: "http".to_string(),
                    data: Value::Null,
                },
            ],
            edges: vec![Edge {
                id: "e1".to_string(),
                source: "t".to_string(),
                target: "h".to_string(),
            }],
            settings: Value::Null,
        };
        assert_eq!(def.trigger_node().map(|n| n.id.as_str()), Some("t"));
        assert_eq!(def.node("h").map(|n| n.node_type.as_str()), Some("http"));
        assert!(def.node("missing").is_none());
    }

    #[test]
    fn test_two_triggers_are_ambiguous() {
        let def = WorkflowDefinition {
            nodes: vec![
                Node {
                    id: "a".to_string(),
                    node_type: "trigger_manual".to_string(),
                    data: Value::Null,
                },
                Node {
                    id: "b".to_string(),
                    node_type: "trigger_webhook".to_string(),
                    data: Value::Null,
                },
            ],
            ..Default::default()
        };
        assert!(def.trigger_node().is_none());
    }

    #[test]
    fn test_payload_parses_spec_shape() {
        let raw = br#"{"workflow":{"nodes":[{"id":"t","type":"trigger_manual"}],"edges":[]},"trigger_data":{}}"#;
        let payload: JobPayload = serde_json::from_slice(raw).unwrap();
        assert_eq!(payload.workflow.nodes.len(), 1);
        assert_eq!(payload.workflow.nodes[0].node_type, "trigger_manual");
        assert!(payload.callback_url.is_empty());
    }
}
