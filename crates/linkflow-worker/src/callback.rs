// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Signed completion callbacks.
//!
//! After a workflow reaches a terminal state the worker POSTs a JSON
//! summary to the payload's callback URL. The body is signed with
//! HMAC-SHA256; the signature and an RFC3339 timestamp travel in headers.
//! Best-effort: up to 3 attempts with linearly increasing delay, never
//! blocking the workflow commit.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tracing::{error, info, warn};

use linkflow_api::workflow::JobPayload;

type HmacSha256 = Hmac<Sha256>;

/// Timestamp header on callback requests.
pub const TIMESTAMP_HEADER: &str = "X-LinkFlow-Timestamp";
/// Signature header on callback requests.
pub const SIGNATURE_HEADER: &str = "X-LinkFlow-Signature";

const CALLBACK_ATTEMPTS: u32 = 3;

/// Terminal status reported in a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    /// The workflow completed.
    Completed,
    /// The workflow failed.
    Failed,
}

impl CallbackStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign_payload(body: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of a hex signature.
pub fn verify_signature(body: &[u8], secret: &str, signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Sends signed completion callbacks.
pub struct CallbackSender {
    client: reqwest::Client,
    secret: Option<String>,
}

impl CallbackSender {
    /// Create a sender. Without a secret, requests carry no signature.
    pub fn new(secret: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, secret }
    }

    /// Send the terminal summary for one job. A payload without callback
    /// coordinates is skipped silently.
    pub async fn send(
        &self,
        payload: &JobPayload,
        status: CallbackStatus,
        duration: Duration,
        error_message: Option<String>,
    ) {
        if payload.callback_url.is_empty()
            || payload.job_id.is_empty()
            || payload.callback_token.is_empty()
            || payload.execution_id == 0
        {
            return;
        }

        let mut body = json!({
            "job_id": payload.job_id,
            "callback_token": payload.callback_token,
            "execution_id": payload.execution_id,
            "status": status.as_str(),
            "duration_ms": duration.as_millis() as u64,
        });
        if let Some(message) = error_message {
            body["error"] = json!({ "message": message });
        }

        let body_bytes = match serde_json::to_vec(&body) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(job_id = %payload.job_id, error = %err, "failed to encode callback payload");
                return;
            }
        };

        for attempt in 1..=CALLBACK_ATTEMPTS {
            match self.post(&payload.callback_url, &body_bytes).await {
                Ok(()) => {
                    info!(
                        job_id = %payload.job_id,
                        status = status.as_str(),
                        attempt,
                        "callback delivered"
                    );
                    return;
                }
                Err(err) => {
                    warn!(
                        job_id = %payload.job_id,
                        status = status.as_str(),
                        attempt,
                        error = %err,
                        "failed to send workflow callback"
                    );
                }
            }

            if attempt < CALLBACK_ATTEMPTS {
                tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
            }
        }
    }

    async fn post(&self, url: &str, body: &[u8]) -> Result<(), String> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(
                TIMESTAMP_HEADER,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .body(body.to_vec());

        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(body, secret));
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if status.as_u16() >= 400 {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("callback returned status {status}: {text}"));
        }
        Ok(())
    }
}

/// Derive the callback status from the terminal command of a decision, if
/// any. A fail command wins over a complete command.
pub fn status_from_commands(
    commands: &[linkflow_api::command::Command],
) -> Option<(CallbackStatus, Option<String>)> {
    use linkflow_api::command::Command;

    let mut result = None;
    for command in commands {
        match command {
            Command::CompleteWorkflowExecution { .. } => {
                if result.is_none() {
                    result = Some((CallbackStatus::Completed, None));
                }
            }
            Command::FailWorkflowExecution { failure } => {
                let message = if failure.message.is_empty() {
                    "workflow execution failed".to_string()
                } else {
                    failure.message.clone()
                };
                result = Some((CallbackStatus::Failed, Some(message)));
            }
            Command::ScheduleNode { .. } => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use linkflow_api::command::{Command, Failure};

    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"job_id":"j1","status":"completed"}"#;
        let signature = sign_payload(body, "secret-key");
        assert!(verify_signature(body, "secret-key", &signature));
        assert!(!verify_signature(body, "other-key", &signature));
        assert!(!verify_signature(b"tampered", "secret-key", &signature));
        assert!(!verify_signature(body, "secret-key", "not-hex"));
    }

    #[test]
    fn test_signature_is_deterministic_hex() {
        let signature = sign_payload(b"body", "key");
        assert_eq!(signature.len(), 64);
        assert_eq!(signature, sign_payload(b"body", "key"));
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_status_from_commands() {
        assert_eq!(status_from_commands(&[]), None);
        assert_eq!(
            status_from_commands(&[Command::ScheduleNode {
                node_id: "n".to_string(),
                node_type: "http".to_string(),
                input: Vec::new(),
                config: Vec::new(),
                attempt: 1,
            }]),
            None
        );
        assert_eq!(
            status_from_commands(&[Command::CompleteWorkflowExecution { result: Vec::new() }]),
            Some((CallbackStatus::Completed, None))
        );

        let (status, message) = status_from_commands(&[Command::FailWorkflowExecution {
            failure: Failure {
                message: "node n1 failed".to_string(),
                ..Default::default()
            },
        }])
        .unwrap();
        assert_eq!(status, CallbackStatus::Failed);
        assert_eq!(message.as_deref(), Some("node n1 failed"));
    }
}
