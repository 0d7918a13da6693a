//! Scripted transport
//!
//! Replays queued responses in order and records every request it receives.
//! Used by the test suite and for dry runs where no robot is attached.
//!
//! # Usage
//!
//! ```ignore
//! let transport = ScriptedTransport::new();
//! transport.push_response(ScriptedTransport::run_created("run-42"));
//! transport.push_response(ScriptedTransport::command_succeeded(
//!     "loadLabware",
//!     json!({"labwareId": "lw-1"}),
//! ));
//!
//! let mut client = OpentronsClient::connect_with(transport.clone(), config).await?;
//! client.load_labware("tiprack", 1, "opentrons_96_tiprack_1000ul").await?;
//!
//! assert_eq!(transport.request_count(), 2);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{RobotRequest, RobotResponse, RobotTransport};
use crate::error::TransportError;

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<Result<RobotResponse, TransportError>>,
    requests: Vec<RobotRequest>,
}

/// Transport that replays a queue of canned responses
///
/// Cloning shares the queue and the request log, so a test can keep one
/// handle while the client owns another.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    /// Create with an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response
    pub fn push_response(&self, response: RobotResponse) {
        self.script.lock().responses.push_back(Ok(response));
    }

    /// Queue a transport failure
    pub fn push_error(&self, error: TransportError) {
        self.script.lock().responses.push_back(Err(error));
    }

    /// Every request received so far, oldest first
    #[must_use]
    pub fn requests(&self) -> Vec<RobotRequest> {
        self.script.lock().requests.clone()
    }

    /// Number of requests received so far
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.script.lock().requests.len()
    }

    /// Most recent request
    #[must_use]
    pub fn last_request(&self) -> Option<RobotRequest> {
        self.script.lock().requests.last().cloned()
    }

    /// Number of queued responses not yet consumed
    #[must_use]
    pub fn pending(&self) -> usize {
        self.script.lock().responses.len()
    }

    /// `201 Created` for `POST /runs`
    #[must_use]
    pub fn run_created(run_id: &str) -> RobotResponse {
        RobotResponse::json(
            201,
            &json!({
                "data": {
                    "id": run_id,
                    "status": "idle",
                    "current": true,
                    "actions": [],
                    "errors": [],
                    "pipettes": [],
                    "labware": []
                }
            }),
        )
    }

    /// `201 Created` for a command that the robot executed successfully
    #[must_use]
    pub fn command_succeeded(command_type: &str, result: Value) -> RobotResponse {
        RobotResponse::json(
            201,
            &json!({
                "data": {
                    "id": next_command_id(),
                    "commandType": command_type,
                    "status": "succeeded",
                    "result": result,
                    "error": null
                }
            }),
        )
    }

    /// `201 Created` for a command the robot accepted but failed to execute
    #[must_use]
    pub fn command_failed(command_type: &str, detail: &str) -> RobotResponse {
        RobotResponse::json(
            201,
            &json!({
                "data": {
                    "id": next_command_id(),
                    "commandType": command_type,
                    "status": "failed",
                    "error": {
                        "errorType": "ProtocolEngineError",
                        "detail": detail
                    }
                }
            }),
        )
    }

    /// A JSON error response with an arbitrary status
    #[must_use]
    pub fn error_status(status: u16, detail: &str) -> RobotResponse {
        RobotResponse::json(
            status,
            &json!({
                "errors": [{"id": "UnexpectedError", "title": "Error", "detail": detail}]
            }),
        )
    }

    /// `200 OK` for `POST /robot/home`
    #[must_use]
    pub fn homed() -> RobotResponse {
        RobotResponse::json(200, &json!({"message": "Homing robot."}))
    }
}

fn next_command_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("cmd-{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

#[async_trait]
impl RobotTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, request: RobotRequest) -> Result<RobotResponse, TransportError> {
        let mut script = self.script.lock();
        tracing::trace!(method = %request.method, url = %request.url, "Scripted request");
        script.requests.push(request);
        script.responses.pop_front().unwrap_or_else(|| {
            Err(TransportError::Request(
                "scripted transport has no response queued".to_string(),
            ))
        })
    }
}
