//! Command Dispatch
//!
//! Sends one request and classifies the response. The dispatcher is the
//! only place that decides whether the robot accepted an instruction.
//!
//! # Success Rules
//!
//! | Request | Success |
//! |---|---|
//! | run command | exactly 201, `data.status == "succeeded"`, null `data.error` |
//! | custom labware upload | exactly 201 |
//! | home | exactly 200 |
//!
//! The robot can answer 201 for a command that was accepted but then failed
//! to execute, so the status code alone is not enough for run commands. A 201
//! whose body is not a `data` object, or whose command is still `queued` or
//! `running`, is a failure too.
//!
//! Run commands always carry `waitUntilComplete=true`.

use serde_json::{Map, Value};

use crate::command::{home_body, CommandEnvelope, CommandType};
use crate::error::{Result, SessionError, TransportError};
use crate::transport::{RobotApi, RobotRequest, RobotResponse, RobotTransport};

/// Query flag that makes the robot finish the command before responding
pub const WAIT_UNTIL_COMPLETE: &str = "waitUntilComplete";

/// Outcome of a confirmed instruction
#[derive(Clone, Debug, PartialEq)]
pub struct CommandResult {
    /// Instruction kind
    pub command: CommandType,
    /// Always true for values returned by the dispatcher
    pub succeeded: bool,
    /// `data.result` of the response (empty when absent)
    pub result_fields: Map<String, Value>,
    /// HTTP status
    pub raw_status: u16,
    /// Raw response body
    pub raw_body: String,
}

impl CommandResult {
    /// A string field of the result, e.g. `labwareId`
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.result_fields.get(name).and_then(Value::as_str)
    }
}

/// Posts envelopes and classifies responses
#[derive(Clone, Debug)]
pub struct CommandDispatcher {
    api: RobotApi,
}

impl CommandDispatcher {
    /// Create a dispatcher for one robot
    #[must_use]
    pub fn new(api: RobotApi) -> Self {
        Self { api }
    }

    /// The endpoint factory
    #[must_use]
    pub fn api(&self) -> &RobotApi {
        &self.api
    }

    /// Post a run command to `endpoint` and wait for it to finish
    pub async fn dispatch<T>(
        &self,
        transport: &T,
        envelope: &CommandEnvelope,
        endpoint: &str,
    ) -> Result<CommandResult>
    where
        T: RobotTransport + ?Sized,
    {
        let command = envelope.command_type();
        let body = envelope.to_body();
        tracing::debug!(command = %command, payload = %body, "Dispatching command");

        let request = self
            .api
            .post(endpoint, Some(body))
            .with_query(WAIT_UNTIL_COMPLETE, "true");

        let response = send(transport, command, request).await?;
        let json = response.parse_json();

        if response.status != 201 || !completed(json.as_ref()) {
            tracing::warn!(
                command = %command,
                status = response.status,
                body = %response.body,
                "Command failed"
            );
            return Err(SessionError::CommandExecution {
                command,
                status: response.status,
                body: response.body,
            });
        }

        let result_fields = json
            .as_ref()
            .and_then(|json| json.pointer("/data/result"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        tracing::debug!(command = %command, status = response.status, "Command succeeded");

        Ok(CommandResult {
            command,
            succeeded: true,
            result_fields,
            raw_status: response.status,
            raw_body: response.body,
        })
    }

    /// Home all axes
    pub async fn home<T>(&self, transport: &T) -> Result<RobotResponse>
    where
        T: RobotTransport + ?Sized,
    {
        let request = self.api.post(self.api.home_url(), Some(home_body()));
        let response = send(transport, CommandType::Home, request).await?;

        if response.status != 200 {
            tracing::warn!(status = response.status, body = %response.body, "Homing failed");
            return Err(SessionError::Homing {
                status: response.status,
                body: response.body,
            });
        }

        tracing::info!("Robot homed");
        Ok(response)
    }

    /// Upload a custom labware definition
    ///
    /// `body` is sent as-is; see [`crate::command::custom_labware_body`].
    pub async fn upload_labware_definition<T>(
        &self,
        transport: &T,
        endpoint: &str,
        body: Value,
    ) -> Result<CommandResult>
    where
        T: RobotTransport + ?Sized,
    {
        let command = CommandType::LoadCustomLabware;
        tracing::debug!(payload = %body, "Uploading custom labware definition");

        let request = self.api.post(endpoint, Some(body));
        let response = send(transport, command, request).await?;

        if response.status != 201 {
            tracing::warn!(status = response.status, body = %response.body, "Labware upload failed");
            return Err(SessionError::CommandExecution {
                command,
                status: response.status,
                body: response.body,
            });
        }

        let result_fields = response
            .parse_json()
            .and_then(|json| json.get("data").and_then(Value::as_object).cloned())
            .unwrap_or_default();

        Ok(CommandResult {
            command,
            succeeded: true,
            result_fields,
            raw_status: response.status,
            raw_body: response.body,
        })
    }
}

async fn send<T>(
    transport: &T,
    command: CommandType,
    request: RobotRequest,
) -> Result<RobotResponse>
where
    T: RobotTransport + ?Sized,
{
    transport.execute(request).await.map_err(|source: TransportError| {
        tracing::warn!(command = %command, transport = transport.name(), error = %source, "Request not delivered");
        SessionError::Transport { command, source }
    })
}

/// Whether a 201 body describes a command the robot finished successfully
fn completed(json: Option<&Value>) -> bool {
    let Some(data) = json.and_then(|json| json.get("data")).and_then(Value::as_object) else {
        return false;
    };
    let succeeded = data.get("status").and_then(Value::as_str) == Some("succeeded");
    let clean = data.get("error").is_none_or(Value::is_null);
    succeeded && clean
}
