//! Run Session Management
//!
//! Owns the lifecycle of the single run a client works inside. The run is
//! created once, every run-scoped command is posted to its command
//! endpoint, and teardown deletes it.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──open()──► Active ──close()──► Deleted
//!       │                                          ▲
//!       └─────────────────close()──────────────────┘
//! ```
//!
//! A failed `open` leaves the manager `Uninitialized`; the client refuses to
//! hand it out. A session never re-opens: a second `open` is rejected and a
//! deleted run stays deleted.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Result, SessionError};
use crate::transport::{RobotApi, RobotTransport};

/// Lifecycle state of the run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// No run has been created yet
    #[default]
    Uninitialized,
    /// The run exists and accepts commands
    Active,
    /// The run was torn down
    Deleted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Active => write!(f, "active"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// A run created on the robot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Run {
    id: String,
    command_endpoint: String,
    status: RunStatus,
    created_at: DateTime<Utc>,
}

impl Run {
    /// Run id assigned by the robot
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `{base}/runs/{id}/commands`
    #[must_use]
    pub fn command_endpoint(&self) -> &str {
        &self.command_endpoint
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// When the robot confirmed the run
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// What happened when the run was deleted
///
/// Teardown never fails: the outcome is reported so the caller can decide
/// whether a lingering run on the robot matters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TeardownOutcome {
    /// Run that was deleted, if one was ever created
    pub run_id: Option<String>,
    /// HTTP status of the delete request
    pub status: Option<u16>,
    /// Raw response body of the delete request
    pub body: Option<String>,
    /// Transport failure, if no response was received
    pub error: Option<String>,
    /// Teardown had already happened; no request was sent
    pub already_closed: bool,
}

impl TeardownOutcome {
    /// Whether the robot confirmed the deletion (or nothing needed deleting)
    #[must_use]
    pub fn is_clean(&self) -> bool {
        if self.already_closed || self.run_id.is_none() {
            return true;
        }
        self.error.is_none() && self.status.is_some_and(|s| (200..300).contains(&s))
    }
}

/// Creates, tracks and deletes the run
#[derive(Debug)]
pub struct SessionManager {
    api: RobotApi,
    status: RunStatus,
    run: Option<Run>,
}

impl SessionManager {
    /// Create a manager with no run
    #[must_use]
    pub fn new(api: RobotApi) -> Self {
        Self {
            api,
            status: RunStatus::Uninitialized,
            run: None,
        }
    }

    /// Create the run
    ///
    /// Exactly HTTP 201 with a `data.id` in the body is success. Anything
    /// else, including a transport failure, is a `RunCreation` error and
    /// leaves the manager uninitialized.
    pub async fn open<T>(&mut self, transport: &T) -> Result<&Run>
    where
        T: RobotTransport + ?Sized,
    {
        if let Some(ref run) = self.run {
            return Err(SessionError::RunAlreadyOpened {
                run_id: run.id.clone(),
            });
        }

        let request = self.api.post(self.api.runs_url(), None);
        let response = transport
            .execute(request)
            .await
            .map_err(|e| SessionError::RunCreation {
                status: 0,
                body: e.to_string(),
            })?;

        if response.status != 201 {
            tracing::error!(status = response.status, body = %response.body, "Run creation rejected");
            return Err(SessionError::RunCreation {
                status: response.status,
                body: response.body,
            });
        }

        let run_id = response
            .parse_json()
            .as_ref()
            .and_then(|json| json.pointer("/data/id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SessionError::RunCreation {
                status: response.status,
                body: response.body.clone(),
            })?;

        let command_endpoint = self.api.commands_url(&run_id);
        tracing::info!(run_id = %run_id, endpoint = %command_endpoint, "Run created");

        self.status = RunStatus::Active;
        Ok(self.run.insert(Run {
            id: run_id,
            command_endpoint,
            status: RunStatus::Active,
            created_at: Utc::now(),
        }))
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// The run, once created
    #[must_use]
    pub fn run(&self) -> Option<&Run> {
        self.run.as_ref()
    }

    /// Run id, once created
    #[must_use]
    pub fn run_id(&self) -> Option<&str> {
        self.run.as_ref().map(Run::id)
    }

    /// Whether run-scoped commands may be sent
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Active
    }

    /// Endpoint for run-scoped commands
    ///
    /// Fails with `RunNotActive` unless the run is active.
    pub fn command_endpoint(&self) -> Result<&str> {
        match self.run {
            Some(ref run) if self.is_active() => Ok(run.command_endpoint()),
            _ => Err(SessionError::RunNotActive {
                status: self.status,
            }),
        }
    }

    /// Endpoint for custom labware definitions
    pub fn labware_definitions_endpoint(&self) -> Result<String> {
        match self.run {
            Some(ref run) if self.is_active() => Ok(self.api.labware_definitions_url(run.id())),
            _ => Err(SessionError::RunNotActive {
                status: self.status,
            }),
        }
    }

    /// Delete the run
    ///
    /// The run is marked deleted whatever the robot answers. A second call
    /// sends nothing.
    pub async fn close<T>(&mut self, transport: &T) -> TeardownOutcome
    where
        T: RobotTransport + ?Sized,
    {
        let run_id = self.run.as_ref().map(|run| run.id.clone());

        if self.status == RunStatus::Deleted {
            tracing::debug!("Run already torn down");
            return TeardownOutcome {
                run_id,
                already_closed: true,
                ..TeardownOutcome::default()
            };
        }

        self.status = RunStatus::Deleted;
        if let Some(ref mut run) = self.run {
            run.status = RunStatus::Deleted;
        }

        let Some(run_id) = run_id else {
            tracing::debug!("No run was created; nothing to tear down");
            return TeardownOutcome::default();
        };

        let request = self.api.delete(self.api.run_url(&run_id));
        match transport.execute(request).await {
            Ok(response) => {
                if (200..300).contains(&response.status) {
                    tracing::info!(run_id = %run_id, status = response.status, "Run deleted");
                } else {
                    tracing::warn!(
                        run_id = %run_id,
                        status = response.status,
                        body = %response.body,
                        "Run deletion returned an error status"
                    );
                }
                TeardownOutcome {
                    run_id: Some(run_id),
                    status: Some(response.status),
                    body: Some(response.body),
                    error: None,
                    already_closed: false,
                }
            }
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "Run deletion failed");
                TeardownOutcome {
                    run_id: Some(run_id),
                    error: Some(e.to_string()),
                    ..TeardownOutcome::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::{HttpMethod, RobotResponse, ScriptedTransport};

    fn manager() -> SessionManager {
        SessionManager::new(RobotApi::new("robot", 31950, "3"))
    }

    #[tokio::test]
    async fn test_open_derives_endpoint() {
        let transport = ScriptedTransport::new();
        transport.push_response(ScriptedTransport::run_created("run-42"));

        let mut session = manager();
        let run = session.open(&transport).await.unwrap();
        assert_eq!(run.id(), "run-42");
        assert_eq!(
            run.command_endpoint(),
            "http://robot:31950/runs/run-42/commands"
        );
        assert!(session.is_active());
        assert_eq!(session.run_id(), Some("run-42"));

        let request = transport.last_request().unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "http://robot:31950/runs");
        assert_eq!(request.header("opentrons-version"), Some("3"));
    }

    #[tokio::test]
    async fn test_open_requires_exactly_201() {
        let transport = ScriptedTransport::new();
        transport.push_response(RobotResponse::json(
            200,
            &serde_json::json!({"data": {"id": "run-1"}}),
        ));

        let mut session = manager();
        let err = session.open(&transport).await.unwrap_err();
        assert!(matches!(err, SessionError::RunCreation { status: 200, .. }));
        assert_eq!(session.status(), RunStatus::Uninitialized);
        assert!(session.command_endpoint().is_err());
    }

    #[tokio::test]
    async fn test_open_without_run_id_fails() {
        let transport = ScriptedTransport::new();
        transport.push_response(RobotResponse::new(201, "{\"data\":{}}"));

        let err = manager().open(&transport).await.unwrap_err();
        assert!(matches!(err, SessionError::RunCreation { status: 201, .. }));
    }

    #[tokio::test]
    async fn test_open_transport_failure() {
        let transport = ScriptedTransport::new();
        transport.push_error(TransportError::Timeout);

        let err = manager().open(&transport).await.unwrap_err();
        assert!(matches!(err, SessionError::RunCreation { status: 0, .. }));
    }

    #[tokio::test]
    async fn test_open_twice_rejected() {
        let transport = ScriptedTransport::new();
        transport.push_response(ScriptedTransport::run_created("run-1"));

        let mut session = manager();
        session.open(&transport).await.unwrap();
        let err = session.open(&transport).await.unwrap_err();
        assert!(matches!(err, SessionError::RunAlreadyOpened { ref run_id } if run_id == "run-1"));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = ScriptedTransport::new();
        transport.push_response(ScriptedTransport::run_created("run-7"));
        transport.push_response(RobotResponse::new(200, "{}"));

        let mut session = manager();
        session.open(&transport).await.unwrap();

        let outcome = session.close(&transport).await;
        assert!(outcome.is_clean());
        assert_eq!(outcome.status, Some(200));
        assert_eq!(outcome.run_id.as_deref(), Some("run-7"));
        assert_eq!(
            transport.last_request().unwrap().url,
            "http://robot:31950/runs/run-7"
        );

        let again = session.close(&transport).await;
        assert!(again.already_closed);
        assert_eq!(transport.request_count(), 2);

        assert_eq!(session.status(), RunStatus::Deleted);
        assert_eq!(session.run().unwrap().status(), RunStatus::Deleted);
        assert!(matches!(
            session.command_endpoint(),
            Err(SessionError::RunNotActive {
                status: RunStatus::Deleted
            })
        ));
    }

    #[tokio::test]
    async fn test_close_reports_failures() {
        let transport = ScriptedTransport::new();
        transport.push_response(ScriptedTransport::run_created("run-8"));
        transport.push_response(ScriptedTransport::error_status(500, "boom"));

        let mut session = manager();
        session.open(&transport).await.unwrap();
        let outcome = session.close(&transport).await;
        assert!(!outcome.is_clean());
        assert_eq!(outcome.status, Some(500));
        assert!(outcome.body.unwrap().contains("boom"));
        assert!(!session.is_active());

        let transport = ScriptedTransport::new();
        transport.push_response(ScriptedTransport::run_created("run-9"));
        transport.push_error(TransportError::Request("connection reset".into()));
        let mut session = manager();
        session.open(&transport).await.unwrap();
        let outcome = session.close(&transport).await;
        assert!(!outcome.is_clean());
        assert!(outcome.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_close_without_run_sends_nothing() {
        let transport = ScriptedTransport::new();
        let mut session = manager();
        let outcome = session.close(&transport).await;
        assert!(outcome.is_clean());
        assert_eq!(transport.request_count(), 0);
        assert_eq!(session.status(), RunStatus::Deleted);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(RunStatus::Uninitialized.to_string(), "uninitialized");
        assert_eq!(RunStatus::Active.to_string(), "active");
        assert_eq!(RunStatus::Deleted.to_string(), "deleted");
    }
}
