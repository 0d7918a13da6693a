//! Session Events
//!
//! Observability sink injected into the client. Every run lifecycle step and
//! every dispatched command produces a [`SessionEvent`] on an optional
//! channel, so callers can record an audit trail or drive a UI without the
//! core depending on any global logger.
//!
//! Emission never blocks: when the channel is full or closed the event is
//! dropped and a warning is logged.

use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::command::{CommandType, Intent};

/// Something that happened in a session
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The run was created
    RunOpened {
        /// Run id assigned by the robot
        run_id: String,
        /// Derived command endpoint
        command_endpoint: String,
    },
    /// A request is about to be sent
    CommandSent {
        /// Instruction kind
        command: CommandType,
        /// Intent tag (run-scoped commands only)
        intent: Option<Intent>,
        /// Request body
        body: Value,
    },
    /// The robot confirmed the instruction
    CommandSucceeded {
        /// Instruction kind
        command: CommandType,
        /// HTTP status
        status: u16,
        /// Result fields reported by the robot
        result: Map<String, Value>,
    },
    /// The instruction was rejected locally or remotely
    CommandFailed {
        /// Instruction kind
        command: CommandType,
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Error description
        message: String,
    },
    /// The robot finished homing
    Homed {
        /// HTTP status
        status: u16,
    },
    /// The run was torn down
    RunClosed {
        /// Run id
        run_id: String,
        /// Status of the delete request, if a response was received
        status: Option<u16>,
    },
}

impl SessionEvent {
    /// Short name for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunOpened { .. } => "run_opened",
            Self::CommandSent { .. } => "command_sent",
            Self::CommandSucceeded { .. } => "command_succeeded",
            Self::CommandFailed { .. } => "command_failed",
            Self::Homed { .. } => "homed",
            Self::RunClosed { .. } => "run_closed",
        }
    }
}

/// Non-blocking sender for session events
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<SessionEvent>>,
}

impl EventSink {
    /// A sink that discards everything
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A sink that forwards to `tx`
    #[must_use]
    pub fn new(tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Whether a channel is attached
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Emit an event
    pub fn emit(&self, event: SessionEvent) {
        let Some(ref tx) = self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(event = event.kind(), "Session event channel full; event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!(event = event.kind(), "Session event receiver closed");
            }
        }
    }
}
