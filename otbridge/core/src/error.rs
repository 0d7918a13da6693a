//! Session Error Types
//!
//! Every failure the client can raise is a variant of [`SessionError`], so
//! callers can branch on the kind of failure instead of parsing messages.
//!
//! Variants fall into two groups:
//! - **Local** precondition failures (unknown alias, tip state, invalid
//!   slot or volume, run not active). These are raised before any request
//!   leaves the client.
//! - **Remote** failures (run creation, command execution, homing,
//!   transport). These carry the HTTP status and the raw response body so
//!   the rejected request can be diagnosed without re-running.

use thiserror::Error;

use crate::command::CommandType;
use crate::config::ConfigError;
use crate::session::RunStatus;

/// Which registry table an alias belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Labware (tip racks, plates, trash)
    Labware,
    /// Pipette tools
    Pipette,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Labware => write!(f, "labware"),
            Self::Pipette => write!(f, "pipette"),
        }
    }
}

/// Errors raised by the transport seam
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection failed
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout
    #[error("HTTP request timed out")]
    Timeout,

    /// The response could not be read
    #[error("Invalid HTTP response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Errors raised by the session client
#[derive(Debug, Error)]
pub enum SessionError {
    /// The robot refused to create a run; the client is unusable
    #[error("Failed to create a new run (status {status}): {body}")]
    RunCreation {
        /// HTTP status returned by the robot (0 if no response was received)
        status: u16,
        /// Raw response body
        body: String,
    },

    /// `open` was called on a session that already created its run
    #[error("Run '{run_id}' was already opened; a session creates exactly one run")]
    RunAlreadyOpened {
        /// Id of the existing run
        run_id: String,
    },

    /// A run-scoped command was attempted while no run is active
    #[error("Run is not active (status: {status})")]
    RunNotActive {
        /// Current run status
        status: RunStatus,
    },

    /// An alias was referenced before it was registered
    #[error("Unknown {kind} alias '{alias}'")]
    UnknownAlias {
        /// Registry table that was searched
        kind: EntityKind,
        /// The alias that was not found
        alias: String,
    },

    /// An alias was registered twice under the reject policy
    #[error("{kind} alias '{alias}' is already registered")]
    DuplicateAlias {
        /// Registry table holding the alias
        kind: EntityKind,
        /// The duplicated alias
        alias: String,
    },

    /// Tip pick-up requested while the pipette already holds a tip
    #[error("Pipette '{alias}' is already holding a tip; drop it before picking up a new one")]
    PipetteOccupied {
        /// Pipette alias
        alias: String,
    },

    /// Tip drop requested while the pipette holds no tip
    #[error("Pipette '{alias}' has no tip to drop")]
    NoTipToDrop {
        /// Pipette alias
        alias: String,
    },

    /// Deck slot outside 1-12
    #[error("Invalid deck slot {slot}: expected 1-12")]
    InvalidSlot {
        /// The rejected slot number
        slot: u32,
    },

    /// Volume is negative or not finite
    #[error("Invalid volume {volume} uL: must be finite and non-negative")]
    InvalidVolume {
        /// The rejected volume
        volume: f64,
    },

    /// Flow rate is negative or not finite
    #[error("Invalid flow rate {flow_rate} uL/s: must be finite and non-negative")]
    InvalidFlowRate {
        /// The rejected flow rate
        flow_rate: f64,
    },

    /// The robot rejected or failed a dispatched command
    #[error("{command} failed (status {status}): {body}")]
    CommandExecution {
        /// Instruction that was being attempted
        command: CommandType,
        /// HTTP status returned by the robot
        status: u16,
        /// Raw response body
        body: String,
    },

    /// The home request did not return 200
    #[error("Homing failed (status {status}): {body}")]
    Homing {
        /// HTTP status returned by the robot
        status: u16,
        /// Raw response body
        body: String,
    },

    /// The client configuration is unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The request never produced a response
    #[error("{command} could not be delivered: {source}")]
    Transport {
        /// Instruction that was being attempted
        command: CommandType,
        /// Underlying transport failure
        #[source]
        source: TransportError,
    },
}

impl SessionError {
    /// Whether this error was raised locally, before any request was sent
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::RunNotActive { .. }
                | Self::RunAlreadyOpened { .. }
                | Self::UnknownAlias { .. }
                | Self::DuplicateAlias { .. }
                | Self::PipetteOccupied { .. }
                | Self::NoTipToDrop { .. }
                | Self::InvalidSlot { .. }
                | Self::InvalidVolume { .. }
                | Self::InvalidFlowRate { .. }
                | Self::Config(_)
        )
    }

    /// HTTP status carried by remote failures
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RunCreation { status, .. }
            | Self::CommandExecution { status, .. }
            | Self::Homing { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body carried by remote failures
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::RunCreation { body, .. }
            | Self::CommandExecution { body, .. }
            | Self::Homing { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Instruction kind that was being attempted, if any
    #[must_use]
    pub fn command(&self) -> Option<CommandType> {
        match self {
            Self::CommandExecution { command, .. } | Self::Transport { command, .. } => {
                Some(*command)
            }
            Self::Homing { .. } => Some(CommandType::Home),
            Self::RunCreation { .. } => Some(CommandType::CreateRun),
            _ => None,
        }
    }
}

/// Result alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
