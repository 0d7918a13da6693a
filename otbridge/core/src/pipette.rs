//! Pipette State Tracker
//!
//! Tracks whether each pipette is holding a tip. Preconditions are checked
//! before a pick-up or drop is sent, and the state only flips after the
//! robot confirms the command succeeded.
//!
//! ```text
//!            pickUpTip (confirmed)
//!   Empty ───────────────────────▶ Occupied
//!     ▲                               │
//!     └───────────────────────────────┘
//!            dropTip (confirmed)
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EntityKind, Result, SessionError};

/// Tip occupancy of one pipette
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TipState {
    /// No tip attached
    #[default]
    Empty,
    /// A tip is attached
    Occupied,
}

impl TipState {
    /// Whether a tip is attached
    #[must_use]
    pub fn has_tip(&self) -> bool {
        matches!(self, Self::Occupied)
    }
}

impl std::fmt::Display for TipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Occupied => write!(f, "occupied"),
        }
    }
}

/// Per-pipette tip state machine
#[derive(Debug, Clone, Default)]
pub struct PipetteTracker {
    states: HashMap<String, TipState>,
}

impl PipetteTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a pipette in the `Empty` state
    ///
    /// Re-tracking an alias (a replaced pipette) resets it to `Empty`.
    pub fn track(&mut self, alias: impl Into<String>) {
        self.states.insert(alias.into(), TipState::Empty);
    }

    /// Current state of a tracked pipette
    pub fn state(&self, alias: &str) -> Result<TipState> {
        self.states
            .get(alias)
            .copied()
            .ok_or_else(|| SessionError::UnknownAlias {
                kind: EntityKind::Pipette,
                alias: alias.to_string(),
            })
    }

    /// Fail with `PipetteOccupied` unless the pipette is empty
    pub fn ensure_can_pick_up(&self, alias: &str) -> Result<()> {
        match self.state(alias)? {
            TipState::Empty => Ok(()),
            TipState::Occupied => Err(SessionError::PipetteOccupied {
                alias: alias.to_string(),
            }),
        }
    }

    /// Fail with `NoTipToDrop` unless the pipette holds a tip
    pub fn ensure_can_drop(&self, alias: &str) -> Result<()> {
        match self.state(alias)? {
            TipState::Occupied => Ok(()),
            TipState::Empty => Err(SessionError::NoTipToDrop {
                alias: alias.to_string(),
            }),
        }
    }

    /// Record a confirmed pick-up
    pub fn mark_occupied(&mut self, alias: &str) -> Result<()> {
        self.ensure_can_pick_up(alias)?;
        self.set(alias, TipState::Occupied);
        Ok(())
    }

    /// Record a confirmed drop
    pub fn mark_empty(&mut self, alias: &str) -> Result<()> {
        self.ensure_can_drop(alias)?;
        self.set(alias, TipState::Empty);
        Ok(())
    }

    /// Number of tracked pipettes
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no pipettes are tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn set(&mut self, alias: &str, state: TipState) {
        tracing::debug!(pipette = alias, %state, "Tip state changed");
        if let Some(slot) = self.states.get_mut(alias) {
            *slot = state;
        }
    }
}
