//! Entity Registry
//!
//! Maps caller-chosen aliases to the identifiers the robot assigned when
//! labware and pipettes were loaded. Every id placed in a command envelope
//! is resolved through this registry, so a command can only reference
//! entities that were loaded successfully earlier in the session.
//!
//! The robot's built-in trash is seeded at construction under the alias
//! [`FIXED_TRASH`] so tips can be dropped there without a load step.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::command::{DeckSlot, Mount};
use crate::error::{EntityKind, Result, SessionError};

/// Alias and remote id of the robot's fixed trash
pub const FIXED_TRASH: &str = "fixed-trash";

/// What to do when an alias is registered twice
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasPolicy {
    /// Reject the second registration with `DuplicateAlias`
    #[default]
    Reject,
    /// Replace the earlier mapping (last write wins)
    Replace,
}

impl AliasPolicy {
    /// Parse a policy name
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" | "strict" => Some(Self::Reject),
            "replace" | "overwrite" => Some(Self::Replace),
            _ => None,
        }
    }
}

/// A labware loaded on the deck
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabwareRef {
    /// Caller-chosen alias
    pub alias: String,
    /// Id assigned by the robot
    pub remote_id: String,
    /// Deck slot
    pub slot: DeckSlot,
    /// Definition name used to load it (`None` for the fixed trash)
    pub load_name: Option<String>,
}

impl LabwareRef {
    /// Create a labware reference
    pub fn new(
        alias: impl Into<String>,
        remote_id: impl Into<String>,
        slot: DeckSlot,
        load_name: Option<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            remote_id: remote_id.into(),
            slot,
            load_name,
        }
    }

    /// The seeded fixed-trash entry
    #[must_use]
    pub fn fixed_trash() -> Self {
        Self::new(FIXED_TRASH, FIXED_TRASH, DeckSlot::FIXED_TRASH, None)
    }
}

/// A pipette loaded on a mount
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipetteRef {
    /// Caller-chosen alias
    pub alias: String,
    /// Id assigned by the robot
    pub remote_id: String,
    /// Mount side
    pub mount: Mount,
    /// Pipette model name
    pub pipette_name: String,
}

impl PipetteRef {
    /// Create a pipette reference
    pub fn new(
        alias: impl Into<String>,
        remote_id: impl Into<String>,
        mount: Mount,
        pipette_name: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            remote_id: remote_id.into(),
            mount,
            pipette_name: pipette_name.into(),
        }
    }
}

/// Alias tables for one session
///
/// Not synchronized: the registry is owned by a single client and mutated
/// only from `&mut self` methods.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    labware: HashMap<String, LabwareRef>,
    pipettes: HashMap<String, PipetteRef>,
    policy: AliasPolicy,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new(AliasPolicy::default())
    }
}

impl EntityRegistry {
    /// Create a registry seeded with the fixed trash
    #[must_use]
    pub fn new(policy: AliasPolicy) -> Self {
        let mut labware = HashMap::new();
        labware.insert(FIXED_TRASH.to_string(), LabwareRef::fixed_trash());
        Self {
            labware,
            pipettes: HashMap::new(),
            policy,
        }
    }

    /// Active alias policy
    #[must_use]
    pub fn policy(&self) -> AliasPolicy {
        self.policy
    }

    /// Check that `alias` may be (re)registered as labware under the current policy
    pub fn check_labware_alias(&self, alias: &str) -> Result<()> {
        check_alias(self.policy, EntityKind::Labware, self.labware.contains_key(alias), alias)
    }

    /// Check that `alias` may be (re)registered as a pipette under the current policy
    pub fn check_pipette_alias(&self, alias: &str) -> Result<()> {
        check_alias(self.policy, EntityKind::Pipette, self.pipettes.contains_key(alias), alias)
    }

    /// Register labware, honoring the alias policy
    ///
    /// Returns the entry that was replaced, if any.
    pub fn register_labware(&mut self, entry: LabwareRef) -> Result<Option<LabwareRef>> {
        self.check_labware_alias(&entry.alias)?;
        Ok(self.replace_labware(entry))
    }

    /// Register a pipette, honoring the alias policy
    ///
    /// Returns the entry that was replaced, if any.
    pub fn register_pipette(&mut self, entry: PipetteRef) -> Result<Option<PipetteRef>> {
        self.check_pipette_alias(&entry.alias)?;
        Ok(self.replace_pipette(entry))
    }

    /// Insert or overwrite labware regardless of policy
    pub fn replace_labware(&mut self, entry: LabwareRef) -> Option<LabwareRef> {
        let previous = self.labware.insert(entry.alias.clone(), entry);
        if let Some(ref old) = previous {
            tracing::warn!(alias = %old.alias, old_id = %old.remote_id, "Labware alias replaced");
        }
        previous
    }

    /// Insert or overwrite a pipette regardless of policy
    pub fn replace_pipette(&mut self, entry: PipetteRef) -> Option<PipetteRef> {
        let previous = self.pipettes.insert(entry.alias.clone(), entry);
        if let Some(ref old) = previous {
            tracing::warn!(alias = %old.alias, old_id = %old.remote_id, "Pipette alias replaced");
        }
        previous
    }

    /// Remote id of a labware alias
    pub fn resolve_labware(&self, alias: &str) -> Result<&str> {
        self.labware
            .get(alias)
            .map(|entry| entry.remote_id.as_str())
            .ok_or_else(|| SessionError::UnknownAlias {
                kind: EntityKind::Labware,
                alias: alias.to_string(),
            })
    }

    /// Remote id of a pipette alias
    pub fn resolve_pipette(&self, alias: &str) -> Result<&str> {
        self.pipettes
            .get(alias)
            .map(|entry| entry.remote_id.as_str())
            .ok_or_else(|| SessionError::UnknownAlias {
                kind: EntityKind::Pipette,
                alias: alias.to_string(),
            })
    }

    /// Look up a labware entry
    #[must_use]
    pub fn labware(&self, alias: &str) -> Option<&LabwareRef> {
        self.labware.get(alias)
    }

    /// Look up a pipette entry
    #[must_use]
    pub fn pipette(&self, alias: &str) -> Option<&PipetteRef> {
        self.pipettes.get(alias)
    }

    /// All labware entries (unordered)
    pub fn labware_entries(&self) -> impl Iterator<Item = &LabwareRef> {
        self.labware.values()
    }

    /// All pipette entries (unordered)
    pub fn pipette_entries(&self) -> impl Iterator<Item = &PipetteRef> {
        self.pipettes.values()
    }

    /// Number of labware entries, including the fixed trash
    #[must_use]
    pub fn labware_count(&self) -> usize {
        self.labware.len()
    }

    /// Number of pipette entries
    #[must_use]
    pub fn pipette_count(&self) -> usize {
        self.pipettes.len()
    }
}

fn check_alias(policy: AliasPolicy, kind: EntityKind, exists: bool, alias: &str) -> Result<()> {
    if exists && policy == AliasPolicy::Reject {
        return Err(SessionError::DuplicateAlias {
            kind,
            alias: alias.to_string(),
        });
    }
    Ok(())
}
