//! Command Envelope Builder
//!
//! Pure translation from a logical instruction plus resolved identifiers to
//! the JSON command structure the robot server executes. Nothing here
//! touches the network or the registry; the same inputs always produce the
//! same envelope.
//!
//! # Wire Shape
//!
//! ```text
//! {"data": {"commandType": "pickUpTip",
//!           "params": {"pipetteId": ..., "labwareId": ..., "wellName": "A1",
//!                      "wellLocation": {"origin": "top",
//!                                       "offset": {"x": 0, "y": 0, "z": 0}}},
//!           "intent": "setup"}}
//! ```
//!
//! Each [`Command`] variant owns a params struct with a fixed field set, so
//! the shape of an instruction cannot drift between call sites.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Result, SessionError};

/// Default labware namespace on the robot
pub const DEFAULT_LABWARE_NAMESPACE: &str = "opentrons";

/// Default labware definition version
pub const DEFAULT_LABWARE_VERSION: u32 = 1;

/// Instruction kinds the client can issue
///
/// Run-scoped kinds serialize to their `commandType` wire name. `Home`,
/// `LoadCustomLabware` and `CreateRun` use dedicated endpoints and only
/// appear in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandType {
    /// Load a labware definition into a deck slot
    LoadLabware,
    /// Upload a custom labware definition to the run
    LoadCustomLabware,
    /// Load a pipette onto a mount
    LoadPipette,
    /// Home all axes
    Home,
    /// Pick up a tip from a tip rack well
    PickUpTip,
    /// Drop the held tip into a well
    DropTip,
    /// Draw liquid from a well
    Aspirate,
    /// Expel liquid into a well
    Dispense,
    /// Move the pipette to a well without any liquid action
    MoveToWell,
    /// Create the run backing a session
    CreateRun,
}

impl CommandType {
    /// Wire name of this instruction
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadLabware => "loadLabware",
            Self::LoadCustomLabware => "loadCustomLabware",
            Self::LoadPipette => "loadPipette",
            Self::Home => "home",
            Self::PickUpTip => "pickUpTip",
            Self::DropTip => "dropTip",
            Self::Aspirate => "aspirate",
            Self::Dispense => "dispense",
            Self::MoveToWell => "moveToWell",
            Self::CreateRun => "createRun",
        }
    }

    /// Whether this instruction is posted to the run's command endpoint
    #[must_use]
    pub fn is_run_command(&self) -> bool {
        !matches!(self, Self::Home | Self::LoadCustomLabware | Self::CreateRun)
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tag distinguishing pre-run setup actions from in-protocol actions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Setup action (the default for every instruction)
    #[default]
    Setup,
    /// Protocol action
    Protocol,
}

/// Pipette mount side
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mount {
    /// Left mount
    Left,
    /// Right mount
    Right,
}

impl std::fmt::Display for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// Deck slot number, 1 through 12
///
/// Callers pass integers; the wire format carries the slot name as a string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeckSlot(u8);

impl DeckSlot {
    /// Slot occupied by the robot's built-in trash
    pub const FIXED_TRASH: Self = Self(12);

    /// Validate a slot number
    pub fn new(slot: u32) -> Result<Self> {
        match u8::try_from(slot) {
            Ok(n @ 1..=12) => Ok(Self(n)),
            _ => Err(SessionError::InvalidSlot { slot }),
        }
    }

    /// Get the numeric value
    #[must_use]
    pub fn number(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u32> for DeckSlot {
    type Error = SessionError;

    fn try_from(slot: u32) -> Result<Self> {
        Self::new(slot)
    }
}

impl std::fmt::Display for DeckSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for DeckSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Reference point inside a well that offsets are measured from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WellOrigin {
    /// Top of the well (default)
    #[default]
    Top,
    /// Bottom of the well
    Bottom,
    /// Center of the well
    Center,
}

/// Signed offset in millimetres
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Offset {
    /// X offset (mm)
    pub x: f64,
    /// Y offset (mm)
    pub y: f64,
    /// Z offset (mm)
    pub z: f64,
}

impl Offset {
    /// Create an offset
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Position within a well
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct WellLocation {
    /// Reference point
    pub origin: WellOrigin,
    /// Offset from the reference point
    pub offset: Offset,
}

impl WellLocation {
    /// Top of the well, no offset
    #[must_use]
    pub fn top() -> Self {
        Self::default()
    }

    /// Set the origin
    #[must_use]
    pub fn with_origin(mut self, origin: WellOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Set the offset
    #[must_use]
    pub fn with_offset(mut self, x: f64, y: f64, z: f64) -> Self {
        self.offset = Offset::new(x, y, z);
        self
    }
}

/// `location` field of a `loadLabware` command
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotLocation {
    /// Deck slot, serialized as a string
    pub slot_name: DeckSlot,
}

/// Params of `loadLabware`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadLabwareParams {
    /// Target slot
    pub location: SlotLocation,
    /// Labware definition name
    pub load_name: String,
    /// Labware namespace
    pub namespace: String,
    /// Labware definition version
    pub version: u32,
}

/// Params of `loadPipette`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadPipetteParams {
    /// Pipette model name (e.g. `p1000_single_gen2`)
    pub pipette_name: String,
    /// Mount side
    pub mount: Mount,
}

/// Params of `pickUpTip`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickUpTipParams {
    /// Remote pipette id
    pub pipette_id: String,
    /// Remote labware id
    pub labware_id: String,
    /// Well name
    pub well_name: String,
    /// Position within the well
    pub well_location: WellLocation,
}

/// Params of `dropTip`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropTipParams {
    /// Remote pipette id
    pub pipette_id: String,
    /// Remote labware id
    pub labware_id: String,
    /// Well name
    pub well_name: String,
    /// Position within the well
    pub well_location: WellLocation,
    /// Home the plunger after dropping
    pub home_after: bool,
    /// Let the robot pick an alternate spot in the trash
    pub alternate_drop_location: bool,
}

/// Params shared by `aspirate` and `dispense`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidParams {
    /// Remote labware id
    pub labware_id: String,
    /// Well name
    pub well_name: String,
    /// Position within the well
    pub well_location: WellLocation,
    /// Flow rate in uL/s; omitted to use the instrument default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<f64>,
    /// Volume in uL
    pub volume: f64,
    /// Remote pipette id
    pub pipette_id: String,
}

/// Params of `moveToWell`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveToWellParams {
    /// Remote labware id
    pub labware_id: String,
    /// Well name
    pub well_name: String,
    /// Position within the well
    pub well_location: WellLocation,
    /// Remote pipette id
    pub pipette_id: String,
}

/// A run-scoped command with its params
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "commandType", content = "params", rename_all = "camelCase")]
pub enum Command {
    /// `loadLabware`
    LoadLabware(LoadLabwareParams),
    /// `loadPipette`
    LoadPipette(LoadPipetteParams),
    /// `pickUpTip`
    PickUpTip(PickUpTipParams),
    /// `dropTip`
    DropTip(DropTipParams),
    /// `aspirate`
    Aspirate(LiquidParams),
    /// `dispense`
    Dispense(LiquidParams),
    /// `moveToWell`
    MoveToWell(MoveToWellParams),
}

impl Command {
    /// Instruction kind of this command
    #[must_use]
    pub fn command_type(&self) -> CommandType {
        match self {
            Self::LoadLabware(_) => CommandType::LoadLabware,
            Self::LoadPipette(_) => CommandType::LoadPipette,
            Self::PickUpTip(_) => CommandType::PickUpTip,
            Self::DropTip(_) => CommandType::DropTip,
            Self::Aspirate(_) => CommandType::Aspirate,
            Self::Dispense(_) => CommandType::Dispense,
            Self::MoveToWell(_) => CommandType::MoveToWell,
        }
    }
}

/// A command plus its intent, ready to be posted
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommandEnvelope {
    #[serde(flatten)]
    command: Command,
    intent: Intent,
}

impl CommandEnvelope {
    /// Wrap a command with the default `setup` intent
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command,
            intent: Intent::default(),
        }
    }

    /// `loadLabware` into `slot`
    #[must_use]
    pub fn load_labware(
        slot: DeckSlot,
        load_name: impl Into<String>,
        namespace: impl Into<String>,
        version: u32,
    ) -> Self {
        Self::new(Command::LoadLabware(LoadLabwareParams {
            location: SlotLocation { slot_name: slot },
            load_name: load_name.into(),
            namespace: namespace.into(),
            version,
        }))
    }

    /// `loadPipette` onto `mount`
    #[must_use]
    pub fn load_pipette(pipette_name: impl Into<String>, mount: Mount) -> Self {
        Self::new(Command::LoadPipette(LoadPipetteParams {
            pipette_name: pipette_name.into(),
            mount,
        }))
    }

    /// `pickUpTip` from a well
    #[must_use]
    pub fn pick_up_tip(
        pipette_id: impl Into<String>,
        labware_id: impl Into<String>,
        well_name: impl Into<String>,
        well_location: WellLocation,
    ) -> Self {
        Self::new(Command::PickUpTip(PickUpTipParams {
            pipette_id: pipette_id.into(),
            labware_id: labware_id.into(),
            well_name: well_name.into(),
            well_location,
        }))
    }

    /// `dropTip` into a well
    #[must_use]
    pub fn drop_tip(
        pipette_id: impl Into<String>,
        labware_id: impl Into<String>,
        well_name: impl Into<String>,
        well_location: WellLocation,
        home_after: bool,
        alternate_drop_location: bool,
    ) -> Self {
        Self::new(Command::DropTip(DropTipParams {
            pipette_id: pipette_id.into(),
            labware_id: labware_id.into(),
            well_name: well_name.into(),
            well_location,
            home_after,
            alternate_drop_location,
        }))
    }

    /// `aspirate` a volume (uL) from a well
    #[must_use]
    pub fn aspirate(params: LiquidParams) -> Self {
        Self::new(Command::Aspirate(params))
    }

    /// `dispense` a volume (uL) into a well
    #[must_use]
    pub fn dispense(params: LiquidParams) -> Self {
        Self::new(Command::Dispense(params))
    }

    /// `moveToWell`
    #[must_use]
    pub fn move_to_well(
        labware_id: impl Into<String>,
        well_name: impl Into<String>,
        pipette_id: impl Into<String>,
        well_location: WellLocation,
    ) -> Self {
        Self::new(Command::MoveToWell(MoveToWellParams {
            labware_id: labware_id.into(),
            well_name: well_name.into(),
            well_location,
            pipette_id: pipette_id.into(),
        }))
    }

    /// Set the intent
    #[must_use]
    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }

    /// Instruction kind
    #[must_use]
    pub fn command_type(&self) -> CommandType {
        self.command.command_type()
    }

    /// The wrapped command
    #[must_use]
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Intent tag
    #[must_use]
    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// The `params` object as JSON
    #[must_use]
    pub fn params(&self) -> Value {
        let mut value = serde_json::json!(self);
        value
            .get_mut("params")
            .map(Value::take)
            .unwrap_or_default()
    }

    /// Full request body: `{"data": {commandType, params, intent}}`
    #[must_use]
    pub fn to_body(&self) -> Value {
        serde_json::json!({ "data": self })
    }
}

/// Body of the home request
#[must_use]
pub fn home_body() -> Value {
    serde_json::json!({ "target": "robot" })
}

/// Body of a custom labware upload
///
/// The definition is sent verbatim inside a `data` envelope. A payload that
/// already carries a top-level `data` key is assumed to be a complete
/// request body and is passed through untouched.
#[must_use]
pub fn custom_labware_body(definition: Value) -> Value {
    if definition.get("data").is_some() {
        definition
    } else {
        serde_json::json!({ "data": definition })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn liquid(volume: f64, flow_rate: Option<f64>) -> LiquidParams {
        LiquidParams {
            labware_id: "lw-2".to_string(),
            well_name: "B3".to_string(),
            well_location: WellLocation::top(),
            flow_rate,
            volume,
            pipette_id: "pip-1".to_string(),
        }
    }

    #[test]
    fn test_load_labware_shape() {
        let slot = DeckSlot::new(1).unwrap();
        let envelope = CommandEnvelope::load_labware(
            slot,
            "opentrons_96_tiprack_1000ul",
            DEFAULT_LABWARE_NAMESPACE,
            DEFAULT_LABWARE_VERSION,
        );

        assert_eq!(
            envelope.to_body(),
            json!({
                "data": {
                    "commandType": "loadLabware",
                    "params": {
                        "location": {"slotName": "1"},
                        "loadName": "opentrons_96_tiprack_1000ul",
                        "namespace": "opentrons",
                        "version": 1
                    },
                    "intent": "setup"
                }
            })
        );
    }

    #[test]
    fn test_load_pipette_shape() {
        let envelope = CommandEnvelope::load_pipette("p1000_single_gen2", Mount::Right);
        assert_eq!(
            envelope.to_body(),
            json!({
                "data": {
                    "commandType": "loadPipette",
                    "params": {"pipetteName": "p1000_single_gen2", "mount": "right"},
                    "intent": "setup"
                }
            })
        );
    }

    #[test]
    fn test_pick_up_tip_shape() {
        let envelope = CommandEnvelope::pick_up_tip("pip-9", "lw-1", "A1", WellLocation::top());
        assert_eq!(
            envelope.to_body(),
            json!({
                "data": {
                    "commandType": "pickUpTip",
                    "params": {
                        "pipetteId": "pip-9",
                        "labwareId": "lw-1",
                        "wellName": "A1",
                        "wellLocation": {
                            "origin": "top",
                            "offset": {"x": 0.0, "y": 0.0, "z": 0.0}
                        }
                    },
                    "intent": "setup"
                }
            })
        );
    }

    #[test]
    fn test_drop_tip_shape() {
        let envelope = CommandEnvelope::drop_tip(
            "pip-9",
            "fixed-trash",
            "A1",
            WellLocation::top(),
            false,
            false,
        )
        .with_intent(Intent::Protocol);

        assert_eq!(
            envelope.to_body(),
            json!({
                "data": {
                    "commandType": "dropTip",
                    "params": {
                        "pipetteId": "pip-9",
                        "labwareId": "fixed-trash",
                        "wellName": "A1",
                        "wellLocation": {
                            "origin": "top",
                            "offset": {"x": 0.0, "y": 0.0, "z": 0.0}
                        },
                        "homeAfter": false,
                        "alternateDropLocation": false
                    },
                    "intent": "protocol"
                }
            })
        );
    }

    #[test]
    fn test_aspirate_and_dispense_shapes() {
        let aspirate = CommandEnvelope::aspirate(liquid(50.0, Some(0.75)));
        assert_eq!(
            aspirate.to_body(),
            json!({
                "data": {
                    "commandType": "aspirate",
                    "params": {
                        "labwareId": "lw-2",
                        "wellName": "B3",
                        "wellLocation": {
                            "origin": "top",
                            "offset": {"x": 0.0, "y": 0.0, "z": 0.0}
                        },
                        "flowRate": 0.75,
                        "volume": 50.0,
                        "pipetteId": "pip-1"
                    },
                    "intent": "setup"
                }
            })
        );

        // Without a flow rate the instrument default applies and the field is omitted
        let dispense = CommandEnvelope::dispense(liquid(25.5, None));
        assert_eq!(dispense.command_type(), CommandType::Dispense);
        let params = dispense.params();
        assert!(params.get("flowRate").is_none());
        assert_eq!(params["volume"], json!(25.5));
    }

    #[test]
    fn test_move_to_well_with_offset() {
        let location = WellLocation::top()
            .with_origin(WellOrigin::Bottom)
            .with_offset(1.5, -2.0, 3.25);
        let envelope = CommandEnvelope::move_to_well("lw-3", "C7", "pip-1", location);

        assert_eq!(
            envelope.params(),
            json!({
                "labwareId": "lw-3",
                "wellName": "C7",
                "wellLocation": {
                    "origin": "bottom",
                    "offset": {"x": 1.5, "y": -2.0, "z": 3.25}
                },
                "pipetteId": "pip-1"
            })
        );
    }

    #[test]
    fn test_building_is_deterministic() {
        let build = || CommandEnvelope::pick_up_tip("p", "l", "H12", WellLocation::top());
        let first = build().to_body();
        let _ = CommandEnvelope::load_pipette("p20_single_gen2", Mount::Left).to_body();
        let second = build().to_body();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&build()).unwrap(),
            serde_json::to_string(&build()).unwrap()
        );
    }

    #[test]
    fn test_deck_slot_bounds() {
        assert!(DeckSlot::new(0).is_err());
        assert!(DeckSlot::new(13).is_err());
        assert!(DeckSlot::new(300).is_err());
        assert_eq!(DeckSlot::new(12).unwrap(), DeckSlot::FIXED_TRASH);
        assert_eq!(json!(DeckSlot::new(7).unwrap()), json!("7"));
        assert!(matches!(
            DeckSlot::try_from(42_u32),
            Err(SessionError::InvalidSlot { slot: 42 })
        ));
    }

    #[test]
    fn test_command_type_names() {
        assert_eq!(CommandType::MoveToWell.to_string(), "moveToWell");
        assert_eq!(json!(CommandType::PickUpTip), json!("pickUpTip"));
        assert!(CommandType::Aspirate.is_run_command());
        assert!(!CommandType::Home.is_run_command());
        assert!(!CommandType::LoadCustomLabware.is_run_command());
    }

    #[test]
    fn test_home_and_custom_labware_bodies() {
        assert_eq!(home_body(), json!({"target": "robot"}));

        let definition = json!({"metadata": {"displayName": "Cartridge"}, "wells": {}});
        assert_eq!(
            custom_labware_body(definition.clone()),
            json!({"data": definition})
        );

        let wrapped = json!({"data": {"wells": {}}});
        assert_eq!(custom_labware_body(wrapped.clone()), wrapped);
    }
}
