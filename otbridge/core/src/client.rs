//! Opentrons Client
//!
//! The public facade. One client owns one run on one robot, the alias
//! registry for everything loaded into that run, and the tip state of each
//! pipette.
//!
//! # Operation Flow
//!
//! ```text
//! caller ──► precondition checks ──► envelope ──► dispatcher ──► transport
//!            (run active, aliases,                    │
//!             tip state, volume)                      ▼
//!                   │                        confirmed success?
//!                   ▼                           │          │
//!            local error, no request           yes         no
//!                                               │          │
//!                                    registry / tracker   error, state
//!                                    updated              unchanged
//! ```
//!
//! Every public operation takes `&mut self` and awaits its single round
//! trip before returning, so operations on one client never interleave.
//! There are no retries and no rollback.
//!
//! # Example
//!
//! ```ignore
//! let mut client = OpentronsClient::connect(ClientConfig::new("169.254.10.12")).await?;
//! client.load_labware("tiprack", 1, "opentrons_96_tiprack_1000ul").await?;
//! client.load_pipette("right", "p1000_single_gen2", Mount::Right).await?;
//! client.pick_up_tip("tiprack", "right", "A1").await?;
//! client.drop_tip_in_trash("right").await?;
//! client.teardown().await;
//! ```

use serde_json::Value;
use tokio::sync::mpsc;

use crate::command::{
    custom_labware_body, home_body, CommandEnvelope, CommandType, DeckSlot, Intent, LiquidParams,
    Mount, WellLocation, WellOrigin, DEFAULT_LABWARE_NAMESPACE, DEFAULT_LABWARE_VERSION,
};
use crate::config::ClientConfig;
use crate::dispatch::{CommandDispatcher, CommandResult};
use crate::error::{Result, SessionError};
use crate::events::{EventSink, SessionEvent};
use crate::pipette::{PipetteTracker, TipState};
use crate::registry::{EntityRegistry, LabwareRef, PipetteRef, FIXED_TRASH};
use crate::session::{Run, RunStatus, SessionManager, TeardownOutcome};
use crate::transport::{HttpTransport, RobotApi, RobotTransport};

/// Well used by [`OpentronsClient::drop_tip_in_trash`]
pub const TRASH_WELL: &str = "A1";

// =============================================================================
// Per-call options
// =============================================================================

/// Options for loading labware
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabwareLoad {
    /// Deck slot (1-12)
    pub slot: u32,
    /// Labware definition name
    pub load_name: String,
    /// Labware namespace
    pub namespace: String,
    /// Labware definition version
    pub version: u32,
    /// Intent tag
    pub intent: Intent,
}

impl LabwareLoad {
    /// Load `load_name` into `slot` from the default namespace
    pub fn new(slot: u32, load_name: impl Into<String>) -> Self {
        Self {
            slot,
            load_name: load_name.into(),
            namespace: DEFAULT_LABWARE_NAMESPACE.to_string(),
            version: DEFAULT_LABWARE_VERSION,
            intent: Intent::default(),
        }
    }

    /// Set the namespace
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the definition version
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the intent
    #[must_use]
    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }
}

/// Options for instructions that target a well
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WellOptions {
    /// Position within the well
    pub well_location: WellLocation,
    /// Intent tag
    pub intent: Intent,
}

impl WellOptions {
    /// Set the well origin
    #[must_use]
    pub fn with_origin(mut self, origin: WellOrigin) -> Self {
        self.well_location = self.well_location.with_origin(origin);
        self
    }

    /// Set the offset (mm)
    #[must_use]
    pub fn with_offset(mut self, x: f64, y: f64, z: f64) -> Self {
        self.well_location = self.well_location.with_offset(x, y, z);
        self
    }

    /// Set the intent
    #[must_use]
    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }
}

/// Options for dropping a tip
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DropTipOptions {
    /// Position within the well
    pub well_location: WellLocation,
    /// Home the plunger after dropping
    pub home_after: bool,
    /// Let the robot pick an alternate spot in the trash
    pub alternate_drop_location: bool,
    /// Intent tag
    pub intent: Intent,
}

impl DropTipOptions {
    /// Set the well location
    #[must_use]
    pub fn with_location(mut self, well_location: WellLocation) -> Self {
        self.well_location = well_location;
        self
    }

    /// Home the plunger after dropping
    #[must_use]
    pub fn with_home_after(mut self, home_after: bool) -> Self {
        self.home_after = home_after;
        self
    }

    /// Allow an alternate drop location
    #[must_use]
    pub fn with_alternate_drop_location(mut self, alternate: bool) -> Self {
        self.alternate_drop_location = alternate;
        self
    }

    /// Set the intent
    #[must_use]
    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }
}

/// Options for aspirate and dispense
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LiquidOptions {
    /// Position within the well
    pub well_location: WellLocation,
    /// Flow rate in uL/s; `None` uses the instrument default
    pub flow_rate: Option<f64>,
    /// Intent tag
    pub intent: Intent,
}

impl LiquidOptions {
    /// Set the well location
    #[must_use]
    pub fn with_location(mut self, well_location: WellLocation) -> Self {
        self.well_location = well_location;
        self
    }

    /// Set the flow rate (uL/s)
    #[must_use]
    pub fn with_flow_rate(mut self, flow_rate: f64) -> Self {
        self.flow_rate = Some(flow_rate);
        self
    }

    /// Set the intent
    #[must_use]
    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }
}

/// Result of a custom labware upload
#[derive(Clone, Debug, PartialEq)]
pub struct CustomLabware {
    /// `namespace/loadName/version` reported by the robot
    pub definition_uri: Option<String>,
    /// Raw dispatch result
    pub result: CommandResult,
}

// =============================================================================
// Client
// =============================================================================

/// Session client for one robot run
pub struct OpentronsClient<T: RobotTransport = HttpTransport> {
    config: ClientConfig,
    transport: T,
    session: SessionManager,
    dispatcher: CommandDispatcher,
    registry: EntityRegistry,
    tips: PipetteTracker,
    events: EventSink,
}

impl OpentronsClient<HttpTransport> {
    /// Connect to a robot over HTTP and create a run
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is invalid, `RunCreation` if the robot
    /// does not create the run.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport =
            HttpTransport::new(config.request_timeout).map_err(|source| SessionError::Transport {
                command: CommandType::CreateRun,
                source,
            })?;
        Self::connect_with(transport, config).await
    }
}

impl<T: RobotTransport> OpentronsClient<T> {
    /// Create a run using the given transport
    ///
    /// # Errors
    ///
    /// Same as [`OpentronsClient::connect`].
    pub async fn connect_with(transport: T, config: ClientConfig) -> Result<Self> {
        Self::open(transport, config, EventSink::disabled()).await
    }

    /// Create a run and report every session event on `tx`, including the
    /// run creation itself
    ///
    /// # Errors
    ///
    /// Same as [`OpentronsClient::connect`].
    pub async fn connect_observed(
        transport: T,
        config: ClientConfig,
        tx: mpsc::Sender<SessionEvent>,
    ) -> Result<Self> {
        Self::open(transport, config, EventSink::new(tx)).await
    }

    async fn open(transport: T, config: ClientConfig, events: EventSink) -> Result<Self> {
        config.validate()?;

        let api = RobotApi::from_config(&config);
        tracing::info!(
            robot = %api.base_url(),
            transport = transport.name(),
            "Opening run"
        );

        let mut session = SessionManager::new(api.clone());
        match session.open(&transport).await {
            Ok(run) => events.emit(SessionEvent::RunOpened {
                run_id: run.id().to_string(),
                command_endpoint: run.command_endpoint().to_string(),
            }),
            Err(e) => {
                events.emit(SessionEvent::CommandFailed {
                    command: CommandType::CreateRun,
                    status: e.status(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        }

        Ok(Self {
            registry: EntityRegistry::new(config.alias_policy),
            config,
            transport,
            session,
            dispatcher: CommandDispatcher::new(api),
            tips: PipetteTracker::new(),
            events,
        })
    }

    /// Attach an event channel
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::Sender<SessionEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load labware into a deck slot and register it under `alias`
    ///
    /// Returns the labware id assigned by the robot.
    pub async fn load_labware(&mut self, alias: &str, slot: u32, load_name: &str) -> Result<String> {
        self.load_labware_with(alias, LabwareLoad::new(slot, load_name))
            .await
    }

    /// Load labware with an explicit namespace, version or intent
    pub async fn load_labware_with(&mut self, alias: &str, load: LabwareLoad) -> Result<String> {
        let command = CommandType::LoadLabware;
        let (endpoint, slot) = self
            .prepare_labware(alias, &load)
            .map_err(|e| self.rejected(command, e))?;

        let envelope =
            CommandEnvelope::load_labware(slot, &load.load_name, &load.namespace, load.version)
                .with_intent(load.intent);
        let result = self.run_command(&envelope, &endpoint).await?;
        let labware_id = required_field(&result, "labwareId")?;

        self.registry.register_labware(LabwareRef::new(
            alias,
            labware_id.clone(),
            slot,
            Some(load.load_name),
        ))?;
        tracing::info!(alias, labware_id = %labware_id, %slot, "Labware loaded");

        Ok(labware_id)
    }

    /// Upload a custom labware definition to the run
    ///
    /// A raw definition is wrapped as `{"data": definition}` before upload; a
    /// body that already has a top-level `data` key is sent verbatim. Load it
    /// afterwards with [`OpentronsClient::load_labware_with`] using its
    /// namespace and version.
    pub async fn load_custom_labware(&mut self, definition: Value) -> Result<CustomLabware> {
        let command = CommandType::LoadCustomLabware;
        let endpoint = self
            .session
            .labware_definitions_endpoint()
            .map_err(|e| self.rejected(command, e))?;

        let body = custom_labware_body(definition);
        self.events.emit(SessionEvent::CommandSent {
            command,
            intent: None,
            body: body.clone(),
        });

        let outcome = self
            .dispatcher
            .upload_labware_definition(&self.transport, &endpoint, body)
            .await;
        let result = self.report(command, outcome)?;
        let definition_uri = result.field_str("definitionUri").map(str::to_string);

        tracing::info!(definition_uri = ?definition_uri, "Custom labware definition uploaded");
        Ok(CustomLabware {
            definition_uri,
            result,
        })
    }

    /// Load a pipette onto a mount and register it under `alias`
    ///
    /// Returns the pipette id assigned by the robot. The pipette starts with
    /// no tip.
    pub async fn load_pipette(
        &mut self,
        alias: &str,
        pipette_name: &str,
        mount: Mount,
    ) -> Result<String> {
        let command = CommandType::LoadPipette;
        let endpoint = self
            .endpoint()
            .and_then(|endpoint| {
                self.registry.check_pipette_alias(alias)?;
                Ok(endpoint)
            })
            .map_err(|e| self.rejected(command, e))?;

        let envelope = CommandEnvelope::load_pipette(pipette_name, mount);
        let result = self.run_command(&envelope, &endpoint).await?;
        let pipette_id = required_field(&result, "pipetteId")?;

        self.registry
            .register_pipette(PipetteRef::new(alias, pipette_id.clone(), mount, pipette_name))?;
        self.tips.track(alias);
        tracing::info!(alias, pipette_id = %pipette_id, %mount, "Pipette loaded");

        Ok(pipette_id)
    }

    // =========================================================================
    // Tips
    // =========================================================================

    /// Pick up a tip from `well` of `labware`
    pub async fn pick_up_tip(
        &mut self,
        labware: &str,
        pipette: &str,
        well: &str,
    ) -> Result<CommandResult> {
        self.pick_up_tip_with(labware, pipette, well, WellOptions::default())
            .await
    }

    /// Pick up a tip with an explicit well location or intent
    ///
    /// Fails with `PipetteOccupied` before sending anything if the pipette
    /// already holds a tip.
    pub async fn pick_up_tip_with(
        &mut self,
        labware: &str,
        pipette: &str,
        well: &str,
        options: WellOptions,
    ) -> Result<CommandResult> {
        let command = CommandType::PickUpTip;
        let (endpoint, labware_id, pipette_id) = self
            .prepare_targets(labware, pipette)
            .and_then(|targets| {
                self.tips.ensure_can_pick_up(pipette)?;
                Ok(targets)
            })
            .map_err(|e| self.rejected(command, e))?;

        let envelope =
            CommandEnvelope::pick_up_tip(pipette_id, labware_id, well, options.well_location)
                .with_intent(options.intent);
        let result = self.run_command(&envelope, &endpoint).await?;

        self.tips.mark_occupied(pipette)?;
        Ok(result)
    }

    /// Drop the held tip into `well` of `labware`
    pub async fn drop_tip(
        &mut self,
        labware: &str,
        pipette: &str,
        well: &str,
    ) -> Result<CommandResult> {
        self.drop_tip_with(labware, pipette, well, DropTipOptions::default())
            .await
    }

    /// Drop the held tip into the robot's fixed trash
    pub async fn drop_tip_in_trash(&mut self, pipette: &str) -> Result<CommandResult> {
        self.drop_tip(FIXED_TRASH, pipette, TRASH_WELL).await
    }

    /// Drop the held tip with explicit options
    ///
    /// Fails with `NoTipToDrop` before sending anything if the pipette holds
    /// no tip.
    pub async fn drop_tip_with(
        &mut self,
        labware: &str,
        pipette: &str,
        well: &str,
        options: DropTipOptions,
    ) -> Result<CommandResult> {
        let command = CommandType::DropTip;
        let (endpoint, labware_id, pipette_id) = self
            .prepare_targets(labware, pipette)
            .and_then(|targets| {
                self.tips.ensure_can_drop(pipette)?;
                Ok(targets)
            })
            .map_err(|e| self.rejected(command, e))?;

        let envelope = CommandEnvelope::drop_tip(
            pipette_id,
            labware_id,
            well,
            options.well_location,
            options.home_after,
            options.alternate_drop_location,
        )
        .with_intent(options.intent);
        let result = self.run_command(&envelope, &endpoint).await?;

        self.tips.mark_empty(pipette)?;
        Ok(result)
    }

    // =========================================================================
    // Liquid handling and motion
    // =========================================================================

    /// Aspirate `volume` uL from `well` of `labware`
    pub async fn aspirate(
        &mut self,
        labware: &str,
        pipette: &str,
        well: &str,
        volume: f64,
    ) -> Result<CommandResult> {
        self.aspirate_with(labware, pipette, well, volume, LiquidOptions::default())
            .await
    }

    /// Aspirate with an explicit flow rate, well location or intent
    pub async fn aspirate_with(
        &mut self,
        labware: &str,
        pipette: &str,
        well: &str,
        volume: f64,
        options: LiquidOptions,
    ) -> Result<CommandResult> {
        self.liquid(Liquid::Aspirate, labware, pipette, well, volume, options)
            .await
    }

    /// Dispense `volume` uL into `well` of `labware`
    pub async fn dispense(
        &mut self,
        labware: &str,
        pipette: &str,
        well: &str,
        volume: f64,
    ) -> Result<CommandResult> {
        self.dispense_with(labware, pipette, well, volume, LiquidOptions::default())
            .await
    }

    /// Dispense with an explicit flow rate, well location or intent
    pub async fn dispense_with(
        &mut self,
        labware: &str,
        pipette: &str,
        well: &str,
        volume: f64,
        options: LiquidOptions,
    ) -> Result<CommandResult> {
        self.liquid(Liquid::Dispense, labware, pipette, well, volume, options)
            .await
    }

    /// Move the pipette to `well` of `labware`
    pub async fn move_to_well(
        &mut self,
        labware: &str,
        pipette: &str,
        well: &str,
    ) -> Result<CommandResult> {
        self.move_to_well_with(labware, pipette, well, WellOptions::default())
            .await
    }

    /// Move with an explicit well location or intent
    pub async fn move_to_well_with(
        &mut self,
        labware: &str,
        pipette: &str,
        well: &str,
        options: WellOptions,
    ) -> Result<CommandResult> {
        let command = CommandType::MoveToWell;
        let (endpoint, labware_id, pipette_id) = self
            .prepare_targets(labware, pipette)
            .map_err(|e| self.rejected(command, e))?;

        let envelope =
            CommandEnvelope::move_to_well(labware_id, well, pipette_id, options.well_location)
                .with_intent(options.intent);
        self.run_command(&envelope, &endpoint).await
    }

    /// Home all axes
    ///
    /// Uses the robot-level endpoint, so it does not need an active run.
    pub async fn home(&mut self) -> Result<()> {
        let command = CommandType::Home;
        self.events.emit(SessionEvent::CommandSent {
            command,
            intent: None,
            body: home_body(),
        });

        match self.dispatcher.home(&self.transport).await {
            Ok(response) => {
                self.events.emit(SessionEvent::Homed {
                    status: response.status,
                });
                Ok(())
            }
            Err(e) => {
                self.events.emit(SessionEvent::CommandFailed {
                    command,
                    status: e.status(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Delete the run
    ///
    /// Never fails. Later run-scoped operations fail with `RunNotActive`;
    /// calling teardown again sends nothing.
    pub async fn teardown(&mut self) -> TeardownOutcome {
        let outcome = self.session.close(&self.transport).await;
        if !outcome.already_closed {
            if let Some(ref run_id) = outcome.run_id {
                self.events.emit(SessionEvent::RunClosed {
                    run_id: run_id.clone(),
                    status: outcome.status,
                });
            }
        }
        outcome
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// The run
    #[must_use]
    pub fn run(&self) -> Option<&Run> {
        self.session.run()
    }

    /// Run lifecycle status
    #[must_use]
    pub fn run_status(&self) -> RunStatus {
        self.session.status()
    }

    /// Alias registry
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Tip state of a pipette
    pub fn tip_state(&self, pipette: &str) -> Result<TipState> {
        self.tips.state(pipette)
    }

    /// Configuration the client was built with
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The transport
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn endpoint(&self) -> Result<String> {
        self.session.command_endpoint().map(str::to_string)
    }

    fn prepare_labware(&self, alias: &str, load: &LabwareLoad) -> Result<(String, DeckSlot)> {
        let endpoint = self.endpoint()?;
        let slot = DeckSlot::new(load.slot)?;
        self.registry.check_labware_alias(alias)?;
        Ok((endpoint, slot))
    }

    /// Endpoint plus resolved labware and pipette ids
    fn prepare_targets(&self, labware: &str, pipette: &str) -> Result<(String, String, String)> {
        let endpoint = self.endpoint()?;
        let pipette_id = self.registry.resolve_pipette(pipette)?.to_string();
        let labware_id = self.registry.resolve_labware(labware)?.to_string();
        Ok((endpoint, labware_id, pipette_id))
    }

    async fn liquid(
        &mut self,
        action: Liquid,
        labware: &str,
        pipette: &str,
        well: &str,
        volume: f64,
        options: LiquidOptions,
    ) -> Result<CommandResult> {
        let command = action.command_type();
        let (endpoint, labware_id, pipette_id) = self
            .endpoint()
            .and_then(|_| validate_volume(volume))
            .and_then(|()| options.flow_rate.map_or(Ok(()), validate_flow_rate))
            .and_then(|()| self.prepare_targets(labware, pipette))
            .map_err(|e| self.rejected(command, e))?;

        let params = LiquidParams {
            labware_id,
            well_name: well.to_string(),
            well_location: options.well_location,
            flow_rate: options.flow_rate,
            volume,
            pipette_id,
        };
        let envelope = action.envelope(params).with_intent(options.intent);

        self.run_command(&envelope, &endpoint).await
    }

    async fn run_command(
        &self,
        envelope: &CommandEnvelope,
        endpoint: &str,
    ) -> Result<CommandResult> {
        let command = envelope.command_type();
        self.events.emit(SessionEvent::CommandSent {
            command,
            intent: Some(envelope.intent()),
            body: envelope.to_body(),
        });

        let outcome = self
            .dispatcher
            .dispatch(&self.transport, envelope, endpoint)
            .await;
        self.report(command, outcome)
    }

    fn report(
        &self,
        command: CommandType,
        outcome: Result<CommandResult>,
    ) -> Result<CommandResult> {
        match outcome {
            Ok(ref result) => self.events.emit(SessionEvent::CommandSucceeded {
                command,
                status: result.raw_status,
                result: result.result_fields.clone(),
            }),
            Err(ref e) => self.events.emit(SessionEvent::CommandFailed {
                command,
                status: e.status(),
                message: e.to_string(),
            }),
        }
        outcome
    }

    fn rejected(&self, command: CommandType, error: SessionError) -> SessionError {
        tracing::debug!(command = %command, error = %error, "Rejected before dispatch");
        self.events.emit(SessionEvent::CommandFailed {
            command,
            status: None,
            message: error.to_string(),
        });
        error
    }
}

impl<T: RobotTransport> Drop for OpentronsClient<T> {
    fn drop(&mut self) {
        if self.session.is_active() {
            tracing::warn!(
                run_id = ?self.session.run_id(),
                "Client dropped without teardown; run left on the robot"
            );
        }
    }
}

/// Aspirate or dispense
#[derive(Clone, Copy)]
enum Liquid {
    Aspirate,
    Dispense,
}

impl Liquid {
    fn command_type(self) -> CommandType {
        match self {
            Self::Aspirate => CommandType::Aspirate,
            Self::Dispense => CommandType::Dispense,
        }
    }

    fn envelope(self, params: LiquidParams) -> CommandEnvelope {
        match self {
            Self::Aspirate => CommandEnvelope::aspirate(params),
            Self::Dispense => CommandEnvelope::dispense(params),
        }
    }
}

/// A string field the robot must report for a successful command
fn required_field(result: &CommandResult, name: &str) -> Result<String> {
    result
        .field_str(name)
        .map(str::to_string)
        .ok_or_else(|| {
            tracing::warn!(command = %result.command, field = name, "Response missing field");
            SessionError::CommandExecution {
                command: result.command,
                status: result.raw_status,
                body: result.raw_body.clone(),
            }
        })
}

fn validate_volume(volume: f64) -> Result<()> {
    if volume.is_finite() && volume >= 0.0 {
        Ok(())
    } else {
        Err(SessionError::InvalidVolume { volume })
    }
}

fn validate_flow_rate(flow_rate: f64) -> Result<()> {
    if flow_rate.is_finite() && flow_rate >= 0.0 {
        Ok(())
    } else {
        Err(SessionError::InvalidFlowRate { flow_rate })
    }
}
