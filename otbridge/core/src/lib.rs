//! otbridge Core - Run-Scoped Session Client for the Opentrons HTTP API
//!
//! This crate drives an Opentrons liquid-handling robot through its HTTP
//! command API. A client creates one run, loads labware and pipettes into
//! it under caller-chosen aliases, and issues tip, liquid and motion
//! instructions that reference those aliases. Teardown deletes the run.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      OpentronsClient                          │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌─────────┐ │
//! │  │  Session   │  │   Entity   │  │  Pipette   │  │ Event   │ │
//! │  │  Manager   │  │  Registry  │  │  Tracker   │  │ Sink    │ │
//! │  └─────┬──────┘  └─────┬──────┘  └─────┬──────┘  └─────────┘ │
//! │        │   run id      │  remote ids   │  tip state          │
//! │        └───────────────┼───────────────┘                     │
//! │                        ▼                                     │
//! │               CommandEnvelope (pure)                         │
//! │                        │                                     │
//! │               CommandDispatcher                              │
//! └────────────────────────┼─────────────────────────────────────┘
//!                          │ RobotRequest / RobotResponse
//!                ┌─────────┴──────────┐
//!                │   RobotTransport   │
//!                │  HttpTransport     │──► http://robot:31950
//!                │  ScriptedTransport │
//!                └────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use otbridge_core::{load_config, Mount, OpentronsClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config()?;
//!     let mut client = OpentronsClient::connect(config).await?;
//!
//!     client.load_labware("tiprack", 1, "opentrons_96_tiprack_1000ul").await?;
//!     client.load_labware("plate", 2, "corning_96_wellplate_360ul_flat").await?;
//!     client.load_pipette("right", "p1000_single_gen2", Mount::Right).await?;
//!
//!     client.pick_up_tip("tiprack", "right", "A1").await?;
//!     client.aspirate("plate", "right", "A1", 100.0).await?;
//!     client.dispense("plate", "right", "B1", 100.0).await?;
//!     client.drop_tip_in_trash("right").await?;
//!
//!     client.teardown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`client`]: The public facade
//! - [`session`]: Run creation and teardown
//! - [`registry`]: Alias to remote id mapping
//! - [`pipette`]: Tip state per pipette
//! - [`command`]: Pure command envelope builder
//! - [`dispatch`]: Request sending and response classification
//! - [`transport`]: HTTP seam (reqwest and scripted implementations)
//! - [`events`]: Optional observability channel
//! - [`config`]: Layered configuration
//! - [`error`]: Typed errors
//!
//! # Logging
//!
//! The crate logs through `tracing` and never installs a subscriber.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod pipette;
pub mod registry;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use client::{
    CustomLabware, DropTipOptions, LabwareLoad, LiquidOptions, OpentronsClient, WellOptions,
};
pub use command::{
    CommandEnvelope, CommandType, DeckSlot, Intent, Mount, Offset, WellLocation, WellOrigin,
};
pub use dispatch::{CommandDispatcher, CommandResult};
pub use error::{EntityKind, Result, SessionError, TransportError};
pub use events::{EventSink, SessionEvent};
pub use pipette::{PipetteTracker, TipState};
pub use registry::{AliasPolicy, EntityRegistry, LabwareRef, PipetteRef, FIXED_TRASH};
pub use session::{Run, RunStatus, SessionManager, TeardownOutcome};
pub use transport::{HttpTransport, RobotApi, RobotTransport, ScriptedTransport};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ClientToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
