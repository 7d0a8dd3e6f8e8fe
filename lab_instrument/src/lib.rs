//! # Lab Instrument Library
//!
//! Drives laboratory instruments over a command/response bus and programs
//! pulse-sequencer boards with packed binary instructions.
//!
//! # Module Structure
//!
//! - [`resource`] - Resource managers: simulation and raw TCP sockets
//! - [`transport`] - Connected/disconnected command channel over a resource
//! - [`checked`] - Error-status checking wrapper for any command
//! - [`device`] - Lifecycle trait shared by all instruments
//! - [`bus`] - Template-driven bus instruments
//! - [`sequencer`] - Pulse-sequencer state machine, encoder and drivers
//! - [`builtin`] - Built-in capability records
//! - [`registry`] - Arena owning every instrument
//! - [`config`] - `lab.toml` loading and instrument construction
//! - [`program`] - Pulse program files
//!
//! # Architecture
//!
//! ```text
//! lab.toml ──► LabConfig ──► CapabilityCatalog ──► InstrumentDefinition
//!                  │                                       │
//!                  ▼                                       ▼
//!          InstrumentRegistry ◄──── BusInstrument / PulseSequencer
//!                                      │                  │
//!                                 Transport         SequencerDriver
//!                                      │            (simulation | spinapi)
//!                               ResourceManager
//!                              (simulation | tcp)
//! ```

#![warn(missing_docs)]

pub mod builtin;
pub mod bus;
pub mod checked;
pub mod config;
pub mod device;
pub mod program;
pub mod registry;
pub mod resource;
pub mod sequencer;
pub mod transport;
