//! Control plane of a BLE posture sensor node.
//!
//! Everything that decides *what* the node does lives here and builds on
//! the host, so `cargo test` needs no hardware:
//!
//! - [`events`] - interrupt-safe signal aggregation and payload events
//! - [`delivery`] - bounded report queue and the one-in-flight gate
//! - [`ble`] - pairing/authorization and peer attribute discovery
//! - [`sensor`] - temperature acquisition cycle and posture tracking
//! - [`ui`] - status board and the two-button gesture
//! - [`node`] - the dispatcher tying the state machines together
//!
//! With the `embedded` feature the same modules also carry the Embassy /
//! SoftDevice glue used by the firmware binary in `main.rs`.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod action;
pub mod ble;
pub mod config;
pub mod delivery;
pub mod error;
pub mod events;
pub mod node;
pub mod power;
pub mod sensor;
pub mod ui;

#[cfg(feature = "embedded")]
pub mod platform;

pub use action::{Action, Actions};
pub use config::{NodeConfig, Role};
pub use error::{Error, LinkError};
pub use events::{Event, EventAggregator, Signal, SignalSet};
pub use node::{Node, Platform};

/// Pending signals raised by interrupt handlers and SoftDevice callbacks.
pub static AGGREGATOR: EventAggregator = EventAggregator::new();
