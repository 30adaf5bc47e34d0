//! Sensors - temperature acquisition cycle, Si7021 maths and flex-based
//! posture tracking. Hardware tasks are only built for the firmware.

pub mod acquisition;
pub mod posture;
pub mod si7021;

#[cfg(feature = "embedded")]
pub mod tasks;
