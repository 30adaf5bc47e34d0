//! Unified error type for the sensor node.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Top-level error type used across the control plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Delivery
    /// The delivery queue has no free slot.
    QueueFull,

    /// A report with a length outside 1..=5 bytes was offered.
    InvalidReport,

    // Sensor
    /// An I²C transaction with the temperature sensor failed.
    Bus,

    /// A delay or sensor request could not be queued.
    Busy,

    // UI / Display
    /// I²C transaction to the display failed.
    Display,
}

/// Why a report could not be handed to the link (keeps the enum `Copy`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// No open connection to send on.
    NotConnected,
    /// The peer has not enabled indications for this attribute, or the
    /// link is not bonded yet.
    NotPermitted,
    /// The stack already has an unconfirmed indication outstanding.
    Busy,
    /// Raw error code from the SoftDevice.
    Raw(u32),
}
