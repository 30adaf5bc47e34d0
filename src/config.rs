//! Application-wide constants and compile-time configuration.
//!
//! Timing parameters, radio parameters, pin assignments and the runtime
//! [`NodeConfig`] all live here so they can be tuned in one place.

use crate::ble::PeerAddress;
use crate::delivery::gate::RetryPolicy;
use crate::delivery::queue::SlotPolicy;
use crate::delivery::Quantity;

// Delivery

/// Number of slots in the reliable delivery ring.
pub const QUEUE_CAPACITY: usize = 16;

/// Largest report payload carried by one indication (bytes).
pub const MAX_REPORT_LEN: usize = 5;

// Sensor timing

/// Period of the acquisition timer (ms). One temperature cycle per underflow.
pub const SAMPLE_PERIOD_MS: u64 = 3_000;

/// Si7021 power-up settle time before the first I²C command (ms).
pub const SENSOR_SETTLE_MS: u64 = 80;

/// Si7021 14-bit temperature conversion time (µs).
pub const SENSOR_CONVERSION_US: u64 = 10_800;

/// Si7021 7-bit I²C address.
pub const SI7021_ADDRESS: u8 = 0x40;

/// "Measure temperature, no hold master mode" command.
pub const SI7021_MEASURE_TEMPERATURE: u8 = 0xF3;

// Flex sensor

/// Upper bounds (mV, inclusive) of the 0°, 45° and 90° buckets.
/// Readings above the last bound fall back to 0°.
pub const FLEX_BUCKET_LIMITS_MV: [u32; 3] = [1_400, 1_550, 1_700];

/// SAADC reference span used to convert raw samples (mV).
pub const FLEX_ADC_SPAN_MV: u32 = 3_600;

/// SAADC resolution (12-bit).
pub const FLEX_ADC_STEPS: u32 = 4_096;

// BLE

/// GAP device name.
pub const DEVICE_NAME: &str = "PostureNode";

/// Advertising interval (0.625 ms units). 400 = 250 ms.
pub const ADV_INTERVAL: u32 = 400;

/// Connection interval (1.25 ms units). 60 = 75 ms.
pub const CONN_INTERVAL_MIN: u16 = 60;
pub const CONN_INTERVAL_MAX: u16 = 60;

/// Peripheral latency (connection events the sensor node may skip).
pub const SLAVE_LATENCY: u16 = 4;

/// Supervision timeout (10 ms units). 80 = 800 ms.
pub const SUP_TIMEOUT: u16 = 80;

/// Scan interval and window (0.625 ms units). 50 ms / 25 ms.
pub const SCAN_INTERVAL: u32 = 80;
pub const SCAN_WINDOW: u32 = 40;

/// An indication with no confirmation after this long is given up (s).
/// Matches the ATT transaction timeout.
pub const INDICATION_TIMEOUT_SECS: u64 = 30;

/// Attempts per discovery request before the walk parks until reconnect.
pub const DISCOVERY_RETRY_LIMIT: u8 = 2;

/// Address of the sensor node the peer role connects to (LSB first).
pub const PEER_ADDRESS: [u8; 6] = [0xC5, 0x6A, 0x2B, 0x57, 0x0B, 0x00];

// UI

/// Button debounce time (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 50;

/// Display refresh period (ms).
pub const DISPLAY_REFRESH_MS: u64 = 1_000;

// GPIO pin assignments (nRF52840-DK defaults)
//
//   Button A (PB0)   → P0.11
//   Button B (PB1)   → P0.12
//   Sensor enable    → P0.03
//   Tilt interrupt   → P0.24
//   Flex sensor      → P0.04 / AIN2
//   Sensor I²C SDA   → P0.26 (TWISPI0)
//   Sensor I²C SCL   → P0.27
//   Display I²C SDA  → P0.28 (TWISPI1)
//   Display I²C SCL  → P0.29

/// Which end of the link this node plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Measures, advertises and indicates reports.
    Sensor,
    /// Scans for the sensor, discovers its attributes and subscribes.
    Peer,
}

/// Runtime configuration of one node.
#[derive(Clone, Copy, Debug)]
pub struct NodeConfig {
    pub role: Role,
    /// Only this address is accepted when scanning (peer role).
    pub peer_address: PeerAddress,
    pub slot_policy: SlotPolicy,
    pub retry_policy: RetryPolicy,
    /// Delete stored bondings on boot and on every disconnect.
    pub fresh_bonding: bool,
    /// Quantities the peer role discovers and subscribes to, in order.
    pub discovery_plan: &'static [Quantity],
}

/// Quantities indicated by the sensor role and subscribed to by the peer.
pub const DISCOVERY_PLAN: [Quantity; 2] = [Quantity::FlexAngle, Quantity::TiltCount];

impl NodeConfig {
    /// Default configuration for `role`.
    pub const fn for_role(role: Role) -> Self {
        Self {
            role,
            peer_address: PeerAddress::public(PEER_ADDRESS),
            slot_policy: SlotPolicy::ReserveOne,
            retry_policy: RetryPolicy::Requeue,
            fresh_bonding: true,
            discovery_plan: &DISCOVERY_PLAN,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::for_role(Role::Sensor)
    }
}
