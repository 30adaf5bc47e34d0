//! Reliable report delivery.
//!
//! The link carries one unconfirmed indication at a time. Reports that
//! cannot go out immediately wait in a fixed-capacity FIFO and are drained
//! one per acknowledgment:
//!
//! - [`queue`] - the bounded ring of [`ReportEntry`] values.
//! - [`gate`] - the at-most-one-in-flight admission and drain logic.
//! - [`payload`] - the 5-byte float encoding used by measurement reports.

pub mod gate;
pub mod payload;
pub mod queue;

use crate::config::MAX_REPORT_LEN;
use crate::error::Error;

/// Opaque identifier of the attribute a report is written to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttributeId(pub u16);

/// Measured quantities exposed over the link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Quantity {
    /// Health Thermometer temperature measurement (5-byte float).
    Temperature,
    /// Bend angle bucket in degrees (1 byte).
    FlexAngle,
    /// Number of tilt events since boot (1 byte).
    TiltCount,
    /// Button A state, 1 pressed / 0 released (1 byte, encrypted link).
    ButtonState,
}

impl Quantity {
    pub const COUNT: usize = 4;

    pub const ALL: [Quantity; Self::COUNT] = [
        Quantity::Temperature,
        Quantity::FlexAngle,
        Quantity::TiltCount,
        Quantity::ButtonState,
    ];

    pub const fn attribute(self) -> AttributeId {
        AttributeId(self as u16)
    }

    pub fn from_attribute(id: AttributeId) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.attribute() == id)
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// One outbound report, immutable once queued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReportEntry {
    pub target: AttributeId,
    /// Number of meaningful bytes in `payload`; valid range is 1..=5.
    pub len: u8,
    pub payload: [u8; MAX_REPORT_LEN],
}

impl ReportEntry {
    /// Build an entry from `bytes`, rejecting empty or oversized payloads.
    pub fn new(target: AttributeId, bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() || bytes.len() > MAX_REPORT_LEN {
            return Err(Error::InvalidReport);
        }
        let mut payload = [0u8; MAX_REPORT_LEN];
        payload[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            target,
            len: bytes.len() as u8,
            payload,
        })
    }

    /// Single-byte report (angle bucket, counter, button state).
    pub fn byte(quantity: Quantity, value: u8) -> Self {
        Self {
            target: quantity.attribute(),
            len: 1,
            payload: [value, 0, 0, 0, 0],
        }
    }

    pub fn is_valid(&self) -> bool {
        (1..=MAX_REPORT_LEN).contains(&(self.len as usize))
    }

    /// The meaningful bytes of the payload.
    pub fn bytes(&self) -> &[u8] {
        let len = (self.len as usize).min(MAX_REPORT_LEN);
        &self.payload[..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_rejects_empty_and_oversized() {
        assert_eq!(ReportEntry::new(AttributeId(1), &[]), Err(Error::InvalidReport));
        assert_eq!(
            ReportEntry::new(AttributeId(1), &[0; 6]),
            Err(Error::InvalidReport)
        );
    }

    #[test]
    fn entry_keeps_only_meaningful_bytes() {
        let entry = ReportEntry::new(AttributeId(7), &[1, 2, 3]).unwrap();
        assert!(entry.is_valid());
        assert_eq!(entry.bytes(), &[1, 2, 3]);
        assert_eq!(entry.payload, [1, 2, 3, 0, 0]);
    }

    #[test]
    fn default_entry_is_invalid() {
        assert!(!ReportEntry::default().is_valid());
    }

    #[test]
    fn quantity_attribute_mapping_is_bijective() {
        for q in Quantity::ALL {
            assert_eq!(Quantity::from_attribute(q.attribute()), Some(q));
        }
        assert_eq!(Quantity::from_attribute(AttributeId(99)), None);
    }
}
