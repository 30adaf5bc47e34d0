//! Flex sensor classification and tilt counting.
//!
//! Each tilt interrupt triggers one ADC sample of the flex sensor. The
//! sample is bucketed into 0°, 45° or 90°; every bucketed sample counts as
//! one tilt.

use crate::config::{FLEX_ADC_SPAN_MV, FLEX_ADC_STEPS, FLEX_BUCKET_LIMITS_MV};
use crate::events::Signal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlexAngle {
    Deg0,
    Deg45,
    Deg90,
}

impl FlexAngle {
    pub const fn degrees(self) -> u8 {
        match self {
            FlexAngle::Deg0 => 0,
            FlexAngle::Deg45 => 45,
            FlexAngle::Deg90 => 90,
        }
    }

    /// Bucket a sensor voltage. Anything above the 90° limit is treated
    /// as straight.
    pub fn from_millivolts(mv: u32) -> Self {
        let [straight, half, full] = FLEX_BUCKET_LIMITS_MV;
        if mv <= straight {
            FlexAngle::Deg0
        } else if mv <= half {
            FlexAngle::Deg45
        } else if mv <= full {
            FlexAngle::Deg90
        } else {
            FlexAngle::Deg0
        }
    }

    pub const fn signal(self) -> Signal {
        match self {
            FlexAngle::Deg0 => Signal::FlexLevel0,
            FlexAngle::Deg45 => Signal::FlexLevel45,
            FlexAngle::Deg90 => Signal::FlexLevel90,
        }
    }

    pub fn from_signal(signal: Signal) -> Option<Self> {
        match signal {
            Signal::FlexLevel0 => Some(FlexAngle::Deg0),
            Signal::FlexLevel45 => Some(FlexAngle::Deg45),
            Signal::FlexLevel90 => Some(FlexAngle::Deg90),
            _ => None,
        }
    }
}

/// Convert a raw 12-bit SAADC sample to millivolts. Negative samples
/// (input slightly below ground) read as zero.
pub fn sample_to_millivolts(sample: i16) -> u32 {
    let raw = sample.max(0) as u32;
    raw * FLEX_ADC_SPAN_MV / FLEX_ADC_STEPS
}

/// Posture as shown on the peer: straight is good.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Posture {
    Good,
    Bad,
}

impl Posture {
    pub const fn from_degrees(degrees: u8) -> Self {
        if degrees == 0 {
            Posture::Good
        } else {
            Posture::Bad
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Posture::Good => "Posture:GOOD",
            Posture::Bad => "Posture:BAD",
        }
    }
}

#[derive(Default)]
pub struct PostureTracker {
    angle: Option<FlexAngle>,
    tilt_count: u8,
}

impl PostureTracker {
    pub const fn new() -> Self {
        Self {
            angle: None,
            tilt_count: 0,
        }
    }

    /// Record one bucketed sample; returns the new tilt count.
    pub fn record(&mut self, angle: FlexAngle) -> u8 {
        self.angle = Some(angle);
        self.tilt_count = self.tilt_count.wrapping_add(1);
        self.tilt_count
    }

    pub fn angle(&self) -> Option<FlexAngle> {
        self.angle
    }

    pub fn tilt_count(&self) -> u8 {
        self.tilt_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_follow_limits() {
        assert_eq!(FlexAngle::from_millivolts(0), FlexAngle::Deg0);
        assert_eq!(FlexAngle::from_millivolts(1_400), FlexAngle::Deg0);
        assert_eq!(FlexAngle::from_millivolts(1_401), FlexAngle::Deg45);
        assert_eq!(FlexAngle::from_millivolts(1_550), FlexAngle::Deg45);
        assert_eq!(FlexAngle::from_millivolts(1_551), FlexAngle::Deg90);
        assert_eq!(FlexAngle::from_millivolts(1_700), FlexAngle::Deg90);
        assert_eq!(FlexAngle::from_millivolts(1_701), FlexAngle::Deg0);
    }

    #[test]
    fn sample_conversion() {
        assert_eq!(sample_to_millivolts(0), 0);
        assert_eq!(sample_to_millivolts(-12), 0);
        assert_eq!(sample_to_millivolts(2_000), 1_757);
        assert_eq!(sample_to_millivolts(4_095), 3_599);
    }

    #[test]
    fn signal_mapping_round_trips() {
        for angle in [FlexAngle::Deg0, FlexAngle::Deg45, FlexAngle::Deg90] {
            assert_eq!(FlexAngle::from_signal(angle.signal()), Some(angle));
        }
        assert_eq!(FlexAngle::from_signal(Signal::Bonded), None);
    }

    #[test]
    fn every_sample_counts_as_a_tilt() {
        let mut tracker = PostureTracker::new();
        assert_eq!(tracker.record(FlexAngle::Deg45), 1);
        assert_eq!(tracker.record(FlexAngle::Deg45), 2);
        assert_eq!(tracker.record(FlexAngle::Deg0), 3);
        assert_eq!(tracker.angle(), Some(FlexAngle::Deg0));
    }

    #[test]
    fn tilt_count_wraps_at_byte() {
        let mut tracker = PostureTracker::new();
        for _ in 0..255 {
            tracker.record(FlexAngle::Deg90);
        }
        assert_eq!(tracker.tilt_count(), 255);
        assert_eq!(tracker.record(FlexAngle::Deg90), 0);
    }

    #[test]
    fn posture_labels() {
        assert_eq!(Posture::from_degrees(0).label(), "Posture:GOOD");
        assert_eq!(Posture::from_degrees(45).label(), "Posture:BAD");
    }
}
