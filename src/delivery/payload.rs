//! 5-byte measurement encoding.
//!
//! `[flags, m0, m1, m2, exponent]` where the mantissa is a 24-bit
//! little-endian two's-complement integer and the value is
//! `mantissa × 10^exponent`. This is the IEEE-11073 FLOAT layout used by
//! the Health Thermometer temperature measurement.

/// Decoded 5-byte measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    pub flags: u8,
    /// Signed 24-bit mantissa.
    pub mantissa: i32,
    pub exponent: i8,
}

const MANTISSA_MAX: i32 = (1 << 23) - 1;
const MANTISSA_MIN: i32 = -(1 << 23);

impl Measurement {
    /// Celsius temperature in milli-degrees, reported with exponent -3.
    pub fn millicelsius(milli: i32) -> Self {
        Self {
            flags: 0,
            mantissa: milli.clamp(MANTISSA_MIN, MANTISSA_MAX),
            exponent: -3,
        }
    }

    pub fn encode(&self) -> [u8; 5] {
        let m = self.mantissa.clamp(MANTISSA_MIN, MANTISSA_MAX).to_le_bytes();
        [self.flags, m[0], m[1], m[2], self.exponent as u8]
    }

    /// Decode the first five bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let [flags, m0, m1, m2, exponent]: [u8; 5] = bytes.get(..5)?.try_into().ok()?;
        // Place the 24-bit value in the top of an i32 and shift back down
        // to sign-extend it.
        let mantissa = i32::from_le_bytes([0, m0, m1, m2]) >> 8;
        Some(Self {
            flags,
            mantissa,
            exponent: exponent as i8,
        })
    }

    /// Value scaled to `10^exponent` units, e.g. `scaled(-3)` gives
    /// milli-units. Saturates instead of overflowing.
    pub fn scaled(&self, exponent: i8) -> i32 {
        let mut value = i64::from(self.mantissa);
        let mut shift = i32::from(self.exponent) - i32::from(exponent);
        while shift > 0 {
            value = value.saturating_mul(10);
            shift -= 1;
        }
        while shift < 0 {
            value /= 10;
            shift += 1;
        }
        value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_room_temperature() {
        // 23.437 °C → mantissa 23437 = 0x005B8D, exponent -3.
        let bytes = Measurement::millicelsius(23_437).encode();
        assert_eq!(bytes, [0x00, 0x8D, 0x5B, 0x00, 0xFD]);
    }

    #[test]
    fn decodes_negative_mantissa_with_sign_extension() {
        // -46.850 °C → mantissa -46850 = 0xFF48FE in 24 bits.
        let bytes = [0x00, 0xFE, 0x48, 0xFF, 0xFD];
        let m = Measurement::decode(&bytes).unwrap();
        assert_eq!(m.mantissa, -46_850);
        assert_eq!(m.exponent, -3);
        assert_eq!(m.scaled(-3), -46_850);
    }

    #[test]
    fn decode_rejects_short_input() {
        assert!(Measurement::decode(&[0, 1, 2, 3]).is_none());
    }

    #[test]
    fn scaled_converts_between_exponents() {
        let m = Measurement {
            flags: 0,
            mantissa: 2_344,
            exponent: -2,
        };
        assert_eq!(m.scaled(-3), 23_440);
        assert_eq!(m.scaled(0), 23);
    }

    #[test]
    fn mantissa_is_clamped_to_24_bits() {
        let m = Measurement::millicelsius(i32::MAX);
        let back = Measurement::decode(&m.encode()).unwrap();
        assert_eq!(back.mantissa, (1 << 23) - 1);
    }
}
