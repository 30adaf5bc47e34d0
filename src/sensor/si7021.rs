//! Si7021 temperature sensor.
//!
//! The conversion maths is portable; the async driver (embedded builds)
//! issues the two bus transfers of a measurement cycle separately so the
//! acquisition state machine can wait for the conversion in between.

/// Convert a raw 16-bit temperature code to milli-degrees Celsius.
///
/// `T = 175.72 × code / 65536 − 46.85`, in integer arithmetic.
pub fn raw_to_millicelsius(code: u16) -> i32 {
    let scaled = (175_720i64 * i64::from(code)) / 65_536;
    scaled as i32 - 46_850
}

/// Assemble the big-endian result bytes.
pub fn code_from_bytes(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

#[cfg(feature = "embedded")]
pub use driver::Si7021;

#[cfg(feature = "embedded")]
mod driver {
    use embedded_hal_async::i2c::I2c;

    use super::code_from_bytes;
    use crate::config::{SI7021_ADDRESS, SI7021_MEASURE_TEMPERATURE};
    use crate::error::Error;

    pub struct Si7021<I2C> {
        i2c: I2C,
    }

    impl<I2C: I2c> Si7021<I2C> {
        pub fn new(i2c: I2C) -> Self {
            Self { i2c }
        }

        /// Send "measure temperature, no hold master".
        pub async fn start_measurement(&mut self) -> Result<(), Error> {
            self.i2c
                .write(SI7021_ADDRESS, &[SI7021_MEASURE_TEMPERATURE])
                .await
                .map_err(|_| Error::Bus)
        }

        /// Read the two result bytes of a finished conversion.
        pub async fn read_code(&mut self) -> Result<u16, Error> {
            let mut buf = [0u8; 2];
            self.i2c
                .read(SI7021_ADDRESS, &mut buf)
                .await
                .map_err(|_| Error::Bus)?;
            Ok(code_from_bytes(buf))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_code_is_lower_bound() {
        assert_eq!(raw_to_millicelsius(0), -46_850);
    }

    #[test]
    fn room_temperature_code() {
        // 0x6666 → 23.4369 °C
        assert_eq!(raw_to_millicelsius(0x6666), 23_436);
    }

    #[test]
    fn below_freezing_code() {
        assert_eq!(raw_to_millicelsius(0x4000), -2_920);
    }

    #[test]
    fn full_scale_code() {
        assert_eq!(raw_to_millicelsius(u16::MAX), 128_867);
    }

    #[test]
    fn bytes_are_big_endian() {
        assert_eq!(code_from_bytes([0x66, 0x66]), 0x6666);
        assert_eq!(code_from_bytes([0x01, 0x02]), 0x0102);
    }
}
