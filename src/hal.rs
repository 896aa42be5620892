//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for the three i2c sensors on the board:
//!     - veml7700 ambient light (lux)
//!     - bme280 temperature / humidity / pressure (forced single readouts)
//!     - ads1115 adc with the analog uv sensor on one input
//!     abstracts away the difference between running on a real Raspberry Pi
//!     (using `rppal`) and a development machine (using mocks).
//!
//! design:
//!     - the mock build compiles everywhere and returns fixed, plausible values.
//!     - the "hardware" feature talks to the bus directly. the register math
//!       (bme280 compensation, adc scaling) lives outside the cfg gates so it is
//!       exercised by the normal test run.
//!
//! relationships:
//!     - used by: edge.rs, light.rs (through the SensorSuite trait)
//!     - uses: rppal (on feature="hardware")
//!
//! ==============================================================================

use anyhow::Result;

/// Temperature, humidity and pressure from one bme280 readout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    pub temperature: f64,
    pub humidity: f64,
    /// hPa
    pub pressure: f64,
}

pub trait SensorSuite: Send + Sync {
    fn read_lux(&self) -> Result<f64>;
    fn read_climate(&self) -> Result<Climate>;
    /// raw voltage on the uv sensor's adc input
    fn read_uv_voltage(&self) -> Result<f64>;
}

// ==============================================================================================
// REGISTER MATH (shared by both builds)
// ==============================================================================================

/// lux per count at gain 1 / 100 ms integration (the power-on default we program)
pub const VEML7700_RESOLUTION: f64 = 0.0576;

pub fn veml7700_lux(raw: u16) -> f64 {
    raw as f64 * VEML7700_RESOLUTION
}

/// ±4.096 V full scale
pub const ADS1115_FULL_SCALE: f64 = 4.096;

/// Single-shot, AINx vs GND, ±4.096 V, 128 SPS, comparator disabled.
pub fn ads1115_config_word(channel: u8) -> u16 {
    let mux = 0b100 | (channel as u16 & 0b11);
    0x8000 | (mux << 12) | (0b001 << 9) | 0x0100 | (0b100 << 5) | 0b11
}

pub fn ads1115_volts(raw: i16) -> f64 {
    raw as f64 * ADS1115_FULL_SCALE / 32768.0
}

/// ctrl_meas with x1 temperature and pressure oversampling. `forced` starts a
/// single conversion, after which the chip drops back to sleep.
pub fn bme280_ctrl_meas(forced: bool) -> u8 {
    let oversampling = (0b001 << 5) | (0b001 << 2);
    if forced {
        oversampling | 0b01
    } else {
        oversampling
    }
}

/// Status register (0xF3) bit 3 is set while a conversion is running.
pub fn bme280_measuring(status: u8) -> bool {
    status & 0x08 != 0
}

/// Factory trimming parameters burned into every bme280.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bme280Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Bme280Calibration {
    /// `tp` is the 0x88..=0x9F block, `h1` register 0xA1, `h` the 0xE1..=0xE7 block.
    pub fn from_registers(tp: &[u8; 24], h1: u8, h: &[u8; 7]) -> Self {
        let u = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);
        Self {
            t1: u(0),
            t2: s(2),
            t3: s(4),
            p1: u(6),
            p2: s(8),
            p3: s(10),
            p4: s(12),
            p5: s(14),
            p6: s(16),
            p7: s(18),
            p8: s(20),
            p9: s(22),
            h1,
            h2: i16::from_le_bytes([h[0], h[1]]),
            h3: h[2],
            h4: ((h[3] as i8 as i16) << 4) | (h[4] & 0x0F) as i16,
            h5: ((h[5] as i8 as i16) << 4) | (h[4] >> 4) as i16,
            h6: h[6] as i8,
        }
    }

    /// Returns (t_fine, °C).
    pub fn compensate_temperature(&self, adc_t: i32) -> (f64, f64) {
        let adc_t = adc_t as f64;
        let t1 = self.t1 as f64;
        let var1 = (adc_t / 16384.0 - t1 / 1024.0) * self.t2 as f64;
        let d = adc_t / 131072.0 - t1 / 8192.0;
        let var2 = d * d * self.t3 as f64;
        let t_fine = var1 + var2;
        (t_fine, t_fine / 5120.0)
    }

    /// Pascal.
    pub fn compensate_pressure(&self, adc_p: i32, t_fine: f64) -> f64 {
        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * self.p6 as f64 / 32768.0;
        var2 += var1 * self.p5 as f64 * 2.0;
        var2 = var2 / 4.0 + self.p4 as f64 * 65536.0;
        var1 = (self.p3 as f64 * var1 * var1 / 524288.0 + self.p2 as f64 * var1) / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * self.p1 as f64;
        if var1 == 0.0 {
            return 0.0;
        }
        let mut p = 1048576.0 - adc_p as f64;
        p = (p - var2 / 4096.0) * 6250.0 / var1;
        let var1 = self.p9 as f64 * p * p / 2147483648.0;
        let var2 = p * self.p8 as f64 / 32768.0;
        p + (var1 + var2 + self.p7 as f64) / 16.0
    }

    /// %RH, clamped to 0..=100.
    pub fn compensate_humidity(&self, adc_h: i32, t_fine: f64) -> f64 {
        let h = t_fine - 76800.0;
        let h = (adc_h as f64 - (self.h4 as f64 * 64.0 + self.h5 as f64 / 16384.0 * h))
            * (self.h2 as f64 / 65536.0
                * (1.0 + self.h6 as f64 / 67108864.0 * h * (1.0 + self.h3 as f64 / 67108864.0 * h)));
        let h = h * (1.0 - self.h1 as f64 * h / 524288.0);
        h.clamp(0.0, 100.0)
    }

    /// Decode the 8-byte 0xF7..=0xFE burst into a reading.
    pub fn compensate(&self, burst: &[u8; 8]) -> Climate {
        let adc_p = ((burst[0] as i32) << 12) | ((burst[1] as i32) << 4) | ((burst[2] as i32) >> 4);
        let adc_t = ((burst[3] as i32) << 12) | ((burst[4] as i32) << 4) | ((burst[5] as i32) >> 4);
        let adc_h = ((burst[6] as i32) << 8) | burst[7] as i32;

        let (t_fine, temperature) = self.compensate_temperature(adc_t);
        Climate {
            temperature,
            humidity: self.compensate_humidity(adc_h, t_fine),
            pressure: self.compensate_pressure(adc_p, t_fine) / 100.0,
        }
    }
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For Non-Hardware Build)
// ==============================================================================================
#[cfg(not(feature = "hardware"))]
pub struct Hal {
    uv_channel: u8,
}

#[cfg(not(feature = "hardware"))]
impl Hal {
    pub fn new(config: &crate::config::SensorsConfig) -> Result<Self> {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Ok(Self { uv_channel: config.uv_channel })
    }
}

#[cfg(not(feature = "hardware"))]
impl SensorSuite for Hal {
    fn read_lux(&self) -> Result<f64> {
        tracing::debug!("[MOCK VEML7700] ALS read");
        Ok(veml7700_lux(4340)) // ~250 lux, overcast daylight
    }

    fn read_climate(&self) -> Result<Climate> {
        tracing::debug!("[MOCK BME280] burst read");
        Ok(Climate { temperature: 21.5, humidity: 45.0, pressure: 1013.25 })
    }

    fn read_uv_voltage(&self) -> Result<f64> {
        tracing::debug!("[MOCK ADS1115] single shot on AIN{}", self.uv_channel);
        Ok(ads1115_volts(8000)) // ~1 V, above the capture threshold
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
pub struct Hal {
    bus: std::sync::Mutex<rppal::i2c::I2c>,
    veml7700: u16,
    bme280: u16,
    ads1115: u16,
    uv_channel: u8,
    calibration: Bme280Calibration,
}

#[cfg(feature = "hardware")]
impl Hal {
    pub fn new(config: &crate::config::SensorsConfig) -> Result<Self> {
        use anyhow::Context;
        use rppal::i2c::I2c;

        tracing::info!("Using REAL HARDWARE HAL (rppal, i2c bus {})", config.i2c_bus);
        let mut i2c = I2c::with_bus(config.i2c_bus).context("failed to open i2c bus")?;

        let veml7700 = config.veml7700()? as u16;
        let bme280 = config.bme280()? as u16;
        let ads1115 = config.ads1115()? as u16;

        // veml7700: gain 1, 100 ms integration, powered on
        i2c.set_slave_address(veml7700)?;
        i2c.write(&[0x00, 0x00, 0x00]).context("veml7700 init failed")?;

        // bme280: check chip id, pull trimming data, park in sleep mode
        i2c.set_slave_address(bme280)?;
        let mut id = [0u8; 1];
        i2c.write_read(&[0xD0], &mut id)?;
        if id[0] != 0x60 {
            anyhow::bail!("no bme280 at 0x{:02X} (chip id 0x{:02X})", bme280, id[0]);
        }
        let mut tp = [0u8; 24];
        i2c.write_read(&[0x88], &mut tp)?;
        let mut h1 = [0u8; 1];
        i2c.write_read(&[0xA1], &mut h1)?;
        let mut h = [0u8; 7];
        i2c.write_read(&[0xE1], &mut h)?;
        let calibration = Bme280Calibration::from_registers(&tp, h1[0], &h);

        i2c.write(&[0xF2, 0x01])?; // humidity x1, must precede ctrl_meas
        i2c.write(&[0xF4, bme280_ctrl_meas(false)])?;

        Ok(Self {
            bus: std::sync::Mutex::new(i2c),
            veml7700,
            bme280,
            ads1115,
            uv_channel: config.uv_channel,
            calibration,
        })
    }

    fn bus(&self) -> Result<std::sync::MutexGuard<'_, rppal::i2c::I2c>> {
        self.bus.lock().map_err(|_| anyhow::anyhow!("i2c bus lock poisoned"))
    }
}

#[cfg(feature = "hardware")]
impl SensorSuite for Hal {
    fn read_lux(&self) -> Result<f64> {
        let mut bus = self.bus()?;
        bus.set_slave_address(self.veml7700)?;
        let mut buf = [0u8; 2];
        bus.write_read(&[0x04], &mut buf)?;
        Ok(veml7700_lux(u16::from_le_bytes(buf)))
    }

    fn read_climate(&self) -> Result<Climate> {
        let mut bus = self.bus()?;
        bus.set_slave_address(self.bme280)?;
        bus.write(&[0xF4, bme280_ctrl_meas(true)])?;
        // x1/x1/x1 oversampling converts in under 10 ms
        let mut status = [0u8; 1];
        for _ in 0..10 {
            std::thread::sleep(std::time::Duration::from_millis(2));
            bus.write_read(&[0xF3], &mut status)?;
            if !bme280_measuring(status[0]) {
                break;
            }
        }
        if bme280_measuring(status[0]) {
            anyhow::bail!("bme280 forced conversion did not finish");
        }
        let mut burst = [0u8; 8];
        bus.write_read(&[0xF7], &mut burst)?;
        Ok(self.calibration.compensate(&burst))
    }

    fn read_uv_voltage(&self) -> Result<f64> {
        let mut bus = self.bus()?;
        bus.set_slave_address(self.ads1115)?;
        let config = ads1115_config_word(self.uv_channel).to_be_bytes();
        bus.write(&[0x01, config[0], config[1]])?;
        // 128 SPS -> one conversion is ~8 ms
        std::thread::sleep(std::time::Duration::from_millis(10));
        let mut buf = [0u8; 2];
        bus.write_read(&[0x00], &mut buf)?;
        Ok(ads1115_volts(i16::from_be_bytes(buf)))
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn datasheet_calibration() -> Bme280Calibration {
        Bme280Calibration {
            t1: 27504,
            t2: 26435,
            t3: -1000,
            p1: 36477,
            p2: -10685,
            p3: 3024,
            p4: 2855,
            p5: 140,
            p6: -7,
            p7: 15500,
            p8: -14600,
            p9: 6000,
            ..Default::default()
        }
    }

    #[test]
    fn test_bme280_temperature_and_pressure_reference_values() {
        let cal = datasheet_calibration();
        let (t_fine, celsius) = cal.compensate_temperature(519888);
        assert!((celsius - 25.08).abs() < 0.01, "got {}", celsius);
        let pascal = cal.compensate_pressure(415148, t_fine);
        assert!((pascal - 100653.27).abs() < 0.1, "got {}", pascal);
    }

    #[test]
    fn test_bme280_calibration_register_layout() {
        let mut tp = [0u8; 24];
        tp[0..2].copy_from_slice(&27504u16.to_le_bytes());
        tp[4..6].copy_from_slice(&(-1000i16).to_le_bytes());
        tp[22..24].copy_from_slice(&6000i16.to_le_bytes());
        // h4 = 0x123 and h5 = 0x456 share the nibble-packed 0xE5 byte
        let h = [0x6A, 0x01, 0x00, 0x12, 0x63, 0x45, 0x1E];
        let cal = Bme280Calibration::from_registers(&tp, 75, &h);
        assert_eq!(cal.t1, 27504);
        assert_eq!(cal.t3, -1000);
        assert_eq!(cal.p9, 6000);
        assert_eq!(cal.h1, 75);
        assert_eq!(cal.h2, 362);
        assert_eq!(cal.h4, 0x123);
        assert_eq!(cal.h5, 0x456);
        assert_eq!(cal.h6, 30);
    }

    #[test]
    fn test_humidity_is_clamped() {
        let cal = Bme280Calibration { h2: 362, h3: 0, h4: 311, h5: 50, h6: 30, h1: 75, ..Default::default() };
        let h = cal.compensate_humidity(0, 100_000.0);
        assert!((0.0..=100.0).contains(&h));
        let h = cal.compensate_humidity(65535, 100_000.0);
        assert!((0.0..=100.0).contains(&h));
    }

    #[test]
    fn test_bme280_forced_readout_registers() {
        assert_eq!(bme280_ctrl_meas(true), 0x25);
        assert_eq!(bme280_ctrl_meas(false), 0x24);
        // mode bits 01 = forced, 11 would be normal (free running)
        assert_eq!(bme280_ctrl_meas(true) & 0b11, 0b01);
        assert!(bme280_measuring(0x08));
        assert!(!bme280_measuring(0x01));
    }

    #[test]
    fn test_ads1115_config_word() {
        assert_eq!(ads1115_config_word(0), 0xC383);
        assert_eq!(ads1115_config_word(3), 0xF383);
    }

    #[test]
    fn test_adc_and_lux_scaling() {
        assert_eq!(ads1115_volts(0), 0.0);
        assert!((ads1115_volts(i16::MAX) - 4.096).abs() < 0.001);
        assert!((ads1115_volts(8000) - 1.0).abs() < 0.001);
        assert!((veml7700_lux(1000) - 57.6).abs() < 1e-9);
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn test_mock_hal_reads() {
        let hal = Hal::new(&crate::config::SensorsConfig::default()).unwrap();
        assert!(hal.read_lux().unwrap() > 0.0);
        assert_eq!(hal.read_climate().unwrap().pressure, 1013.25);
        assert!(hal.read_uv_voltage().unwrap() * 0.2 > 0.1);
    }
}
