//! MPU-6050 accelerometer and gyroscope over I2C
//!
//! Works with any `embedded-hal` blocking I2C master. The configured ranges
//! are tracked by the driver, so scaling a reading never needs a register
//! read.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::{debug, warn};

/// Address with AD0 low.
pub const DEFAULT_ADDRESS: u8 = 0x68;

/// Address with AD0 high.
pub const ALTERNATE_ADDRESS: u8 = 0x69;

/// Time the chip needs after a reset before it acknowledges again.
pub const RESET_DELAY_MS: u8 = 100;

/// Register map
pub mod registers {
    /// Sample rate divider: rate = gyro output rate / (1 + SMPLRT_DIV)
    pub const SMPLRT_DIV: u8 = 0x19;
    /// Digital low pass filter in bits 2:0
    pub const CONFIG: u8 = 0x1A;
    /// Full scale range in bits 4:3
    pub const GYRO_CONFIG: u8 = 0x1B;
    /// Full scale range in bits 4:3
    pub const ACCEL_CONFIG: u8 = 0x1C;
    /// First of 14 output bytes: accel XYZ, temperature, gyro XYZ, big endian
    pub const ACCEL_XOUT_H: u8 = 0x3B;
    pub const TEMP_OUT_H: u8 = 0x41;
    pub const GYRO_XOUT_H: u8 = 0x43;
    pub const PWR_MGMT_1: u8 = 0x6B;
    pub const PWR_MGMT_2: u8 = 0x6C;
    pub const WHO_AM_I: u8 = 0x75;

    pub const PWR_MGMT_1_DEVICE_RESET: u8 = 1 << 7;
    /// Clock from the X gyro PLL
    pub const PWR_MGMT_1_CLKSEL_PLL_X: u8 = 0x01;
    pub const WHO_AM_I_VALUE: u8 = 0x68;
}

/// MPU-6050 error
#[derive(Debug, Eq, PartialEq)]
pub enum Error<E> {
    /// I2C bus error
    I2c(E),
    /// Sample rate of zero, above the gyro output rate, or too low for the divider
    InvalidSampleRate(u32),
}

/// Accelerometer full scale range
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccelRange {
    G2 = 0,
    G4 = 1,
    G8 = 2,
    G16 = 3,
}

impl AccelRange {
    /// Raw counts per g
    pub fn sensitivity(self) -> f32 {
        match self {
            AccelRange::G2 => 16384.0,
            AccelRange::G4 => 8192.0,
            AccelRange::G8 => 4096.0,
            AccelRange::G16 => 2048.0,
        }
    }

    pub fn register_value(self) -> u8 {
        (self as u8) << 3
    }
}

/// Gyroscope full scale range
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GyroRange {
    Deg250 = 0,
    Deg500 = 1,
    Deg1000 = 2,
    Deg2000 = 3,
}

impl GyroRange {
    /// Raw counts per degree per second
    pub fn sensitivity(self) -> f32 {
        match self {
            GyroRange::Deg250 => 131.0,
            GyroRange::Deg500 => 65.5,
            GyroRange::Deg1000 => 32.8,
            GyroRange::Deg2000 => 16.4,
        }
    }

    pub fn register_value(self) -> u8 {
        (self as u8) << 3
    }
}

/// Digital low pass filter, named by gyro bandwidth
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dlpf {
    Hz260 = 0,
    Hz184 = 1,
    Hz94 = 2,
    Hz44 = 3,
    Hz21 = 4,
    Hz10 = 5,
    Hz5 = 6,
    Disabled = 7,
}

impl Dlpf {
    /// Gyro output rate the sample rate divider applies to.
    pub fn gyro_output_rate_hz(self) -> u32 {
        match self {
            Dlpf::Hz260 | Dlpf::Disabled => 8000,
            _ => 1000,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Axes {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One scaled sample of every sensor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Reading {
    /// g
    pub accel: Axes,
    /// °/s
    pub gyro: Axes,
    /// Die temperature, °C
    pub temperature: f32,
}

/// Die temperature from a raw reading.
pub fn temperature_celsius(raw: i16) -> f32 {
    f32::from(raw) / 340.0 + 36.53
}

pub struct Mpu6050<I2C> {
    i2c: I2C,
    address: u8,
    accel_range: AccelRange,
    gyro_range: GyroRange,
    dlpf: Dlpf,
}

impl<I2C, E> Mpu6050<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    /// The tracked configuration starts at the power-on defaults.
    pub fn new(i2c: I2C, address: u8) -> Self {
        Mpu6050 {
            i2c,
            address,
            accel_range: AccelRange::G2,
            gyro_range: GyroRange::Deg250,
            dlpf: Dlpf::Hz260,
        }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    pub fn accel_range(&self) -> AccelRange {
        self.accel_range
    }

    pub fn gyro_range(&self) -> GyroRange {
        self.gyro_range
    }

    pub fn dlpf(&self) -> Dlpf {
        self.dlpf
    }

    /// Reset the chip and configure it for continuous sampling.
    ///
    /// Sets both ranges, the PLL clock, a 44 Hz low pass filter and a 1 kHz
    /// sample rate.
    pub fn init<D: DelayMs<u8>>(&mut self, accel: AccelRange, gyro: GyroRange, delay: &mut D) -> Result<(), Error<E>> {
        self.reset(delay)?;
        self.set_accel_range(accel)?;
        self.set_gyro_range(gyro)?;
        self.write_register(registers::PWR_MGMT_1, registers::PWR_MGMT_1_CLKSEL_PLL_X)?;
        self.set_dlpf(Dlpf::Hz44)?;
        self.set_sample_rate(1000)?;
        debug!("MPU-6050 at {:#04x} ready: {:?}, {:?}", self.address, accel, gyro);
        Ok(())
    }

    /// Restore every register to its default and wait for the chip.
    pub fn reset<D: DelayMs<u8>>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.write_register(registers::PWR_MGMT_1, registers::PWR_MGMT_1_DEVICE_RESET)?;
        delay.delay_ms(RESET_DELAY_MS);
        self.accel_range = AccelRange::G2;
        self.gyro_range = GyroRange::Deg250;
        self.dlpf = Dlpf::Hz260;
        Ok(())
    }

    pub fn who_am_i(&mut self) -> Result<u8, Error<E>> {
        self.read_register(registers::WHO_AM_I)
    }

    pub fn set_accel_range(&mut self, range: AccelRange) -> Result<(), Error<E>> {
        self.write_register(registers::ACCEL_CONFIG, range.register_value())?;
        self.accel_range = range;
        Ok(())
    }

    pub fn set_gyro_range(&mut self, range: GyroRange) -> Result<(), Error<E>> {
        self.write_register(registers::GYRO_CONFIG, range.register_value())?;
        self.gyro_range = range;
        Ok(())
    }

    pub fn set_dlpf(&mut self, dlpf: Dlpf) -> Result<(), Error<E>> {
        self.write_register(registers::CONFIG, dlpf as u8)?;
        self.dlpf = dlpf;
        Ok(())
    }

    /// Program the divider for `hz` samples per second.
    ///
    /// The rate divides the gyro output rate of the current filter setting,
    /// so set the filter first.
    pub fn set_sample_rate(&mut self, hz: u32) -> Result<(), Error<E>> {
        let base = self.dlpf.gyro_output_rate_hz();
        if hz == 0 || hz > base {
            warn!("sample rate {} Hz outside 1..={} Hz", hz, base);
            return Err(Error::InvalidSampleRate(hz));
        }
        let divider = u8::try_from(base / hz - 1).map_err(|_| Error::InvalidSampleRate(hz))?;
        self.write_register(registers::SMPLRT_DIV, divider)
    }

    /// Raw accel XYZ, temperature and gyro XYZ from one burst read.
    pub fn read_raw(&mut self) -> Result<[i16; 7], Error<E>> {
        let mut buf = [0u8; 14];
        self.read_registers(registers::ACCEL_XOUT_H, &mut buf)?;
        let mut raw = [0i16; 7];
        for (value, pair) in raw.iter_mut().zip(buf.chunks_exact(2)) {
            *value = i16::from_be_bytes([pair[0], pair[1]]);
        }
        Ok(raw)
    }

    /// Latest sample of every sensor, scaled by the configured ranges.
    pub fn read_all(&mut self) -> Result<Reading, Error<E>> {
        let [ax, ay, az, temp, gx, gy, gz] = self.read_raw()?;
        let accel = self.accel_range.sensitivity();
        let gyro = self.gyro_range.sensitivity();
        let scale = |raw: i16, per_unit: f32| f32::from(raw) / per_unit;

        Ok(Reading {
            accel: Axes {
                x: scale(ax, accel),
                y: scale(ay, accel),
                z: scale(az, accel),
            },
            gyro: Axes {
                x: scale(gx, gyro),
                y: scale(gy, gyro),
                z: scale(gz, gyro),
            },
            temperature: temperature_celsius(temp),
        })
    }

    pub fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Error<E>> {
        self.i2c.write(self.address, &[reg, value]).map_err(Error::I2c)
    }

    pub fn read_register(&mut self, reg: u8) -> Result<u8, Error<E>> {
        let mut buf = [0u8; 1];
        self.read_registers(reg, &mut buf)?;
        Ok(buf[0])
    }

    /// Burst read starting at `reg`; the register pointer auto-increments.
    pub fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<E>> {
        self.i2c.write_read(self.address, &[reg], buf).map_err(Error::I2c)
    }
}
