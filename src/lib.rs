//! This is a [bit banging] implementation of I2C and SPI bus engines, plus the
//! device protocols layered on them: an SD card block reader over SPI, an
//! SSD1306 OLED driver and an MPU-6050 motion sensor driver over I2C.
//!
//! Pins are [`embedded-hal`] digital pins. Timing comes from the calibrated
//! spin delays in [`timing`].
//!
//! [bit banging]: https://en.wikipedia.org/wiki/Bit_banging
//! [`embedded-hal`]: https://github.com/rust-embedded/embedded-hal
//!
//! ## Layering
//!
//! ```text
//! sdcard / ssd1306 / mpu6050
//!         |
//!     spi / i2c
//!         |
//!       timing
//!         |
//!       pins
//! ```
//!
//! All state lives in the values you create: a bus owns its pins, its
//! calibration and its device table, and protocol drivers own their session
//! state. Nothing is global, and nothing here is thread safe; drive each bus
//! from one call chain at a time.

#![cfg_attr(not(test), no_std)]

pub mod i2c;
pub mod mpu6050;
pub mod sdcard;
pub mod spi;
pub mod ssd1306;
pub mod timing;
