/*!
  # Full-duplex SPI master based on GPIO bitbang

  One bus (SCK, MOSI, MISO) is shared by up to [`MAX_DEVICES`] slaves, each
  with its own chip-select line, clock mode and chip-select polarity. Devices
  are attached before [`SpiBus::init`], which measures how fast the pins can
  be toggled and fits the clock model used by [`SpiBus::set_frequency`].

  Pins should be the fastest output type the HAL offers: each bit costs four
  pin operations plus two calibrated half-cycle delays, so a slow pin API
  directly caps the achievable clock.

  ## Selection windows

  Every transfer asserts its chip-select, shifts the bytes, idles MOSI and the
  clock and then releases the chip-select again. Protocols that interleave a
  command, a poll and a data phase under a single selection call
  [`SpiBus::select`] first; transfers on a held chip-select leave it asserted
  until [`SpiBus::deselect`].
*/

use embedded_hal::blocking::spi::{Transfer, Write};
use embedded_hal::digital::v2::{InputPin, OutputPin};
use embedded_hal::spi::{Mode, Phase, Polarity};
use heapless::Vec;
use log::{debug, info, warn};

use crate::timing::{Calibration, SpinDelay, Stopwatch, CALIBRATION_LOAD};

pub use embedded_hal::spi::{MODE_0, MODE_1, MODE_2, MODE_3};

/// Size of the device table.
pub const MAX_DEVICES: usize = 8;

/// Chip-select lines are numbered `0..CHIP_SELECT_LINES`.
pub const CHIP_SELECT_LINES: u8 = 32;

/// Byte shifted out when there is nothing to send. MOSI idles high.
pub const IDLE_FILL: u8 = 0xFF;

/// Bytes clocked per calibration sample.
pub const CALIBRATION_BYTES: u32 = 600;

/// SPI error
#[derive(Debug, Eq, PartialEq)]
pub enum Error<E> {
    /// GPIO error
    Bus(E),
    /// The bus has not been calibrated by `init` yet
    NotInitialized,
    /// Devices can only be attached before `init`
    AlreadyInitialized,
    /// `init` was called with an empty device table
    NoDevices,
    /// The device table is full
    TooManyDevices,
    /// Chip-select line outside `0..CHIP_SELECT_LINES`
    InvalidChipSelect,
    /// The chip-select line is already attached
    DuplicateChipSelect,
    /// No device is attached on this chip-select line
    UnknownChipSelect,
    /// Another chip-select is holding the bus
    Busy,
    /// Transmit and receive buffers differ in length
    BufferMismatch,
    /// The spin delay did not slow the clock down during calibration
    CalibrationFailed,
}

/// Identity of an attached device: its chip-select line number.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ChipSelect(pub u8);

/// Level that selects a device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActiveLevel {
    Low,
    High,
}

/// The four clock polarity/phase combinations.
///
/// | mode | idle | capture edge | shift edge |
/// |------|------|--------------|------------|
/// | 0    | low  | rising       | falling    |
/// | 1    | low  | falling      | rising     |
/// | 2    | high | falling      | rising     |
/// | 3    | high | rising       | falling    |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClockMode {
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

impl ClockMode {
    /// Clock level between transfers.
    pub fn idles_high(self) -> bool {
        matches!(self, ClockMode::Mode2 | ClockMode::Mode3)
    }

    /// Whether data is captured on the edge leaving idle.
    pub fn captures_on_leading_edge(self) -> bool {
        matches!(self, ClockMode::Mode0 | ClockMode::Mode2)
    }

    pub fn polarity(self) -> Polarity {
        if self.idles_high() {
            Polarity::IdleHigh
        } else {
            Polarity::IdleLow
        }
    }

    pub fn phase(self) -> Phase {
        if self.captures_on_leading_edge() {
            Phase::CaptureOnFirstTransition
        } else {
            Phase::CaptureOnSecondTransition
        }
    }
}

impl From<Mode> for ClockMode {
    fn from(mode: Mode) -> Self {
        match (mode.polarity, mode.phase) {
            (Polarity::IdleLow, Phase::CaptureOnFirstTransition) => ClockMode::Mode0,
            (Polarity::IdleLow, Phase::CaptureOnSecondTransition) => ClockMode::Mode1,
            (Polarity::IdleHigh, Phase::CaptureOnFirstTransition) => ClockMode::Mode2,
            (Polarity::IdleHigh, Phase::CaptureOnSecondTransition) => ClockMode::Mode3,
        }
    }
}

impl From<ClockMode> for Mode {
    fn from(mode: ClockMode) -> Self {
        Mode {
            polarity: mode.polarity(),
            phase: mode.phase(),
        }
    }
}

struct Attached<CS> {
    line: ChipSelect,
    pin: CS,
    mode: ClockMode,
    active: ActiveLevel,
}

/// Bytes to shift during one selection.
enum Payload<'a> {
    Duplex(&'a [u8], &'a mut [u8]),
    InPlace(&'a mut [u8]),
    Write(&'a [u8]),
    Read(&'a mut [u8]),
    Clocks(usize),
}

impl Payload<'_> {
    fn len(&self) -> usize {
        match self {
            Payload::Duplex(tx, _) | Payload::Write(tx) => tx.len(),
            Payload::InPlace(buf) | Payload::Read(buf) => buf.len(),
            Payload::Clocks(bytes) => *bytes,
        }
    }

    fn outgoing(&self, i: usize) -> u8 {
        match self {
            Payload::Duplex(tx, _) | Payload::Write(tx) => tx[i],
            Payload::InPlace(buf) => buf[i],
            Payload::Read(_) | Payload::Clocks(_) => IDLE_FILL,
        }
    }

    fn incoming(&mut self, i: usize, byte: u8) {
        match self {
            Payload::Duplex(_, rx) | Payload::InPlace(rx) | Payload::Read(rx) => rx[i] = byte,
            Payload::Write(_) | Payload::Clocks(_) => {}
        }
    }
}

/// A bit banged SPI bus with a table of attached devices
pub struct SpiBus<Miso, Mosi, Sck, Cs, D, C>
where
    Miso: InputPin,
    Mosi: OutputPin,
    Sck: OutputPin,
    Cs: OutputPin,
    D: SpinDelay,
    C: Stopwatch,
{
    miso: Miso,
    mosi: Mosi,
    sck: Sck,
    devices: Vec<Attached<Cs>, MAX_DEVICES>,
    delay: D,
    stopwatch: C,
    calibration: Option<Calibration>,
    held: Option<ChipSelect>,
}

impl<Miso, Mosi, Sck, Cs, D, C, E> SpiBus<Miso, Mosi, Sck, Cs, D, C>
where
    Miso: InputPin<Error = E>,
    Mosi: OutputPin<Error = E>,
    Sck: OutputPin<Error = E>,
    Cs: OutputPin<Error = E>,
    D: SpinDelay,
    C: Stopwatch,
{
    pub fn new(miso: Miso, mosi: Mosi, sck: Sck, delay: D, stopwatch: C) -> Self {
        SpiBus {
            miso,
            mosi,
            sck,
            devices: Vec::new(),
            delay,
            stopwatch,
            calibration: None,
            held: None,
        }
    }

    /// Register a device on chip-select line `line`.
    ///
    /// Devices are fixed once the bus is initialised.
    pub fn attach<M>(
        &mut self,
        line: u8,
        pin: Cs,
        mode: M,
        active: ActiveLevel,
    ) -> Result<ChipSelect, Error<E>>
    where
        M: Into<ClockMode>,
    {
        if self.calibration.is_some() {
            warn!("cannot attach chip-select {} after init", line);
            return Err(Error::AlreadyInitialized);
        }
        if self.devices.is_full() {
            warn!("device table full, chip-select {} rejected", line);
            return Err(Error::TooManyDevices);
        }
        if line >= CHIP_SELECT_LINES {
            warn!("chip-select {} out of range 0..{}", line, CHIP_SELECT_LINES);
            return Err(Error::InvalidChipSelect);
        }
        let cs = ChipSelect(line);
        if self.index_of(cs).is_ok() {
            warn!("chip-select {} already attached", line);
            return Err(Error::DuplicateChipSelect);
        }

        let mode = mode.into();
        self.devices
            .push(Attached {
                line: cs,
                pin,
                mode,
                active,
            })
            .map_err(|_| Error::TooManyDevices)?;
        debug!("attached chip-select {} ({:?}, active {:?})", line, mode, active);
        Ok(cs)
    }

    /// Idle every line and calibrate the clock.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        if self.calibration.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        if self.devices.is_empty() {
            warn!("cannot start SPI without attached devices");
            return Err(Error::NoDevices);
        }

        for index in 0..self.devices.len() {
            self.deactivate(index)?;
        }
        self.sck.set_low().map_err(Error::Bus)?;
        self.mosi.set_high().map_err(Error::Bus)?;

        let baseline = self.measure_hz(0)?;
        let loaded = self.measure_hz(CALIBRATION_LOAD)?;
        let calibration = Calibration::from_samples(baseline, loaded, CALIBRATION_LOAD)
            .ok_or(Error::CalibrationFailed)?;

        info!(
            "SPI calibrated: max {} kHz, {} devices",
            calibration.max_hz() / 1000,
            self.devices.len()
        );
        self.calibration = Some(calibration);
        Ok(())
    }

    /// Tune the clock towards `hz` and return the frequency achieved.
    ///
    /// Clamped to [`MIN_FREQUENCY_HZ`](crate::timing::MIN_FREQUENCY_HZ) and
    /// to the calibrated maximum. The bus must not be held, since tuning
    /// clocks test bytes.
    pub fn set_frequency(&mut self, hz: u32) -> Result<u32, Error<E>> {
        let mut calibration = self.calibration.ok_or(Error::NotInitialized)?;
        if self.held.is_some() {
            return Err(Error::Busy);
        }

        let achieved = calibration.tune(hz, |half_cycle| self.measure_hz(half_cycle))?;
        self.calibration = Some(calibration);
        Ok(achieved)
    }

    /// Current clock frequency, zero before `init`.
    pub fn frequency(&self) -> u32 {
        self.calibration.map_or(0, |c| c.current_hz())
    }

    /// Fastest clock the pins allow, zero before `init`.
    pub fn max_frequency(&self) -> u32 {
        self.calibration.map_or(0, |c| c.max_hz())
    }

    /// Spin units per half clock cycle.
    pub fn half_cycle(&self) -> u32 {
        self.calibration.map_or(0, |c| c.half_cycle())
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Clock mode a device was attached with.
    pub fn mode_of(&self, cs: ChipSelect) -> Option<ClockMode> {
        self.index_of(cs).ok().map(|index| self.devices[index].mode)
    }

    /// Chip-select currently held by [`select`](Self::select).
    pub fn held(&self) -> Option<ChipSelect> {
        self.held
    }

    /// Assert `cs` and keep it asserted across transfers.
    pub fn select(&mut self, cs: ChipSelect) -> Result<(), Error<E>> {
        self.calibration.ok_or(Error::NotInitialized)?;
        let index = self.index_of(cs)?;
        match self.held {
            Some(held) if held == cs => return Ok(()),
            Some(_) => return Err(Error::Busy),
            None => {}
        }

        let mode = self.devices[index].mode;
        self.set_clock_idle(mode)?;
        self.activate(index)?;
        self.held = Some(cs);
        Ok(())
    }

    /// Idle the lines and release `cs` if it is held.
    pub fn deselect(&mut self, cs: ChipSelect) -> Result<(), Error<E>> {
        if self.held != Some(cs) {
            return Ok(());
        }
        let index = self.index_of(cs)?;
        let mode = self.devices[index].mode;
        self.held = None;

        self.idle_lines(mode)?;
        self.deactivate(index)
    }

    /// Shift `tx` out while filling `rx`. Both must be the same length.
    pub fn transfer(&mut self, cs: ChipSelect, tx: &[u8], rx: &mut [u8]) -> Result<(), Error<E>> {
        if tx.len() != rx.len() {
            return Err(Error::BufferMismatch);
        }
        self.exchange(cs, true, Payload::Duplex(tx, rx))
    }

    /// Shift `words` out, replacing each byte with the byte received.
    pub fn transfer_in_place(&mut self, cs: ChipSelect, words: &mut [u8]) -> Result<(), Error<E>> {
        self.exchange(cs, true, Payload::InPlace(words))
    }

    /// Shift `words` out and discard what comes back.
    pub fn write(&mut self, cs: ChipSelect, words: &[u8]) -> Result<(), Error<E>> {
        self.exchange(cs, true, Payload::Write(words))
    }

    /// Fill `words` from the slave while sending [`IDLE_FILL`].
    pub fn read(&mut self, cs: ChipSelect, words: &mut [u8]) -> Result<(), Error<E>> {
        self.exchange(cs, true, Payload::Read(words))
    }

    /// Clock `bytes` idle bytes in `cs`'s mode without selecting anything.
    ///
    /// Cards need these pulses on power-up before they listen to commands.
    pub fn idle_clocks(&mut self, cs: ChipSelect, bytes: usize) -> Result<(), Error<E>> {
        self.exchange(cs, false, Payload::Clocks(bytes))
    }

    /// Shift `fill` until the received byte satisfies `accept`.
    ///
    /// Gives up after `limit` bytes and returns `None`.
    pub fn poll<F>(
        &mut self,
        cs: ChipSelect,
        fill: u8,
        limit: usize,
        mut accept: F,
    ) -> Result<Option<u8>, Error<E>>
    where
        F: FnMut(u8) -> bool,
    {
        self.with_selection(cs, true, |bus, mode, half_cycle| {
            for _ in 0..limit {
                let byte = bus.shift_byte(mode, half_cycle, fill)?;
                if accept(byte) {
                    return Ok(Some(byte));
                }
            }
            Ok(None)
        })
    }

    /// Drive MOSI directly.
    pub fn set_mosi(&mut self, high: bool) -> Result<(), Error<E>> {
        if high {
            self.mosi.set_high().map_err(Error::Bus)
        } else {
            self.mosi.set_low().map_err(Error::Bus)
        }
    }

    /// Borrow one device as an `embedded-hal` SPI implementation.
    pub fn device(&mut self, cs: ChipSelect) -> Result<Device<'_, Miso, Mosi, Sck, Cs, D, C>, Error<E>> {
        self.index_of(cs)?;
        Ok(Device { bus: self, cs })
    }

    /// Destroy the bus and return the pins
    #[allow(clippy::type_complexity)]
    pub fn release(self) -> (Miso, Mosi, Sck, Vec<(ChipSelect, Cs), MAX_DEVICES>, D, C) {
        let mut chip_selects = Vec::new();
        for device in self.devices {
            chip_selects.push((device.line, device.pin)).ok();
        }
        (self.miso, self.mosi, self.sck, chip_selects, self.delay, self.stopwatch)
    }

    fn exchange(&mut self, cs: ChipSelect, select: bool, mut payload: Payload<'_>) -> Result<(), Error<E>> {
        self.with_selection(cs, select, |bus, mode, half_cycle| {
            for i in 0..payload.len() {
                let byte = bus.shift_byte(mode, half_cycle, payload.outgoing(i))?;
                payload.incoming(i, byte);
            }
            Ok(())
        })
    }

    /// Run `f` inside a selection of `cs`, opening and closing one unless
    /// `cs` is already held. With `select` unset no chip-select is touched.
    fn with_selection<T, F>(&mut self, cs: ChipSelect, select: bool, f: F) -> Result<T, Error<E>>
    where
        F: FnOnce(&mut Self, ClockMode, u32) -> Result<T, Error<E>>,
    {
        let calibration = self.calibration.ok_or(Error::NotInitialized)?;
        let index = self.index_of(cs)?;
        let held = match self.held {
            Some(held) if held == cs => true,
            Some(_) => return Err(Error::Busy),
            None => false,
        };
        if held && !select {
            return Err(Error::Busy);
        }

        let mode = self.devices[index].mode;
        let toggle = select && !held;
        if !held {
            self.set_clock_idle(mode)?;
        }
        if toggle {
            self.activate(index)?;
        }

        let result = f(&mut *self, mode, calibration.half_cycle());

        let idle = self.idle_lines(mode);
        let release = if toggle { self.deactivate(index) } else { Ok(()) };
        let value = result?;
        idle?;
        release?;
        Ok(value)
    }

    /// Exchange one byte MSB first.
    ///
    /// In modes with leading-edge capture MOSI is set up before the first
    /// edge; otherwise the leading edge shifts and MOSI changes after it.
    fn shift_byte(&mut self, mode: ClockMode, half_cycle: u32, data_out: u8) -> Result<u8, Error<E>> {
        let idles_high = mode.idles_high();
        let mut data_in: u8 = 0;

        for bit in (0..8).rev() {
            let out_bit = (data_out >> bit) & 1 == 1;

            if mode.captures_on_leading_edge() {
                self.set_mosi(out_bit)?;
                // capture
                self.set_sck(!idles_high)?;
                self.delay.spin(half_cycle);
                if self.miso.is_high().map_err(Error::Bus)? {
                    data_in |= 1 << bit;
                }
                // shift
                self.set_sck(idles_high)?;
                self.delay.spin(half_cycle);
            } else {
                // shift
                self.set_sck(!idles_high)?;
                self.set_mosi(out_bit)?;
                self.delay.spin(half_cycle);
                // capture
                self.set_sck(idles_high)?;
                if self.miso.is_high().map_err(Error::Bus)? {
                    data_in |= 1 << bit;
                }
                self.delay.spin(half_cycle);
            }
        }

        Ok(data_in)
    }

    /// Achieved clock rate for a half-cycle count, measured by clocking
    /// zeros in mode 0 with no chip-select asserted.
    fn measure_hz(&mut self, half_cycle: u32) -> Result<f64, Error<E>> {
        self.sck.set_low().map_err(Error::Bus)?;

        let start = self.stopwatch.now_ns();
        for _ in 0..CALIBRATION_BYTES {
            self.shift_byte(ClockMode::Mode0, half_cycle, 0x00)?;
        }
        let elapsed = self.stopwatch.now_ns().saturating_sub(start).max(1);

        self.mosi.set_high().map_err(Error::Bus)?;
        Ok(f64::from(CALIBRATION_BYTES * 8) * 1e9 / elapsed as f64)
    }

    fn idle_lines(&mut self, mode: ClockMode) -> Result<(), Error<E>> {
        self.mosi.set_high().map_err(Error::Bus)?;
        self.set_clock_idle(mode)
    }

    #[inline]
    fn set_clock_idle(&mut self, mode: ClockMode) -> Result<(), Error<E>> {
        self.set_sck(mode.idles_high())
    }

    #[inline]
    fn set_sck(&mut self, high: bool) -> Result<(), Error<E>> {
        if high {
            self.sck.set_high().map_err(Error::Bus)
        } else {
            self.sck.set_low().map_err(Error::Bus)
        }
    }

    fn activate(&mut self, index: usize) -> Result<(), Error<E>> {
        let device = &mut self.devices[index];
        match device.active {
            ActiveLevel::Low => device.pin.set_low(),
            ActiveLevel::High => device.pin.set_high(),
        }
        .map_err(Error::Bus)
    }

    fn deactivate(&mut self, index: usize) -> Result<(), Error<E>> {
        let device = &mut self.devices[index];
        match device.active {
            ActiveLevel::Low => device.pin.set_high(),
            ActiveLevel::High => device.pin.set_low(),
        }
        .map_err(Error::Bus)
    }

    fn index_of(&self, cs: ChipSelect) -> Result<usize, Error<E>> {
        self.devices
            .iter()
            .position(|device| device.line == cs)
            .ok_or(Error::UnknownChipSelect)
    }
}

/// Operations protocol drivers need from a chip-select aware bus.
pub trait ChipSelectBus {
    type Error;

    /// Assert `cs` and hold it across the following calls.
    fn select(&mut self, cs: ChipSelect) -> Result<(), Self::Error>;

    /// Release a held `cs`.
    fn deselect(&mut self, cs: ChipSelect) -> Result<(), Self::Error>;

    fn write(&mut self, cs: ChipSelect, words: &[u8]) -> Result<(), Self::Error>;

    fn read(&mut self, cs: ChipSelect, words: &mut [u8]) -> Result<(), Self::Error>;

    /// Shift `fill` until `accept` returns true, at most `limit` bytes.
    fn poll<F>(&mut self, cs: ChipSelect, fill: u8, limit: usize, accept: F) -> Result<Option<u8>, Self::Error>
    where
        F: FnMut(u8) -> bool;

    /// Clock idle bytes in `cs`'s mode with every chip-select inactive.
    fn idle_clocks(&mut self, cs: ChipSelect, bytes: usize) -> Result<(), Self::Error>;

    fn set_mosi(&mut self, high: bool) -> Result<(), Self::Error>;

    fn set_frequency(&mut self, hz: u32) -> Result<u32, Self::Error>;

    fn max_frequency(&self) -> u32;
}

impl<Miso, Mosi, Sck, Cs, D, C, E> ChipSelectBus for SpiBus<Miso, Mosi, Sck, Cs, D, C>
where
    Miso: InputPin<Error = E>,
    Mosi: OutputPin<Error = E>,
    Sck: OutputPin<Error = E>,
    Cs: OutputPin<Error = E>,
    D: SpinDelay,
    C: Stopwatch,
{
    type Error = Error<E>;

    fn select(&mut self, cs: ChipSelect) -> Result<(), Self::Error> {
        SpiBus::select(self, cs)
    }

    fn deselect(&mut self, cs: ChipSelect) -> Result<(), Self::Error> {
        SpiBus::deselect(self, cs)
    }

    fn write(&mut self, cs: ChipSelect, words: &[u8]) -> Result<(), Self::Error> {
        SpiBus::write(self, cs, words)
    }

    fn read(&mut self, cs: ChipSelect, words: &mut [u8]) -> Result<(), Self::Error> {
        SpiBus::read(self, cs, words)
    }

    fn poll<F>(&mut self, cs: ChipSelect, fill: u8, limit: usize, accept: F) -> Result<Option<u8>, Self::Error>
    where
        F: FnMut(u8) -> bool,
    {
        SpiBus::poll(self, cs, fill, limit, accept)
    }

    fn idle_clocks(&mut self, cs: ChipSelect, bytes: usize) -> Result<(), Self::Error> {
        SpiBus::idle_clocks(self, cs, bytes)
    }

    fn set_mosi(&mut self, high: bool) -> Result<(), Self::Error> {
        SpiBus::set_mosi(self, high)
    }

    fn set_frequency(&mut self, hz: u32) -> Result<u32, Self::Error> {
        SpiBus::set_frequency(self, hz)
    }

    fn max_frequency(&self) -> u32 {
        SpiBus::max_frequency(self)
    }
}

/// One attached device, borrowed from its bus.
///
/// Implements the `embedded-hal` blocking SPI traits, selecting the device
/// around every call, so existing drivers can run on a shared bit banged bus.
pub struct Device<'a, Miso, Mosi, Sck, Cs, D, C>
where
    Miso: InputPin,
    Mosi: OutputPin,
    Sck: OutputPin,
    Cs: OutputPin,
    D: SpinDelay,
    C: Stopwatch,
{
    bus: &'a mut SpiBus<Miso, Mosi, Sck, Cs, D, C>,
    cs: ChipSelect,
}

impl<Miso, Mosi, Sck, Cs, D, C, E> Device<'_, Miso, Mosi, Sck, Cs, D, C>
where
    Miso: InputPin<Error = E>,
    Mosi: OutputPin<Error = E>,
    Sck: OutputPin<Error = E>,
    Cs: OutputPin<Error = E>,
    D: SpinDelay,
    C: Stopwatch,
{
    pub fn chip_select(&self) -> ChipSelect {
        self.cs
    }
}

impl<Miso, Mosi, Sck, Cs, D, C, E> Transfer<u8> for Device<'_, Miso, Mosi, Sck, Cs, D, C>
where
    Miso: InputPin<Error = E>,
    Mosi: OutputPin<Error = E>,
    Sck: OutputPin<Error = E>,
    Cs: OutputPin<Error = E>,
    D: SpinDelay,
    C: Stopwatch,
{
    type Error = Error<E>;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        self.bus.transfer_in_place(self.cs, words)?;
        Ok(words)
    }
}

impl<Miso, Mosi, Sck, Cs, D, C, E> Write<u8> for Device<'_, Miso, Mosi, Sck, Cs, D, C>
where
    Miso: InputPin<Error = E>,
    Mosi: OutputPin<Error = E>,
    Sck: OutputPin<Error = E>,
    Cs: OutputPin<Error = E>,
    D: SpinDelay,
    C: Stopwatch,
{
    type Error = Error<E>;

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.bus.write(self.cs, words)
    }
}
