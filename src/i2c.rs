/*!
  # Synchronous I2C master based on GPIO bitbang

  This implementation consumes the following hardware resources:
  - A periodic timer marking half clock cycles. A
    [`SpinTimer`](crate::timing::SpinTimer) built from a
    calibrated spin delay works as well as a hardware timer.
  - Two GPIO pins for SDA and SCL lines.

  ## Hardware requirements

  1. Configure both GPIO pins as open-drain outputs with pull-ups, readable as
     inputs. SCL is read back to honour clock stretching and SDA is read back
     for ACK bits and incoming data.
  2. Configure the timer period to half of the desired I2C clock period.

  ## Framing

  ```text
  IDLE -> START -> address+R/W -> ACK -> (data -> ACK)* -> STOP -> IDLE
  ```

  SDA only changes while SCL is low, except for START (SDA falls while SCL is
  high) and STOP (SDA rises while SCL is high). Bytes go out MSB first. A NACK
  on the address byte aborts the transaction with a STOP.

  ## Example

  ```no_run
    use bitbang_bus::i2c::I2cBB;
    use bitbang_bus::timing::{NopSpin, SpinTimer};
    # use embedded_hal::digital::v2::{InputPin, OutputPin};
    # fn run<P, E>(scl: P, sda: P) -> Result<(), bitbang_bus::i2c::Error<E>>
    # where P: InputPin<Error = E> + OutputPin<Error = E> {

    let mut i2c = I2cBB::new(scl, sda, SpinTimer::new(NopSpin, 7));
    i2c.init()?;

    if i2c.probe(0x68)? {
        let _who_am_i = i2c.read_register(0x68, 0x75)?;
    }
    # Ok(()) }
  ```
*/

use embedded_hal::blocking::i2c::{Read, Write, WriteRead};
use embedded_hal::digital::v2::{InputPin, OutputPin};
use embedded_hal::timer::{CountDown, Periodic};
use log::{debug, trace};
use nb::block;

/// Polls of SCL allowed while a slave stretches the clock.
pub const STRETCH_LIMIT: u32 = 10_000;

/// I2C error
#[derive(Debug, Eq, PartialEq)]
pub enum Error<E> {
    /// GPIO error
    Bus(E),
    /// No ack received
    NoAck,
    /// Invalid input
    InvalidData,
    /// Address does not fit in 7 bits
    InvalidAddress,
    /// A slave held SCL low for longer than [`STRETCH_LIMIT`] polls
    ClockStretchTimeout,
}

/// Direction bit appended to the slave address
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Write = 0,
    Read = 1,
}

/// Whether a segmented write opens and/or closes the transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Framing {
    /// Send START and the address before the payload
    pub start: bool,
    /// Send STOP after the payload
    pub stop: bool,
}

impl Framing {
    /// A complete transaction.
    pub const WHOLE: Framing = Framing {
        start: true,
        stop: true,
    };
    /// Opens a transaction and leaves the bus held.
    pub const OPEN: Framing = Framing {
        start: true,
        stop: false,
    };
    /// Continues a held transaction.
    pub const CONTINUE: Framing = Framing {
        start: false,
        stop: false,
    };
    /// Continues a held transaction and closes it.
    pub const CLOSE: Framing = Framing {
        start: false,
        stop: true,
    };
}

/// Pack a 7-bit address with the direction bit.
pub fn address_byte<E>(addr: u8, direction: Direction) -> Result<u8, Error<E>> {
    if addr > 0x7F {
        return Err(Error::InvalidAddress);
    }
    Ok((addr << 1) | direction as u8)
}

/// Bit banging I2C device
pub struct I2cBB<SCL, SDA, CLK>
where
    SCL: OutputPin + InputPin,
    SDA: OutputPin + InputPin,
    CLK: CountDown + Periodic,
{
    scl: SCL,
    sda: SDA,
    clk: CLK,
}

impl<SCL, SDA, CLK, E> I2cBB<SCL, SDA, CLK>
where
    SCL: OutputPin<Error = E> + InputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    CLK: CountDown + Periodic,
{
    /// Create instance
    pub fn new(scl: SCL, sda: SDA, clk: CLK) -> Self {
        I2cBB { scl, sda, clk }
    }

    /// Release both lines and force the bus idle.
    ///
    /// Slaves left mid-transaction by a reset only resynchronise on a STOP,
    /// so one is issued unconditionally.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        self.set_sda_high()?;
        self.set_scl_high()?;
        self.wait_for_clk();

        self.set_scl_low()?;
        self.wait_for_clk();

        self.i2c_stop()
    }

    /// Destroy the driver and return the pins and timer
    pub fn release(self) -> (SCL, SDA, CLK) {
        (self.scl, self.sda, self.clk)
    }

    /// Address a slave for writing and report whether it acknowledged.
    ///
    /// No register is touched; the transaction is closed immediately.
    pub fn probe(&mut self, addr: u8) -> Result<bool, Error<E>> {
        let byte = address_byte(addr, Direction::Write)?;

        self.transaction(|bus| {
            bus.i2c_start()?;
            let ack = bus.i2c_write_byte(byte)?;
            bus.i2c_stop()?;
            Ok(ack)
        })
        .map(|ack| {
            trace!("probe {:#04x}: {}", addr, if ack { "ack" } else { "nack" });
            ack
        })
    }

    /// Read one register using write-then-repeated-start addressing.
    pub fn read_register(&mut self, addr: u8, reg: u8) -> Result<u8, Error<E>> {
        let mut value = [0u8; 1];
        self.read_registers(addr, reg, &mut value)?;
        Ok(value[0])
    }

    /// Read consecutive registers starting at `reg`.
    ///
    /// Every byte but the last is ACKed; the last is NACKed to end the read.
    pub fn read_registers(&mut self, addr: u8, reg: u8, input: &mut [u8]) -> Result<(), Error<E>> {
        self.write_read(addr, &[reg], input)
    }

    /// Write part of a transaction.
    ///
    /// With `framing.start` the bus is claimed and the slave addressed for
    /// writing; with `framing.stop` the transaction is closed afterwards.
    /// Segments without `start` continue a transaction left open by an
    /// earlier call.
    pub fn write_stream(&mut self, addr: u8, output: &[u8], framing: Framing) -> Result<(), Error<E>> {
        let byte = address_byte(addr, Direction::Write)?;

        self.transaction(|bus| {
            if framing.start {
                bus.i2c_start()?;
                bus.send_address(byte)?;
            }

            bus.write_to_slave(output)?;

            if framing.stop {
                bus.i2c_stop()?;
            }
            Ok(())
        })
    }

    /// Run `f`, issuing a STOP if it fails so the bus is not left claimed.
    fn transaction<T, F>(&mut self, f: F) -> Result<T, Error<E>>
    where
        F: FnOnce(&mut Self) -> Result<T, Error<E>>,
    {
        let result = f(&mut *self);
        if result.is_err() {
            self.i2c_stop().ok();
        }
        result
    }

    fn i2c_start(&mut self) -> Result<(), Error<E>> {
        self.set_sda_high()?;
        self.raise_scl()?;
        self.wait_for_clk();

        self.set_sda_low()?;
        self.wait_for_clk();

        self.set_scl_low()?;
        self.wait_for_clk();

        Ok(())
    }

    fn i2c_stop(&mut self) -> Result<(), Error<E>> {
        self.set_sda_low()?;
        self.wait_for_clk();

        self.raise_scl()?;
        self.wait_for_clk();

        self.set_sda_high()?;
        self.wait_for_clk();

        Ok(())
    }

    fn i2c_is_ack(&mut self) -> Result<bool, Error<E>> {
        self.set_sda_high()?;
        self.raise_scl()?;
        self.wait_for_clk();

        let ack = self.sda.is_low().map_err(Error::Bus)?;

        self.set_scl_low()?;
        self.wait_for_clk();

        Ok(ack)
    }

    fn i2c_read_byte(&mut self, should_send_ack: bool) -> Result<u8, Error<E>> {
        let mut byte: u8 = 0;

        self.set_sda_high()?;

        for bit_offset in 0..8 {
            self.raise_scl()?;
            self.wait_for_clk();

            if self.sda.is_high().map_err(Error::Bus)? {
                byte |= 1 << (7 - bit_offset);
            }

            self.set_scl_low()?;
            self.wait_for_clk();
        }

        if should_send_ack {
            self.set_sda_low()?;
        } else {
            self.set_sda_high()?;
        }

        self.raise_scl()?;
        self.wait_for_clk();

        self.set_scl_low()?;
        self.set_sda_high()?;
        self.wait_for_clk();

        Ok(byte)
    }

    /// Shift out one byte and return whether the slave acknowledged it.
    fn i2c_write_byte(&mut self, byte: u8) -> Result<bool, Error<E>> {
        for bit_offset in 0..8 {
            let out_bit = (byte >> (7 - bit_offset)) & 0b1;

            if out_bit == 1 {
                self.set_sda_high()?;
            } else {
                self.set_sda_low()?;
            }
            self.wait_for_clk();

            self.raise_scl()?;
            self.wait_for_clk();

            self.set_scl_low()?;
        }

        self.i2c_is_ack()
    }

    fn send_address(&mut self, byte: u8) -> Result<(), Error<E>> {
        if !self.i2c_write_byte(byte)? {
            debug!("no ack for address byte {:#04x}", byte);
            return Err(Error::NoAck);
        }
        Ok(())
    }

    #[inline]
    fn read_from_slave(&mut self, input: &mut [u8]) -> Result<(), Error<E>> {
        let last = input.len().saturating_sub(1);
        for (i, byte) in input.iter_mut().enumerate() {
            *byte = self.i2c_read_byte(i != last)?;
        }
        Ok(())
    }

    #[inline]
    fn write_to_slave(&mut self, output: &[u8]) -> Result<(), Error<E>> {
        for byte in output {
            self.check_ack(*byte)?;
        }
        Ok(())
    }

    /// Release SCL and wait for it to actually read high.
    ///
    /// A slave that is not ready holds SCL low; the bit is not sampled until
    /// it lets go.
    fn raise_scl(&mut self) -> Result<(), Error<E>> {
        self.set_scl_high()?;
        for _ in 0..STRETCH_LIMIT {
            if self.scl.is_high().map_err(Error::Bus)? {
                return Ok(());
            }
        }
        debug!("clock stretched past {} polls", STRETCH_LIMIT);
        Err(Error::ClockStretchTimeout)
    }

    #[inline]
    fn set_scl_high(&mut self) -> Result<(), Error<E>> {
        self.scl.set_high().map_err(Error::Bus)
    }

    #[inline]
    fn set_scl_low(&mut self) -> Result<(), Error<E>> {
        self.scl.set_low().map_err(Error::Bus)
    }

    #[inline]
    fn set_sda_high(&mut self) -> Result<(), Error<E>> {
        self.sda.set_high().map_err(Error::Bus)
    }

    #[inline]
    fn set_sda_low(&mut self) -> Result<(), Error<E>> {
        self.sda.set_low().map_err(Error::Bus)
    }

    #[inline]
    fn wait_for_clk(&mut self) {
        block!(self.clk.wait()).ok();
    }

    #[inline]
    fn check_ack(&mut self, byte: u8) -> Result<(), Error<E>> {
        if !self.i2c_write_byte(byte)? {
            Err(Error::NoAck)
        } else {
            Ok(())
        }
    }
}

impl<SCL, SDA, CLK, E> Write for I2cBB<SCL, SDA, CLK>
where
    SCL: OutputPin<Error = E> + InputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    CLK: CountDown + Periodic,
{
    type Error = Error<E>;

    fn write(&mut self, addr: u8, output: &[u8]) -> Result<(), Self::Error> {
        if output.is_empty() {
            return Ok(());
        }

        self.write_stream(addr, output, Framing::WHOLE)
    }
}

impl<SCL, SDA, CLK, E> Read for I2cBB<SCL, SDA, CLK>
where
    SCL: OutputPin<Error = E> + InputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    CLK: CountDown + Periodic,
{
    type Error = Error<E>;

    fn read(&mut self, addr: u8, input: &mut [u8]) -> Result<(), Self::Error> {
        if input.is_empty() {
            return Ok(());
        }

        let byte = address_byte(addr, Direction::Read)?;

        self.transaction(|bus| {
            // ST
            bus.i2c_start()?;

            // SAD + R
            bus.send_address(byte)?;

            bus.read_from_slave(input)?;

            // SP
            bus.i2c_stop()
        })
    }
}

impl<SCL, SDA, CLK, E> WriteRead for I2cBB<SCL, SDA, CLK>
where
    SCL: OutputPin<Error = E> + InputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    CLK: CountDown + Periodic,
{
    type Error = Error<E>;

    fn write_read(&mut self, addr: u8, output: &[u8], input: &mut [u8]) -> Result<(), Self::Error> {
        if output.is_empty() || input.is_empty() {
            return Err(Error::InvalidData);
        }

        let write = address_byte(addr, Direction::Write)?;
        let read = address_byte(addr, Direction::Read)?;

        self.transaction(|bus| {
            // ST
            bus.i2c_start()?;

            // SAD + W
            bus.send_address(write)?;

            bus.write_to_slave(output)?;

            // SR
            bus.i2c_start()?;

            // SAD + R
            bus.send_address(read)?;

            bus.read_from_slave(input)?;

            // SP
            bus.i2c_stop()
        })
    }
}
