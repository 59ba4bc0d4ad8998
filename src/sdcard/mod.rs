/*!
  # SD card block reads over a bit banged SPI bus

  Only SD version 2.0 and later cards are supported: a card that does not
  echo the `SEND_IF_COND` check pattern is rejected during [`SdCard::init`].

  The card is driven through [`ChipSelectBus`], so the session state kept
  here is just the chip-select and the addressing mode negotiated at init.
  Every command runs in its own selection window followed by one idle byte
  with the chip-select released, which lets the card let go of MISO.

  ```no_run
  # fn run<B: bitbang_bus::spi::ChipSelectBus, D: embedded_hal::blocking::delay::DelayMs<u8>>(
  #     bus: &mut B, delay: &mut D, cs: bitbang_bus::spi::ChipSelect,
  # ) -> Result<(), bitbang_bus::sdcard::Error<B::Error>> {
  use bitbang_bus::sdcard::{SdCard, BLOCK_SIZE};

  let mut card = SdCard::new(cs);
  card.init(bus, delay)?;

  let mut block = [0u8; BLOCK_SIZE];
  card.read_block(bus, 0, &mut block)?;
  # Ok(())
  # }
  ```
*/

pub mod command;
pub mod response;

use embedded_hal::blocking::delay::DelayMs;
use log::{debug, info, trace, warn};

use crate::spi::{ChipSelect, ChipSelectBus, IDLE_FILL};
use command::{Command, IF_COND_ARGUMENT};
use response::{R1, R3, R7};

/// Bytes per block.
pub const BLOCK_SIZE: usize = 512;

/// Idle bytes clocked while waiting for an R1 response.
pub const R1_POLL_LIMIT: usize = 8;

/// Idle bytes clocked while waiting for the data start token.
pub const TOKEN_POLL_LIMIT: usize = 10_000;

/// `APP_CMD` + `SD_SEND_OP_COND` rounds before giving up on initialisation.
pub const INIT_ATTEMPTS: u8 = 10;

/// Delay between two initialisation rounds.
pub const INIT_RETRY_DELAY_MS: u8 = 10;

/// Clock rate while the card is being negotiated.
pub const INIT_FREQUENCY_HZ: u32 = 400_000;

/// The operating clock is the calibrated maximum divided by this.
pub const SPEED_DIVISOR: u32 = 4;

/// Fastest clock a card accepts in SPI mode.
pub const MAX_FREQUENCY_HZ: u32 = 25_000_000;

/// Idle bytes clocked on power-up, at least 74 clock pulses.
pub const POWER_UP_CLOCK_BYTES: usize = 10;

/// Token preceding a data block.
pub const DATA_START_TOKEN: u8 = 0xFE;

/// How block addresses are encoded in read commands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressingMode {
    /// Standard capacity: the argument is a byte offset
    Byte,
    /// High capacity: the argument is a block number
    Block,
}

/// SD card error
#[derive(Debug, Eq, PartialEq)]
pub enum Error<E> {
    /// SPI bus error
    Spi(E),
    /// No R1 response to the command with this index
    NoResponse(u8),
    /// R1 response with unexpected flags
    UnexpectedResponse { command: u8, r1: R1 },
    /// `SEND_IF_COND` echo does not match the argument sent
    CheckPatternMismatch { echo: [u8; 4] },
    /// The card stayed idle for every initialisation round
    InitTimeout,
    /// Top OCR byte is neither a standard nor a high capacity card
    UnsupportedOcr(u8),
    /// No successful `init` since the card was created or last failed
    NotInitialized,
    /// No data token within [`TOKEN_POLL_LIMIT`] bytes
    TokenTimeout,
    /// The card answered with a data error token
    DataError(u8),
    /// Block number does not fit the card's address space
    AddressOutOfRange,
}

/// An SD card on one chip-select of a shared bus.
#[derive(Debug)]
pub struct SdCard {
    cs: ChipSelect,
    addressing: Option<AddressingMode>,
}

impl SdCard {
    pub fn new(cs: ChipSelect) -> Self {
        SdCard {
            cs,
            addressing: None,
        }
    }

    pub fn chip_select(&self) -> ChipSelect {
        self.cs
    }

    /// Addressing mode found by the last successful `init`.
    pub fn addressing(&self) -> Option<AddressingMode> {
        self.addressing
    }

    pub fn is_initialized(&self) -> bool {
        self.addressing.is_some()
    }

    /// Power up the card, switch it to SPI mode and negotiate addressing.
    ///
    /// The bus runs at [`INIT_FREQUENCY_HZ`] during negotiation and is then
    /// raised to the operating clock. Any failure leaves the card
    /// uninitialised.
    pub fn init<B, DL>(&mut self, bus: &mut B, delay: &mut DL) -> Result<AddressingMode, Error<B::Error>>
    where
        B: ChipSelectBus,
        DL: DelayMs<u8>,
    {
        self.addressing = None;

        bus.set_frequency(INIT_FREQUENCY_HZ).map_err(Error::Spi)?;
        delay.delay_ms(1);
        bus.set_mosi(true).map_err(Error::Spi)?;
        bus.idle_clocks(self.cs, POWER_UP_CLOCK_BYTES)
            .map_err(Error::Spi)?;

        let r1 = self.command(bus, Command::GoIdleState)?;
        if r1 != R1(R1::IDLE) {
            return Err(unexpected(Command::GoIdleState, r1));
        }

        self.check_interface(bus)?;
        self.negotiate(bus, delay)?;

        let hz = (bus.max_frequency() / SPEED_DIVISOR).min(MAX_FREQUENCY_HZ);
        let achieved = bus.set_frequency(hz).map_err(Error::Spi)?;
        debug!("SD clock raised to {} kHz", achieved / 1000);

        let ocr = self.read_ocr(bus)?;
        let addressing = match ocr.capacity_byte() {
            0 => AddressingMode::Byte,
            R3::CARD_CAPACITY_STATUS => AddressingMode::Block,
            other => {
                warn!("unsupported OCR {:#04x}", ocr.ocr[0]);
                return Err(Error::UnsupportedOcr(other));
            }
        };

        if addressing == AddressingMode::Byte {
            let cmd = Command::SetBlockLen(BLOCK_SIZE as u32);
            let r1 = self.command(bus, cmd)?;
            if r1 != R1(0) {
                return Err(unexpected(cmd, r1));
            }
        }

        info!("SD card on chip-select {} ready, {:?} addressed", self.cs.0, addressing);
        self.addressing = Some(addressing);
        Ok(addressing)
    }

    /// Read one block into `buf`.
    pub fn read_block<B>(&mut self, bus: &mut B, block: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<(), Error<B::Error>>
    where
        B: ChipSelectBus,
    {
        let address = match self.addressing.ok_or(Error::NotInitialized)? {
            AddressingMode::Block => block,
            AddressingMode::Byte => block
                .checked_mul(BLOCK_SIZE as u32)
                .ok_or(Error::AddressOutOfRange)?,
        };
        let cmd = Command::ReadSingleBlock(address);

        self.session(bus, |cs, bus| {
            let r1 = send(bus, cs, cmd)?;
            if r1 != R1(0) {
                return Err(unexpected(cmd, r1));
            }

            let token = bus
                .poll(cs, IDLE_FILL, TOKEN_POLL_LIMIT, |byte| byte != IDLE_FILL)
                .map_err(Error::Spi)?;
            match token {
                Some(DATA_START_TOKEN) => {}
                Some(token) => {
                    warn!("read of block {} failed with token {:#04x}", block, token);
                    return Err(Error::DataError(token));
                }
                None => return Err(Error::TokenTimeout),
            }

            bus.read(cs, buf).map_err(Error::Spi)?;
            let mut crc = [0u8; 2];
            bus.read(cs, &mut crc).map_err(Error::Spi)
        })?;

        trace!("read block {}", block);
        Ok(())
    }

    /// Read consecutive blocks starting at `start`, one per buffer.
    pub fn read_blocks<B>(&mut self, bus: &mut B, start: u32, bufs: &mut [[u8; BLOCK_SIZE]]) -> Result<(), Error<B::Error>>
    where
        B: ChipSelectBus,
    {
        let mut block = start;
        for buf in bufs.iter_mut() {
            self.read_block(bus, block, buf)?;
            block = block.checked_add(1).ok_or(Error::AddressOutOfRange)?;
        }
        Ok(())
    }

    /// `SEND_IF_COND`: the card must be idle and echo the argument.
    fn check_interface<B: ChipSelectBus>(&mut self, bus: &mut B) -> Result<(), Error<B::Error>> {
        let cmd = Command::SendIfCond(IF_COND_ARGUMENT);
        let mut echo = [0u8; 4];
        let r1 = self.command_with_payload(bus, cmd, &mut echo)?;
        if r1 != R1(R1::IDLE) {
            return Err(unexpected(cmd, r1));
        }

        let r7 = R7 { r1, echo };
        if !r7.echoes(IF_COND_ARGUMENT) {
            warn!("SD check pattern mismatch: {:02x?}", echo);
            return Err(Error::CheckPatternMismatch { echo });
        }
        Ok(())
    }

    /// Repeat `APP_CMD` + `SD_SEND_OP_COND` until the card leaves idle.
    fn negotiate<B, DL>(&mut self, bus: &mut B, delay: &mut DL) -> Result<(), Error<B::Error>>
    where
        B: ChipSelectBus,
        DL: DelayMs<u8>,
    {
        let op_cond = Command::SdSendOpCond {
            high_capacity: true,
        };

        for attempt in 1..=INIT_ATTEMPTS {
            let r1 = self.command(bus, Command::AppCmd)?;
            if r1.is_error() {
                return Err(unexpected(Command::AppCmd, r1));
            }
            let r1 = self.command(bus, op_cond)?;
            if r1.is_error() {
                return Err(unexpected(op_cond, r1));
            }
            if !r1.is_idle() {
                debug!("SD card left idle after {} rounds", attempt);
                return Ok(());
            }
            delay.delay_ms(INIT_RETRY_DELAY_MS);
        }

        warn!("SD card still idle after {} rounds", INIT_ATTEMPTS);
        Err(Error::InitTimeout)
    }

    fn read_ocr<B: ChipSelectBus>(&mut self, bus: &mut B) -> Result<R3, Error<B::Error>> {
        let mut ocr = [0u8; 4];
        let r1 = self.command_with_payload(bus, Command::ReadOcr, &mut ocr)?;
        if r1 != R1(0) {
            return Err(unexpected(Command::ReadOcr, r1));
        }
        Ok(R3 { r1, ocr })
    }

    fn command<B: ChipSelectBus>(&mut self, bus: &mut B, cmd: Command) -> Result<R1, Error<B::Error>> {
        self.session(bus, |cs, bus| send(bus, cs, cmd))
    }

    /// Send `cmd` and read the four bytes following its R1.
    fn command_with_payload<B: ChipSelectBus>(
        &mut self,
        bus: &mut B,
        cmd: Command,
        payload: &mut [u8; 4],
    ) -> Result<R1, Error<B::Error>> {
        self.session(bus, |cs, bus| {
            let r1 = send(bus, cs, cmd)?;
            bus.read(cs, payload).map_err(Error::Spi)?;
            Ok(r1)
        })
    }

    /// Run `f` with the card selected, then release it and clock one idle
    /// byte. Release and idle byte happen even when `f` fails, and the
    /// first error in that order is returned.
    fn session<B, T, F>(&mut self, bus: &mut B, f: F) -> Result<T, Error<B::Error>>
    where
        B: ChipSelectBus,
        F: FnOnce(ChipSelect, &mut B) -> Result<T, Error<B::Error>>,
    {
        let cs = self.cs;
        bus.select(cs).map_err(Error::Spi)?;
        let result = f(cs, &mut *bus);
        let release = bus.deselect(cs).map_err(Error::Spi);
        let idle = bus.idle_clocks(cs, 1).map_err(Error::Spi);
        let value = result?;
        release?;
        idle?;
        Ok(value)
    }
}

/// Write a command frame and wait for its R1.
fn send<B: ChipSelectBus>(bus: &mut B, cs: ChipSelect, cmd: Command) -> Result<R1, Error<B::Error>> {
    bus.write(cs, &cmd.frame()).map_err(Error::Spi)?;
    let response = bus
        .poll(cs, IDLE_FILL, R1_POLL_LIMIT, |byte| R1(byte).is_valid())
        .map_err(Error::Spi)?;

    match response {
        Some(byte) => {
            let r1 = R1(byte);
            trace!("CMD{} -> {:?}", cmd.index(), r1);
            Ok(r1)
        }
        None => {
            debug!("CMD{} got no response", cmd.index());
            Err(Error::NoResponse(cmd.index()))
        }
    }
}

fn unexpected<E>(cmd: Command, r1: R1) -> Error<E> {
    debug!("CMD{} rejected: {:?}", cmd.index(), r1);
    Error::UnexpectedResponse {
        command: cmd.index(),
        r1,
    }
}
