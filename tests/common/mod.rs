//! Simulated pins and slaves for the integration tests.
//!
//! Pins share state through `Rc<RefCell<..>>`, so a test keeps a handle on
//! the simulated wire while the bus under test owns the pins. Time is a
//! shared nanosecond counter advanced by pin writes and spin units.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use bitbang_bus::i2c::I2cBB;
use bitbang_bus::spi::{ActiveLevel, ChipSelect, ClockMode, SpiBus};
use bitbang_bus::timing::{NopSpin, SpinDelay, SpinTimer, Stopwatch};
use embedded_hal::digital::v2::{InputPin, OutputPin};

/// Simulated cost of one output pin write.
pub const PIN_NS: u64 = 10;

/// Simulated cost of one spin unit.
pub const UNIT_NS: u64 = 5;

#[derive(Clone, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    pub fn advance(&self, ns: u64) {
        self.0.set(self.0.get() + ns);
    }

    pub fn now(&self) -> u64 {
        self.0.get()
    }
}

pub struct SimSpin {
    pub clock: SimClock,
    pub unit_ns: u64,
}

impl SpinDelay for SimSpin {
    fn spin(&mut self, units: u32) {
        self.clock.advance(u64::from(units) * self.unit_ns);
    }
}

pub struct SimStopwatch(pub SimClock);

impl Stopwatch for SimStopwatch {
    fn now_ns(&mut self) -> u64 {
        self.0.now()
    }
}

// ---------------------------------------------------------------------------
// I2C
// ---------------------------------------------------------------------------

/// Which addresses the slave acknowledges.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Ack {
    Always,
    Never,
    Address(u8),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    Receive { address: bool },
    AckOut,
    Transmit,
    AckIn,
    Ignore,
}

/// Open-drain I2C slave with a 256 byte register file.
///
/// The first byte written after the address sets the register pointer,
/// further bytes are stored at the pointer. Reads return registers from the
/// pointer on. Both auto-increment.
pub struct I2cSlave {
    pub ack: Ack,
    /// NACK every data byte
    pub nack_data: bool,
    pub registers: [u8; 256],
    pub pointer: u8,
    /// Polls SCL is held low after each release by the master
    pub stretch: u32,
    /// Data bytes of each addressed write, in order
    pub transactions: Vec<Vec<u8>>,
    pub starts: usize,
    pub stops: usize,
    pub stretched_polls: u64,
    pub master_nacks: usize,

    master_scl: bool,
    master_sda: bool,
    hold_sda: bool,
    prev_scl: bool,
    prev_sda: bool,
    stretch_left: u32,
    phase: Phase,
    after_ack: Phase,
    bits: u8,
    shift: u8,
    out: u8,
    first_data: bool,
    master_acked: bool,
}

impl I2cSlave {
    pub fn new(ack: Ack) -> Self {
        I2cSlave {
            ack,
            nack_data: false,
            registers: [0; 256],
            pointer: 0,
            stretch: 0,
            transactions: Vec::new(),
            starts: 0,
            stops: 0,
            stretched_polls: 0,
            master_nacks: 0,
            master_scl: true,
            master_sda: true,
            hold_sda: false,
            prev_scl: true,
            prev_sda: true,
            stretch_left: 0,
            phase: Phase::Idle,
            after_ack: Phase::Idle,
            bits: 0,
            shift: 0,
            out: 0xFF,
            first_data: false,
            master_acked: false,
        }
    }

    /// Both lines read high and nothing holds them.
    pub fn lines_released(&self) -> bool {
        self.master_scl && self.sda() && !self.hold_sda
    }

    fn sda(&self) -> bool {
        self.master_sda && !self.hold_sda
    }

    fn drive(&mut self, line: I2cLine, high: bool) {
        match line {
            I2cLine::Scl => {
                if high && !self.master_scl {
                    self.stretch_left = self.stretch;
                }
                self.master_scl = high;
            }
            I2cLine::Sda => self.master_sda = high,
        }
        self.update();
    }

    fn read(&mut self, line: I2cLine) -> bool {
        match line {
            I2cLine::Scl => {
                if !self.master_scl {
                    return false;
                }
                if self.stretch_left > 0 {
                    self.stretch_left -= 1;
                    self.stretched_polls += 1;
                    return false;
                }
                true
            }
            I2cLine::Sda => self.sda(),
        }
    }

    fn update(&mut self) {
        let scl = self.master_scl;
        let sda = self.sda();
        match (self.prev_scl, scl) {
            (true, true) if self.prev_sda && !sda => self.on_start(),
            (true, true) if !self.prev_sda && sda => self.on_stop(),
            (false, true) => self.on_rise(sda),
            (true, false) => self.on_fall(),
            _ => {}
        }
        self.prev_scl = scl;
        self.prev_sda = self.sda();
    }

    fn on_start(&mut self) {
        self.starts += 1;
        self.phase = Phase::Receive { address: true };
        self.bits = 0;
        self.shift = 0;
        self.hold_sda = false;
    }

    fn on_stop(&mut self) {
        self.stops += 1;
        self.phase = Phase::Idle;
        self.hold_sda = false;
    }

    fn on_rise(&mut self, sda: bool) {
        match self.phase {
            Phase::Receive { .. } => {
                self.shift = (self.shift << 1) | sda as u8;
                self.bits += 1;
            }
            Phase::Transmit => self.bits += 1,
            Phase::AckIn => {
                self.master_acked = !sda;
                if sda {
                    self.master_nacks += 1;
                }
            }
            _ => {}
        }
    }

    fn on_fall(&mut self) {
        match self.phase {
            Phase::Receive { address } if self.bits == 8 => {
                let byte = self.shift;
                let (ack, next) = if address {
                    self.address_byte(byte)
                } else {
                    self.data_byte(byte)
                };
                self.hold_sda = ack;
                self.phase = Phase::AckOut;
                self.after_ack = next;
                self.bits = 0;
                self.shift = 0;
            }
            Phase::AckOut => {
                self.hold_sda = false;
                self.phase = self.after_ack;
                self.bits = 0;
                self.shift = 0;
                if self.phase == Phase::Transmit {
                    self.load();
                }
            }
            Phase::Transmit if self.bits == 8 => {
                self.hold_sda = false;
                self.phase = Phase::AckIn;
            }
            Phase::Transmit => {
                self.hold_sda = (self.out >> (7 - self.bits)) & 1 == 0;
            }
            Phase::AckIn => {
                if self.master_acked {
                    self.phase = Phase::Transmit;
                    self.load();
                } else {
                    self.phase = Phase::Ignore;
                }
            }
            _ => {}
        }
    }

    fn address_byte(&mut self, byte: u8) -> (bool, Phase) {
        let addr = byte >> 1;
        let read = byte & 1 == 1;
        let ack = match self.ack {
            Ack::Always => true,
            Ack::Never => false,
            Ack::Address(a) => a == addr,
        };
        if !ack {
            return (false, Phase::Ignore);
        }
        if read {
            (true, Phase::Transmit)
        } else {
            self.transactions.push(Vec::new());
            self.first_data = true;
            (true, Phase::Receive { address: false })
        }
    }

    fn data_byte(&mut self, byte: u8) -> (bool, Phase) {
        if let Some(t) = self.transactions.last_mut() {
            t.push(byte);
        }
        if self.first_data {
            self.pointer = byte;
            self.first_data = false;
        } else {
            self.registers[usize::from(self.pointer)] = byte;
            self.pointer = self.pointer.wrapping_add(1);
        }
        if self.nack_data {
            (false, Phase::Ignore)
        } else {
            (true, Phase::Receive { address: false })
        }
    }

    fn load(&mut self) {
        self.out = self.registers[usize::from(self.pointer)];
        self.pointer = self.pointer.wrapping_add(1);
        self.bits = 0;
        self.hold_sda = self.out & 0x80 == 0;
    }
}

#[derive(Clone, Copy, Debug)]
pub enum I2cLine {
    Scl,
    Sda,
}

/// Open-drain pin: high releases the line, low pulls it down.
pub struct I2cPin {
    slave: Rc<RefCell<I2cSlave>>,
    line: I2cLine,
}

impl OutputPin for I2cPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.slave.borrow_mut().drive(self.line, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.slave.borrow_mut().drive(self.line, true);
        Ok(())
    }
}

impl InputPin for I2cPin {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(self.slave.borrow_mut().read(self.line))
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

pub type SimI2c = I2cBB<I2cPin, I2cPin, SpinTimer<NopSpin>>;

/// An initialised bit banged master wired to `slave`.
pub fn i2c_bus(slave: I2cSlave) -> (Rc<RefCell<I2cSlave>>, SimI2c) {
    let slave = Rc::new(RefCell::new(slave));
    let scl = I2cPin {
        slave: slave.clone(),
        line: I2cLine::Scl,
    };
    let sda = I2cPin {
        slave: slave.clone(),
        line: I2cLine::Sda,
    };
    let mut i2c = I2cBB::new(scl, sda, SpinTimer::new(NopSpin, 0));
    i2c.init().unwrap();
    (slave, i2c)
}

// ---------------------------------------------------------------------------
// SPI
// ---------------------------------------------------------------------------

/// Byte level view of an SPI slave.
///
/// `next_byte` is asked for the byte to shift out when an exchange begins,
/// so a reply to a byte can appear in the following exchange at the
/// earliest.
pub trait SpiDevice {
    fn select(&mut self) {}
    fn deselect(&mut self) {}
    fn next_byte(&mut self) -> u8;
    fn byte_received(&mut self, byte: u8);
}

/// Never drives MISO low.
pub struct Silent;

impl SpiDevice for Silent {
    fn next_byte(&mut self) -> u8 {
        0xFF
    }

    fn byte_received(&mut self, _: u8) {}
}

/// Sends back the previous byte it received, `first` at the start of a
/// selection.
pub struct Echo {
    pub first: u8,
    last: u8,
}

impl Echo {
    pub fn new(first: u8) -> Self {
        Echo { first, last: first }
    }
}

impl SpiDevice for Echo {
    fn select(&mut self) {
        self.last = self.first;
    }

    fn next_byte(&mut self) -> u8 {
        self.last
    }

    fn byte_received(&mut self, byte: u8) {
        self.last = byte;
    }
}

/// Records every selection and answers from a script.
#[derive(Default)]
pub struct Recorder {
    pub sessions: Vec<Vec<u8>>,
    pub replies: VecDeque<u8>,
}

impl SpiDevice for Recorder {
    fn select(&mut self) {
        self.sessions.push(Vec::new());
    }

    fn next_byte(&mut self) -> u8 {
        self.replies.pop_front().unwrap_or(0xFF)
    }

    fn byte_received(&mut self, byte: u8) {
        if let Some(session) = self.sessions.last_mut() {
            session.push(byte);
        }
    }
}

struct Slot {
    line: u8,
    active: ActiveLevel,
    mode: ClockMode,
    device: Rc<RefCell<dyn SpiDevice>>,
    selected: bool,
    bits: u8,
    input: u8,
    out: u8,
    miso: bool,
}

impl Slot {
    fn edge(&mut self, level: bool, mosi: bool) {
        let leading = level != self.mode.idles_high();
        let early = self.mode.captures_on_leading_edge();

        if leading == early {
            // capture
            if early && self.bits == 0 {
                self.load();
            }
            self.input = (self.input << 1) | mosi as u8;
            self.bits += 1;
            if self.bits == 8 {
                self.device.borrow_mut().byte_received(self.input);
                self.bits = 0;
                self.input = 0;
            }
        } else if !early && self.bits == 0 {
            self.load();
        } else if self.bits > 0 {
            self.miso = (self.out >> (7 - self.bits)) & 1 == 1;
        }
    }

    fn load(&mut self) {
        self.out = self.device.borrow_mut().next_byte();
        self.miso = self.out & 0x80 != 0;
    }
}

/// Shared SCK, MOSI and MISO lines plus the chip-select lines.
pub struct SpiWire {
    clock: SimClock,
    sck: bool,
    mosi: bool,
    /// MISO follows MOSI, as with the two pins shorted
    pub loopback: bool,
    /// Rising SCK edges while no slave was selected
    pub free_clocks: u64,
    cs_levels: [Option<bool>; 32],
    slots: Vec<Slot>,
}

impl SpiWire {
    pub fn cs_level(&self, line: u8) -> Option<bool> {
        self.cs_levels[usize::from(line)]
    }

    pub fn sck(&self) -> bool {
        self.sck
    }

    pub fn mosi(&self) -> bool {
        self.mosi
    }

    pub fn selected(&self) -> Option<u8> {
        self.slots.iter().find(|s| s.selected).map(|s| s.line)
    }

    fn drive(&mut self, role: SpiRole, level: bool) {
        self.clock.advance(PIN_NS);
        match role {
            SpiRole::Mosi => self.mosi = level,
            SpiRole::Sck => {
                if level == self.sck {
                    return;
                }
                self.sck = level;
                let mosi = self.mosi;
                let mut any = false;
                for slot in self.slots.iter_mut().filter(|s| s.selected) {
                    any = true;
                    slot.edge(level, mosi);
                }
                if level && !any {
                    self.free_clocks += 1;
                }
            }
            SpiRole::Cs(line) => {
                self.cs_levels[usize::from(line)] = Some(level);
                for slot in self.slots.iter_mut().filter(|s| s.line == line) {
                    let selected = level == (slot.active == ActiveLevel::High);
                    if selected == slot.selected {
                        continue;
                    }
                    slot.selected = selected;
                    slot.bits = 0;
                    slot.input = 0;
                    slot.miso = true;
                    if selected {
                        slot.device.borrow_mut().select();
                    } else {
                        slot.device.borrow_mut().deselect();
                    }
                }
            }
            SpiRole::Miso => {}
        }
    }

    fn miso(&self) -> bool {
        if self.loopback {
            return self.mosi;
        }
        self.slots
            .iter()
            .find(|s| s.selected)
            .map_or(true, |s| s.miso)
    }
}

#[derive(Clone, Copy, Debug)]
pub enum SpiRole {
    Miso,
    Mosi,
    Sck,
    Cs(u8),
}

pub struct SpiPin {
    wire: Rc<RefCell<SpiWire>>,
    role: SpiRole,
}

impl OutputPin for SpiPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.wire.borrow_mut().drive(self.role, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.wire.borrow_mut().drive(self.role, true);
        Ok(())
    }
}

impl InputPin for SpiPin {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(self.wire.borrow().miso())
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

pub type SimBus = SpiBus<SpiPin, SpiPin, SpiPin, SpiPin, SimSpin, SimStopwatch>;

pub struct SimSpi {
    pub wire: Rc<RefCell<SpiWire>>,
    pub clock: SimClock,
}

impl SimSpi {
    pub fn new() -> Self {
        let clock = SimClock::default();
        let wire = SpiWire {
            clock: clock.clone(),
            sck: false,
            mosi: true,
            loopback: false,
            free_clocks: 0,
            cs_levels: [None; 32],
            slots: Vec::new(),
        };
        SimSpi {
            wire: Rc::new(RefCell::new(wire)),
            clock,
        }
    }

    pub fn pin(&self, role: SpiRole) -> SpiPin {
        SpiPin {
            wire: self.wire.clone(),
            role,
        }
    }

    /// An uninitialised bus on this wire.
    pub fn bus(&self) -> SimBus {
        self.bus_with_unit(UNIT_NS)
    }

    /// An uninitialised bus whose spin units cost `unit_ns` each.
    pub fn bus_with_unit(&self, unit_ns: u64) -> SimBus {
        SpiBus::new(
            self.pin(SpiRole::Miso),
            self.pin(SpiRole::Mosi),
            self.pin(SpiRole::Sck),
            SimSpin {
                clock: self.clock.clone(),
                unit_ns,
            },
            SimStopwatch(self.clock.clone()),
        )
    }

    /// Wire `device` to chip-select `line` and attach it to `bus`.
    pub fn attach(
        &self,
        bus: &mut SimBus,
        line: u8,
        mode: ClockMode,
        active: ActiveLevel,
        device: Rc<RefCell<dyn SpiDevice>>,
    ) -> ChipSelect {
        self.wire.borrow_mut().slots.push(Slot {
            line,
            active,
            mode,
            device,
            selected: false,
            bits: 0,
            input: 0,
            out: 0xFF,
            miso: true,
        });
        bus.attach(line, self.pin(SpiRole::Cs(line)), mode, active)
            .unwrap()
    }
}

/// Expected period of a bit on the simulated wire, which the calibration
/// should recover: three pin writes plus two half-cycle spins.
pub fn sim_period_ns(half_cycle: u32) -> u64 {
    3 * PIN_NS + 2 * u64::from(half_cycle) * UNIT_NS
}

// ---------------------------------------------------------------------------
// SD card
// ---------------------------------------------------------------------------

/// Content of block `block` on the simulated card.
pub fn block_pattern(block: u32) -> [u8; 512] {
    let mut data = [0u8; 512];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (block as u8).wrapping_mul(31) ^ (i as u8) ^ ((i >> 8) as u8);
    }
    data
}

/// SD card in SPI mode answering the commands the driver issues.
pub struct SimCard {
    /// Top OCR byte, power up status and capacity bits included
    pub ocr: u8,
    /// Four bytes echoed for `SEND_IF_COND`; the argument's own when `None`
    pub echo: Option<[u8; 4]>,
    /// R1 sent for `GO_IDLE_STATE`
    pub go_idle_reply: u8,
    /// 0xFF bytes sent ahead of every R1
    pub busy_bytes: usize,
    /// `SD_SEND_OP_COND` count at which the card leaves idle
    pub ready_after: u32,
    /// Busy bytes before the data token
    pub token_delay: usize,
    pub data_token: u8,
    /// Every command received as (index, argument)
    pub commands: Vec<(u8, u32)>,
    /// Block numbers read
    pub reads: Vec<u32>,
    pub block_len: Option<u32>,
    op_cond_count: u32,
    app_cmd: bool,
    idle: bool,
    frame: Vec<u8>,
    queue: VecDeque<u8>,
}

impl SimCard {
    pub fn new(ocr: u8) -> Self {
        SimCard {
            ocr,
            echo: None,
            go_idle_reply: 0x01,
            busy_bytes: 1,
            ready_after: 3,
            token_delay: 4,
            data_token: 0xFE,
            commands: Vec::new(),
            reads: Vec::new(),
            block_len: None,
            op_cond_count: 0,
            app_cmd: false,
            idle: false,
            frame: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn command_indices(&self) -> Vec<u8> {
        self.commands.iter().map(|&(index, _)| index).collect()
    }

    pub fn op_cond_count(&self) -> u32 {
        self.op_cond_count
    }

    fn r1(&self) -> u8 {
        self.idle as u8
    }

    fn respond(&mut self, index: u8, arg: u32) {
        self.queue.clear();
        self.queue.extend(std::iter::repeat(0xFF).take(self.busy_bytes));
        let app = std::mem::replace(&mut self.app_cmd, false);

        match (index, app) {
            (0, _) => {
                self.idle = true;
                self.queue.push_back(self.go_idle_reply);
            }
            (8, _) => {
                let echo = self.echo.unwrap_or(arg.to_be_bytes());
                self.queue.push_back(self.r1());
                self.queue.extend(echo);
            }
            (55, _) => {
                self.app_cmd = true;
                self.queue.push_back(self.r1());
            }
            (41, true) => {
                self.op_cond_count += 1;
                if self.op_cond_count >= self.ready_after {
                    self.idle = false;
                }
                self.queue.push_back(self.r1());
            }
            (58, _) => {
                self.queue.extend([self.r1(), self.ocr, 0xFF, 0x80, 0x00]);
            }
            (16, _) => {
                self.block_len = Some(arg);
                self.queue.push_back(self.r1());
            }
            (17, _) => {
                let block = if self.ocr & 0x40 != 0 { arg } else { arg / 512 };
                self.reads.push(block);
                self.queue.push_back(self.r1());
                self.queue.extend(std::iter::repeat(0xFF).take(self.token_delay));
                self.queue.push_back(self.data_token);
                if self.data_token == 0xFE {
                    self.queue.extend(block_pattern(block));
                    self.queue.extend([0x12, 0x34]);
                }
            }
            _ => self.queue.push_back(self.r1() | 0x04),
        }
    }
}

impl SpiDevice for SimCard {
    fn deselect(&mut self) {
        self.queue.clear();
        self.frame.clear();
    }

    fn next_byte(&mut self) -> u8 {
        self.queue.pop_front().unwrap_or(0xFF)
    }

    fn byte_received(&mut self, byte: u8) {
        if self.frame.is_empty() && byte & 0xC0 != 0x40 {
            return;
        }
        self.frame.push(byte);
        if self.frame.len() == 6 {
            let index = self.frame[0] & 0x3F;
            let arg = u32::from_be_bytes([self.frame[1], self.frame[2], self.frame[3], self.frame[4]]);
            self.frame.clear();
            self.commands.push((index, arg));
            self.respond(index, arg);
        }
    }
}
