//! Controller commands and I2C control bytes.

use core::ops::Deref;

/// Control byte flag: another control byte follows the next byte.
pub const CONTINUATION: u8 = 1 << 7;

/// Control byte flag: the following bytes are display RAM data.
pub const DATA: u8 = 1 << 6;

/// Control byte announcing a run of command bytes.
pub const COMMAND_STREAM: u8 = 0x00;

/// Control byte announcing a run of display data.
pub const DATA_STREAM: u8 = DATA;

/// Build a control byte. The six low bits are always zero.
pub const fn control_byte(continuation: bool, data: bool) -> u8 {
    (if continuation { CONTINUATION } else { 0 }) | (if data { DATA } else { 0 })
}

/// How the RAM pointer advances after each data byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressingMode {
    /// Column advances and wraps to the next page
    Horizontal = 0b00,
    /// Page advances and wraps to the next column
    Vertical = 0b01,
    /// Column advances and wraps within the page
    Page = 0b10,
}

/// A command and its arguments.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    DisplayOn,
    /// Sleep
    DisplayOff,
    /// Oscillator frequency in the high nibble, clock divide ratio - 1 in the low nibble
    ClockDivide(u8),
    /// Multiplex ratio - 1
    Multiplex(u8),
    /// Vertical shift of the COM lines
    DisplayOffset(u8),
    /// RAM row shown on the first line, 0-63
    StartLine(u8),
    ChargePump(bool),
    AddressingMode(AddressingMode),
    /// Map column 127 to SEG0
    SegmentRemap(bool),
    /// Scan from COM[N-1] to COM0
    ComScanRemapped(bool),
    ComPins(u8),
    Contrast(u8),
    /// Phase 2 period in the high nibble, phase 1 in the low nibble
    PreCharge(u8),
    VcomhDeselect(u8),
    /// Lit pixels for set RAM bits
    Normal,
    /// Lit pixels for clear RAM bits
    Invert,
    /// Every pixel lit regardless of RAM
    EntireDisplayOn,
    /// Output follows RAM content
    ResumeToRam,
    Nop,
    /// Page mode only
    PageStart(u8),
    /// Page mode only
    ColumnStart(u8),
    /// Horizontal and vertical modes only
    ColumnRange(u8, u8),
}

impl Command {
    /// Command bytes without the control byte.
    pub fn encode(self) -> CommandBytes {
        match self {
            Command::DisplayOn => CommandBytes::one(0xAF),
            Command::DisplayOff => CommandBytes::one(0xAE),
            Command::ClockDivide(value) => CommandBytes::two(0xD5, value),
            Command::Multiplex(ratio) => CommandBytes::two(0xA8, ratio & 0x3F),
            Command::DisplayOffset(offset) => CommandBytes::two(0xD3, offset & 0x3F),
            Command::StartLine(line) => CommandBytes::one(0x40 | (line & 0x3F)),
            Command::ChargePump(on) => CommandBytes::two(0x8D, if on { 0x14 } else { 0x10 }),
            Command::AddressingMode(mode) => CommandBytes::two(0x20, mode as u8),
            Command::SegmentRemap(remap) => CommandBytes::one(0xA0 | remap as u8),
            Command::ComScanRemapped(remap) => CommandBytes::one(if remap { 0xC8 } else { 0xC0 }),
            Command::ComPins(config) => CommandBytes::two(0xDA, config),
            Command::Contrast(level) => CommandBytes::two(0x81, level),
            Command::PreCharge(period) => CommandBytes::two(0xD9, period),
            Command::VcomhDeselect(level) => CommandBytes::two(0xDB, level),
            Command::Normal => CommandBytes::one(0xA6),
            Command::Invert => CommandBytes::one(0xA7),
            Command::EntireDisplayOn => CommandBytes::one(0xA5),
            Command::ResumeToRam => CommandBytes::one(0xA4),
            Command::Nop => CommandBytes::one(0xE3),
            Command::PageStart(page) => CommandBytes::one(0xB0 | (page & 0x07)),
            Command::ColumnStart(column) => CommandBytes::two(column & 0x0F, 0x10 | ((column >> 4) & 0x0F)),
            Command::ColumnRange(start, end) => CommandBytes {
                bytes: [0x21, start & 0x7F, end & 0x7F],
                len: 3,
            },
        }
    }
}

/// Encoded command, at most three bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommandBytes {
    bytes: [u8; 3],
    len: usize,
}

impl CommandBytes {
    const fn one(op: u8) -> Self {
        CommandBytes {
            bytes: [op, 0, 0],
            len: 1,
        }
    }

    const fn two(op: u8, arg: u8) -> Self {
        CommandBytes {
            bytes: [op, arg, 0],
            len: 2,
        }
    }
}

impl Deref for CommandBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}
