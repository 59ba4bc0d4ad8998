//! Response formats.

use core::fmt;

/// Single status byte returned after every command.
///
/// Bit 7 is always clear in a valid response, which is how it is told apart
/// from the `0xFF` the card clocks out while busy.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct R1(pub u8);

impl R1 {
    pub const IDLE: u8 = 1 << 0;
    pub const ERASE_RESET: u8 = 1 << 1;
    pub const ILLEGAL_COMMAND: u8 = 1 << 2;
    pub const CRC_ERROR: u8 = 1 << 3;
    pub const ERASE_SEQUENCE_ERROR: u8 = 1 << 4;
    pub const ADDRESS_ERROR: u8 = 1 << 5;
    pub const PARAMETER_ERROR: u8 = 1 << 6;

    const FLAGS: [(u8, &'static str); 7] = [
        (R1::IDLE, "idle"),
        (R1::ERASE_RESET, "erase reset"),
        (R1::ILLEGAL_COMMAND, "illegal command"),
        (R1::CRC_ERROR, "CRC error"),
        (R1::ERASE_SEQUENCE_ERROR, "erase sequence error"),
        (R1::ADDRESS_ERROR, "address error"),
        (R1::PARAMETER_ERROR, "parameter error"),
    ];

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `flag` is set
    pub fn has(self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn is_valid(self) -> bool {
        self.0 & 0x80 == 0
    }

    pub fn is_idle(self) -> bool {
        self.has(R1::IDLE)
    }

    /// Any flag other than idle is set
    pub fn is_error(self) -> bool {
        self.0 & !R1::IDLE != 0
    }

    /// Names of the flags that are set, lowest bit first
    pub fn flags(self) -> impl Iterator<Item = &'static str> {
        R1::FLAGS
            .iter()
            .filter(move |(mask, _)| self.0 & mask != 0)
            .map(|(_, name)| *name)
    }
}

impl fmt::Debug for R1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R1({:#04x}", self.0)?;
        let mut separator = ": ";
        for name in self.flags() {
            write!(f, "{}{}", separator, name)?;
            separator = " | ";
        }
        write!(f, ")")
    }
}

/// R1 followed by the operating conditions register.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct R3 {
    pub r1: R1,
    pub ocr: [u8; 4],
}

impl R3 {
    /// Card has finished powering up
    pub const POWER_UP_STATUS: u8 = 1 << 7;
    /// Card capacity status: set for block addressed cards
    pub const CARD_CAPACITY_STATUS: u8 = 1 << 6;

    /// Top byte of the OCR without the power up status bit
    pub fn capacity_byte(&self) -> u8 {
        self.ocr[0] & !R3::POWER_UP_STATUS
    }
}

/// R1 followed by the echoed interface condition.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct R7 {
    pub r1: R1,
    pub echo: [u8; 4],
}

impl R7 {
    /// Accepted voltage nibble
    pub fn voltage(&self) -> u8 {
        self.echo[2] & 0x0F
    }

    pub fn check_pattern(&self) -> u8 {
        self.echo[3]
    }

    /// Whether every echoed byte matches the argument that was sent
    pub fn echoes(&self, argument: u32) -> bool {
        self.echo == argument.to_be_bytes()
    }
}
