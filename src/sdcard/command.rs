//! SPI-mode command frames.
//!
//! ```text
//! byte 0    0b01 | index[5:0]
//! byte 1-4  argument, big endian
//! byte 5    CRC7 << 1 | 1
//! ```
//!
//! The card checks CRCs only until it leaves the idle state, and only the two
//! commands sent before that need a valid one. Both have fixed arguments, so
//! their CRC bytes are constants and every other frame carries `0xFF`.

/// CRC byte of `GO_IDLE_STATE` with a zero argument.
pub const CRC_GO_IDLE_STATE: u8 = 0x95;

/// CRC byte of `SEND_IF_COND` with [`IF_COND_ARGUMENT`].
pub const CRC_SEND_IF_COND: u8 = 0x87;

/// CRC byte sent once CRC checking no longer applies.
pub const CRC_UNCHECKED: u8 = 0xFF;

/// 2.7-3.6 V supply range and the `0xAA` check pattern.
pub const IF_COND_ARGUMENT: u32 = 0x0000_01AA;

/// Host capacity support bit of `SD_SEND_OP_COND`.
pub const HIGH_CAPACITY_SUPPORT: u32 = 1 << 30;

/// A command the driver sends.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    /// CMD0, software reset into SPI mode
    GoIdleState,
    /// CMD8, supply voltage check with an echo pattern
    SendIfCond(u32),
    /// CMD16, block length for standard capacity cards
    SetBlockLen(u32),
    /// CMD17, read one block
    ReadSingleBlock(u32),
    /// ACMD41, start initialisation
    SdSendOpCond { high_capacity: bool },
    /// CMD55, the next command is application specific
    AppCmd,
    /// CMD58, read the operating conditions register
    ReadOcr,
}

impl Command {
    /// Command index without the start and transmission bits
    pub fn index(self) -> u8 {
        match self {
            Command::GoIdleState => 0,
            Command::SendIfCond(_) => 8,
            Command::SetBlockLen(_) => 16,
            Command::ReadSingleBlock(_) => 17,
            Command::SdSendOpCond { .. } => 41,
            Command::AppCmd => 55,
            Command::ReadOcr => 58,
        }
    }

    pub fn argument(self) -> u32 {
        match self {
            Command::SendIfCond(arg) | Command::SetBlockLen(arg) | Command::ReadSingleBlock(arg) => arg,
            Command::SdSendOpCond { high_capacity: true } => HIGH_CAPACITY_SUPPORT,
            Command::SdSendOpCond { high_capacity: false }
            | Command::GoIdleState
            | Command::AppCmd
            | Command::ReadOcr => 0,
        }
    }

    pub fn crc(self) -> u8 {
        match self {
            Command::GoIdleState => CRC_GO_IDLE_STATE,
            Command::SendIfCond(_) => CRC_SEND_IF_COND,
            _ => CRC_UNCHECKED,
        }
    }

    /// The 48-bit frame as sent on MOSI
    pub fn frame(self) -> [u8; 6] {
        let [a, b, c, d] = self.argument().to_be_bytes();
        [0x40 | (self.index() & 0x3F), a, b, c, d, self.crc()]
    }
}
