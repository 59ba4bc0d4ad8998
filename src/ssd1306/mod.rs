/*!
  # SSD1306 128x64 OLED driver over I2C

  The driver keeps a [`Framebuffer`] shadow of the display RAM. Drawing
  calls only change the shadow unless asked to flush, in which case the
  pages they touched are streamed to the display.

  Works with any `embedded-hal` blocking I2C master, including
  [`I2cBB`](crate::i2c::I2cBB).

  Every I2C write starts with a control byte: bit 6 selects data (1) or
  commands (0), bit 7 announces that another control byte follows the next
  byte.
*/

pub mod command;
pub mod framebuffer;

use embedded_hal::blocking::i2c::Write;
use log::{debug, warn};

pub use command::{AddressingMode, Command};
pub use framebuffer::{DirtyPages, DrawError, Framebuffer, RectStyle, HEIGHT, PAGES, WIDTH};

use command::{control_byte, COMMAND_STREAM, DATA_STREAM};

/// Address with D/C# tied high.
pub const DEFAULT_ADDRESS: u8 = 0x3D;

/// Address with D/C# tied low.
pub const ALTERNATE_ADDRESS: u8 = 0x3C;

/// Configuration written by [`Ssd1306::init`], in order.
pub const INIT_SEQUENCE: [Command; 14] = [
    Command::DisplayOff,
    Command::ClockDivide(0x80),
    Command::Multiplex(0x3F),
    Command::DisplayOffset(0x00),
    Command::StartLine(0),
    Command::ChargePump(true),
    Command::AddressingMode(AddressingMode::Page),
    Command::SegmentRemap(true),
    Command::ComScanRemapped(true),
    Command::ComPins(0x12),
    Command::Contrast(0xFF),
    Command::PreCharge(0xF1),
    Command::VcomhDeselect(0x40),
    Command::Normal,
];

/// SSD1306 error
#[derive(Debug, Eq, PartialEq)]
pub enum Error<E> {
    /// I2C bus error
    I2c(E),
    /// Drawing request rejected before touching the framebuffer
    Draw(DrawError),
    /// Command not available in the current addressing mode
    WrongAddressingMode(AddressingMode),
}

impl<E> From<DrawError> for Error<E> {
    fn from(e: DrawError) -> Self {
        Error::Draw(e)
    }
}

pub struct Ssd1306<I2C> {
    i2c: I2C,
    address: u8,
    mode: AddressingMode,
    framebuffer: Framebuffer,
}

impl<I2C, E> Ssd1306<I2C>
where
    I2C: Write<Error = E>,
{
    pub fn new(i2c: I2C, address: u8) -> Self {
        Ssd1306 {
            i2c,
            address,
            mode: AddressingMode::Page,
            framebuffer: Framebuffer::new(),
        }
    }

    /// Return the I2C bus
    pub fn release(self) -> I2C {
        self.i2c
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn addressing_mode(&self) -> AddressingMode {
        self.mode
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Draw directly on the shadow copy. Nothing is sent until a flush.
    pub fn framebuffer_mut(&mut self) -> &mut Framebuffer {
        &mut self.framebuffer
    }

    /// Configure the panel, blank it and switch it on.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        for cmd in INIT_SEQUENCE {
            self.command(cmd)?;
        }
        self.mode = AddressingMode::Page;
        self.clear_screen()?;
        self.display_on()?;
        debug!("SSD1306 at {:#04x} initialised", self.address);
        Ok(())
    }

    /// Send one command in its own transaction.
    pub fn command(&mut self, cmd: Command) -> Result<(), Error<E>> {
        let bytes = cmd.encode();
        let mut buf = [COMMAND_STREAM; 4];
        buf[1..=bytes.len()].copy_from_slice(&bytes);
        self.i2c
            .write(self.address, &buf[..=bytes.len()])
            .map_err(Error::I2c)
    }

    pub fn set_contrast(&mut self, level: u8) -> Result<(), Error<E>> {
        self.command(Command::Contrast(level))
    }

    pub fn display_on(&mut self) -> Result<(), Error<E>> {
        self.command(Command::DisplayOn)
    }

    pub fn display_off(&mut self) -> Result<(), Error<E>> {
        self.command(Command::DisplayOff)
    }

    pub fn invert(&mut self) -> Result<(), Error<E>> {
        self.command(Command::Invert)
    }

    pub fn normal(&mut self) -> Result<(), Error<E>> {
        self.command(Command::Normal)
    }

    /// Light every pixel, ignoring RAM.
    pub fn entire_display_on(&mut self) -> Result<(), Error<E>> {
        self.command(Command::EntireDisplayOn)
    }

    /// Show RAM content again after [`entire_display_on`](Self::entire_display_on).
    pub fn show_ram(&mut self) -> Result<(), Error<E>> {
        self.command(Command::ResumeToRam)
    }

    pub fn nop(&mut self) -> Result<(), Error<E>> {
        self.command(Command::Nop)
    }

    pub fn set_addressing_mode(&mut self, mode: AddressingMode) -> Result<(), Error<E>> {
        self.command(Command::AddressingMode(mode))?;
        self.mode = mode;
        Ok(())
    }

    /// Column window for horizontal and vertical addressing.
    pub fn set_column_range(&mut self, start: u8, end: u8) -> Result<(), Error<E>> {
        if self.mode == AddressingMode::Page {
            return Err(Error::WrongAddressingMode(self.mode));
        }
        if usize::from(start) >= WIDTH || usize::from(end) >= WIDTH {
            return Err(Error::Draw(DrawError::OutOfBounds { x: start.max(end), y: 0 }));
        }
        self.command(Command::ColumnRange(start, end))
    }

    /// Page pointer for page addressing.
    pub fn set_page_address(&mut self, page: u8) -> Result<(), Error<E>> {
        self.require_page_mode()?;
        if usize::from(page) >= PAGES {
            return Err(Error::Draw(DrawError::InvalidPage(page)));
        }
        self.command(Command::PageStart(page))
    }

    /// Column pointer for page addressing.
    pub fn set_column_address(&mut self, column: u8) -> Result<(), Error<E>> {
        self.require_page_mode()?;
        if usize::from(column) >= WIDTH {
            return Err(Error::Draw(DrawError::OutOfBounds { x: column, y: 0 }));
        }
        self.command(Command::ColumnStart(column))
    }

    /// Push the whole framebuffer, then make RAM content visible.
    pub fn refresh(&mut self) -> Result<(), Error<E>> {
        self.enter_page_mode()?;
        for page in 0..PAGES as u8 {
            self.command(Command::PageStart(page))?;
            self.command(Command::ColumnStart(0))?;
            self.write_page_data(page)?;
        }
        self.show_ram()
    }

    /// Push one page.
    ///
    /// The page and column pointers are set in a single transaction using
    /// a continued control byte, followed by the page data.
    pub fn flush_page(&mut self, page: u8) -> Result<(), Error<E>> {
        if usize::from(page) >= PAGES {
            return Err(Error::Draw(DrawError::InvalidPage(page)));
        }
        self.enter_page_mode()?;

        let start = Command::PageStart(page).encode();
        let column = Command::ColumnStart(0).encode();
        let header = [
            control_byte(true, false),
            start[0],
            control_byte(false, false),
            column[0],
            column[1],
        ];
        self.i2c.write(self.address, &header).map_err(Error::I2c)?;
        self.write_page_data(page)
    }

    /// Push every page in `dirty`.
    pub fn flush(&mut self, dirty: DirtyPages) -> Result<(), Error<E>> {
        for page in dirty.iter() {
            self.flush_page(page)?;
        }
        Ok(())
    }

    /// Blank the framebuffer and the display.
    pub fn clear_screen(&mut self) -> Result<(), Error<E>> {
        self.framebuffer.clear();
        self.refresh()
    }

    pub fn clear_page(&mut self, page: u8, flush: bool) -> Result<(), Error<E>> {
        let dirty = self.framebuffer.clear_page(page)?;
        self.sync(dirty, flush)
    }

    pub fn set_pixel(&mut self, x: u8, y: u8, on: bool, flush: bool) -> Result<(), Error<E>> {
        let dirty = self.framebuffer.set_pixel(x, y, on)?;
        self.sync(dirty, flush)
    }

    pub fn hline(&mut self, x0: u8, x1: u8, y: u8, flush: bool) -> Result<(), Error<E>> {
        let dirty = self.framebuffer.hline(x0, x1, y)?;
        self.sync(dirty, flush)
    }

    pub fn vline(&mut self, x: u8, y0: u8, y1: u8, flush: bool) -> Result<(), Error<E>> {
        let dirty = self.framebuffer.vline(x, y0, y1)?;
        self.sync(dirty, flush)
    }

    pub fn line(&mut self, x0: u8, y0: u8, x1: u8, y1: u8, flush: bool) -> Result<(), Error<E>> {
        let dirty = self.framebuffer.line(x0, y0, x1, y1)?;
        self.sync(dirty, flush)
    }

    pub fn rect(&mut self, x: u8, y: u8, width: u8, height: u8, style: RectStyle, flush: bool) -> Result<(), Error<E>> {
        let dirty = self.framebuffer.rect(x, y, width, height, style)?;
        self.sync(dirty, flush)
    }

    fn sync(&mut self, dirty: DirtyPages, flush: bool) -> Result<(), Error<E>> {
        if flush {
            self.flush(dirty)
        } else {
            Ok(())
        }
    }

    fn write_page_data(&mut self, page: u8) -> Result<(), Error<E>> {
        let mut buf = [DATA_STREAM; WIDTH + 1];
        buf[1..].copy_from_slice(self.framebuffer.page(page)?);
        self.i2c.write(self.address, &buf).map_err(Error::I2c)
    }

    fn require_page_mode(&self) -> Result<(), Error<E>> {
        if self.mode != AddressingMode::Page {
            warn!("page addressing required, display is in {:?} mode", self.mode);
            return Err(Error::WrongAddressingMode(self.mode));
        }
        Ok(())
    }

    fn enter_page_mode(&mut self) -> Result<(), Error<E>> {
        if self.mode != AddressingMode::Page {
            self.set_addressing_mode(AddressingMode::Page)?;
        }
        Ok(())
    }
}
