//! Shadow copy of the display RAM.
//!
//! The RAM is eight pages of 128 columns. Each column byte is a vertical
//! slice of eight pixels with bit 0 at the top, so pixel `(x, y)` lives in
//! page `y / 8`, column `x`, bit `y % 8`.
//!
//! Drawing only touches memory and reports which pages changed as a
//! [`DirtyPages`] mask; the driver decides when to push them.

use core::ops::{BitOr, BitOrAssign};

/// Display width in pixels.
pub const WIDTH: usize = 128;

/// Display height in pixels.
pub const HEIGHT: usize = 64;

/// Pages of eight pixel rows.
pub const PAGES: usize = HEIGHT / 8;

/// Rejected drawing request. The framebuffer is left untouched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DrawError {
    /// Coordinate outside the display
    OutOfBounds { x: u8, y: u8 },
    /// Page number above `PAGES - 1`
    InvalidPage(u8),
    /// Zero width, height or border
    ZeroSize,
}

/// Set of pages touched by a drawing call, one bit per page.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DirtyPages(u8);

impl DirtyPages {
    pub const fn none() -> Self {
        DirtyPages(0)
    }

    pub const fn all() -> Self {
        DirtyPages(0xFF)
    }

    pub const fn page(page: u8) -> Self {
        DirtyPages(1 << (page & 0x07))
    }

    pub fn mark(&mut self, page: u8) {
        self.0 |= 1 << (page & 0x07);
    }

    pub fn contains(self, page: u8) -> bool {
        page < PAGES as u8 && self.0 & (1 << page) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Dirty page numbers in ascending order
    pub fn iter(self) -> impl Iterator<Item = u8> {
        (0..PAGES as u8).filter(move |&page| self.contains(page))
    }
}

impl BitOr for DirtyPages {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        DirtyPages(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirtyPages {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// How [`Framebuffer::rect`] fills a rectangle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RectStyle {
    /// Border of the given thickness, growing inwards
    Outline(u8),
    Filled,
}

pub struct Framebuffer {
    pages: [[u8; WIDTH]; PAGES],
}

impl Default for Framebuffer {
    fn default() -> Self {
        Framebuffer::new()
    }
}

impl Framebuffer {
    pub const fn new() -> Self {
        Framebuffer {
            pages: [[0; WIDTH]; PAGES],
        }
    }

    /// One page as it is sent to the display.
    pub fn page(&self, page: u8) -> Result<&[u8; WIDTH], DrawError> {
        self.pages
            .get(usize::from(page))
            .ok_or(DrawError::InvalidPage(page))
    }

    pub fn pages(&self) -> &[[u8; WIDTH]; PAGES] {
        &self.pages
    }

    pub fn pixel(&self, x: u8, y: u8) -> Result<bool, DrawError> {
        check(x, y)?;
        let (page, bit) = split(y);
        Ok(self.pages[page][usize::from(x)] & (1 << bit) != 0)
    }

    /// Turn one pixel on or off.
    ///
    /// The returned mask is empty when the pixel already had that state.
    pub fn set_pixel(&mut self, x: u8, y: u8, on: bool) -> Result<DirtyPages, DrawError> {
        check(x, y)?;
        if self.put(x, y, on) {
            Ok(DirtyPages::page(y / 8))
        } else {
            Ok(DirtyPages::none())
        }
    }

    /// Horizontal line on row `y` covering `x0..=x1` in either order.
    pub fn hline(&mut self, x0: u8, x1: u8, y: u8) -> Result<DirtyPages, DrawError> {
        check(x0, y)?;
        check(x1, y)?;
        for x in x0.min(x1)..=x0.max(x1) {
            self.put(x, y, true);
        }
        Ok(DirtyPages::page(y / 8))
    }

    /// Vertical line on column `x` covering `y0..=y1` in either order.
    pub fn vline(&mut self, x: u8, y0: u8, y1: u8) -> Result<DirtyPages, DrawError> {
        check(x, y0)?;
        check(x, y1)?;
        let mut dirty = DirtyPages::none();
        for y in y0.min(y1)..=y0.max(y1) {
            self.put(x, y, true);
            dirty.mark(y / 8);
        }
        Ok(dirty)
    }

    /// One pixel wide line between two points, end points included.
    pub fn line(&mut self, x0: u8, y0: u8, x1: u8, y1: u8) -> Result<DirtyPages, DrawError> {
        check(x0, y0)?;
        check(x1, y1)?;
        if x0 == x1 {
            return self.vline(x0, y0, y1);
        }
        if y0 == y1 {
            return self.hline(x0, x1, y0);
        }

        // Bresenham, all octants
        let (mut x, mut y) = (i16::from(x0), i16::from(y0));
        let (x1, y1) = (i16::from(x1), i16::from(y1));
        let dx = (x1 - x).abs();
        let dy = -(y1 - y).abs();
        let sx = if x < x1 { 1 } else { -1 };
        let sy = if y < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let mut dirty = DirtyPages::none();

        loop {
            // stays within the checked end points
            self.put(x as u8, y as u8, true);
            dirty.mark(y as u8 / 8);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
        Ok(dirty)
    }

    /// Rectangle with its top left corner at `(x, y)`.
    ///
    /// An outline at least half as thick as the rectangle is drawn filled.
    pub fn rect(&mut self, x: u8, y: u8, width: u8, height: u8, style: RectStyle) -> Result<DirtyPages, DrawError> {
        if width == 0 || height == 0 || style == RectStyle::Outline(0) {
            return Err(DrawError::ZeroSize);
        }
        check(x, y)?;
        let right = corner(x, width, WIDTH).ok_or(DrawError::OutOfBounds { x, y })?;
        let bottom = corner(y, height, HEIGHT).ok_or(DrawError::OutOfBounds { x, y })?;

        let border = match style {
            RectStyle::Outline(t) if u16::from(t) * 2 < u16::from(width.min(height)) => Some(t),
            _ => None,
        };

        let mut dirty = DirtyPages::none();
        let Some(thickness) = border else {
            for row in y..=bottom {
                dirty |= self.hline(x, right, row)?;
            }
            return Ok(dirty);
        };

        for t in 0..thickness {
            dirty |= self.hline(x, right, y + t)?;
            dirty |= self.hline(x, right, bottom - t)?;
            dirty |= self.vline(x + t, y, bottom)?;
            dirty |= self.vline(right - t, y, bottom)?;
        }
        Ok(dirty)
    }

    /// Blank the whole buffer.
    pub fn clear(&mut self) -> DirtyPages {
        self.pages = [[0; WIDTH]; PAGES];
        DirtyPages::all()
    }

    pub fn clear_page(&mut self, page: u8) -> Result<DirtyPages, DrawError> {
        let slice = self
            .pages
            .get_mut(usize::from(page))
            .ok_or(DrawError::InvalidPage(page))?;
        *slice = [0; WIDTH];
        Ok(DirtyPages::page(page))
    }

    /// Set or clear a checked pixel, returning whether it changed
    fn put(&mut self, x: u8, y: u8, on: bool) -> bool {
        let (page, bit) = split(y);
        let byte = &mut self.pages[page][usize::from(x)];
        let mask = 1 << bit;
        if (*byte & mask != 0) == on {
            return false;
        }
        if on {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
        true
    }
}

fn check(x: u8, y: u8) -> Result<(), DrawError> {
    if usize::from(x) >= WIDTH || usize::from(y) >= HEIGHT {
        return Err(DrawError::OutOfBounds { x, y });
    }
    Ok(())
}

fn split(y: u8) -> (usize, u8) {
    (usize::from(y / 8), y % 8)
}

/// Last coordinate covered by `len` pixels from `start`, if on screen
fn corner(start: u8, len: u8, limit: usize) -> Option<u8> {
    let end = usize::from(start) + usize::from(len) - 1;
    if end < limit {
        u8::try_from(end).ok()
    } else {
        None
    }
}
