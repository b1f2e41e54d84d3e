//! Packed 1-bit pixel surfaces.
//!
//! A [`PixelSurface`] stores `width × height` pixels, one bit each, in
//! row-major order: pixel `(x, y)` lives at bit index `y * width + x`, packed
//! eight pixels per byte with bit 0 holding the lowest `x` of the byte.
//!
//! [`SurfacePair`] owns one or two surfaces and tracks which one is *front*
//! (read by pixel queries and by the scan builder) and which one is *back*
//! (the drawing target). With double buffering disabled both roles are served
//! by the same surface.

use alloc::vec::Vec;

use crate::{compute_surface_bytes, Error, Result};

/// A packed 1-bit-per-pixel bitmap.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelSurface {
    width: usize,
    height: usize,
    bits: Vec<u8>,
}

impl PixelSurface {
    /// Allocate a cleared surface.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the backing storage cannot be allocated.
    pub fn try_new(width: usize, height: usize) -> Result<Self> {
        let len = compute_surface_bytes(width, height);
        let mut bits = Vec::new();
        bits.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
        bits.resize(len, 0);
        Ok(Self {
            width,
            height,
            bits,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Read a pixel. Out-of-bounds coordinates read as off.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let idx = y * self.width + x;
        (self.bits[idx >> 3] >> (idx & 7)) & 1 != 0
    }

    /// Write a pixel. Out-of-bounds coordinates are ignored.
    ///
    /// Returns `true` if the write landed on the surface.
    pub fn set(&mut self, x: usize, y: usize, on: bool) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let idx = y * self.width + x;
        let mask = 1u8 << (idx & 7);
        if on {
            self.bits[idx >> 3] |= mask;
        } else {
            self.bits[idx >> 3] &= !mask;
        }
        true
    }

    /// Turn every pixel off.
    pub fn clear(&mut self) {
        self.bits.fill(0);
    }

    /// Set every pixel to `on`.
    pub fn fill(&mut self, on: bool) {
        if !on {
            self.clear();
            return;
        }
        self.bits.fill(0xff);
        // keep the padding bits past the last pixel clear
        let used = self.width * self.height;
        if used & 7 != 0 {
            if let Some(last) = self.bits.last_mut() {
                *last &= (1u8 << (used & 7)) - 1;
            }
        }
    }

    /// Copy the contents of a surface with the same dimensions.
    pub fn copy_from(&mut self, other: &PixelSurface) {
        debug_assert_eq!(self.bits.len(), other.bits.len());
        self.bits.copy_from_slice(&other.bits);
    }

    /// The packed pixel bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Iterate the coordinates of every lit pixel in row-major order.
    ///
    /// All-dark bytes are skipped eight pixels at a time.
    pub fn lit_pixels(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let width = self.width;
        let total = self.width * self.height;
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, byte)| **byte != 0)
            .flat_map(move |(index, byte)| {
                let byte = *byte;
                (0..8)
                    .filter(move |bit| (byte >> bit) & 1 != 0)
                    .map(move |bit| index * 8 + bit)
            })
            .filter(move |idx| *idx < total)
            .map(move |idx| (idx % width, idx / width))
    }
}

impl core::fmt::Debug for PixelSurface {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PixelSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("size", &self.bits.len())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PixelSurface {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "PixelSurface {}x{} size: {}",
            self.width,
            self.height,
            self.bits.len()
        );
    }
}

/// Inclusive clipping rectangle in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClipRect {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl ClipRect {
    /// Build a clip rectangle from `x, y, w, h`, clamped to a
    /// `width × height` display.
    ///
    /// Returns `None` for an empty size or a rectangle that lies entirely
    /// off the display; callers treat that as "no clipping".
    #[must_use]
    pub fn new(x: i32, y: i32, w: i32, h: i32, width: usize, height: usize) -> Option<Self> {
        if w <= 0 || h <= 0 || width == 0 || height == 0 {
            return None;
        }
        let x1 = i64::from(x) + i64::from(w) - 1;
        let y1 = i64::from(y) + i64::from(h) - 1;
        let x0 = i64::from(x).max(0);
        let y0 = i64::from(y).max(0);
        let x1 = x1.min(width as i64 - 1);
        let y1 = y1.min(height as i64 - 1);
        if x0 > x1 || y0 > y1 {
            return None;
        }
        Some(Self {
            x0: x0 as usize,
            y0: y0 as usize,
            x1: x1 as usize,
            y1: y1 as usize,
        })
    }

    /// Whether `(x, y)` lies inside the rectangle.
    #[must_use]
    pub const fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Top-left corner, inclusive.
    #[must_use]
    pub const fn top_left(&self) -> (usize, usize) {
        (self.x0, self.y0)
    }

    /// Bottom-right corner, inclusive.
    #[must_use]
    pub const fn bottom_right(&self) -> (usize, usize) {
        (self.x1, self.y1)
    }
}

/// Front/back drawing surfaces.
///
/// Holds one surface when single-buffered (front and back are the same
/// block) or two when double-buffered. Which block is front is only ever
/// changed by reassigning an index, never by rewriting a block in place.
#[derive(Debug)]
pub struct SurfacePair {
    blocks: Vec<PixelSurface>,
    front: usize,
    back: usize,
}

impl SurfacePair {
    /// Allocate the surfaces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if any block cannot be allocated. Blocks
    /// that were already allocated are released before returning.
    pub fn try_new(width: usize, height: usize, double_buffer: bool) -> Result<Self> {
        let count = if double_buffer { 2 } else { 1 };
        let mut blocks = Vec::new();
        blocks
            .try_reserve_exact(count)
            .map_err(|_| Error::OutOfMemory)?;
        for _ in 0..count {
            blocks.push(PixelSurface::try_new(width, height)?);
        }
        Ok(Self {
            blocks,
            front: 0,
            back: count - 1,
        })
    }

    /// Whether front and back are separate blocks.
    #[must_use]
    pub const fn is_double(&self) -> bool {
        self.front != self.back
    }

    /// The surface being displayed.
    #[must_use]
    pub fn front(&self) -> &PixelSurface {
        &self.blocks[self.front]
    }

    /// The surface being drawn.
    #[must_use]
    pub fn back(&self) -> &PixelSurface {
        &self.blocks[self.back]
    }

    /// Mutable access to the surface being drawn.
    pub fn back_mut(&mut self) -> &mut PixelSurface {
        &mut self.blocks[self.back]
    }

    /// Exchange front and back. Optionally seed the new back with the new
    /// front's contents. Does nothing when single-buffered.
    pub fn swap(&mut self, copy_front_to_back: bool) {
        if !self.is_double() {
            return;
        }
        core::mem::swap(&mut self.front, &mut self.back);
        if copy_front_to_back {
            let (front, back) = self.split();
            back.copy_from(front);
        }
    }

    /// Switch to double buffering with a freshly cleared back surface. The
    /// front surface keeps what is on screen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the second surface cannot be
    /// allocated; the pair stays single-buffered.
    pub fn enable_double(&mut self) -> Result<()> {
        if self.is_double() {
            return Ok(());
        }
        let front = self.front();
        let surface = PixelSurface::try_new(front.width(), front.height())?;
        self.blocks
            .try_reserve_exact(1)
            .map_err(|_| Error::OutOfMemory)?;
        self.blocks.push(surface);
        self.back = self.blocks.len() - 1;
        Ok(())
    }

    /// Switch to single buffering. The front surface becomes the only
    /// surface and the other block is released.
    pub fn disable_double(&mut self) {
        if !self.is_double() {
            return;
        }
        let front = self.blocks.swap_remove(self.front);
        self.blocks.clear();
        self.blocks.push(front);
        self.front = 0;
        self.back = 0;
    }

    fn split(&mut self) -> (&PixelSurface, &mut PixelSurface) {
        let (low, high) = self.blocks.split_at_mut(1);
        if self.front == 0 {
            (&low[0], &mut high[0])
        } else {
            (&high[0], &mut low[0])
        }
    }
}
