//! Intra-panel wiring: where a panel's shift registers expect each pixel.
//!
//! A 32 × 16 single-data-line panel is scanned 1/4: each of the four scan
//! rows lights every fourth pixel row, and the 128 pixels lit together are
//! shifted in as one 128-bit pattern. The order of those 128 bits follows the
//! board's shift-register routing rather than the pixel grid, so each panel
//! model needs a [`PanelWiring`] describing it.

use bitfield::bitfield;

use crate::{PANEL_HEIGHT, PANEL_WIDTH};

bitfield! {
    /// Position of one pixel inside a panel's 128-bit scan pattern.
    ///
    /// The pattern is four 32-bit groups, each made of four 8-bit sub-blocks:
    /// - Bits 6-5: group (which 8-pixel column slice)
    /// - Bits 4-3: sub-block (which 4-row band)
    /// - Bits 2-0: column inside the slice
    ///
    /// Read as bytes, bits 6-3 are the byte inside the panel's 16-byte
    /// pattern and bits 2-0 the bit inside that byte, counted from the LSB.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct BitPosition(u8);
    impl Debug;
    pub group, set_group: 6, 5;
    pub sub_block, set_sub_block: 4, 3;
    pub column, set_column: 2, 0;
    pub byte_in_panel, _: 6, 3;
    pub bit_in_byte, _: 2, 0;
}

impl BitPosition {
    /// Position from a raw bit index in `0..128`.
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index & 0x7f)
    }

    /// The raw bit index in `0..128`.
    #[must_use]
    pub const fn index(&self) -> u8 {
        self.0
    }

    /// Mask selecting this pixel inside its byte when bytes are shifted out
    /// MSB first.
    #[must_use]
    pub fn msb_first_mask(&self) -> u8 {
        0x80 >> self.bit_in_byte()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BitPosition {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "BitPosition({}: group {} sub {} col {})",
            self.0,
            self.group(),
            self.sub_block(),
            self.column()
        );
    }
}

/// Maps a panel-local pixel to its position in the panel's scan pattern.
pub trait PanelWiring {
    /// Position of local pixel `(x, y)`, with `x < 32` and `y < 16`.
    fn bit_position(x: usize, y: usize) -> BitPosition;

    /// Scan row that lights local row `y`.
    #[inline]
    #[must_use]
    fn scan_row(y: usize) -> usize {
        y & 3
    }

    /// Raw bit index of local pixel `(x, y)` in `0..128`.
    #[inline]
    #[must_use]
    fn bit_index(x: usize, y: usize) -> u8 {
        Self::bit_position(x, y).index()
    }
}

/// Wiring of the common 32 × 16 1/4-scan single-data (P10 style) panel.
///
/// The band-to-sub-block order was measured by sweeping single bits through
/// the chain: rows 12-15 land in sub-block 0, rows 8-11 in 1, rows 4-7 in 2
/// and rows 0-3 in 3. It is a calibrated constant, not derived from a
/// schematic, so any change needs a new sweep on real hardware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OneDataWiring;

impl PanelWiring for OneDataWiring {
    fn bit_position(x: usize, y: usize) -> BitPosition {
        debug_assert!(x < PANEL_WIDTH && y < PANEL_HEIGHT);
        let band = y & 12;
        let sub_block = match band {
            12 => 0,
            8 => 1,
            4 => 2,
            _ => 3,
        };
        let mut position = BitPosition::default();
        position.set_group(((x >> 3) & 3) as u8);
        position.set_sub_block(sub_block);
        position.set_column((x & 7) as u8);
        position
    }
}
