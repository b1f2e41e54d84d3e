//! For tiling multiple panels together into one display.
//!
//! Panels form a `panels_x × panels_y` grid on screen, but on the wire they
//! are one chain: every scan row shifts the data for panel 0 first and the
//! last panel of the chain last. [`ChainTopology`] translates a global pixel
//! coordinate into the panel's position in that chain plus the coordinate
//! inside the panel.
//!
//! Supported chain orders:
//! - [`ChainOrder::RowMajor`]: every row of panels runs left to right.
//! - [`ChainOrder::Serpentine`]: even rows run left to right, odd rows run
//!   right to left with each of their panels mounted mirrored, the usual way
//!   to cable a 3 × 2 arrangement with short jumpers.

use crate::{PANEL_HEIGHT, PANEL_WIDTH};

/// How panels are ordered along the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChainOrder {
    /// Panel index = `row * panels_x + col` for every row.
    RowMajor,
    /// Odd panel rows are traversed right to left with local X mirrored.
    #[default]
    Serpentine,
}

/// A pixel's position along the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChainAddress {
    /// Index of the panel along the chain.
    pub panel: usize,
    /// Column inside the panel, `0..PANEL_WIDTH`.
    pub x: usize,
    /// Row inside the panel, `0..PANEL_HEIGHT`.
    pub y: usize,
}

/// Layout of a grid of panels and the order they are chained in.
///
/// # Example
/// ```rust
/// use hub12_framebuffer::tiling::{ChainAddress, ChainOrder, ChainTopology};
///
/// // 3 panels wide, 2 high, second row cabled back towards the left
/// let chain = ChainTopology::new(3, 2, ChainOrder::Serpentine);
/// assert_eq!((chain.width(), chain.height()), (96, 32));
///
/// // bottom-left pixel sits on the last panel of the chain, mirrored
/// assert_eq!(
///     chain.map_global(0, 16),
///     Some(ChainAddress { panel: 5, x: 31, y: 0 })
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChainTopology {
    panels_x: usize,
    panels_y: usize,
    order: ChainOrder,
}

impl ChainTopology {
    /// Describe a `panels_x × panels_y` grid chained in `order`.
    #[must_use]
    pub const fn new(panels_x: usize, panels_y: usize, order: ChainOrder) -> Self {
        Self {
            panels_x,
            panels_y,
            order,
        }
    }

    /// Panels per row.
    #[must_use]
    pub const fn panels_x(&self) -> usize {
        self.panels_x
    }

    /// Rows of panels.
    #[must_use]
    pub const fn panels_y(&self) -> usize {
        self.panels_y
    }

    /// Chain order.
    #[must_use]
    pub const fn order(&self) -> ChainOrder {
        self.order
    }

    /// Number of panels on the chain.
    #[must_use]
    pub const fn panel_count(&self) -> usize {
        self.panels_x * self.panels_y
    }

    /// Display width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.panels_x * PANEL_WIDTH
    }

    /// Display height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.panels_y * PANEL_HEIGHT
    }

    /// Map a global pixel to its chain address.
    ///
    /// Returns `None` for coordinates outside the display.
    #[must_use]
    pub const fn map_global(&self, gx: usize, gy: usize) -> Option<ChainAddress> {
        if gx >= self.width() || gy >= self.height() {
            return None;
        }
        let col = gx / PANEL_WIDTH;
        let row = gy / PANEL_HEIGHT;
        let x = gx % PANEL_WIDTH;
        let y = gy % PANEL_HEIGHT;

        let mirrored = matches!(self.order, ChainOrder::Serpentine) && row % 2 == 1;
        if mirrored {
            Some(ChainAddress {
                panel: row * self.panels_x + (self.panels_x - 1 - col),
                x: PANEL_WIDTH - 1 - x,
                y,
            })
        } else {
            Some(ChainAddress {
                panel: row * self.panels_x + col,
                x,
                y,
            })
        }
    }

    /// Map a chain address back to the global pixel it came from.
    ///
    /// Returns `None` if the address does not belong to this chain.
    #[must_use]
    pub const fn to_global(&self, address: ChainAddress) -> Option<(usize, usize)> {
        if address.panel >= self.panel_count()
            || address.x >= PANEL_WIDTH
            || address.y >= PANEL_HEIGHT
        {
            return None;
        }
        let row = address.panel / self.panels_x;
        let slot = address.panel % self.panels_x;

        let mirrored = matches!(self.order, ChainOrder::Serpentine) && row % 2 == 1;
        let (col, x) = if mirrored {
            (self.panels_x - 1 - slot, PANEL_WIDTH - 1 - address.x)
        } else {
            (slot, address.x)
        };
        Some((col * PANEL_WIDTH + x, row * PANEL_HEIGHT + address.y))
    }
}

impl Default for ChainTopology {
    fn default() -> Self {
        Self::new(1, 1, ChainOrder::default())
    }
}
