//! Framebuffer and scan driver for HUB12 monochrome LED matrix panels.
//!
//! ## How HUB12 LED Displays Work
//!
//! HUB12 panels (the common red/green/white "P10" boards) are 32 × 16 pixel
//! monochrome tiles built from shift registers and row drivers. Like their
//! HUB75 cousins they are scanned, time-multiplexed displays: nothing stays
//! lit unless the controller keeps streaming data into them.
//!
//! ### Signal names
//! - **R / DATA** – Serial pixel data, active LOW (a LOW bit lights the LED)
//! - **CLK** – Shift-register clock; every rising edge shifts one bit along the chain
//! - **LAT / SCLK** – Latch; copies the shift registers to the LED drivers
//! - **OE** – Output-Enable: LEDs are lit while OE is HIGH and blanked when it is LOW
//! - **A B** – Row-address select lines choosing one of four scan rows
//! - **GND**
//!
//! ### 1/4 scan
//! Each panel lights one of four scan rows at a time; scan row `r` lights
//! pixel rows `r`, `r + 4`, `r + 8` and `r + 12`. The 128 pixels of one scan
//! row are shifted in as 16 bytes whose bit order follows the board's
//! shift-register routing, not the pixel grid (see [`wiring`]). Panels are
//! daisy chained, so for every scan row the controller shifts 16 bytes per
//! panel in chain order.
//!
//! One scan row is driven as:
//! 1. blank the LEDs (OE LOW)
//! 2. select the scan row on A/B
//! 3. shift the row's bytes MSB first
//! 4. pulse LAT
//! 5. light the row (OE HIGH) and hold it for the dwell time
//!
//! The dwell time sets brightness and current draw, and four dwell times plus
//! the shifting overhead make up one frame.
//!
//! ## Pipeline
//!
//! Drawing goes into a packed 1-bit [`surface::PixelSurface`]. When it
//! changed, [`scan::build_scan`] derives the byte stream for the whole chain
//! ([`tiling`] places each pixel on a panel, [`wiring`] inside the panel)
//! into a spare [`scan::ScanFrame`] and publishes it through a
//! [`scan::ScanExchange`]. The [`refresh::RefreshEngine`] drives whatever
//! frame is published, either when the application calls
//! [`Hub12Display::refresh`] or from the background runner
//! [`Hub12Shared::run`] driven by [`auto_refresh`].
//!
//! A refresh pass holds its frame for the whole pass, and a frame still held
//! is never rebuilt, so a pass never shows half of one frame and half of the
//! next. A rebuild that has to wait for a pass is staged and finished by the
//! refresh side once the pass lets go of the frame.
//!
//! ## Multiple Panels
//! A [`Hub12Config`] with `panels_x × panels_y` panels draws as one
//! `32·panels_x × 16·panels_y` display. The chain order is either
//! [`tiling::ChainOrder::RowMajor`] or [`tiling::ChainOrder::Serpentine`].
//!
//! ## Available Feature Flags
//!
//! ### `defmt` Feature
//! Implements `defmt::Format` for the driver types and logs lifecycle events
//! (start/stop, auto-refresh period changes, deferred publishes, allocation
//! failures) with `defmt`.
//!
//! ```toml
//! [dependencies]
//! hub12-framebuffer = { version = "0.1.0", features = ["defmt"] }
//! ```
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

extern crate alloc;

use embedded_graphics::pixelcolor::BinaryColor;

pub mod auto_refresh;
pub mod display;
mod error;
pub mod refresh;
pub mod scan;
pub mod surface;
#[cfg(test)]
mod testing;
pub mod tiling;
pub mod wiring;

pub use auto_refresh::{AutoRefresh, AUTO_REFRESH_MARGIN_US, DEFAULT_AUTO_REFRESH_PERIOD_US};
pub use display::{Hub12Config, Hub12Display, Hub12Shared, DEFAULT_ON_TIME_US};
pub use error::{Error, Result};
pub use scan::Publish;
pub use tiling::ChainOrder;

/// Color type used by the display: a pixel is either lit or not.
pub type Color = BinaryColor;

/// Width of one panel in pixels.
pub const PANEL_WIDTH: usize = 32;

/// Height of one panel in pixels.
pub const PANEL_HEIGHT: usize = 16;

/// Scan rows of a 1/4 scan panel.
pub const SCAN_ROWS: usize = 4;

/// Bytes shifted into one panel per scan row.
pub const PANEL_BYTES: usize = PANEL_WIDTH * PANEL_HEIGHT / SCAN_ROWS / 8;

/// Computes the bytes needed for a packed 1-bit surface
///
/// # Arguments
///
/// * `width` - Width in pixels
/// * `height` - Height in pixels
///
/// # Returns
///
/// `width * height` bits rounded up to whole bytes
#[must_use]
pub const fn compute_surface_bytes(width: usize, height: usize) -> usize {
    (width * height).div_ceil(8)
}

/// Computes the bytes shifted out for one scan row of a chain
///
/// # Arguments
///
/// * `panel_count` - Number of panels on the chain
#[must_use]
pub const fn compute_bytes_per_row(panel_count: usize) -> usize {
    panel_count * PANEL_BYTES
}

/// Computes the size of a complete scan frame for a chain
///
/// # Arguments
///
/// * `panel_count` - Number of panels on the chain
#[must_use]
pub const fn compute_scan_bytes(panel_count: usize) -> usize {
    compute_bytes_per_row(panel_count) * SCAN_ROWS
}
