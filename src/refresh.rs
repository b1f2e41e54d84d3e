//! Bit-serial refresh of a HUB12 panel chain.
//!
//! One call to [`RefreshEngine::refresh_frame`] drives a full frame: for each
//! of the four scan rows it blanks the output, selects the row on the A/B
//! address lines, clocks the row segment into the chain MSB first, latches
//! it, lights the row and holds it for the configured dwell time.
//!
//! ```text
//!  OE   ‾‾|________________________________|‾‾‾‾‾ dwell ‾‾‾‾‾|____
//!  A/B  ==X row n =====================================================
//!  CLK  ____|‾|_|‾|_|‾| ... |‾|___________________________________
//!  DATA ====X b0 X b1 X ... X bN ===================================
//!  LAT  ______________________|‾|____________________________________
//! ```
//!
//! The engine never allocates; its only wait is the dwell delay.

use bitfield::bitfield;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, PinState};

use crate::scan::ScanFrame;
use crate::{Error, Result, SCAN_ROWS};

bitfield! {
    /// Levels for the row address lines.
    ///
    /// - Bit 1: B
    /// - Bit 0: A
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct RowSelect(u8);
    impl Debug;
    pub b, set_b: 1;
    pub a, set_a: 0;
}

impl RowSelect {
    /// Address lines for scan row `row` (`0..4`).
    #[must_use]
    pub const fn new(row: usize) -> Self {
        Self((row & 0b11) as u8)
    }

    /// The scan row these lines select.
    #[must_use]
    pub const fn row(&self) -> usize {
        self.0 as usize
    }
}

/// The six output lines of a HUB12 connector.
///
/// Usually a tuple `(oe, a, b, clk, lat, data)` of
/// [`OutputPin`](embedded_hal::digital::OutputPin)s is the right choice.
pub trait Outputs {
    /// Output enable.
    type Oe: OutputPin;
    /// Row address bit 0.
    type A: OutputPin;
    /// Row address bit 1.
    type B: OutputPin;
    /// Shift clock.
    type Clk: OutputPin;
    /// Latch strobe.
    type Lat: OutputPin;
    /// Serial data.
    type Data: OutputPin;
    /// Output enable pin.
    fn oe(&mut self) -> &mut Self::Oe;
    /// Row address bit 0 pin.
    fn a(&mut self) -> &mut Self::A;
    /// Row address bit 1 pin.
    fn b(&mut self) -> &mut Self::B;
    /// Shift clock pin.
    fn clk(&mut self) -> &mut Self::Clk;
    /// Latch pin.
    fn lat(&mut self) -> &mut Self::Lat;
    /// Serial data pin.
    fn data(&mut self) -> &mut Self::Data;
}

impl<OE, A, B, CLK, LAT, DATA> Outputs for (OE, A, B, CLK, LAT, DATA)
where
    OE: OutputPin,
    A: OutputPin,
    B: OutputPin,
    CLK: OutputPin,
    LAT: OutputPin,
    DATA: OutputPin,
{
    type Oe = OE;
    type A = A;
    type B = B;
    type Clk = CLK;
    type Lat = LAT;
    type Data = DATA;
    fn oe(&mut self) -> &mut OE {
        &mut self.0
    }
    fn a(&mut self) -> &mut A {
        &mut self.1
    }
    fn b(&mut self) -> &mut B {
        &mut self.2
    }
    fn clk(&mut self) -> &mut CLK {
        &mut self.3
    }
    fn lat(&mut self) -> &mut LAT {
        &mut self.4
    }
    fn data(&mut self) -> &mut DATA {
        &mut self.5
    }
}

#[inline]
fn drive<P: OutputPin>(pin: &mut P, high: bool) -> Result<()> {
    pin.set_state(PinState::from(high)).map_err(|_| Error::OutputPin)
}

#[inline]
fn pulse<P: OutputPin>(pin: &mut P) -> Result<()> {
    pin.set_high().map_err(|_| Error::OutputPin)?;
    pin.set_low().map_err(|_| Error::OutputPin)
}

/// Drives frames out of the panel connector.
///
/// Line levels used by these panels:
/// - OE LOW blanks the LEDs, HIGH lights the selected row
/// - DATA is active low: LOW lights the LED
/// - CLK and LAT idle LOW and are pulsed HIGH
pub struct RefreshEngine<PINS, DELAY> {
    pins: PINS,
    delay: DELAY,
    frames: u32,
}

impl<PINS: Outputs, DELAY: DelayNs> RefreshEngine<PINS, DELAY> {
    /// Create an engine driving `pins`, waiting with `delay`.
    pub const fn new(pins: PINS, delay: DELAY) -> Self {
        Self {
            pins,
            delay,
            frames: 0,
        }
    }

    /// Put the lines in their idle state with the output blanked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputPin`] if a line cannot be driven.
    pub fn init(&mut self) -> Result<()> {
        drive(self.pins.clk(), false)?;
        drive(self.pins.lat(), false)?;
        self.blank()
    }

    /// Turn the LEDs off.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputPin`] if the output enable line cannot be driven.
    pub fn blank(&mut self) -> Result<()> {
        drive(self.pins.oe(), false)
    }

    /// Drive one full frame: every scan row in turn, each held lit for
    /// `on_time_us`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputPin`] if a line cannot be driven.
    pub fn refresh_frame(&mut self, frame: &ScanFrame, on_time_us: u32) -> Result<()> {
        for row in 0..SCAN_ROWS {
            self.scan_row(frame, row, on_time_us)?;
        }
        self.frames = self.frames.wrapping_add(1);
        Ok(())
    }

    /// Drive a single scan row of `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputPin`] if a line cannot be driven.
    pub fn scan_row(&mut self, frame: &ScanFrame, row: usize, on_time_us: u32) -> Result<()> {
        self.blank()?;
        self.select_row(RowSelect::new(row))?;
        for &byte in frame.row(row) {
            self.shift_byte(byte)?;
        }
        pulse(self.pins.lat())?;
        drive(self.pins.oe(), true)?;
        self.delay.delay_us(on_time_us);
        Ok(())
    }

    /// Number of complete frames driven so far.
    #[must_use]
    pub const fn frames(&self) -> u32 {
        self.frames
    }

    /// Give the pins and delay back.
    pub fn release(self) -> (PINS, DELAY) {
        (self.pins, self.delay)
    }

    fn select_row(&mut self, select: RowSelect) -> Result<()> {
        drive(self.pins.a(), select.a())?;
        drive(self.pins.b(), select.b())
    }

    fn shift_byte(&mut self, byte: u8) -> Result<()> {
        for bit in (0..8).rev() {
            let on = (byte >> bit) & 1 != 0;
            // active low
            drive(self.pins.data(), !on)?;
            pulse(self.pins.clk())?;
        }
        Ok(())
    }
}

impl<PINS, DELAY> core::fmt::Debug for RefreshEngine<PINS, DELAY> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RefreshEngine")
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "defmt")]
impl<PINS, DELAY> defmt::Format for RefreshEngine<PINS, DELAY> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "RefreshEngine frames: {}", self.frames);
    }
}
