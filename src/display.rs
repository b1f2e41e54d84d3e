//! The display: drawing surfaces, scan publishing and the refresh runner.
//!
//! A display is split in two halves:
//! - [`Hub12Display`] is owned by the application. It draws into the pixel
//!   surface, rebuilds the scan frame when something changed and controls
//!   brightness, double buffering and auto-refresh.
//! - [`Hub12Shared`] holds what the refresh side needs: the published scan
//!   frame, the refresh engine and the auto-refresh state. It is usually a
//!   `static`, with [`Hub12Shared::run`] spawned as a task of the
//!   application's executor.
//!
//! ```rust,ignore
//! static SHARED: Hub12Shared<Pins, Delay> = Hub12Shared::new();
//!
//! #[embassy_executor::task]
//! async fn refresh_task() {
//!     SHARED.run().await;
//! }
//!
//! let config = Hub12Config::new(2, 1, ChainOrder::RowMajor);
//! let mut display = Hub12Display::new(&SHARED, pins, delay, config)?;
//! display.begin()?;
//! spawner.spawn(refresh_task())?;
//! display.start_auto_refresh(DEFAULT_AUTO_REFRESH_PERIOD_US)?;
//!
//! Text::new("HELLO", Point::new(1, 10), style).draw(&mut display)?;
//! display.update()?;
//! ```

use core::convert::Infallible;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Point, Size};
use embedded_graphics::Pixel;
use embedded_hal::delay::DelayNs;

use crate::auto_refresh::AutoRefresh;
use crate::refresh::{Outputs, RefreshEngine};
use crate::scan::{Publish, ScanBuilder, ScanExchange, ScanHandoff};
use crate::surface::{ClipRect, SurfacePair};
use crate::tiling::{ChainOrder, ChainTopology};
use crate::wiring::{OneDataWiring, PanelWiring};
use crate::{Color, Error, Result};

/// Dwell time per scan row used unless configured otherwise.
pub const DEFAULT_ON_TIME_US: u32 = 800;

/// Construction parameters of a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hub12Config {
    /// Panels per row.
    pub panels_x: usize,
    /// Rows of panels.
    pub panels_y: usize,
    /// How the panels are chained.
    pub chain: ChainOrder,
    /// Dwell time per scan row in microseconds.
    pub on_time_us: u32,
    /// Draw into a back surface that only becomes visible on `update()`.
    pub double_buffer: bool,
}

impl Hub12Config {
    /// `panels_x × panels_y` panels chained in `chain`, default dwell time,
    /// single buffered.
    #[must_use]
    pub const fn new(panels_x: usize, panels_y: usize, chain: ChainOrder) -> Self {
        Self {
            panels_x,
            panels_y,
            chain,
            on_time_us: DEFAULT_ON_TIME_US,
            double_buffer: false,
        }
    }

    /// Same configuration with another dwell time.
    #[must_use]
    pub const fn with_on_time_us(mut self, on_time_us: u32) -> Self {
        self.on_time_us = on_time_us;
        self
    }

    /// Same configuration with double buffering switched.
    #[must_use]
    pub const fn with_double_buffer(mut self, double_buffer: bool) -> Self {
        self.double_buffer = double_buffer;
        self
    }
}

impl Default for Hub12Config {
    fn default() -> Self {
        Self::new(1, 1, ChainOrder::Serpentine)
    }
}

/// State shared between a [`Hub12Display`] and its refresh runner.
pub struct Hub12Shared<PINS, DELAY> {
    exchange: ScanExchange,
    handoff: ScanHandoff,
    engine: Mutex<CriticalSectionRawMutex, Option<RefreshEngine<PINS, DELAY>>>,
    auto: AutoRefresh,
    on_time_us: AtomicU32,
}

impl<PINS, DELAY> Hub12Shared<PINS, DELAY> {
    /// Empty shared state; usable in a `static`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            exchange: ScanExchange::new(),
            handoff: ScanHandoff::new(),
            engine: Mutex::new(None),
            auto: AutoRefresh::new(),
            on_time_us: AtomicU32::new(DEFAULT_ON_TIME_US),
        }
    }

    /// The published scan frame.
    #[must_use]
    pub fn exchange(&self) -> &ScanExchange {
        &self.exchange
    }

    /// The auto-refresh scheduler, for applications that drive
    /// [`AutoRefresh::run_timer`] and [`Hub12Shared::service_wake`] from
    /// their own tasks instead of [`Hub12Shared::run`].
    #[must_use]
    pub fn auto_refresh(&self) -> &AutoRefresh {
        &self.auto
    }

    fn on_time_us(&self) -> u32 {
        self.on_time_us.load(Ordering::Relaxed)
    }
}

impl<PINS: Outputs, DELAY: DelayNs> Hub12Shared<PINS, DELAY> {
    /// The background refresh runner. Never returns.
    ///
    /// Attaches itself so auto-refresh can be started, then runs the period
    /// timer and the refresh loop side by side. While auto-refresh is
    /// stopped both idle. Dropping the future detaches the runner again,
    /// which also stops auto-refresh.
    pub async fn run(&self) {
        let _runner = self.auto.attach_runner();
        #[cfg(feature = "defmt")]
        defmt::debug!("auto-refresh runner attached");
        select(self.auto.run_timer(), self.refresh_loop()).await;
    }

    async fn refresh_loop(&self) {
        loop {
            self.service_wake().await;
        }
    }

    /// Wait for one wake and drive one frame if auto-refresh is enabled.
    ///
    /// Returns whether a frame was driven. Wakes raised while the frame was
    /// being driven collapse into a single pending one. Once the pass has
    /// released its frame, a publish the display had to defer is finished
    /// here and shows from the next pass on.
    pub async fn service_wake(&self) -> bool {
        self.auto.wait_wake().await;
        if !self.auto.is_enabled() {
            return false;
        }
        let driven = match self.refresh_pass().await {
            Ok(()) => true,
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("auto-refresh pass failed: {}", _err);
                false
            }
        };
        if self.handoff.complete(&self.exchange) {
            #[cfg(feature = "defmt")]
            defmt::trace!("deferred scan frame published");
        }
        driven
    }

    async fn refresh_pass(&self) -> Result<()> {
        let mut engine = self.engine.lock().await;
        let engine = engine.as_mut().ok_or(Error::NotStarted)?;
        let snapshot = self.exchange.snapshot().ok_or(Error::NotStarted)?;
        engine.refresh_frame(&snapshot, self.on_time_us())
    }
}

impl<PINS, DELAY> Default for Hub12Shared<PINS, DELAY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<PINS, DELAY> core::fmt::Debug for Hub12Shared<PINS, DELAY> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hub12Shared")
            .field("exchange", &self.exchange)
            .field("handoff", &self.handoff)
            .field("auto", &self.auto)
            .field("on_time_us", &self.on_time_us())
            .finish_non_exhaustive()
    }
}

/// A chain of HUB12 panels drawn as one monochrome display.
///
/// Nothing is allocated until [`begin`](Self::begin); before that, drawing
/// is ignored and reads return `false`.
pub struct Hub12Display<'a, PINS, DELAY, W = OneDataWiring> {
    shared: &'a Hub12Shared<PINS, DELAY>,
    chain: ChainTopology,
    double_buffer: bool,
    surfaces: Option<SurfacePair>,
    builder: Option<ScanBuilder>,
    clip: Option<ClipRect>,
    dirty: bool,
    _wiring: PhantomData<W>,
}

impl<'a, PINS: Outputs, DELAY: DelayNs> Hub12Display<'a, PINS, DELAY> {
    /// A display of the usual single-data panels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RefreshBusy`] if `shared` is in use by a running
    /// refresh pass.
    pub fn new(
        shared: &'a Hub12Shared<PINS, DELAY>,
        pins: PINS,
        delay: DELAY,
        config: Hub12Config,
    ) -> Result<Self> {
        Self::with_wiring(shared, pins, delay, config)
    }
}

impl<'a, PINS: Outputs, DELAY: DelayNs, W: PanelWiring> Hub12Display<'a, PINS, DELAY, W> {
    /// A display of panels wired as `W`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RefreshBusy`] if `shared` is in use by a running
    /// refresh pass.
    pub fn with_wiring(
        shared: &'a Hub12Shared<PINS, DELAY>,
        pins: PINS,
        delay: DELAY,
        config: Hub12Config,
    ) -> Result<Self> {
        let mut engine = shared.engine.try_lock().map_err(|_| Error::RefreshBusy)?;
        *engine = Some(RefreshEngine::new(pins, delay));
        shared.on_time_us.store(config.on_time_us, Ordering::Relaxed);
        Ok(Self {
            shared,
            chain: ChainTopology::new(
                config.panels_x.max(1),
                config.panels_y.max(1),
                config.chain,
            ),
            double_buffer: config.double_buffer,
            surfaces: None,
            builder: None,
            clip: None,
            dirty: false,
            _wiring: PhantomData,
        })
    }

    /// Allocate the buffers and put the output lines in their idle state with
    /// the LEDs blanked. Does nothing if already started.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfMemory`] if a buffer cannot be allocated; whatever was
    ///   already allocated is released again.
    /// - [`Error::RefreshBusy`] if the refresh engine is in use.
    /// - [`Error::OutputPin`] if a line cannot be driven.
    pub fn begin(&mut self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }
        self.with_engine(RefreshEngine::init)?;

        let surfaces = SurfacePair::try_new(self.width(), self.height(), self.double_buffer)
            .inspect_err(|_| {
                #[cfg(feature = "defmt")]
                defmt::warn!("no memory for the pixel surfaces");
            })?;
        let builder = ScanBuilder::try_new(
            self.chain.panel_count(),
            self.width(),
            self.height(),
            &self.shared.exchange,
            &self.shared.handoff,
        )
        .inspect_err(|_| {
            #[cfg(feature = "defmt")]
            defmt::warn!("no memory for the scan frames");
        })?;

        self.surfaces = Some(surfaces);
        self.builder = Some(builder);
        self.dirty = true;
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "display started: {}x{} pixels, {} panels",
            self.width(),
            self.height(),
            self.chain.panel_count()
        );
        Ok(())
    }

    /// Stop auto-refresh, withdraw the published frame and release every
    /// buffer. Blanks the output unless a refresh pass holds the engine.
    /// Calling it again does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputPin`] if the output cannot be blanked.
    pub fn end(&mut self) -> Result<()> {
        self.shared.auto.stop();
        drop(self.shared.exchange.take());
        self.shared.handoff.clear();
        if self.surfaces.take().is_some() {
            #[cfg(feature = "defmt")]
            defmt::debug!("display stopped");
        }
        self.builder = None;
        self.clip = None;
        self.dirty = false;
        if let Ok(mut engine) = self.shared.engine.try_lock() {
            if let Some(engine) = engine.as_mut() {
                engine.blank()?;
            }
        }
        Ok(())
    }

    /// Whether [`begin`](Self::begin) allocated the buffers.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.surfaces.is_some()
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.chain.width()
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.chain.height()
    }

    /// The panel chain being driven.
    #[must_use]
    pub const fn chain(&self) -> &ChainTopology {
        &self.chain
    }

    /// Light or clear one pixel of the drawing surface. Points outside the
    /// display or the clip rectangle are ignored.
    pub fn set_pixel(&mut self, p: Point, on: bool) {
        let (Ok(x), Ok(y)) = (usize::try_from(p.x), usize::try_from(p.y)) else {
            return;
        };
        if let Some(clip) = self.clip {
            if !clip.contains(x, y) {
                return;
            }
        }
        if let Some(surfaces) = self.surfaces.as_mut() {
            if surfaces.back_mut().set(x, y, on) {
                self.dirty = true;
            }
        }
    }

    /// Whether a pixel of the visible surface is lit. `false` outside the
    /// display.
    #[must_use]
    pub fn get_pixel(&self, p: Point) -> bool {
        let (Ok(x), Ok(y)) = (usize::try_from(p.x), usize::try_from(p.y)) else {
            return false;
        };
        self.surfaces
            .as_ref()
            .is_some_and(|surfaces| surfaces.front().get(x, y))
    }

    /// Turn every pixel of the drawing surface off.
    pub fn clear(&mut self) {
        if let Some(surfaces) = self.surfaces.as_mut() {
            surfaces.back_mut().clear();
            self.dirty = true;
        }
    }

    /// Restrict pixel writes to the `w × h` rectangle at `(x, y)`, clamped
    /// to the display. An empty or fully off-screen rectangle removes the
    /// restriction.
    pub fn set_clip_rect(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.clip = ClipRect::new(x, y, w, h, self.width(), self.height());
    }

    /// Allow writes anywhere on the display again.
    pub fn clear_clip_rect(&mut self) {
        self.clip = None;
    }

    /// The active clip rectangle.
    #[must_use]
    pub const fn clip_rect(&self) -> Option<ClipRect> {
        self.clip
    }

    /// Whether the visible content changed since the last published frame,
    /// including a deferred build the refresh side has not finished yet.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.shared.handoff.is_pending()
    }

    /// Make the drawing visible.
    ///
    /// When double buffered the surfaces are swapped first, so the surface
    /// just drawn becomes visible and the previously visible one becomes the
    /// drawing target. Then the scan frame is rebuilt and published if
    /// anything changed, see [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] before [`begin`](Self::begin).
    pub fn update(&mut self) -> Result<Publish> {
        let surfaces = self.surfaces.as_mut().ok_or(Error::NotStarted)?;
        if surfaces.is_double() {
            surfaces.swap(false);
            self.dirty = true;
        }
        self.flush()
    }

    /// Rebuild and publish the scan frame if the visible surface changed.
    ///
    /// [`Publish::Deferred`] means the refresh side is still driving the
    /// frame that would be rebuilt. The visible surface is staged and the
    /// refresh side publishes it after its pass; calling `flush` again
    /// before that retries with the current content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] before [`begin`](Self::begin).
    pub fn flush(&mut self) -> Result<Publish> {
        let (Some(surfaces), Some(builder)) = (self.surfaces.as_ref(), self.builder.as_mut())
        else {
            return Err(Error::NotStarted);
        };
        let outcome = builder.publish::<W>(
            &self.shared.exchange,
            &self.shared.handoff,
            surfaces.front(),
            &self.chain,
            self.dirty,
        );
        match outcome {
            Publish::Published => self.dirty = false,
            Publish::Deferred => {
                // not staged while the refresh side finishes an older build
                self.dirty = !self.shared.handoff.is_pending();
                #[cfg(feature = "defmt")]
                defmt::trace!("scan publish deferred, frame still in use");
            }
            Publish::Unchanged => {}
        }
        Ok(outcome)
    }

    /// Drive one full frame from the calling context, publishing pending
    /// changes first.
    ///
    /// # Errors
    ///
    /// - [`Error::NotStarted`] before [`begin`](Self::begin).
    /// - [`Error::RefreshBusy`] if the auto-refresh runner is driving a frame.
    /// - [`Error::OutputPin`] if a line cannot be driven.
    pub fn refresh(&mut self) -> Result<()> {
        self.flush()?;
        let on_time_us = self.on_time_us();
        let exchange = &self.shared.exchange;
        self.with_engine(|engine| {
            let snapshot = exchange.snapshot().ok_or(Error::NotStarted)?;
            engine.refresh_frame(&snapshot, on_time_us)
        })
    }

    /// Set the dwell time per scan row. Longer is brighter and draws more
    /// current; it also lowers the achievable refresh rate.
    pub fn set_on_time_us(&mut self, on_time_us: u32) {
        self.shared.on_time_us.store(on_time_us, Ordering::Relaxed);
    }

    /// Dwell time per scan row in microseconds.
    #[must_use]
    pub fn on_time_us(&self) -> u32 {
        self.shared.on_time_us()
    }

    /// Switch double buffering.
    ///
    /// Before [`begin`](Self::begin) this only records the choice. Afterwards,
    /// enabling allocates a blank drawing surface and disabling keeps the
    /// visible surface as the only one. Either way the display becomes dirty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the drawing surface cannot be
    /// allocated; the display stays single buffered.
    pub fn set_double_buffer(&mut self, enable: bool) -> Result<()> {
        if enable == self.double_buffer {
            return Ok(());
        }
        if let Some(surfaces) = self.surfaces.as_mut() {
            if enable {
                surfaces.enable_double().inspect_err(|_| {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("no memory for a back surface");
                })?;
            } else {
                surfaces.disable_double();
            }
            self.dirty = true;
        }
        self.double_buffer = enable;
        Ok(())
    }

    /// Whether drawing goes to a separate back surface.
    #[must_use]
    pub const fn is_double_buffer(&self) -> bool {
        self.double_buffer
    }

    /// Swap the drawing and visible surfaces, optionally seeding the new
    /// drawing surface with the now visible content. Does nothing when single
    /// buffered or not started.
    pub fn swap_buffers(&mut self, copy_front_to_back: bool) {
        if let Some(surfaces) = self.surfaces.as_mut() {
            if surfaces.is_double() {
                surfaces.swap(copy_front_to_back);
                self.dirty = true;
            }
        }
    }

    /// Let the background runner refresh the panels every `period_us`.
    ///
    /// Returns the period actually used, which is never shorter than
    /// four dwell times plus a fixed margin. Frames are still rebuilt by
    /// [`update`](Self::update) in the calling context; only a rebuild a
    /// running pass forced to wait is finished by the runner.
    ///
    /// # Errors
    ///
    /// - [`Error::NotStarted`] before [`begin`](Self::begin).
    /// - [`Error::NoRefreshRunner`] if [`Hub12Shared::run`] is not running.
    pub fn start_auto_refresh(&mut self, period_us: u32) -> Result<u32> {
        if !self.is_started() {
            return Err(Error::NotStarted);
        }
        let period = self.shared.auto.start(period_us, self.on_time_us())?;
        #[cfg(feature = "defmt")]
        defmt::debug!("auto-refresh every {} us", period);
        Ok(period)
    }

    /// Stop periodic refresh. A frame being driven is finished.
    pub fn stop_auto_refresh(&mut self) {
        self.shared.auto.stop();
        #[cfg(feature = "defmt")]
        defmt::debug!("auto-refresh stopped");
    }

    /// Whether periodic refresh is enabled.
    #[must_use]
    pub fn is_auto_refresh(&self) -> bool {
        self.shared.auto.is_enabled()
    }

    fn with_engine<T>(
        &self,
        f: impl FnOnce(&mut RefreshEngine<PINS, DELAY>) -> Result<T>,
    ) -> Result<T> {
        let mut engine = self
            .shared
            .engine
            .try_lock()
            .map_err(|_| Error::RefreshBusy)?;
        let engine = engine.as_mut().ok_or(Error::NotStarted)?;
        f(engine)
    }
}

impl<PINS, DELAY, W> Drop for Hub12Display<'_, PINS, DELAY, W> {
    fn drop(&mut self) {
        self.shared.auto.stop();
        drop(self.shared.exchange.take());
        self.shared.handoff.clear();
    }
}

impl<PINS, DELAY, W> core::fmt::Debug for Hub12Display<'_, PINS, DELAY, W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hub12Display")
            .field("chain", &self.chain)
            .field("double_buffer", &self.double_buffer)
            .field("started", &self.surfaces.is_some())
            .field("clip", &self.clip)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "defmt")]
impl<PINS, DELAY, W> defmt::Format for Hub12Display<'_, PINS, DELAY, W> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Hub12Display {}x{} double_buffer: {} started: {} dirty: {}",
            self.chain.width(),
            self.chain.height(),
            self.double_buffer,
            self.surfaces.is_some(),
            self.dirty
        );
    }
}

impl<PINS: Outputs, DELAY: DelayNs, W: PanelWiring> OriginDimensions
    for Hub12Display<'_, PINS, DELAY, W>
{
    fn size(&self) -> Size {
        Size::new(self.width() as u32, self.height() as u32)
    }
}

impl<PINS: Outputs, DELAY: DelayNs, W: PanelWiring> DrawTarget
    for Hub12Display<'_, PINS, DELAY, W>
{
    type Color = Color;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> core::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point, color.is_on());
        }
        Ok(())
    }

    /// Fill the whole drawing surface, ignoring the clip rectangle.
    fn clear(&mut self, color: BinaryColor) -> core::result::Result<(), Self::Error> {
        if let Some(surfaces) = self.surfaces.as_mut() {
            surfaces.back_mut().fill(color.is_on());
            self.dirty = true;
        }
        Ok(())
    }
}
