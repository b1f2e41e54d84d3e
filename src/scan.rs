//! Scan buffers: the byte stream shifted into the panel chain.
//!
//! # Memory Layout
//! A [`ScanFrame`] holds one complete frame as four row segments, one per
//! scan row. Each segment is `16 * panel_count` bytes: the 128-bit pattern of
//! every panel in chain order, 16 bytes per panel, shifted out MSB first.
//!
//! ```text
//! | row 0: panel 0 [16] | panel 1 [16] | ... | row 1: panel 0 [16] | ... | row 3 ... |
//! ```
//!
//! The frame is derived state: [`build_scan`] recreates it from the front
//! surface and the chain topology whenever the surface changed.
//!
//! # Publishing
//! Two frames exist. One is *active* and read by the refresh engine, the
//! other is rebuilt by the drawing side. [`ScanExchange`] holds the active
//! one; publishing a freshly built frame is a single reference exchange in
//! a critical section. A refresh pass takes a [`ScanSnapshot`] once and uses
//! it for the whole pass, and the builder only writes into a frame no pass
//! still holds, so a publish can never tear a pass in progress.
//!
//! When the spare is still held, the drawing side copies the surface into a
//! staging surface and leaves the spare and the copy in a [`ScanHandoff`].
//! The refresh side finishes that build as soon as its pass lets go of the
//! frame, so the newest drawing is published even if the application never
//! calls `update()` again.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_dma::ReadBuffer;

use crate::surface::PixelSurface;
use crate::tiling::ChainTopology;
use crate::wiring::PanelWiring;
use crate::{compute_bytes_per_row, compute_scan_bytes, Error, Result, PANEL_BYTES, SCAN_ROWS};

/// One complete frame of scan data for the whole chain.
#[derive(Clone, PartialEq, Eq)]
pub struct ScanFrame {
    bytes: Vec<u8>,
    bytes_per_row: usize,
}

impl ScanFrame {
    /// Allocate a blank frame for `panel_count` panels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the frame cannot be allocated.
    pub fn try_new(panel_count: usize) -> Result<Self> {
        let len = compute_scan_bytes(panel_count);
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
        bytes.resize(len, 0);
        Ok(Self {
            bytes,
            bytes_per_row: compute_bytes_per_row(panel_count),
        })
    }

    /// Bytes shifted out for each scan row.
    #[must_use]
    pub const fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    /// Number of panels the frame covers.
    #[must_use]
    pub const fn panel_count(&self) -> usize {
        self.bytes_per_row / PANEL_BYTES
    }

    /// The whole frame, row segment after row segment.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The segment shifted out while scan row `row` is selected. Empty for
    /// rows past the last one.
    #[must_use]
    pub fn row(&self, row: usize) -> &[u8] {
        if row >= SCAN_ROWS {
            return &[];
        }
        let start = row * self.bytes_per_row;
        &self.bytes[start..start + self.bytes_per_row]
    }

    /// The 16-byte pattern of one panel in one scan row. Empty if out of range.
    #[must_use]
    pub fn panel(&self, row: usize, panel: usize) -> &[u8] {
        if panel >= self.panel_count() {
            return &[];
        }
        let start = panel * PANEL_BYTES;
        self.row(row).get(start..start + PANEL_BYTES).unwrap_or(&[])
    }

    /// Zero every byte.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }
}

impl core::fmt::Debug for ScanFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScanFrame")
            .field("size", &self.bytes.len())
            .field("bytes_per_row", &self.bytes_per_row)
            .field("panel_count", &self.panel_count())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ScanFrame {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "ScanFrame size: {} bytes_per_row: {}",
            self.bytes.len(),
            self.bytes_per_row
        );
    }
}

/// Rebuild `frame` from `surface`.
///
/// The frame is cleared first, then every lit pixel is routed through the
/// chain mapper and the panel wiring and OR-ed into its byte. Unlit pixels
/// stay zero. Building twice from the same surface produces identical bytes.
pub fn build_scan<W: PanelWiring>(
    frame: &mut ScanFrame,
    surface: &PixelSurface,
    chain: &ChainTopology,
) {
    frame.clear();
    let bytes_per_row = frame.bytes_per_row;
    for (gx, gy) in surface.lit_pixels() {
        let Some(address) = chain.map_global(gx, gy) else {
            continue;
        };
        if address.panel >= frame.panel_count() {
            continue;
        }
        let row = W::scan_row(address.y);
        let position = W::bit_position(address.x, address.y);
        let index = row * bytes_per_row
            + address.panel * PANEL_BYTES
            + usize::from(position.byte_in_panel());
        frame.bytes[index] |= position.msb_first_mask();
    }
}

/// A frame held for the duration of a refresh pass or a DMA transfer.
///
/// While any snapshot of a frame is alive the builder will not write into
/// it.
#[derive(Debug, Clone)]
pub struct ScanSnapshot(Arc<ScanFrame>);

impl ScanSnapshot {
    /// The frame being held.
    #[must_use]
    pub fn frame(&self) -> &ScanFrame {
        &self.0
    }

    /// Whether both snapshots hold the same frame buffer.
    #[must_use]
    pub fn same_frame(&self, other: &ScanSnapshot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl core::ops::Deref for ScanSnapshot {
    type Target = ScanFrame;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

unsafe impl ReadBuffer for ScanSnapshot {
    type Word = u8;

    unsafe fn read_buffer(&self) -> (*const u8, usize) {
        let bytes = self.0.as_bytes();
        (bytes.as_ptr(), bytes.len())
    }
}

/// The reference to the active scan frame, shared between the drawing side
/// and the refresh side.
///
/// Both operations hold the critical section only long enough to exchange
/// or clone one reference.
pub struct ScanExchange {
    active: Mutex<CriticalSectionRawMutex, RefCell<Option<Arc<ScanFrame>>>>,
}

impl ScanExchange {
    /// An exchange with nothing published.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: Mutex::new(RefCell::new(None)),
        }
    }

    /// Make `frame` the active frame and hand back the one it replaces.
    pub fn publish(&self, frame: Arc<ScanFrame>) -> Option<Arc<ScanFrame>> {
        self.active.lock(|active| active.borrow_mut().replace(frame))
    }

    /// Take a reference to the active frame, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<ScanSnapshot> {
        self.active
            .lock(|active| active.borrow().clone())
            .map(ScanSnapshot)
    }

    /// Remove the active frame.
    pub fn take(&self) -> Option<Arc<ScanFrame>> {
        self.active.lock(|active| active.borrow_mut().take())
    }

    /// Whether a frame is published.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.active.lock(|active| active.borrow().is_some())
    }
}

impl Default for ScanExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ScanExchange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScanExchange")
            .field("published", &self.is_published())
            .finish()
    }
}

/// Outcome of trying to publish the front surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Publish {
    /// A new frame was built and is now active.
    Published,
    /// Nothing changed since the last publish.
    Unchanged,
    /// The spare frame is still being scanned. The surface was staged and
    /// the refresh side publishes it once the pass releases the frame; a
    /// later publish from the drawing side takes the job back.
    Deferred,
}

/// Builds a frame for one panel wiring.
type BuildFn = fn(&mut ScanFrame, &PixelSurface, &ChainTopology);

/// A build that could not run because its frame was still being scanned.
struct PendingBuild {
    frame: Arc<ScanFrame>,
    surface: PixelSurface,
    chain: ChainTopology,
    build: BuildFn,
}

enum Handoff {
    /// Waiting for the frame to be released.
    Pending(PendingBuild),
    /// Published by the refresh side; the buffers go back to the builder.
    Done {
        spare: Option<Arc<ScanFrame>>,
        staging: PixelSurface,
    },
}

/// Where the drawing side parks a deferred build for the refresh side.
pub struct ScanHandoff {
    slot: Mutex<CriticalSectionRawMutex, RefCell<Option<Handoff>>>,
}

impl ScanHandoff {
    /// An empty handoff.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(None)),
        }
    }

    /// Whether a deferred build waits for its frame.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot.lock(|slot| matches!(*slot.borrow(), Some(Handoff::Pending(_))))
    }

    /// Build and publish a deferred frame if no pass holds it any more.
    ///
    /// Returns whether a frame was published.
    pub fn complete(&self, exchange: &ScanExchange) -> bool {
        let mut job = match self.take() {
            Some(Handoff::Pending(job)) => job,
            other => {
                self.put(other);
                return false;
            }
        };
        let Some(frame) = Arc::get_mut(&mut job.frame) else {
            self.put(Some(Handoff::Pending(job)));
            return false;
        };
        (job.build)(frame, &job.surface, &job.chain);
        let spare = exchange.publish(job.frame);
        self.put(Some(Handoff::Done {
            spare,
            staging: job.surface,
        }));
        true
    }

    /// Drop whatever is parked.
    pub fn clear(&self) {
        drop(self.take());
    }

    fn take(&self) -> Option<Handoff> {
        self.slot.lock(|slot| slot.borrow_mut().take())
    }

    fn put(&self, handoff: Option<Handoff>) {
        self.slot.lock(|slot| *slot.borrow_mut() = handoff);
    }
}

impl Default for ScanHandoff {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ScanHandoff {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScanHandoff")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// The drawing side's half of the two scan frames: the spare it builds into
/// and the staging surface a deferred build reads from.
///
/// Both travel together; while a deferred build is parked or being finished
/// by the refresh side, the builder holds neither.
#[derive(Debug)]
pub(crate) struct ScanBuilder {
    spare: Option<Arc<ScanFrame>>,
    staging: Option<PixelSurface>,
}

impl ScanBuilder {
    /// Allocate both frames and the staging surface, publishing the first
    /// frame blank.
    pub(crate) fn try_new(
        panel_count: usize,
        width: usize,
        height: usize,
        exchange: &ScanExchange,
        handoff: &ScanHandoff,
    ) -> Result<Self> {
        let first = ScanFrame::try_new(panel_count)?;
        let second = ScanFrame::try_new(panel_count)?;
        let staging = PixelSurface::try_new(width, height)?;
        // frames left over from a previous run are released here
        handoff.clear();
        drop(exchange.publish(Arc::new(first)));
        Ok(Self {
            spare: Some(Arc::new(second)),
            staging: Some(staging),
        })
    }

    /// Take back the buffers parked in `handoff`. Returns whether they held
    /// a build that was never published.
    fn reclaim(&mut self, handoff: &ScanHandoff) -> bool {
        match handoff.take() {
            Some(Handoff::Pending(job)) => {
                self.spare = Some(job.frame);
                self.staging = Some(job.surface);
                true
            }
            Some(Handoff::Done { spare, staging }) => {
                self.spare = spare;
                self.staging = Some(staging);
                false
            }
            None => false,
        }
    }

    /// Build `surface` into the spare frame and publish it, if `dirty` or a
    /// deferred build is still waiting.
    ///
    /// When a pass still holds the spare, `surface` is staged in `handoff`
    /// for [`ScanHandoff::complete`].
    pub(crate) fn publish<W: PanelWiring>(
        &mut self,
        exchange: &ScanExchange,
        handoff: &ScanHandoff,
        surface: &PixelSurface,
        chain: &ChainTopology,
        dirty: bool,
    ) -> Publish {
        let reclaimed = self.reclaim(handoff);
        if !dirty && !reclaimed {
            return Publish::Unchanged;
        }
        // the refresh side is finishing an earlier build
        let Some(mut spare) = self.spare.take() else {
            return Publish::Deferred;
        };
        if let Some(frame) = Arc::get_mut(&mut spare) {
            build_scan::<W>(frame, surface, chain);
            self.spare = exchange.publish(spare);
            return Publish::Published;
        }
        match self.staging.take() {
            Some(mut staging) => {
                staging.copy_from(surface);
                handoff.put(Some(Handoff::Pending(PendingBuild {
                    frame: spare,
                    surface: staging,
                    chain: *chain,
                    build: build_scan::<W>,
                })));
            }
            None => self.spare = Some(spare),
        }
        Publish::Deferred
    }
}
