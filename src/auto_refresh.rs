//! Periodic refresh without caller involvement.
//!
//! A timer loop fires every period and raises a [`Signal`]; the refresh loop
//! waits on that signal and drives one frame per wake. A `Signal` holds at
//! most one pending value, so however many periods elapse while a frame is
//! being driven, the refresh loop only ever sees one wake afterwards: a slow
//! pass drops frames instead of queueing them.
//!
//! Stopping only clears the enable flag and any pending wake; both loops stay
//! alive and idle until the next start.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Timer;

use crate::{Error, Result, SCAN_ROWS};

/// Fixed allowance for shifting and latching on top of the dwell time of
/// every scan row.
pub const AUTO_REFRESH_MARGIN_US: u32 = 300;

/// Period suggested when the caller has no better value.
pub const DEFAULT_AUTO_REFRESH_PERIOD_US: u32 = 500;

/// Scheduler state shared between the display and its background runner.
pub struct AutoRefresh {
    enabled: AtomicBool,
    attached: AtomicBool,
    period_us: AtomicU32,
    wake: Signal<CriticalSectionRawMutex, ()>,
    start: Signal<CriticalSectionRawMutex, ()>,
}

impl AutoRefresh {
    /// Disabled, with no runner attached.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            attached: AtomicBool::new(false),
            period_us: AtomicU32::new(0),
            wake: Signal::new(),
            start: Signal::new(),
        }
    }

    /// Shortest period that leaves the engine time to drive a whole frame
    /// with the given dwell time.
    #[must_use]
    pub const fn min_period_us(on_time_us: u32) -> u32 {
        on_time_us
            .saturating_mul(SCAN_ROWS as u32)
            .saturating_add(AUTO_REFRESH_MARGIN_US)
    }

    /// Enable periodic refresh and return the period actually used.
    ///
    /// Periods shorter than [`AutoRefresh::min_period_us`] are raised to it.
    /// Starting while already enabled changes nothing and returns the
    /// current period.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRefreshRunner`] if no runner is attached; nothing
    /// is enabled in that case.
    pub fn start(&self, period_us: u32, on_time_us: u32) -> Result<u32> {
        if !self.is_attached() {
            #[cfg(feature = "defmt")]
            defmt::warn!("auto-refresh requested without a runner");
            return Err(Error::NoRefreshRunner);
        }
        if self.is_enabled() {
            return Ok(self.period_us());
        }
        let min = Self::min_period_us(on_time_us);
        let period = if period_us < min {
            #[cfg(feature = "defmt")]
            defmt::warn!("auto-refresh period {} us raised to {} us", period_us, min);
            min
        } else {
            period_us
        };
        self.period_us.store(period, Ordering::Relaxed);
        self.enabled.store(true, Ordering::Release);
        self.start.signal(());
        Ok(period)
    }

    /// Disable periodic refresh and drop any pending wake.
    ///
    /// A pass already in progress is not interrupted.
    pub fn stop(&self) {
        self.enabled.store(false, Ordering::Release);
        self.wake.reset();
    }

    /// Request one refresh pass. Requests made before the runner gets to the
    /// first one collapse into it.
    pub fn tick(&self) {
        self.wake.signal(());
    }

    /// Whether a wake is waiting to be consumed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.wake.signaled()
    }

    /// Whether periodic refresh is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Whether a runner is servicing wakes.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Current period in microseconds; `0` if never started.
    #[must_use]
    pub fn period_us(&self) -> u32 {
        self.period_us.load(Ordering::Relaxed)
    }

    /// Mark a runner as present.
    pub fn attach(&self) {
        self.attached.store(true, Ordering::Release);
    }

    /// Mark the runner as gone, disabling periodic refresh.
    pub fn detach(&self) {
        self.stop();
        self.attached.store(false, Ordering::Release);
    }

    /// Attach for as long as the returned guard lives.
    pub fn attach_runner(&self) -> RunnerAttachment<'_> {
        self.attach();
        RunnerAttachment { auto: self }
    }

    /// Wait for the next wake.
    pub async fn wait_wake(&self) {
        self.wake.wait().await;
    }

    /// Fire [`tick`](Self::tick) every period while enabled; park on the
    /// start signal while disabled.
    pub async fn run_timer(&self) -> ! {
        loop {
            while !self.is_enabled() {
                self.start.wait().await;
            }
            Timer::after_micros(u64::from(self.period_us())).await;
            if self.is_enabled() {
                self.tick();
            }
        }
    }
}

/// Keeps a runner attached; detaches it when dropped, e.g. when the runner
/// future is cancelled.
#[must_use = "the runner detaches when this is dropped"]
#[derive(Debug)]
pub struct RunnerAttachment<'a> {
    auto: &'a AutoRefresh,
}

impl Drop for RunnerAttachment<'_> {
    fn drop(&mut self) {
        self.auto.detach();
        #[cfg(feature = "defmt")]
        defmt::debug!("auto-refresh runner detached");
    }
}

impl Default for AutoRefresh {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for AutoRefresh {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AutoRefresh")
            .field("enabled", &self.is_enabled())
            .field("attached", &self.is_attached())
            .field("period_us", &self.period_us())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for AutoRefresh {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "AutoRefresh enabled: {} attached: {} period_us: {}",
            self.is_enabled(),
            self.is_attached(),
            self.period_us()
        );
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::format;

    use embassy_futures::block_on;

    use super::*;

    fn attached() -> AutoRefresh {
        let auto = AutoRefresh::new();
        auto.attach();
        auto
    }

    #[test]
    fn test_min_period() {
        assert_eq!(AutoRefresh::min_period_us(800), 3500);
        assert_eq!(AutoRefresh::min_period_us(0), AUTO_REFRESH_MARGIN_US);
        assert_eq!(AutoRefresh::min_period_us(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_start_without_runner_fails() {
        let auto = AutoRefresh::new();
        assert_eq!(auto.start(5000, 800), Err(Error::NoRefreshRunner));
        assert!(!auto.is_enabled());
        assert_eq!(auto.period_us(), 0);
    }

    #[test]
    fn test_short_period_is_clamped() {
        let auto = attached();
        assert_eq!(auto.start(DEFAULT_AUTO_REFRESH_PERIOD_US, 800), Ok(3500));
        assert!(auto.is_enabled());
        assert_eq!(auto.period_us(), 3500);
    }

    #[test]
    fn test_long_period_is_kept() {
        let auto = attached();
        assert_eq!(auto.start(10_000, 800), Ok(10_000));
    }

    #[test]
    fn test_start_while_running_keeps_period() {
        let auto = attached();
        assert_eq!(auto.start(10_000, 800), Ok(10_000));
        assert_eq!(auto.start(20_000, 800), Ok(10_000));
        auto.stop();
        assert_eq!(auto.start(20_000, 800), Ok(20_000));
    }

    #[test]
    fn test_ticks_coalesce_into_one_wake() {
        let auto = attached();
        auto.start(5000, 100).unwrap();
        for _ in 0..10 {
            auto.tick();
        }
        assert!(auto.is_pending());

        let mut passes = 0;
        while auto.is_pending() {
            block_on(auto.wait_wake());
            passes += 1;
        }
        assert_eq!(passes, 1);
    }

    #[test]
    fn test_stop_drops_pending_wake() {
        let auto = attached();
        auto.start(5000, 100).unwrap();
        auto.tick();
        auto.stop();
        assert!(!auto.is_enabled());
        assert!(!auto.is_pending());
    }

    #[test]
    fn test_detach_disables() {
        let auto = attached();
        auto.start(5000, 100).unwrap();
        auto.detach();
        assert!(!auto.is_enabled());
        assert!(!auto.is_attached());
        assert_eq!(auto.start(5000, 100), Err(Error::NoRefreshRunner));
    }

    #[test]
    fn test_runner_attachment_detaches_on_drop() {
        let auto = AutoRefresh::new();
        let runner = auto.attach_runner();
        assert!(auto.is_attached());
        auto.start(5000, 100).unwrap();
        auto.tick();

        drop(runner);
        assert!(!auto.is_attached());
        assert!(!auto.is_enabled());
        assert!(!auto.is_pending());
    }

    #[test]
    fn test_debug_formatting() {
        let debug_string = format!("{:?}", attached());
        assert!(debug_string.contains("AutoRefresh"));
        assert!(debug_string.contains("attached: true"));
    }
}
