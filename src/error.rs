use derive_more::derive::{Display, Error};

/// A specialized `Result` where the error is this crate's `Error` type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors reported by the display driver.
///
/// Pixel operations never fail: writes outside the display or the active
/// clip rectangle are dropped silently.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A framebuffer or scan buffer could not be allocated.
    #[display("out of memory allocating display buffers")]
    OutOfMemory,

    /// The operation needs the buffers created by `begin()`.
    #[display("display not started")]
    NotStarted,

    /// Auto-refresh was requested but no background runner is attached.
    #[display("no auto-refresh runner attached")]
    NoRefreshRunner,

    /// The refresh engine is currently owned by the auto-refresh runner.
    #[display("refresh engine busy")]
    RefreshBusy,

    /// Driving one of the panel output lines failed.
    #[display("error setting output state")]
    OutputPin,
}
