//! Screen capture and window collaborators.
//!
//! The refresh engine talks to the emulator window and the screen grabber
//! through the `GameWindow` and `ScreenCapture` traits so the detection
//! pipeline stays platform-free and testable with in-memory fakes. The
//! Win32-backed implementations live in `window.rs` and `screenshot.rs`.

use anyhow::Result;
use image::RgbaImage;

#[cfg(windows)]
pub mod screenshot;
#[cfg(windows)]
pub mod window;

#[cfg(windows)]
pub use screenshot::GdiCapture;
#[cfg(windows)]
pub use window::{Win32Window, find_window_by_title, list_window_titles};

/// Absolute screen rectangle of the tracked window.
///
/// Always re-polled immediately before use: the emulator window can be
/// moved or resized at any time, so region/coordinate math must never
/// work from a stale rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowRect {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// The emulator window collaborator.
///
/// Geometry is polled live on every call; `activate`/`move_to`/`resize_to`
/// are best-effort (a denied resize is logged by the caller and the loop
/// continues at the smaller scale).
pub trait GameWindow {
    fn rect(&mut self) -> Result<WindowRect>;
    fn title(&mut self) -> Result<String>;
    fn is_minimized(&mut self) -> Result<bool>;
    fn restore(&mut self) -> Result<()>;
    fn activate(&mut self) -> Result<()>;
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    fn resize_to(&mut self, width: u32, height: u32) -> Result<()>;
}

/// The screenshot collaborator.
///
/// Implementations may hold a persistent capture handle; it is opened
/// lazily on the first grab and must be released exactly once via
/// `release()` on every termination path.
pub trait ScreenCapture {
    /// Grabs the given absolute screen rectangle as RGBA pixels.
    fn grab(&mut self, rect: WindowRect) -> Result<RgbaImage>;

    /// Releases any persistent capture resource. Default is a no-op.
    fn release(&mut self) {}
}
