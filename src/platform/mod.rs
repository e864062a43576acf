//! Boundary to the operating system.
//!
//! Window focus, screen capture and the permission grants behind them live
//! outside this crate. A front-end supplies an implementation of [`Platform`];
//! the capture pipeline only ever talks to the trait.

use anyhow::Result;
use image::DynamicImage;

mod detached;

#[cfg(test)]
pub(crate) mod testing;

pub use detached::DetachedPlatform;

/// Invoked with the new foreground application's name.
pub type FocusHandler = Box<dyn Fn(String) + Send + Sync + 'static>;

/// Identifies one registered [`FocusHandler`].
pub type SubscriptionId = u64;

pub trait Platform: Send + Sync + 'static {
    /// Capability flag: may read the focused window.
    fn can_read_window_focus(&self) -> bool;

    /// Capability flag: may capture the screen.
    fn can_capture_screen(&self) -> bool;

    fn frontmost_app(&self) -> Option<String>;

    /// Title of the focused window, if one can be read right now.
    fn focused_window_title(&self) -> Option<String>;

    /// Full-resolution capture of the main display. Blocking.
    fn capture_screen(&self) -> Result<DynamicImage>;

    /// Registers `handler` for foreground application changes. Handlers
    /// may be called from any thread.
    fn subscribe_focus_changes(&self, handler: FocusHandler) -> SubscriptionId;

    /// Drops the handler registered under `id`. Unknown ids are ignored.
    fn unsubscribe_focus_changes(&self, id: SubscriptionId);

    fn request_window_focus_access(&self) {}

    fn request_screen_capture_access(&self) {}
}

/// The focused window's title, or `None` without focus permission.
pub fn gated_window_title(platform: &dyn Platform) -> Option<String> {
    if !platform.can_read_window_focus() {
        return None;
    }
    platform.focused_window_title()
}
