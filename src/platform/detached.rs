use anyhow::{bail, Result};
use image::DynamicImage;
use log::debug;

use super::{FocusHandler, Platform, SubscriptionId};

/// Used when no OS bridge is linked in. Reports no capabilities, so the
/// tracker refuses to start capturing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedPlatform;

impl Platform for DetachedPlatform {
    fn can_read_window_focus(&self) -> bool {
        false
    }

    fn can_capture_screen(&self) -> bool {
        false
    }

    fn frontmost_app(&self) -> Option<String> {
        None
    }

    fn focused_window_title(&self) -> Option<String> {
        None
    }

    fn capture_screen(&self) -> Result<DynamicImage> {
        bail!("screen capture is not available without a platform bridge")
    }

    fn subscribe_focus_changes(&self, _handler: FocusHandler) -> SubscriptionId {
        debug!("Detached platform never reports focus changes");
        0
    }

    fn unsubscribe_focus_changes(&self, _id: SubscriptionId) {}
}
