use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Mutex,
};

use anyhow::Result;
use image::{DynamicImage, Rgba, RgbaImage};

use super::{FocusHandler, Platform, SubscriptionId};

/// Scriptable platform for tests.
pub(crate) struct FakePlatform {
    focus_granted: AtomicBool,
    capture_granted: AtomicBool,
    frontmost: Mutex<Option<String>>,
    title: Mutex<Option<String>>,
    frame: Mutex<DynamicImage>,
    handlers: Mutex<Vec<(SubscriptionId, FocusHandler)>>,
    next_subscription: AtomicU64,
    captures: AtomicUsize,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self {
            focus_granted: AtomicBool::new(true),
            capture_granted: AtomicBool::new(true),
            frontmost: Mutex::new(Some("Finder".into())),
            title: Mutex::new(None),
            frame: Mutex::new(solid_frame([10, 20, 30, 255])),
            handlers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            captures: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_capabilities(&self, focus: bool, capture: bool) {
        self.focus_granted.store(focus, Ordering::SeqCst);
        self.capture_granted.store(capture, Ordering::SeqCst);
    }

    pub(crate) fn set_frontmost(&self, app: &str) {
        *self.frontmost.lock().unwrap() = Some(app.to_string());
    }

    pub(crate) fn set_title(&self, title: Option<&str>) {
        *self.title.lock().unwrap() = title.map(str::to_string);
    }

    pub(crate) fn set_frame(&self, rgba: [u8; 4]) {
        *self.frame.lock().unwrap() = solid_frame(rgba);
    }

    pub(crate) fn emit_focus_change(&self, app: &str) {
        self.set_frontmost(app);
        for (_, handler) in self.handlers.lock().unwrap().iter() {
            handler(app.to_string());
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    pub(crate) fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

pub(crate) fn solid_frame(rgba: [u8; 4]) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(640, 480, Rgba(rgba)))
}

impl Platform for FakePlatform {
    fn can_read_window_focus(&self) -> bool {
        self.focus_granted.load(Ordering::SeqCst)
    }

    fn can_capture_screen(&self) -> bool {
        self.capture_granted.load(Ordering::SeqCst)
    }

    fn frontmost_app(&self) -> Option<String> {
        self.frontmost.lock().unwrap().clone()
    }

    fn focused_window_title(&self) -> Option<String> {
        self.title.lock().unwrap().clone()
    }

    fn capture_screen(&self) -> Result<DynamicImage> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(self.frame.lock().unwrap().clone())
    }

    fn subscribe_focus_changes(&self, handler: FocusHandler) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().unwrap().push((id, handler));
        id
    }

    fn unsubscribe_focus_changes(&self, id: SubscriptionId) {
        self.handlers.lock().unwrap().retain(|(existing, _)| *existing != id);
    }
}
