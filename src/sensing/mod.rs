pub mod change_detector;
pub mod controller;
pub mod loop_worker;
pub mod screenshots;
pub mod state;

pub use change_detector::{content_hash, CaptureDecision, ChangeDetector};
pub use controller::CaptureScheduler;
pub use loop_worker::CaptureContext;
pub use screenshots::ScreenshotStore;
pub use state::CaptureState;
