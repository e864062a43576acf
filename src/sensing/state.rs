use super::change_detector::ChangeDetector;

/// What the capture task last saw. Lives for one process run only, so the
/// first observation after a restart always counts as a change.
#[derive(Debug, Default)]
pub struct CaptureState {
    pub last_app: Option<String>,
    pub last_title: Option<String>,
    pub detector: ChangeDetector,
}
