//! Delivery of pending events to the remote endpoint.

mod agent;
mod error;
mod payload;
mod transport;

pub use agent::{CycleReport, SyncAgent, SyncOutcome, BATCH_SIZE, PENDING_QUERY_LIMIT};
pub use error::DeliveryError;
pub use payload::{load_screenshot, EventPayload, INLINE_SCREENSHOT_LIMIT};
pub use transport::{EventTransport, HttpTransport};
