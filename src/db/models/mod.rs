pub mod event;

pub use event::{Event, EventKind, EventStats, Metadata, NewEvent};
