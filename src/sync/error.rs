use thiserror::Error;

/// Why a single event was not delivered. The event stays pending in every
/// case and is retried on the next cycle.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to serialize event {event_id}: {source}")]
    Serialization {
        event_id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("endpoint returned HTTP {status}")]
    Status { status: u16, body: String },
}
