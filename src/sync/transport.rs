use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};

use crate::config::SyncTarget;

use super::error::DeliveryError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers one serialized event to the remote endpoint.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn deliver(&self, target: &SyncTarget, body: Vec<u8>) -> Result<(), DeliveryError>;
}

/// HTTPS POST with bearer auth. Only `200 OK` counts as delivered.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn deliver(&self, target: &SyncTarget, body: Vec<u8>) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&target.endpoint)
            .bearer_auth(&target.token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        debug!("Endpoint rejected event with {status}: {body}");
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
