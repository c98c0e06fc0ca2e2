use anyhow::{Context, Result};
use async_nats::Client;
use tracing::{debug, info};

use super::messages::RecordingEventMessage;

pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    /// Subject events for one recording are published on
    pub fn subject(message: &RecordingEventMessage) -> String {
        format!("recording.events.{}", message.recording_id)
    }

    /// Publish a recording event
    pub async fn publish_event(&self, message: &RecordingEventMessage) -> Result<()> {
        let subject = Self::subject(message);
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish recording event")?;

        debug!("Published {:?} event to {}", message.event, subject);

        Ok(())
    }
}
