use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::messages::{AudioChunkMessage, ControlMessage};
use super::subjects;

/// Reconnecting NATS wrapper shared by edge, orchestrator, and relay.
///
/// The live connection sits behind a mutex. A failed publish marks it dead
/// and the next attempt establishes a fresh connection, with increasing
/// backoff between attempts; a socket in an unknown state is never reused.
pub struct Transport {
    url: String,
    client: Mutex<Option<Client>>,
    retry_attempts: u32,
    backoff: Duration,
}

impl Transport {
    /// Connect to the NATS server at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            url: url.to_string(),
            client: Mutex::new(Some(client)),
            retry_attempts: 5,
            backoff: Duration::from_millis(200),
        })
    }

    /// Override the publish retry policy
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Take the current connection, establishing a new one if the previous
    /// attempt marked it dead.
    async fn client(&self) -> Result<Client> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = async_nats::connect(&self.url)
            .await
            .with_context(|| format!("Failed to reconnect to NATS at {}", self.url))?;
        info!("Reconnected to NATS at {}", self.url);
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Publish one payload, retrying with increasing backoff and a fresh
    /// connection after each failure.
    pub async fn publish(&self, subject: String, payload: Vec<u8>) -> Result<()> {
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 0..self.retry_attempts {
            if attempt > 0 {
                let delay = self.backoff * attempt;
                warn!(
                    "Retrying publish to {} in {:?} (attempt {}/{})",
                    subject,
                    delay,
                    attempt + 1,
                    self.retry_attempts
                );
                tokio::time::sleep(delay).await;
            }

            let client = match self.client().await {
                Ok(client) => client,
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };

            match client.publish(subject.clone(), payload.clone().into()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Publish to {} failed: {}. Marking connection dead.", subject, e);
                    *self.client.lock().await = None;
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow::anyhow!("no publish attempt made"))
            .context(format!(
                "Failed to publish to {} after {} attempts",
                subject, self.retry_attempts
            )))
    }

    /// Subscribe to a subject
    pub async fn subscribe(&self, subject: String) -> Result<Subscriber> {
        let client = self.client().await?;
        let subscriber = client
            .subscribe(subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", subject))?;

        info!("Subscribed to {}", subject);
        Ok(subscriber)
    }

    /// Serialize and publish one control message
    pub async fn publish_control(&self, subject: &str, message: &ControlMessage) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.publish(subject.to_string(), payload).await
    }

    /// Serialize and publish one audio chunk to its conversation subject
    pub async fn publish_chunk(&self, message: &AudioChunkMessage) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.publish(
            subjects::conversation_audio(&message.conversation_id),
            payload,
        )
        .await
    }
}
