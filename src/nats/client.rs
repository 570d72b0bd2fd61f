use anyhow::{Context, Result};
use async_nats::Client;
use futures::stream::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::messages::{InboundMessage, OutboundMessage};
use crate::session::ControllerHandle;

/// Carries the message channel over NATS.
///
/// Commands arrive on `<prefix>.command`; query responses and controller
/// pushes are published on `<prefix>.event`.
pub struct NatsBridge {
    client: Client,
    prefix: String,
}

impl NatsBridge {
    /// Connect to NATS server
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    pub fn command_subject(&self) -> String {
        command_subject(&self.prefix)
    }

    pub fn event_subject(&self) -> String {
        event_subject(&self.prefix)
    }

    /// Serve commands until the subscription ends.
    ///
    /// Controller pushes are forwarded by a companion task for as long as
    /// the bridge runs.
    pub async fn run(self, controller: ControllerHandle) -> Result<()> {
        let subject = self.command_subject();
        let mut commands = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to commands")?;

        info!("Listening for commands on {}", subject);

        let forwarder = self.forward_pushes(controller.subscribe());

        while let Some(msg) = commands.next().await {
            let message = match serde_json::from_slice::<InboundMessage>(&msg.payload) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Failed to parse command message: {}", e);
                    continue;
                }
            };

            debug!("Command received: {:?}", message);

            match controller.handle_message(message).await {
                Ok(Some(response)) => {
                    if let Err(e) = publish(&self.client, self.event_subject(), &response).await {
                        error!("Failed to publish response: {:#}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => error!("Failed to handle command: {:#}", e),
            }
        }

        forwarder.abort();
        info!("Command subscription on {} closed", subject);
        Ok(())
    }

    fn forward_pushes(&self, mut pushes: broadcast::Receiver<OutboundMessage>) -> JoinHandle<()> {
        let client = self.client.clone();
        let subject = self.event_subject();

        tokio::spawn(async move {
            loop {
                match pushes.recv().await {
                    Ok(message) => {
                        if let Err(e) = publish(&client, subject.clone(), &message).await {
                            error!("Failed to publish push: {:#}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Dropped {} controller pushes", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

pub fn command_subject(prefix: &str) -> String {
    format!("{}.command", prefix)
}

pub fn event_subject(prefix: &str) -> String {
    format!("{}.event", prefix)
}

async fn publish(client: &Client, subject: String, message: &OutboundMessage) -> Result<()> {
    let payload = serde_json::to_vec(message)?;

    client
        .publish(subject.clone(), payload.into())
        .await
        .context("Failed to publish message")?;

    debug!("Published to {}", subject);
    Ok(())
}
