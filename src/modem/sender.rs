use crate::modem::commands::{next_command_sequence, OutgoingCommand};
use crate::modem::types::{ModemRequest, ModemResponse};
use anyhow::{anyhow, bail, Result};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::log::{debug, error, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone)]
pub struct ModemSender {
    command_tx: mpsc::Sender<OutgoingCommand>,
}
impl ModemSender {
    pub fn new(command_tx: mpsc::Sender<OutgoingCommand>) -> Self {
        Self { command_tx }
    }

    /// Send a modem request and get some result.
    pub async fn send_request(
        &self,
        request: ModemRequest,
        timeout: Option<u32>,
    ) -> Result<ModemResponse> {
        let sequence = next_command_sequence();
        let (tx, rx) = oneshot::channel();

        debug!("Queuing command sequence {sequence}: {request:?}");
        let cmd = OutgoingCommand::new(sequence, tx, request, timeout);

        // Try to queue without blocking.
        match self.command_tx.try_send(cmd) {
            Ok(_) => debug!("Command sequence {sequence} successfully queued"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                bail!("Command queue is full! The modem may be overwhelmed")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => bail!("Command queue is closed"),
        }

        // Wait for response with timeout.
        let timeout = timeout
            .map(|s| Duration::from_secs(s as u64 + 1))
            .unwrap_or(DEFAULT_TIMEOUT);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => {
                debug!("Command sequence {sequence} completed with response: {response:?}");
                Ok(response)
            }
            Ok(Err(e)) => {
                error!("Command sequence {sequence} response channel error: {e:?}");
                Err(anyhow!(
                    "Command sequence {} response channel closed",
                    sequence
                ))
            }
            Err(_) => {
                warn!("Command sequence {sequence} timed out waiting for response");
                Err(anyhow!(
                    "Command sequence {} timed out waiting for response",
                    sequence
                ))
            }
        }
    }
}
