//! Outbound message delivery to the companion device.
//!
//! A submission completes exactly once, either acknowledged or failed. The
//! callback-shaped form of the same contract is [`send_with_callbacks`].

use std::{
    fmt::Debug,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::model::OutboundMessage;

/// Delivery acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAck {
    pub transaction_id: u64,
}

/// Delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transaction {transaction_id}: {reason}")]
pub struct SendFailure {
    pub transaction_id: u64,
    pub reason: String,
}

#[async_trait]
pub trait OutboundChannel: Send + Sync + Debug {
    async fn send(&self, message: OutboundMessage) -> Result<SendAck, SendFailure>;
}

/// Submit `message` and invoke exactly one of the two callbacks, returning
/// whatever that callback returns.
pub async fn send_with_callbacks<S, F, R>(
    channel: &dyn OutboundChannel,
    message: OutboundMessage,
    on_success: S,
    on_failure: F,
) -> R
where
    S: FnOnce(SendAck) -> R + Send,
    F: FnOnce(SendFailure) -> R + Send,
{
    match channel.send(message).await {
        Ok(ack) => on_success(ack),
        Err(failure) => on_failure(failure),
    }
}

/// A message that reached the device end of a [`QueueChannel`].
#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub transaction_id: u64,
    pub message: OutboundMessage,
}

/// Channel that delivers into an in-process queue drained by the device side.
#[derive(Debug)]
pub struct QueueChannel {
    tx: mpsc::Sender<Delivered>,
    next_id: AtomicU64,
}

impl QueueChannel {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Delivered>) {
        let (tx, rx) = mpsc::channel(capacity);
        let channel = Self {
            tx,
            next_id: AtomicU64::new(1),
        };
        (channel, rx)
    }
}

#[async_trait]
impl OutboundChannel for QueueChannel {
    async fn send(&self, message: OutboundMessage) -> Result<SendAck, SendFailure> {
        let transaction_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.tx
            .send(Delivered {
                transaction_id,
                message,
            })
            .await
            .map(|()| SendAck { transaction_id })
            .map_err(|_| SendFailure {
                transaction_id,
                reason: "device endpoint is closed".to_string(),
            })
    }
}
