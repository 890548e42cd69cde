//! The request/parse/send flow.
//!
//! One invocation runs location → fetch → extract → send strictly in order and
//! stops at the first failing step. Invocations share no mutable state, so any
//! number of them may be in flight at once.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use reqwest::Method;
use tracing::Instrument;

use crate::{
    channel::{OutboundChannel, SendAck, send_with_callbacks},
    error::RelayError,
    fetch::Fetcher,
    location::{LocationProvider, acquire_location},
    model::{LocationFix, LocationOptions, OutboundMessage, Payload, Trigger},
    payload::{ExtractOptions, extract_payload},
};

static NEXT_FLOW_ID: AtomicU64 = AtomicU64::new(1);

/// What a completed flow delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowReport {
    pub flow_id: u64,
    pub trigger: Trigger,
    pub fix: LocationFix,
    pub payload: Payload,
    pub message: OutboundMessage,
    pub ack: SendAck,
}

#[derive(Debug, Clone)]
pub struct DataRelay {
    location: Arc<dyn LocationProvider>,
    fetcher: Arc<dyn Fetcher>,
    channel: Arc<dyn OutboundChannel>,
    endpoint: String,
    method: Method,
    location_options: LocationOptions,
    extract_options: ExtractOptions,
}

impl DataRelay {
    pub fn new(
        location: Arc<dyn LocationProvider>,
        fetcher: Arc<dyn Fetcher>,
        channel: Arc<dyn OutboundChannel>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            location,
            fetcher,
            channel,
            endpoint: endpoint.into(),
            method: Method::GET,
            location_options: LocationOptions::default(),
            extract_options: ExtractOptions::default(),
        }
    }

    pub fn with_location_options(mut self, options: LocationOptions) -> Self {
        self.location_options = options;
        self
    }

    /// Request method for the lookup; GET unless set.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract_options = options;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn acquire_location(&self) -> Result<LocationFix, RelayError> {
        let fix = acquire_location(self.location.as_ref(), &self.location_options).await?;
        tracing::debug!(
            latitude = fix.latitude,
            longitude = fix.longitude,
            "location acquired"
        );
        Ok(fix)
    }

    /// Request the configured endpoint. The fix only gates the request; it
    /// is not part of the URL.
    pub async fn fetch_remote(&self) -> Result<String, RelayError> {
        tracing::info!(method = %self.method, url = %self.endpoint, "looking up");
        self.fetcher.fetch(self.method.clone(), &self.endpoint).await
    }

    pub fn extract_payload(&self, body: &str) -> Result<Payload, RelayError> {
        let payload = extract_payload(body, &self.extract_options)?;
        tracing::info!(
            temperature = payload.temperature,
            conditions = %payload.conditions,
            "extracted payload"
        );
        Ok(payload)
    }

    /// Build the fixed-key message and submit it once. Failures are logged
    /// and returned, never retried.
    pub async fn send_to_device(
        &self,
        payload: &Payload,
    ) -> Result<(OutboundMessage, SendAck), RelayError> {
        let message = OutboundMessage::from_payload(payload);

        send_with_callbacks(
            self.channel.as_ref(),
            message.clone(),
            |ack| {
                tracing::info!(transaction_id = ack.transaction_id, "sent to device");
                Ok((message, ack))
            },
            |failure| {
                tracing::warn!(
                    transaction_id = failure.transaction_id,
                    reason = %failure.reason,
                    "error sending to device"
                );
                Err(RelayError::Send(failure.to_string()))
            },
        )
        .await
    }

    /// Run one complete flow invocation.
    pub async fn run(&self, trigger: Trigger) -> Result<FlowReport, RelayError> {
        let flow_id = NEXT_FLOW_ID.fetch_add(1, Ordering::Relaxed);
        let span = tracing::info_span!("flow", id = flow_id, %trigger);

        async move {
            let result = self.run_steps(flow_id, trigger).await;
            if let Err(err) = &result {
                tracing::warn!(stage = err.stage(), error = %err, "flow aborted");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_steps(&self, flow_id: u64, trigger: Trigger) -> Result<FlowReport, RelayError> {
        let fix = self.acquire_location().await?;
        let body = self.fetch_remote().await?;
        let payload = self.extract_payload(&body)?;
        let (message, ack) = self.send_to_device(&payload).await?;

        Ok(FlowReport {
            flow_id,
            trigger,
            fix,
            payload,
            message,
            ack,
        })
    }

    pub async fn on_ready(&self) -> Result<FlowReport, RelayError> {
        tracing::info!("relay ready");
        self.run(Trigger::Ready).await
    }

    pub async fn on_inbound_message(&self) -> Result<FlowReport, RelayError> {
        tracing::info!("inbound message received");
        self.run(Trigger::InboundMessage).await
    }
}
