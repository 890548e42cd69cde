//! Composition root and event dispatch.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{
    sync::mpsc,
    task::JoinSet,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    channel::OutboundChannel,
    config::Config,
    fetch::HttpFetcher,
    location::LocationProvider,
    model::{OutboundMessage, Trigger},
    relay::DataRelay,
};

/// Host lifecycle events that start a flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Ready,
    /// A message from the device; its content does not shape the flow.
    InboundMessage(OutboundMessage),
}

impl Event {
    pub fn trigger(&self) -> Trigger {
        match self {
            Event::Ready => Trigger::Ready,
            Event::InboundMessage(_) => Trigger::InboundMessage,
        }
    }
}

/// Wire a relay from configuration plus the two platform collaborators.
pub fn compose(
    config: &Config,
    location: Arc<dyn LocationProvider>,
    channel: Arc<dyn OutboundChannel>,
) -> Result<DataRelay> {
    config.validate()?;
    let fetcher = HttpFetcher::with_timeout(config.http_timeout())?;

    Ok(DataRelay::new(location, Arc::new(fetcher), channel, config.endpoint.clone())
        .with_location_options(config.location_options())
        .with_extract_options(config.extract_options()))
}

/// Feed an inbound message every `period`, the way the device asks for a
/// refresh on its own timer. The first message goes out one period from now.
/// Returns once the event loop has gone away.
pub async fn periodic_refresh(events: mpsc::Sender<Event>, period: Duration) {
    let mut ticks = time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        tracing::debug!(?period, "periodic refresh");
        if events.send(Event::InboundMessage(OutboundMessage::new())).await.is_err() {
            break;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub flows: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Starts one independent flow per event. Overlapping events are neither
/// merged nor serialized.
#[derive(Debug)]
pub struct EventLoop {
    relay: DataRelay,
    events: mpsc::Receiver<Event>,
}

impl EventLoop {
    pub fn new(relay: DataRelay, events: mpsc::Receiver<Event>) -> Self {
        Self { relay, events }
    }

    /// Dispatch until the event source closes, then wait for in-flight flows.
    pub async fn run(mut self) -> LoopSummary {
        let mut flows = JoinSet::new();
        let mut summary = LoopSummary::default();

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    let relay = self.relay.clone();
                    summary.flows += 1;
                    flows.spawn(async move {
                        match event {
                            Event::Ready => relay.on_ready().await,
                            Event::InboundMessage(_) => relay.on_inbound_message().await,
                        }
                    });
                }
                Some(done) = flows.join_next() => tally(&mut summary, done),
            }
        }

        while let Some(done) = flows.join_next().await {
            tally(&mut summary, done);
        }

        tracing::info!(
            flows = summary.flows,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "event source closed"
        );
        summary
    }
}

fn tally<T, E>(summary: &mut LoopSummary, done: Result<Result<T, E>, tokio::task::JoinError>) {
    match done {
        Ok(Ok(_)) => summary.succeeded += 1,
        Ok(Err(_)) => summary.failed += 1,
        Err(err) => {
            tracing::error!(error = %err, "flow task panicked");
            summary.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{channel::QueueChannel, location::StaticLocationProvider};

    #[test]
    fn events_map_to_triggers() {
        assert_eq!(Event::Ready.trigger(), Trigger::Ready);
        assert_eq!(
            Event::InboundMessage(OutboundMessage::new()).trigger(),
            Trigger::InboundMessage
        );
    }

    #[test]
    fn compose_rejects_invalid_config() {
        let (channel, _rx) = QueueChannel::new(1);
        let cfg = Config {
            endpoint: "not a url".into(),
            ..Default::default()
        };

        let err = compose(&cfg, Arc::new(StaticLocationProvider::unset()), Arc::new(channel))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid endpoint URL"));
    }

    #[tokio::test]
    async fn compose_uses_configured_endpoint() {
        let (channel, _rx) = QueueChannel::new(1);
        let cfg = Config {
            endpoint: "https://example.com/q".into(),
            ..Default::default()
        };

        let relay =
            compose(&cfg, Arc::new(StaticLocationProvider::unset()), Arc::new(channel)).unwrap();
        assert_eq!(relay.endpoint(), "https://example.com/q");
    }

    #[tokio::test]
    async fn loop_counts_failed_flows() {
        let (channel, _rx) = QueueChannel::new(4);
        let relay = compose(
            &Config::default(),
            Arc::new(StaticLocationProvider::unset()),
            Arc::new(channel),
        )
        .unwrap();
        let (tx, rx) = mpsc::channel(4);

        tx.send(Event::Ready).await.unwrap();
        tx.send(Event::InboundMessage(OutboundMessage::new())).await.unwrap();
        drop(tx);

        let summary = EventLoop::new(relay, rx).run().await;
        assert_eq!(
            summary,
            LoopSummary {
                flows: 2,
                succeeded: 0,
                failed: 2,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn each_refresh_tick_starts_a_flow() {
        let (channel, _rx) = QueueChannel::new(4);
        let relay = compose(
            &Config::default(),
            Arc::new(StaticLocationProvider::unset()),
            Arc::new(channel),
        )
        .unwrap();
        let (tx, rx) = mpsc::channel(16);
        let period = Duration::from_secs(300);

        let refresh = tokio::spawn(periodic_refresh(tx, period));
        time::sleep(period * 4 + Duration::from_secs(1)).await;
        refresh.abort();
        let _ = refresh.await;

        let summary = EventLoop::new(relay, rx).run().await;
        assert_eq!(summary.flows, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn no_refresh_before_first_period() {
        let (tx, mut rx) = mpsc::channel(4);
        let period = Duration::from_secs(300);

        let refresh = tokio::spawn(periodic_refresh(tx, period));
        time::sleep(period - Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(rx.try_recv(), Ok(Event::InboundMessage(_))));
        refresh.abort();
    }

    #[tokio::test]
    async fn refresh_stops_when_loop_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        tokio::time::timeout(
            Duration::from_secs(5),
            periodic_refresh(tx, Duration::from_millis(10)),
        )
        .await
        .expect("refresh should return once the receiver is dropped");
    }
}
