use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::{Confirm, CustomType, Text};
use relay_core::{
    CachedLocationProvider, Config, Event, EventLoop, LocationProvider, OutboundMessage,
    QueueChannel, StaticLocationProvider, channel::Delivered, compose, periodic_refresh,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::JoinHandle,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "relay", version, about = "Fetch a quote and relay it to the device")]
pub struct Cli {
    /// Override the configured endpoint for this run.
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively edit and save the configuration.
    Configure,

    /// Print the config file location and its contents.
    ShowConfig,

    /// Fire a single ready event and exit.
    Once,

    /// Fire a ready event, then one inbound-message event per stdin line and
    /// one per refresh period, until stdin closes.
    Run {
        /// Seconds between periodic refreshes; 0 disables them.
        #[arg(long, default_value_t = 300)]
        every: u64,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::ShowConfig => {
                let cfg = Config::load()?;
                println!("# {}", Config::config_file_path()?.display());
                print!("{}", toml::to_string_pretty(&cfg)?);
                Ok(())
            }
            Command::Once => {
                let cfg = load_config(self.endpoint)?;
                let (channel, rx) = QueueChannel::new(16);
                let device = spawn_device(rx);

                let relay = compose(&cfg, location_provider(&cfg), Arc::new(channel))?;
                let result = relay.on_ready().await;
                drop(relay);
                device.await?;

                result.map(|_| ()).context("Relay flow failed")
            }
            Command::Run { every } => {
                let cfg = load_config(self.endpoint)?;
                let (channel, rx) = QueueChannel::new(16);
                let device = spawn_device(rx);

                let relay = compose(&cfg, location_provider(&cfg), Arc::new(channel))?;
                let (tx, events) = mpsc::channel(16);
                tx.send(Event::Ready).await?;

                let refresh = (every > 0).then(|| {
                    tokio::spawn(periodic_refresh(tx.clone(), Duration::from_secs(every)))
                });
                let event_loop = tokio::spawn(EventLoop::new(relay, events).run());

                forward_stdin(tx).await;
                if let Some(refresh) = refresh {
                    refresh.abort();
                }

                let summary = event_loop.await?;
                device.await?;

                eprintln!(
                    "{} flows: {} delivered, {} failed",
                    summary.flows, summary.succeeded, summary.failed
                );
                Ok(())
            }
        }
    }
}

fn load_config(endpoint: Option<String>) -> anyhow::Result<Config> {
    let mut cfg = Config::load()?;
    if let Some(endpoint) = endpoint {
        cfg.endpoint = endpoint;
    }
    Ok(cfg)
}

fn location_provider(cfg: &Config) -> Arc<dyn LocationProvider> {
    match cfg.fixed_coordinates() {
        Some((lat, lon)) => {
            Arc::new(CachedLocationProvider::new(StaticLocationProvider::new(lat, lon)))
        }
        None => {
            tracing::warn!("no location configured; every flow will stop at the location step");
            tracing::warn!("hint: run `relay configure` and enter fixed coordinates");
            Arc::new(StaticLocationProvider::unset())
        }
    }
}

/// The device end: print every delivered message as a JSON line keyed by
/// the device's numeric ids.
fn spawn_device(mut rx: mpsc::Receiver<Delivered>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(delivered) = rx.recv().await {
            match render(&delivered.message) {
                Ok(json) => println!("{json}"),
                Err(err) => tracing::error!(
                    transaction_id = delivered.transaction_id,
                    error = %err,
                    "failed to render message"
                ),
            }
        }
    })
}

fn render(message: &OutboundMessage) -> anyhow::Result<String> {
    let by_id = message.to_app_keys()?;
    serde_json::to_string(&by_id).context("Failed to serialize message")
}

async fn forward_stdin(tx: mpsc::Sender<Event>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(inbound_event(&line)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::error!(error = %err, "failed to read stdin");
                break;
            }
        }
    }
}

/// A stdin line becomes an inbound message; non-JSON lines carry no content.
fn inbound_event(line: &str) -> Event {
    let message = serde_json::from_str::<OutboundMessage>(line.trim()).unwrap_or_default();
    Event::InboundMessage(message)
}

fn configure() -> anyhow::Result<()> {
    let mut cfg = Config::load()?;

    let endpoint = Text::new("Endpoint URL:").with_default(&cfg.endpoint).prompt()?;
    let preamble_len = CustomType::<usize>::new("Preamble length (characters):")
        .with_default(cfg.preamble_len)
        .prompt()?;
    let value_field = Text::new("Numeric field:").with_default(&cfg.value_field).prompt()?;
    let label_field = Text::new("Label field:").with_default(&cfg.label_field).prompt()?;

    cfg.endpoint = endpoint;
    cfg.preamble_len = preamble_len;
    cfg.value_field = value_field;
    cfg.label_field = label_field;

    let (lat, lon) = cfg.fixed_coordinates().unwrap_or_default();
    let use_fixed = Confirm::new("Use fixed coordinates?")
        .with_default(cfg.fixed_coordinates().is_some())
        .prompt()?;

    if use_fixed {
        let lat = CustomType::<f64>::new("Latitude:").with_default(lat).prompt()?;
        let lon = CustomType::<f64>::new("Longitude:").with_default(lon).prompt()?;
        cfg.location.latitude = Some(lat);
        cfg.location.longitude = Some(lon);
    } else {
        cfg.location.latitude = None;
        cfg.location.longitude = None;
    }

    cfg.validate()?;
    cfg.save()?;
    println!("Saved {}", Config::config_file_path()?.display());
    Ok(())
}
