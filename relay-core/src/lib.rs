//! Core library for the data relay.
//!
//! This crate defines:
//! - Configuration handling
//! - The request/parse/send flow and its platform seams (location, HTTP, outbound channel)
//! - Shared domain models (location fixes, payloads, outbound messages)
//!
//! It is used by `relay-cli`, but can also be embedded in other hosts.

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod location;
pub mod model;
pub mod payload;
pub mod relay;

pub use channel::{OutboundChannel, QueueChannel, SendAck, SendFailure};
pub use config::Config;
pub use error::{LocationError, MalformedResponse, RelayError};
pub use events::{Event, EventLoop, LoopSummary, compose, periodic_refresh};
pub use fetch::{Fetcher, HttpFetcher};
pub use location::{CachedLocationProvider, LocationProvider, StaticLocationProvider};
pub use model::{
    KEY_CONDITIONS, KEY_TEMPERATURE, LocationFix, LocationOptions, MessageValue, OutboundMessage,
    Payload, Trigger,
};
pub use payload::{ExtractOptions, extract_payload};
pub use relay::{DataRelay, FlowReport};
