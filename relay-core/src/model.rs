use std::{collections::BTreeMap, fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message key carrying the numeric value.
pub const KEY_TEMPERATURE: &str = "KEY_TEMPERATURE";
/// Message key carrying the label.
pub const KEY_CONDITIONS: &str = "KEY_CONDITIONS";

/// Usable bytes of the device-side conditions buffer (32 bytes incl. NUL).
pub const CONDITIONS_MAX_BYTES: usize = 31;

/// A single geolocation reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
    pub acquired_at: DateTime<Utc>,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: None,
            acquired_at: Utc::now(),
        }
    }

    /// Age of the fix relative to `now`. A fix from the future counts as fresh.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.acquired_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Acquisition bounds for a geolocation query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationOptions {
    pub timeout: Duration,
    pub max_age: Duration,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(15_000),
            max_age: Duration::from_millis(60_000),
        }
    }
}

/// The two values extracted from a response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub temperature: f64,
    pub conditions: String,
}

/// Which event started a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Ready,
    InboundMessage,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Ready => "ready",
            Trigger::InboundMessage => "appmessage",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric ids the device uses to address message keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppKey {
    Temperature,
    Conditions,
}

impl AppKey {
    pub fn id(&self) -> u32 {
        match self {
            AppKey::Temperature => 0,
            AppKey::Conditions => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AppKey::Temperature => KEY_TEMPERATURE,
            AppKey::Conditions => KEY_CONDITIONS,
        }
    }

    pub const fn all() -> &'static [AppKey] {
        &[AppKey::Temperature, AppKey::Conditions]
    }
}

impl TryFrom<&str> for AppKey {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        AppKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == value)
            .ok_or_else(|| anyhow::anyhow!("Unknown message key '{value}'"))
    }
}

/// A scalar value in an outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageValue {
    Int(i64),
    Number(f64),
    Text(String),
}

impl From<f64> for MessageValue {
    fn from(value: f64) -> Self {
        MessageValue::Number(value)
    }
}

impl From<i64> for MessageValue {
    fn from(value: i64) -> Self {
        MessageValue::Int(value)
    }
}

impl From<&str> for MessageValue {
    fn from(value: &str) -> Self {
        MessageValue::Text(value.to_string())
    }
}

impl From<String> for MessageValue {
    fn from(value: String) -> Self {
        MessageValue::Text(value)
    }
}

/// Flat string-keyed mapping handed to the outbound channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboundMessage(BTreeMap<String, MessageValue>);

impl OutboundMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the two-key message for a payload.
    pub fn from_payload(payload: &Payload) -> Self {
        let mut msg = Self::new();
        msg.insert(KEY_TEMPERATURE, payload.temperature);
        msg.insert(KEY_CONDITIONS, truncate_utf8(&payload.conditions, CONDITIONS_MAX_BYTES));
        msg
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MessageValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MessageValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MessageValue)> {
        self.0.iter()
    }

    /// The same message keyed by the device's numeric ids.
    pub fn to_app_keys(&self) -> anyhow::Result<BTreeMap<u32, MessageValue>> {
        self.0
            .iter()
            .map(|(name, value)| Ok((AppKey::try_from(name.as_str())?.id(), value.clone())))
            .collect()
    }
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
