use std::fmt::Debug;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    error::LocationError,
    model::{LocationFix, LocationOptions},
};

/// Single-shot position query offered by the host platform.
#[async_trait]
pub trait LocationProvider: Send + Sync + Debug {
    async fn current_position(
        &self,
        options: &LocationOptions,
    ) -> Result<LocationFix, LocationError>;
}

/// Query `provider`, giving up once `options.timeout` has elapsed.
pub async fn acquire_location(
    provider: &dyn LocationProvider,
    options: &LocationOptions,
) -> Result<LocationFix, LocationError> {
    match tokio::time::timeout(options.timeout, provider.current_position(options)).await {
        Ok(result) => result,
        Err(_) => Err(LocationError::Timeout(options.timeout)),
    }
}

/// Provider backed by fixed coordinates, e.g. from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticLocationProvider {
    coords: Option<(f64, f64)>,
}

impl StaticLocationProvider {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            coords: Some((latitude, longitude)),
        }
    }

    /// A provider with no position; every query fails as unavailable.
    pub fn unset() -> Self {
        Self { coords: None }
    }
}

#[async_trait]
impl LocationProvider for StaticLocationProvider {
    async fn current_position(
        &self,
        _options: &LocationOptions,
    ) -> Result<LocationFix, LocationError> {
        let (latitude, longitude) = self.coords.ok_or_else(|| {
            LocationError::Unavailable("no coordinates configured".to_string())
        })?;
        Ok(LocationFix::new(latitude, longitude))
    }
}

/// Reuses the last fix while it is younger than `max_age`.
#[derive(Debug)]
pub struct CachedLocationProvider<P> {
    inner: P,
    last: Mutex<Option<LocationFix>>,
}

impl<P: LocationProvider> CachedLocationProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<P: LocationProvider> LocationProvider for CachedLocationProvider<P> {
    async fn current_position(
        &self,
        options: &LocationOptions,
    ) -> Result<LocationFix, LocationError> {
        let cached = *self.last.lock().await;
        if let Some(fix) = cached {
            let age = fix.age(Utc::now());
            if age < options.max_age {
                tracing::debug!(?age, "reusing cached location fix");
                return Ok(fix);
            }
        }

        let fix = self.inner.current_position(options).await?;
        *self.last.lock().await = Some(fix);
        Ok(fix)
    }
}
