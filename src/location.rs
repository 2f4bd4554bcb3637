use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Bucharest city center.
pub const FALLBACK_COORDINATES: Coordinates = Coordinates {
    latitude: 44.4268,
    longitude: 26.1025,
};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("location capability unavailable")]
    Unavailable,
    #[error("location permission denied")]
    Denied,
    #[error("location request timed out after {0:?}")]
    Timeout(Duration),
}

/// A device location capability. Implementations may honour `timeout`
/// themselves; callers bound the wait regardless.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self, timeout: Duration) -> Result<Coordinates, LocationError>;
}

/// No location hardware or permission to ask for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDeviceLocation;

#[async_trait]
impl LocationProvider for NoDeviceLocation {
    async fn current_position(&self, _timeout: Duration) -> Result<Coordinates, LocationError> {
        Err(LocationError::Unavailable)
    }
}

/// The user declined to share their position.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclinedLocation;

#[async_trait]
impl LocationProvider for DeclinedLocation {
    async fn current_position(&self, _timeout: Duration) -> Result<Coordinates, LocationError> {
        Err(LocationError::Denied)
    }
}

/// Reports a position supplied up front, e.g. from the command line.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinates);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self, _timeout: Duration) -> Result<Coordinates, LocationError> {
        Ok(self.0)
    }
}

/// Asks `provider` for a position, waiting at most `timeout`. Never fails:
/// any error or expiry resolves to `fallback`.
pub async fn locate_or_fallback(
    provider: &dyn LocationProvider,
    timeout: Duration,
    fallback: Coordinates,
) -> Coordinates {
    let outcome = match tokio::time::timeout(timeout, provider.current_position(timeout)).await {
        Ok(res) => res,
        Err(_) => Err(LocationError::Timeout(timeout)),
    };
    match outcome {
        Ok(coords) => coords,
        Err(err) => {
            tracing::debug!(error = %err, "using fallback coordinates");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverAnswers;

    #[async_trait]
    impl LocationProvider for NeverAnswers {
        async fn current_position(&self, _timeout: Duration) -> Result<Coordinates, LocationError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn device_position_is_used_when_available() {
        let here = Coordinates { latitude: 46.77, longitude: 23.59 };
        let t = Duration::from_secs(5);
        let got = locate_or_fallback(&FixedLocation(here), t, FALLBACK_COORDINATES).await;
        assert_eq!(got, here);
    }

    #[tokio::test]
    async fn unavailable_and_denied_fall_back() {
        let t = Duration::from_secs(5);
        let absent = locate_or_fallback(&NoDeviceLocation, t, FALLBACK_COORDINATES).await;
        let declined = locate_or_fallback(&DeclinedLocation, t, FALLBACK_COORDINATES).await;
        assert_eq!(absent, FALLBACK_COORDINATES);
        assert_eq!(declined, FALLBACK_COORDINATES);
        assert_eq!(
            DeclinedLocation.current_position(t).await,
            Err(LocationError::Denied)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_to_fallback() {
        let t = Duration::from_secs(5);
        let got = locate_or_fallback(&NeverAnswers, t, FALLBACK_COORDINATES).await;
        assert_eq!(got, FALLBACK_COORDINATES);
        assert_eq!(FALLBACK_COORDINATES.latitude, 44.4268);
        assert_eq!(FALLBACK_COORDINATES.longitude, 26.1025);
    }
}
