use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::location::{Coordinates, FALLBACK_COORDINATES};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const API_URL_ENV: &str = "FIND_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Timeouts {
    pub request_secs: Option<u64>,
    pub location_secs: Option<u64>,
}

/// One layer of client configuration. Unset fields fall through to the next
/// layer down.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClientSettings {
    pub api_url: Option<String>,
    pub timeouts: Option<Timeouts>,
    pub fallback: Option<Coordinates>,
}

impl ClientSettings {
    pub fn defaults() -> Self {
        Self {
            api_url: Some(DEFAULT_API_URL.into()),
            timeouts: Some(Timeouts {
                request_secs: Some(30),
                location_secs: Some(5),
            }),
            fallback: Some(FALLBACK_COORDINATES),
        }
    }

    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var(API_URL_ENV).ok().filter(|v| !v.trim().is_empty()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    pub api_url: Url,
    pub request_timeout: Duration,
    pub location_timeout: Duration,
    pub fallback: Coordinates,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("no api url configured")]
    MissingApiUrl,
    #[error("invalid api url {url:?}: {source}")]
    InvalidApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Layers are consulted highest first: `cli`, then `env`, then `defaults`.
pub fn resolve_effective_settings(
    defaults: &ClientSettings,
    env: &ClientSettings,
    cli: &ClientSettings,
) -> Result<EffectiveSettings, SettingsError> {
    let raw_url = cli
        .api_url
        .clone()
        .or_else(|| env.api_url.clone())
        .or_else(|| defaults.api_url.clone())
        .ok_or(SettingsError::MissingApiUrl)?;
    let api_url = parse_base_url(&raw_url)?;

    let request_secs = cli
        .timeouts
        .as_ref()
        .and_then(|t| t.request_secs)
        .or_else(|| env.timeouts.as_ref().and_then(|t| t.request_secs))
        .or_else(|| defaults.timeouts.as_ref().and_then(|t| t.request_secs))
        .unwrap_or(30);
    let location_secs = cli
        .timeouts
        .as_ref()
        .and_then(|t| t.location_secs)
        .or_else(|| env.timeouts.as_ref().and_then(|t| t.location_secs))
        .or_else(|| defaults.timeouts.as_ref().and_then(|t| t.location_secs))
        .unwrap_or(5);

    let fallback = cli
        .fallback
        .or(env.fallback)
        .or(defaults.fallback)
        .unwrap_or(FALLBACK_COORDINATES);

    Ok(EffectiveSettings {
        api_url,
        request_timeout: Duration::from_secs(request_secs),
        location_timeout: Duration::from_secs(location_secs),
        fallback,
    })
}

// `Url::join` drops the last path segment unless the base ends with a slash.
fn parse_base_url(raw: &str) -> Result<Url, SettingsError> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized).map_err(|source| SettingsError::InvalidApiUrl {
        url: raw.to_string(),
        source,
    })
}
