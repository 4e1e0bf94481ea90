//! Cloud configuration and endpoint derivation.
//!
//! [`CloudConfig`] carries the API gateway address and access key shared by
//! every collaborator in this crate, and derives the streaming endpoint
//! URLs from the gateway address.
//!
//! # Example
//!
//! ```no_run
//! use pelion_systest::CloudConfig;
//!
//! # fn example() -> pelion_systest::Result<()> {
//! let config = CloudConfig::builder()
//!     .api_gateway("https://api.us-east-1.mbedcloud.com")
//!     .api_key("ak_1MDE...")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{ApiKey, DeviceId};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for control-plane REST calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Well-known path of the notification streaming endpoint.
const NOTIFICATION_CONNECT_PATH: &str = "/v2/notification/websocket-connect";

/// Environment variable naming the API gateway address.
const ENV_API_GATEWAY: &str = "PELION_API_GW";

/// Environment variable naming the access key.
const ENV_API_KEY: &str = "PELION_API_KEY";

/// Environment variable overriding the REST timeout, in seconds.
const ENV_REQUEST_TIMEOUT: &str = "PELION_REST_TIMEOUT";

// ============================================================================
// CloudConfig
// ============================================================================

/// Validated cloud access configuration.
///
/// Shared by the control-plane client, the notification channel and the
/// remote terminal. Streaming URLs are derived from the gateway address by
/// swapping the scheme to its streaming counterpart (`https` becomes
/// `wss`, `http` becomes `ws`) and attaching the well-known path.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// HTTP address of the API gateway.
    api_gateway: Url,
    /// Access key for REST and streaming authentication.
    api_key: ApiKey,
    /// Timeout applied to individual REST calls.
    request_timeout: Duration,
}

impl CloudConfig {
    /// Creates a builder for a cloud configuration.
    #[inline]
    #[must_use]
    pub fn builder() -> CloudConfigBuilder {
        CloudConfigBuilder::new()
    }

    /// Loads the configuration from the environment.
    ///
    /// Reads `PELION_API_GW` and `PELION_API_KEY` (both required) and the
    /// optional `PELION_REST_TIMEOUT` override in seconds.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_env_parts(
            env::var(ENV_API_GATEWAY).ok(),
            env::var(ENV_API_KEY).ok(),
            env::var(ENV_REQUEST_TIMEOUT).ok(),
        )
    }

    /// Builds a configuration from raw environment values.
    fn from_env_parts(
        gateway: Option<String>,
        api_key: Option<String>,
        timeout: Option<String>,
    ) -> Result<Self> {
        let gateway = gateway
            .ok_or_else(|| Error::config(format!("{ENV_API_GATEWAY} is not set")))?;
        let api_key =
            api_key.ok_or_else(|| Error::config(format!("{ENV_API_KEY} is not set")))?;

        let mut builder = Self::builder().api_gateway(gateway).api_key(api_key);
        if let Some(secs) = timeout {
            let secs: u64 = secs.parse().map_err(|_| {
                Error::config(format!("{ENV_REQUEST_TIMEOUT} is not a number: {secs}"))
            })?;
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// Returns the API gateway address.
    #[inline]
    #[must_use]
    pub fn api_gateway(&self) -> &Url {
        &self.api_gateway
    }

    /// Returns the access key.
    #[inline]
    #[must_use]
    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    /// Returns the REST call timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the streaming URL of the notification socket.
    #[must_use]
    pub fn notification_socket_url(&self) -> Url {
        self.streaming_url(NOTIFICATION_CONNECT_PATH)
    }

    /// Returns the streaming URL of a device's remote terminal console.
    #[must_use]
    pub fn console_url(&self, device_id: &DeviceId) -> Url {
        self.streaming_url(&format!("/v3alpha/devices/{device_id}/console"))
    }

    /// Derives a streaming URL from the gateway address.
    fn streaming_url(&self, path: &str) -> Url {
        let mut url = self.api_gateway.clone();
        let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
        // Both sides are "special" schemes, so this cannot fail.
        let _ = url.set_scheme(scheme);
        url.set_path(path);
        url.set_query(None);
        url
    }
}

// ============================================================================
// CloudConfigBuilder
// ============================================================================

/// Builder for a [`CloudConfig`].
///
/// Use [`CloudConfig::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct CloudConfigBuilder {
    /// Gateway address as given, validated in [`build`](Self::build).
    api_gateway: Option<String>,
    /// Access key.
    api_key: Option<ApiKey>,
    /// REST call timeout override.
    request_timeout: Option<Duration>,
}

impl CloudConfigBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API gateway address.
    ///
    /// # Arguments
    ///
    /// * `url` - Gateway address (e.g., "https://api.us-east-1.mbedcloud.com")
    #[inline]
    #[must_use]
    pub fn api_gateway(mut self, url: impl Into<String>) -> Self {
        self.api_gateway = Some(url.into());
        self
    }

    /// Sets the access key.
    #[inline]
    #[must_use]
    pub fn api_key(mut self, key: impl Into<ApiKey>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the timeout for individual REST calls.
    ///
    /// Defaults to [`DEFAULT_REQUEST_TIMEOUT`].
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the gateway or key is not set
    /// - [`Error::Config`] if the gateway address does not parse or uses a
    ///   scheme other than `http`/`https`
    pub fn build(self) -> Result<CloudConfig> {
        let api_gateway = self.validate_gateway()?;
        let api_key = self.api_key.ok_or_else(|| {
            Error::config("api key is required. Use .api_key() to set it.")
        })?;

        Ok(CloudConfig {
            api_gateway,
            api_key,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

impl CloudConfigBuilder {
    /// Validates the gateway address.
    fn validate_gateway(&self) -> Result<Url> {
        let raw = self.api_gateway.as_deref().ok_or_else(|| {
            Error::config("api gateway is required. Use .api_gateway() to set it.")
        })?;

        let url = Url::parse(raw)
            .map_err(|err| Error::config(format!("invalid api gateway {raw:?}: {err}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "api gateway scheme must be http or https, got {:?}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(Error::config(format!("api gateway {raw:?} has no host")));
        }

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================
