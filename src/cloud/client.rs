//! REST client for the device-management control plane.
//!
//! Wraps the handful of endpoints this crate drives: the notification
//! channel registration, resource subscriptions, and device requests.
//! Every call authenticates with the configured access key and checks
//! the response against the status the service documents for success,
//! so callers only see `Ok` when the control plane actually accepted
//! the operation.
//!
//! # Example
//!
//! ```no_run
//! use pelion_systest::{CloudClient, CloudConfig, DeviceId, DeviceRequest, AsyncId};
//!
//! # async fn example() -> pelion_systest::Result<()> {
//! let client = CloudClient::new(CloudConfig::from_env()?)?;
//! let device = DeviceId::new("0161661e9ce1000000000001001002b5");
//!
//! client.set_resource_subscription(&device, "/3303/0/5700").await?;
//! client
//!     .send_device_request(&device, &AsyncId::generate(), &DeviceRequest::get("/3303/0/5700"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::cloud::ControlPlane;
use crate::cloud::requests::{DeviceRequest, PreSubscription, RequestOptions};
use crate::config::CloudConfig;
use crate::error::{Error, Result};
use crate::identifiers::{ApiKey, AsyncId, DeviceId};

// ============================================================================
// Constants
// ============================================================================

/// Notification channel registration endpoint.
const CHANNEL_PATH: &str = "/v2/notification/websocket";

/// Subscription endpoints root.
const SUBSCRIPTIONS_PATH: &str = "/v2/subscriptions";

/// User agent presented to the control plane.
const USER_AGENT: &str = concat!("pelion-systest/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// CloudClient
// ============================================================================

/// Authenticated client for the control-plane REST API.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct CloudClient {
    config: CloudConfig,
    http: reqwest::Client,
}

// ============================================================================
// Constructors
// ============================================================================

impl CloudClient {
    /// Creates a client from a validated configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Http`] if the underlying HTTP client cannot be built.
    pub fn new(config: CloudConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { config, http })
    }

    /// Returns the configuration this client was built from.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    /// Resolves `path` against the API gateway.
    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.config.api_gateway().clone();
        url.set_path(path);
        url
    }

    /// Starts a request carrying the bearer credential.
    fn authorized(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTHORIZATION, self.config.api_key().bearer())
    }
}

// ============================================================================
// Notification Channel
// ============================================================================

impl CloudClient {
    /// Registers the account's notification channel.
    ///
    /// Replaces any existing channel registration for the key. The
    /// optional `configuration` object is sent as the registration body.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] when the key is rejected, otherwise
    /// [`Error::UnexpectedStatus`] for anything but `200`/`201`.
    pub async fn register_channel(&self, configuration: Option<&Value>) -> Result<()> {
        debug!("registering notification channel");
        let mut request = self.authorized(Method::PUT, self.endpoint(CHANNEL_PATH));
        if let Some(configuration) = configuration {
            request = request.json(configuration);
        }
        Self::expect(
            request,
            "register notification channel",
            &[StatusCode::OK, StatusCode::CREATED],
        )
        .await?;
        Ok(())
    }

    /// Reads the current notification channel registration.
    pub async fn channel_info(&self) -> Result<Value> {
        let request = self.authorized(Method::GET, self.endpoint(CHANNEL_PATH));
        let response =
            Self::expect(request, "read notification channel", &[StatusCode::OK]).await?;
        Ok(response.json().await?)
    }

    /// Removes the account's notification channel registration.
    pub async fn delete_channel(&self) -> Result<()> {
        debug!("deleting notification channel");
        let request = self.authorized(Method::DELETE, self.endpoint(CHANNEL_PATH));
        Self::expect(
            request,
            "delete notification channel",
            &[StatusCode::NO_CONTENT],
        )
        .await?;
        Ok(())
    }
}

// ============================================================================
// Device Requests
// ============================================================================

impl CloudClient {
    /// Sends an asynchronous request to a device.
    ///
    /// The device answers out of band; the response arrives on the
    /// notification channel keyed by `async_id`.
    pub async fn send_device_request(
        &self,
        device: &DeviceId,
        async_id: &AsyncId,
        request: &DeviceRequest,
    ) -> Result<()> {
        self.send_device_request_with(device, async_id, request, &RequestOptions::default())
            .await
    }

    /// Sends an asynchronous device request with delivery options.
    pub async fn send_device_request_with(
        &self,
        device: &DeviceId,
        async_id: &AsyncId,
        request: &DeviceRequest,
        options: &RequestOptions,
    ) -> Result<()> {
        debug!(
            device_id = %device,
            async_id = %async_id,
            method = %request.method,
            uri = %request.uri,
            "sending device request"
        );
        let url = self.endpoint(&format!("/v2/device-requests/{device}"));

        let mut params: Vec<(&str, String)> = vec![("async-id", async_id.to_string())];
        if let Some(retry) = options.retry_count {
            params.push(("retry", retry.to_string()));
        }
        if let Some(expiry) = options.expiry_seconds {
            params.push(("expiry-seconds", expiry.to_string()));
        }
        if let Some(reference) = &options.device_reference {
            params.push(("device_reference", reference.clone()));
        }

        let builder = self
            .authorized(Method::POST, url)
            .query(&params)
            .json(request);
        Self::expect(builder, "device request", &[StatusCode::ACCEPTED]).await?;
        Ok(())
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

impl CloudClient {
    /// Subscribes to value changes of one resource on one device.
    pub async fn set_resource_subscription(
        &self,
        device: &DeviceId,
        resource_path: &str,
    ) -> Result<()> {
        debug!(device_id = %device, resource_path, "subscribing to resource");
        let request = self.authorized(
            Method::PUT,
            self.subscription_endpoint(device, resource_path),
        );
        Self::expect(request, "set resource subscription", &[StatusCode::ACCEPTED]).await?;
        Ok(())
    }

    /// Removes the subscription of one resource on one device.
    pub async fn remove_resource_subscription(
        &self,
        device: &DeviceId,
        resource_path: &str,
    ) -> Result<()> {
        debug!(device_id = %device, resource_path, "removing resource subscription");
        let request = self.authorized(
            Method::DELETE,
            self.subscription_endpoint(device, resource_path),
        );
        Self::expect(
            request,
            "remove resource subscription",
            &[StatusCode::NO_CONTENT],
        )
        .await?;
        Ok(())
    }

    /// Replaces the account-wide pre-subscription rules.
    ///
    /// Rules apply to devices matching them at registration time, so
    /// they should be in place before the device under test registers.
    pub async fn set_pre_subscriptions(&self, rules: &[PreSubscription]) -> Result<()> {
        debug!(count = rules.len(), "setting pre-subscriptions");
        let request = self
            .authorized(Method::PUT, self.endpoint(SUBSCRIPTIONS_PATH))
            .json(rules);
        Self::expect(request, "set pre-subscriptions", &[StatusCode::NO_CONTENT]).await?;
        Ok(())
    }

    /// Removes all account-wide pre-subscription rules.
    pub async fn remove_pre_subscriptions(&self) -> Result<()> {
        debug!("removing pre-subscriptions");
        let request = self.authorized(Method::DELETE, self.endpoint(SUBSCRIPTIONS_PATH));
        Self::expect(
            request,
            "remove pre-subscriptions",
            &[StatusCode::NO_CONTENT],
        )
        .await?;
        Ok(())
    }

    /// The per-resource subscription endpoint, leading slash normalized.
    fn subscription_endpoint(&self, device: &DeviceId, resource_path: &str) -> Url {
        let path = resource_path.trim_start_matches('/');
        self.endpoint(&format!("{SUBSCRIPTIONS_PATH}/{device}/{path}"))
    }
}

// ============================================================================
// Status Validation
// ============================================================================

impl CloudClient {
    /// Sends the request and checks the status against `expected`.
    async fn expect(
        request: RequestBuilder,
        operation: &'static str,
        expected: &[StatusCode],
    ) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if expected.contains(&status) {
            debug!(operation, status = status.as_u16(), "control-plane call ok");
            return Ok(response);
        }

        warn!(operation, status = status.as_u16(), "control-plane call failed");
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(Error::unauthorized(format!(
                "{operation} rejected with status {status}"
            )));
        }
        Err(Error::unexpected_status(operation, status.as_u16()))
    }
}

// ============================================================================
// ControlPlane
// ============================================================================

#[async_trait]
impl ControlPlane for CloudClient {
    async fn register_notification_channel(&self, configuration: Option<&Value>) -> Result<()> {
        self.register_channel(configuration).await
    }

    async fn delete_notification_channel(&self) -> Result<()> {
        self.delete_channel().await
    }

    fn notification_socket_url(&self) -> Url {
        self.config.notification_socket_url()
    }

    fn api_key(&self) -> &ApiKey {
        self.config.api_key()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::testutil::{HttpMock, http_mock};

    fn client_for(mock: &HttpMock) -> CloudClient {
        let config = CloudConfig::builder()
            .api_gateway(mock.url.as_str())
            .api_key("ak_test")
            .build()
            .unwrap();
        CloudClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_register_channel_sends_authorized_put() {
        let mock = http_mock(200, "{}").await;
        let client = client_for(&mock);

        client.register_channel(None).await.unwrap();

        let requests = mock.requests.lock();
        assert_eq!(requests.len(), 1);
        assert!(
            requests[0]
                .line()
                .starts_with("PUT /v2/notification/websocket")
        );
        assert!(requests[0].has_header("authorization: bearer ak_test"));
        assert!(requests[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_register_channel_forwards_configuration() {
        let mock = http_mock(201, "").await;
        let client = client_for(&mock);
        let configuration = json!({ "serialization": { "max_chunk_size": 100 } });

        client
            .register_channel(Some(&configuration))
            .await
            .unwrap();

        let requests = mock.requests.lock();
        assert!(requests[0].has_header("content-type: application/json"));
        assert!(requests[0].body.contains("max_chunk_size"));
    }

    #[tokio::test]
    async fn test_register_channel_unexpected_status() {
        let mock = http_mock(500, "boom").await;
        let client = client_for(&mock);

        let err = client.register_channel(None).await.unwrap_err();
        assert!(err.to_string().contains("500"));
        assert!(!err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_register_channel_unauthorized() {
        let mock = http_mock(401, "").await;
        let client = client_for(&mock);

        let err = client.register_channel(None).await.unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_channel_info_parses_body() {
        let mock = http_mock(200, r#"{"channel-id": 7}"#).await;
        let client = client_for(&mock);

        let info = client.channel_info().await.unwrap();
        assert_eq!(info["channel-id"], 7);

        let requests = mock.requests.lock();
        assert!(
            requests[0]
                .line()
                .starts_with("GET /v2/notification/websocket")
        );
    }

    #[tokio::test]
    async fn test_delete_channel_expects_no_content() {
        let mock = http_mock(204, "").await;
        let client = client_for(&mock);

        client.delete_channel().await.unwrap();

        let requests = mock.requests.lock();
        assert!(
            requests[0]
                .line()
                .starts_with("DELETE /v2/notification/websocket")
        );
    }

    #[tokio::test]
    async fn test_device_request_url_and_body() {
        let mock = http_mock(202, "").await;
        let client = client_for(&mock);
        let device = DeviceId::from("device-1");
        let async_id = AsyncId::from("req-1");

        client
            .send_device_request(&device, &async_id, &DeviceRequest::get("/3303/0/5700"))
            .await
            .unwrap();

        let requests = mock.requests.lock();
        assert!(
            requests[0]
                .line()
                .starts_with("POST /v2/device-requests/device-1?async-id=req-1")
        );
        assert!(requests[0].body.contains(r#""method":"GET""#));
        assert!(requests[0].body.contains("payload-b64"));
    }

    #[tokio::test]
    async fn test_device_request_delivery_options() {
        let mock = http_mock(202, "").await;
        let client = client_for(&mock);
        let device = DeviceId::from("device-1");
        let options = RequestOptions {
            retry_count: Some(3),
            expiry_seconds: Some(120),
            device_reference: None,
        };

        client
            .send_device_request_with(
                &device,
                &AsyncId::from("req-2"),
                &DeviceRequest::get("/3/0/0"),
                &options,
            )
            .await
            .unwrap();

        let requests = mock.requests.lock();
        let line = requests[0].line();
        assert!(line.contains("async-id=req-2"));
        assert!(line.contains("retry=3"));
        assert!(line.contains("expiry-seconds=120"));
    }

    #[tokio::test]
    async fn test_resource_subscription_strips_leading_slash() {
        let mock = http_mock(202, "").await;
        let client = client_for(&mock);
        let device = DeviceId::from("device-1");

        client
            .set_resource_subscription(&device, "/3303/0/5700")
            .await
            .unwrap();

        let requests = mock.requests.lock();
        assert!(
            requests[0]
                .line()
                .starts_with("PUT /v2/subscriptions/device-1/3303/0/5700")
        );
    }

    #[tokio::test]
    async fn test_remove_resource_subscription() {
        let mock = http_mock(204, "").await;
        let client = client_for(&mock);
        let device = DeviceId::from("device-1");

        client
            .remove_resource_subscription(&device, "3303/0/5700")
            .await
            .unwrap();

        let requests = mock.requests.lock();
        assert!(
            requests[0]
                .line()
                .starts_with("DELETE /v2/subscriptions/device-1/3303/0/5700")
        );
    }

    #[tokio::test]
    async fn test_pre_subscription_body_shape() {
        let mock = http_mock(204, "").await;
        let client = client_for(&mock);

        client
            .set_pre_subscriptions(&[PreSubscription::resource_path("/3303/0/5700")])
            .await
            .unwrap();

        let requests = mock.requests.lock();
        assert!(requests[0].line().starts_with("PUT /v2/subscriptions"));
        assert_eq!(requests[0].body, r#"[{"resource-path":["/3303/0/5700"]}]"#);
    }

    #[tokio::test]
    async fn test_remove_pre_subscriptions() {
        let mock = http_mock(204, "").await;
        let client = client_for(&mock);

        client.remove_pre_subscriptions().await.unwrap();

        let requests = mock.requests.lock();
        assert!(requests[0].line().starts_with("DELETE /v2/subscriptions"));
    }
}
