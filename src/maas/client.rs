//! MAAS API client implementation.
//!
//! This module provides the HTTP client for the MAAS REST API. Requests are
//! authenticated with an OAuth 1.0 PLAINTEXT signature derived from the
//! API key.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode, header};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::MaasConfig;
use crate::error::{MaasError, NetifError, Result};
use crate::params::{BridgeParams, VlanParams};

use super::api::MaasApi;
use super::types::{Fabric, Machine, NetworkInterface, PowerParameters, Vlan};

/// Delay between read retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// MAAS API client.
#[derive(Debug, Clone)]
pub struct MaasClient {
    /// HTTP client.
    client: Client,
    /// `<url>/api/<version>` without trailing slash.
    api_root: String,
    /// OAuth credentials.
    credentials: Credentials,
    /// Retries for idempotent reads.
    max_retries: u32,
}

/// The three parts of a MAAS API key.
#[derive(Clone)]
struct Credentials {
    consumer_key: String,
    token_key: String,
    token_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("token_key", &"(sensitive)")
            .field("token_secret", &"(sensitive)")
            .finish()
    }
}

impl Credentials {
    /// Parses `consumer:token:secret`.
    fn parse(api_key: &str) -> Result<Self> {
        let parts: Vec<&str> = api_key.trim().split(':').collect();
        match parts.as_slice() {
            [consumer, token, secret]
                if !consumer.is_empty() && !token.is_empty() && !secret.is_empty() =>
            {
                Ok(Self {
                    consumer_key: (*consumer).to_string(),
                    token_key: (*token).to_string(),
                    token_secret: (*secret).to_string(),
                })
            }
            _ => Err(NetifError::Maas(MaasError::MalformedApiKey)),
        }
    }

    /// Builds the `Authorization` header value for one request.
    fn authorization(&self) -> String {
        let nonce = Uuid::new_v4();
        let timestamp = chrono::Utc::now().timestamp();
        format!(
            "OAuth oauth_version=\"1.0\", oauth_signature_method=\"PLAINTEXT\", \
             oauth_consumer_key=\"{}\", oauth_token=\"{}\", oauth_signature=\"&{}\", \
             oauth_nonce=\"{nonce}\", oauth_timestamp=\"{timestamp}\"",
            self.consumer_key, self.token_key, self.token_secret
        )
    }
}

impl MaasClient {
    /// Creates a new MAAS API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is malformed or the HTTP client
    /// cannot be created.
    pub fn new(config: &MaasConfig, api_key: &str) -> Result<Self> {
        let credentials = Credentials::parse(api_key)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MaasError::network(format!("Failed to create HTTP client: {e}")))?;

        let api_root = format!(
            "{}/api/{}",
            config.url.trim_end_matches('/'),
            config.api_version.trim_matches('/')
        );

        Ok(Self {
            client,
            api_root,
            credentials,
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.api_root)
    }

    /// Issues a GET, retrying transport failures.
    async fn get<T: DeserializeOwned>(&self, path: &str, op: Option<&str>) -> Result<T> {
        let mut attempt = 0;

        loop {
            match self.send_once(Method::GET, path, op, None).await {
                Ok(response) => return Self::decode(response).await,
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!("Retry attempt {attempt} of {} for {path}", self.max_retries);
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Issues a mutation exactly once.
    async fn mutate<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        op: Option<&str>,
        form: &[(&'static str, String)],
    ) -> Result<T> {
        let response = self.send_once(method, path, op, Some(form)).await?;
        Self::decode(response).await
    }

    /// Executes a single request and maps HTTP failures.
    async fn send_once(
        &self,
        method: Method,
        path: &str,
        op: Option<&str>,
        form: Option<&[(&'static str, String)]>,
    ) -> Result<Response> {
        trace!("{method} {path} op={op:?}");

        let mut request = self
            .client
            .request(method, self.endpoint(path))
            .header(header::AUTHORIZATION, self.credentials.authorization())
            .header(header::ACCEPT, "application/json");

        if let Some(op) = op {
            request = request.query(&[("op", op)]);
        }
        if let Some(form) = form {
            request = request.form(form);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MaasError::network(format!("Request failed: {e}")))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(NetifError::Maas(MaasError::NotFound {
                resource: path.to_string(),
            }));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(NetifError::Maas(MaasError::AuthenticationFailed {
                message: if body.is_empty() {
                    String::from("Invalid API key")
                } else {
                    body
                },
            }));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetifError::Maas(MaasError::api_error(status.as_u16(), body)));
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        response.json().await.map_err(|e| {
            NetifError::Maas(MaasError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            })
        })
    }
}

#[async_trait]
impl MaasApi for MaasClient {
    async fn list_machines(&self) -> Result<Vec<Machine>> {
        self.get("machines/", None).await
    }

    async fn get_power_parameters(&self, system_id: &str) -> Result<PowerParameters> {
        self.get(&format!("machines/{system_id}/"), Some("power_parameters"))
            .await
    }

    async fn list_interfaces(&self, system_id: &str) -> Result<Vec<NetworkInterface>> {
        self.get(&format!("nodes/{system_id}/interfaces/"), None).await
    }

    async fn get_interface(&self, system_id: &str, interface_id: i64) -> Result<NetworkInterface> {
        self.get(&format!("nodes/{system_id}/interfaces/{interface_id}/"), None)
            .await
    }

    async fn create_bridge(
        &self,
        system_id: &str,
        params: &BridgeParams,
    ) -> Result<NetworkInterface> {
        self.mutate(
            Method::POST,
            &format!("nodes/{system_id}/interfaces/"),
            Some("create_bridge"),
            &params.to_form(),
        )
        .await
    }

    async fn create_vlan(&self, system_id: &str, params: &VlanParams) -> Result<NetworkInterface> {
        self.mutate(
            Method::POST,
            &format!("nodes/{system_id}/interfaces/"),
            Some("create_vlan"),
            &params.to_form(),
        )
        .await
    }

    async fn update_bridge(
        &self,
        system_id: &str,
        interface_id: i64,
        params: &BridgeParams,
    ) -> Result<NetworkInterface> {
        self.mutate(
            Method::PUT,
            &format!("nodes/{system_id}/interfaces/{interface_id}/"),
            None,
            &params.to_form(),
        )
        .await
    }

    async fn update_vlan(
        &self,
        system_id: &str,
        interface_id: i64,
        params: &VlanParams,
    ) -> Result<NetworkInterface> {
        self.mutate(
            Method::PUT,
            &format!("nodes/{system_id}/interfaces/{interface_id}/"),
            None,
            &params.to_form(),
        )
        .await
    }

    async fn delete_interface(&self, system_id: &str, interface_id: i64) -> Result<()> {
        self.send_once(
            Method::DELETE,
            &format!("nodes/{system_id}/interfaces/{interface_id}/"),
            None,
            None,
        )
        .await?;
        Ok(())
    }

    async fn list_fabrics(&self) -> Result<Vec<Fabric>> {
        self.get("fabrics/", None).await
    }

    async fn list_vlans(&self, fabric_id: i64) -> Result<Vec<Vlan>> {
        self.get(&format!("fabrics/{fabric_id}/vlans/"), None).await
    }
}
