//! HTTP client for the router's static DNS endpoint
//!
//! Every call is authenticated with basic auth, bounded by the configured
//! request timeout and never retried here. Retry policy belongs to the
//! reconcilers.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use tracing::debug;

use crate::adapters::RouterConfig;
use crate::error::{Error, Result};
use crate::metrics;

use super::{NewRouterRecord, RouterRecord, TransportError};

/// Path of the static DNS table on the router
pub const STATIC_DNS_PATH: &str = "/rest/ip/dns/static";

/// Operations the reconcilers need from the router
#[async_trait]
pub trait StaticDnsApi: Send + Sync {
    /// Fetch the full static DNS table
    async fn list_static_records(
        &self,
        cfg: &RouterConfig,
    ) -> std::result::Result<Vec<RouterRecord>, TransportError>;

    /// Register `name` -> `address`
    async fn create_record(
        &self,
        cfg: &RouterConfig,
        name: &str,
        address: &str,
    ) -> std::result::Result<(), TransportError>;

    /// Remove the record with router identifier `id`
    async fn delete_record(
        &self,
        cfg: &RouterConfig,
        id: &str,
    ) -> std::result::Result<(), TransportError>;
}

/// Build the static DNS URL for a router address.
///
/// `ROUTER` is normally a bare `host:port`, which is reached over HTTPS.
/// An explicit scheme is kept as given.
pub fn static_dns_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}{}", host, STATIC_DNS_PATH)
    } else {
        format!("https://{}{}", host, STATIC_DNS_PATH)
    }
}

/// reqwest-backed router client
///
/// Holds one connection pool that verifies certificates and one that does
/// not; the config passed to each call picks between them.
#[derive(Debug, Clone)]
pub struct RouterClient {
    verifying: HttpClient,
    insecure: HttpClient,
}

impl RouterClient {
    /// Create a new router client
    pub fn new() -> Result<Self> {
        let verifying = HttpClient::builder()
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        let insecure = HttpClient::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            verifying,
            insecure,
        })
    }

    fn http(&self, cfg: &RouterConfig) -> &HttpClient {
        if cfg.verify_tls {
            &self.verifying
        } else {
            &self.insecure
        }
    }
}

/// Turn a response into `Ok` when it carries `expected`, otherwise into an
/// error holding the status and body
async fn expect_status(
    response: reqwest::Response,
    expected: StatusCode,
) -> std::result::Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::unexpected_status(status.as_u16(), body))
}

fn record_request<T>(operation: &str, result: &std::result::Result<T, TransportError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) if e.timed_out => "timeout",
        Err(e) if e.status.is_none() => "transport_error",
        Err(_) => "http_error",
    };
    metrics::ROUTER_REQUESTS
        .with_label_values(&[operation, outcome])
        .inc();
}

#[async_trait]
impl StaticDnsApi for RouterClient {
    async fn list_static_records(
        &self,
        cfg: &RouterConfig,
    ) -> std::result::Result<Vec<RouterRecord>, TransportError> {
        let url = static_dns_url(&cfg.host);

        let result: std::result::Result<Vec<RouterRecord>, TransportError> = async {
            let response = self
                .http(cfg)
                .get(&url)
                .basic_auth(&cfg.username, Some(&cfg.password))
                .timeout(cfg.timeout)
                .send()
                .await?;
            debug!(router = %cfg.host, status = response.status().as_u16(), "GET static DNS list");

            let response = expect_status(response, StatusCode::OK).await?;
            let body = response.text().await?;
            serde_json::from_str::<Vec<RouterRecord>>(&body).map_err(|e| {
                TransportError::unexpected_status(
                    StatusCode::OK.as_u16(),
                    format!("invalid static DNS listing ({}): {}", e, body),
                )
            })
        }
        .await;

        record_request("list", &result);
        result
    }

    async fn create_record(
        &self,
        cfg: &RouterConfig,
        name: &str,
        address: &str,
    ) -> std::result::Result<(), TransportError> {
        let url = static_dns_url(&cfg.host);
        let payload = NewRouterRecord { address, name };

        let result: std::result::Result<(), TransportError> = async {
            let response = self
                .http(cfg)
                .put(&url)
                .basic_auth(&cfg.username, Some(&cfg.password))
                .json(&payload)
                .timeout(cfg.timeout)
                .send()
                .await?;
            debug!(
                router = %cfg.host,
                dns_name = %name,
                address = %address,
                status = response.status().as_u16(),
                "PUT static DNS record"
            );

            expect_status(response, StatusCode::CREATED).await?;
            Ok(())
        }
        .await;

        record_request("create", &result);
        result
    }

    async fn delete_record(
        &self,
        cfg: &RouterConfig,
        id: &str,
    ) -> std::result::Result<(), TransportError> {
        let url = format!("{}/{}", static_dns_url(&cfg.host), id);

        let result: std::result::Result<(), TransportError> = async {
            let response = self
                .http(cfg)
                .delete(&url)
                .basic_auth(&cfg.username, Some(&cfg.password))
                .timeout(cfg.timeout)
                .send()
                .await?;
            debug!(
                router = %cfg.host,
                record_id = %id,
                status = response.status().as_u16(),
                "DELETE static DNS record"
            );

            expect_status(response, StatusCode::NO_CONTENT).await?;
            Ok(())
        }
        .await;

        record_request("delete", &result);
        result
    }
}
