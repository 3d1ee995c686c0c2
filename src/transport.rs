/// Pooled HTTP transport.
///
/// One [`Transport`] wraps one `reqwest::Client`, i.e. one connection pool.
/// Cloning is cheap and clones share the pool. [`Transport::shared`] returns a
/// lazily-built process-wide instance; services may be handed their own
/// instead, which keeps pools isolated between tests.
use std::sync::OnceLock;
use std::time::Duration;

use log::{debug, warn};
use reqwest::Client;

use crate::errors::BinanceError;

/// Connection pool and timeout settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP connect timeout (default: 5s).
    pub connect_timeout: Duration,
    /// TCP keep-alive interval (default: 5s).
    pub tcp_keepalive: Duration,
    /// How long an idle pooled connection is kept (default: 30s).
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections kept per host (default: 60).
    pub pool_max_idle_per_host: usize,
    /// Whole-request timeout; `None` leaves calls bounded only by cancellation.
    pub request_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            tcp_keepalive: Duration::from_secs(5),
            pool_idle_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 60,
            request_timeout: None,
        }
    }
}

/// Shared HTTP client used for every REST call.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
}

static SHARED: OnceLock<Transport> = OnceLock::new();

impl Transport {
    /// Build a transport with its own connection pool.
    pub fn new(config: &TransportConfig) -> Result<Self, BinanceError> {
        debug!(
            "transport.new connect_timeout={:?} keepalive={:?} idle_timeout={:?} max_idle_per_host={}",
            config.connect_timeout,
            config.tcp_keepalive,
            config.pool_idle_timeout,
            config.pool_max_idle_per_host
        );
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .tcp_keepalive(config.tcp_keepalive)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| BinanceError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// The process-wide transport, built on first use with default settings.
    pub fn shared() -> Transport {
        SHARED
            .get_or_init(|| {
                Transport::new(&TransportConfig::default()).unwrap_or_else(|e| {
                    warn!("transport.shared falling back to default client: {e}");
                    Transport::from_client(Client::new())
                })
            })
            .clone()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) async fn execute(
        &self,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, BinanceError> {
        Ok(self.client.execute(request).await?)
    }
}
