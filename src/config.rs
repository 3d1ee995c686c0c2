/// Network configuration for Binance API endpoints.
use std::fmt;
use std::time::Duration;

use crate::errors::BinanceError;
use crate::websocket::WsConfig;

/// Environment variable read by [`ServiceConfig::from_env`].
pub const API_KEY_ENV: &str = "BINANCE_API_KEY";

/// Supported Binance environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

/// Immutable settings for one service instance.
#[derive(Clone)]
pub struct ServiceConfig {
    /// REST base URL, e.g. `https://api.binance.com`.
    pub api_base: String,
    /// Raw stream base URL; stream names are appended as a path segment.
    pub ws_base: String,
    /// Sent as `X-MBX-APIKEY` on authenticated calls.
    pub api_key: String,
    /// Default `recvWindow` for signed calls that do not set their own.
    pub recv_window: Option<Duration>,
    pub ws: WsConfig,
}

impl ServiceConfig {
    pub fn from_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self {
                api_base: "https://api.binance.com".into(),
                ws_base: "wss://stream.binance.com:9443/ws".into(),
                api_key: String::new(),
                recv_window: None,
                ws: WsConfig::default(),
            },
            Network::Testnet => Self {
                api_base: "https://testnet.binance.vision".into(),
                ws_base: "wss://testnet.binance.vision/ws".into(),
                api_key: String::new(),
                recv_window: None,
                ws: WsConfig::default(),
            },
        }
    }

    /// Network defaults with the API key taken from `BINANCE_API_KEY`.
    pub fn from_env(network: Network) -> Result<Self, BinanceError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| BinanceError::Config(format!("{API_KEY_ENV} is not set")))?;
        Ok(Self::from_network(network).with_api_key(api_key))
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Point both REST and stream traffic at custom hosts (proxies, stubs).
    pub fn with_endpoints(mut self, api_base: impl Into<String>, ws_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.ws_base = ws_base.into();
        self
    }

    pub fn with_recv_window(mut self, recv_window: Duration) -> Self {
        self.recv_window = Some(recv_window);
        self
    }

    pub fn with_ws_config(mut self, ws: WsConfig) -> Self {
        self.ws = ws;
        self
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_network(Network::Mainnet)
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_base", &self.api_base)
            .field("ws_base", &self.ws_base)
            .field("api_key", &"<redacted>")
            .field("recv_window", &self.recv_window)
            .field("ws", &self.ws)
            .finish()
    }
}
