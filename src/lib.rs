//! Binance service layer for Rust.
//!
//! A typed client for the Binance spot REST API and its push streams.
//!
//! # What This Crate Provides
//!
//! - The whole exchange surface as one trait: [`Service`]
//! - A production implementation over HTTP and WebSocket: [`ApiService`]
//! - HMAC-SHA256 request signing behind a pluggable [`Signer`]
//! - One shared, pooled HTTP client: [`Transport`]
//! - Stream subscriptions as a [`TypedStream`] plus a [`StopHandle`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use binance_service::{ApiService, Network, OrderBookRequest, Service, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), binance_service::BinanceError> {
//!     let service = ApiService::public(ServiceConfig::from_network(Network::Testnet))?;
//!
//!     let book = service
//!         .order_book(OrderBookRequest {
//!             symbol: "BTCUSDT".into(),
//!             limit: Some(5),
//!         })
//!         .await?;
//!     println!("best bid: {:?}", book.bids.first());
//!     Ok(())
//! }
//! ```
//!
//! # Signed Calls
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use binance_service::{
//!     AccountRequest, ApiService, HmacSigner, Network, Service, ServiceConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), binance_service::BinanceError> {
//!     let config = ServiceConfig::from_env(Network::Testnet)?;
//!     let signer = Arc::new(HmacSigner::from_env()?);
//!     let service = ApiService::new(config, signer)?;
//!
//!     let account = service.account(AccountRequest::default()).await?;
//!     if let Some(usdt) = account.balance("USDT") {
//!         println!("USDT free: {}", usdt.free);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Streams
//!
//! ```rust,no_run
//! use binance_service::{ApiService, DepthWebsocketRequest, Network, Service, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), binance_service::BinanceError> {
//!     let service = ApiService::public(ServiceConfig::from_network(Network::Mainnet))?;
//!     let (mut events, stop) = service.depth_websocket(DepthWebsocketRequest {
//!         symbol: "BNBBTC".into(),
//!     })?;
//!
//!     for _ in 0..10 {
//!         match events.recv().await {
//!             Some(update) => println!("{} bids changed", update.bids.len()),
//!             None => break,
//!         }
//!     }
//!     stop.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Logging
//!
//! This crate emits logs through the [`log`](https://docs.rs/log/) facade: debug
//! level for request assembly, calls and stream lifecycle, warn level for skipped
//! stream frames, error level for failed connections. Configure any compatible
//! logger in your binary, then set `RUST_LOG=debug` to inspect request flow.
//! Secrets and API keys are never logged.
//!
//! # Errors
//!
//! All fallible operations return [`BinanceError`]:
//!
//! - `Construction` for requests that cannot be assembled
//! - `Transport` and `Canceled` for failures before a response arrived
//! - `Protocol` for non-2xx responses, with the exchange's error code
//! - `Decode` for bodies that do not match the expected type
//!
//! [`BinanceError::is_retryable`] flags rate limits, server errors and
//! transport failures.
pub mod config;
pub mod errors;
pub mod models;
pub mod request;
pub mod service;
pub mod signer;
pub mod transport;
pub mod websocket;

// Re-export primary types for convenience.
pub use config::{Network, ServiceConfig};
pub use errors::BinanceError;
pub use models::*;
pub use request::{OutgoingRequest, Params, RequestBuilder, SignedQuery};
pub use service::{ApiService, Service};
pub use signer::{HmacSigner, Signer};
pub use transport::{Transport, TransportConfig};
pub use websocket::{StopHandle, StreamManager, Subscription, TypedStream, WsConfig};
