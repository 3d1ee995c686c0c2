/// Service layer for the Binance API.
///
/// [`Service`] is the whole exchange surface as a trait, so calling code can
/// hold an `Arc<dyn Service>` and swap in a test double without touching call
/// sites. [`ApiService`] is the production implementation: every REST method
/// maps its request struct to [`Params`], picks the trust tier, and decodes
/// the body; every streaming method hands a stream name to the
/// [`StreamManager`].
///
/// Trust tiers:
/// - public market data: no API key, no signature
/// - account, orders, trades, withdrawals and user data stream control:
///   API key and signature
use std::any::type_name;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::de::{DeserializeOwned, IgnoredAny};
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::errors::BinanceError;
use crate::models::*;
use crate::request::{OutgoingRequest, Params, RequestBuilder};
use crate::signer::Signer;
use crate::transport::Transport;
use crate::websocket::{StreamManager, Subscription};

/// The Binance exchange surface.
#[async_trait]
pub trait Service: Send + Sync {
    // Market data
    async fn ping(&self) -> Result<(), BinanceError>;
    async fn time(&self) -> Result<DateTime<Utc>, BinanceError>;
    async fn order_book(&self, request: OrderBookRequest) -> Result<OrderBook, BinanceError>;
    async fn agg_trades(&self, request: AggTradesRequest) -> Result<Vec<AggTrade>, BinanceError>;
    async fn klines(&self, request: KlinesRequest) -> Result<Vec<Kline>, BinanceError>;
    async fn ticker_24h(&self, request: TickerRequest) -> Result<Ticker24, BinanceError>;
    async fn ticker_all_prices(&self) -> Result<Vec<PriceTicker>, BinanceError>;
    async fn ticker_all_books(&self) -> Result<Vec<BookTicker>, BinanceError>;

    // Orders
    async fn new_order(&self, request: NewOrderRequest) -> Result<ProcessedOrder, BinanceError>;
    async fn new_order_test(&self, request: NewOrderRequest) -> Result<(), BinanceError>;
    async fn query_order(&self, request: QueryOrderRequest) -> Result<ExecutedOrder, BinanceError>;
    async fn cancel_order(&self, request: CancelOrderRequest)
        -> Result<CanceledOrder, BinanceError>;
    async fn open_orders(
        &self,
        request: OpenOrdersRequest,
    ) -> Result<Vec<ExecutedOrder>, BinanceError>;
    async fn all_orders(&self, request: AllOrdersRequest)
        -> Result<Vec<ExecutedOrder>, BinanceError>;

    // Account
    async fn account(&self, request: AccountRequest) -> Result<Account, BinanceError>;
    async fn my_trades(&self, request: MyTradesRequest) -> Result<Vec<Trade>, BinanceError>;
    async fn withdraw(&self, request: WithdrawRequest) -> Result<WithdrawResult, BinanceError>;
    async fn deposit_history(&self, request: HistoryRequest) -> Result<Vec<Deposit>, BinanceError>;
    async fn withdraw_history(
        &self,
        request: HistoryRequest,
    ) -> Result<Vec<Withdrawal>, BinanceError>;

    // User data stream lifecycle
    async fn start_user_data_stream(&self) -> Result<UserStream, BinanceError>;
    async fn keep_alive_user_data_stream(&self, stream: &UserStream) -> Result<(), BinanceError>;
    async fn close_user_data_stream(&self, stream: &UserStream) -> Result<(), BinanceError>;

    // Streams. These return before the connection is established.
    fn depth_websocket(
        &self,
        request: DepthWebsocketRequest,
    ) -> Result<Subscription<DepthEvent>, BinanceError>;
    fn kline_websocket(
        &self,
        request: KlineWebsocketRequest,
    ) -> Result<Subscription<KlineEvent>, BinanceError>;
    fn trade_websocket(
        &self,
        request: TradeWebsocketRequest,
    ) -> Result<Subscription<AggTradeEvent>, BinanceError>;
    fn user_data_websocket(
        &self,
        request: UserDataWebsocketRequest,
    ) -> Result<Subscription<AccountEvent>, BinanceError>;
}

/// Production [`Service`] talking to the exchange over HTTP and WebSocket.
#[derive(Debug, Clone)]
pub struct ApiService {
    config: ServiceConfig,
    requests: RequestBuilder,
    transport: Transport,
    streams: StreamManager,
    cancel: CancellationToken,
}

impl ApiService {
    /// Create a service that can make signed calls.
    ///
    /// Uses the process-wide [`Transport::shared`] pool and a fresh
    /// cancellation token; see [`ApiService::with_transport`] and
    /// [`ApiService::with_cancellation`].
    pub fn new(config: ServiceConfig, signer: Arc<dyn Signer>) -> Result<Self, BinanceError> {
        Self::build(config, Some(signer))
    }

    /// Create a service for public market data only. Signed calls fail with a
    /// construction error.
    pub fn public(config: ServiceConfig) -> Result<Self, BinanceError> {
        Self::build(config, None)
    }

    fn build(config: ServiceConfig, signer: Option<Arc<dyn Signer>>) -> Result<Self, BinanceError> {
        let requests = RequestBuilder::new(&config.api_base, config.api_key.clone(), signer)?;
        let streams = StreamManager::new(&config.ws_base, config.ws.clone())?;
        Ok(Self {
            config,
            requests,
            transport: Transport::shared(),
            streams,
            cancel: CancellationToken::new(),
        })
    }

    /// Use a dedicated transport instead of the shared pool.
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Bound every REST call by `token`; cancelling it aborts in-flight calls.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn request_builder(&self) -> &RequestBuilder {
        &self.requests
    }

    /// Build, dispatch and decode one call, racing it against cancellation.
    async fn call<T: DeserializeOwned>(&self, request: OutgoingRequest) -> Result<T, BinanceError> {
        let http = self.requests.build(self.transport.client(), &request)?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("api.canceled method={} endpoint={}", request.method, request.endpoint);
                Err(BinanceError::Canceled)
            }
            result = self.exchange(http) => result,
        }
    }

    async fn exchange<T: DeserializeOwned>(
        &self,
        http: reqwest::Request,
    ) -> Result<T, BinanceError> {
        let response = self.transport.execute(http).await?;
        Self::parse_response(response).await
    }

    /// Map a raw response to `T`, surfacing non-2xx statuses as protocol errors.
    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BinanceError> {
        let status = response.status();
        let text = response.text().await?;
        let target_type = type_name::<T>();
        debug!(
            "api.parse_response status={} target_type={} body_len={}",
            status,
            target_type,
            text.len()
        );

        if !status.is_success() {
            debug!(
                "api.parse_response non_success status={} body={}",
                status, text
            );
            return Err(BinanceError::from_response(status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| {
            debug!(
                "api.parse_response decode_failed target_type={} error={}",
                target_type, e
            );
            BinanceError::Decode(format!(
                "Failed to parse {target_type}: {e}; body: {}",
                text.chars().take(500).collect::<String>()
            ))
        })
    }

    async fn public_call<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: Params,
    ) -> Result<T, BinanceError> {
        self.call(OutgoingRequest::new(method, endpoint).params(params))
            .await
    }

    async fn signed_call<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: Params,
    ) -> Result<T, BinanceError> {
        self.call(
            OutgoingRequest::new(method, endpoint)
                .params(params)
                .with_api_key()
                .signed(),
        )
        .await
    }

    /// Append `recvWindow` and `timestamp`, which every signed call carries.
    fn push_auth(
        &self,
        params: &mut Params,
        recv_window: Option<Duration>,
        timestamp: Option<DateTime<Utc>>,
    ) {
        params.push_opt(
            "recvWindow",
            recv_window
                .or(self.config.recv_window)
                .map(|w| w.as_millis()),
        );
        params.push("timestamp", timestamp.unwrap_or_else(Utc::now).timestamp_millis());
    }
}

fn require_symbol(symbol: &str) -> Result<(), BinanceError> {
    if symbol.trim().is_empty() {
        return Err(BinanceError::Construction("symbol must not be empty".into()));
    }
    Ok(())
}

fn require_limit(limit: Option<u32>, max: u32) -> Result<(), BinanceError> {
    match limit {
        Some(l) if l == 0 || l > max => Err(BinanceError::Construction(format!(
            "limit must be within 1..={max}, got {l}"
        ))),
        _ => Ok(()),
    }
}

fn require_order_ref(order_id: Option<u64>, client_order_id: Option<&str>) -> Result<(), BinanceError> {
    if order_id.is_none() && client_order_id.is_none() {
        return Err(BinanceError::Construction(
            "either order_id or orig_client_order_id is required".into(),
        ));
    }
    Ok(())
}

fn millis(time: Option<DateTime<Utc>>) -> Option<i64> {
    time.map(|t| t.timestamp_millis())
}

fn new_order_params(request: &NewOrderRequest) -> Result<Params, BinanceError> {
    require_symbol(&request.symbol)?;
    if request.order_type == OrderType::Unknown {
        return Err(BinanceError::Construction("order type must be set".into()));
    }
    if request.quantity <= Decimal::ZERO {
        return Err(BinanceError::Construction(format!(
            "quantity must be positive, got {}",
            request.quantity
        )));
    }
    if request.order_type.requires_price() && request.price.is_none() {
        return Err(BinanceError::Construction(format!(
            "{} orders require a price",
            request.order_type
        )));
    }
    if request.order_type.requires_time_in_force() && request.time_in_force.is_none() {
        return Err(BinanceError::Construction(format!(
            "{} orders require a time in force",
            request.order_type
        )));
    }
    if matches!(
        request.order_type,
        OrderType::StopLoss
            | OrderType::StopLossLimit
            | OrderType::TakeProfit
            | OrderType::TakeProfitLimit
    ) && request.stop_price.is_none()
    {
        return Err(BinanceError::Construction(format!(
            "{} orders require a stop price",
            request.order_type
        )));
    }

    let mut params = Params::new();
    params
        .push("symbol", &request.symbol)
        .push("side", request.side)
        .push("type", request.order_type)
        .push_opt("timeInForce", request.time_in_force)
        .push("quantity", request.quantity)
        .push_opt("price", request.price)
        .push_opt("newClientOrderId", request.new_client_order_id.as_deref())
        .push_opt("stopPrice", request.stop_price)
        .push_opt("icebergQty", request.iceberg_qty);
    Ok(params)
}

#[async_trait]
impl Service for ApiService {
    // -----------------------------------------------------------------------
    // Market Data
    // -----------------------------------------------------------------------

    /// GET /api/v3/ping - Connectivity check.
    async fn ping(&self) -> Result<(), BinanceError> {
        debug!("api.ping");
        let _: IgnoredAny = self
            .public_call(Method::GET, "api/v3/ping", Params::new())
            .await?;
        Ok(())
    }

    /// GET /api/v3/time - Server time.
    async fn time(&self) -> Result<DateTime<Utc>, BinanceError> {
        debug!("api.time");
        let resp: ServerTime = self
            .public_call(Method::GET, "api/v3/time", Params::new())
            .await?;
        DateTime::from_timestamp_millis(resp.server_time).ok_or_else(|| {
            BinanceError::Decode(format!("server time out of range: {}", resp.server_time))
        })
    }

    /// GET /api/v3/depth - Order book snapshot.
    async fn order_book(&self, request: OrderBookRequest) -> Result<OrderBook, BinanceError> {
        debug!(
            "api.order_book symbol={} limit={:?}",
            request.symbol, request.limit
        );
        require_symbol(&request.symbol)?;
        require_limit(request.limit, 5000)?;
        let mut params = Params::new();
        params
            .push("symbol", &request.symbol)
            .push_opt("limit", request.limit);
        self.public_call(Method::GET, "api/v3/depth", params).await
    }

    /// GET /api/v3/aggTrades - Compressed trade history.
    async fn agg_trades(&self, request: AggTradesRequest) -> Result<Vec<AggTrade>, BinanceError> {
        debug!(
            "api.agg_trades symbol={} from_id={:?} start_time={:?} end_time={:?} limit={:?}",
            request.symbol, request.from_id, request.start_time, request.end_time, request.limit
        );
        require_symbol(&request.symbol)?;
        require_limit(request.limit, 1000)?;
        let mut params = Params::new();
        params
            .push("symbol", &request.symbol)
            .push_opt("fromId", request.from_id)
            .push_opt("startTime", millis(request.start_time))
            .push_opt("endTime", millis(request.end_time))
            .push_opt("limit", request.limit);
        self.public_call(Method::GET, "api/v3/aggTrades", params)
            .await
    }

    /// GET /api/v3/klines - Candlestick series.
    async fn klines(&self, request: KlinesRequest) -> Result<Vec<Kline>, BinanceError> {
        debug!(
            "api.klines symbol={} interval={} start_time={:?} end_time={:?} limit={:?}",
            request.symbol, request.interval, request.start_time, request.end_time, request.limit
        );
        require_symbol(&request.symbol)?;
        require_limit(request.limit, 1000)?;
        let mut params = Params::new();
        params
            .push("symbol", &request.symbol)
            .push("interval", request.interval)
            .push_opt("startTime", millis(request.start_time))
            .push_opt("endTime", millis(request.end_time))
            .push_opt("limit", request.limit);
        self.public_call(Method::GET, "api/v3/klines", params).await
    }

    /// GET /api/v3/ticker/24hr - Rolling 24h statistics for one symbol.
    async fn ticker_24h(&self, request: TickerRequest) -> Result<Ticker24, BinanceError> {
        debug!("api.ticker_24h symbol={}", request.symbol);
        require_symbol(&request.symbol)?;
        let params = Params::new().with("symbol", &request.symbol);
        self.public_call(Method::GET, "api/v3/ticker/24hr", params)
            .await
    }

    /// GET /api/v3/ticker/price - Latest price for every symbol.
    async fn ticker_all_prices(&self) -> Result<Vec<PriceTicker>, BinanceError> {
        debug!("api.ticker_all_prices");
        self.public_call(Method::GET, "api/v3/ticker/price", Params::new())
            .await
    }

    /// GET /api/v3/ticker/bookTicker - Best bid/ask for every symbol.
    async fn ticker_all_books(&self) -> Result<Vec<BookTicker>, BinanceError> {
        debug!("api.ticker_all_books");
        self.public_call(Method::GET, "api/v3/ticker/bookTicker", Params::new())
            .await
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    /// POST /api/v3/order - Place an order.
    async fn new_order(&self, request: NewOrderRequest) -> Result<ProcessedOrder, BinanceError> {
        debug!(
            "api.new_order symbol={} side={} type={} quantity={} price={:?}",
            request.symbol, request.side, request.order_type, request.quantity, request.price
        );
        let mut params = new_order_params(&request)?;
        self.push_auth(&mut params, request.recv_window, request.timestamp);
        self.signed_call(Method::POST, "api/v3/order", params).await
    }

    /// POST /api/v3/order/test - Validate an order without sending it to the matching engine.
    async fn new_order_test(&self, request: NewOrderRequest) -> Result<(), BinanceError> {
        debug!(
            "api.new_order_test symbol={} side={} type={}",
            request.symbol, request.side, request.order_type
        );
        let mut params = new_order_params(&request)?;
        self.push_auth(&mut params, request.recv_window, request.timestamp);
        let _: IgnoredAny = self
            .signed_call(Method::POST, "api/v3/order/test", params)
            .await?;
        Ok(())
    }

    /// GET /api/v3/order - Order state.
    async fn query_order(&self, request: QueryOrderRequest) -> Result<ExecutedOrder, BinanceError> {
        debug!(
            "api.query_order symbol={} order_id={:?} orig_client_order_id={:?}",
            request.symbol, request.order_id, request.orig_client_order_id
        );
        require_symbol(&request.symbol)?;
        require_order_ref(request.order_id, request.orig_client_order_id.as_deref())?;
        let mut params = Params::new();
        params
            .push("symbol", &request.symbol)
            .push_opt("orderId", request.order_id)
            .push_opt("origClientOrderId", request.orig_client_order_id.as_deref());
        self.push_auth(&mut params, request.recv_window, request.timestamp);
        self.signed_call(Method::GET, "api/v3/order", params).await
    }

    /// DELETE /api/v3/order - Cancel an open order.
    async fn cancel_order(
        &self,
        request: CancelOrderRequest,
    ) -> Result<CanceledOrder, BinanceError> {
        debug!(
            "api.cancel_order symbol={} order_id={:?} orig_client_order_id={:?}",
            request.symbol, request.order_id, request.orig_client_order_id
        );
        require_symbol(&request.symbol)?;
        require_order_ref(request.order_id, request.orig_client_order_id.as_deref())?;
        let mut params = Params::new();
        params
            .push("symbol", &request.symbol)
            .push_opt("orderId", request.order_id)
            .push_opt("origClientOrderId", request.orig_client_order_id.as_deref())
            .push_opt("newClientOrderId", request.new_client_order_id.as_deref());
        self.push_auth(&mut params, request.recv_window, request.timestamp);
        self.signed_call(Method::DELETE, "api/v3/order", params)
            .await
    }

    /// GET /api/v3/openOrders - Open orders for one or all symbols.
    async fn open_orders(
        &self,
        request: OpenOrdersRequest,
    ) -> Result<Vec<ExecutedOrder>, BinanceError> {
        debug!("api.open_orders symbol={:?}", request.symbol);
        if let Some(symbol) = request.symbol.as_deref() {
            require_symbol(symbol)?;
        }
        let mut params = Params::new();
        params.push_opt("symbol", request.symbol.as_deref());
        self.push_auth(&mut params, request.recv_window, request.timestamp);
        self.signed_call(Method::GET, "api/v3/openOrders", params)
            .await
    }

    /// GET /api/v3/allOrders - Order history for a symbol.
    async fn all_orders(
        &self,
        request: AllOrdersRequest,
    ) -> Result<Vec<ExecutedOrder>, BinanceError> {
        debug!(
            "api.all_orders symbol={} order_id={:?} limit={:?}",
            request.symbol, request.order_id, request.limit
        );
        require_symbol(&request.symbol)?;
        require_limit(request.limit, 1000)?;
        let mut params = Params::new();
        params
            .push("symbol", &request.symbol)
            .push_opt("orderId", request.order_id)
            .push_opt("limit", request.limit);
        self.push_auth(&mut params, request.recv_window, request.timestamp);
        self.signed_call(Method::GET, "api/v3/allOrders", params)
            .await
    }

    // -----------------------------------------------------------------------
    // Account
    // -----------------------------------------------------------------------

    /// GET /api/v3/account - Balances and permissions.
    async fn account(&self, request: AccountRequest) -> Result<Account, BinanceError> {
        debug!("api.account");
        let mut params = Params::new();
        self.push_auth(&mut params, request.recv_window, request.timestamp);
        self.signed_call(Method::GET, "api/v3/account", params)
            .await
    }

    /// GET /api/v3/myTrades - The account's own trades for a symbol.
    async fn my_trades(&self, request: MyTradesRequest) -> Result<Vec<Trade>, BinanceError> {
        debug!(
            "api.my_trades symbol={} from_id={:?} limit={:?}",
            request.symbol, request.from_id, request.limit
        );
        require_symbol(&request.symbol)?;
        require_limit(request.limit, 1000)?;
        let mut params = Params::new();
        params
            .push("symbol", &request.symbol)
            .push_opt("fromId", request.from_id)
            .push_opt("limit", request.limit);
        self.push_auth(&mut params, request.recv_window, request.timestamp);
        self.signed_call(Method::GET, "api/v3/myTrades", params)
            .await
    }

    /// POST /sapi/v1/capital/withdraw/apply - Withdraw to an external address.
    async fn withdraw(&self, request: WithdrawRequest) -> Result<WithdrawResult, BinanceError> {
        debug!(
            "api.withdraw coin={} network={:?} amount={}",
            request.coin, request.network, request.amount
        );
        if request.coin.trim().is_empty() || request.address.trim().is_empty() {
            return Err(BinanceError::Construction(
                "withdraw requires coin and address".into(),
            ));
        }
        if request.amount <= Decimal::ZERO {
            return Err(BinanceError::Construction(format!(
                "withdraw amount must be positive, got {}",
                request.amount
            )));
        }
        let mut params = Params::new();
        params
            .push("coin", &request.coin)
            .push("address", &request.address)
            .push_opt("addressTag", request.address_tag.as_deref())
            .push_opt("network", request.network.as_deref())
            .push("amount", request.amount)
            .push_opt("name", request.name.as_deref());
        self.push_auth(&mut params, request.recv_window, request.timestamp);
        self.signed_call(Method::POST, "sapi/v1/capital/withdraw/apply", params)
            .await
    }

    /// GET /sapi/v1/capital/deposit/hisrec - Deposit history.
    async fn deposit_history(&self, request: HistoryRequest) -> Result<Vec<Deposit>, BinanceError> {
        debug!(
            "api.deposit_history coin={:?} status={:?}",
            request.coin, request.status
        );
        let mut params = history_params(&request);
        self.push_auth(&mut params, request.recv_window, request.timestamp);
        self.signed_call(Method::GET, "sapi/v1/capital/deposit/hisrec", params)
            .await
    }

    /// GET /sapi/v1/capital/withdraw/history - Withdrawal history.
    async fn withdraw_history(
        &self,
        request: HistoryRequest,
    ) -> Result<Vec<Withdrawal>, BinanceError> {
        debug!(
            "api.withdraw_history coin={:?} status={:?}",
            request.coin, request.status
        );
        let mut params = history_params(&request);
        self.push_auth(&mut params, request.recv_window, request.timestamp);
        self.signed_call(Method::GET, "sapi/v1/capital/withdraw/history", params)
            .await
    }

    // -----------------------------------------------------------------------
    // User Data Stream
    // -----------------------------------------------------------------------

    /// POST /api/v3/userDataStream - Open a user data session.
    async fn start_user_data_stream(&self) -> Result<UserStream, BinanceError> {
        debug!("api.start_user_data_stream");
        let mut params = Params::new();
        self.push_auth(&mut params, None, None);
        let resp: ListenKeyResponse = self
            .signed_call(Method::POST, "api/v3/userDataStream", params)
            .await?;
        Ok(UserStream {
            listen_key: resp.listen_key,
            created_at: Utc::now(),
        })
    }

    /// PUT /api/v3/userDataStream - Extend a session's validity.
    async fn keep_alive_user_data_stream(&self, stream: &UserStream) -> Result<(), BinanceError> {
        debug!("api.keep_alive_user_data_stream");
        let mut params = listen_key_params(stream)?;
        self.push_auth(&mut params, None, None);
        let _: IgnoredAny = self
            .signed_call(Method::PUT, "api/v3/userDataStream", params)
            .await?;
        Ok(())
    }

    /// DELETE /api/v3/userDataStream - Close a session.
    async fn close_user_data_stream(&self, stream: &UserStream) -> Result<(), BinanceError> {
        debug!("api.close_user_data_stream");
        let mut params = listen_key_params(stream)?;
        self.push_auth(&mut params, None, None);
        let _: IgnoredAny = self
            .signed_call(Method::DELETE, "api/v3/userDataStream", params)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Streams
    // -----------------------------------------------------------------------

    fn depth_websocket(
        &self,
        request: DepthWebsocketRequest,
    ) -> Result<Subscription<DepthEvent>, BinanceError> {
        debug!("api.depth_websocket symbol={}", request.symbol);
        require_symbol(&request.symbol)?;
        self.streams
            .subscribe(&format!("{}@depth", request.symbol.to_lowercase()))
    }

    fn kline_websocket(
        &self,
        request: KlineWebsocketRequest,
    ) -> Result<Subscription<KlineEvent>, BinanceError> {
        debug!(
            "api.kline_websocket symbol={} interval={}",
            request.symbol, request.interval
        );
        require_symbol(&request.symbol)?;
        self.streams.subscribe(&format!(
            "{}@kline_{}",
            request.symbol.to_lowercase(),
            request.interval
        ))
    }

    fn trade_websocket(
        &self,
        request: TradeWebsocketRequest,
    ) -> Result<Subscription<AggTradeEvent>, BinanceError> {
        debug!("api.trade_websocket symbol={}", request.symbol);
        require_symbol(&request.symbol)?;
        self.streams
            .subscribe(&format!("{}@aggTrade", request.symbol.to_lowercase()))
    }

    fn user_data_websocket(
        &self,
        request: UserDataWebsocketRequest,
    ) -> Result<Subscription<AccountEvent>, BinanceError> {
        debug!("api.user_data_websocket");
        if request.listen_key.trim().is_empty() {
            return Err(BinanceError::Construction(
                "listen key must not be empty".into(),
            ));
        }
        self.streams.subscribe(&request.listen_key)
    }
}

fn history_params(request: &HistoryRequest) -> Params {
    let mut params = Params::new();
    params
        .push_opt("coin", request.coin.as_deref())
        .push_opt("status", request.status)
        .push_opt("startTime", millis(request.start_time))
        .push_opt("endTime", millis(request.end_time));
    params
}

fn listen_key_params(stream: &UserStream) -> Result<Params, BinanceError> {
    if stream.listen_key.is_empty() {
        return Err(BinanceError::Construction(
            "listen key must not be empty".into(),
        ));
    }
    Ok(Params::new().with("listenKey", &stream.listen_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn limit_order_params_keep_declaration_order() {
        let request = NewOrderRequest::limit("BTCUSDT", Side::Buy, dec!(0.5), dec!(30000.10));
        let params = new_order_params(&request).unwrap();
        assert_eq!(
            params.encode(),
            "symbol=BTCUSDT&side=BUY&type=LIMIT&timeInForce=GTC&quantity=0.5&price=30000.10"
        );
    }

    #[test]
    fn limit_order_without_price_is_rejected() {
        let mut request = NewOrderRequest::limit("BTCUSDT", Side::Sell, dec!(1), dec!(1));
        request.price = None;
        let err = new_order_params(&request).unwrap_err();
        assert!(matches!(err, BinanceError::Construction(_)));
    }

    #[test]
    fn stop_order_without_stop_price_is_rejected() {
        let mut request = NewOrderRequest::market("BTCUSDT", Side::Sell, dec!(1));
        request.order_type = OrderType::StopLoss;
        assert!(new_order_params(&request).is_err());
    }

    #[test]
    fn market_order_omits_price_and_time_in_force() {
        let request = NewOrderRequest::market("ETHUSDT", Side::Sell, dec!(2));
        let params = new_order_params(&request).unwrap();
        assert!(!params.contains_key("price"));
        assert!(!params.contains_key("timeInForce"));
        assert_eq!(params.get("type"), Some("MARKET"));
    }

    #[test]
    fn limit_bounds() {
        assert!(require_limit(None, 1000).is_ok());
        assert!(require_limit(Some(1000), 1000).is_ok());
        assert!(require_limit(Some(0), 1000).is_err());
        assert!(require_limit(Some(1001), 1000).is_err());
    }

    #[test]
    fn history_params_are_optional() {
        assert!(history_params(&HistoryRequest::default()).is_empty());
    }
}
