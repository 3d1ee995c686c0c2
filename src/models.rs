/// Data models for the Binance REST API and push streams.
///
/// Request structs are plain parameter bundles; the service turns them into
/// query parameters. Response and event structs mirror the exchange's JSON
/// and use `Decimal` for every price and quantity, which the exchange sends
/// as strings.
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    StopLoss,
    StopLossLimit,
    TakeProfit,
    TakeProfitLimit,
    LimitMaker,
    #[serde(other)]
    Unknown,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::StopLoss => "STOP_LOSS",
            OrderType::StopLossLimit => "STOP_LOSS_LIMIT",
            OrderType::TakeProfit => "TAKE_PROFIT",
            OrderType::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
            OrderType::LimitMaker => "LIMIT_MAKER",
            OrderType::Unknown => "UNKNOWN",
        }
    }

    /// Whether orders of this type must carry a limit price.
    pub fn requires_price(&self) -> bool {
        matches!(
            self,
            OrderType::Limit
                | OrderType::StopLossLimit
                | OrderType::TakeProfitLimit
                | OrderType::LimitMaker
        )
    }

    /// Whether orders of this type must carry a time-in-force.
    pub fn requires_time_in_force(&self) -> bool {
        matches!(
            self,
            OrderType::Limit | OrderType::StopLossLimit | OrderType::TakeProfitLimit
        )
    }
}

/// How long an order stays active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
        }
    }
}

/// Order status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
    ExpiredInMatch,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Whether the order can still trade.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

/// Candlestick interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "3m")]
    Minutes3,
    #[serde(rename = "5m")]
    Minutes5,
    #[serde(rename = "15m")]
    Minutes15,
    #[serde(rename = "30m")]
    Minutes30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "2h")]
    Hours2,
    #[serde(rename = "4h")]
    Hours4,
    #[serde(rename = "6h")]
    Hours6,
    #[serde(rename = "8h")]
    Hours8,
    #[serde(rename = "12h")]
    Hours12,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "3d")]
    Days3,
    #[serde(rename = "1w")]
    Week1,
    #[serde(rename = "1M")]
    Month1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Minute1 => "1m",
            Interval::Minutes3 => "3m",
            Interval::Minutes5 => "5m",
            Interval::Minutes15 => "15m",
            Interval::Minutes30 => "30m",
            Interval::Hour1 => "1h",
            Interval::Hours2 => "2h",
            Interval::Hours4 => "4h",
            Interval::Hours6 => "6h",
            Interval::Hours8 => "8h",
            Interval::Hours12 => "12h",
            Interval::Day1 => "1d",
            Interval::Days3 => "3d",
            Interval::Week1 => "1w",
            Interval::Month1 => "1M",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

/// One price level of an order book: `["price", "quantity", ...]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl<'de> Deserialize<'de> for PriceLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LevelVisitor;
        impl<'de> de::Visitor<'de> for LevelVisitor {
            type Value = PriceLevel;
            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a [price, quantity] array")
            }
            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<PriceLevel, A::Error> {
                let price = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let quantity = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                // Older payloads carry a trailing, always-empty element.
                while seq.next_element::<de::IgnoredAny>()?.is_some() {}
                Ok(PriceLevel { price, quantity })
            }
        }
        deserializer.deserialize_seq(LevelVisitor)
    }
}

/// Server-side timestamp in milliseconds.
fn millis_to_datetime<E: de::Error>(ms: i64) -> Result<DateTime<Utc>, E> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| E::custom(format!("timestamp out of range: {ms}")))
}

/// Parse a `yyyy-mm-dd hh:mm:ss` UTC timestamp (withdrawal history format).
fn deserialize_utc_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        Some(serde_json::Value::String(s)) => {
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| Some(naive.and_utc()))
                .map_err(de::Error::custom)
        }
        Some(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(ms) => millis_to_datetime(ms).map(Some),
            None => Err(de::Error::custom(format!("invalid timestamp: {n}"))),
        },
        Some(serde_json::Value::Null) | None => Ok(None),
        Some(v) => Err(de::Error::custom(format!("invalid timestamp: {v}"))),
    }
}

// ---------------------------------------------------------------------------
// Market data requests
// ---------------------------------------------------------------------------

/// Parameters for the order book snapshot.
#[derive(Debug, Clone, Default)]
pub struct OrderBookRequest {
    pub symbol: String,
    /// Depth; the exchange accepts 1..=5000 (default 100).
    pub limit: Option<u32>,
}

/// Parameters for compressed/aggregate trades.
#[derive(Debug, Clone, Default)]
pub struct AggTradesRequest {
    pub symbol: String,
    pub from_id: Option<u64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// 1..=1000 (default 500).
    pub limit: Option<u32>,
}

/// Parameters for the candlestick series.
#[derive(Debug, Clone)]
pub struct KlinesRequest {
    pub symbol: String,
    pub interval: Interval,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// 1..=1000 (default 500).
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct TickerRequest {
    pub symbol: String,
}

// ---------------------------------------------------------------------------
// Market data results
// ---------------------------------------------------------------------------

/// Order book snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBook {
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Aggregate trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggTrade {
    #[serde(rename = "a")]
    pub id: u64,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "q")]
    pub quantity: Decimal,
    #[serde(rename = "f")]
    pub first_trade_id: u64,
    #[serde(rename = "l")]
    pub last_trade_id: u64,
    #[serde(rename = "T", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "m")]
    pub buyer_maker: bool,
    #[serde(rename = "M", default)]
    pub best_match: bool,
}

/// One candlestick.
///
/// The REST endpoint returns each candle as a positional array; this type
/// decodes that array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
    pub quote_asset_volume: Decimal,
    pub number_of_trades: u64,
    pub taker_buy_base_asset_volume: Decimal,
    pub taker_buy_quote_asset_volume: Decimal,
}

impl<'de> Deserialize<'de> for Kline {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct KlineVisitor;
        impl<'de> de::Visitor<'de> for KlineVisitor {
            type Value = Kline;
            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a kline array")
            }
            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Kline, A::Error> {
                let mut index = 0;
                let mut next = |seq: &mut A| -> Result<serde_json::Value, A::Error> {
                    let value = seq
                        .next_element::<serde_json::Value>()?
                        .ok_or_else(|| de::Error::invalid_length(index, &"11 kline fields"))?;
                    index += 1;
                    Ok(value)
                };
                let open_time = next(&mut seq)?;
                let open = next(&mut seq)?;
                let high = next(&mut seq)?;
                let low = next(&mut seq)?;
                let close = next(&mut seq)?;
                let volume = next(&mut seq)?;
                let close_time = next(&mut seq)?;
                let quote_asset_volume = next(&mut seq)?;
                let number_of_trades = next(&mut seq)?;
                let taker_base = next(&mut seq)?;
                let taker_quote = next(&mut seq)?;
                while seq.next_element::<de::IgnoredAny>()?.is_some() {}

                let time = |v: serde_json::Value| -> Result<DateTime<Utc>, A::Error> {
                    let ms = v
                        .as_i64()
                        .ok_or_else(|| de::Error::custom(format!("invalid kline time: {v}")))?;
                    millis_to_datetime(ms)
                };
                let decimal = |v: serde_json::Value| -> Result<Decimal, A::Error> {
                    serde_json::from_value(v).map_err(de::Error::custom)
                };

                Ok(Kline {
                    open_time: time(open_time)?,
                    open: decimal(open)?,
                    high: decimal(high)?,
                    low: decimal(low)?,
                    close: decimal(close)?,
                    volume: decimal(volume)?,
                    close_time: time(close_time)?,
                    quote_asset_volume: decimal(quote_asset_volume)?,
                    number_of_trades: number_of_trades.as_u64().ok_or_else(|| {
                        de::Error::custom(format!("invalid trade count: {number_of_trades}"))
                    })?,
                    taker_buy_base_asset_volume: decimal(taker_base)?,
                    taker_buy_quote_asset_volume: decimal(taker_quote)?,
                })
            }
        }
        deserializer.deserialize_seq(KlineVisitor)
    }
}

/// 24-hour rolling window statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24 {
    pub symbol: String,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub weighted_avg_price: Decimal,
    pub prev_close_price: Decimal,
    pub last_price: Decimal,
    pub last_qty: Decimal,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub open_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub close_time: DateTime<Utc>,
    pub first_id: i64,
    pub last_id: i64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTicker {
    pub symbol: String,
    pub price: Decimal,
}

/// Best bid/ask for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookTicker {
    pub symbol: String,
    pub bid_price: Decimal,
    pub bid_qty: Decimal,
    pub ask_price: Decimal,
    pub ask_qty: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerTime {
    pub server_time: i64,
}

// ---------------------------------------------------------------------------
// Account requests
// ---------------------------------------------------------------------------

/// A new order.
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: Option<TimeInForce>,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub new_client_order_id: Option<String>,
    pub stop_price: Option<Decimal>,
    pub iceberg_qty: Option<Decimal>,
    pub recv_window: Option<Duration>,
    /// Defaults to the current time when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewOrderRequest {
    /// A GTC limit order.
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            time_in_force: Some(TimeInForce::Gtc),
            quantity,
            price: Some(price),
            new_client_order_id: None,
            stop_price: None,
            iceberg_qty: None,
            recv_window: None,
            timestamp: None,
        }
    }

    pub fn market(symbol: impl Into<String>, side: Side, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            time_in_force: None,
            quantity,
            price: None,
            new_client_order_id: None,
            stop_price: None,
            iceberg_qty: None,
            recv_window: None,
            timestamp: None,
        }
    }
}

/// Look up one order by exchange id or client id.
#[derive(Debug, Clone, Default)]
pub struct QueryOrderRequest {
    pub symbol: String,
    pub order_id: Option<u64>,
    pub orig_client_order_id: Option<String>,
    pub recv_window: Option<Duration>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct CancelOrderRequest {
    pub symbol: String,
    pub order_id: Option<u64>,
    pub orig_client_order_id: Option<String>,
    pub new_client_order_id: Option<String>,
    pub recv_window: Option<Duration>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct OpenOrdersRequest {
    /// All symbols when `None`.
    pub symbol: Option<String>,
    pub recv_window: Option<Duration>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct AllOrdersRequest {
    pub symbol: String,
    pub order_id: Option<u64>,
    /// 1..=1000 (default 500).
    pub limit: Option<u32>,
    pub recv_window: Option<Duration>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct AccountRequest {
    pub recv_window: Option<Duration>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct MyTradesRequest {
    pub symbol: String,
    pub from_id: Option<u64>,
    /// 1..=1000 (default 500).
    pub limit: Option<u32>,
    pub recv_window: Option<Duration>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Withdraw funds to an external address.
#[derive(Debug, Clone, Default)]
pub struct WithdrawRequest {
    pub coin: String,
    pub address: String,
    pub address_tag: Option<String>,
    pub network: Option<String>,
    pub amount: Decimal,
    /// Description of the address.
    pub name: Option<String>,
    pub recv_window: Option<Duration>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Filter for deposit and withdrawal history.
#[derive(Debug, Clone, Default)]
pub struct HistoryRequest {
    pub coin: Option<String>,
    pub status: Option<u8>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub recv_window: Option<Duration>,
    pub timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Account results
// ---------------------------------------------------------------------------

/// Acknowledgement of a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedOrder {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub transact_time: DateTime<Utc>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub orig_qty: Option<Decimal>,
    #[serde(default)]
    pub executed_qty: Option<Decimal>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

/// Full order state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedOrder {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    #[serde(default)]
    pub cummulative_quote_qty: Option<Decimal>,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: Side,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub iceberg_qty: Option<Decimal>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_working: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanceledOrder {
    pub symbol: String,
    pub orig_client_order_id: String,
    pub order_id: u64,
    pub client_order_id: String,
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Account snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub maker_commission: i64,
    pub taker_commission: i64,
    pub buyer_commission: i64,
    pub seller_commission: i64,
    pub can_trade: bool,
    pub can_withdraw: bool,
    pub can_deposit: bool,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub account_type: Option<String>,
    pub balances: Vec<Balance>,
}

impl Account {
    /// Balance for `asset`, if the account holds any.
    pub fn balance(&self, asset: &str) -> Option<&Balance> {
        self.balances.iter().find(|b| b.asset == asset)
    }
}

/// One of the caller's own trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub symbol: String,
    pub id: u64,
    pub order_id: u64,
    pub price: Decimal,
    pub qty: Decimal,
    #[serde(default)]
    pub quote_qty: Option<Decimal>,
    pub commission: Decimal,
    pub commission_asset: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub is_buyer: bool,
    pub is_maker: bool,
    #[serde(default)]
    pub is_best_match: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawResult {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub amount: Decimal,
    pub coin: String,
    #[serde(default)]
    pub network: Option<String>,
    /// 0 pending, 6 credited but cannot withdraw, 1 success.
    pub status: u8,
    pub address: String,
    #[serde(default)]
    pub address_tag: Option<String>,
    pub tx_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub insert_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub transaction_fee: Option<Decimal>,
    pub coin: String,
    pub status: u8,
    pub address: String,
    #[serde(default)]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default, deserialize_with = "deserialize_utc_datetime")]
    pub apply_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// User data stream
// ---------------------------------------------------------------------------

/// A server-tracked user data session.
///
/// The listen key must be kept alive periodically and closed when no longer
/// needed; the caller owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStream {
    pub listen_key: String,
    /// Client-side time at which the session was started.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListenKeyResponse {
    pub listen_key: String,
}

// ---------------------------------------------------------------------------
// Stream subscription requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DepthWebsocketRequest {
    pub symbol: String,
}

#[derive(Debug, Clone)]
pub struct KlineWebsocketRequest {
    pub symbol: String,
    pub interval: Interval,
}

#[derive(Debug, Clone, Default)]
pub struct TradeWebsocketRequest {
    pub symbol: String,
}

#[derive(Debug, Clone, Default)]
pub struct UserDataWebsocketRequest {
    pub listen_key: String,
}

// ---------------------------------------------------------------------------
// Stream events
// ---------------------------------------------------------------------------

/// Incremental order book update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E", with = "chrono::serde::ts_milliseconds")]
    pub event_time: DateTime<Utc>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<PriceLevel>,
    #[serde(rename = "a")]
    pub asks: Vec<PriceLevel>,
}

/// Candle payload inside a [`KlineEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamKline {
    #[serde(rename = "t", with = "chrono::serde::ts_milliseconds")]
    pub open_time: DateTime<Utc>,
    #[serde(rename = "T", with = "chrono::serde::ts_milliseconds")]
    pub close_time: DateTime<Utc>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "i")]
    pub interval: Interval,
    #[serde(rename = "f")]
    pub first_trade_id: i64,
    #[serde(rename = "L")]
    pub last_trade_id: i64,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
    #[serde(rename = "n")]
    pub number_of_trades: u64,
    /// Whether this candle is closed.
    #[serde(rename = "x")]
    pub is_final: bool,
    #[serde(rename = "q")]
    pub quote_volume: Decimal,
    #[serde(rename = "V")]
    pub taker_buy_base_volume: Decimal,
    #[serde(rename = "Q")]
    pub taker_buy_quote_volume: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E", with = "chrono::serde::ts_milliseconds")]
    pub event_time: DateTime<Utc>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: StreamKline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggTradeEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E", with = "chrono::serde::ts_milliseconds")]
    pub event_time: DateTime<Utc>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "a")]
    pub id: u64,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "q")]
    pub quantity: Decimal,
    #[serde(rename = "f")]
    pub first_trade_id: u64,
    #[serde(rename = "l")]
    pub last_trade_id: u64,
    #[serde(rename = "T", with = "chrono::serde::ts_milliseconds")]
    pub trade_time: DateTime<Utc>,
    #[serde(rename = "m")]
    pub buyer_maker: bool,
}

/// Balance entry inside an account position event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f")]
    pub free: Decimal,
    #[serde(rename = "l")]
    pub locked: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountPositionEvent {
    #[serde(rename = "E", with = "chrono::serde::ts_milliseconds")]
    pub event_time: DateTime<Utc>,
    #[serde(rename = "u", with = "chrono::serde::ts_milliseconds")]
    pub last_update: DateTime<Utc>,
    #[serde(rename = "B")]
    pub balances: Vec<StreamBalance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceUpdateEvent {
    #[serde(rename = "E", with = "chrono::serde::ts_milliseconds")]
    pub event_time: DateTime<Utc>,
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "d")]
    pub delta: Decimal,
    #[serde(rename = "T", with = "chrono::serde::ts_milliseconds")]
    pub clear_time: DateTime<Utc>,
}

/// Order state change pushed on the user data stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReportEvent {
    #[serde(rename = "E", with = "chrono::serde::ts_milliseconds")]
    pub event_time: DateTime<Utc>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: Side,
    #[serde(rename = "o")]
    pub order_type: OrderType,
    #[serde(rename = "f")]
    pub time_in_force: TimeInForce,
    #[serde(rename = "q")]
    pub quantity: Decimal,
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Execution type: NEW, CANCELED, REPLACED, REJECTED, TRADE, EXPIRED.
    #[serde(rename = "x")]
    pub execution_type: String,
    #[serde(rename = "X")]
    pub status: OrderStatus,
    #[serde(rename = "i")]
    pub order_id: u64,
    #[serde(rename = "l")]
    pub last_executed_qty: Decimal,
    #[serde(rename = "z")]
    pub cumulative_filled_qty: Decimal,
    #[serde(rename = "L")]
    pub last_executed_price: Decimal,
    #[serde(rename = "T", with = "chrono::serde::ts_milliseconds")]
    pub transaction_time: DateTime<Utc>,
}

/// Event pushed on the user data stream, keyed by its `e` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "e")]
pub enum AccountEvent {
    #[serde(rename = "outboundAccountPosition")]
    AccountPosition(AccountPositionEvent),
    #[serde(rename = "balanceUpdate")]
    BalanceUpdate(BalanceUpdateEvent),
    #[serde(rename = "executionReport")]
    ExecutionReport(Box<ExecutionReportEvent>),
}
