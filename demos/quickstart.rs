/// Quickstart example: public market data, then a signed test order.
///
/// Demonstrates: ping, server time, order book snapshot, latest prices and,
/// when `BINANCE_API_KEY` / `BINANCE_SECRET_KEY` are set, a validated-only
/// order against the testnet.
use std::sync::Arc;

use binance_service::{
    ApiService, HmacSigner, Network, NewOrderRequest, OrderBookRequest, Service, ServiceConfig,
    Side,
};
use rust_decimal::Decimal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let public = ApiService::public(ServiceConfig::from_network(Network::Testnet))?;

    // 1. Connectivity and clock
    public.ping().await?;
    println!("Server time: {}", public.time().await?);

    // 2. Order book snapshot
    let book = public
        .order_book(OrderBookRequest {
            symbol: "BTCUSDT".into(),
            limit: Some(5),
        })
        .await?;
    println!("BTCUSDT book (update {}):", book.last_update_id);
    for level in &book.bids {
        println!("  bid {} x {}", level.price, level.quantity);
    }
    for level in &book.asks {
        println!("  ask {} x {}", level.price, level.quantity);
    }

    // 3. A few prices
    let prices = public.ticker_all_prices().await?;
    for ticker in prices.iter().take(5) {
        println!("{}: {}", ticker.symbol, ticker.price);
    }

    // 4. Signed call, only with credentials in the environment
    let (Ok(config), Ok(signer)) = (
        ServiceConfig::from_env(Network::Testnet),
        HmacSigner::from_env(),
    ) else {
        println!("\nSet BINANCE_API_KEY and BINANCE_SECRET_KEY to try signed calls.");
        return Ok(());
    };
    let private = ApiService::new(config, Arc::new(signer))?;

    let best_bid = book.bids.first().map(|l| l.price).unwrap_or(Decimal::ONE);
    let order = NewOrderRequest::limit("BTCUSDT", Side::Buy, Decimal::new(1, 3), best_bid);
    private.new_order_test(order).await?;
    println!("\nTest order accepted at {best_bid}");

    Ok(())
}
