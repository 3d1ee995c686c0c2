/// Depth stream example: subscribe, print a handful of updates, stop.
///
/// Run with `RUST_LOG=debug` and a `log` backend of your choice to see the
/// subscription lifecycle.
use std::time::Duration;

use binance_service::{ApiService, DepthWebsocketRequest, Network, Service, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let service = ApiService::public(ServiceConfig::from_network(Network::Mainnet))?;
    let (mut events, stop) = service.depth_websocket(DepthWebsocketRequest {
        symbol: "BNBBTC".into(),
    })?;

    for _ in 0..10 {
        match tokio::time::timeout(Duration::from_secs(10), events.recv()).await {
            Ok(Some(update)) => println!(
                "{} [{}..{}] bids={} asks={}",
                update.symbol,
                update.first_update_id,
                update.final_update_id,
                update.bids.len(),
                update.asks.len()
            ),
            Ok(None) => {
                println!("stream closed");
                break;
            }
            Err(_) => {
                println!("no update within 10s");
                break;
            }
        }
    }

    stop.stop();
    Ok(())
}
