//! ChainPay event-listener host process.
//!
//! Connects to the purchase contract over WebSocket and fulfills each
//! on-chain airtime purchase through the top-up provider. Exits non-zero
//! if the startup connection retries are exhausted or the contract
//! checks fail.
//!
//! Environment variables:
//! - RPC_URL: WebSocket JSON-RPC endpoint (ws:// or wss://)
//! - CONTRACT_ADDRESS: address of the purchase contract
//! - TOPUP_CLIENT_ID / TOPUP_CLIENT_SECRET: provider credentials
//! - TOPUP_AUTH_URL / TOPUP_URL / TOPUP_AUDIENCE: provider endpoints
//!   (defaults point at the production provider)
//! - SENDER_PHONE: optional sender phone for provider accounts that
//!   require one
//! - RUST_LOG: log filter (default "info")

use chainpay_core::config::Settings;
use chainpay_core::errors::Result;
use chainpay_core::fulfillment::TopupClient;
use chainpay_core::listener::{ChainSubscriber, EventBridge};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "listener terminated");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let settings = Settings::from_env()?;

    let fulfiller = Arc::new(TopupClient::new(settings.topup)?);
    let mut bridge = EventBridge::new(fulfiller);

    bridge.mark_connecting();
    let subscriber = match ChainSubscriber::connect(&settings.listener).await {
        Ok(subscriber) => subscriber,
        Err(err) => {
            bridge.mark_fatal();
            return Err(err);
        }
    };

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let subscription = tokio::spawn(subscriber.run(events_tx));
    info!("listener started");

    bridge.dispatch(events_rx).await;

    match subscription.await {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "subscription task panicked");
            Ok(())
        }
    }
}
