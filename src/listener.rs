//! On-chain purchase event listener bridge.
//!
//! Connects to the chain over WebSocket with bounded startup retries,
//! verifies the target contract (non-empty bytecode, expected event in
//! the ABI), then decodes `AirtimePurchased` logs onto a channel. A
//! single consumer task pulls events off the channel and dispatches them
//! through the fulfillment client. A failed fulfillment for one event
//! never terminates the subscription; only exhausted connection retries
//! at startup are fatal.

use crate::errors::{ChainPayError, Result};
use crate::fulfillment::{build_custom_identifier, Fulfiller};
use crate::types::{FulfillmentRequest, MobileNetwork, PurchaseEvent, RecipientPhone, TransactionDetails};
use ethers::contract::abigen;
use ethers::providers::{Middleware, Provider, StreamExt, Ws};
use ethers::types::Address;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Connection attempts before the bridge gives up at startup.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Fixed delay between startup connection attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// ISO country code of the service's target country.
pub const DEFAULT_COUNTRY_CODE: &str = "NG";

/// Name of the purchase event the contract ABI must declare.
pub const PURCHASE_EVENT_NAME: &str = "AirtimePurchased";

abigen!(
    ChainPayAirtime,
    r#"[
        event AirtimePurchased(uint256 indexed transactionId, address indexed user, string phoneNumber, uint256 tokenAmount, uint8 network, address tokenAddress, uint256 timestamp, uint256 creditAmount)
    ]"#
);

impl From<AirtimePurchasedFilter> for PurchaseEvent {
    fn from(log: AirtimePurchasedFilter) -> Self {
        Self {
            transaction_id: log.transaction_id,
            user: log.user,
            phone_number: log.phone_number,
            token_amount: log.token_amount,
            network: log.network,
            token_address: log.token_address,
            timestamp: log.timestamp.low_u64(),
            credit_amount: log.credit_amount,
        }
    }
}

/// Lifecycle of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Not yet connected, or stopped after the channel closed
    Disconnected,
    /// Startup connection attempts in progress
    Connecting,
    /// Subscribed and waiting for events
    Listening,
    /// Processing one event through the fulfillment client
    Fulfilling,
    /// Terminal: connection retries exhausted at startup
    FatallyDisconnected,
}

/// Connection settings for the chain subscriber.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// WebSocket JSON-RPC endpoint
    pub rpc_url: String,

    /// Address of the purchase contract
    pub contract_address: Address,

    /// Startup connection attempts before fatal failure
    pub max_connect_attempts: u32,

    /// Delay between startup connection attempts
    pub connect_retry_delay: Duration,
}

impl ListenerConfig {
    /// Creates a config with the default retry bounds.
    pub fn new(rpc_url: impl Into<String>, contract_address: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract_address,
            max_connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_retry_delay: CONNECT_RETRY_DELAY,
        }
    }
}

/// Runs `attempt` up to `max_attempts` times with a fixed delay between
/// attempts, returning the last error once the bound is exhausted.
pub async fn connect_with_retries<T, F, Fut>(
    max_attempts: u32,
    delay: Duration,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = ChainPayError::Blockchain("no connection attempts were made".to_string());

    for n in 0..max_attempts {
        if n > 0 {
            sleep(delay).await;
        }
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(
                    attempt = n + 1,
                    max_attempts,
                    error = %err,
                    "chain connection attempt failed"
                );
                last_err = err;
            }
        }
    }

    Err(last_err)
}

/// WebSocket subscription to the purchase contract.
///
/// Produces decoded [`PurchaseEvent`]s onto a channel; the consuming
/// [`EventBridge`] runs in its own task so slow fulfillment calls never
/// block event delivery.
pub struct ChainSubscriber {
    provider: Provider<Ws>,
    contract_address: Address,
}

impl ChainSubscriber {
    /// Connects to the chain, querying its network identity with bounded
    /// retries, then verifies the target contract. Exhausted retries or
    /// a failed contract check are fatal: the caller must treat the
    /// returned error as a signal to exit non-zero.
    pub async fn connect(config: &ListenerConfig) -> Result<Self> {
        let provider = connect_with_retries(
            config.max_connect_attempts,
            config.connect_retry_delay,
            || {
                let url = config.rpc_url.clone();
                async move {
                    let provider = Provider::<Ws>::connect(url).await?;
                    let chain_id = provider.get_chainid().await?;
                    info!(chain_id = %chain_id, "connected to chain");
                    Ok(provider)
                }
            },
        )
        .await?;

        let subscriber = Self {
            provider,
            contract_address: config.contract_address,
        };
        subscriber.verify_contract().await?;
        Ok(subscriber)
    }

    /// The contract must have bytecode at its address and its ABI must
    /// declare the purchase event.
    async fn verify_contract(&self) -> Result<()> {
        let code = self.provider.get_code(self.contract_address, None).await?;
        if code.as_ref().is_empty() {
            return Err(ChainPayError::Config(format!(
                "no contract bytecode at {:?}",
                self.contract_address
            )));
        }

        if CHAINPAYAIRTIME_ABI.event(PURCHASE_EVENT_NAME).is_err() {
            return Err(ChainPayError::Config(format!(
                "contract ABI does not declare the {} event",
                PURCHASE_EVENT_NAME
            )));
        }

        info!(contract = ?self.contract_address, "contract verified");
        Ok(())
    }

    /// Streams purchase events onto `events_tx` until the subscription
    /// or the channel ends. Stream-level errors are advisory transport
    /// notifications: they are logged and the subscription continues.
    pub async fn run(self, events_tx: mpsc::Sender<PurchaseEvent>) -> Result<()> {
        let Self {
            provider,
            contract_address,
        } = self;

        let client = Arc::new(provider);
        let contract = ChainPayAirtime::new(contract_address, client);
        let filter = contract.airtime_purchased_filter();
        let mut stream = filter
            .stream()
            .await
            .map_err(|e| ChainPayError::Blockchain(format!("event subscription failed: {}", e)))?;

        info!(contract = ?contract_address, "listening for purchase events");

        while let Some(item) = stream.next().await {
            match item {
                Ok(log) => {
                    let event = PurchaseEvent::from(log);
                    info!(
                        transaction_id = %event.transaction_id,
                        network = event.network,
                        credit_amount = %event.credit_amount,
                        "purchase event received"
                    );
                    if events_tx.send(event).await.is_err() {
                        warn!("event channel closed, stopping subscription");
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "event stream notification"),
            }
        }

        Ok(())
    }
}

/// Consumes decoded purchase events and dispatches each one to a
/// [`Fulfiller`]. Errors during fulfillment are logged and the bridge
/// keeps listening.
pub struct EventBridge {
    fulfiller: Arc<dyn Fulfiller>,
    country_code: String,
    state: BridgeState,
}

impl EventBridge {
    /// Creates a bridge dispatching to the given fulfiller.
    pub fn new(fulfiller: Arc<dyn Fulfiller>) -> Self {
        Self {
            fulfiller,
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            state: BridgeState::Disconnected,
        }
    }

    /// Overrides the recipient country code.
    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = country_code.into();
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Marks the bridge as attempting its startup connection.
    pub fn mark_connecting(&mut self) {
        self.state = BridgeState::Connecting;
    }

    /// Marks the bridge terminally disconnected after exhausted startup
    /// retries. The host process is expected to exit non-zero.
    pub fn mark_fatal(&mut self) {
        self.state = BridgeState::FatallyDisconnected;
    }

    /// Pulls events off the channel until the sender side closes. Each
    /// event is handled independently; an unmapped network enum or a
    /// fulfillment failure is logged and skipped.
    pub async fn dispatch(&mut self, mut events_rx: mpsc::Receiver<PurchaseEvent>) {
        self.state = BridgeState::Listening;

        while let Some(event) = events_rx.recv().await {
            self.state = BridgeState::Fulfilling;
            match self.handle_event(&event).await {
                Ok(details) => info!(
                    transaction_id = %event.transaction_id,
                    wallet = %details.wallet_address,
                    provider_tx = ?details.receipt.transaction_id,
                    "purchase fulfilled"
                ),
                Err(ChainPayError::UnmappedNetwork(network)) => warn!(
                    transaction_id = %event.transaction_id,
                    network,
                    "unknown network enum, skipping event"
                ),
                Err(err) => error!(
                    transaction_id = %event.transaction_id,
                    error = %err,
                    "fulfillment failed"
                ),
            }
            self.state = BridgeState::Listening;
        }

        info!("event channel closed, bridge stopped");
        self.state = BridgeState::Disconnected;
    }

    /// Maps one event to a fulfillment request and submits it.
    pub async fn handle_event(&self, event: &PurchaseEvent) -> Result<TransactionDetails> {
        let network = MobileNetwork::from_u8(event.network)
            .ok_or(ChainPayError::UnmappedNetwork(event.network))?;

        let amount: f64 = event.credit_amount.to_string().parse().map_err(|_| {
            ChainPayError::Conversion(format!(
                "credit amount {} is not representable",
                event.credit_amount
            ))
        })?;

        let request = FulfillmentRequest {
            operator_id: network.operator_id(),
            amount,
            use_local_amount: true,
            custom_identifier: build_custom_identifier(&event.transaction_id.to_string()),
            recipient_phone: RecipientPhone::from_msisdn(&event.phone_number, &self.country_code),
            sender_phone: None,
        };

        info!(
            carrier = network.name(),
            operator_id = request.operator_id,
            amount = request.amount,
            custom_identifier = %request.custom_identifier,
            "dispatching fulfillment"
        );

        let wallet = format!("{:?}", event.user);
        self.fulfiller.fulfill(&request, &wallet).await
    }
}
