//! Scripted fakes for every port
//!
//! Each fake records the calls it receives and replays configured responses,
//! so application services can be driven end to end without a network.

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::chain::{ChainRpc, RpcError, SignatureStatus, TokenBalance};
use super::price::{PriceSourceError, SolUsdSource, TokenPriceSource};
use super::stream::{StreamConnection, StreamConnector, StreamError};
use super::trade_api::{TradeApi, TradeApiError, TradeParams};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct ChainState {
    accounts: HashMap<Pubkey, Vec<u8>>,
    account_errors: HashMap<Pubkey, RpcError>,
    send_script: VecDeque<Result<(), RpcError>>,
    status_script: VecDeque<SignatureStatus>,
    default_status: Option<SignatureStatus>,
    token_balances: Vec<TokenBalance>,
    priority_fees: Option<Result<Vec<u64>, RpcError>>,
    blockhashes_issued: Vec<Hash>,
    sent: Vec<VersionedTransaction>,
    status_queries: Vec<Signature>,
}

/// Chain RPC fake
///
/// `send_transaction` consumes the send script front to back and succeeds
/// with the transaction's own signature once the script is empty. Each
/// `get_latest_blockhash` returns a new unique hash.
#[derive(Debug, Clone, Default)]
pub struct MockChainRpc {
    state: Arc<Mutex<ChainState>>,
}

impl MockChainRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, address: Pubkey, data: Vec<u8>) -> Self {
        lock(&self.state).accounts.insert(address, data);
        self
    }

    pub fn with_account_error(self, address: Pubkey, error: RpcError) -> Self {
        lock(&self.state).account_errors.insert(address, error);
        self
    }

    /// Queue a failure for the next unscripted `send_transaction`
    pub fn with_send_error(self, error: RpcError) -> Self {
        lock(&self.state).send_script.push_back(Err(error));
        self
    }

    /// Queue a success, useful to interleave with failures
    pub fn with_send_ok(self) -> Self {
        lock(&self.state).send_script.push_back(Ok(()));
        self
    }

    /// Queue statuses returned by successive `get_signature_status` calls
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = SignatureStatus>) -> Self {
        lock(&self.state).status_script.extend(statuses);
        self
    }

    /// Status returned once the status script is exhausted (default: `Confirmed`)
    pub fn with_default_status(self, status: SignatureStatus) -> Self {
        lock(&self.state).default_status = Some(status);
        self
    }

    pub fn with_token_balances(self, balances: Vec<TokenBalance>) -> Self {
        lock(&self.state).token_balances = balances;
        self
    }

    pub fn with_priority_fees(self, fees: Result<Vec<u64>, RpcError>) -> Self {
        lock(&self.state).priority_fees = Some(fees);
        self
    }

    /// Transactions accepted or rejected by `send_transaction`, in order
    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        lock(&self.state).sent.clone()
    }

    pub fn blockhashes_issued(&self) -> Vec<Hash> {
        lock(&self.state).blockhashes_issued.clone()
    }

    pub fn status_queries(&self) -> usize {
        lock(&self.state).status_queries.len()
    }
}

#[async_trait]
impl ChainRpc for MockChainRpc {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, RpcError> {
        let state = lock(&self.state);
        if let Some(err) = state.account_errors.get(address) {
            return Err(err.clone());
        }
        Ok(state.accounts.get(address).cloned())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, RpcError> {
        let hash = Hash::new_unique();
        lock(&self.state).blockhashes_issued.push(hash);
        Ok(hash)
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature, RpcError> {
        let mut state = lock(&self.state);
        state.sent.push(transaction.clone());
        match state.send_script.pop_front() {
            Some(Err(err)) => Err(err),
            _ => transaction
                .signatures
                .first()
                .copied()
                .ok_or_else(|| RpcError::InvalidInput("transaction has no signatures".into())),
        }
    }

    async fn get_signature_status(&self, signature: &Signature) -> Result<SignatureStatus, RpcError> {
        let mut state = lock(&self.state);
        state.status_queries.push(*signature);
        Ok(match state.status_script.pop_front() {
            Some(status) => status,
            None => state.default_status.clone().unwrap_or(SignatureStatus::Confirmed),
        })
    }

    async fn get_token_balances(&self, _owner: &Pubkey) -> Result<Vec<TokenBalance>, RpcError> {
        Ok(lock(&self.state).token_balances.clone())
    }

    async fn get_recent_prioritization_fees(&self, _accounts: &[Pubkey]) -> Result<Vec<u64>, RpcError> {
        lock(&self.state)
            .priority_fees
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Fixed SOL/USD and per-mint token prices
#[derive(Debug, Clone, Default)]
pub struct MockPriceSource {
    sol_usd: Option<f64>,
    token_prices: HashMap<String, f64>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sol_usd(mut self, price: f64) -> Self {
        self.sol_usd = Some(price);
        self
    }

    pub fn with_token_price(mut self, mint: &str, price: f64) -> Self {
        self.token_prices.insert(mint.to_string(), price);
        self
    }

    /// Every lookup, `"SOL"` for the reference price
    pub fn get_calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl SolUsdSource for MockPriceSource {
    async fn sol_usd_price(&self) -> Result<f64, PriceSourceError> {
        lock(&self.calls).push("SOL".to_string());
        self.sol_usd
            .ok_or_else(|| PriceSourceError::Unavailable("no SOL price configured".into()))
    }
}

#[async_trait]
impl TokenPriceSource for MockPriceSource {
    async fn token_usd_price(&self, mint: &str) -> Result<f64, PriceSourceError> {
        lock(&self.calls).push(mint.to_string());
        self.token_prices
            .get(mint)
            .copied()
            .ok_or_else(|| PriceSourceError::NotFound(mint.to_string()))
    }
}

/// Builds a minimal unsigned transaction paying from `payer`
pub fn unsigned_transaction_bytes(payer: &Pubkey) -> Vec<u8> {
    let instruction = Instruction::new_with_bytes(
        Pubkey::new_unique(),
        &[0u8],
        vec![AccountMeta::new(*payer, true)],
    );
    let message = Message::new(&[instruction], Some(payer));
    let transaction = VersionedTransaction {
        signatures: vec![Signature::default(); message.header.num_required_signatures as usize],
        message: VersionedMessage::Legacy(message),
    };
    bincode::serialize(&transaction).unwrap_or_default()
}

/// Trade API fake producing real unsigned transactions
#[derive(Debug, Clone, Default)]
pub struct MockTradeApi {
    failures: Arc<Mutex<HashMap<String, TradeApiError>>>,
    calls: Arc<Mutex<Vec<TradeParams>>>,
}

impl MockTradeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every build or lightning call for `mint`
    pub fn with_failure(self, mint: &str, error: TradeApiError) -> Self {
        lock(&self.failures).insert(mint.to_string(), error);
        self
    }

    pub fn get_calls(&self) -> Vec<TradeParams> {
        lock(&self.calls).clone()
    }

    fn record(&self, params: &TradeParams) -> Result<(), TradeApiError> {
        lock(&self.calls).push(params.clone());
        match lock(&self.failures).get(&params.mint) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TradeApi for MockTradeApi {
    async fn build_local_transaction(
        &self,
        params: &TradeParams,
        public_key: &Pubkey,
    ) -> Result<Vec<u8>, TradeApiError> {
        self.record(params)?;
        Ok(unsigned_transaction_bytes(public_key))
    }

    async fn execute_lightning(&self, params: &TradeParams) -> Result<Signature, TradeApiError> {
        self.record(params)?;
        Ok(Signature::new_unique())
    }
}

/// Test-side handle feeding inbound messages to a [`ScriptedConnector`]
#[derive(Debug, Clone)]
pub struct StreamFeed {
    tx: mpsc::UnboundedSender<String>,
}

impl StreamFeed {
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.tx.send(text.into());
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.push(value.to_string());
    }
}

#[derive(Debug, Default)]
struct ScriptedShared {
    sent: Vec<String>,
    connect_urls: Vec<String>,
    closed: bool,
    pings: usize,
}

/// Socket fake with a single connection
///
/// Subscribe and unsubscribe messages are acknowledged automatically, ahead
/// of any fed message. Dropping every [`StreamFeed`] closes the socket from
/// the peer side.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    inbound: Arc<Mutex<Option<mpsc::UnboundedReceiver<String>>>>,
    shared: Arc<Mutex<ScriptedShared>>,
    connect_error: Option<StreamError>,
    auto_ack: bool,
}

impl ScriptedConnector {
    pub fn new() -> (Self, StreamFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            inbound: Arc::new(Mutex::new(Some(rx))),
            shared: Arc::new(Mutex::new(ScriptedShared::default())),
            connect_error: None,
            auto_ack: true,
        };
        (connector, StreamFeed { tx })
    }

    pub fn failing(error: StreamError) -> Self {
        let (mut connector, _feed) = Self::new();
        connector.connect_error = Some(error);
        connector
    }

    /// Never acknowledge subscriptions
    pub fn without_acks(mut self) -> Self {
        self.auto_ack = false;
        self
    }

    pub fn sent_messages(&self) -> Vec<String> {
        lock(&self.shared).sent.clone()
    }

    pub fn connect_urls(&self) -> Vec<String> {
        lock(&self.shared).connect_urls.clone()
    }

    pub fn was_closed(&self) -> bool {
        lock(&self.shared).closed
    }

    pub fn pings(&self) -> usize {
        lock(&self.shared).pings
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamConnection>, StreamError> {
        if let Some(err) = &self.connect_error {
            return Err(err.clone());
        }
        lock(&self.shared).connect_urls.push(url.to_string());
        let inbound = lock(&self.inbound)
            .take()
            .ok_or_else(|| StreamError::ConnectionFailed("scripted connection already used".into()))?;

        Ok(Box::new(ScriptedConnection {
            inbound,
            acks: VecDeque::new(),
            shared: Arc::clone(&self.shared),
            auto_ack: self.auto_ack,
        }))
    }
}

struct ScriptedConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    acks: VecDeque<String>,
    shared: Arc<Mutex<ScriptedShared>>,
    auto_ack: bool,
}

#[async_trait]
impl StreamConnection for ScriptedConnection {
    async fn send(&mut self, text: String) -> Result<(), StreamError> {
        let mut shared = lock(&self.shared);
        if shared.closed {
            return Err(StreamError::Closed);
        }
        if self.auto_ack && text.contains("\"method\"") {
            let ack = if text.contains("unsubscribe") {
                r#"{"message":"Unsubscribed from keys."}"#
            } else {
                r#"{"message":"Successfully subscribed to keys."}"#
            };
            self.acks.push_back(ack.to_string());
        }
        shared.sent.push(text);
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Result<String, StreamError>> {
        if let Some(ack) = self.acks.pop_front() {
            return Some(Ok(ack));
        }
        self.inbound.recv().await.map(Ok)
    }

    async fn ping(&mut self) -> Result<(), StreamError> {
        lock(&self.shared).pings += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        lock(&self.shared).closed = true;
        self.inbound.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_chain_send_script() {
        let chain = MockChainRpc::new().with_send_error(RpcError::Timeout);
        let payer = Pubkey::new_unique();
        let tx: VersionedTransaction =
            bincode::deserialize(&unsigned_transaction_bytes(&payer)).unwrap();

        assert_eq!(chain.send_transaction(&tx).await, Err(RpcError::Timeout));
        assert!(chain.send_transaction(&tx).await.is_ok());
        assert_eq!(chain.sent_transactions().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_price_source() {
        let prices = MockPriceSource::new().with_sol_usd(150.0).with_token_price("Mint111", 0.5);
        assert_eq!(prices.sol_usd_price().await, Ok(150.0));
        assert_eq!(prices.token_usd_price("Mint111").await, Ok(0.5));
        assert!(prices.token_usd_price("Other").await.is_err());
        assert_eq!(prices.get_calls(), vec!["SOL", "Mint111", "Other"]);
    }

    #[tokio::test]
    async fn test_scripted_connector_acks_then_feed() {
        let (connector, feed) = ScriptedConnector::new();
        let mut conn = connector.connect("wss://test").await.unwrap();

        conn.send(r#"{"method":"subscribeNewToken"}"#.into()).await.unwrap();
        feed.push("hello");
        drop(feed);

        assert!(conn.next_message().await.unwrap().unwrap().contains("Successfully subscribed"));
        assert_eq!(conn.next_message().await.unwrap().unwrap(), "hello");
        assert!(conn.next_message().await.is_none());
        assert!(connector.connect("wss://test").await.is_err());
    }
}
