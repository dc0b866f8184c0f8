use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    rpc_client::RpcClient,
    rpc_request::TokenAccountsFilter,
};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};
use solana_transaction_status::TransactionConfirmationStatus;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::ports::chain::{ChainRpc, RpcError, SignatureStatus, TokenBalance};

/// Map a solana-client error onto the retry taxonomy
fn classify(err: ClientError) -> RpcError {
    if let Some(tx_err) = err.get_transaction_error() {
        return match tx_err {
            TransactionError::BlockhashNotFound => RpcError::BlockhashNotFound,
            other => RpcError::Rejected(other.to_string()),
        };
    }

    match err.kind() {
        ClientErrorKind::Reqwest(e) if e.is_timeout() => RpcError::Timeout,
        ClientErrorKind::Reqwest(e) if e.status().map(|s| s.as_u16()) == Some(429) => {
            RpcError::RateLimited(e.to_string())
        }
        ClientErrorKind::Reqwest(e) => RpcError::Transport(e.to_string()),
        ClientErrorKind::Io(e) => RpcError::Transport(e.to_string()),
        _ => classify_message(&err.to_string()),
    }
}

/// Fallback classification for errors that only carry a message
fn classify_message(message: &str) -> RpcError {
    let lower = message.to_lowercase();
    if lower.contains("blockhash not found") || lower.contains("blockhashnotfound") {
        RpcError::BlockhashNotFound
    } else if lower.contains("429") || lower.contains("too many requests") {
        RpcError::RateLimited(message.to_string())
    } else if lower.contains("timed out") || lower.contains("timeout") {
        RpcError::Timeout
    } else if lower.contains("connection") {
        RpcError::Transport(message.to_string())
    } else {
        RpcError::Rejected(message.to_string())
    }
}

/// Read one jsonParsed SPL token account, skipping empty or malformed ones
fn parse_token_account(token_account: &str, data: &Value) -> Option<TokenBalance> {
    let info = data.get("parsed")?.get("info")?;
    let mint = info.get("mint")?.as_str()?;
    let token_amount = info.get("tokenAmount")?;
    let amount: u64 = token_amount.get("amount")?.as_str()?.parse().ok()?;
    let decimals = token_amount.get("decimals")?.as_u64()? as u8;

    if amount == 0 {
        return None;
    }

    let ui_amount = token_amount
        .get("uiAmountString")
        .and_then(Value::as_str)
        .and_then(|s| Decimal::from_str(s).ok())
        .unwrap_or_else(|| Decimal::from_i128_with_scale(amount as i128, decimals as u32));

    Some(TokenBalance {
        mint: mint.to_string(),
        token_account: token_account.to_string(),
        amount,
        decimals,
        ui_amount,
    })
}

/// Wrapper around Solana RPC client with async-compatible methods
#[derive(Clone)]
pub struct SolanaClient {
    client: Arc<RpcClient>,
}

impl SolanaClient {
    /// Create a new Solana RPC client
    pub fn new(rpc_url: String) -> Self {
        let client = Arc::new(RpcClient::new_with_commitment(rpc_url, CommitmentConfig::confirmed()));
        Self { client }
    }

    /// Create a client with an explicit request timeout
    pub fn with_timeout(rpc_url: String, timeout: Duration) -> Self {
        let client = Arc::new(RpcClient::new_with_timeout_and_commitment(
            rpc_url,
            timeout,
            CommitmentConfig::confirmed(),
        ));
        Self { client }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }

    /// Run a blocking RPC call off the async runtime
    async fn blocking<T, F>(&self, call: F) -> Result<T, RpcError>
    where
        T: Send + 'static,
        F: FnOnce(&RpcClient) -> Result<T, RpcError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || call(&client))
            .await
            .map_err(|e| RpcError::Transport(format!("Task join error: {}", e)))?
    }

    /// Get SOL balance for a public key
    pub async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, RpcError> {
        let pubkey = *pubkey;
        self.blocking(move |client| client.get_balance(&pubkey).map_err(classify))
            .await
    }
}

#[async_trait]
impl ChainRpc for SolanaClient {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, RpcError> {
        let address = *address;
        self.blocking(move |client| {
            client
                .get_account_with_commitment(&address, client.commitment())
                .map(|response| response.value.map(|account| account.data))
                .map_err(classify)
        })
        .await
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, RpcError> {
        self.blocking(|client| client.get_latest_blockhash().map_err(classify))
            .await
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature, RpcError> {
        let tx = transaction.clone();
        self.blocking(move |client| client.send_transaction(&tx).map_err(classify))
            .await
    }

    async fn get_signature_status(&self, signature: &Signature) -> Result<SignatureStatus, RpcError> {
        let signature = *signature;
        self.blocking(move |client| {
            let response = client.get_signature_statuses(&[signature]).map_err(classify)?;
            let status = match response.value.into_iter().next().flatten() {
                None => SignatureStatus::NotFound,
                Some(status) => match (status.err, status.confirmation_status) {
                    (Some(err), _) => SignatureStatus::Failed(err.to_string()),
                    (
                        None,
                        Some(TransactionConfirmationStatus::Confirmed)
                        | Some(TransactionConfirmationStatus::Finalized),
                    ) => SignatureStatus::Confirmed,
                    (None, _) => SignatureStatus::Processing,
                },
            };
            Ok(status)
        })
        .await
    }

    async fn get_token_balances(&self, owner: &Pubkey) -> Result<Vec<TokenBalance>, RpcError> {
        let owner = *owner;
        self.blocking(move |client| {
            let accounts = client
                .get_token_accounts_by_owner(&owner, TokenAccountsFilter::ProgramId(spl_token::id()))
                .map_err(classify)?;

            let mut balances = Vec::with_capacity(accounts.len());
            for keyed in accounts {
                let data = serde_json::to_value(&keyed.account.data)
                    .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
                match parse_token_account(&keyed.pubkey, &data) {
                    Some(balance) => balances.push(balance),
                    None => tracing::debug!(account = %keyed.pubkey, "Skipping empty or unparsed token account"),
                }
            }
            Ok(balances)
        })
        .await
    }

    async fn get_recent_prioritization_fees(&self, accounts: &[Pubkey]) -> Result<Vec<u64>, RpcError> {
        let accounts = accounts.to_vec();
        self.blocking(move |client| {
            client
                .get_recent_prioritization_fees(&accounts)
                .map(|fees| fees.into_iter().map(|f| f.prioritization_fee).collect())
                .map_err(classify)
        })
        .await
    }
}
