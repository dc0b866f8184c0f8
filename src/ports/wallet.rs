use solana_sdk::{message::VersionedMessage, pubkey::Pubkey, transaction::VersionedTransaction};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("Failed to sign transaction: {0}")]
pub struct SigningError(pub String);

/// Holder of the trading keypair
///
/// The core only ever asks for the public key and a signature; key material
/// never crosses this boundary.
pub trait TransactionSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    fn sign_transaction(&self, message: VersionedMessage) -> Result<VersionedTransaction, SigningError>;
}
