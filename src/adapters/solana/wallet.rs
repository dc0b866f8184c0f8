use solana_sdk::{
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::ports::wallet::{SigningError, TransactionSigner};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Failed to load keypair from file: {0}")]
    LoadError(String),
    #[error("Invalid keypair bytes: {0}")]
    InvalidKeypair(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Wallet manager for loading and signing with Solana keypairs
pub struct WalletManager {
    keypair: Keypair,
}

impl WalletManager {
    /// Load keypair from a file path.
    ///
    /// Accepts the solana-keygen JSON byte array or a base58 secret key on a
    /// single line (the format wallet apps export).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let contents = fs::read_to_string(path.as_ref())
            .map_err(|e| WalletError::LoadError(format!("Failed to read file: {}", e)))?;
        let contents = contents.trim();

        if contents.starts_with('[') {
            let bytes: Vec<u8> = serde_json::from_str(contents)
                .map_err(|e| WalletError::LoadError(format!("Invalid JSON format: {}", e)))?;
            Self::from_bytes(&bytes)
        } else {
            Self::from_base58(contents)
        }
    }

    /// Load keypair from a base58-encoded 64-byte secret key
    pub fn from_base58(secret: &str) -> Result<Self, WalletError> {
        let bytes = bs58::decode(secret.trim())
            .into_vec()
            .map_err(|e| WalletError::InvalidKeypair(format!("Invalid base58 secret: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Load keypair from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        let keypair = Keypair::try_from(bytes)
            .map_err(|e| WalletError::InvalidKeypair(e.to_string()))?;

        Ok(Self { keypair })
    }

    /// Create a new random keypair (for testing)
    pub fn new_random() -> Self {
        Self {
            keypair: Keypair::new(),
        }
    }

    /// Get the public key as a string
    pub fn public_key(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    /// Sign a message and return the signature
    pub fn sign_bytes(&self, message: &[u8]) -> Signature {
        self.keypair.sign_message(message)
    }
}

impl TransactionSigner for WalletManager {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn sign_transaction(&self, message: VersionedMessage) -> Result<VersionedTransaction, SigningError> {
        VersionedTransaction::try_new(message, &[&self.keypair]).map_err(|e| SigningError(e.to_string()))
    }
}

impl Clone for WalletManager {
    fn clone(&self) -> Self {
        Self {
            keypair: self.keypair.insecure_clone(),
        }
    }
}

// Never print key material
impl fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletManager")
            .field("pubkey", &self.keypair.pubkey())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash,
        instruction::{AccountMeta, Instruction},
        message::Message,
    };
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_new_random_wallet() {
        let wallet = WalletManager::new_random();
        let pubkey = wallet.public_key();
        assert!(!pubkey.is_empty());
        assert_eq!(pubkey, wallet.pubkey().to_string());
    }

    #[test]
    fn test_load_json_array_file() {
        let keypair = Keypair::new();
        let mut temp_file = NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        temp_file.write_all(json.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let wallet = WalletManager::from_file(temp_file.path()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_load_base58_file() {
        let keypair = Keypair::new();
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "{}", keypair.to_base58_string()).unwrap();
        temp_file.flush().unwrap();

        let wallet = WalletManager::from_file(temp_file.path()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_invalid_bytes() {
        assert!(WalletManager::from_bytes(&[0u8; 10]).is_err());
        assert!(WalletManager::from_base58("not-base58-0OIl").is_err());
    }

    #[test]
    fn test_invalid_json_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[1, 2, oops").unwrap();
        temp_file.flush().unwrap();

        let result = WalletManager::from_file(temp_file.path());
        assert!(matches!(result, Err(WalletError::LoadError(_))));
    }

    #[test]
    fn test_clone_wallet() {
        let wallet1 = WalletManager::new_random();
        let wallet2 = wallet1.clone();
        assert_eq!(wallet1.public_key(), wallet2.public_key());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let keypair = Keypair::new();
        let secret = keypair.to_base58_string();
        let wallet = WalletManager::from_base58(&secret).unwrap();

        let debug = format!("{:?}", wallet);
        assert!(debug.contains(&wallet.public_key()));
        assert!(!debug.contains(&secret));
    }

    #[test]
    fn test_sign_versioned_transaction() {
        let wallet = WalletManager::new_random();
        let payer = wallet.pubkey();
        let ix = Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[1],
            vec![AccountMeta::new(payer, true)],
        );
        let mut message = Message::new(&[ix], Some(&payer));
        message.recent_blockhash = Hash::new_unique();

        let tx = wallet.sign_transaction(VersionedMessage::Legacy(message)).unwrap();
        assert_eq!(tx.signatures.len(), 1);
        assert_ne!(tx.signatures[0], Signature::default());
        assert!(tx.verify_with_results().iter().all(|ok| *ok));
    }
}
