//! Keystore access and transaction signing
//!
//! Keys live in a geth-style keystore directory: one encrypted JSON file per
//! account, named `UTC--<timestamp>--<address>`. Keys are decrypted on demand
//! with the passphrase supplied for the transaction and never cached.

use crate::error::{DispatchError, DispatchResult};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Signature};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Signs transactions on behalf of passphrase-protected accounts
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Sign `tx` as `from`, binding the signature to `chain_id`
    async fn sign_transaction(
        &self,
        from: Address,
        passphrase: &str,
        tx: &TypedTransaction,
        chain_id: u64,
    ) -> DispatchResult<Signature>;
}

#[derive(Deserialize)]
struct KeyFileHeader {
    address: Option<String>,
}

/// Encrypted keystore directory
#[derive(Clone)]
pub struct KeystoreDir {
    path: PathBuf,
}

impl KeystoreDir {
    /// Open a keystore directory
    pub fn open(path: impl Into<PathBuf>) -> DispatchResult<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(DispatchError::Config(format!(
                "Keystore directory not found: {:?}",
                path
            )));
        }
        Ok(Self { path })
    }

    /// Locate the key file belonging to `address`
    fn find_key_file(&self, address: Address) -> DispatchResult<PathBuf> {
        let needle = hex::encode(address.as_bytes());

        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if name.ends_with(&needle) || key_file_address(&path).as_deref() == Some(needle.as_str()) {
                debug!("Found key file {:?} for {:?}", path, address);
                return Ok(path);
            }
        }

        Err(DispatchError::KeyNotFound {
            address: format!("{:?}", address),
        })
    }

    /// Decrypt the key for `address`
    fn unlock(&self, address: Address, passphrase: &str) -> DispatchResult<LocalWallet> {
        let key_file = self.find_key_file(address)?;
        let wallet = LocalWallet::decrypt_keystore(&key_file, passphrase)
            .map_err(|e| DispatchError::Wallet(format!("Failed to unlock {:?}: {}", address, e)))?;

        if wallet.address() != address {
            return Err(DispatchError::Wallet(format!(
                "Key file {:?} holds {:?}, expected {:?}",
                key_file,
                wallet.address(),
                address
            )));
        }
        Ok(wallet)
    }
}

/// Address recorded inside a key file, lowercase hex without prefix
fn key_file_address(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let header: KeyFileHeader = serde_json::from_str(&contents).ok()?;
    header
        .address
        .map(|a| a.trim_start_matches("0x").to_lowercase())
}

#[async_trait]
impl TransactionSigner for KeystoreDir {
    async fn sign_transaction(
        &self,
        from: Address,
        passphrase: &str,
        tx: &TypedTransaction,
        chain_id: u64,
    ) -> DispatchResult<Signature> {
        // scrypt key derivation runs off the async workers
        let keystore = self.clone();
        let passphrase = passphrase.to_string();
        let wallet = tokio::task::spawn_blocking(move || keystore.unlock(from, &passphrase))
            .await
            .map_err(|e| DispatchError::Wallet(format!("Key unlock task failed: {}", e)))??
            .with_chain_id(chain_id);
        wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| DispatchError::Wallet(e.to_string()))
    }
}

/// Resolve the default passphrase from a literal or a file
pub fn read_passphrase(literal: Option<&str>, file: Option<&Path>) -> DispatchResult<String> {
    if let Some(passphrase) = literal {
        return Ok(passphrase.to_string());
    }
    match file {
        Some(path) => {
            let contents = fs::read_to_string(path).map_err(|e| {
                DispatchError::Config(format!("Failed to read passphrase file {:?}: {}", path, e))
            })?;
            Ok(contents.trim_end_matches(['\r', '\n']).to_string())
        }
        None => Ok(String::new()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Unencrypted signer that still enforces a passphrase
    pub struct PlainSigner {
        pub wallet: LocalWallet,
        pub passphrase: String,
    }

    impl PlainSigner {
        pub fn new(passphrase: &str) -> Self {
            let wallet: LocalWallet =
                "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
                    .parse()
                    .unwrap();
            Self {
                wallet,
                passphrase: passphrase.to_string(),
            }
        }

        pub fn address(&self) -> Address {
            self.wallet.address()
        }
    }

    #[async_trait]
    impl TransactionSigner for PlainSigner {
        async fn sign_transaction(
            &self,
            from: Address,
            passphrase: &str,
            tx: &TypedTransaction,
            chain_id: u64,
        ) -> DispatchResult<Signature> {
            if from != self.wallet.address() {
                return Err(DispatchError::KeyNotFound {
                    address: format!("{:?}", from),
                });
            }
            if passphrase != self.passphrase {
                return Err(DispatchError::Wallet("could not decrypt key with given password".into()));
            }
            self.wallet
                .clone()
                .with_chain_id(chain_id)
                .sign_transaction(tx)
                .await
                .map_err(|e| DispatchError::Wallet(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::core::rand::thread_rng;
    use ethers::types::TransactionRequest;

    fn new_account(dir: &Path, passphrase: &str) -> Address {
        let (wallet, name) = LocalWallet::new_keystore(dir, &mut thread_rng(), passphrase, None).unwrap();
        let address = wallet.address();
        let renamed = format!("UTC--2024-01-01T00-00-00.000Z--{}", hex::encode(address.as_bytes()));
        fs::rename(dir.join(name), dir.join(renamed)).unwrap();
        address
    }

    fn sample_tx(chain_id: u64) -> TypedTransaction {
        TransactionRequest::new()
            .to(Address::repeat_byte(0x11))
            .value(1u64)
            .nonce(0u64)
            .gas(21_000u64)
            .gas_price(1u64)
            .chain_id(chain_id)
            .into()
    }

    #[tokio::test]
    async fn test_signs_with_matching_key() {
        let dir = tempfile::tempdir().unwrap();
        let address = new_account(dir.path(), "hunter2");
        let keystore = KeystoreDir::open(dir.path()).unwrap();

        let tx = sample_tx(5);
        let signature = keystore
            .sign_transaction(address, "hunter2", &tx, 5)
            .await
            .unwrap();

        assert_eq!(signature.recover(tx.sighash()).unwrap(), address);
        // EIP-155: v = chain_id * 2 + 35 + parity
        assert!(signature.v == 45 || signature.v == 46);
    }

    #[tokio::test]
    async fn test_wrong_passphrase_is_wallet_error() {
        let dir = tempfile::tempdir().unwrap();
        let address = new_account(dir.path(), "hunter2");
        let keystore = KeystoreDir::open(dir.path()).unwrap();

        let err = keystore
            .sign_transaction(address, "wrong", &sample_tx(5), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Wallet(_)));
    }

    #[tokio::test]
    async fn test_unknown_address_is_key_not_found() {
        let dir = tempfile::tempdir().unwrap();
        new_account(dir.path(), "hunter2");
        let keystore = KeystoreDir::open(dir.path()).unwrap();

        let err = keystore
            .sign_transaction(Address::repeat_byte(0x42), "hunter2", &sample_tx(5), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::KeyNotFound { .. }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_unlock_does_not_block_runtime() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let address = new_account(dir.path(), "hunter2");
        let keystore = KeystoreDir::open(dir.path()).unwrap();

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            }
        });

        keystore
            .sign_transaction(address, "hunter2", &sample_tx(5), 5)
            .await
            .unwrap();
        ticker.abort();

        assert!(ticks.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_missing_keystore_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(KeystoreDir::open(dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_passphrase_sources() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pass.txt");
        fs::write(&file, "from-file\n").unwrap();

        assert_eq!(read_passphrase(Some("literal"), Some(&file)).unwrap(), "literal");
        assert_eq!(read_passphrase(None, Some(&file)).unwrap(), "from-file");
        assert_eq!(read_passphrase(None, None).unwrap(), "");
        assert!(read_passphrase(None, Some(&dir.path().join("absent"))).is_err());
    }
}
