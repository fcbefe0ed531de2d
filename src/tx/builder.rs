//! Transaction construction and signing

use super::params::ResolvedCall;
use crate::error::DispatchResult;
use crate::wallet::TransactionSigner;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, TransactionRequest, H256};
use ethers::utils::keccak256;
use std::sync::Arc;
use tracing::debug;

/// A transaction ready for `eth_sendRawTransaction`
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub call: ResolvedCall,
    /// RLP encoding of the signed transaction
    pub raw: Bytes,
    pub hash: H256,
}

/// Build the unsigned transaction for `call`.
///
/// Without a recipient the transaction deploys `call.data` as a contract;
/// otherwise it transfers value and data to the recipient. The chain id is
/// bound into the transaction so the signature is only valid on that chain.
pub fn build_transaction(call: &ResolvedCall) -> TypedTransaction {
    let mut request = TransactionRequest::new()
        .from(call.from)
        .value(call.value)
        .data(call.data.clone())
        .nonce(call.nonce)
        .gas(call.gas_limit)
        .gas_price(call.gas_price)
        .chain_id(call.chain_id);

    if let Some(to) = call.to {
        request = request.to(to);
    }

    TypedTransaction::Legacy(request)
}

/// Builds and signs transactions with keystore keys
pub struct TransactionBuilder {
    signer: Arc<dyn TransactionSigner>,
}

impl TransactionBuilder {
    pub fn new(signer: Arc<dyn TransactionSigner>) -> Self {
        Self { signer }
    }

    /// Sign `call` as its sender, using the chain id fetched alongside its nonce
    pub async fn sign(&self, call: ResolvedCall, passphrase: &str) -> DispatchResult<SignedTransaction> {
        let tx = build_transaction(&call);
        let signature = self
            .signer
            .sign_transaction(call.from, passphrase, &tx, call.chain_id)
            .await?;

        let raw = tx.rlp_signed(&signature);
        let hash = H256::from(keccak256(&raw));
        debug!("Signed transaction {:?} (nonce {})", hash, call.nonce);

        Ok(SignedTransaction { call, raw, hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::wallet::testing::PlainSigner;
    use ethers::types::{Address, NameOrAddress, U256};

    fn resolved(from: Address, to: Option<Address>) -> ResolvedCall {
        ResolvedCall {
            from,
            to,
            value: U256::from(1_000),
            data: vec![0x60, 0x80, 0x60, 0x40].into(),
            gas_limit: U256::from(90_000),
            gas_price: U256::from(2_000_000_000u64),
            nonce: U256::from(7),
            chain_id: 1337,
        }
    }

    #[test]
    fn test_contract_creation_has_no_recipient() {
        let tx = build_transaction(&resolved(Address::repeat_byte(1), None));
        assert!(tx.to().is_none());
        assert_eq!(tx.data().unwrap().to_vec(), vec![0x60, 0x80, 0x60, 0x40]);
    }

    #[test]
    fn test_transfer_targets_recipient() {
        let to = Address::repeat_byte(2);
        let tx = build_transaction(&resolved(Address::repeat_byte(1), Some(to)));

        assert_eq!(tx.to(), Some(&NameOrAddress::Address(to)));
        assert_eq!(tx.value(), Some(&U256::from(1_000)));
        assert_eq!(tx.nonce(), Some(&U256::from(7)));
        assert_eq!(tx.gas(), Some(&U256::from(90_000)));
        assert_eq!(tx.chain_id().map(|id| id.as_u64()), Some(1337));
    }

    #[tokio::test]
    async fn test_signature_bound_to_fetched_chain_id() {
        let signer = PlainSigner::new("pw");
        let from = signer.address();
        let builder = TransactionBuilder::new(Arc::new(signer));

        let call = resolved(from, Some(Address::repeat_byte(2)));
        let signed = builder.sign(call.clone(), "pw").await.unwrap();

        assert_eq!(signed.hash, H256::from(keccak256(&signed.raw)));
        assert_eq!(signed.call, call);

        let tx = build_transaction(&call);
        let rlp = ethers::utils::rlp::Rlp::new(&signed.raw);
        let (decoded, signature) = TypedTransaction::decode_signed(&rlp).unwrap();
        assert_eq!(decoded.nonce(), tx.nonce());
        assert_eq!(signature.recover(tx.sighash()).unwrap(), from);
        // EIP-155: v = chain_id * 2 + 35 + parity
        assert!(signature.v == 1337 * 2 + 35 || signature.v == 1337 * 2 + 36);
    }

    #[tokio::test]
    async fn test_wrong_passphrase_fails_signing() {
        let signer = PlainSigner::new("pw");
        let from = signer.address();
        let builder = TransactionBuilder::new(Arc::new(signer));

        let err = builder.sign(resolved(from, None), "nope").await.unwrap_err();
        assert!(matches!(err, DispatchError::Wallet(_)));
    }
}
