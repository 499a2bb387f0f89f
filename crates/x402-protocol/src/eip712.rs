//! EIP-712 typed-data signing and signer recovery for EIP-3009
//! `TransferWithAuthorization` messages.
//!
//! - Domains are built from asset metadata ([`AssetDomain`])
//! - Signing hashes ([`signing_hash`]) and signatures ([`sign_authorization`])
//! - Recovery with EIP-2 malleability protection ([`recover_signer`])
//! - Cryptographically secure nonces ([`random_nonce`])

use std::borrow::Cow;

use alloy::primitives::{Address, Bytes, Signature, B256, U256};
use alloy::signers::Signer;
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};

use crate::payment::ExactEvmAuthorization;
use crate::X402Error;

sol! {
    /// EIP-3009 message as hashed by USDC's `transferWithAuthorization`.
    #[derive(Debug)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

impl From<&ExactEvmAuthorization> for TransferWithAuthorization {
    fn from(auth: &ExactEvmAuthorization) -> Self {
        Self {
            from: auth.from,
            to: auth.to,
            value: auth.value,
            validAfter: U256::from(auth.valid_after),
            validBefore: U256::from(auth.valid_before),
            nonce: auth.nonce,
        }
    }
}

/// The token contract's EIP-712 domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl AssetDomain {
    pub fn eip712_domain(&self) -> Eip712Domain {
        Eip712Domain {
            name: Some(Cow::Owned(self.name.clone())),
            version: Some(Cow::Owned(self.version.clone())),
            chain_id: Some(U256::from(self.chain_id)),
            verifying_contract: Some(self.verifying_contract),
            salt: None,
        }
    }
}

/// The EIP-712 digest a payer signs for `auth` under `domain`.
pub fn signing_hash(auth: &ExactEvmAuthorization, domain: &AssetDomain) -> B256 {
    TransferWithAuthorization::from(auth).eip712_signing_hash(&domain.eip712_domain())
}

/// Sign `auth` with `signer`, returning the 65-byte `r || s || v` signature.
pub async fn sign_authorization<S>(
    signer: &S,
    auth: &ExactEvmAuthorization,
    domain: &AssetDomain,
) -> Result<Bytes, X402Error>
where
    S: Signer + Send + Sync,
{
    let hash = signing_hash(auth, domain);
    let signature = signer
        .sign_hash(&hash)
        .await
        .map_err(|e| X402Error::SignatureError(format!("signing failed: {e}")))?;
    Ok(Bytes::from(signature.as_bytes().to_vec()))
}

/// secp256k1 curve order N / 2. Signatures with s above this are malleable (EIP-2).
const SECP256K1_N_DIV_2: U256 = U256::from_limbs([
    0xBFD25E8CD0364140,
    0xBAAEDCE6AF48A03B,
    0xFFFFFFFFFFFFFFFE,
    0x7FFFFFFFFFFFFFFF,
]);

/// Recover the address that signed `auth` under `domain`.
///
/// Rejects signatures that are not exactly 65 bytes or carry a high `s`.
pub fn recover_signer(
    auth: &ExactEvmAuthorization,
    signature: &[u8],
    domain: &AssetDomain,
) -> Result<Address, X402Error> {
    if signature.len() != 65 {
        return Err(X402Error::SignatureError(format!(
            "signature must be 65 bytes, got {}",
            signature.len()
        )));
    }

    // from_raw accepts v in {0, 1, 27, 28} and rejects anything else.
    let sig = Signature::from_raw(signature)
        .map_err(|e| X402Error::SignatureError(format!("invalid signature: {e}")))?;

    if sig.s() > SECP256K1_N_DIV_2 {
        return Err(X402Error::SignatureError(
            "high-s signature rejected (EIP-2 malleability)".to_string(),
        ));
    }

    let hash = signing_hash(auth, domain);
    sig.recover_address_from_prehash(&hash)
        .map_err(|e| X402Error::SignatureError(format!("recovery failed: {e}")))
}

/// A fresh 32-byte authorization nonce from the OS CSPRNG.
pub fn random_nonce() -> B256 {
    let mut bytes = [0u8; 32];
    rand::fill(&mut bytes);
    B256::from(bytes)
}
