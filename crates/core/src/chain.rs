//! The chain codec seam: the boundary between the algorithm-agnostic signing orchestration
//! in this crate and per-chain transaction encoding, which lives outside it entirely.
//!
//! Concrete codecs (EVM RLP, UTXO PSBT, Cosmos SDK proto, ...) are not implemented here — see
//! the Non-goals on chain-specific transaction building. This module only defines the trait
//! boundary a caller's codec must satisfy to hand off into the MPC session runtime.

use crate::crypto::{Signature, SignatureAlgorithm};

/// Identifies which signature algorithm and derivation a chain uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Bitcoin,
    Ethereum,
    Solana,
    Cosmos,
    ThorChain,
}

impl Chain {
    /// The signature algorithm this chain signs with.
    pub fn algo(&self) -> SignatureAlgorithm {
        match self {
            Chain::Bitcoin | Chain::Ethereum | Chain::Cosmos | Chain::ThorChain => {
                SignatureAlgorithm::ECDSA
            }
            Chain::Solana => SignatureAlgorithm::EdDSA,
        }
    }
}

/// A chain-specific transaction compiler, handed to the signing orchestration so it can turn
/// one logical transfer into the one-or-many message hashes a threshold signer actually signs
/// (a single EVM digest, or one digest per UTXO input), then fold the resulting signatures
/// back into a broadcastable transaction.
///
/// Implemented outside this crate, by the caller's chain layer; this crate only ever holds
/// `&dyn ChainCodec` or a generic bound on it.
pub trait ChainCodec {
    /// The chain-specific description of what to sign (e.g. recipient, amount, UTXO set).
    type PreSignInput;
    /// The chain-specific compiled transaction, ready to broadcast once signed.
    type CompiledTx;

    fn chain(&self) -> Chain;

    /// Computes the message hash(es) this transaction needs signed, in signing order.
    fn message_hashes(&self, input: &Self::PreSignInput) -> Vec<Vec<u8>>;

    /// Folds one signature per hash returned by [`ChainCodec::message_hashes`] (same order)
    /// into a finished, broadcastable transaction.
    fn compile(&self, input: &Self::PreSignInput, signatures: &[Signature]) -> Self::CompiledTx;
}

/// Derives a chain's receive address from a vault's public keys and chain code.
///
/// Separate from [`ChainCodec`] because address derivation needs no signing session and no
/// `PreSignInput`/`CompiledTx` — a vault wants addresses long before it ever signs anything.
/// Implemented outside this crate by the caller's chain layer, same as `ChainCodec`.
pub trait AddressDeriver {
    fn derive_address(
        &self,
        chain: Chain,
        public_keys: &crate::vault::PublicKeys,
        hex_chain_code: &str,
    ) -> Result<String, crate::errors::VaultError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_algo_matches_curve_family() {
        assert_eq!(Chain::Bitcoin.algo(), SignatureAlgorithm::ECDSA);
        assert_eq!(Chain::Ethereum.algo(), SignatureAlgorithm::ECDSA);
        assert_eq!(Chain::Cosmos.algo(), SignatureAlgorithm::ECDSA);
        assert_eq!(Chain::ThorChain.algo(), SignatureAlgorithm::ECDSA);
        assert_eq!(Chain::Solana.algo(), SignatureAlgorithm::EdDSA);
    }
}
