//! Signing orchestration: turns one chain-level transfer into the one-or-many keysign
//! sessions it needs (a single digest for account-based chains, one digest per UTXO input
//! for Bitcoin-style chains), then folds the resulting signatures back into a transaction via
//! the caller's [`ChainCodec`].

use vultisig_core::chain::ChainCodec;
use vultisig_core::crypto::{SignatureAlgorithm, SignatureEncoding};
use vultisig_core::share::KeyShare;

use crate::errors::SessionError;
use crate::progress::ProgressSender;
use crate::relay::RelayClient;
use crate::session::{run_keysign, CancellationToken, SessionContext};

/// Recovers the ECDSA recovery id (0/1/2/3) for a compact (r, s) signature over `message_hash`
/// against `expected_key`, trying both low-`s` candidates the kernel might have produced.
///
/// DKLS kernels emit raw (r, s) without an embedded recovery id; callers that need one (EVM
/// transaction signing) recover it by re-deriving the signer from each candidate.
pub fn recover_ecdsa_recovery_id(
    message_hash: &[u8; 32],
    signature_der_or_raw: &[u8],
    expected_key: &vultisig_core::crypto::VerifyingKey,
) -> Option<u8> {
    use k256::ecdsa::{RecoveryId, Signature as KSignature, VerifyingKey as KVerifyingKey};

    let sig = if signature_der_or_raw.len() == 64 {
        KSignature::from_slice(signature_der_or_raw).ok()?
    } else {
        KSignature::from_der(signature_der_or_raw).ok()?
    };

    for id in 0u8..4 {
        let Some(recovery_id) = RecoveryId::from_byte(id) else { continue };
        if let Ok(recovered) = KVerifyingKey::recover_from_prehash(message_hash, &sig, recovery_id) {
            if recovered.to_encoded_point(true).as_bytes() == expected_key.key.as_slice() {
                return Some(id);
            }
        }
    }
    None
}

/// Runs one keysign session per hash `codec.message_hashes(input)` returns (in order), then
/// compiles the finished transaction. Each hash gets its own relay session, derived from
/// `session_id_prefix` plus its index, since a signing session is never reused across hashes.
pub async fn sign_transaction<C: ChainCodec>(
    relay: &dyn RelayClient,
    kernel: &dyn vultisig_core::kernel::ProtocolKernel,
    progress: &ProgressSender,
    codec: &C,
    input: &C::PreSignInput,
    session_id_prefix: &str,
    local_party_id: &str,
    party_ids: &[String],
    encryption_key: [u8; 32],
    key_id: &str,
    derivation_path: &str,
    share: &KeyShare,
    session_config: &SessionDriverConfig,
    cancellation: &CancellationToken,
) -> Result<C::CompiledTx, SessionError> {
    let hashes = codec.message_hashes(input);
    let mut signatures = Vec::with_capacity(hashes.len());

    for (index, hash) in hashes.iter().enumerate() {
        let ctx = SessionContext {
            session_id: format!("{session_id_prefix}-{index}"),
            local_party_id: local_party_id.to_string(),
            party_ids: party_ids.to_vec(),
            encryption_key,
            max_retries: session_config.max_retries,
            poll_interval: session_config.poll_interval,
            peer_join_timeout: session_config.peer_join_timeout,
            cancellation: cancellation.clone(),
        };

        let mut signature = run_keysign(relay, kernel, &ctx, progress, key_id, derivation_path, hash, share).await?;

        if codec.chain().algo() == SignatureAlgorithm::ECDSA && signature.enc == SignatureEncoding::Raw64 {
            if let Ok(hash32) = <[u8; 32]>::try_from(hash.as_slice()) {
                signature.recovery_id = recover_ecdsa_recovery_id(&hash32, &signature.sig, &share.public_key());
            }
        }
        signatures.push(signature);
    }

    Ok(codec.compile(input, &signatures))
}

/// The slice of [`SessionContext`] that doesn't vary per-hash, broken out so
/// [`sign_transaction`] doesn't need the full relay/kernel plumbing repeated at every call
/// site.
pub struct SessionDriverConfig {
    pub max_retries: u32,
    pub poll_interval: std::time::Duration,
    pub peer_join_timeout: std::time::Duration,
}

impl From<&crate::config::Config> for SessionDriverConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            max_retries: config.max_retries,
            poll_interval: config.poll_interval,
            peer_join_timeout: config.peer_join_timeout,
        }
    }
}
