//! Error taxonomy shared by every component of the core.

use std::fmt;

/// Cryptographic failures: AEAD integrity, malformed keys/signatures, algorithm mismatches.
///
/// These are always fatal — the runtime never retries a `CryptoError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The AES-GCM authentication tag did not match (tampering or wrong key).
    Integrity,
    /// A signature failed to verify against its claimed verifying key.
    InvalidSignature,
    /// A verifying key could not be parsed.
    InvalidVerifyingKey,
    /// A signature's bytes could not be parsed in the encoding it claims.
    MalformedSignature,
    /// The signature's algorithm does not match the verifying key's algorithm.
    SignatureAlgorithmMismatch,
    /// The signature's curve does not match the verifying key's curve.
    EllipticCurveMismatch,
    UnsupportedHashFunction,
    UnsupportedSignatureEncoding,
    UnsupportedKeyEncoding,
    UnsupportedEllipticCurve,
    UnsupportedSignatureAlgorithm,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integrity => write!(f, "AEAD integrity check failed"),
            Self::InvalidSignature => write!(f, "signature verification failed"),
            Self::InvalidVerifyingKey => write!(f, "verifying key could not be parsed"),
            Self::MalformedSignature => write!(f, "signature could not be parsed"),
            Self::SignatureAlgorithmMismatch => write!(f, "signature algorithm does not match verifying key"),
            Self::EllipticCurveMismatch => write!(f, "signature curve does not match verifying key"),
            Self::UnsupportedHashFunction => write!(f, "unsupported hash function"),
            Self::UnsupportedSignatureEncoding => write!(f, "unsupported signature encoding"),
            Self::UnsupportedKeyEncoding => write!(f, "unsupported key encoding"),
            Self::UnsupportedEllipticCurve => write!(f, "unsupported elliptic curve"),
            Self::UnsupportedSignatureAlgorithm => write!(f, "unsupported signature algorithm"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Vault-domain failures: bad input, broken invariants, lock state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// A vault name failed the non-empty/length/charset checks.
    InvalidName,
    /// The supplied password did not unlock the vault container.
    InvalidPassword,
    /// The vault container bytes could not be parsed.
    MalformedContainer,
    /// A key share's derived public key does not match the vault's recorded public key.
    ShareKeyMismatch,
    /// A required key share (ECDSA or EdDSA) is missing.
    MissingShare,
    /// The ECDSA and EdDSA shares disagree on their root chain code.
    ChainCodeMismatch,
    /// An operation requiring an unlocked vault was attempted while locked.
    Locked,
    /// A signing mode was requested that this vault's signer roster does not support.
    UnsupportedSigningMode,
    /// A chain has no registered `ChainCodec`.
    UnknownChain,
    /// The [`crate::vault::FastVaultCoordinator`] or [`crate::vault::SigningDriver`]
    /// implementation failed (relay/transport/kernel error). The message is the
    /// implementation's own error rendered as text, since this crate has no visibility into
    /// its transport-level error types.
    Coordinator(String),
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "vault name must be 2-50 chars of [A-Za-z0-9 _-]"),
            Self::InvalidPassword => write!(f, "incorrect vault password"),
            Self::MalformedContainer => write!(f, "malformed vault container"),
            Self::ShareKeyMismatch => write!(f, "key share public key does not match vault identity"),
            Self::MissingShare => write!(f, "vault is missing a required key share"),
            Self::ChainCodeMismatch => write!(f, "ecdsa and eddsa shares disagree on chain code"),
            Self::Locked => write!(f, "vault is locked"),
            Self::UnsupportedSigningMode => write!(f, "signing mode not available for this vault"),
            Self::UnknownChain => write!(f, "no chain codec registered for this chain"),
            Self::Coordinator(msg) => write!(f, "fast-vault coordinator error: {msg}"),
        }
    }
}

impl std::error::Error for VaultError {}

/// Outcome of a protocol kernel call that did not reach a terminal state cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Worth retrying within the session's retry budget (e.g. the kernel aborted mid-round
    /// because a peer message never arrived before a local timeout).
    Transient,
    /// Not worth retrying (e.g. the kernel rejected the setup message outright).
    Permanent(String),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "kernel returned a transient error"),
            Self::Permanent(msg) => write!(f, "kernel returned a permanent error: {msg}"),
        }
    }
}

impl std::error::Error for KernelError {}

/// The top-level error type returned by the core crate's public operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Crypto(CryptoError),
    Vault(VaultError),
    Kernel(KernelError),
    /// Malformed caller input that isn't covered by a more specific variant.
    InvalidInput(String),
    /// A capability (signing mode, chain, feature) the caller asked for isn't available.
    NotSupported(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crypto(e) => write!(f, "{e}"),
            Self::Vault(e) => write!(f, "{e}"),
            Self::Kernel(e) => write!(f, "{e}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::NotSupported(msg) => write!(f, "not supported: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        Self::Crypto(e)
    }
}

impl From<VaultError> for Error {
    fn from(e: VaultError) -> Self {
        Self::Vault(e)
    }
}

impl From<KernelError> for Error {
    fn from(e: KernelError) -> Self {
        Self::Kernel(e)
    }
}
