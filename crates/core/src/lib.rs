//! Core, transport-free primitives for the Vultisig threshold-signature wallet SDK: the
//! crypto adapter over the DKLS/Schnorr kernels, key-share types, the vault domain model and
//! its encrypted-at-rest container format, and the message framing shared by every transport.
//!
//! Networked components (the relay client, the MPC session runtime, the fast-vault
//! coordinator) live in the sibling `vultisig-mpc` crate, which depends on this one.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod chain;
pub mod codec;
pub mod crypto;
pub mod errors;
pub mod kernel;
pub mod share;
mod util;
pub mod vault;

#[cfg(feature = "dev")]
pub mod test_utils;

pub use chain::{AddressDeriver, Chain, ChainCodec};
pub use crypto::{
    verify_signature, EllipticCurve, HashFunction, KeyEncoding, Signature, SignatureAlgorithm,
    SignatureEncoding, VerifyingKey,
};
pub use errors::{CryptoError, Error, KernelError, VaultError};
pub use kernel::{OutboundMessage, ProtocolKernel, Session, SessionOutput};
pub use share::KeyShare;
pub use vault::{
    FastVaultCoordinator, FastVaultKeygenOutcome, KeyShares, LibType, PasswordCache, PasswordProvider,
    PublicKeys, SigningDriver, SigningMode, Vault, VaultRegistry,
};
