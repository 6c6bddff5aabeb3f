//! Key share types, abstractions and utilities.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{EllipticCurve, KeyEncoding, SignatureAlgorithm, VerifyingKey};
use crate::errors::VaultError;

/// Opaque bytes produced by a DKG kernel run.
///
/// Combined with `threshold - 1` other shares, a `KeyShare` can produce a signature, but on
/// its own it reveals nothing about the private key. The layout is whatever the owning
/// kernel (DKLS for ECDSA, the Schnorr kernel for EdDSA) chose to serialize; this type only
/// knows how to extract the two fields every share must carry for the vault invariants in
/// the data model to be checkable without asking the kernel: the derived public key and the
/// root chain code.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyShare {
    #[zeroize(skip)]
    algo: SignatureAlgorithm,
    bytes: Vec<u8>,
    #[zeroize(skip)]
    public_key: Vec<u8>,
    chain_code: [u8; 32],
}

impl KeyShare {
    /// Builds a key share from its kernel-produced bytes plus the two fields the vault
    /// invariants need: the share's derived public key and its root chain code.
    pub fn new(
        algo: SignatureAlgorithm,
        bytes: Vec<u8>,
        public_key: Vec<u8>,
        chain_code: [u8; 32],
    ) -> Self {
        Self {
            algo,
            bytes,
            public_key,
            chain_code,
        }
    }

    /// The signature algorithm this share was generated for.
    pub fn algo(&self) -> SignatureAlgorithm {
        self.algo
    }

    /// The opaque serialized share bytes, as produced by `Session::finish`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The verifying key this share (combined with a threshold of its peers) can sign for.
    pub fn public_key(&self) -> VerifyingKey {
        let (curve, enc) = match self.algo {
            SignatureAlgorithm::ECDSA => (EllipticCurve::Secp256k1, KeyEncoding::SEC1),
            SignatureAlgorithm::EdDSA => (EllipticCurve::Curve25519, KeyEncoding::Raw32),
        };
        VerifyingKey {
            key: self.public_key.clone(),
            algo: self.algo,
            curve,
            enc,
        }
    }

    /// The BIP32-style chain code shared between this vault's ECDSA and EdDSA shares.
    pub fn root_chain_code(&self) -> [u8; 32] {
        self.chain_code
    }

    /// Checks the invariant that this share's derived public key matches `expected`.
    pub fn verify_public_key(&self, expected: &VerifyingKey) -> Result<(), VaultError> {
        if &self.public_key() == expected {
            Ok(())
        } else {
            Err(VaultError::ShareKeyMismatch)
        }
    }

    /// Base64-encodes the share bytes for storage in a vault container.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

impl std::fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyShare")
            .field("algo", &self.algo)
            .field("bytes", &format_args!("<{} bytes redacted>", self.bytes.len()))
            .field("public_key", &hex::encode(&self.public_key))
            .finish()
    }
}
