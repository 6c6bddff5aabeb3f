//! Cryptography types, abstractions and utilities shared across the ECDSA and EdDSA flows.

use sha2::{Digest, Sha256};

use crate::errors::CryptoError;

/// A verifying key (e.g. an ECDSA/secp256k1 or EdDSA/ed25519 public key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyingKey {
    /// The verifying key as a sequence of bytes.
    pub key: Vec<u8>,
    /// The signature algorithm.
    pub algo: SignatureAlgorithm,
    /// The elliptic curve.
    pub curve: EllipticCurve,
    /// The encoding standard used for the verifying key.
    pub enc: KeyEncoding,
}

impl VerifyingKey {
    /// Returns the verifying key bytes as a lowercase hex string, the form vaults store.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.key)
    }
}

/// A signature (e.g. an ECDSA/secp256k1/SHA-256 or EdDSA/ed25519 signature).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// The signature as a sequence of bytes.
    pub sig: Vec<u8>,
    /// The signature algorithm.
    pub algo: SignatureAlgorithm,
    /// The elliptic curve.
    pub curve: EllipticCurve,
    /// The hash function used to produce the signed digest, when applicable.
    pub hash: HashFunction,
    /// The encoding standard used for the signature.
    pub enc: SignatureEncoding,
    /// The ECDSA recovery id (0/1), if the signer produced one. Always `None` for EdDSA.
    pub recovery_id: Option<u8>,
}

/// A signature algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SignatureAlgorithm {
    /// DKLS-style threshold ECDSA.
    /// Ref: <https://en.wikipedia.org/wiki/Elliptic_Curve_Digital_Signature_Algorithm>.
    ECDSA,
    /// Schnorr-style threshold EdDSA.
    /// Ref: <https://en.wikipedia.org/wiki/EdDSA>.
    EdDSA,
}

/// An elliptic curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EllipticCurve {
    /// Ref: <https://www.secg.org/sec2-v2.pdf>.
    Secp256k1,
    /// Ref: <https://en.wikipedia.org/wiki/Curve25519>.
    Curve25519,
}

/// A cryptographic hash function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashFunction {
    /// Ref: <https://en.wikipedia.org/wiki/SHA-2>.
    SHA256,
    /// Ref: <https://en.wikipedia.org/wiki/SHA-3>.
    KECCAK256,
    /// EdDSA signs the message directly; no pre-hash is applied by the caller.
    None,
}

/// A key encoding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEncoding {
    /// Compressed SEC1 point, used for secp256k1 public keys.
    /// Ref: <https://www.secg.org/sec1-v2.pdf>.
    SEC1,
    /// Raw 32-byte encoding, used for ed25519 public keys.
    Raw32,
}

/// A signature encoding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureEncoding {
    /// DER-encoded (r, s), used by ECDSA.
    /// Ref: <https://en.wikipedia.org/wiki/X.690#DER_encoding>.
    DER,
    /// Raw 64-byte (R, s), used by EdDSA.
    Raw64,
}

/// Returns an `Ok` result for a valid signature over `msg`, or an appropriate `Err` result otherwise.
pub fn verify_signature(
    verifying_key: &VerifyingKey,
    msg: &[u8],
    signature: &Signature,
) -> Result<(), CryptoError> {
    if verifying_key.algo != signature.algo {
        return Err(CryptoError::SignatureAlgorithmMismatch);
    }
    if verifying_key.curve != signature.curve {
        return Err(CryptoError::EllipticCurveMismatch);
    }

    match (verifying_key.algo, verifying_key.curve, verifying_key.enc) {
        (SignatureAlgorithm::ECDSA, EllipticCurve::Secp256k1, KeyEncoding::SEC1) => {
            verify_ecdsa_secp256k1(verifying_key, msg, signature)
        }
        (SignatureAlgorithm::EdDSA, EllipticCurve::Curve25519, KeyEncoding::Raw32) => {
            verify_eddsa_ed25519(verifying_key, msg, signature)
        }
        _ => Err(CryptoError::UnsupportedEllipticCurve),
    }
}

fn verify_ecdsa_secp256k1(
    verifying_key: &VerifyingKey,
    msg: &[u8],
    signature: &Signature,
) -> Result<(), CryptoError> {
    if signature.enc != SignatureEncoding::DER {
        return Err(CryptoError::UnsupportedSignatureEncoding);
    }
    if signature.hash != HashFunction::SHA256 {
        return Err(CryptoError::UnsupportedHashFunction);
    }

    use k256::ecdsa::signature::Verifier;
    let ver_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&verifying_key.key)
        .map_err(|_| CryptoError::InvalidVerifyingKey)?;
    let sig = k256::ecdsa::Signature::from_der(&signature.sig)
        .map_err(|_| CryptoError::MalformedSignature)?;
    ver_key
        .verify(msg, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

fn verify_eddsa_ed25519(
    verifying_key: &VerifyingKey,
    msg: &[u8],
    signature: &Signature,
) -> Result<(), CryptoError> {
    use ed25519_dalek::Verifier;

    if signature.enc != SignatureEncoding::Raw64 {
        return Err(CryptoError::UnsupportedSignatureEncoding);
    }

    let key_bytes: [u8; 32] = verifying_key
        .key
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidVerifyingKey)?;
    let ver_key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| CryptoError::InvalidVerifyingKey)?;

    let sig_bytes: [u8; 64] = signature
        .sig
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::MalformedSignature)?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);

    ver_key
        .verify(msg, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Returns the SHA-256 digest of `bytes` as a lowercase hex string.
///
/// Used as the content hash for relay message dedup (see [`crate::codec`]).
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}
