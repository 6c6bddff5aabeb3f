//! Message framing: authenticated encryption of relay bodies, content hashing for dedup,
//! and compact LZMA+base64 packing for QR/URI transport.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;

use crate::crypto::sha256_hex;
use crate::errors::CryptoError;

const NONCE_LEN: usize = 12;

/// A URI carrying a `jsonData=` payload longer than this must upload the blob out-of-band
/// and reference it by id instead.
pub const MAX_URI_LEN: usize = 2048;

/// Seals `plaintext` for transport over the relay: `base64(AES-GCM(key, nonce, plaintext) || nonce)`.
///
/// Non-deterministic: every call draws a fresh random nonce, so two encryptions of the same
/// plaintext under the same key produce different ciphertexts.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> String {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .expect("AES-GCM encryption over an unbounded-size plaintext cannot fail");

    let mut sealed = Vec::with_capacity(ciphertext.len() + NONCE_LEN);
    sealed.extend_from_slice(&ciphertext);
    sealed.extend_from_slice(nonce.as_slice());
    base64::engine::general_purpose::STANDARD.encode(sealed)
}

/// Opens a body produced by [`encrypt`]. Fails with [`CryptoError::Integrity`] on a tag
/// mismatch (wrong key, or the body was tampered with in transit).
pub fn decrypt(key: &[u8; 32], body: &str) -> Result<Vec<u8>, CryptoError> {
    let sealed = base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|_| CryptoError::Integrity)?;
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::Integrity);
    }
    let (ciphertext, nonce_bytes) = sealed.split_at(sealed.len() - NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Integrity)
}

/// The stable content hash used as a relay message id for dedup: SHA-256 of the encoded body.
pub fn content_hash(encoded_body: &str) -> String {
    sha256_hex(encoded_body.as_bytes())
}

/// Compresses `payload` (e.g. a serialized keysign message) with LZMA and base64-encodes the
/// result, for compact embedding in a `vultisig://` URI. Falls back to a raw base64 encoding
/// if compression fails; the byte tag lets [`unpack`] tell the two forms apart.
pub fn pack(payload: &[u8]) -> String {
    let mut compressed = Vec::new();
    match lzma_rs::lzma_compress(&mut &payload[..], &mut compressed) {
        Ok(()) => encode_tagged(PackTag::Compressed, &compressed),
        Err(_) => encode_tagged(PackTag::Raw, payload),
    }
}

/// Reverses [`pack`], accepting both the compressed and the raw fallback form.
pub fn unpack(packed: &str) -> Result<Vec<u8>, CryptoError> {
    let (tag, bytes) = decode_tagged(packed)?;
    match tag {
        PackTag::Raw => Ok(bytes),
        PackTag::Compressed => {
            let mut out = Vec::new();
            lzma_rs::lzma_decompress(&mut &bytes[..], &mut out).map_err(|_| CryptoError::Integrity)?;
            Ok(out)
        }
    }
}

#[derive(Clone, Copy)]
enum PackTag {
    Raw = 0,
    Compressed = 1,
}

fn encode_tagged(tag: PackTag, bytes: &[u8]) -> String {
    let mut tagged = Vec::with_capacity(bytes.len() + 1);
    tagged.push(tag as u8);
    tagged.extend_from_slice(bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(tagged)
}

fn decode_tagged(packed: &str) -> Result<(PackTag, Vec<u8>), CryptoError> {
    let tagged = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(packed)
        .map_err(|_| CryptoError::Integrity)?;
    let (&tag_byte, rest) = tagged.split_first().ok_or(CryptoError::Integrity)?;
    let tag = match tag_byte {
        0 => PackTag::Raw,
        1 => PackTag::Compressed,
        _ => return Err(CryptoError::Integrity),
    };
    Ok((tag, rest.to_vec()))
}

/// Builds a `vultisig://` keysign URI, substituting `&payloadId=<id>` for `&jsonData=<packed>`
/// when the latter would push the URI past [`MAX_URI_LEN`].
pub fn keysign_uri(vault_public_key_hex: &str, packed: &str, payload_id: impl Fn() -> String) -> String {
    let with_json = format!(
        "vultisig://vultisig.com?type=SignTransaction&vault={vault_public_key_hex}&jsonData={packed}"
    );
    if with_json.len() <= MAX_URI_LEN {
        with_json
    } else {
        format!(
            "vultisig://vultisig.com?type=SignTransaction&vault={vault_public_key_hex}&payloadId={}",
            payload_id()
        )
    }
}
