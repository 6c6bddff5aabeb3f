//! The vault domain model: identity, key-share lifecycle, encryption-at-rest and the
//! process-wide password cache and active-vault registry.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::chain::{AddressDeriver, Chain};
use crate::crypto::{SignatureAlgorithm, VerifyingKey};
use crate::errors::VaultError;
use crate::share::KeyShare;

/// Default TTL for a cached unlock password, per the process configuration in the
/// enumerated process configuration (`password_cache.default_ttl_ms`).
pub const DEFAULT_PASSWORD_CACHE_TTL: Duration = Duration::from_secs(300);

const SHARE_SALT_LEN: usize = 16;

/// Which key-generation backend produced a vault's shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LibType {
    /// The current DKLS/Schnorr stack.
    Dkls,
    /// The legacy GG20 stack, kept for vaults created before the DKLS migration.
    Gg20Legacy,
}

/// The two public keys shared by every vault, hex-encoded as vaults store them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeys {
    pub ecdsa: String,
    pub eddsa: String,
}

/// The plaintext payload sealed inside a vault's encrypted-at-rest envelope.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct SharePayload {
    ecdsa_bytes: Vec<u8>,
    ecdsa_public_key: Vec<u8>,
    eddsa_bytes: Vec<u8>,
    eddsa_public_key: Vec<u8>,
    chain_code: [u8; 32],
}

/// A vault's key shares, decrypted and ready for signing.
pub struct KeyShares {
    pub ecdsa: KeyShare,
    pub eddsa: KeyShare,
}

/// Which transport a signing round should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningMode {
    /// Sign against the remote `Server-*` co-signer's REST API. Only permitted on a fast
    /// vault ([`Vault::is_fast`]).
    Fast,
    /// Sign over the relay with the vault's own signer roster. Only permitted on a non-fast
    /// vault.
    Relay,
    /// Sign with every required share already held by this process.
    Local,
}

/// The shares and roster produced by a completed fast-vault keygen, ready to be packaged into
/// a [`Vault`] by [`Vault::create_fast`].
pub struct FastVaultKeygenOutcome {
    pub local_party_id: String,
    pub signers: Vec<String>,
    pub hex_chain_code: String,
    pub ecdsa_share: KeyShare,
    pub eddsa_share: KeyShare,
}

/// Host seam that drives the fast-vault keygen choreography (REST registration with the
/// `Server-*` co-signer, then the relay-borne ECDSA/EdDSA keygen). Implemented outside this
/// crate — `vultisig-mpc`'s `FastVaultOrchestrator` — since it requires HTTP and relay I/O
/// this crate deliberately has no dependency on.
#[async_trait::async_trait]
pub trait FastVaultCoordinator {
    /// Creates a new fast vault named `name`, registering `email` with the server for
    /// verification and sealing the server's share under `password`.
    async fn create(&self, name: &str, email: &str, password: &str) -> Result<FastVaultKeygenOutcome, VaultError>;
}

/// Host seam that performs one signing round for a [`SigningMode`]. Implemented outside this
/// crate for the same reason as [`FastVaultCoordinator`].
#[async_trait::async_trait]
pub trait SigningDriver {
    /// Signs `message` under `derivation_path` with the `algo` share from `shares`,
    /// coordinating with `signers` (the vault's full roster, including `local_party_id`) over
    /// the transport `mode` selects. `password` is the vault's own unlock password, needed
    /// only in [`SigningMode::Fast`] to authenticate the REST call that unseals the
    /// `Server-*` co-signer's share; other modes ignore it.
    async fn sign(
        &self,
        mode: SigningMode,
        algo: crate::crypto::SignatureAlgorithm,
        shares: &KeyShares,
        local_party_id: &str,
        signers: &[String],
        derivation_path: &str,
        password: &str,
        message: &[u8],
    ) -> Result<crate::crypto::Signature, VaultError>;
}

/// How a vault's key shares are currently held.
#[derive(Serialize, Deserialize)]
enum ShareStorage {
    /// Shipped in the clear; `export(None)` produced the container this came from.
    Plain(SharePayload),
    /// Sealed under a password-derived AES-256-GCM key.
    Encrypted { salt: [u8; SHARE_SALT_LEN], ciphertext: Vec<u8> },
}

/// A threshold-signature wallet's local handle on its identity, signer roster and shares.
///
/// Identity (the ECDSA public key) is fixed at construction and never changes across
/// rename, lock/unlock, or export/import — see the deterministic-identity property.
#[derive(Serialize, Deserialize)]
pub struct Vault {
    name: String,
    local_party_id: String,
    signers: Vec<String>,
    hex_chain_code: String,
    public_keys: PublicKeys,
    shares: ShareStorage,
    lib_type: LibType,
    reshare_prefix: String,
    is_backed_up: bool,
    created_at: u64,
    order: i64,
    #[serde(skip)]
    enabled_chains: Mutex<HashSet<Chain>>,
    #[serde(skip)]
    address_cache: Mutex<HashMap<Chain, String>>,
}

impl Vault {
    /// Builds a vault from a freshly completed keygen run, sealing the shares under
    /// `password`. Checks invariants (ii)-(iv) from the data model; invariant (i) — at
    /// least two signers — is checked against `signers` directly.
    pub fn from_keygen(
        name: &str,
        local_party_id: &str,
        signers: Vec<String>,
        hex_chain_code: String,
        ecdsa_share: KeyShare,
        eddsa_share: KeyShare,
        lib_type: LibType,
        password: &str,
    ) -> Result<Self, VaultError> {
        validate_name(name)?;
        validate_signers(&signers)?;
        if ecdsa_share.root_chain_code() != eddsa_share.root_chain_code() {
            return Err(VaultError::ChainCodeMismatch);
        }
        let expected_chain_code = hex::decode(&hex_chain_code)
            .ok()
            .and_then(|b| <[u8; 32]>::try_from(b).ok())
            .ok_or(VaultError::MalformedContainer)?;
        if ecdsa_share.root_chain_code() != expected_chain_code {
            return Err(VaultError::ChainCodeMismatch);
        }

        let public_keys = PublicKeys {
            ecdsa: ecdsa_share.public_key().to_hex(),
            eddsa: eddsa_share.public_key().to_hex(),
        };

        let payload = SharePayload {
            ecdsa_bytes: ecdsa_share.as_bytes().to_vec(),
            ecdsa_public_key: ecdsa_share.public_key().key,
            eddsa_bytes: eddsa_share.as_bytes().to_vec(),
            eddsa_public_key: eddsa_share.public_key().key,
            chain_code: expected_chain_code,
        };
        let (salt, ciphertext) = seal_share_payload(&payload, password)?;

        Ok(Self {
            name: name.to_string(),
            local_party_id: local_party_id.to_string(),
            signers,
            hex_chain_code,
            public_keys,
            shares: ShareStorage::Encrypted { salt, ciphertext },
            lib_type,
            reshare_prefix: String::new(),
            is_backed_up: false,
            created_at: crate::util::unix_timestamp_ms(),
            order: 0,
            enabled_chains: Mutex::new(HashSet::new()),
            address_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Drives a fast-vault keygen through `coordinator` and packages the resulting ECDSA and
    /// EdDSA shares into a new vault sealed under `password`. The server requires `email` to
    /// be verified before it will sign, so the returned vault cannot yet sign in
    /// [`SigningMode::Fast`] until that verification completes out of band.
    pub async fn create_fast(
        name: &str,
        email: &str,
        password: &str,
        coordinator: &dyn FastVaultCoordinator,
    ) -> Result<Self, VaultError> {
        let outcome = coordinator.create(name, email, password).await?;
        Self::from_keygen(
            name,
            &outcome.local_party_id,
            outcome.signers,
            outcome.hex_chain_code,
            outcome.ecdsa_share,
            outcome.eddsa_share,
            LibType::Dkls,
            password,
        )
    }

    /// Signs `message` under `derivation_path` using `mode`'s transport, decrypting this
    /// vault's shares with the password cached in `cache`.
    ///
    /// `mode` is gated by the signer roster: [`SigningMode::Fast`] requires a `Server-*`
    /// signer ([`Vault::is_fast`]); [`SigningMode::Relay`] requires there be none. Violating
    /// either fails with [`VaultError::UnsupportedSigningMode`] before any network I/O.
    pub async fn sign(
        &self,
        mode: SigningMode,
        algo: crate::crypto::SignatureAlgorithm,
        cache: &PasswordCache,
        derivation_path: &str,
        message: &[u8],
        driver: &dyn SigningDriver,
    ) -> Result<crate::crypto::Signature, VaultError> {
        match mode {
            SigningMode::Fast if !self.is_fast() => return Err(VaultError::UnsupportedSigningMode),
            SigningMode::Relay if self.is_fast() => return Err(VaultError::UnsupportedSigningMode),
            SigningMode::Fast | SigningMode::Relay | SigningMode::Local => {}
        }
        let password = cache.get(self.id()).ok_or(VaultError::Locked)?;
        let shares = self.decrypt_shares(&password)?;
        driver
            .sign(mode, algo, &shares, &self.local_party_id, &self.signers, derivation_path, &password, message)
            .await
    }

    /// The vault's immutable identity: the hex-encoded compressed ECDSA public key.
    pub fn id(&self) -> &str {
        &self.public_keys.ecdsa
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_party_id(&self) -> &str {
        &self.local_party_id
    }

    pub fn signers(&self) -> &[String] {
        &self.signers
    }

    pub fn hex_chain_code(&self) -> &str {
        &self.hex_chain_code
    }

    pub fn public_keys(&self) -> &PublicKeys {
        &self.public_keys
    }

    pub fn lib_type(&self) -> LibType {
        self.lib_type
    }

    pub fn is_backed_up(&self) -> bool {
        self.is_backed_up
    }

    pub fn mark_backed_up(&mut self) {
        self.is_backed_up = true;
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn order(&self) -> i64 {
        self.order
    }

    pub fn set_order(&mut self, order: i64) {
        self.order = order;
    }

    /// A vault is "fast" when exactly one signer's id starts with `Server-` — invariant (ii).
    pub fn is_fast(&self) -> bool {
        self.signers.iter().filter(|s| s.starts_with("Server-")).count() == 1
    }

    /// The chains currently enabled on this vault, in no particular order.
    pub fn chains(&self) -> Vec<Chain> {
        self.enabled_chains.lock().unwrap().iter().copied().collect()
    }

    /// Enables a chain. A no-op if it's already enabled.
    pub fn add_chain(&self, chain: Chain) {
        self.enabled_chains.lock().unwrap().insert(chain);
    }

    /// Disables a chain and drops its cached address.
    pub fn remove_chain(&self, chain: Chain) {
        self.enabled_chains.lock().unwrap().remove(&chain);
        self.address_cache.lock().unwrap().remove(&chain);
    }

    /// Returns this vault's address on `chain`, deriving (and caching) it on first access.
    /// Addresses never change for a given vault identity, so the cache lives for as long as
    /// the `Vault` handle does.
    pub fn address(&self, chain: Chain, deriver: &dyn AddressDeriver) -> Result<String, VaultError> {
        if let Some(cached) = self.address_cache.lock().unwrap().get(&chain) {
            return Ok(cached.clone());
        }
        let address = deriver.derive_address(chain, &self.public_keys, &self.hex_chain_code)?;
        self.address_cache.lock().unwrap().insert(chain, address.clone());
        Ok(address)
    }

    /// Returns addresses for `chains`, or for every currently enabled chain when `chains` is
    /// `None`.
    pub fn addresses(
        &self,
        chains: Option<&[Chain]>,
        deriver: &dyn AddressDeriver,
    ) -> Result<HashMap<Chain, String>, VaultError> {
        let targets: Vec<Chain> = match chains {
            Some(list) => list.to_vec(),
            None => self.chains(),
        };
        targets.into_iter().map(|chain| Ok((chain, self.address(chain, deriver)?))).collect()
    }

    /// Renames the vault; the name must be 2-50 chars of `[A-Za-z0-9 _-]`.
    pub fn rename(&mut self, new_name: &str) -> Result<(), VaultError> {
        validate_name(new_name)?;
        self.name = new_name.to_string();
        Ok(())
    }

    /// Verifies `password` decrypts the share payload, and on success caches it.
    pub fn unlock(&self, cache: &mut PasswordCache, password: &str) -> Result<(), VaultError> {
        self.decrypt_shares(password)?;
        cache.unlock(self.id(), password);
        Ok(())
    }

    /// Drops the cached password for this vault, along with its implicit access to the
    /// decrypted share material.
    pub fn lock(&self, cache: &mut PasswordCache) {
        cache.lock(self.id());
    }

    /// Ensures the vault is unlocked in `cache`, prompting `provider` for a password only if
    /// nothing valid is already cached. This is the host-application seam for the process
    /// configuration's `on_password_required(vault_id, name?)` callback: callers that already
    /// hold the password can call [`Vault::unlock`] directly and never touch this path.
    pub fn unlock_with(
        &self,
        cache: &mut PasswordCache,
        provider: &dyn PasswordProvider,
    ) -> Result<(), VaultError> {
        if self.is_unlocked(cache) {
            return Ok(());
        }
        let password = provider.provide(self.id(), Some(self.name()))?;
        self.unlock(cache, &password)
    }

    pub fn is_unlocked(&self, cache: &PasswordCache) -> bool {
        cache.is_unlocked(self.id())
    }

    pub fn unlock_time_remaining(&self, cache: &PasswordCache) -> Option<Duration> {
        cache.time_remaining(self.id())
    }

    /// Returns the decrypted key shares, using the password cached for this vault.
    /// Fails with [`VaultError::Locked`] if no password is cached (or it has expired).
    pub fn key_shares(&self, cache: &PasswordCache) -> Result<KeyShares, VaultError> {
        let password = cache.get(self.id()).ok_or(VaultError::Locked)?;
        self.decrypt_shares(&password)
    }

    fn decrypt_shares(&self, password: &str) -> Result<KeyShares, VaultError> {
        let payload = match &self.shares {
            ShareStorage::Plain(payload) => clone_payload(payload),
            ShareStorage::Encrypted { salt, ciphertext } => {
                open_share_payload(salt, ciphertext, password)?
            }
        };

        let ecdsa = KeyShare::new(
            SignatureAlgorithm::ECDSA,
            payload.ecdsa_bytes.clone(),
            payload.ecdsa_public_key.clone(),
            payload.chain_code,
        );
        let eddsa = KeyShare::new(
            SignatureAlgorithm::EdDSA,
            payload.eddsa_bytes.clone(),
            payload.eddsa_public_key.clone(),
            payload.chain_code,
        );
        ecdsa.verify_public_key(&VerifyingKey {
            key: hex::decode(&self.public_keys.ecdsa).map_err(|_| VaultError::MalformedContainer)?,
            algo: SignatureAlgorithm::ECDSA,
            curve: crate::crypto::EllipticCurve::Secp256k1,
            enc: crate::crypto::KeyEncoding::SEC1,
        })?;
        Ok(KeyShares { ecdsa, eddsa })
    }

    /// Returns `true` if the decoded container's first byte marks it as encrypted.
    /// A single-byte inspection — it does not attempt a decrypt.
    pub fn is_encrypted(encoded: &[u8]) -> bool {
        decode_container_tag(encoded).map(|(tag, _)| tag != 0).unwrap_or(false)
    }

    /// Re-encodes the vault as a self-contained container. If `password` is given, the
    /// share payload is (re-)sealed under it; otherwise the container ships the shares in
    /// the clear (tag byte `0`).
    pub fn export(&self, cache: &PasswordCache, password: Option<&str>) -> Result<Vec<u8>, VaultError> {
        use base64::Engine;

        let shares = match password {
            Some(pw) => {
                let payload = self.decrypt_shares_for_export(cache, pw)?;
                let (salt, ciphertext) = seal_share_payload(&payload, pw)?;
                ShareStorage::Encrypted { salt, ciphertext }
            }
            None => {
                let payload = self.decrypt_shares_for_export(cache, "")?;
                ShareStorage::Plain(payload)
            }
        };

        let snapshot = Vault {
            name: self.name.clone(),
            local_party_id: self.local_party_id.clone(),
            signers: self.signers.clone(),
            hex_chain_code: self.hex_chain_code.clone(),
            public_keys: self.public_keys.clone(),
            shares,
            lib_type: self.lib_type,
            reshare_prefix: self.reshare_prefix.clone(),
            is_backed_up: self.is_backed_up,
            created_at: self.created_at,
            order: self.order,
            enabled_chains: Mutex::new(HashSet::new()),
            address_cache: Mutex::new(HashMap::new()),
        };

        let tag: u8 = if password.is_some() { 1 } else { 0 };
        let json = serde_json::to_vec(&snapshot).map_err(|_| VaultError::MalformedContainer)?;
        let mut tagged = Vec::with_capacity(json.len() + 1);
        tagged.push(tag);
        tagged.extend_from_slice(&json);
        Ok(base64::engine::general_purpose::STANDARD.encode(tagged).into_bytes())
    }

    /// For a vault that's already plaintext at rest, `export` doesn't need a real password
    /// to produce a snapshot; for one that's encrypted, we still need *a* valid password to
    /// decrypt before we can re-seal (or ship in the clear).
    fn decrypt_shares_for_export(&self, cache: &PasswordCache, password: &str) -> Result<SharePayload, VaultError> {
        match &self.shares {
            ShareStorage::Plain(payload) => Ok(clone_payload(payload)),
            ShareStorage::Encrypted { salt, ciphertext } => {
                let pw = cache.get(self.id()).unwrap_or_else(|| Zeroizing::new(password.to_string()));
                open_share_payload(salt, ciphertext, &pw)
            }
        }
    }

    /// Parses a container produced by [`Vault::export`]. `password` is required when
    /// [`Vault::is_encrypted`] would return `true` for `encoded`.
    pub fn import(encoded: &[u8], password: Option<&str>) -> Result<Self, VaultError> {
        let (tag, json) = decode_container_tag(encoded).ok_or(VaultError::MalformedContainer)?;
        let mut vault: Vault = serde_json::from_slice(&json).map_err(|_| VaultError::MalformedContainer)?;

        if tag != 0 {
            let password = password.ok_or(VaultError::InvalidPassword)?;
            // Validate the password decrypts cleanly before handing back the vault; the
            // decrypted payload itself is discarded here — callers still need `unlock`.
            vault.decrypt_shares(password)?;
        }

        Ok(vault)
    }
}

fn clone_payload(payload: &SharePayload) -> SharePayload {
    SharePayload {
        ecdsa_bytes: payload.ecdsa_bytes.clone(),
        ecdsa_public_key: payload.ecdsa_public_key.clone(),
        eddsa_bytes: payload.eddsa_bytes.clone(),
        eddsa_public_key: payload.eddsa_public_key.clone(),
        chain_code: payload.chain_code,
    }
}

fn decode_container_tag(encoded: &[u8]) -> Option<(u8, Vec<u8>)> {
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let (&tag, rest) = decoded.split_first()?;
    Some((tag, rest.to_vec()))
}

fn derive_key(password: &str, salt: &[u8; SHARE_SALT_LEN]) -> Result<[u8; 32], VaultError> {
    let mut key = [0u8; 32];
    argon2::Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|_| VaultError::InvalidPassword)?;
    Ok(key)
}

fn seal_share_payload(payload: &SharePayload, password: &str) -> Result<([u8; SHARE_SALT_LEN], Vec<u8>), VaultError> {
    use rand::RngCore;
    let mut salt = [0u8; SHARE_SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let key = derive_key(password, &salt)?;
    let plaintext = serde_json::to_vec(payload).map_err(|_| VaultError::MalformedContainer)?;
    let sealed = crate::codec::encrypt(&key, &plaintext);
    Ok((salt, sealed.into_bytes()))
}

fn open_share_payload(salt: &[u8; SHARE_SALT_LEN], ciphertext: &[u8], password: &str) -> Result<SharePayload, VaultError> {
    let key = derive_key(password, salt)?;
    let body = std::str::from_utf8(ciphertext).map_err(|_| VaultError::InvalidPassword)?;
    let plaintext = crate::codec::decrypt(&key, body).map_err(|_| VaultError::InvalidPassword)?;
    serde_json::from_slice(&plaintext).map_err(|_| VaultError::InvalidPassword)
}

fn validate_name(name: &str) -> Result<(), VaultError> {
    let len = name.chars().count();
    if !(2..=50).contains(&len) {
        return Err(VaultError::InvalidName);
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-');
    if !valid {
        return Err(VaultError::InvalidName);
    }
    Ok(())
}

fn validate_signers(signers: &[String]) -> Result<(), VaultError> {
    if signers.len() < 2 {
        return Err(VaultError::MalformedContainer);
    }
    let server_count = signers.iter().filter(|s| s.starts_with("Server-")).count();
    if server_count > 1 {
        return Err(VaultError::MalformedContainer);
    }
    Ok(())
}

/// Host seam for `on_password_required(vault_id, name?) -> password`: asked only when
/// [`Vault::unlock_with`] finds nothing usable already cached. Implementors typically prompt a
/// user or read a secret store; this crate ships no implementation since both are host concerns.
pub trait PasswordProvider {
    /// Returns the password to try for the vault identified by `vault_id` (its ECDSA public
    /// key), given the vault's display `name` when known.
    fn provide(&self, vault_id: &str, name: Option<&str>) -> Result<String, VaultError>;
}

/// Process-wide cache of unlock passwords, keyed by vault identity.
///
/// Mutated only via [`Vault::unlock`]/[`Vault::lock`], each of which takes `&mut` for the
/// duration of the update, per the shared-resource policy.
pub struct PasswordCache {
    entries: HashMap<String, CacheEntry>,
    default_ttl: Duration,
}

struct CacheEntry {
    password: Zeroizing<String>,
    expires_at: Instant,
}

impl PasswordCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self { entries: HashMap::new(), default_ttl }
    }

    fn unlock(&mut self, vault_id: &str, password: &str) {
        self.entries.insert(
            vault_id.to_string(),
            CacheEntry {
                password: Zeroizing::new(password.to_string()),
                expires_at: Instant::now() + self.default_ttl,
            },
        );
    }

    fn lock(&mut self, vault_id: &str) {
        self.entries.remove(vault_id);
    }

    fn is_unlocked(&self, vault_id: &str) -> bool {
        self.entries
            .get(vault_id)
            .map(|entry| entry.expires_at > Instant::now())
            .unwrap_or(false)
    }

    fn time_remaining(&self, vault_id: &str) -> Option<Duration> {
        self.entries.get(vault_id).and_then(|entry| {
            let now = Instant::now();
            (entry.expires_at > now).then(|| entry.expires_at - now)
        })
    }

    fn get(&self, vault_id: &str) -> Option<Zeroizing<String>> {
        self.entries
            .get(vault_id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.password.clone())
    }

    /// Drops every cached password. Called once, at process shutdown.
    pub fn drain(&mut self) {
        self.entries.clear();
    }
}

impl Default for PasswordCache {
    fn default() -> Self {
        Self::new(DEFAULT_PASSWORD_CACHE_TTL)
    }
}

/// A small in-memory map from vault identity to a live handle, plus an `active` cursor.
///
/// Owned here so command layers (CLI/UI, out of scope for this core) share one source of
/// truth for "which vault is the user looking at right now".
#[derive(Default)]
pub struct VaultRegistry {
    vaults: HashMap<String, Vault>,
    active_id: Option<String>,
}

impl VaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, vault: Vault) {
        let id = vault.id().to_string();
        self.vaults.insert(id.clone(), vault);
        if self.active_id.is_none() {
            self.active_id = Some(id);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Vault> {
        if self.active_id.as_deref() == Some(id) {
            self.active_id = None;
        }
        self.vaults.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Vault> {
        self.vaults.get(id)
    }

    pub fn set_active(&mut self, id: &str) -> Result<(), VaultError> {
        if !self.vaults.contains_key(id) {
            return Err(VaultError::UnknownChain);
        }
        self.active_id = Some(id.to_string());
        Ok(())
    }

    pub fn active(&self) -> Option<&Vault> {
        self.active_id.as_deref().and_then(|id| self.vaults.get(id))
    }

    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SignatureAlgorithm;

    fn fake_share(algo: SignatureAlgorithm, seed: u8, chain_code: [u8; 32]) -> KeyShare {
        KeyShare::new(algo, vec![seed; 32], vec![seed; 33], chain_code)
    }

    fn test_vault(password: &str) -> (Vault, [u8; 32]) {
        let chain_code = [0x11u8; 32];
        let ecdsa = fake_share(SignatureAlgorithm::ECDSA, 1, chain_code);
        let eddsa = fake_share(SignatureAlgorithm::EdDSA, 2, chain_code);
        let vault = Vault::from_keygen(
            "My Vault",
            "browser-AAAA",
            vec!["browser-AAAA".to_string(), "Server-1111".to_string()],
            hex::encode(chain_code),
            ecdsa,
            eddsa,
            LibType::Dkls,
            password,
        )
        .unwrap();
        (vault, chain_code)
    }

    #[test]
    fn identity_is_the_ecdsa_public_key_and_is_fast_detects_server_signer() {
        let (vault, _) = test_vault("hunter2");
        assert_eq!(vault.id(), vault.public_keys().ecdsa);
        assert!(vault.is_fast());
    }

    #[test]
    fn rename_validates_length_and_charset() {
        let (mut vault, _) = test_vault("hunter2");
        assert_eq!(vault.rename("a"), Err(VaultError::InvalidName));
        assert_eq!(vault.rename(&"a".repeat(51)), Err(VaultError::InvalidName));
        assert_eq!(vault.rename("bad!name"), Err(VaultError::InvalidName));
        assert_eq!(vault.rename("Good Name_2"), Ok(()));
        assert_eq!(vault.name(), "Good Name_2");
    }

    #[test]
    fn unlock_then_lock_governs_share_access() {
        let (vault, _) = test_vault("hunter2");
        let mut cache = PasswordCache::new(Duration::from_secs(60));

        assert_eq!(vault.key_shares(&cache).err(), Some(VaultError::Locked));
        assert!(!vault.is_unlocked(&cache));

        assert_eq!(vault.unlock(&mut cache, "wrong"), Err(VaultError::InvalidPassword));
        vault.unlock(&mut cache, "hunter2").unwrap();
        assert!(vault.is_unlocked(&cache));
        assert!(vault.key_shares(&cache).is_ok());

        vault.lock(&mut cache);
        assert!(!vault.is_unlocked(&cache));
        assert_eq!(vault.key_shares(&cache).err(), Some(VaultError::Locked));
    }

    struct FixedPasswordProvider {
        password: &'static str,
        calls: std::cell::Cell<u32>,
    }

    impl PasswordProvider for FixedPasswordProvider {
        fn provide(&self, _vault_id: &str, _name: Option<&str>) -> Result<String, VaultError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.password.to_string())
        }
    }

    #[test]
    fn unlock_with_only_calls_the_provider_when_the_cache_is_cold() {
        let (vault, _) = test_vault("hunter2");
        let mut cache = PasswordCache::new(Duration::from_secs(60));
        let provider = FixedPasswordProvider { password: "hunter2", calls: std::cell::Cell::new(0) };

        vault.unlock_with(&mut cache, &provider).unwrap();
        assert_eq!(provider.calls.get(), 1);
        assert!(vault.is_unlocked(&cache));

        vault.unlock_with(&mut cache, &provider).unwrap();
        assert_eq!(provider.calls.get(), 1, "already-unlocked vault must not re-prompt");
    }

    #[test]
    fn export_import_round_trips_identity_and_shares() {
        let (vault, _) = test_vault("hunter2");
        let mut cache = PasswordCache::new(Duration::from_secs(60));
        vault.unlock(&mut cache, "hunter2").unwrap();

        let encoded = vault.export(&cache, Some("hunter2")).unwrap();
        assert!(Vault::is_encrypted(&encoded));

        assert_eq!(Vault::import(&encoded, None).err(), Some(VaultError::InvalidPassword));
        let imported = Vault::import(&encoded, Some("hunter2")).unwrap();

        assert_eq!(imported.id(), vault.id());
        assert_eq!(imported.name(), vault.name());
        assert_eq!(imported.signers(), vault.signers());
        assert_eq!(imported.hex_chain_code(), vault.hex_chain_code());
        assert_eq!(imported.public_keys(), vault.public_keys());

        let mut other_cache = PasswordCache::new(Duration::from_secs(60));
        imported.unlock(&mut other_cache, "hunter2").unwrap();
        let original_shares = vault.key_shares(&cache).unwrap();
        let imported_shares = imported.key_shares(&other_cache).unwrap();
        assert_eq!(original_shares.ecdsa.as_bytes(), imported_shares.ecdsa.as_bytes());
        assert_eq!(original_shares.eddsa.as_bytes(), imported_shares.eddsa.as_bytes());
    }

    #[test]
    fn export_without_password_is_detectably_unencrypted() {
        let (vault, _) = test_vault("hunter2");
        let mut cache = PasswordCache::new(Duration::from_secs(60));
        vault.unlock(&mut cache, "hunter2").unwrap();

        let encoded = vault.export(&cache, None).unwrap();
        assert!(!Vault::is_encrypted(&encoded));
        let imported = Vault::import(&encoded, None).unwrap();
        assert_eq!(imported.id(), vault.id());
    }

    #[test]
    fn password_cache_respects_ttl() {
        let mut cache = PasswordCache::new(Duration::from_millis(0));
        cache.unlock("vault-1", "pw");
        assert!(!cache.is_unlocked("vault-1"), "a zero-TTL entry should read as already expired");
    }

    #[test]
    fn from_keygen_rejects_mismatched_chain_codes() {
        let a = fake_share(SignatureAlgorithm::ECDSA, 1, [1u8; 32]);
        let b = fake_share(SignatureAlgorithm::EdDSA, 2, [2u8; 32]);
        let result = Vault::from_keygen(
            "Vault",
            "browser-AAAA",
            vec!["browser-AAAA".to_string(), "Server-1".to_string()],
            hex::encode([1u8; 32]),
            a,
            b,
            LibType::Dkls,
            "pw",
        );
        assert_eq!(result.err(), Some(VaultError::ChainCodeMismatch));
    }

    struct StubDeriver;

    impl AddressDeriver for StubDeriver {
        fn derive_address(
            &self,
            chain: Chain,
            public_keys: &PublicKeys,
            hex_chain_code: &str,
        ) -> Result<String, VaultError> {
            Ok(format!("{chain:?}:{}:{hex_chain_code}", public_keys.ecdsa))
        }
    }

    struct StubCoordinator {
        ecdsa: std::sync::atomic::AtomicU8,
        eddsa: std::sync::atomic::AtomicU8,
    }

    #[async_trait::async_trait]
    impl FastVaultCoordinator for StubCoordinator {
        async fn create(&self, _name: &str, _email: &str, _password: &str) -> Result<FastVaultKeygenOutcome, VaultError> {
            let chain_code = [0x33u8; 32];
            Ok(FastVaultKeygenOutcome {
                local_party_id: "browser-AAAA".to_string(),
                signers: vec!["browser-AAAA".to_string(), "Server-1111".to_string()],
                hex_chain_code: hex::encode(chain_code),
                ecdsa_share: fake_share(SignatureAlgorithm::ECDSA, self.ecdsa.load(std::sync::atomic::Ordering::Relaxed), chain_code),
                eddsa_share: fake_share(SignatureAlgorithm::EdDSA, self.eddsa.load(std::sync::atomic::Ordering::Relaxed), chain_code),
            })
        }
    }

    #[tokio::test]
    async fn create_fast_packages_the_coordinators_shares_into_a_vault() {
        let coordinator = StubCoordinator { ecdsa: std::sync::atomic::AtomicU8::new(7), eddsa: std::sync::atomic::AtomicU8::new(8) };
        let vault = Vault::create_fast("My Fast Vault", "user@example.com", "hunter2", &coordinator).await.unwrap();

        assert!(vault.is_fast());
        assert_eq!(vault.local_party_id(), "browser-AAAA");
        assert_eq!(vault.name(), "My Fast Vault");
    }

    struct StubDriver {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl SigningDriver for StubDriver {
        async fn sign(
            &self,
            mode: SigningMode,
            algo: SignatureAlgorithm,
            _shares: &KeyShares,
            _local_party_id: &str,
            _signers: &[String],
            _derivation_path: &str,
            _password: &str,
            message: &[u8],
        ) -> Result<crate::crypto::Signature, VaultError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Ok(crate::crypto::Signature {
                sig: message.to_vec(),
                algo,
                curve: crate::crypto::EllipticCurve::Secp256k1,
                hash: crate::crypto::HashFunction::None,
                enc: crate::crypto::SignatureEncoding::Raw64,
                recovery_id: if mode == SigningMode::Local { None } else { Some(0) },
            })
        }
    }

    #[tokio::test]
    async fn sign_rejects_fast_mode_on_a_vault_without_a_server_signer() {
        let (vault, _) = test_vault("hunter2");
        let mut cache = PasswordCache::new(Duration::from_secs(60));
        vault.unlock(&mut cache, "hunter2").unwrap();
        let driver = StubDriver { calls: std::sync::atomic::AtomicU32::new(0) };

        // This vault has a `Server-*` signer, so `Relay` is the mode that must be rejected.
        let result = vault.sign(SigningMode::Relay, SignatureAlgorithm::ECDSA, &cache, "m/44", b"msg", &driver).await;
        assert_eq!(result.err(), Some(VaultError::UnsupportedSigningMode));
        assert_eq!(driver.calls.load(std::sync::atomic::Ordering::Relaxed), 0, "gated modes must not reach the driver");
    }

    #[tokio::test]
    async fn sign_drives_the_signer_for_a_permitted_mode() {
        let (vault, _) = test_vault("hunter2");
        let mut cache = PasswordCache::new(Duration::from_secs(60));
        vault.unlock(&mut cache, "hunter2").unwrap();
        let driver = StubDriver { calls: std::sync::atomic::AtomicU32::new(0) };

        let sig = vault.sign(SigningMode::Fast, SignatureAlgorithm::ECDSA, &cache, "m/44", b"msg", &driver).await.unwrap();
        assert_eq!(sig.sig, b"msg");
        assert_eq!(driver.calls.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn chain_management_and_address_caching() {
        let (vault, _) = test_vault("hunter2");
        let deriver = StubDeriver;

        assert!(vault.chains().is_empty());
        vault.add_chain(Chain::Bitcoin);
        vault.add_chain(Chain::Ethereum);
        assert_eq!(vault.chains().len(), 2);

        let addr = vault.address(Chain::Bitcoin, &deriver).unwrap();
        assert!(addr.starts_with("Bitcoin:"));
        assert_eq!(vault.address(Chain::Bitcoin, &deriver).unwrap(), addr, "cached address must be stable");

        let all = vault.addresses(None, &deriver).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key(&Chain::Ethereum));

        vault.remove_chain(Chain::Bitcoin);
        assert_eq!(vault.chains(), vec![Chain::Ethereum]);
    }
}
