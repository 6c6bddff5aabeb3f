//! The Fast-Vault Coordinator: both the REST client for the remote `Server-*` co-signer's
//! two-party API, and [`FastVaultOrchestrator`], which drives the full create/sign
//! choreography (REST call, then relay-borne keygen/keysign) behind the
//! [`vultisig_core::vault::FastVaultCoordinator`] and [`vultisig_core::vault::SigningDriver`]
//! seams so `vultisig-core` never needs to know about HTTP or the relay.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vultisig_core::kernel::ProtocolKernel;
use vultisig_core::share::KeyShare;
use vultisig_core::vault::{FastVaultCoordinator, FastVaultKeygenOutcome, KeyShares, SigningDriver, SigningMode};
use vultisig_core::{crypto::Signature, crypto::SignatureAlgorithm, errors::VaultError};

use crate::errors::{FastVaultError, RelayError};
use crate::progress::ProgressSender;
use crate::relay::{wait_for_peers, RelayClient};
use crate::session::{run_keygen_with_setup, run_keysign, CancellationToken, SessionContext};

/// How long the barrier wait for the co-signer's `/complete` acknowledgement polls before
/// giving up.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

/// A `Server-*` co-signer reached over REST rather than the relay's long-poll protocol.
pub struct FastVaultClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
pub struct CreateVaultRequest<'a> {
    pub name: &'a str,
    pub session_id: &'a str,
    pub hex_encryption_key: &'a str,
    pub hex_chain_code: &'a str,
    /// The id the server should join the relay session as, chosen by the local party.
    pub local_party_id: &'a str,
    pub encryption_password: &'a str,
    pub email: &'a str,
    pub lib_type: u8,
}

#[derive(Serialize)]
pub struct SignRequest<'a> {
    pub public_key: &'a str,
    pub messages: &'a [String],
    pub session: &'a str,
    pub hex_encryption_key: &'a str,
    pub derive_path: &'a str,
    pub is_ecdsa: bool,
    pub vault_password: &'a str,
}

#[derive(Serialize)]
pub struct ReshareRequest<'a> {
    pub name: &'a str,
    pub session_id: &'a str,
    pub public_key: &'a str,
    pub hex_encryption_key: &'a str,
    pub hex_chain_code: &'a str,
    pub local_party_id: &'a str,
    pub old_parties: &'a [String],
    pub old_reshare_prefix: &'a str,
    pub encryption_password: &'a str,
    pub email: Option<&'a str>,
    pub reshare_type: &'a str,
    pub lib_type: u8,
}

#[derive(Deserialize, Debug, Clone)]
pub struct VaultExistsResponse {
    pub public_key_ecdsa: String,
    pub is_backed_up: bool,
}

impl FastVaultClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// `POST /vault/create`: asks the server to join a keygen session as the second party.
    pub async fn create_vault(&self, request: &CreateVaultRequest<'_>) -> Result<(), FastVaultError> {
        self.post_empty("/create", request).await
    }

    /// `POST /vault/sign`: asks the server to join a keysign session as the second party.
    pub async fn sign(&self, request: &SignRequest<'_>) -> Result<(), FastVaultError> {
        self.post_empty("/sign", request).await
    }

    /// `POST /vault/reshare`: asks the server to join a reshare session as the second party.
    pub async fn reshare(&self, request: &ReshareRequest<'_>) -> Result<(), FastVaultError> {
        self.post_empty("/reshare", request).await
    }

    /// `GET /vault/verify/{vault_id}/{code}`: confirms the email verification code sent at
    /// vault creation.
    pub async fn verify(&self, vault_id: &str, code: &str) -> Result<(), FastVaultError> {
        let response = self.http.get(self.url(&format!("/verify/{vault_id}/{code}"))).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            status if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED => {
                Err(FastVaultError::VerificationFailed)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(FastVaultError::Status(status, body))
            }
        }
    }

    /// `POST /vault/resend-verification/{vault_id}`: requests a fresh verification email.
    pub async fn resend_verification(&self, vault_id: &str) -> Result<(), FastVaultError> {
        let response = self.http.post(self.url(&format!("/resend-verification/{vault_id}"))).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(FastVaultError::Status(status, body))
        }
    }

    /// `GET /vault/get/{public_key_ecdsa}`: looks up whether the server still holds its share
    /// of a fast vault, and whether that vault has been marked backed up. `password` is sent
    /// base64-encoded in the `x-password` header, per the server's expected encoding.
    pub async fn get(&self, public_key_ecdsa: &str, password: &str) -> Result<VaultExistsResponse, FastVaultError> {
        use base64::Engine;
        let encoded_password = base64::engine::general_purpose::STANDARD.encode(password);
        let response = self
            .http
            .get(self.url(&format!("/get/{public_key_ecdsa}")))
            .header("x-password", encoded_password)
            .send()
            .await?;
        Self::parse_json(response).await
    }

    async fn post_empty(&self, path: &str, body: &(impl Serialize + ?Sized)) -> Result<(), FastVaultError> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(FastVaultError::Status(status, body))
        }
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, FastVaultError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FastVaultError::Status(status, body));
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(FastVaultError::Decode)
    }
}

/// Drives the two-party fast-vault choreography against a [`FastVaultClient`] and the relay,
/// implementing [`FastVaultCoordinator`] for vault creation and [`SigningDriver`] for signing.
///
/// Kernels are supplied by the caller rather than constructed here, the same way
/// [`crate::orchestrator::sign_transaction`] takes a `&dyn ProtocolKernel` — this crate binds
/// no concrete kernel implementation.
pub struct FastVaultOrchestrator {
    client: FastVaultClient,
    relay: Arc<dyn RelayClient>,
    ecdsa_kernel: Arc<dyn ProtocolKernel>,
    eddsa_kernel: Arc<dyn ProtocolKernel>,
    progress: ProgressSender,
    max_retries: u32,
    poll_interval: Duration,
    peer_join_timeout: Duration,
}

impl FastVaultOrchestrator {
    pub fn new(
        client: FastVaultClient,
        relay: Arc<dyn RelayClient>,
        ecdsa_kernel: Arc<dyn ProtocolKernel>,
        eddsa_kernel: Arc<dyn ProtocolKernel>,
        progress: ProgressSender,
        config: &crate::config::Config,
    ) -> Self {
        Self {
            client,
            relay,
            ecdsa_kernel,
            eddsa_kernel,
            progress,
            max_retries: config.max_retries,
            poll_interval: config.poll_interval,
            peer_join_timeout: config.peer_join_timeout,
        }
    }

    fn context(
        &self,
        session_id: String,
        local_party_id: String,
        party_ids: Vec<String>,
        encryption_key: [u8; 32],
    ) -> SessionContext {
        SessionContext {
            session_id,
            local_party_id,
            party_ids,
            encryption_key,
            max_retries: self.max_retries,
            poll_interval: self.poll_interval,
            peer_join_timeout: self.peer_join_timeout,
            cancellation: CancellationToken::new(),
        }
    }

    /// The full creation choreography against already-minted identifiers. Split out from
    /// [`FastVaultCoordinator::create`] so tests can supply deterministic ids instead of the
    /// randomly generated ones the trait method mints.
    #[allow(clippy::too_many_arguments)]
    async fn create_with_ids(
        &self,
        name: &str,
        email: &str,
        password: &str,
        session_id: &str,
        local_party_id: &str,
        server_party_id: &str,
        hex_encryption_key: &str,
        encryption_key: [u8; 32],
        hex_chain_code: &str,
    ) -> Result<FastVaultKeygenOutcome, VaultError> {
        self.client
            .create_vault(&CreateVaultRequest {
                name,
                session_id,
                hex_encryption_key,
                hex_chain_code,
                local_party_id: server_party_id,
                encryption_password: password,
                email,
                lib_type: 1,
            })
            .await
            .map_err(coordinator_error)?;

        self.relay.join_session(session_id, local_party_id).await.map_err(coordinator_error)?;
        let party_ids = vec![local_party_id.to_string(), server_party_id.to_string()];
        let joined = wait_for_peers(&*self.relay, session_id, &party_ids, self.poll_interval, self.peer_join_timeout)
            .await
            .map_err(coordinator_error)?;
        self.relay.start_session(session_id, &joined).await.map_err(coordinator_error)?;

        let ctx = self.context(session_id.to_string(), local_party_id.to_string(), party_ids.clone(), encryption_key);

        let setup = self.ecdsa_kernel.keygen_setup(None, joined.len(), &joined);
        self.relay.upload_setup_message(session_id, &setup).await.map_err(coordinator_error)?;
        let ecdsa_share = run_keygen_with_setup(&*self.relay, &*self.ecdsa_kernel, &ctx, &self.progress, &setup)
            .await
            .map_err(coordinator_error)?;
        let eddsa_share = run_keygen_with_setup(&*self.relay, &*self.eddsa_kernel, &ctx, &self.progress, &setup)
            .await
            .map_err(coordinator_error)?;

        wait_for_completion(&*self.relay, session_id, &party_ids, self.poll_interval, COMPLETION_TIMEOUT)
            .await
            .map_err(coordinator_error)?;

        Ok(FastVaultKeygenOutcome {
            local_party_id: local_party_id.to_string(),
            signers: party_ids,
            hex_chain_code: hex_chain_code.to_string(),
            ecdsa_share,
            eddsa_share,
        })
    }

    /// The full signing choreography against an already-minted ephemeral session. Split out
    /// from [`SigningDriver::sign`] for the same reason as [`Self::create_with_ids`].
    #[allow(clippy::too_many_arguments)]
    async fn sign_with_ids(
        &self,
        algo: SignatureAlgorithm,
        share: &KeyShare,
        server_party_id: &str,
        derivation_path: &str,
        password: &str,
        message: &[u8],
        session_id: &str,
        ephemeral_local_id: &str,
        hex_encryption_key: &str,
        encryption_key: [u8; 32],
    ) -> Result<Signature, VaultError> {
        self.client
            .sign(&SignRequest {
                public_key: &share.public_key().to_hex(),
                messages: &[hex::encode(message)],
                session: session_id,
                hex_encryption_key,
                derive_path: derivation_path,
                is_ecdsa: algo == SignatureAlgorithm::ECDSA,
                vault_password: password,
            })
            .await
            .map_err(coordinator_error)?;

        // `run_keysign` performs the join/wait-for-peers/start-session bootstrap itself, with
        // the ephemeral id listed first so it is recognized as the initiator.
        let party_ids = vec![ephemeral_local_id.to_string(), server_party_id.to_string()];
        let kernel: &dyn ProtocolKernel =
            if algo == SignatureAlgorithm::ECDSA { &*self.ecdsa_kernel } else { &*self.eddsa_kernel };
        let ctx = self.context(session_id.to_string(), ephemeral_local_id.to_string(), party_ids, encryption_key);
        let key_id = share.public_key().to_hex();
        run_keysign(&*self.relay, kernel, &ctx, &self.progress, &key_id, derivation_path, message, share)
            .await
            .map_err(coordinator_error)
    }
}

#[async_trait::async_trait]
impl FastVaultCoordinator for FastVaultOrchestrator {
    async fn create(&self, name: &str, email: &str, password: &str) -> Result<FastVaultKeygenOutcome, VaultError> {
        let session_id = Uuid::new_v4().to_string();
        let local_party_id = format!("browser-{}", Uuid::new_v4());
        let server_party_id = format!("Server-{}", Uuid::new_v4());
        let encryption_key = random_key();
        let hex_encryption_key = hex::encode(encryption_key);
        let hex_chain_code = hex::encode(random_key());

        self.create_with_ids(
            name,
            email,
            password,
            &session_id,
            &local_party_id,
            &server_party_id,
            &hex_encryption_key,
            encryption_key,
            &hex_chain_code,
        )
        .await
    }
}

#[async_trait::async_trait]
impl SigningDriver for FastVaultOrchestrator {
    async fn sign(
        &self,
        mode: SigningMode,
        algo: SignatureAlgorithm,
        shares: &KeyShares,
        _local_party_id: &str,
        signers: &[String],
        derivation_path: &str,
        password: &str,
        message: &[u8],
    ) -> Result<Signature, VaultError> {
        let share = if algo == SignatureAlgorithm::ECDSA { &shares.ecdsa } else { &shares.eddsa };

        match mode {
            SigningMode::Fast => {
                let server_party_id = signers
                    .iter()
                    .find(|id| id.starts_with("Server-"))
                    .ok_or(VaultError::UnsupportedSigningMode)?;
                // A fresh party id and session are minted for every signing round; the
                // vault's persisted `local_party_id` names only the keygen-time identity.
                let session_id = Uuid::new_v4().to_string();
                let ephemeral_local_id = format!("browser-{}", Uuid::new_v4());
                let encryption_key = random_key();
                let hex_encryption_key = hex::encode(encryption_key);

                self.sign_with_ids(
                    algo,
                    share,
                    server_party_id,
                    derivation_path,
                    password,
                    message,
                    &session_id,
                    &ephemeral_local_id,
                    &hex_encryption_key,
                    encryption_key,
                )
                .await
            }
            SigningMode::Relay | SigningMode::Local => Err(VaultError::UnsupportedSigningMode),
        }
    }
}

fn random_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Maps the transport-level errors this module produces into the transport-free
/// [`VaultError::Coordinator`] escape hatch `vultisig-core` exposes for this purpose.
fn coordinator_error(err: impl std::fmt::Display) -> VaultError {
    VaultError::Coordinator(err.to_string())
}

/// Polls [`RelayClient::is_session_complete`] until every party in `party_ids` has called
/// [`RelayClient::complete_session`], or `timeout` elapses. The barrier the creation
/// choreography waits on before handing the finished vault back to the caller.
async fn wait_for_completion(
    relay: &dyn RelayClient,
    session_id: &str,
    party_ids: &[String],
    poll_interval: Duration,
    timeout: Duration,
) -> Result<(), RelayError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if relay.is_session_complete(session_id, party_ids).await? {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(RelayError::Timeout { session_id: session_id.to_string() });
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use vultisig_core::crypto::SignatureAlgorithm;
    use vultisig_core::test_utils::MockKernel;

    #[tokio::test]
    async fn create_vault_posts_the_expected_payload() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/create"),
                request::body(json_decoded(eq(serde_json::json!({
                    "name": "My Vault",
                    "session_id": "AAAA",
                    "hex_encryption_key": "24242424",
                    "hex_chain_code": "11",
                    "local_party_id": "Server-1111",
                    "encryption_password": "hunter2",
                    "email": "user@example.com",
                    "lib_type": 1,
                })))),
            ])
            .respond_with(status_code(200)),
        );

        let client = FastVaultClient::new(server.url_str("").trim_end_matches('/').to_string());
        client
            .create_vault(&CreateVaultRequest {
                name: "My Vault",
                session_id: "AAAA",
                hex_encryption_key: "24242424",
                hex_chain_code: "11",
                local_party_id: "Server-1111",
                encryption_password: "hunter2",
                email: "user@example.com",
                lib_type: 1,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn verify_maps_bad_request_to_verification_failed() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/verify/03ab/000000")).respond_with(status_code(400)),
        );
        let client = FastVaultClient::new(server.url_str("").trim_end_matches('/').to_string());
        let result = client.verify("03ab", "000000").await;
        assert!(matches!(result, Err(FastVaultError::VerificationFailed)));
    }

    #[tokio::test]
    async fn resend_verification_posts_to_the_path_parameterized_endpoint() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/resend-verification/03ab"))
                .respond_with(status_code(200)),
        );
        let client = FastVaultClient::new(server.url_str("").trim_end_matches('/').to_string());
        client.resend_verification("03ab").await.unwrap();
    }

    #[tokio::test]
    async fn get_base64_encodes_the_password_header() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/get/03ab"),
                request::headers(contains(("x-password", "aHVudGVyMg=="))),
            ])
            .respond_with(json_encoded(serde_json::json!({
                "public_key_ecdsa": "03ab",
                "is_backed_up": true,
            }))),
        );
        let client = FastVaultClient::new(server.url_str("").trim_end_matches('/').to_string());
        let result = client.get("03ab", "hunter2").await.unwrap();
        assert_eq!(result.public_key_ecdsa, "03ab");
        assert!(result.is_backed_up);
    }

    /// An in-process relay fake, identical in shape to `session`'s, kept separate since it is
    /// exercised through the orchestrator's own `join_session`/`wait_for_peers` calls rather
    /// than `drive_session` directly.
    #[derive(Default)]
    struct FakeRelay {
        parties: Mutex<HashMap<String, Vec<String>>>,
        inbox: Mutex<Vec<crate::relay::RelayMessage>>,
        setup: Mutex<Option<Vec<u8>>>,
        completed: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl RelayClient for FakeRelay {
        async fn join_session(&self, session_id: &str, local_party_id: &str) -> Result<(), RelayError> {
            self.parties.lock().unwrap().entry(session_id.to_string()).or_default().push(local_party_id.to_string());
            Ok(())
        }

        async fn get_session_parties(&self, session_id: &str) -> Result<Vec<String>, RelayError> {
            Ok(self.parties.lock().unwrap().get(session_id).cloned().unwrap_or_default())
        }

        async fn start_session(&self, _session_id: &str, _party_ids: &[String]) -> Result<(), RelayError> {
            Ok(())
        }

        async fn upload(
            &self,
            session_id: &str,
            local_party_id: &str,
            to: &[String],
            body: &str,
            hash: &str,
            sequence_no: u64,
        ) -> Result<(), RelayError> {
            for receiver in to {
                self.inbox.lock().unwrap().push(crate::relay::RelayMessage {
                    session_id: session_id.to_string(),
                    from: local_party_id.to_string(),
                    body: body.to_string(),
                    hash: format!("{hash}:{receiver}"),
                    sequence_no,
                });
            }
            Ok(())
        }

        async fn download(&self, _session_id: &str, local_party_id: &str) -> Result<Vec<crate::relay::RelayMessage>, RelayError> {
            let mut inbox = self.inbox.lock().unwrap();
            let (mine, rest): (Vec<_>, Vec<_>) =
                inbox.drain(..).partition(|m| m.hash.ends_with(&format!(":{local_party_id}")));
            *inbox = rest;
            Ok(mine)
        }

        async fn delete_message(&self, _session_id: &str, _local_party_id: &str, _hash: &str) -> Result<(), RelayError> {
            Ok(())
        }

        async fn upload_setup_message(&self, _session_id: &str, body: &[u8]) -> Result<(), RelayError> {
            *self.setup.lock().unwrap() = Some(body.to_vec());
            Ok(())
        }

        async fn download_setup_message(&self, _session_id: &str) -> Result<Vec<u8>, RelayError> {
            Ok(self.setup.lock().unwrap().clone().unwrap_or_default())
        }

        async fn complete_session(&self, _session_id: &str, local_party_id: &str) -> Result<(), RelayError> {
            self.completed.lock().unwrap().push(local_party_id.to_string());
            Ok(())
        }

        async fn is_session_complete(&self, _session_id: &str, party_ids: &[String]) -> Result<bool, RelayError> {
            let completed = self.completed.lock().unwrap();
            Ok(party_ids.iter().all(|p| completed.contains(p)))
        }
    }

    fn orchestrator(relay: Arc<dyn RelayClient>, base_url: String) -> FastVaultOrchestrator {
        FastVaultOrchestrator::new(
            FastVaultClient::new(base_url),
            relay,
            Arc::new(MockKernel::new(SignatureAlgorithm::ECDSA, 2)),
            Arc::new(MockKernel::new(SignatureAlgorithm::EdDSA, 2)),
            crate::progress::channel(16).0,
            &crate::config::Config {
                relay_base_url: String::new(),
                fastvault_base_url: String::new(),
                poll_interval: Duration::from_millis(1),
                peer_join_timeout: Duration::from_millis(200),
                // Generous compared to the 3-attempt production default: the simulated
                // co-signer below and the orchestrator under test poll each other's relay
                // state across two concurrently scheduled futures rather than two processes.
                max_retries: 50,
                password_cache_ttl: Duration::from_secs(300),
            },
        )
    }

    /// Stands in for the real co-signer's side of a creation: waits for the browser to post
    /// the ECDSA setup message, then runs both legs of keygen against it and marks itself
    /// complete, exactly as the browser side does in `create_with_ids`.
    async fn drive_server_keygen(relay: Arc<FakeRelay>, session_id: &str, browser_id: &str, server_id: &str, encryption_key: [u8; 32]) {
        relay.join_session(session_id, server_id).await.unwrap();
        let setup = loop {
            if let Some(setup) = relay.setup.lock().unwrap().clone() {
                break setup;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        };

        let (progress, _rx) = crate::progress::channel(16);
        let ctx = SessionContext {
            session_id: session_id.to_string(),
            local_party_id: server_id.to_string(),
            party_ids: vec![browser_id.to_string(), server_id.to_string()],
            encryption_key,
            max_retries: 50,
            poll_interval: Duration::from_millis(1),
            peer_join_timeout: Duration::from_millis(200),
            cancellation: CancellationToken::new(),
        };
        let ecdsa_kernel = MockKernel::new(SignatureAlgorithm::ECDSA, 9);
        let eddsa_kernel = MockKernel::new(SignatureAlgorithm::EdDSA, 9);
        run_keygen_with_setup(&*relay, &ecdsa_kernel, &ctx, &progress, &setup).await.unwrap();
        run_keygen_with_setup(&*relay, &eddsa_kernel, &ctx, &progress, &setup).await.unwrap();
        relay.complete_session(session_id, server_id).await.unwrap();
    }

    /// Stands in for the real co-signer's side of a signing round: joins as a non-initiator
    /// so `run_keysign` downloads the browser's setup message instead of minting its own.
    async fn drive_server_keysign(relay: Arc<FakeRelay>, session_id: &str, browser_id: &str, server_id: &str, encryption_key: [u8; 32], share: &KeyShare) {
        relay.join_session(session_id, server_id).await.unwrap();
        let (progress, _rx) = crate::progress::channel(16);
        let ctx = SessionContext {
            session_id: session_id.to_string(),
            local_party_id: server_id.to_string(),
            party_ids: vec![browser_id.to_string(), server_id.to_string()],
            encryption_key,
            max_retries: 50,
            poll_interval: Duration::from_millis(1),
            peer_join_timeout: Duration::from_millis(200),
            cancellation: CancellationToken::new(),
        };
        let kernel = MockKernel::new(SignatureAlgorithm::ECDSA, 9);
        run_keysign(&*relay, &kernel, &ctx, &progress, &share.public_key().to_hex(), "m/44'/0'/0'/0/0", b"digest", share)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_with_ids_runs_ecdsa_then_eddsa_keygen_and_waits_on_the_completion_barrier() {
        let server = Server::run();
        server.expect(Expectation::matching(request::method_path("POST", "/create")).respond_with(status_code(200)));
        let relay: Arc<FakeRelay> = Arc::new(FakeRelay::default());

        let orchestrator = orchestrator(relay.clone(), server.url_str("").trim_end_matches('/').to_string());
        let create = orchestrator.create_with_ids(
            "My Fast Vault",
            "user@example.com",
            "hunter2",
            "AAAA",
            "browser-AAAA",
            "Server-1111",
            "2424",
            [0x24u8; 32],
            "1122",
        );
        let server_side = drive_server_keygen(relay.clone(), "AAAA", "browser-AAAA", "Server-1111", [0x24u8; 32]);

        let (outcome, ()) = tokio::join!(create, server_side);
        let outcome = outcome.unwrap();

        assert_eq!(outcome.local_party_id, "browser-AAAA");
        assert_eq!(outcome.signers, vec!["browser-AAAA".to_string(), "Server-1111".to_string()]);
        assert_eq!(outcome.ecdsa_share.algo(), SignatureAlgorithm::ECDSA);
        assert_eq!(outcome.eddsa_share.algo(), SignatureAlgorithm::EdDSA);
        assert!(relay.completed.lock().unwrap().contains(&"browser-AAAA".to_string()));
    }

    #[tokio::test]
    async fn sign_with_ids_drives_a_keysign_against_the_server_party() {
        let server = Server::run();
        server.expect(Expectation::matching(request::method_path("POST", "/sign")).respond_with(status_code(200)));
        let relay: Arc<FakeRelay> = Arc::new(FakeRelay::default());

        let orchestrator = orchestrator(relay.clone(), server.url_str("").trim_end_matches('/').to_string());
        let share = orchestrator.ecdsa_kernel.keygen_session(&[], "browser-AAAA").finish().unwrap();
        let share = match share {
            vultisig_core::kernel::SessionOutput::KeyShare(share) => share,
            _ => unreachable!(),
        };

        let sign = orchestrator.sign_with_ids(
            SignatureAlgorithm::ECDSA,
            &share,
            "Server-1111",
            "m/44'/0'/0'/0/0",
            "hunter2",
            b"digest",
            "SIGN-1",
            "browser-AAAA",
            "2424",
            [0x24u8; 32],
        );
        let server_side = drive_server_keysign(relay.clone(), "SIGN-1", "browser-AAAA", "Server-1111", [0x24u8; 32], &share);

        let (signature, ()) = tokio::join!(sign, server_side);
        let signature = signature.unwrap();

        assert_eq!(signature.algo, SignatureAlgorithm::ECDSA);
    }
}
