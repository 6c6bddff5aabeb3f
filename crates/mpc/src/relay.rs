//! HTTP client for the untrusted relay service: session membership, message upload/download
//! and the one-shot setup-message and completion-marker endpoints.
//!
//! The relay never sees plaintext: every message body passed to [`RelayClient::upload`] is
//! expected to already be sealed with [`vultisig_core::codec::encrypt`], and every body
//! returned by [`RelayClient::download`] is handed back to the caller to decrypt. The relay
//! is trusted only for delivery and ordering, never for confidentiality.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// One message waiting for `local_party_id` on the relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayMessage {
    pub session_id: String,
    pub from: String,
    /// The encrypted, base64-encoded message body.
    pub body: String,
    /// SHA-256 content hash of `body`, used both as the relay message id and for dedup.
    pub hash: String,
    pub sequence_no: u64,
}

/// The relay transport's capability surface. Implemented by [`HttpRelayClient`] against the
/// real service, and by an in-process fake in tests.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Registers `local_party_id` as having joined `session_id`.
    async fn join_session(&self, session_id: &str, local_party_id: &str) -> Result<(), RelayError>;

    /// Lists the party ids that have joined `session_id` so far.
    async fn get_session_parties(&self, session_id: &str) -> Result<Vec<String>, RelayError>;

    /// Marks a session as started, recording the final party roster.
    async fn start_session(&self, session_id: &str, party_ids: &[String]) -> Result<(), RelayError>;

    /// Uploads one DKG/keysign round message, addressed to `to`. `sequence_no` must be
    /// monotonically increasing per session, per sending party.
    async fn upload(
        &self,
        session_id: &str,
        local_party_id: &str,
        to: &[String],
        body: &str,
        hash: &str,
        sequence_no: u64,
    ) -> Result<(), RelayError>;

    /// Long-polls for messages addressed to `local_party_id` that haven't been downloaded yet.
    async fn download(&self, session_id: &str, local_party_id: &str) -> Result<Vec<RelayMessage>, RelayError>;

    /// Deletes a message by content hash once it has been consumed, so a retried poll doesn't
    /// redeliver it.
    async fn delete_message(&self, session_id: &str, local_party_id: &str, hash: &str) -> Result<(), RelayError>;

    /// Uploads the initiator's one-shot setup message (the serialized `keygen`/`reshare`/
    /// `keysign` setup produced by [`vultisig_core::kernel::ProtocolKernel`]).
    async fn upload_setup_message(&self, session_id: &str, body: &[u8]) -> Result<(), RelayError>;

    /// Downloads the setup message uploaded by the initiator.
    async fn download_setup_message(&self, session_id: &str) -> Result<Vec<u8>, RelayError>;

    /// Marks the local party's participation in `session_id` as complete.
    async fn complete_session(&self, session_id: &str, local_party_id: &str) -> Result<(), RelayError>;

    /// Whether every party in `party_ids` has called [`RelayClient::complete_session`].
    async fn is_session_complete(&self, session_id: &str, party_ids: &[String]) -> Result<bool, RelayError>;
}

/// Polls [`RelayClient::get_session_parties`] until every id in `expected` has joined, or
/// `timeout` elapses.
pub async fn wait_for_peers(
    relay: &dyn RelayClient,
    session_id: &str,
    expected: &[String],
    poll_interval: std::time::Duration,
    timeout: std::time::Duration,
) -> Result<Vec<String>, RelayError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let joined = relay.get_session_parties(session_id).await?;
        if expected.iter().all(|p| joined.contains(p)) {
            return Ok(joined);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(RelayError::PeerTimeout { session_id: session_id.to_string() });
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// A [`RelayClient`] backed by the real HTTP relay service.
pub struct HttpRelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RelayError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(RelayError::Status(response.status()))
        }
    }
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    session_id: &'a str,
    from: &'a str,
    to: &'a [String],
    body: &'a str,
    hash: &'a str,
    sequence_no: u64,
}

#[async_trait]
impl RelayClient for HttpRelayClient {
    async fn join_session(&self, session_id: &str, local_party_id: &str) -> Result<(), RelayError> {
        let response = self
            .http
            .post(self.url(&format!("/{session_id}")))
            .json(&serde_json::json!([local_party_id]))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn get_session_parties(&self, session_id: &str) -> Result<Vec<String>, RelayError> {
        let response = self.http.get(self.url(&format!("/{session_id}"))).send().await?;
        let response = Self::check_status(response).await?;
        let parties: Vec<String> = response.json().await.map_err(RelayError::Transport)?;
        Ok(parties)
    }

    async fn start_session(&self, session_id: &str, party_ids: &[String]) -> Result<(), RelayError> {
        let response = self
            .http
            .post(self.url(&format!("/start/{session_id}")))
            .json(party_ids)
            .send()
            .await?;
        Self::check_status(response).await?;
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
        let response = self
            .http
            .post(self.url(&format!("/message/{session_id}")))
            .json(&UploadRequest { session_id, from: local_party_id, to, body, hash, sequence_no })
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn download(&self, session_id: &str, local_party_id: &str) -> Result<Vec<RelayMessage>, RelayError> {
        let response = self
            .http
            .get(self.url(&format!("/message/{session_id}/{local_party_id}")))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let messages: Vec<RelayMessage> = response.json().await.map_err(RelayError::Transport)?;
        Ok(messages)
    }

    async fn delete_message(&self, session_id: &str, local_party_id: &str, hash: &str) -> Result<(), RelayError> {
        let response = self
            .http
            .delete(self.url(&format!("/message/{session_id}/{local_party_id}/{hash}")))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn upload_setup_message(&self, session_id: &str, body: &[u8]) -> Result<(), RelayError> {
        let response = self
            .http
            .post(self.url(&format!("/setup-message/{session_id}")))
            .body(body.to_vec())
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn download_setup_message(&self, session_id: &str) -> Result<Vec<u8>, RelayError> {
        let response = self
            .http
            .get(self.url(&format!("/setup-message/{session_id}")))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await.map_err(RelayError::Transport)?;
        Ok(bytes.to_vec())
    }

    async fn complete_session(&self, session_id: &str, local_party_id: &str) -> Result<(), RelayError> {
        let response = self
            .http
            .post(self.url(&format!("/complete/{session_id}")))
            .json(&serde_json::json!([local_party_id]))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn is_session_complete(&self, session_id: &str, party_ids: &[String]) -> Result<bool, RelayError> {
        let response = self
            .http
            .get(self.url(&format!("/complete/{session_id}")))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let completed: Vec<String> = response.json().await.map_err(RelayError::Transport)?;
        Ok(party_ids.iter().all(|p| completed.contains(p)))
    }
}
