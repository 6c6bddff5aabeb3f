//! Errors surfaced by the relay transport, session runtime and fast-vault coordinator.

use thiserror::Error;
use vultisig_core::errors::{KernelError, VaultError};

/// Failures talking to the untrusted relay service.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("relay returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("relay response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no peers joined session {session_id} within the deadline")]
    PeerTimeout { session_id: String },

    #[error("session {session_id} made no progress for 60 seconds")]
    Timeout { session_id: String },

    #[error(transparent)]
    Crypto(#[from] vultisig_core::errors::CryptoError),
}

/// Whether a [`RelayError`] is worth retrying.
impl RelayError {
    pub fn is_transient(&self) -> bool {
        match self {
            RelayError::Transport(e) => !e.is_builder() && !e.is_redirect(),
            RelayError::Status(code) => code.is_server_error() || *code == reqwest::StatusCode::TOO_MANY_REQUESTS,
            RelayError::Decode(_) | RelayError::Crypto(_) => false,
            RelayError::PeerTimeout { .. } | RelayError::Timeout { .. } => false,
        }
    }
}

/// Failures running an MPC session (keygen, reshare, keysign) to completion.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("protocol kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("session was cancelled")]
    Cancelled,

    #[error("session exceeded its retry budget ({attempts} attempts)")]
    RetriesExhausted { attempts: u32 },
}

impl SessionError {
    /// Whether this error is worth another attempt within the session's retry budget.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Relay(e) => e.is_transient(),
            SessionError::Kernel(KernelError::Transient) => true,
            SessionError::Kernel(KernelError::Permanent(_)) => false,
            SessionError::Vault(_) | SessionError::Cancelled | SessionError::RetriesExhausted { .. } => false,
        }
    }
}

/// Failures calling the Fast-Vault Coordinator's REST surface.
#[derive(Debug, Error)]
pub enum FastVaultError {
    #[error("fast-vault request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("fast-vault server returned status {0}: {1}")]
    Status(reqwest::StatusCode, String),

    #[error("fast-vault response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("email verification code was incorrect or expired")]
    VerificationFailed,

    #[error(transparent)]
    Vault(#[from] VaultError),
}
