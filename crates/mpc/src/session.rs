//! The MPC session runtime: drives one keygen/reshare/keysign [`Session`] to completion by
//! shuttling encrypted messages through the relay, retrying transient relay failures up to
//! three times before giving up.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;

use vultisig_core::kernel::{ProtocolKernel, Session, SessionOutput};
use vultisig_core::{codec, share::KeyShare};

use crate::errors::SessionError;
use crate::progress::{ProgressEvent, ProgressSender};
use crate::relay::{wait_for_peers, RelayClient};

/// The longest an inbound exchange loop may go without receiving a message before the session
/// is declared dead, independent of the per-request retry budget.
const INBOUND_PROGRESS_DEADLINE: Duration = Duration::from_secs(60);

/// How long the outbound loop sleeps between kernel polls when it has nothing queued to send.
const OUTBOUND_BACKOFF: Duration = Duration::from_millis(100);

/// How many times a whole keygen/reshare/keysign state machine is retried end-to-end (fresh
/// kernel session, same relay session) after a transient relay or kernel failure. Distinct from
/// `SessionContext::max_retries`, which bounds retries of a single HTTP request.
const OPERATION_RETRY_LIMIT: u32 = 3;

/// A cooperative cancellation flag observed by [`drive_session`] on every loop tick. Cloning
/// shares the same underlying flag, so a caller can hold one handle and cancel a session
/// running on another task.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Parameters shared by every session kind this runtime drives.
pub struct SessionContext {
    pub session_id: String,
    pub local_party_id: String,
    pub party_ids: Vec<String>,
    /// The AES-256-GCM key every party derived for this session's relay traffic.
    pub encryption_key: [u8; 32],
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub peer_join_timeout: Duration,
    /// Cooperative cancellation, checked between relay round-trips. Defaults to an
    /// never-cancelled token when built via [`SessionRuntime::context`].
    pub cancellation: CancellationToken,
}

/// Runs a fresh DKG to produce `ctx.party_ids.len()`-of-`threshold` key shares.
pub async fn run_keygen(
    relay: &dyn RelayClient,
    kernel: &dyn ProtocolKernel,
    ctx: &SessionContext,
    progress: &ProgressSender,
    key_id: Option<&str>,
    threshold: usize,
) -> Result<KeyShare, SessionError> {
    relay.join_session(&ctx.session_id, &ctx.local_party_id).await.map_err(SessionError::Relay)?;
    let joined = wait_for_peers(relay, &ctx.session_id, &ctx.party_ids, ctx.poll_interval, ctx.peer_join_timeout)
        .await
        .map_err(SessionError::Relay)?;
    progress.emit(ProgressEvent::PeersReady { session_id: ctx.session_id.clone() });

    let is_initiator = ctx.party_ids.first().map(String::as_str) == Some(ctx.local_party_id.as_str());
    let mut attempt = 0;
    loop {
        attempt += 1;
        if is_initiator {
            let setup = kernel.keygen_setup(key_id, threshold, &joined);
            relay.start_session(&ctx.session_id, &joined).await.map_err(SessionError::Relay)?;
            relay.upload_setup_message(&ctx.session_id, &setup).await.map_err(SessionError::Relay)?;
        }
        let setup = download_setup_with_retry(relay, ctx).await?;
        let session = kernel.keygen_session(&setup, &ctx.local_party_id);

        match drive_session(relay, ctx, session, progress).await {
            Ok(SessionOutput::KeyShare(share)) => return Ok(share),
            Ok(SessionOutput::Signature(_)) => unreachable!("keygen session cannot produce a signature"),
            Err(err) if attempt < OPERATION_RETRY_LIMIT && err.is_transient() => {
                progress.emit(ProgressEvent::Retrying {
                    session_id: ctx.session_id.clone(),
                    attempt,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
}

/// Runs a reshare, rotating the signer roster and/or threshold while preserving the vault's
/// public key and chain code. `old_share` is `None` for a party being rotated in fresh.
pub async fn run_reshare(
    relay: &dyn RelayClient,
    kernel: &dyn ProtocolKernel,
    ctx: &SessionContext,
    progress: &ProgressSender,
    old_share: Option<&KeyShare>,
    old_party_indices: &[usize],
    new_party_indices: &[usize],
    threshold: usize,
) -> Result<KeyShare, SessionError> {
    relay.join_session(&ctx.session_id, &ctx.local_party_id).await.map_err(SessionError::Relay)?;
    let joined = wait_for_peers(relay, &ctx.session_id, &ctx.party_ids, ctx.poll_interval, ctx.peer_join_timeout)
        .await
        .map_err(SessionError::Relay)?;
    progress.emit(ProgressEvent::PeersReady { session_id: ctx.session_id.clone() });

    let is_initiator = ctx.party_ids.first().map(String::as_str) == Some(ctx.local_party_id.as_str());
    let mut attempt = 0;
    loop {
        attempt += 1;
        if is_initiator {
            let setup = kernel.reshare_setup(old_share, &joined, old_party_indices, threshold, new_party_indices);
            relay.start_session(&ctx.session_id, &joined).await.map_err(SessionError::Relay)?;
            relay.upload_setup_message(&ctx.session_id, &setup).await.map_err(SessionError::Relay)?;
        }
        let setup = download_setup_with_retry(relay, ctx).await?;
        let session = kernel.reshare_session(&setup, &ctx.local_party_id, old_share);

        match drive_session(relay, ctx, session, progress).await {
            Ok(SessionOutput::KeyShare(share)) => return Ok(share),
            Ok(SessionOutput::Signature(_)) => unreachable!("reshare session cannot produce a signature"),
            Err(err) if attempt < OPERATION_RETRY_LIMIT && err.is_transient() => {
                progress.emit(ProgressEvent::Retrying {
                    session_id: ctx.session_id.clone(),
                    attempt,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
}

/// Runs a single-message signing round over `message`, producing one threshold signature.
///
/// Every signing run gets a fresh `session_id` and party-id set: a signing session is never
/// resumed or replayed against the relay once it has produced (or failed to produce) an
/// output, so the caller must mint new identifiers per invocation.
pub async fn run_keysign(
    relay: &dyn RelayClient,
    kernel: &dyn ProtocolKernel,
    ctx: &SessionContext,
    progress: &ProgressSender,
    key_id: &str,
    derivation_path: &str,
    message: &[u8],
    share: &KeyShare,
) -> Result<vultisig_core::crypto::Signature, SessionError> {
    relay.join_session(&ctx.session_id, &ctx.local_party_id).await.map_err(SessionError::Relay)?;
    let joined = wait_for_peers(relay, &ctx.session_id, &ctx.party_ids, ctx.poll_interval, ctx.peer_join_timeout)
        .await
        .map_err(SessionError::Relay)?;
    progress.emit(ProgressEvent::PeersReady { session_id: ctx.session_id.clone() });

    let is_initiator = ctx.party_ids.first().map(String::as_str) == Some(ctx.local_party_id.as_str());
    let mut attempt = 0;
    loop {
        attempt += 1;
        if is_initiator {
            let setup = kernel.sign_setup(key_id, derivation_path, message, &joined);
            relay.start_session(&ctx.session_id, &joined).await.map_err(SessionError::Relay)?;
            relay.upload_setup_message(&ctx.session_id, &setup).await.map_err(SessionError::Relay)?;
        }
        let setup = download_setup_with_retry(relay, ctx).await?;
        let session = kernel.sign_session(&setup, &ctx.local_party_id, share);

        match drive_session(relay, ctx, session, progress).await {
            Ok(SessionOutput::Signature(sig)) => return Ok(sig),
            Ok(SessionOutput::KeyShare(_)) => unreachable!("keysign session cannot produce a key share"),
            Err(err) if attempt < OPERATION_RETRY_LIMIT && err.is_transient() => {
                progress.emit(ProgressEvent::Retrying {
                    session_id: ctx.session_id.clone(),
                    attempt,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
}

/// Runs a keygen whose setup message was already negotiated by the caller, skipping the
/// upload/download bootstrap `run_keygen` performs. Used by the fast-vault coordinator, which
/// negotiates one setup message for the ECDSA leg of a creation and reuses its exact bytes for
/// the EdDSA leg rather than asking the relay to carry a second one.
pub(crate) async fn run_keygen_with_setup(
    relay: &dyn RelayClient,
    kernel: &dyn ProtocolKernel,
    ctx: &SessionContext,
    progress: &ProgressSender,
    setup: &[u8],
) -> Result<KeyShare, SessionError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let session = kernel.keygen_session(setup, &ctx.local_party_id);
        match drive_session(relay, ctx, session, progress).await {
            Ok(SessionOutput::KeyShare(share)) => return Ok(share),
            Ok(SessionOutput::Signature(_)) => unreachable!("keygen session cannot produce a signature"),
            Err(err) if attempt < OPERATION_RETRY_LIMIT && err.is_transient() => {
                progress.emit(ProgressEvent::Retrying {
                    session_id: ctx.session_id.clone(),
                    attempt,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
}

async fn download_setup_with_retry(relay: &dyn RelayClient, ctx: &SessionContext) -> Result<Vec<u8>, SessionError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match relay.download_setup_message(&ctx.session_id).await {
            Ok(bytes) if !bytes.is_empty() => return Ok(bytes),
            Ok(_) if attempt >= ctx.max_retries => {
                return Err(SessionError::RetriesExhausted { attempts: attempt })
            }
            Ok(_) => tokio::time::sleep(ctx.poll_interval).await,
            Err(err) if attempt >= ctx.max_retries || !err.is_transient() => return Err(SessionError::Relay(err)),
            Err(_) => tokio::time::sleep(ctx.poll_interval).await,
        }
    }
}

/// Shuttles messages between `session` and the relay until the kernel reaches a terminal
/// state, then extracts its output. The outbound and inbound halves run as two independently
/// progressing futures sharing one kernel handle behind a lock, one "finished" flag and the
/// same cancellation token, rather than a single serial drain-then-poll loop — a peer that is
/// slow to drain its outbox never blocks this party from consuming the peer's inbound messages.
async fn drive_session(
    relay: &dyn RelayClient,
    ctx: &SessionContext,
    session: Box<dyn Session>,
    progress: &ProgressSender,
) -> Result<SessionOutput, SessionError> {
    let session = AsyncMutex::new(session);
    let finished = AtomicBool::new(false);
    let seen_hashes: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
    let sequence_no = AtomicU64::new(0);
    let last_progress = Mutex::new(Instant::now());

    let outbound = outbound_loop(relay, ctx, &session, &finished, &sequence_no, &last_progress, progress);
    let inbound = inbound_loop(relay, ctx, &session, &finished, &seen_hashes, &last_progress, progress);
    tokio::try_join!(outbound, inbound)?;

    let output = session.into_inner().finish().map_err(SessionError::Kernel)?;
    relay
        .complete_session(&ctx.session_id, &ctx.local_party_id)
        .await
        .map_err(SessionError::Relay)?;
    progress.emit(ProgressEvent::Completed { session_id: ctx.session_id.clone() });
    Ok(output)
}

/// Drains `session`'s outbox and uploads each message, backing off when there is nothing to
/// send. Declares the session finished, without ever expecting an inbound reply, once a
/// single-party session has nothing left to send.
async fn outbound_loop(
    relay: &dyn RelayClient,
    ctx: &SessionContext,
    session: &AsyncMutex<Box<dyn Session>>,
    finished: &AtomicBool,
    sequence_no: &AtomicU64,
    last_progress: &Mutex<Instant>,
    progress: &ProgressSender,
) -> Result<(), SessionError> {
    loop {
        if ctx.cancellation.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        if finished.load(Ordering::SeqCst) {
            return Ok(());
        }

        let outbound = {
            let mut session = session.lock().await;
            session.output_message().map_err(SessionError::Kernel)?
        };

        match outbound {
            Some(outbound) => {
                let body = codec::encrypt(&ctx.encryption_key, &outbound.body);
                let hash = codec::content_hash(&body);
                let seq = sequence_no.fetch_add(1, Ordering::SeqCst);
                upload_with_retry(relay, ctx, &outbound.receivers, &body, &hash, seq, progress).await?;
                progress.emit(ProgressEvent::MessageSent {
                    session_id: ctx.session_id.clone(),
                    to: outbound.receivers.clone(),
                });
                *last_progress.lock().unwrap() = Instant::now();
            }
            // A session with no peers besides the local party never receives an inbound
            // message to signal completion — it is terminal as soon as it has nothing left
            // to send.
            None if ctx.party_ids.len() <= 1 => {
                finished.store(true, Ordering::SeqCst);
                return Ok(());
            }
            None => tokio::time::sleep(OUTBOUND_BACKOFF).await,
        }
    }
}

/// Long-polls for inbound messages and feeds each one to `session`, marking the session
/// finished once the kernel reports it has reached a terminal state.
async fn inbound_loop(
    relay: &dyn RelayClient,
    ctx: &SessionContext,
    session: &AsyncMutex<Box<dyn Session>>,
    finished: &AtomicBool,
    seen_hashes: &Mutex<HashSet<String>>,
    last_progress: &Mutex<Instant>,
    progress: &ProgressSender,
) -> Result<(), SessionError> {
    loop {
        if ctx.cancellation.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        if finished.load(Ordering::SeqCst) {
            return Ok(());
        }
        if last_progress.lock().unwrap().elapsed() > INBOUND_PROGRESS_DEADLINE {
            return Err(SessionError::Relay(crate::errors::RelayError::Timeout {
                session_id: ctx.session_id.clone(),
            }));
        }

        let messages = download_with_retry(relay, ctx, progress).await?;
        if messages.is_empty() {
            tokio::time::sleep(ctx.poll_interval).await;
            continue;
        }

        for message in messages {
            if !seen_hashes.lock().unwrap().insert(message.hash.clone()) {
                continue;
            }
            let plaintext = codec::decrypt(&ctx.encryption_key, &message.body)
                .map_err(|e| SessionError::Relay(crate::errors::RelayError::Crypto(e)))?;
            let done = {
                let mut session = session.lock().await;
                session.input_message(&plaintext).map_err(SessionError::Kernel)?
            };
            if done {
                finished.store(true, Ordering::SeqCst);
            }
            let _ = relay.delete_message(&ctx.session_id, &ctx.local_party_id, &message.hash).await;
            progress.emit(ProgressEvent::MessageReceived {
                session_id: ctx.session_id.clone(),
                from: message.from,
            });
            *last_progress.lock().unwrap() = Instant::now();
        }
    }
}

async fn upload_with_retry(
    relay: &dyn RelayClient,
    ctx: &SessionContext,
    to: &[String],
    body: &str,
    hash: &str,
    sequence_no: u64,
    progress: &ProgressSender,
) -> Result<(), SessionError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match relay.upload(&ctx.session_id, &ctx.local_party_id, to, body, hash, sequence_no).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt >= ctx.max_retries || !err.is_transient() => {
                progress.emit(ProgressEvent::Failed { session_id: ctx.session_id.clone(), reason: err.to_string() });
                return Err(SessionError::Relay(err));
            }
            Err(err) => {
                progress.emit(ProgressEvent::Retrying {
                    session_id: ctx.session_id.clone(),
                    attempt,
                    reason: err.to_string(),
                });
                tokio::time::sleep(ctx.poll_interval).await;
            }
        }
    }
}

async fn download_with_retry(
    relay: &dyn RelayClient,
    ctx: &SessionContext,
    progress: &ProgressSender,
) -> Result<Vec<crate::relay::RelayMessage>, SessionError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match relay.download(&ctx.session_id, &ctx.local_party_id).await {
            Ok(messages) => return Ok(messages),
            Err(err) if attempt >= ctx.max_retries || !err.is_transient() => {
                progress.emit(ProgressEvent::Failed { session_id: ctx.session_id.clone(), reason: err.to_string() });
                return Err(SessionError::Relay(err));
            }
            Err(err) => {
                progress.emit(ProgressEvent::Retrying {
                    session_id: ctx.session_id.clone(),
                    attempt,
                    reason: err.to_string(),
                });
                tokio::time::sleep(ctx.poll_interval).await;
            }
        }
    }
}

/// A handle bundling a relay client and the runtime's configuration, for callers that want
/// one long-lived object rather than threading `&dyn RelayClient` through every call.
pub struct SessionRuntime {
    pub relay: Arc<dyn RelayClient>,
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub peer_join_timeout: Duration,
}

impl SessionRuntime {
    pub fn new(relay: Arc<dyn RelayClient>, config: &crate::config::Config) -> Self {
        Self {
            relay,
            max_retries: config.max_retries,
            poll_interval: config.poll_interval,
            peer_join_timeout: config.peer_join_timeout,
        }
    }

    pub fn context(&self, session_id: String, local_party_id: String, party_ids: Vec<String>, encryption_key: [u8; 32]) -> SessionContext {
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
}
