//! A side channel for reporting session progress to a caller (a UI, a log line) without
//! coupling the session runtime to how that caller wants to render it — the same
//! decoupling `denylist-updater` gets from splitting `Runner` out from its `WithMetrics`
//! decorator, done here with a channel instead of a wrapper type since progress is pushed
//! from inside an async loop the caller doesn't otherwise have a handle on.

use tokio::sync::mpsc;

/// One step of an in-progress keygen/reshare/keysign run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The session joined the relay and is waiting for the rest of the roster.
    WaitingForPeers { session_id: String, joined: Vec<String>, expected: Vec<String> },
    /// Every expected peer has joined; the protocol round-trip is starting.
    PeersReady { session_id: String },
    /// One inbound message was consumed by the kernel.
    MessageReceived { session_id: String, from: String },
    /// One outbound message was uploaded to the relay.
    MessageSent { session_id: String, to: Vec<String> },
    /// A transient failure occurred and the runtime is retrying.
    Retrying { session_id: String, attempt: u32, reason: String },
    /// The session reached a terminal state successfully.
    Completed { session_id: String },
    /// The session failed permanently.
    Failed { session_id: String, reason: String },
}

/// Creates a bounded progress channel. The sender is cloned into the session runtime; the
/// receiver is handed to the caller to drive a UI or log sink.
pub fn channel(capacity: usize) -> (ProgressSender, mpsc::Receiver<ProgressEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ProgressSender(tx), rx)
}

/// A cheaply cloneable handle for emitting [`ProgressEvent`]s. Sends are best-effort: if the
/// receiver has been dropped, or the channel is full, the event is silently discarded rather
/// than blocking or failing the session.
#[derive(Clone)]
pub struct ProgressSender(mpsc::Sender<ProgressEvent>);

impl ProgressSender {
    pub fn emit(&self, event: ProgressEvent) {
        if let Err(err) = self.0.try_send(event) {
            tracing::debug!(error = %err, "dropped progress event, receiver is lagging or gone");
        }
    }
}
