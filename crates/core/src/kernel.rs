//! The crypto primitives adapter: a uniform interface over the two external protocol
//! kernels (DKLS for ECDSA, the Schnorr kernel for EdDSA), used as black boxes.
//!
//! Neither kernel's internal math is implemented here — both are expected to be bound as
//! FFI/native libraries in a production build. This module only defines the seam: the
//! `ProtocolKernel` capability and the `Session` trait the MPC session runtime drives.

use crate::crypto::{Signature, SignatureAlgorithm};
use crate::errors::KernelError;
use crate::share::KeyShare;

/// A message produced by [`Session::output_message`], destined for the listed receivers.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub receivers: Vec<String>,
    pub body: Vec<u8>,
}

/// What a session produces once it reaches a terminal state.
pub enum SessionOutput {
    KeyShare(KeyShare),
    Signature(Signature),
}

/// One DKG/reshare/keysign run against a kernel, from the adapter's point of view.
///
/// Invalid or out-of-order inbound bytes must be silently ignored by the kernel
/// implementation — the session runtime relies on that contract and does not attempt to
/// validate message framing itself beyond the encrypted-transport layer.
///
/// A `Session` is a scoped resource: whoever owns the `Box<dyn Session>` is responsible for
/// calling [`Session::finish`] exactly once on every exit path (completion, error,
/// cancellation, timeout) so the underlying kernel handle is released.
pub trait Session: Send {
    /// Feeds one decrypted inbound message to the kernel. Returns `Ok(true)` once the
    /// session has reached a terminal state and [`Session::finish`] may be called.
    fn input_message(&mut self, body: &[u8]) -> Result<bool, KernelError>;

    /// Drains the next message the kernel wants sent, if any are queued.
    fn output_message(&mut self) -> Result<Option<OutboundMessage>, KernelError>;

    /// Consumes the session and extracts its output. Calling this before the session is
    /// finished is a logic error in the caller, not a kernel error.
    fn finish(self: Box<Self>) -> Result<SessionOutput, KernelError>;
}

/// A tagged capability over one of the two supported protocol kernels.
///
/// Modelled as a capability object (rather than two concrete generic-parameterized types)
/// so the session runtime in `vultisig-mpc` can hold `Box<dyn ProtocolKernel>` and stay
/// agnostic to which algorithm a given run is performing; the algorithm tag travels with
/// the object via [`ProtocolKernel::algo`].
pub trait ProtocolKernel: Send + Sync {
    fn algo(&self) -> SignatureAlgorithm;

    /// Builds the initiator's setup message for a fresh DKG run.
    fn keygen_setup(&self, key_id: Option<&str>, threshold: usize, party_ids: &[String]) -> Vec<u8>;

    /// Constructs a participant's keygen session from a setup message.
    fn keygen_session(&self, setup: &[u8], local_party_id: &str) -> Box<dyn Session>;

    /// Builds the initiator's setup message for a reshare run.
    fn reshare_setup(
        &self,
        old_share: Option<&KeyShare>,
        all_party_ids: &[String],
        old_party_indices: &[usize],
        threshold: usize,
        new_party_indices: &[usize],
    ) -> Vec<u8>;

    /// Constructs a participant's reshare session. `old_share` is `None` for a party that is
    /// being rotated in without having held a prior share.
    fn reshare_session(
        &self,
        setup: &[u8],
        local_party_id: &str,
        old_share: Option<&KeyShare>,
    ) -> Box<dyn Session>;

    /// Builds the initiator's setup message for a single-message signing run.
    fn sign_setup(
        &self,
        key_id: &str,
        derivation_path: &str,
        message: &[u8],
        party_ids: &[String],
    ) -> Vec<u8>;

    /// Constructs a participant's signing session from a setup message and its local share.
    fn sign_session(&self, setup: &[u8], local_party_id: &str, share: &KeyShare) -> Box<dyn Session>;
}
