//! Mock protocol kernels for exercising the MPC session runtime without linking the real
//! DKLS/Schnorr native libraries. Only compiled under the `dev` feature.

use std::collections::VecDeque;

use crate::crypto::SignatureAlgorithm;
use crate::errors::KernelError;
use crate::kernel::{OutboundMessage, ProtocolKernel, Session, SessionOutput};
use crate::share::KeyShare;

/// A trivial kernel that treats every inbound message as a no-op and finishes on the first
/// `input_message` call, handing back deterministic, seed-derived key material. Useful for
/// driving the relay/session plumbing in tests where the cryptographic content is irrelevant.
pub struct MockKernel {
    algo: SignatureAlgorithm,
    seed: u8,
}

impl MockKernel {
    pub fn new(algo: SignatureAlgorithm, seed: u8) -> Self {
        Self { algo, seed }
    }
}

impl ProtocolKernel for MockKernel {
    fn algo(&self) -> SignatureAlgorithm {
        self.algo
    }

    fn keygen_setup(&self, key_id: Option<&str>, threshold: usize, party_ids: &[String]) -> Vec<u8> {
        format!(
            "keygen:{}:{}:{}",
            key_id.unwrap_or("-"),
            threshold,
            party_ids.join(",")
        )
        .into_bytes()
    }

    fn keygen_session(&self, setup: &[u8], local_party_id: &str) -> Box<dyn Session> {
        Box::new(MockSession::keygen(self.algo, self.seed, setup, local_party_id))
    }

    fn reshare_setup(
        &self,
        _old_share: Option<&KeyShare>,
        all_party_ids: &[String],
        old_party_indices: &[usize],
        threshold: usize,
        new_party_indices: &[usize],
    ) -> Vec<u8> {
        format!(
            "reshare:{}:{}:{:?}:{:?}",
            all_party_ids.join(","),
            threshold,
            old_party_indices,
            new_party_indices
        )
        .into_bytes()
    }

    fn reshare_session(
        &self,
        setup: &[u8],
        local_party_id: &str,
        _old_share: Option<&KeyShare>,
    ) -> Box<dyn Session> {
        Box::new(MockSession::keygen(self.algo, self.seed, setup, local_party_id))
    }

    fn sign_setup(&self, key_id: &str, derivation_path: &str, message: &[u8], party_ids: &[String]) -> Vec<u8> {
        let mut setup = format!("sign:{key_id}:{derivation_path}:{}:", party_ids.join(",")).into_bytes();
        setup.extend_from_slice(message);
        setup
    }

    fn sign_session(&self, setup: &[u8], local_party_id: &str, share: &KeyShare) -> Box<dyn Session> {
        Box::new(MockSession::sign(self.algo, setup, local_party_id, share))
    }
}

enum MockOutput {
    Share(Vec<u8>),
    Signature(Vec<u8>),
}

struct MockSession {
    algo: SignatureAlgorithm,
    peers: Vec<String>,
    local_party_id: String,
    output: MockOutput,
    outbox: VecDeque<OutboundMessage>,
    terminal: bool,
}

impl MockSession {
    fn keygen(algo: SignatureAlgorithm, seed: u8, setup: &[u8], local_party_id: &str) -> Self {
        let peers = extract_party_ids(setup);
        let mut outbox = VecDeque::new();
        for peer in peers.iter().filter(|p| p.as_str() != local_party_id) {
            outbox.push_back(OutboundMessage {
                receivers: vec![peer.clone()],
                body: format!("ack:{local_party_id}").into_bytes(),
            });
        }
        Self {
            algo,
            peers: peers.clone(),
            local_party_id: local_party_id.to_string(),
            output: MockOutput::Share(vec![seed; 32]),
            outbox,
            terminal: peers.len() <= 1,
        }
    }

    fn sign(algo: SignatureAlgorithm, setup: &[u8], local_party_id: &str, share: &KeyShare) -> Self {
        let peers = extract_party_ids(setup);
        let mut outbox = VecDeque::new();
        for peer in peers.iter().filter(|p| p.as_str() != local_party_id) {
            outbox.push_back(OutboundMessage {
                receivers: vec![peer.clone()],
                body: format!("partial-sig:{local_party_id}").into_bytes(),
            });
        }
        let mut sig = share.as_bytes().to_vec();
        sig.truncate(8);
        Self {
            algo,
            peers: peers.clone(),
            local_party_id: local_party_id.to_string(),
            output: MockOutput::Signature(sig),
            outbox,
            terminal: peers.len() <= 1,
        }
    }
}

fn extract_party_ids(setup: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(setup);
    text.split(':')
        .find(|segment| segment.contains(','))
        .map(|segment| segment.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

impl Session for MockSession {
    fn input_message(&mut self, _body: &[u8]) -> Result<bool, KernelError> {
        self.terminal = true;
        Ok(self.terminal)
    }

    fn output_message(&mut self) -> Result<Option<OutboundMessage>, KernelError> {
        Ok(self.outbox.pop_front())
    }

    fn finish(self: Box<Self>) -> Result<SessionOutput, KernelError> {
        if !self.terminal {
            return Err(KernelError::Transient);
        }
        let algo = self.algo;
        match self.output {
            MockOutput::Share(bytes) => {
                let public_key = vec![0x02u8; if algo == SignatureAlgorithm::ECDSA { 33 } else { 32 }];
                Ok(SessionOutput::KeyShare(KeyShare::new(algo, bytes, public_key, [0x5au8; 32])))
            }
            MockOutput::Signature(sig) => Ok(SessionOutput::Signature(crate::crypto::Signature {
                sig,
                algo,
                curve: match algo {
                    SignatureAlgorithm::ECDSA => crate::crypto::EllipticCurve::Secp256k1,
                    SignatureAlgorithm::EdDSA => crate::crypto::EllipticCurve::Curve25519,
                },
                hash: crate::crypto::HashFunction::None,
                enc: crate::crypto::SignatureEncoding::Raw64,
                recovery_id: None,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_keygen_session_with_a_single_party_finishes_immediately() {
        let kernel = MockKernel::new(SignatureAlgorithm::ECDSA, 3);
        let setup = kernel.keygen_setup(None, 1, &["solo".to_string()]);
        let mut session = kernel.keygen_session(&setup, "solo");
        assert!(session.output_message().unwrap().is_none());
        let output = Box::new(session).finish();
        assert!(matches!(output, Ok(SessionOutput::KeyShare(_))));
    }

    #[test]
    fn mock_keygen_session_with_peers_queues_outbound_messages() {
        let kernel = MockKernel::new(SignatureAlgorithm::EdDSA, 9);
        let parties = vec!["a".to_string(), "b".to_string()];
        let setup = kernel.keygen_setup(Some("key-1"), 2, &parties);
        let mut session = kernel.keygen_session(&setup, "a");
        assert!(session.output_message().unwrap().is_some());
        assert!(session.input_message(b"peer-reply").unwrap());
    }
}
