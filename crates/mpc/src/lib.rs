//! Networked components of the Vultisig threshold-signature wallet SDK: the relay transport,
//! the MPC session runtime that drives keygen/reshare/keysign to completion over it, the
//! fast-vault coordinator's REST client, and the signing orchestration that sits on top of a
//! caller's [`vultisig_core::chain::ChainCodec`].

#![warn(missing_docs)]

pub mod config;
pub mod errors;
pub mod fastvault;
pub mod orchestrator;
pub mod progress;
pub mod relay;
pub mod session;

pub use config::Config;
pub use errors::{FastVaultError, RelayError, SessionError};
pub use fastvault::{FastVaultClient, FastVaultOrchestrator};
pub use orchestrator::sign_transaction;
pub use progress::{channel as progress_channel, ProgressEvent, ProgressSender};
pub use relay::{wait_for_peers, HttpRelayClient, RelayClient, RelayMessage};
pub use session::{run_keygen, run_keysign, run_reshare, CancellationToken, SessionContext, SessionRuntime};
