//! Process configuration for the relay transport and session runtime.
//!
//! Laid out the way `denylist-updater`'s `Cli` lays out its knobs, minus the `clap` derive —
//! this crate is a library embedded into host applications, not a standalone binary, so it
//! reads its defaults from the environment rather than argv.

use std::time::Duration;

/// Runtime configuration for everything in this crate that talks to the network.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the relay service (e.g. `https://api.vultisig.com/router`).
    pub relay_base_url: String,
    /// Base URL of the fast-vault coordinator's REST API.
    pub fastvault_base_url: String,
    /// How long a long-poll GET to the relay waits before returning empty.
    pub poll_interval: Duration,
    /// How long [`crate::relay::wait_for_peers`] waits for the full roster to join.
    pub peer_join_timeout: Duration,
    /// Maximum attempts for a single relay request or session round before giving up.
    pub max_retries: u32,
    /// Default TTL for a vault's cached unlock password.
    pub password_cache_ttl: Duration,
}

impl Config {
    /// Builds a `Config` from `VULTISIG_*` environment variables, falling back to production
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            relay_base_url: env_or("VULTISIG_RELAY_BASE_URL", "https://api.vultisig.com/router"),
            fastvault_base_url: env_or("VULTISIG_FASTVAULT_BASE_URL", "https://api.vultisig.com/vault"),
            poll_interval: env_duration_ms("VULTISIG_POLL_INTERVAL_MS", 2_000),
            peer_join_timeout: env_duration_ms("VULTISIG_PEER_JOIN_TIMEOUT_MS", 30_000),
            max_retries: env_u32("VULTISIG_MAX_RETRIES", 3),
            password_cache_ttl: env_duration_ms("VULTISIG_PASSWORD_CACHE_TTL_MS", 300_000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_duration_ms(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(key, default_ms))
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
