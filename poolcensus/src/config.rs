//! Scan configuration.
//!
//! Defaults suit an interactive audit of public pools. Environment variables
//! override them, and the binary's flags override those.

use std::str::FromStr;
use std::time::Duration;

use bitcoin::Network;

use crate::stratum_v1::{ClientConfig, Endpoint};
use crate::types::{JOB_WAIT_BOUND_MS, PING_BOUND_MS};

/// Block subsidy since the April 2024 halving, in BTC.
pub const DEFAULT_BASE_REWARD: f64 = 3.125;

/// Everything the scanner needs besides targets and credentials.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Passes over the target list. 0 means `default_passes`.
    pub passes: u32,

    pub default_passes: u32,

    /// Probes in flight at once within a pass. A target is never probed
    /// twice at the same time regardless of this value.
    pub concurrency: usize,

    pub dial_timeout: Duration,
    pub call_timeout: Duration,

    /// How long to wait after authorizing for the first `mining.notify`.
    pub job_wait_timeout: Duration,

    pub ping_bound_ms: f64,
    pub job_wait_bound_ms: f64,

    /// Expected block subsidy in BTC, used for the reward note.
    pub base_reward: f64,

    /// Network used to render payout addresses.
    pub network: Network,

    /// Password sent with `mining.authorize`.
    pub password: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            passes: 0,
            default_passes: 3,
            concurrency: 1,
            dial_timeout: Duration::from_secs(12),
            call_timeout: Duration::from_secs(20),
            job_wait_timeout: Duration::from_secs(30),
            ping_bound_ms: PING_BOUND_MS,
            job_wait_bound_ms: JOB_WAIT_BOUND_MS,
            base_reward: DEFAULT_BASE_REWARD,
            network: Network::Bitcoin,
            password: "x".to_string(),
        }
    }
}

impl ScanConfig {
    /// Defaults overridden by environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `POOLCENSUS_PASSES`: passes per scan (default: 3)
    /// - `POOLCENSUS_CONCURRENCY`: probes in flight (default: 1, clamped to 1-64)
    /// - `POOLCENSUS_JOB_WAIT_SECS`: job wait ceiling in seconds (default: 30)
    /// - `POOLCENSUS_CALL_TIMEOUT_SECS`: per-call timeout in seconds (default: 20)
    /// - `POOLCENSUS_BASE_REWARD`: expected subsidy in BTC (default: 3.125)
    /// - `POOLCENSUS_NETWORK`: `bitcoin`, `testnet`, `signet` or `regtest`
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(passes) = env_parse::<u32>("POOLCENSUS_PASSES") {
            config.default_passes = passes;
        }
        if let Some(concurrency) = env_parse::<usize>("POOLCENSUS_CONCURRENCY") {
            config.concurrency = concurrency.clamp(1, 64);
        }
        if let Some(secs) = env_parse::<u64>("POOLCENSUS_JOB_WAIT_SECS").filter(|s| *s > 0) {
            config.job_wait_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("POOLCENSUS_CALL_TIMEOUT_SECS").filter(|s| *s > 0) {
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(reward) = env_parse::<f64>("POOLCENSUS_BASE_REWARD").filter(|r| *r > 0.0) {
            config.base_reward = reward;
        }
        if let Some(network) = env_parse::<Network>("POOLCENSUS_NETWORK") {
            config.network = network;
        }

        config
    }

    /// Passes to run, falling back to the default when none were requested.
    pub fn effective_passes(&self) -> u32 {
        if self.passes > 0 {
            self.passes
        } else {
            self.default_passes
        }
    }

    pub fn client_config(&self, endpoint: Endpoint) -> ClientConfig {
        ClientConfig {
            endpoint,
            dial_timeout: self.dial_timeout,
            call_timeout: self.call_timeout,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 6] = [
        "POOLCENSUS_PASSES",
        "POOLCENSUS_CONCURRENCY",
        "POOLCENSUS_JOB_WAIT_SECS",
        "POOLCENSUS_CALL_TIMEOUT_SECS",
        "POOLCENSUS_BASE_REWARD",
        "POOLCENSUS_NETWORK",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();

        let config = ScanConfig::from_env();
        assert_eq!(config.effective_passes(), 3);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.job_wait_timeout, Duration::from_secs(30));
        assert_eq!(config.base_reward, DEFAULT_BASE_REWARD);
        assert_eq!(config.network, Network::Bitcoin);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("POOLCENSUS_PASSES", "5");
        std::env::set_var("POOLCENSUS_JOB_WAIT_SECS", "10");
        std::env::set_var("POOLCENSUS_BASE_REWARD", "6.25");
        std::env::set_var("POOLCENSUS_NETWORK", "testnet");

        let config = ScanConfig::from_env();
        assert_eq!(config.effective_passes(), 5);
        assert_eq!(config.job_wait_timeout, Duration::from_secs(10));
        assert_eq!(config.base_reward, 6.25);
        assert_eq!(config.network, Network::Testnet);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_concurrency_clamped_and_garbage_ignored() {
        clear_env();
        std::env::set_var("POOLCENSUS_CONCURRENCY", "0");
        assert_eq!(ScanConfig::from_env().concurrency, 1);

        std::env::set_var("POOLCENSUS_CONCURRENCY", "500");
        assert_eq!(ScanConfig::from_env().concurrency, 64);

        std::env::set_var("POOLCENSUS_CONCURRENCY", "lots");
        std::env::set_var("POOLCENSUS_BASE_REWARD", "-1");
        let config = ScanConfig::from_env();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.base_reward, DEFAULT_BASE_REWARD);

        clear_env();
    }

    #[test]
    fn test_explicit_passes_win() {
        let config = ScanConfig {
            passes: 1,
            ..ScanConfig::default()
        };
        assert_eq!(config.effective_passes(), 1);
    }
}
