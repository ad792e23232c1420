//! Core types shared by the scanner, the heuristics and the dashboard.
//!
//! Observations are what a probe produces and what snapshots persist, so
//! their serialized field names are part of the on-disk format.

mod ping_stats;

pub use ping_stats::{PingStats, JOB_WAIT_BOUND_MS, PING_BOUND_MS};

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::coinbase::ScriptType;
use crate::stratum_v1::Endpoint;

/// One pool endpoint to probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanTarget {
    pub pool_name: String,
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl ScanTarget {
    pub fn new(pool_name: impl Into<String>, host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            pool_name: pool_name.into(),
            host: host.into(),
            port,
            tls,
        }
    }

    /// Identity of the target: `host:port`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port, self.tls)
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)?;
        if self.tls {
            write!(f, " (tls)")?;
        }
        Ok(())
    }
}

/// Identity presented to pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user_agent: String,
    pub wallet: String,
    pub worker: String,
    pub password: String,
}

impl Credentials {
    /// The Stratum username, `wallet.worker`.
    pub fn username(&self) -> String {
        if self.worker.is_empty() {
            return self.wallet.clone();
        }
        format!("{}.{}", self.wallet, self.worker)
    }
}

/// One coinbase output that moves value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub output_index: usize,
    /// Empty when the script has no standard address.
    pub address: String,
    pub amount_btc: f64,
    #[serde(rename = "type")]
    pub script_type: ScriptType,
}

/// The coinbase fragments exactly as the pool sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinbaseRaw {
    pub coinbase1: String,
    pub coinbase2: String,
    /// Reassembled with the extranonce1 and a guessed extranonce2. Empty when
    /// the fragments did not decode.
    pub full_hex: String,
}

/// Outcome of one probe against one target.
///
/// Built once at the end of a probe and never changed afterwards. A latency
/// of `0.0` means it was not measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub user_agent: String,
    pub username: String,
    pub wallet_address: String,
    pub worker_name: String,
    pub password: String,

    #[serde(default)]
    pub extranonce1: String,
    #[serde(default)]
    pub extranonce2_size: usize,
    #[serde(default)]
    pub difficulty: f64,
    #[serde(default)]
    pub ping_ms: f64,
    #[serde(default)]
    pub job_latency_ms: f64,

    /// 0 when the coinbase carried no readable height.
    #[serde(default)]
    pub block_height: u32,
    #[serde(default)]
    pub pool_tag: String,

    #[serde(default)]
    pub coinbase_raw: Option<CoinbaseRaw>,
    #[serde(default)]
    pub payouts: Vec<Payout>,
    #[serde(default)]
    pub total_payout: f64,
}

impl Observation {
    /// An observation with no job data, only the error that ended the probe.
    pub fn failed(
        target: &ScanTarget,
        credentials: &Credentials,
        connected: bool,
        error: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            host: target.host.clone(),
            port: target.port,
            tls: target.tls,
            connected,
            error: Some(error.into()),
            user_agent: credentials.user_agent.clone(),
            username: credentials.username(),
            wallet_address: credentials.wallet.clone(),
            worker_name: credentials.worker.clone(),
            password: credentials.password.clone(),
            extranonce1: String::new(),
            extranonce2_size: 0,
            difficulty: 0.0,
            ping_ms: 0.0,
            job_latency_ms: 0.0,
            block_height: 0,
            pool_tag: String::new(),
            coinbase_raw: None,
            payouts: Vec::new(),
            total_payout: 0.0,
        }
    }

    /// Whether the probe got as far as a job.
    pub fn has_job(&self) -> bool {
        self.coinbase_raw.is_some()
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
