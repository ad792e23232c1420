//! Throwaway miner identities.
//!
//! Each scan presents itself as an ordinary mining rig with a fresh wallet,
//! so pools cannot single out the auditor by a fixed address or agent.

use bitcoin::hashes::Hash;
use bitcoin::{Address, Network, PubkeyHash};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::Credentials;

const AGENT_STRINGS: &[&str] = &[
    "cgminer/4.10.0",
    "bfgminer/5.5.0",
    "phoenixminer/5.6d",
    "teamredminer/0.10.8",
    "lolminer/1.58",
    "trex/0.24.4",
    "nbminer/40.0",
    "vellamo/1.0",
];

/// Worker name patterns; a trailing `-` gets a number appended.
const WORKER_PATTERNS: &[&str] = &[
    "worker-",
    "rig-",
    "miner-",
    "node-",
    "farm-",
    "s19",
    "t19",
    "avalonminer",
    "whatsminer",
    "worker",
    "mining",
];

pub fn random_agent<R: Rng + ?Sized>(rng: &mut R) -> String {
    AGENT_STRINGS
        .choose(rng)
        .copied()
        .unwrap_or(AGENT_STRINGS[0])
        .to_string()
}

pub fn random_worker_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let pattern = WORKER_PATTERNS
        .choose(rng)
        .copied()
        .unwrap_or(WORKER_PATTERNS[0]);
    if pattern.ends_with('-') {
        format!("{}{}", pattern, rng.gen_range(0..100))
    } else {
        pattern.to_string()
    }
}

/// A P2PKH address over a random 20-byte hash.
///
/// Nobody holds a key for it. Payouts to it are never spendable, which is
/// fine: the probe never submits a share.
pub fn random_wallet<R: Rng + ?Sized>(rng: &mut R, network: Network) -> String {
    let hash: [u8; 20] = rng.gen();
    Address::p2pkh(PubkeyHash::from_byte_array(hash), network).to_string()
}

impl Credentials {
    /// Fresh agent, worker name and wallet.
    pub fn random(network: Network, password: &str) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            user_agent: random_agent(&mut rng),
            wallet: random_wallet(&mut rng, network),
            worker: random_worker_name(&mut rng),
            password: password.to_string(),
        }
    }
}
