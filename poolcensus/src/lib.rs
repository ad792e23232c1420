//! Audit Bitcoin mining pools through the jobs they hand out.
//!
//! A scan connects to each pool endpoint as a throwaway miner, waits for the
//! first `mining.notify`, and decodes the coinbase template it carries. The
//! coinbase outputs show who a block found on that job would pay, which is
//! then scored against the wallet the scanner authorized with.

pub mod coinbase;
pub mod config;
pub mod dashboard;
pub mod identity;
pub mod issues;
pub mod pools;
pub mod scan;
pub mod snapshot;
pub mod stratum_v1;
pub mod tracing;
pub mod types;
