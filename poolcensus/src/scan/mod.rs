//! Scan orchestration.
//!
//! A scan runs a number of passes over a target list. Passes run one after
//! another; within a pass up to `concurrency` probes run at once, each
//! against a different target, so a target's observations stay ordered in
//! time. The orchestrating loop is the only writer of the aggregates.

mod aggregate;
mod probe;

pub use aggregate::ScanAggregate;
pub use probe::{
    build_job_observation, Prober, SessionSample, StratumProber, CONNECTION_CLOSED_ERROR,
    JOB_WAIT_TIMEOUT_ERROR,
};

use std::collections::{BTreeMap, HashSet};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;

use crate::config::ScanConfig;
use crate::pools::PoolsData;
use crate::tracing::prelude::*;
use crate::types::ScanTarget;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScanError {
    #[error("no pool targets to scan")]
    NoTargets,

    #[error("no scan passes configured")]
    NoPasses,
}

/// Reported once after every probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    /// Probes finished so far, starting at 1
    pub current: usize,
    pub total: usize,
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Aggregates of every target that produced an observation, sorted by
/// `(host, port)`.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub aggregates: Vec<ScanAggregate>,
}

impl ScanReport {
    /// Errored observations across all targets.
    pub fn error_count(&self) -> u32 {
        self.aggregates.iter().map(|a| a.error_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }
}

/// Flatten the endpoints of the pools matching `filter` into targets.
///
/// Endpoints without a host or with port 0 are skipped, as are repeats of a
/// `host:port` already listed.
pub fn collect_targets(pools: &PoolsData, filter: &str) -> Vec<ScanTarget> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for pool in pools.filter(filter) {
        for endpoint in &pool.endpoints {
            let host = endpoint.host.trim();
            if host.is_empty() || endpoint.port == 0 {
                continue;
            }
            if !seen.insert((host.to_string(), endpoint.port)) {
                debug!(host = %host, port = endpoint.port, "Skipping repeated endpoint");
                continue;
            }
            targets.push(ScanTarget::new(
                pool.name.clone(),
                host,
                endpoint.port,
                endpoint.tls,
            ));
        }
    }

    targets
}

/// Probe every target once per pass and fold the results.
pub async fn scan_targets<P, F>(
    targets: &[ScanTarget],
    prober: &P,
    config: &ScanConfig,
    mut on_progress: F,
) -> Result<ScanReport, ScanError>
where
    P: Prober + ?Sized,
    F: FnMut(&ScanProgress),
{
    if targets.is_empty() {
        return Err(ScanError::NoTargets);
    }
    let passes = config.effective_passes() as usize;
    if passes == 0 {
        return Err(ScanError::NoPasses);
    }

    let concurrency = config.concurrency.max(1);
    let total = targets.len() * passes;
    let mut completed = 0;
    let mut aggregates: BTreeMap<(String, u16), ScanAggregate> = BTreeMap::new();

    info!(
        targets = targets.len(),
        passes = passes,
        concurrency = concurrency,
        "Starting scan"
    );

    for pass in 1..=passes {
        debug!(pass = pass, "Starting pass");

        let mut probes = stream::iter(targets)
            .map(|target| async move { (target, prober.probe(target).await) })
            .buffer_unordered(concurrency);

        while let Some((target, observation)) = probes.next().await {
            completed += 1;
            on_progress(&ScanProgress {
                current: completed,
                total,
                host: target.host.clone(),
                port: target.port,
                tls: target.tls,
            });

            if let Some(error) = &observation.error {
                debug!(pool = %target, connected = observation.connected, error = %error, "Probe errored");
            }

            aggregates
                .entry((target.host.clone(), target.port))
                .or_insert_with(|| ScanAggregate::new(target.clone()))
                .record(observation, config.ping_bound_ms, config.job_wait_bound_ms);
        }
    }

    let report = ScanReport {
        aggregates: aggregates
            .into_values()
            .filter(|agg| agg.latest.is_some())
            .collect(),
    };

    info!(
        aggregates = report.aggregates.len(),
        errors = report.error_count(),
        "Scan complete"
    );
    Ok(report)
}
