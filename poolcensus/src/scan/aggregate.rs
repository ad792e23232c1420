//! Per-target accumulation across passes.

use crate::types::{Observation, PingStats, ScanTarget};

/// Everything learned about one target during a scan.
#[derive(Debug, Clone)]
pub struct ScanAggregate {
    pub target: ScanTarget,

    /// Most recent observation that carried a job. An observation without a
    /// job only lands here while no job has been seen for this target.
    pub latest: Option<Observation>,

    pub ping_stats: PingStats,
    pub job_stats: PingStats,

    pub attempts: u32,

    /// Observations that ended in an error of any kind
    pub error_count: u32,

    /// Errors on a live session, i.e. the pool never sent a job
    pub stall_count: u32,

    /// `host:port: error` for every errored observation, in order
    pub errors: Vec<String>,
}

impl ScanAggregate {
    pub fn new(target: ScanTarget) -> Self {
        Self {
            target,
            latest: None,
            ping_stats: PingStats::default(),
            job_stats: PingStats::default(),
            attempts: 0,
            error_count: 0,
            stall_count: 0,
            errors: Vec::new(),
        }
    }

    /// Fold one probe's observation in.
    pub fn record(&mut self, observation: Observation, ping_bound_ms: f64, job_bound_ms: f64) {
        self.attempts += 1;
        self.ping_stats.add_bounded(observation.ping_ms, ping_bound_ms);
        self.job_stats
            .add_bounded(observation.job_latency_ms, job_bound_ms);

        if let Some(error) = &observation.error {
            self.error_count += 1;
            if observation.connected {
                self.stall_count += 1;
            }
            self.errors.push(format!(
                "{}:{}: {}",
                self.target.host, self.target.port, error
            ));
        }

        let have_job = self.latest.as_ref().is_some_and(Observation::has_job);
        if observation.has_job() || !have_job {
            self.latest = Some(observation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoinbaseRaw, Credentials, JOB_WAIT_BOUND_MS, PING_BOUND_MS};

    fn target() -> ScanTarget {
        ScanTarget::new("", "pool.example", 3333, false)
    }

    fn credentials() -> Credentials {
        Credentials {
            user_agent: "cgminer/4.10.0".into(),
            wallet: "wallet".into(),
            worker: "rig".into(),
            password: "x".into(),
        }
    }

    fn with_job(ping_ms: f64, job_latency_ms: f64) -> Observation {
        let mut obs = Observation::failed(&target(), &credentials(), true, "");
        obs.error = None;
        obs.ping_ms = ping_ms;
        obs.job_latency_ms = job_latency_ms;
        obs.coinbase_raw = Some(CoinbaseRaw {
            coinbase1: "01".into(),
            coinbase2: "02".into(),
            full_hex: String::new(),
        });
        obs
    }

    fn record(agg: &mut ScanAggregate, obs: Observation) {
        agg.record(obs, PING_BOUND_MS, JOB_WAIT_BOUND_MS);
    }

    #[test]
    fn test_error_does_not_replace_job() {
        let mut agg = ScanAggregate::new(target());
        record(&mut agg, with_job(40.0, 200.0));
        record(
            &mut agg,
            Observation::failed(&target(), &credentials(), false, "connection refused"),
        );

        assert_eq!(agg.attempts, 2);
        assert_eq!(agg.error_count, 1);
        assert_eq!(agg.stall_count, 0);
        assert_eq!(agg.errors, vec!["pool.example:3333: connection refused"]);
        let latest = agg.latest.unwrap();
        assert!(latest.has_job());
        assert_eq!(latest.ping_ms, 40.0);
    }

    #[test]
    fn test_newer_job_replaces_older_job() {
        let mut agg = ScanAggregate::new(target());
        record(&mut agg, with_job(40.0, 200.0));
        record(&mut agg, with_job(60.0, 100.0));

        assert_eq!(agg.latest.unwrap().ping_ms, 60.0);
        assert_eq!(agg.ping_stats.count, 2);
        assert_eq!(agg.ping_stats.avg(), 50.0);
        assert_eq!(agg.job_stats.avg(), 150.0);
    }

    #[test]
    fn test_errors_fill_latest_until_a_job_arrives() {
        let mut agg = ScanAggregate::new(target());
        record(
            &mut agg,
            Observation::failed(&target(), &credentials(), false, "first"),
        );
        record(
            &mut agg,
            Observation::failed(&target(), &credentials(), true, "timeout waiting for job"),
        );

        let latest = agg.latest.clone().unwrap();
        assert_eq!(latest.error.as_deref(), Some("timeout waiting for job"));
        assert_eq!(agg.error_count, 2);
        assert_eq!(agg.stall_count, 1);

        record(&mut agg, with_job(30.0, 90.0));
        assert!(agg.latest.unwrap().has_job());
    }

    #[test]
    fn test_unmeasured_latencies_are_not_sampled() {
        let mut agg = ScanAggregate::new(target());
        record(
            &mut agg,
            Observation::failed(&target(), &credentials(), false, "refused"),
        );
        record(&mut agg, with_job(PING_BOUND_MS, 45_000.0));

        assert!(agg.ping_stats.is_empty());
        assert!(agg.job_stats.is_empty());
    }
}
