//! A single probe: one session with one pool, ended by the first job.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::mpsc;

use crate::coinbase::{decode_coinbase_parts, extract_pool_tag, CoinbaseInfo};
use crate::config::ScanConfig;
use crate::stratum_v1::{ClientHandler, JobNotification, StratumClient, StratumError};
use crate::tracing::prelude::*;
use crate::types::{CoinbaseRaw, Credentials, Observation, ScanTarget};

pub const JOB_WAIT_TIMEOUT_ERROR: &str = "timeout waiting for job";
pub const CONNECTION_CLOSED_ERROR: &str = "connection closed";

/// Produces one observation per call.
///
/// Probing never fails: whatever goes wrong is recorded in the returned
/// observation.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &ScanTarget) -> Observation;
}

/// Probes pools over Stratum v1.
pub struct StratumProber {
    config: ScanConfig,
    credentials: Credentials,
}

impl StratumProber {
    pub fn new(config: ScanConfig, credentials: Credentials) -> Self {
        Self {
            config,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    async fn run(
        &self,
        client: &StratumClient,
        target: &ScanTarget,
        events: &mut mpsc::UnboundedReceiver<ProbeEvent>,
    ) -> Observation {
        let failed = |connected: bool, error: String| {
            debug!(host = %target.host, port = target.port, error = %error, "Probe failed");
            Observation::failed(target, &self.credentials, connected, error)
        };

        if let Err(e) = client.connect().await {
            return failed(false, e.to_string());
        }

        let start = Instant::now();
        if let Err(e) = client.subscribe(&self.credentials.user_agent).await {
            return failed(false, e.to_string());
        }
        let ping_ms = millis(start.elapsed());

        let job_wait_start = Instant::now();
        if let Err(e) = client
            .authorize(&self.credentials.username(), &self.credentials.password)
            .await
        {
            return failed(false, e.to_string());
        }

        let mut difficulty = 0.0;
        let deadline = tokio::time::sleep(self.config.job_wait_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(ProbeEvent::Difficulty(value)) => difficulty = value,
                    Some(ProbeEvent::Job { job, received_at }) => {
                        let session = SessionSample {
                            extranonce1: client.extranonce1(),
                            extranonce2_size: client.extranonce2_size(),
                            difficulty,
                            ping_ms,
                            job_latency_ms: millis(
                                received_at.saturating_duration_since(job_wait_start),
                            ),
                        };
                        return self.job_observation(target, session, &job);
                    }
                    Some(ProbeEvent::Disconnected(error)) => {
                        return failed(false, error.unwrap_or_else(|| CONNECTION_CLOSED_ERROR.to_string()));
                    }
                    None => return failed(false, CONNECTION_CLOSED_ERROR.to_string()),
                },

                _ = &mut deadline => {
                    // The session is alive; keep what it negotiated.
                    let mut observation = failed(true, JOB_WAIT_TIMEOUT_ERROR.to_string());
                    observation.extranonce1 = client.extranonce1();
                    observation.extranonce2_size = client.extranonce2_size();
                    observation.difficulty = difficulty;
                    observation.ping_ms = ping_ms;
                    return observation;
                }
            }
        }
    }

    fn job_observation(
        &self,
        target: &ScanTarget,
        session: SessionSample,
        job: &JobNotification,
    ) -> Observation {
        let decoded = match decode_coinbase_parts(
            &job.coinbase1,
            &job.coinbase2,
            &session.extranonce1,
            session.extranonce2_size,
            self.config.network,
        ) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(host = %target.host, port = target.port, error = %e, "Failed to decode coinbase");
                None
            }
        };

        let observation =
            build_job_observation(target, &self.credentials, session, job, decoded.as_ref());
        debug!(
            host = %target.host,
            port = target.port,
            height = observation.block_height,
            payouts = observation.payouts.len(),
            total = observation.total_payout,
            "Captured job"
        );
        observation
    }
}

#[async_trait]
impl Prober for StratumProber {
    async fn probe(&self, target: &ScanTarget) -> Observation {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = Arc::new(ProbeHandler { events: tx });
        let client = StratumClient::new(self.config.client_config(target.endpoint()), handler);

        let observation = self.run(&client, target, &mut rx).await;
        client.close().await;
        observation
    }
}

/// Events forwarded from the client's reader task to the probe.
#[derive(Debug)]
enum ProbeEvent {
    Job {
        job: JobNotification,
        received_at: Instant,
    },
    Difficulty(f64),
    Disconnected(Option<String>),
}

struct ProbeHandler {
    events: mpsc::UnboundedSender<ProbeEvent>,
}

impl ClientHandler for ProbeHandler {
    fn on_notify(&self, job: JobNotification) {
        // The probe stops listening after the first job.
        let _ = self.events.send(ProbeEvent::Job {
            job,
            received_at: Instant::now(),
        });
    }

    fn on_difficulty(&self, difficulty: f64) {
        let _ = self.events.send(ProbeEvent::Difficulty(difficulty));
    }

    fn on_disconnect(&self, error: Option<StratumError>) {
        let _ = self
            .events
            .send(ProbeEvent::Disconnected(error.map(|e| e.to_string())));
    }
}

/// What the session looked like when the job arrived.
#[derive(Debug, Clone, Default)]
pub struct SessionSample {
    pub extranonce1: String,
    pub extranonce2_size: usize,
    pub difficulty: f64,
    pub ping_ms: f64,
    pub job_latency_ms: f64,
}

/// Turn a captured job into an observation.
///
/// `decoded` is `None` when the coinbase did not decode; the observation is
/// still produced, with no payouts.
pub fn build_job_observation(
    target: &ScanTarget,
    credentials: &Credentials,
    session: SessionSample,
    job: &JobNotification,
    decoded: Option<&CoinbaseInfo>,
) -> Observation {
    let payouts = decoded.map(CoinbaseInfo::payouts).unwrap_or_default();
    let total_payout = payouts.iter().map(|p| p.amount_btc).sum();

    let pool_tag = if target.pool_name.is_empty() {
        hex::decode(&job.coinbase2)
            .ok()
            .and_then(|bytes| extract_pool_tag(&bytes))
            .unwrap_or_default()
    } else {
        target.pool_name.clone()
    };

    Observation {
        timestamp: OffsetDateTime::now_utc(),
        host: target.host.clone(),
        port: target.port,
        tls: target.tls,
        connected: true,
        error: None,
        user_agent: credentials.user_agent.clone(),
        username: credentials.username(),
        wallet_address: credentials.wallet.clone(),
        worker_name: credentials.worker.clone(),
        password: credentials.password.clone(),
        extranonce1: session.extranonce1,
        extranonce2_size: session.extranonce2_size,
        difficulty: session.difficulty,
        ping_ms: session.ping_ms,
        job_latency_ms: session.job_latency_ms,
        block_height: decoded.and_then(CoinbaseInfo::block_height).unwrap_or(0),
        pool_tag,
        coinbase_raw: Some(CoinbaseRaw {
            coinbase1: job.coinbase1.clone(),
            coinbase2: job.coinbase2.clone(),
            full_hex: decoded.map(|info| info.full_hex.clone()).unwrap_or_default(),
        }),
        payouts,
        total_payout,
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
