//! Presentation-ready view of a finished scan.
//!
//! Each aggregate becomes an [`EntryView`] combining its latest observation
//! with the heuristics and latency summaries, then lands in the clean or the
//! issue bucket.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::issues::{self, Bucket, Issue, RewardNote};
use crate::scan::ScanAggregate;
use crate::types::{Observation, Payout, PingStats, PING_BOUND_MS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortBy {
    /// Fastest pools first.
    #[default]
    Ping,
    /// Largest worker share first.
    Worker,
    /// Quickest first job first.
    JobWait,
    Shuffle,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ping" => Ok(SortBy::Ping),
            "worker" => Ok(SortBy::Worker),
            "job-wait" | "jobwait" => Ok(SortBy::JobWait),
            "shuffle" => Ok(SortBy::Shuffle),
            other => Err(format!(
                "unknown sort '{other}', expected ping, worker, job-wait or shuffle"
            )),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortBy::Ping => "ping",
            SortBy::Worker => "worker",
            SortBy::JobWait => "job-wait",
            SortBy::Shuffle => "shuffle",
        })
    }
}

/// A payout with its share of the coinbase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutView {
    #[serde(flatten)]
    pub payout: Payout,
    pub is_worker: bool,
    pub percent: f64,
}

/// Latency over all passes. `real` is the mean plus half the jitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: u32,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub jitter_ms: f64,
    pub real_ms: f64,
}

impl LatencySummary {
    pub fn from_stats(stats: &PingStats) -> Option<Self> {
        if stats.is_empty() {
            return None;
        }
        let avg = stats.avg();
        let jitter = stats.jitter();
        Some(Self {
            samples: stats.count,
            min_ms: stats.min,
            avg_ms: avg,
            max_ms: stats.max,
            jitter_ms: jitter,
            real_ms: avg + jitter / 2.0,
        })
    }
}

/// One target as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryView {
    pub pool_name: String,
    pub host: String,
    pub port: u16,
    pub tls: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub ping: Option<LatencySummary>,
    pub job_wait: Option<LatencySummary>,
    /// Sort key for [`SortBy::Ping`]; 0 when never measured.
    pub ping_sort: f64,
    /// Sort key for [`SortBy::JobWait`]; 0 when never measured.
    pub job_wait_sort: f64,

    pub block_height: u32,
    pub total_payout: f64,
    pub worker_share: f64,
    pub worker_percent: f64,
    pub payouts: Vec<PayoutView>,
    pub has_data: bool,
    /// Largest payout that does not go to the worker.
    pub pool_wallet: Option<String>,

    pub issues: Vec<Issue>,
    pub severity: u32,
    pub reward_note: RewardNote,

    pub attempts: u32,
    pub error_count: u32,
    pub stall_count: u32,
}

impl EntryView {
    pub fn build(aggregate: &ScanAggregate, base_reward: f64) -> Option<Self> {
        let latest = aggregate.latest.as_ref()?;
        let assessment = issues::assess(latest);

        let payouts = latest
            .payouts
            .iter()
            .map(|payout| PayoutView {
                is_worker: !payout.address.is_empty()
                    && !latest.wallet_address.is_empty()
                    && payout.address == latest.wallet_address,
                percent: if latest.total_payout > 0.0 {
                    payout.amount_btc / latest.total_payout * 100.0
                } else {
                    0.0
                },
                payout: payout.clone(),
            })
            .collect();

        let ping = LatencySummary::from_stats(&aggregate.ping_stats);
        let job_wait = LatencySummary::from_stats(&aggregate.job_stats);

        let pool_name = if latest.pool_tag.is_empty() {
            latest.host.clone()
        } else {
            latest.pool_tag.clone()
        };

        Some(Self {
            pool_name,
            host: latest.host.clone(),
            port: latest.port,
            tls: latest.tls,
            timestamp: latest.timestamp,
            connected: latest.connected,
            error: latest.error.clone(),
            ping_sort: ping.map(|s| s.real_ms).unwrap_or(latest.ping_ms),
            job_wait_sort: job_wait.map(|s| s.real_ms).unwrap_or(0.0),
            ping,
            job_wait,
            block_height: latest.block_height,
            total_payout: latest.total_payout,
            worker_share: assessment.worker_share,
            worker_percent: assessment.worker_percent,
            payouts,
            has_data: !latest.payouts.is_empty() && latest.total_payout > 0.0,
            pool_wallet: dominant_pool_wallet(latest),
            severity: assessment.severity,
            reward_note: issues::reward_note(latest.total_payout, base_reward),
            issues: assessment.issues,
            attempts: aggregate.attempts,
            error_count: aggregate.error_count,
            stall_count: aggregate.stall_count,
        })
    }

    pub fn bucket(&self) -> Bucket {
        issues::bucket(&self.issues, self.connected)
    }
}

/// The scan split into clean and suspicious pools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub clean: Vec<EntryView>,
    pub issues: Vec<EntryView>,
    pub sort_by: SortBy,
}

impl DashboardView {
    /// Entries in the issue bucket.
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clean.is_empty() && self.issues.is_empty()
    }
}

pub fn build_dashboard_view(
    aggregates: &[ScanAggregate],
    sort_by: SortBy,
    base_reward: f64,
) -> DashboardView {
    let mut view = DashboardView {
        sort_by,
        ..Default::default()
    };

    for entry in aggregates
        .iter()
        .filter_map(|agg| EntryView::build(agg, base_reward))
    {
        match entry.bucket() {
            Bucket::Clean => view.clean.push(entry),
            Bucket::Issues => view.issues.push(entry),
        }
    }

    sort_entries(&mut view.clean, sort_by);
    sort_entries(&mut view.issues, sort_by);
    view
}

fn sort_entries(entries: &mut [EntryView], sort_by: SortBy) {
    match sort_by {
        SortBy::Shuffle => entries.shuffle(&mut rand::thread_rng()),
        SortBy::Worker => entries.sort_by(|a, b| {
            b.worker_percent
                .total_cmp(&a.worker_percent)
                .then_with(|| newer_first(a, b))
        }),
        SortBy::Ping => entries.sort_by(|a, b| {
            ascending_or_last(a.ping_sort, b.ping_sort).then_with(|| newer_first(a, b))
        }),
        SortBy::JobWait => entries.sort_by(|a, b| {
            ascending_or_last(a.job_wait_sort, b.job_wait_sort).then_with(|| newer_first(a, b))
        }),
    }
}

/// Ascending, with unmeasured (zero) keys after every measured one.
fn ascending_or_last(a: f64, b: f64) -> Ordering {
    let key = |v: f64| if v == 0.0 { f64::INFINITY } else { v };
    key(a).total_cmp(&key(b))
}

fn newer_first(a: &EntryView, b: &EntryView) -> Ordering {
    b.timestamp.cmp(&a.timestamp)
}

/// Address of the largest payout not going to the worker's wallet.
pub fn dominant_pool_wallet(observation: &Observation) -> Option<String> {
    let mut best: Option<&Payout> = None;
    for payout in &observation.payouts {
        let address = payout.address.trim();
        if address.is_empty()
            || (!observation.wallet_address.is_empty() && address == observation.wallet_address)
        {
            continue;
        }
        if best.map_or(true, |b| payout.amount_btc > b.amount_btc) {
            best = Some(payout);
        }
    }
    best.map(|p| p.address.trim().to_string())
}

/// Human form of a latency.
pub fn format_ms(ms: f64) -> String {
    if ms <= 0.0 {
        "n/a".to_string()
    } else if ms >= PING_BOUND_MS {
        "timeout".to_string()
    } else if ms < 1.0 {
        "<1 ms".to_string()
    } else {
        format!("{:.0} ms", ms.round())
    }
}
