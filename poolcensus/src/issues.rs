//! Payout heuristics.
//!
//! A pool that pays its miners honestly puts the miner's wallet in the
//! coinbase. These checks score how far a coinbase strays from that. Each
//! flag carries a fixed weight and an observation's severity is the largest
//! weight raised, not the sum.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Observation, Payout};

pub const SEVERITY_NO_PAYOUT: u32 = 120;
pub const SEVERITY_SPLIT_MISSING_WALLET: u32 = 100;
pub const SEVERITY_SINGLE_MISSING_WALLET: u32 = 80;
pub const SEVERITY_LOW_WORKER_SHARE: u32 = 50;

/// Worker shares at or above this percentage are considered whole.
const LOW_SHARE_PERCENT: f64 = 98.0;
const PERCENT_TOLERANCE: f64 = 0.001;

/// Totals at or below this are treated as zero.
const DUST_BTC: f64 = 0.000_000_01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    SplitMissingWallet,
    SingleMissingWallet,
    LowWorkerShare,
    NoPayout,
}

impl IssueKind {
    pub fn severity(&self) -> u32 {
        match self {
            IssueKind::SplitMissingWallet => SEVERITY_SPLIT_MISSING_WALLET,
            IssueKind::SingleMissingWallet => SEVERITY_SINGLE_MISSING_WALLET,
            IssueKind::LowWorkerShare => SEVERITY_LOW_WORKER_SHARE,
            IssueKind::NoPayout => SEVERITY_NO_PAYOUT,
        }
    }

    fn explanation(&self) -> &'static str {
        match self {
            IssueKind::SplitMissingWallet => {
                "Split coinbases without the worker wallet often mean the pool keeps the reward and pays the worker later."
            }
            IssueKind::SingleMissingWallet => {
                "A single payout to a pool wallet means the worker is not paid directly; the pool only promises to distribute earnings later."
            }
            IssueKind::LowWorkerShare => {
                "The worker receives part of the reward, but less than 98%, which is unusually low."
            }
            IssueKind::NoPayout => "The coinbase pays nothing, so the job shows no reward at all.",
        }
    }
}

/// One raised flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
    pub explanation: String,
    pub score: u32,
}

impl Issue {
    fn new(kind: IssueKind, message: String) -> Self {
        Self {
            kind,
            message,
            explanation: kind.explanation().to_string(),
            score: kind.severity(),
        }
    }
}

/// How a coinbase treats the worker's wallet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PayoutAssessment {
    /// BTC paid to the worker's wallet.
    pub worker_share: f64,
    /// Worker share as a percentage of the total, 0 when the total is 0.
    pub worker_percent: f64,
    pub worker_present: bool,
    pub issues: Vec<Issue>,
    /// Largest score among `issues`, 0 when clean.
    pub severity: u32,
}

/// Score a payout list against the wallet that authorized.
pub fn assess_payouts(payouts: &[Payout], total_payout: f64, wallet: &str) -> PayoutAssessment {
    let worker_share: f64 = payouts
        .iter()
        .filter(|p| !wallet.is_empty() && p.address == wallet)
        .map(|p| p.amount_btc)
        .sum();
    let worker_percent = if total_payout > 0.0 {
        worker_share / total_payout * 100.0
    } else {
        0.0
    };
    let worker_present = !wallet.is_empty() && worker_share > 0.0;

    let mut issues = Vec::new();

    if payouts.len() > 1 && !worker_present {
        issues.push(Issue::new(
            IssueKind::SplitMissingWallet,
            format!(
                "split coinbase ({} outputs) missing worker wallet",
                payouts.len()
            ),
        ));
    }

    if payouts.len() == 1 && !wallet.is_empty() && !worker_present {
        issues.push(Issue::new(
            IssueKind::SingleMissingWallet,
            "single payout missing worker wallet".to_string(),
        ));
    }

    if worker_present && worker_percent + PERCENT_TOLERANCE < LOW_SHARE_PERCENT {
        issues.push(Issue::new(
            IssueKind::LowWorkerShare,
            format!("worker share {}% below 98%", trimmed_float(worker_percent, 2)),
        ));
    }

    if payouts.is_empty() || total_payout <= 0.0 {
        issues.push(Issue::new(
            IssueKind::NoPayout,
            "coinbase has no payout".to_string(),
        ));
    }

    let severity = issues.iter().map(|i| i.score).max().unwrap_or(0);

    PayoutAssessment {
        worker_share,
        worker_percent,
        worker_present,
        issues,
        severity,
    }
}

/// [`assess_payouts`] for an observation's own payouts and wallet.
pub fn assess(observation: &Observation) -> PayoutAssessment {
    assess_payouts(
        &observation.payouts,
        observation.total_payout,
        &observation.wallet_address,
    )
}

/// Comparison of the coinbase total with the expected subsidy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardNote {
    NotRecorded,
    LessThanExpected,
    Correct,
}

impl fmt::Display for RewardNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RewardNote::NotRecorded => "payout not recorded yet",
            RewardNote::LessThanExpected => "total payout less than block reward",
            RewardNote::Correct => "total payout amount correct",
        })
    }
}

pub fn reward_note(total_payout: f64, base_reward: f64) -> RewardNote {
    if total_payout <= DUST_BTC {
        RewardNote::NotRecorded
    } else if total_payout < base_reward {
        RewardNote::LessThanExpected
    } else {
        RewardNote::Correct
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Clean,
    Issues,
}

/// Where an observation belongs on the dashboard.
pub fn bucket(issues: &[Issue], connected: bool) -> Bucket {
    if !issues.is_empty() || !connected {
        Bucket::Issues
    } else {
        Bucket::Clean
    }
}

/// Format with at most `decimals` places and no trailing zeros.
pub fn trimmed_float(value: f64, decimals: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let s = format!("{:.*}", decimals, value);
    let s = if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s.as_str()
    };
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coinbase::ScriptType;

    const WORKER: &str = "12ZEw5Hcv1hTb6YUQJ69y1V7uhcoDz92PH";
    const POOL: &str = "bc1qnp980s5fpp8l94p5cvttmtdqy8rvrq74qly2yrfmzkdsntqzlc5qkc4rkq";

    fn payout(index: usize, address: &str, amount_btc: f64) -> Payout {
        Payout {
            output_index: index,
            address: address.to_string(),
            amount_btc,
            script_type: ScriptType::PubKeyHash,
        }
    }

    fn kinds(assessment: &PayoutAssessment) -> Vec<IssueKind> {
        assessment.issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_full_reward_to_worker_is_clean() {
        let payouts = [payout(0, WORKER, 3.125)];
        let a = assess_payouts(&payouts, 3.125, WORKER);

        assert!(a.worker_present);
        assert_eq!(a.worker_percent, 100.0);
        assert!(a.issues.is_empty());
        assert_eq!(a.severity, 0);
        assert_eq!(bucket(&a.issues, true), Bucket::Clean);
    }

    #[test]
    fn test_severity_is_max_not_sum() {
        // Two outputs, no worker, nothing paid: 100 and 120 both fire.
        let payouts = [payout(0, POOL, 0.0), payout(1, "", 0.0)];
        let a = assess_payouts(&payouts, 0.0, WORKER);

        assert_eq!(
            kinds(&a),
            vec![IssueKind::SplitMissingWallet, IssueKind::NoPayout]
        );
        assert_eq!(a.severity, 120);
    }

    #[test]
    fn test_split_missing_wallet() {
        let payouts = [payout(0, POOL, 3.0), payout(2, "", 2.0)];
        let a = assess_payouts(&payouts, 5.0, WORKER);

        assert_eq!(kinds(&a), vec![IssueKind::SplitMissingWallet]);
        assert_eq!(a.severity, SEVERITY_SPLIT_MISSING_WALLET);
        assert_eq!(a.issues[0].message, "split coinbase (2 outputs) missing worker wallet");
        assert_eq!(a.worker_percent, 0.0);
    }

    #[test]
    fn test_single_missing_wallet_needs_known_wallet() {
        let payouts = [payout(0, POOL, 3.125)];

        let a = assess_payouts(&payouts, 3.125, WORKER);
        assert_eq!(kinds(&a), vec![IssueKind::SingleMissingWallet]);
        assert_eq!(a.severity, 80);

        let unknown = assess_payouts(&payouts, 3.125, "");
        assert!(unknown.issues.is_empty());
        assert!(!unknown.worker_present);
    }

    #[test]
    fn test_low_worker_share_with_tolerance() {
        let low = [payout(0, WORKER, 3.0), payout(1, POOL, 0.125)];
        let a = assess_payouts(&low, 3.125, WORKER);
        assert_eq!(kinds(&a), vec![IssueKind::LowWorkerShare]);
        assert_eq!(a.issues[0].message, "worker share 96% below 98%");

        // 97.9995% is within tolerance of 98%.
        let edge = [payout(0, WORKER, 97.9995), payout(1, POOL, 2.0005)];
        let a = assess_payouts(&edge, 100.0, WORKER);
        assert!(a.issues.is_empty());
    }

    #[test]
    fn test_worker_share_sums_every_matching_output() {
        let payouts = [
            payout(0, WORKER, 1.5),
            payout(1, WORKER, 1.5),
            payout(2, POOL, 0.03),
        ];
        let a = assess_payouts(&payouts, 3.03, WORKER);
        assert_eq!(a.worker_share, 3.0);
        assert!(a.worker_present);
        assert!(a.issues.is_empty());
    }

    #[test]
    fn test_no_payouts() {
        let a = assess_payouts(&[], 0.0, WORKER);
        assert_eq!(kinds(&a), vec![IssueKind::NoPayout]);
        assert_eq!(a.severity, SEVERITY_NO_PAYOUT);
        assert_eq!(bucket(&a.issues, true), Bucket::Issues);
    }

    #[test]
    fn test_disconnected_is_an_issue_even_without_flags() {
        let payouts = [payout(0, WORKER, 3.125)];
        let a = assess_payouts(&payouts, 3.125, WORKER);
        assert_eq!(bucket(&a.issues, false), Bucket::Issues);
    }

    #[test]
    fn test_reward_note() {
        assert_eq!(reward_note(0.0, 3.125), RewardNote::NotRecorded);
        assert_eq!(reward_note(0.000_000_01, 3.125), RewardNote::NotRecorded);
        assert_eq!(reward_note(3.0, 3.125), RewardNote::LessThanExpected);
        assert_eq!(reward_note(3.125, 3.125), RewardNote::Correct);
        assert_eq!(reward_note(5.0, 3.125), RewardNote::Correct);
    }

    #[test]
    fn test_trimmed_float() {
        assert_eq!(trimmed_float(96.0, 2), "96");
        assert_eq!(trimmed_float(3.15012581, 8), "3.15012581");
        assert_eq!(trimmed_float(12.5, 2), "12.5");
        assert_eq!(trimmed_float(0.0, 2), "0");
        assert_eq!(trimmed_float(-0.0001, 2), "0");
    }
}
