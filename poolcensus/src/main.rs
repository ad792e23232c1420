//! Command-line pool audit.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use poolcensus::config::ScanConfig;
use poolcensus::dashboard::{build_dashboard_view, format_ms, DashboardView, EntryView, SortBy};
use poolcensus::issues::trimmed_float;
use poolcensus::pools::PoolsData;
use poolcensus::scan::{collect_targets, scan_targets, StratumProber};
use poolcensus::snapshot::Snapshot;
use poolcensus::tracing::prelude::*;
use poolcensus::types::Credentials;

/// Probe mining pools over Stratum v1 and check who their coinbases pay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pool list to scan (default: the bundled list)
    #[arg(long, value_name = "FILE")]
    pools: Option<PathBuf>,

    /// Only scan pools whose id or name contains this text
    #[arg(short = 'f', long, default_value = "")]
    filter: String,

    /// Passes over the target list (default: POOLCENSUS_PASSES or 3)
    #[arg(short = 'p', long)]
    passes: Option<u32>,

    /// Probes in flight at once
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Ordering within each bucket (ping, worker, job-wait, shuffle)
    #[arg(short = 's', long, default_value_t = SortBy::Ping)]
    sort: SortBy,

    /// Also write the report to this file
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Print the report as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    poolcensus::tracing::init_journald_or_stderr(args.verbose);

    let mut config = ScanConfig::from_env();
    if let Some(passes) = args.passes {
        config.passes = passes;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency.clamp(1, 64);
    }

    let pools = PoolsData::load(args.pools.as_deref()).context("Failed to load pool list")?;
    let targets = collect_targets(&pools, &args.filter);

    let credentials = Credentials::random(config.network, &config.password);
    let prober = StratumProber::new(config.clone(), credentials);
    let identity = prober.credentials();
    info!(
        wallet = %identity.wallet,
        worker = %identity.worker,
        agent = %identity.user_agent,
        "Using throwaway identity"
    );

    let report = scan_targets(&targets, &prober, &config, |progress| {
        info!(
            "[{}/{}] {}:{}{}",
            progress.current,
            progress.total,
            progress.host,
            progress.port,
            if progress.tls { " (tls)" } else { "" }
        );
    })
    .await?;

    if report.is_empty() {
        bail!("no data collected from pools");
    }

    let view = build_dashboard_view(&report.aggregates, args.sort, config.base_reward);

    if let Some(path) = &args.snapshot {
        Snapshot::new(view.clone())
            .save(path)
            .with_context(|| format!("Failed to write snapshot: {:?}", path))?;
        info!(path = %path.display(), "Snapshot saved");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }

    Ok(())
}

fn print_view(view: &DashboardView) {
    println!("== Clean ({}) ==", view.clean.len());
    for entry in &view.clean {
        print_entry(entry);
    }
    println!();
    println!("== Issues ({}) ==", view.issue_count());
    for entry in &view.issues {
        print_entry(entry);
    }
}

fn print_entry(entry: &EntryView) {
    let ping = entry.ping.map_or(0.0, |s| s.avg_ms);
    let job_wait = entry.job_wait.map_or(0.0, |s| s.avg_ms);

    println!(
        "{} {}:{}{}  ping {}  job {}  attempts {} errors {}",
        entry.pool_name,
        entry.host,
        entry.port,
        if entry.tls { " (tls)" } else { "" },
        format_ms(ping),
        format_ms(job_wait),
        entry.attempts,
        entry.error_count,
    );

    if let Some(error) = &entry.error {
        println!("    error: {}", error);
    }

    if entry.has_data {
        println!(
            "    height {}  total {} BTC  worker {}%  ({})",
            entry.block_height,
            trimmed_float(entry.total_payout, 8),
            trimmed_float(entry.worker_percent, 2),
            entry.reward_note
        );
    }

    for payout in &entry.payouts {
        println!(
            "    #{} {} {} BTC ({}%){}",
            payout.payout.output_index,
            if payout.payout.address.is_empty() {
                payout.payout.script_type.as_str()
            } else {
                payout.payout.address.as_str()
            },
            trimmed_float(payout.payout.amount_btc, 8),
            trimmed_float(payout.percent, 2),
            if payout.is_worker { " <- worker" } else { "" }
        );
    }

    for issue in &entry.issues {
        println!("    [{}] {}", issue.score, issue.message);
    }
}
