//! `simulate` subcommand: drive synthetic mixed-tier load through the
//! admission controller using the simulated backend.

use std::sync::Arc;

use futures::future::join_all;
use rand::Rng;
use serde_json::json;
use uuid::Uuid;

use super::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_OK};
use crate::admission::{AdmissionController, ExecutionRouter, SimulatedExecutor};
use crate::config::{self, GatewayConfig};
use crate::request::{ExecutionOverrides, Request};
use crate::shutdown::ShutdownResult;
use crate::stats::DetailedStats;
use crate::telemetry::{self, LogError};
use crate::tier::Tier;

/// Parsed `simulate` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulateOptions {
    pub requests: usize,
    pub json: bool,
    /// Overrides the configured simulator failure rate.
    pub failure_rate: Option<f64>,
}

impl Default for SimulateOptions {
    fn default() -> Self {
        Self { requests: 100, json: false, failure_rate: None }
    }
}

impl SimulateOptions {
    /// Parse arguments following the subcommand name.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut options = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--json" => options.json = true,
                "--requests" | "-n" => {
                    let value = iter.next().ok_or("--requests requires a value")?;
                    options.requests = value
                        .parse()
                        .map_err(|_| format!("invalid request count: {value}"))?;
                }
                "--failure-rate" => {
                    let value = iter.next().ok_or("--failure-rate requires a value")?;
                    let rate: f64 = value
                        .parse()
                        .map_err(|_| format!("invalid failure rate: {value}"))?;
                    if !(0.0..=1.0).contains(&rate) {
                        return Err(format!("failure rate must be within 0..=1: {value}"));
                    }
                    options.failure_rate = Some(rate);
                }
                other => return Err(format!("unknown simulate option: {other}")),
            }
        }
        Ok(options)
    }
}

/// Enterprise 20%, premium 30%, free 50%.
fn pick_tier(rng: &mut impl Rng) -> Tier {
    match rng.gen_range(0..10) {
        0..=1 => Tier::Enterprise,
        2..=4 => Tier::Premium,
        _ => Tier::Free,
    }
}

/// Run the simulation. Returns a process exit code.
pub async fn run_simulate(options: SimulateOptions) -> i32 {
    let mut cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return EXIT_CONFIG_ERROR;
        }
    };
    if let Some(rate) = options.failure_rate {
        cfg.execution.simulator.failure_rate = rate;
    }
    match telemetry::init_logging(&cfg.logging) {
        Ok(()) | Err(LogError::AlreadyInitialized) => {}
        Err(e) => eprintln!("WARNING: logging disabled: {e}"),
    }

    let stats = simulate(&cfg, &options).await;
    if options.json {
        match serde_json::to_string_pretty(&stats) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("ERROR: failed to encode stats: {e}");
                return EXIT_FAILURE;
            }
        }
    } else {
        print_summary(&stats);
    }
    EXIT_OK
}

/// Submit `options.requests` synthetic requests concurrently and return the
/// final stats once everything has drained.
pub async fn simulate(cfg: &GatewayConfig, options: &SimulateOptions) -> DetailedStats {
    let simulator = Arc::new(SimulatedExecutor::new(cfg.execution.simulator.clone()));
    let executor = Arc::new(ExecutionRouter::new(cfg.execution.mode, simulator));
    let controller = AdmissionController::new(cfg.admission.clone(), executor);

    // No real backend is wired into the CLI.
    let overrides = ExecutionOverrides { force_simulated: true, force_real: false };
    let requests: Vec<Request> = {
        let mut rng = rand::thread_rng();
        (0..options.requests)
            .map(|i| {
                let payload = json!({ "prompt": format!("synthetic request {i}") });
                Request::new(Uuid::new_v4().to_string(), pick_tier(&mut rng), payload)
                    .with_overrides(overrides)
            })
            .collect()
    };

    let results = join_all(requests.into_iter().map(|r| controller.submit(r))).await;
    let failed = results.iter().filter(|r| r.is_err()).count();
    tracing::info!(submitted = results.len(), failed, "simulation finished");

    if let ShutdownResult::Timeout { remaining } = controller.drain_with_timeout(cfg.shutdown_timeout()).await {
        tracing::warn!(remaining, "drain timed out");
    }
    controller.detailed_stats()
}

fn print_summary(stats: &DetailedStats) {
    let c = &stats.counters;
    println!("Scheduler:        {:?}", stats.scheduler);
    println!("Breaker:          {}", stats.breaker.state);
    println!(
        "Requests:         {} total, {} succeeded, {} failed, {} rejected",
        c.total, c.succeeded, c.failed, c.rejected
    );
    println!("Max concurrent:   {}", stats.budget.max_concurrent);
    println!("Avg wait:         {:.1} ms", stats.avg_wait_time_ms);
    println!("Avg processing:   {:.1} ms", stats.avg_processing_time_ms);
    println!("Rate:             {:.1} /min", stats.processing_rate_per_minute);
    println!();
    println!("{:<12} {:>10} {:>12}", "TIER", "COMPLETED", "ALLOCATION");
    for tier in Tier::ALL {
        println!(
            "{:<12} {:>10} {:>12}",
            tier.as_str(),
            stats.completed_by_tier.get(tier),
            stats.allocation.get(tier)
        );
    }
}
