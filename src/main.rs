//! Simurgh binary: sweep, synthesize, test, write.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use simurgh::checker::{CheckerOptions, ProxyChecker, StatsSnapshot};
use simurgh::cli::Args;
use simurgh::probe::dispatcher::CancelSignal;
use simurgh::report::{files, markdown};
use simurgh::rng::RngService;
use simurgh::subscription::synthesis::{ConfigSynthesizer, EndpointIdentity};
use simurgh::subscription::tester::{ConfigTester, TestedConfig};

fn main() -> ExitCode {
    let args = Args::parse().normalized();

    let default_filter = if args.verbose { "simurgh=debug" } else { "simurgh=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.performance_mode.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> simurgh::Result<()> {
    info!(
        version = simurgh::VERSION,
        iran_mode = args.iran_mode,
        dpi_evasion_level = ?args.dpi_evasion_level,
        max_concurrent = args.max_concurrent,
        timeout_s = args.timeout,
        "starting"
    );

    let started = Instant::now();
    let rng = RngService::from_entropy();

    let (cancel_handle, cancel) = CancelSignal::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; draining in-flight probes");
            cancel_handle.cancel();
        }
    });

    let options = CheckerOptions {
        max_concurrent: args.max_concurrent,
        timeout: args.probe_timeout(),
        iran_mode: args.iran_mode,
        emergency_mode: args.emergency_mode,
        dpi_evasion_level: args.dpi_evasion_level,
    };
    let checker = ProxyChecker::new(options, rng.clone());

    // Step 1: endpoint sweep.
    if !args.configs_only {
        let endpoints = checker.read_candidates(&args.proxy_file)?;
        info!(candidates = endpoints.len(), file = %args.proxy_file, "candidates loaded");

        if let Err(e) = checker.detect_self_ip().await {
            warn!(error = %e, "self-IP detection failed; loopback filtering disabled");
        }

        let stats = checker.run(endpoints, &cancel).await?;
        log_sweep_stats(&stats);

        markdown::write_report(&args.output_file, &checker.active_by_country(), &stats)?;
    }

    // Step 2: config synthesis.
    let mut generated = Vec::new();
    if args.generate_configs {
        let synthesizer =
            ConfigSynthesizer::new(args.iran_mode, args.dpi_evasion_level, rng.clone());
        if args.configs_only {
            // Without a sweep there are no endpoints to mint configs from.
            warn!("configs-only mode without prior sweep results; nothing to synthesize");
        } else {
            for report in checker.active_reports() {
                let identity = EndpointIdentity::from(&report);
                generated.extend(synthesizer.synthesize(&identity));
            }
        }
        info!(configs = generated.len(), "synthesis complete");
    }

    // Step 3: config testing.
    let tested: Vec<TestedConfig> = if args.test_configs && !generated.is_empty() {
        let tester = ConfigTester::new(
            args.max_concurrent,
            args.probe_timeout(),
            args.iran_mode,
            rng.clone(),
        );
        tester
            .test_all(generated, &cancel)
            .await
            .into_iter()
            .filter(|t| t.passed)
            .collect()
    } else {
        generated
            .into_iter()
            .map(|config| TestedConfig {
                config,
                passed: true,
                first_latency_ms: 0,
                avg_latency_ms: 0,
                success_rate: 0.0,
                error: None,
                target_results: Vec::new(),
            })
            .collect()
    };

    // Step 4: output files.
    if !tested.is_empty() {
        files::write_config_files(&args.config_output, &tested)?;
    }

    let elapsed = started.elapsed();
    let stats = checker.stats_snapshot();
    info!(
        elapsed_s = elapsed.as_secs(),
        active = stats.total_active,
        configs = tested.len(),
        "finished"
    );
    write_run_summary(&stats, tested.len(), elapsed);

    if args.enable_self_healing {
        self_healing_check(&stats, &tested);
    }

    Ok(())
}

fn log_sweep_stats(stats: &StatsSnapshot) {
    info!(
        tested = stats.total_tested,
        active = stats.total_active,
        failed = stats.total_failed,
        iran_optimized = stats.iran_optimized,
        dpi_evaded = stats.dpi_evaded,
        multi_endpoint = stats.multi_endpoint_ok,
        elapsed_s = stats.elapsed.as_secs(),
        "sweep complete"
    );
}

fn write_run_summary(stats: &StatsSnapshot, configs: usize, elapsed: std::time::Duration) {
    let summary = format!(
        "Run summary - {}\nVersion: {}\nTotal time: {:?}\nTested: {}\nActive: {}\nFailed: {}\nIran-optimized: {}\nDPI evaded: {}\nConfigs written: {}\n",
        chrono::Utc::now().to_rfc3339(),
        simurgh::VERSION,
        elapsed,
        stats.total_tested,
        stats.total_active,
        stats.total_failed,
        stats.iran_optimized,
        stats.dpi_evaded,
        configs,
    );
    if std::fs::create_dir_all("results").is_ok() {
        if let Err(e) = std::fs::write("results/run-summary.txt", summary) {
            warn!(error = %e, "failed to write run summary");
        }
    }
}

/// Advisory pass over the run's health; logs recommendations only.
fn self_healing_check(stats: &StatsSnapshot, tested: &[TestedConfig]) {
    if stats.total_tested == 0 {
        return;
    }

    let success_rate = stats.total_active as f64 / stats.total_tested as f64 * 100.0;
    if success_rate < 60.0 {
        warn!(
            success_rate = format!("{success_rate:.1}%"),
            "degraded sweep; consider a longer timeout, lower concurrency, or a fresher candidate list"
        );
    } else if success_rate < 80.0 {
        warn!(
            success_rate = format!("{success_rate:.1}%"),
            "moderate sweep; aggressive DPI evasion may help"
        );
    } else {
        info!(success_rate = format!("{success_rate:.1}%"), "sweep healthy");
    }

    if !tested.is_empty() {
        let iran = tested.iter().filter(|t| t.config.iran_optimized).count();
        let ratio = iran as f64 / tested.len() as f64 * 100.0;
        if ratio < 50.0 {
            warn!(
                iran_ratio = format!("{ratio:.1}%"),
                "few Iran-optimized configs; enable iran-mode with aggressive evasion"
            );
        } else {
            info!(iran_ratio = format!("{ratio:.1}%"), "config quality good");
        }
    }
}
