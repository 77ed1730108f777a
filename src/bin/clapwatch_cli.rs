use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clapwatch::config::AppConfig;
use clapwatch::engine::SentinelHandle;
use clapwatch::fixtures::{synthesize_claps, AmplitudeTrace, ExpectationDiff, FixtureCatalog, TraceReplay};
use clapwatch::notify::{LogNotifier, Snapshot, StaticSnapshot};
use futures::StreamExt;
use serde::Serialize;

/// 1x1 PNG attached to alerts sent from the CLI
const PLACEHOLDER_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

#[derive(Parser, Debug)]
#[command(
    name = "clapwatch_cli",
    about = "Deterministic trace harness for the clap watcher"
)]
struct Cli {
    /// Override directory containing trace assets (defaults to ./fixtures)
    #[arg(long)]
    fixtures_dir: Option<PathBuf>,
    /// Configuration JSON (defaults to built-in values)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a trace offline and optionally compare against expectations
    Replay {
        #[arg(long)]
        trace: String,
        #[arg(long)]
        expect: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Generate a synthetic clap trace
    Simulate {
        #[arg(long, default_value_t = 120)]
        bpm: u32,
        #[arg(long, default_value_t = 8)]
        claps: usize,
        #[arg(long, default_value_t = 0)]
        jitter_ms: u64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run the live stack in real time against a trace, printing telemetry
    Watch {
        #[arg(long)]
        trace: String,
        #[arg(long = "recipient")]
        recipients: Vec<String>,
    },
    /// Print the effective configuration
    DumpConfig,
    /// List available traces on disk
    DumpFixtures,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    clapwatch::init_logging();
    let cli = Cli::parse();
    let catalog = cli
        .fixtures_dir
        .map(FixtureCatalog::new)
        .unwrap_or_default();
    let config = cli
        .config
        .as_deref()
        .map(AppConfig::load_from_file)
        .unwrap_or_default();

    match cli.command {
        Commands::Replay {
            trace,
            expect,
            output,
        } => run_replay(&catalog, config, &trace, expect.as_deref(), output),
        Commands::Simulate {
            bpm,
            claps,
            jitter_ms,
            seed,
            output,
        } => run_simulate(bpm, claps, jitter_ms, seed, output),
        Commands::Watch { trace, recipients } => run_watch(&catalog, config, &trace, &recipients),
        Commands::DumpConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
        Commands::DumpFixtures => run_dump(&catalog),
    }
}

fn run_replay(
    catalog: &FixtureCatalog,
    config: AppConfig,
    trace: &str,
    override_expect: Option<&Path>,
    output_path: Option<PathBuf>,
) -> Result<ExitCode> {
    let loaded = catalog.load(trace, override_expect)?;
    let report = TraceReplay::new(config).run(&loaded);

    let payload = ReplayPayload {
        trace: &report.trace,
        sample_count: report.sample_count,
        duration_ms: report.duration_ms,
        clap_count: report.claps.len(),
        rhythmic_detected: report.rhythmic_detected,
        alarm_episodes: report.alarm_episodes,
        clap_times_ms: report.claps.iter().map(|clap| clap.timestamp_ms).collect(),
    };
    write_json(&payload, output_path)?;

    match loaded.expect {
        Some(expectations) => match expectations.verify(&report) {
            Ok(()) => Ok(ExitCode::from(0)),
            Err(diff) => {
                emit_diff(&diff)?;
                Ok(ExitCode::from(2))
            }
        },
        None => Ok(ExitCode::from(0)),
    }
}

fn run_simulate(
    bpm: u32,
    claps: usize,
    jitter_ms: u64,
    seed: u64,
    output_path: Option<PathBuf>,
) -> Result<ExitCode> {
    anyhow::ensure!(bpm > 0, "--bpm must be positive");
    let trace = synthesize_claps(bpm, claps, jitter_ms, seed);
    write_json(&trace, output_path)?;
    Ok(ExitCode::from(0))
}

fn run_watch(
    catalog: &FixtureCatalog,
    config: AppConfig,
    trace: &str,
    recipients: &[String],
) -> Result<ExitCode> {
    let loaded = catalog.load(trace, None)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(watch_trace(config, loaded, recipients))?;
    Ok(ExitCode::from(0))
}

async fn watch_trace(config: AppConfig, trace: AmplitudeTrace, recipients: &[String]) -> Result<()> {
    // Long enough for the last hold to expire and any delayed alert to fire
    let settle_ms = config.rhythm.flag_hold_ms + config.alarm.send_delay_ms + 500;
    let handle = Arc::new(SentinelHandle::new(
        config,
        Arc::new(LogNotifier),
        Arc::new(StaticSnapshot::new(Snapshot::new(PLACEHOLDER_PNG, "image/png"))),
    ));
    for recipient in recipients {
        handle
            .add_recipient(recipient)
            .with_context(|| format!("adding recipient {recipient}"))?;
    }

    let mut telemetry = Box::pin(handle.telemetry_stream());
    let printer = tokio::spawn(async move {
        while let Some(event) = telemetry.next().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => tracing::warn!("[clapwatch_cli] Unprintable event: {}", err),
            }
        }
    });

    let fear_handle = Arc::clone(&handle);
    let fear_marks = trace.fear.clone();
    let fear_task = tokio::spawn(async move {
        let start = tokio::time::Instant::now();
        for mark in fear_marks {
            tokio::time::sleep_until(start + Duration::from_millis(mark.timestamp_ms)).await;
            fear_handle.set_fear(mark.present);
        }
    });

    handle
        .start_audio(Box::new(trace.to_source()))
        .await
        .context("starting audio pipeline")?;

    let run_for = Duration::from_millis(trace.duration_ms() + settle_ms);
    tokio::select! {
        _ = tokio::time::sleep(run_for) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("[clapwatch_cli] Interrupted");
        }
    }

    fear_task.abort();
    handle.shutdown().await;
    // Let the printer drain what was already queued
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();

    eprintln!(
        "{}",
        serde_json::to_string_pretty(&handle.alarm_status())?
    );
    Ok(())
}

fn run_dump(catalog: &FixtureCatalog) -> Result<ExitCode> {
    let traces = catalog.discover()?;
    if traces.is_empty() {
        println!("No traces found under {}", catalog.root().display());
        return Ok(ExitCode::from(0));
    }

    for name in traces {
        println!("{name}");
    }
    Ok(ExitCode::from(0))
}

fn write_json<T: Serialize>(value: &T, output_path: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    if let Some(path) = output_path {
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }

    Ok(())
}

fn emit_diff(diff: &ExpectationDiff) -> Result<()> {
    let json = serde_json::to_string_pretty(&diff.to_json())?;
    eprintln!("{json}");
    Ok(())
}

#[derive(Serialize)]
struct ReplayPayload<'a> {
    trace: &'a str,
    sample_count: usize,
    duration_ms: u64,
    clap_count: usize,
    rhythmic_detected: bool,
    alarm_episodes: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    clap_times_ms: Vec<u64>,
}
