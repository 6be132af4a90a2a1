//! MTB Differential-Testing CLI
//!
//! Run seeded oracle-vs-real sessions, replay exported call logs, and print
//! the demo system's metadata.

use clap::{Parser, Subcommand};
use mtb_sim::{replay_calls, run_seeded, DriverConfig, LogExport, RunReport, Thermostat, MAX_PIN_TRIES};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// MTB differential-testing CLI
#[derive(Parser, Debug)]
#[command(name = "mtb-sim")]
#[command(about = "Drive an ATM oracle and implementation in lock-step", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run seeded differential sessions
    Run {
        /// Master seed (0 = random from time)
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Number of consecutive seeds to run (for CI mode)
        #[arg(long, default_value = "1")]
        seeds: usize,

        /// Intents drawn per session
        #[arg(long, default_value = "200")]
        steps: usize,

        /// Wrong PIN limit of the implementation under test
        #[arg(long, default_value_t = MAX_PIN_TRIES)]
        pin_limit: u32,

        /// JSON output for CI parsing
        #[arg(long)]
        json: bool,

        /// Export the first failing (or last) session's call log
        #[arg(long)]
        export: Option<String>,
    },

    /// Replay an exported call log against fresh implementations
    Replay {
        /// Export written by `run --export`
        path: String,

        /// Override the recorded wrong PIN limit
        #[arg(long)]
        pin_limit: Option<u32>,
    },

    /// Print the thermostat demo system
    Describe {
        /// Temperature reported before describing
        #[arg(long, default_value = "18.5")]
        reading: f64,

        /// JSON output
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let code = match cli.command {
        Command::Run {
            seed,
            seeds,
            steps,
            pin_limit,
            json,
            export,
        } => run(seed, seeds, steps, pin_limit, json, export.as_deref()),
        Command::Replay { path, pin_limit } => replay(&path, pin_limit),
        Command::Describe { reading, json } => describe(reading, json),
    };

    std::process::exit(code);
}

fn run(seed: u64, seeds: usize, steps: usize, pin_limit: u32, json: bool, export: Option<&str>) -> i32 {
    let base_seed = if seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        seed
    };

    if !json {
        info!("MTB differential driver v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let mut reports: Vec<RunReport> = Vec::new();
    for offset in 0..seeds {
        let config = DriverConfig::default()
            .with_seed(base_seed.wrapping_add(offset as u64))
            .with_steps(steps)
            .with_pin_limit(pin_limit);

        match run_seeded(&config) {
            Ok(report) => {
                if !json && !report.passed {
                    error!(
                        "✗ seed={} FAILED after {} call(s): {}",
                        report.seed,
                        report.calls.len(),
                        report.failure.as_deref().unwrap_or("unknown")
                    );
                    for line in report.rendered_calls() {
                        error!("    {}", line);
                    }
                }
                reports.push(report);
            }
            Err(e) => {
                error!("seed={} could not start: {}", config.seed, e);
                return 2;
            }
        }
    }

    let failed: Vec<&RunReport> = reports.iter().filter(|r| !r.passed).collect();

    if let Some(path) = export {
        let chosen = failed.first().copied().or_else(|| reports.last());
        if let Some(report) = chosen {
            match LogExport::from_report(report, pin_limit).write_to_file(path) {
                Ok(()) => info!("Exported {} call(s) (seed={}) to {}", report.calls.len(), report.seed, path),
                Err(e) => error!("Failed to write export: {}", e),
            }
        }
    }

    if json {
        let summary = serde_json::json!({
            "total": reports.len(),
            "passed": reports.len() - failed.len(),
            "failed": failed.len(),
            "results": reports,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to render summary: {}", e),
        }
    } else if failed.is_empty() {
        info!("✅ All {} session(s) passed!", reports.len());
    } else {
        error!("❌ {}/{} session(s) failed!", failed.len(), reports.len());
        for report in &failed {
            error!("  - seed={}: {}", report.seed, report.failure.as_deref().unwrap_or("unknown"));
        }
    }

    if failed.is_empty() {
        0
    } else {
        1
    }
}

fn replay(path: &str, pin_limit: Option<u32>) -> i32 {
    let export = match LogExport::read_from_file(path) {
        Ok(export) => export,
        Err(e) => {
            error!("Failed to read {}: {}", path, e);
            return 2;
        }
    };

    let pin_limit = pin_limit.unwrap_or(export.pin_limit);
    info!("Replaying {} call(s) from seed={} (pin limit {})", export.calls.len(), export.seed, pin_limit);

    match replay_calls(&export.calls, pin_limit) {
        Ok(harness) => {
            info!("✓ Replay passed; oracle ended in {}", harness.oracle_state());
            0
        }
        Err(e) => {
            error!("✗ Replay failed: {}", e);
            1
        }
    }
}

fn describe(reading: f64, json: bool) -> i32 {
    let result = Thermostat::build(21.0).and_then(|t| {
        t.measure(reading)?;
        t.connect_display()?;
        t.system.describe()
    });

    let desc = match result {
        Ok(desc) => desc,
        Err(e) => {
            error!("Failed to build thermostat: {}", e);
            return 2;
        }
    };

    if json {
        match serde_json::to_string_pretty(&desc) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Failed to render description: {}", e);
                return 2;
            }
        }
        return 0;
    }

    println!("System {}", desc.name);
    for member in &desc.components {
        let c = &member.component;
        println!("  {} ({})", member.instance, c.name);
        for action in &c.actions {
            let params: Vec<String> = action
                .params
                .iter()
                .map(|p| format!("{}: {}", p.name, p.type_name))
                .collect();
            let marker = if action.connected { " [connected]" } else { "" };
            println!("    action {}({}){}", action.name, params.join(", "), marker);
        }
        for port in c.input_ports.iter().chain(c.output_ports.iter()) {
            println!(
                "    {:?} {}: {} <-> [{}]",
                port.direction,
                port.name,
                port.type_name,
                port.connections.join(", ")
            );
        }
        for var in &c.variables {
            println!("    {} = {}", var.name, var.value);
        }
    }
    0
}
