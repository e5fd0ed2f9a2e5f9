//! # Tally Search
//!
//! Generates a mock dataset, counts a target value across it with a party of
//! worker threads, and prints the aggregated total.
//!
//! ## Usage
//!
//! ```bash
//! tally_search --config crates/tally/config/tally.toml --participants 8
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use tally::{
    event_channel, Dataset, RunEvent, RunStatus, SearchPlan, SearchRun, TallyConfig, TallyError,
};

fn print_help() {
    println!("Usage: tally_search [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>         TOML config file");
    println!("  -r, --rows <NUM>            Dataset rows (default: 10000)");
    println!("  -n, --columns <NUM>         Numbers per row (default: 1000)");
    println!("  -t, --target <VALUE>        Value to count (default: 5)");
    println!("  -p, --participants <NUM>    Worker threads (default: 5)");
    println!("  -s, --seed <SEED>           Dataset RNG seed");
    println!("      --timeout-ms <MS>       Bounded barrier wait");
    println!("  -h, --help                  Show this help");
}

fn flag_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> Result<T, TallyError> {
    args.get(i + 1)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| TallyError::InvalidConfig(format!("{flag} needs a valid value")))
}

/// Returns `None` when only help was requested.
fn parse_args(args: &[String]) -> Result<Option<TallyConfig>, TallyError> {
    let mut config = match args.iter().position(|a| a == "--config" || a == "-c") {
        Some(i) => {
            let path: String = flag_value(args, i, "--config")?;
            TallyConfig::load(path)?
        }
        None => TallyConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => i += 1,
            "--rows" | "-r" => {
                config.dataset.rows = flag_value(args, i, "--rows")?;
                i += 1;
            }
            "--columns" | "-n" => {
                config.dataset.columns = flag_value(args, i, "--columns")?;
                i += 1;
            }
            "--target" | "-t" => {
                config.search.target = flag_value(args, i, "--target")?;
                i += 1;
            }
            "--participants" | "-p" => {
                config.search.participants = flag_value(args, i, "--participants")?;
                i += 1;
            }
            "--seed" | "-s" => {
                config.dataset.seed = flag_value(args, i, "--seed")?;
                i += 1;
            }
            "--timeout-ms" => {
                config.search.wait_timeout_ms = Some(flag_value(args, i, "--timeout-ms")?);
                i += 1;
            }
            "--help" | "-h" => return Ok(None),
            other => {
                return Err(TallyError::InvalidConfig(format!("unknown argument: {other}")));
            }
        }
        i += 1;
    }

    config.validate()?;
    Ok(Some(config))
}

fn report_event(event: &RunEvent) {
    match event {
        RunEvent::WorkerStarted { worker, range } => {
            println!("Worker {worker}: processing rows {range}");
        }
        RunEvent::RowsProcessed { worker, rows } => {
            println!("Worker {worker}: {rows} rows processed");
        }
        RunEvent::WorkerReleased { worker, ordinal } => {
            println!("Worker {worker}: OK (arrived #{ordinal})");
        }
        RunEvent::WorkerBroken { worker, reason } => {
            println!("Worker {worker}: BROKEN ({reason})");
        }
        RunEvent::Aggregated { total, .. } => {
            println!("Aggregator: total result {total}");
        }
        RunEvent::BarrierBroken { cause } => {
            println!("Barrier broken: {cause}");
        }
    }
}

fn run(config: &TallyConfig) -> Result<RunStatus, TallyError> {
    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Dataset:            {} x {}", config.dataset.rows, config.dataset.columns);
    println!("│ Target:             {}", config.search.target);
    println!("│ Participants:       {}", config.search.participants);
    match config.search.wait_timeout_ms {
        Some(ms) => println!("│ Barrier timeout:    {ms} ms"),
        None => println!("│ Barrier timeout:    none"),
    }
    println!("└─────────────────────────────────────────────────────────────────┘");
    println!();

    let dataset = Arc::new(Dataset::generate(&config.dataset)?);
    println!(
        "Mock: there are {} occurrences of {} in the generated data",
        dataset.count_value(config.search.target),
        config.search.target
    );

    let plan = SearchPlan::from_config(&config.search)?;
    let (events, rx) = event_channel();
    let search = SearchRun::launch(dataset, &plan, events)?;
    println!("Main: launched {} workers", search.workers());

    let report = search.join()?;
    for event in rx.try_iter() {
        report_event(&event);
    }
    Ok(report.status)
}

fn main() -> ExitCode {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         TALLY SEARCH                                             ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_args(&args) {
        Ok(Some(config)) => config,
        Ok(None) => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(RunStatus::Completed { total, .. }) => {
            println!();
            println!("All workers finished and aggregation ran: total {total}");
            ExitCode::SUCCESS
        }
        Ok(RunStatus::BrokenBeforeTrip { cause }) => {
            eprintln!();
            eprintln!("Barrier broke before the trip: {cause}");
            ExitCode::FAILURE
        }
        Ok(RunStatus::TripFailed { cause }) => {
            eprintln!();
            eprintln!("All workers arrived but aggregation failed: {cause}");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
