use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Local, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use shared_logging::LogLevel;
use spares_fleetsim::{
    AllocationPlan, OptimizationResult, ScenarioConfig, SimulationTelemetry, SparesEngine,
    SweepPoint,
};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "spares", version, about = "Fleet spares allocation simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Finds the best spares plan for one budget.
    Optimize {
        #[command(flatten)]
        common: CommonArgs,
        /// Overrides `optimizer.budget` from the scenario.
        #[arg(long)]
        budget: Option<f64>,
    },
    /// Optimizes every budget of the scenario's `[sweep]` section.
    Sweep {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Simulates a saved plan and reports serviceability.
    Simulate {
        #[command(flatten)]
        common: CommonArgs,
        /// Plan JSON as written by `optimize`.
        #[arg(long)]
        plan: PathBuf,
        /// Writes the named per-day series here.
        #[arg(long)]
        series_out: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// Scenario TOML.
    #[arg(long)]
    config: PathBuf,
    /// Also writes the result JSON here.
    #[arg(long)]
    out: Option<PathBuf>,
    /// JSON-lines log file; defaults to a dated file under `logs/`.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Persist debug records (per-day and per-part events).
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct Report<T> {
    report_id: String,
    generated_at: DateTime<Utc>,
    scenario: PathBuf,
    seed: u64,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Serialize)]
struct SweepBody {
    points: Vec<SweepPoint>,
}

#[derive(Debug, Serialize)]
struct SimulateBody {
    serviceability: f64,
    plan: AllocationPlan,
    spares_cost: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Optimize { common, budget } => handle_optimize(&common, budget),
        Commands::Sweep { common } => handle_sweep(&common),
        Commands::Simulate {
            common,
            plan,
            series_out,
        } => handle_simulate(&common, &plan, series_out.as_deref()),
    }
}

fn handle_optimize(args: &CommonArgs, budget: Option<f64>) -> Result<()> {
    let (config, engine) = open_engine(args)?;
    let budget = budget.unwrap_or(config.optimizer.budget);
    let result: OptimizationResult = engine.optimize(budget)?;
    emit(args, &engine, result)
}

fn handle_sweep(args: &CommonArgs) -> Result<()> {
    let (config, engine) = open_engine(args)?;
    let Some(sweep) = config.sweep else {
        bail!("{} has no [sweep] section", args.config.display());
    };
    let points = engine.sweep(sweep.start, sweep.end, sweep.step)?;
    emit(args, &engine, SweepBody { points })
}

fn handle_simulate(args: &CommonArgs, plan_path: &Path, series_out: Option<&Path>) -> Result<()> {
    let (_, engine) = open_engine(args)?;
    let plan = read_plan(plan_path)?;
    let outcome = engine.simulate(&plan)?;
    if let Some(path) = series_out {
        let series: Vec<Value> = outcome
            .named_series()
            .into_iter()
            .map(|(name, values)| json!({ "name": name, "values": values }))
            .collect();
        write_json(path, &series)?;
    }
    let spares_cost = plan.spares_cost(engine.catalog())?;
    emit(
        args,
        &engine,
        SimulateBody {
            serviceability: outcome.serviceability,
            plan,
            spares_cost,
        },
    )
}

fn open_engine(args: &CommonArgs) -> Result<(ScenarioConfig, SparesEngine)> {
    anyhow::ensure!(args.config.exists(), "config file {} not found", args.config.display());
    let config = ScenarioConfig::load(&args.config)?;
    let log_path = match &args.log_file {
        Some(path) => path.clone(),
        None => compute_log_path(Path::new("logs"))?,
    };
    let file_level = if args.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let telemetry = SimulationTelemetry::builder("spares")
        .log_path(log_path)
        .file_level(file_level)
        .console_level(Some(LogLevel::Warn))
        .build()?;
    let engine = SparesEngine::from_config(&config, Some(telemetry))?;
    Ok((config, engine))
}

/// Accepts either a bare plan or any report carrying a `plan` field.
fn read_plan(path: &Path) -> Result<AllocationPlan> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading plan {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    let plan = match value.get("plan") {
        Some(inner) => inner.clone(),
        None => value,
    };
    serde_json::from_value(plan).with_context(|| format!("decoding plan in {}", path.display()))
}

fn emit<T: Serialize>(args: &CommonArgs, engine: &SparesEngine, body: T) -> Result<()> {
    let report = Report {
        report_id: format!("run-{}", Uuid::new_v4()),
        generated_at: Utc::now(),
        scenario: args.config.clone(),
        seed: engine.seed(),
        body,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(path) = &args.out {
        write_json(path, &report)?;
    }
    if let Some(telemetry) = engine.telemetry() {
        let _ = telemetry.log(
            LogLevel::Info,
            "cli.report.written",
            json!({ "report_id": report.report_id, "run_id": engine.run_id(), "out": args.out }),
        );
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("writing {}", path.display()))
}

fn compute_log_path(base: &Path) -> Result<PathBuf> {
    let now = Local::now();
    let dir = base
        .join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()));
    fs::create_dir_all(&dir)?;
    Ok(dir.join(format!(
        "spares-{}.log.jsonl",
        Utc::now().format("%Y%m%d-%H%M%S")
    )))
}
