use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::simulator::MissionProfile;

/// Scenario document: input tables, mission shape and optimizer settings.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Part catalog CSV, resolved against the scenario file.
    pub catalog: PathBuf,
    /// Assembly CSV, resolved against the scenario file.
    pub assembly: PathBuf,
    /// Mission shape.
    pub mission: MissionConfig,
    /// Optimizer settings.
    pub optimizer: OptimizerConfig,
    /// Optional budget sweep.
    pub sweep: Option<SweepConfig>,
    source_dir: PathBuf,
}

impl ScenarioConfig {
    /// Loads and validates a TOML scenario.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        let source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(&raw, source_dir).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses scenario text; relative paths resolve against `source_dir`.
    pub fn parse(raw: &str, source_dir: impl Into<PathBuf>) -> Result<Self> {
        let document: ScenarioSerde = toml::from_str(raw)?;
        let source_dir = source_dir.into();
        let config = Self {
            catalog: resolve(&source_dir, &document.catalog),
            assembly: resolve(&source_dir, &document.assembly),
            mission: document.mission,
            optimizer: document.optimizer,
            sweep: document.sweep,
            source_dir,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.mission.days == 0 {
            bail!("mission.days must be positive");
        }
        if self.mission.hours_per_day == 0 {
            bail!("mission.hours_per_day must be positive");
        }
        if self.mission.fleet_size == 0 {
            bail!("mission.fleet_size must be positive");
        }
        if !(self.optimizer.budget >= 0.0 && self.optimizer.budget.is_finite()) {
            bail!("optimizer.budget must be a finite non-negative amount");
        }
        if let Some(sweep) = &self.sweep {
            if !(sweep.step > 0.0 && sweep.step.is_finite()) {
                bail!("sweep.step must be positive");
            }
            if sweep.start.partial_cmp(&sweep.end) != Some(std::cmp::Ordering::Less) {
                bail!("sweep.start must be below sweep.end");
            }
            if sweep.start < 0.0 {
                bail!("sweep.start must be non-negative");
            }
        }
        Ok(())
    }

    /// Directory the scenario was loaded from.
    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Resolves a path relative to the scenario file.
    #[must_use]
    pub fn resolve_path(&self, candidate: impl AsRef<Path>) -> PathBuf {
        resolve(&self.source_dir, candidate.as_ref())
    }
}

fn resolve(base: &Path, candidate: &Path) -> PathBuf {
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ScenarioSerde {
    catalog: PathBuf,
    assembly: PathBuf,
    #[serde(default)]
    mission: MissionConfig,
    #[serde(default)]
    optimizer: OptimizerConfig,
    #[serde(default)]
    sweep: Option<SweepConfig>,
}

/// `[mission]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MissionConfig {
    /// Simulated days.
    #[serde(default = "default_days")]
    pub days: u32,
    /// Operating hours per day.
    #[serde(default = "default_hours_per_day")]
    pub hours_per_day: u32,
    /// Vehicles in the fleet.
    #[serde(default = "default_fleet_size")]
    pub fleet_size: u32,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            days: default_days(),
            hours_per_day: default_hours_per_day(),
            fleet_size: default_fleet_size(),
        }
    }
}

impl From<MissionConfig> for MissionProfile {
    fn from(config: MissionConfig) -> Self {
        Self {
            days: config.days,
            hours_per_day: config.hours_per_day,
            fleet_size: config.fleet_size,
        }
    }
}

/// `[optimizer]` section.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct OptimizerConfig {
    /// Spares budget for a single optimization.
    #[serde(default = "default_budget")]
    pub budget: f64,
    /// Cap on rebalance rounds.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Fixed simulation seed; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            max_rounds: default_max_rounds(),
            seed: None,
        }
    }
}

/// `[sweep]` section: budgets `start, start + step, ..` below `end`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SweepConfig {
    /// First budget.
    pub start: f64,
    /// Exclusive upper bound.
    pub end: f64,
    /// Increment.
    pub step: f64,
}

impl SweepConfig {
    /// Budget points of the sweep.
    #[must_use]
    pub fn budgets(&self) -> Vec<f64> {
        let mut points = Vec::new();
        if self.step <= 0.0 || self.step.is_nan() {
            return points;
        }
        let mut index = 0_u32;
        loop {
            let budget = self.step.mul_add(f64::from(index), self.start);
            if budget >= self.end || budget.is_nan() {
                break;
            }
            points.push(budget);
            index += 1;
        }
        points
    }
}

const fn default_days() -> u32 {
    1000
}

const fn default_hours_per_day() -> u32 {
    5
}

const fn default_fleet_size() -> u32 {
    5
}

const fn default_budget() -> f64 {
    1000.0
}

const fn default_max_rounds() -> u32 {
    crate::optimizer::DEFAULT_MAX_ROUNDS
}
