use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    assembly::AssemblyTree,
    catalog::PartCatalog,
    config::{ScenarioConfig, SweepConfig},
    helper::{random_seed, trace, SimulationTelemetry},
    optimizer::{AllocationOptimizer, OptimizationResult, DEFAULT_MAX_ROUNDS},
    plan::AllocationPlan,
    simulator::{MissionProfile, SimulationOutcome, Simulator},
};

/// One budget of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepPoint {
    /// Spares budget.
    pub budget: f64,
    /// Best serviceability found.
    pub serviceability: f64,
    /// Plan achieving it.
    pub plan: AllocationPlan,
    /// Unspent budget.
    pub remaining_budget: f64,
}

impl From<OptimizationResult> for SweepPoint {
    fn from(result: OptimizationResult) -> Self {
        Self {
            budget: result.budget,
            serviceability: result.serviceability,
            plan: result.plan,
            remaining_budget: result.remaining_budget,
        }
    }
}

/// Spares engine: owns the catalog and the shared assembly tree and runs
/// simulations, optimizations and budget sweeps over them.
#[derive(Debug)]
pub struct SparesEngine {
    catalog: PartCatalog,
    tree: Arc<AssemblyTree>,
    simulator: Simulator,
    seed: u64,
    max_rounds: u32,
    run_id: Uuid,
    telemetry: Option<SimulationTelemetry>,
}

impl SparesEngine {
    /// Returns a builder over an already loaded catalog and tree.
    #[must_use]
    pub fn builder(catalog: PartCatalog, tree: AssemblyTree) -> SparesEngineBuilder {
        SparesEngineBuilder::new(catalog, tree)
    }

    /// Loads both tables named by a scenario and applies its settings.
    pub fn from_config(
        config: &ScenarioConfig,
        telemetry: Option<SimulationTelemetry>,
    ) -> Result<Self> {
        let catalog = PartCatalog::load_csv(&config.catalog)?;
        trace(
            telemetry.as_ref(),
            LogLevel::Info,
            "catalog.loaded",
            json!({ "path": config.catalog.display().to_string(), "part_types": catalog.len() }),
        );
        let tree = AssemblyTree::load_csv(&config.assembly)?;
        trace(
            telemetry.as_ref(),
            LogLevel::Info,
            "assembly.loaded",
            json!({ "path": config.assembly.display().to_string(), "nodes": tree.len() }),
        );
        trace(
            telemetry.as_ref(),
            LogLevel::Debug,
            "assembly.tree",
            json!({ "render": tree.render() }),
        );

        let mut builder = Self::builder(catalog, tree)
            .profile(config.mission.into())
            .max_rounds(config.optimizer.max_rounds);
        if let Some(seed) = config.optimizer.seed {
            builder = builder.seed(seed);
        }
        if let Some(telemetry) = telemetry {
            builder = builder.telemetry(telemetry);
        }
        builder.build()
    }

    fn optimizer(&self) -> AllocationOptimizer<'_> {
        AllocationOptimizer::new(
            &self.catalog,
            Arc::clone(&self.tree),
            self.simulator.clone(),
            self.seed,
            self.telemetry.as_ref().map(|tel| tel.scoped("optimizer")),
        )
        .max_rounds(self.max_rounds)
    }

    /// As-built set plus the weighted initial fill for `budget`, with the unspent remainder.
    pub fn initial_plan(&self, budget: f64) -> Result<(AllocationPlan, f64)> {
        Ok(self.optimizer().initial_plan(budget)?)
    }

    /// Simulates a plan on the engine seed.
    pub fn simulate(&self, plan: &AllocationPlan) -> Result<SimulationOutcome> {
        let outcome = self
            .simulator
            .simulate_plan(&self.catalog, &self.tree, plan, self.seed)
            .with_context(|| format!("simulating plan for run {}", self.run_id))?;
        trace(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "engine.simulated",
            json!({ "seed": self.seed, "serviceability": outcome.serviceability }),
        );
        Ok(outcome)
    }

    /// Best plan for one budget.
    pub fn optimize(&self, budget: f64) -> Result<OptimizationResult> {
        if !(budget >= 0.0 && budget.is_finite()) {
            bail!("budget must be a finite non-negative amount, got {budget}");
        }
        self.optimizer()
            .optimize(budget)
            .with_context(|| format!("optimizing budget {budget} for run {}", self.run_id))
    }

    /// Optimizes every budget in `start, start + step, ..` below `end`.
    pub fn sweep(&self, start: f64, end: f64, step: f64) -> Result<Vec<SweepPoint>> {
        if !(step > 0.0 && step.is_finite()) {
            bail!("sweep step must be positive, got {step}");
        }
        if start.partial_cmp(&end) != Some(std::cmp::Ordering::Less) {
            bail!("sweep start {start} must be below end {end}");
        }
        let budgets = SweepConfig { start, end, step }.budgets();
        let mut points = Vec::with_capacity(budgets.len());
        for budget in budgets {
            let point = SweepPoint::from(self.optimize(budget)?);
            trace(
                self.telemetry.as_ref(),
                LogLevel::Warn,
                "sweep.point",
                json!({
                    "budget": point.budget,
                    "serviceability": point.serviceability,
                }),
            );
            points.push(point);
        }
        Ok(points)
    }

    /// Part catalog.
    #[must_use]
    pub const fn catalog(&self) -> &PartCatalog {
        &self.catalog
    }

    /// Shared assembly tree.
    #[must_use]
    pub const fn tree(&self) -> &Arc<AssemblyTree> {
        &self.tree
    }

    /// Mission profile.
    #[must_use]
    pub const fn profile(&self) -> MissionProfile {
        self.simulator.profile()
    }

    /// Seed shared by every simulation of this engine.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Run identifier stamped on log records.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns telemetry handle.
    #[must_use]
    pub const fn telemetry(&self) -> Option<&SimulationTelemetry> {
        self.telemetry.as_ref()
    }
}

/// Builder for `SparesEngine`.
pub struct SparesEngineBuilder {
    catalog: PartCatalog,
    tree: AssemblyTree,
    telemetry: Option<SimulationTelemetry>,
    seed: Option<u64>,
    max_rounds: u32,
    profile: MissionProfile,
}

impl SparesEngineBuilder {
    /// Creates a builder with the default mission profile.
    #[must_use]
    pub fn new(catalog: PartCatalog, tree: AssemblyTree) -> Self {
        Self {
            catalog,
            tree,
            telemetry: None,
            seed: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            profile: MissionProfile::default(),
        }
    }

    /// Sets telemetry.
    #[must_use]
    pub fn telemetry(mut self, telemetry: SimulationTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Fixes the simulation seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Caps rebalance rounds.
    #[must_use]
    pub const fn max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Sets the mission profile.
    #[must_use]
    pub const fn profile(mut self, profile: MissionProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Builds the engine after checking the tree against the catalog.
    pub fn build(self) -> Result<SparesEngine> {
        self.profile.validate()?;
        for part_type in self.tree.part_quantities().keys() {
            self.catalog
                .require(part_type)
                .context("assembly references a part type missing from the catalog")?;
        }
        let seed = self.seed.unwrap_or_else(random_seed);
        let run_id = self
            .telemetry
            .as_ref()
            .map_or_else(Uuid::new_v4, SimulationTelemetry::run_id);
        trace(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "engine.ready",
            json!({
                "seed": seed,
                "days": self.profile.days,
                "hours_per_day": self.profile.hours_per_day,
                "fleet_size": self.profile.fleet_size,
            }),
        );
        Ok(SparesEngine {
            catalog: self.catalog,
            tree: Arc::new(self.tree),
            simulator: Simulator::new(
                self.profile,
                self.telemetry.as_ref().map(|tel| tel.scoped("simulator")),
            ),
            seed,
            max_rounds: self.max_rounds,
            run_id,
            telemetry: self.telemetry,
        })
    }
}
