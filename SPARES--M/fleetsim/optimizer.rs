use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    assembly::AssemblyTree,
    catalog::{PartBlueprint, PartCatalog},
    error::FleetResult,
    helper::{trace, SimulationTelemetry},
    plan::AllocationPlan,
    reliability::weibull_mean,
    simulator::{SimulationOutcome, Simulator},
};

/// Default cap on rebalance rounds.
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// One rebalance attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    /// 1-based round number.
    pub round: u32,
    /// Type that received stock.
    pub increased: String,
    /// Type that gave up stock.
    pub decreased: String,
    /// Units taken from `decreased`.
    pub removed: u32,
    /// Units bought for `increased`.
    pub added: u32,
    /// Serviceability of the candidate plan.
    pub serviceability: f64,
    /// Whether the candidate became the new best.
    pub accepted: bool,
}

/// Best plan found for one budget.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    /// Identifier of this optimization within the run.
    pub optimization_id: Uuid,
    /// Spares budget.
    pub budget: f64,
    /// Serviceability of `plan`.
    pub serviceability: f64,
    /// Serviceability of the initial fill.
    pub initial_serviceability: f64,
    /// Best plan.
    pub plan: AllocationPlan,
    /// Budget left unspent by `plan`.
    pub remaining_budget: f64,
    /// Rebalance attempts made.
    pub rounds: u32,
    /// Attempt log.
    pub history: Vec<RoundRecord>,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
    /// Simulation of `plan`.
    #[serde(skip_serializing)]
    pub outcome: SimulationOutcome,
}

#[derive(Debug, Clone)]
struct Candidate {
    plan: AllocationPlan,
    remaining: f64,
    increased: String,
    decreased: String,
    removed: u32,
    added: u32,
}

/// Greedy initial fill plus hill-climbing rebalance under a spares budget.
#[derive(Debug, Clone)]
pub struct AllocationOptimizer<'a> {
    catalog: &'a PartCatalog,
    tree: Arc<AssemblyTree>,
    simulator: Simulator,
    max_rounds: u32,
    seed: u64,
    telemetry: Option<SimulationTelemetry>,
}

impl<'a> AllocationOptimizer<'a> {
    /// Creates an optimizer. Every simulation it runs uses `seed`.
    #[must_use]
    pub fn new(
        catalog: &'a PartCatalog,
        tree: Arc<AssemblyTree>,
        simulator: Simulator,
        seed: u64,
        telemetry: Option<SimulationTelemetry>,
    ) -> Self {
        Self {
            catalog,
            tree,
            simulator,
            max_rounds: DEFAULT_MAX_ROUNDS,
            seed,
            telemetry,
        }
    }

    /// Caps the number of rebalance rounds.
    #[must_use]
    pub const fn max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    fn fleet_size(&self) -> u32 {
        self.simulator.profile().fleet_size
    }

    /// Part types the tree needs, in catalog order, with units per vehicle.
    fn required(&self) -> FleetResult<Vec<(Arc<PartBlueprint>, u32)>> {
        let per_vehicle = self.tree.part_quantities();
        for part_type in per_vehicle.keys() {
            self.catalog.require(part_type)?;
        }
        Ok(self
            .catalog
            .iter()
            .filter_map(|bp| per_vehicle.get(&bp.name).map(|units| (Arc::clone(bp), *units)))
            .collect())
    }

    /// Relative purchase weights from the zero-stockout estimate
    /// `units × fleet / MTBF × TAT`, normalised to the smallest non-zero estimate.
    pub fn purchase_weights(&self) -> FleetResult<IndexMap<String, u32>> {
        let fleet = f64::from(self.fleet_size());
        let mut estimates = IndexMap::new();
        for (bp, units) in self.required()? {
            let mtbf = weibull_mean(bp.shape_factor, bp.failure_hours)?;
            let estimate = f64::from(units) * fleet / mtbf * f64::from(bp.depot_tat);
            if estimate.is_finite() && estimate > 0.0 {
                estimates.insert(bp.name.clone(), estimate);
            }
        }
        let lowest = estimates.values().copied().fold(f64::INFINITY, f64::min);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let weights = estimates
            .into_iter()
            .map(|(name, estimate)| (name, (estimate / lowest).ceil().min(f64::from(u32::MAX)) as u32))
            .collect();
        Ok(weights)
    }

    /// As-built set per vehicle, then weighted sweeps in catalog order until
    /// the next block would overdraw the budget. Returns the plan and the unspent budget.
    pub fn initial_plan(&self, budget: f64) -> FleetResult<(AllocationPlan, f64)> {
        let required = self.required()?;
        let per_vehicle: IndexMap<String, u32> = required
            .iter()
            .map(|(bp, units)| (bp.name.clone(), *units))
            .collect();
        let mut plan = AllocationPlan::as_built(&per_vehicle, self.fleet_size());
        let mut remaining = budget;

        let weights = self.purchase_weights()?;
        let blocks: Vec<(String, u32, f64)> = required
            .iter()
            .filter_map(|(bp, _)| weights.get(&bp.name).map(|w| (bp.name.clone(), *w, bp.cost)))
            .collect();
        let sweep_cost: f64 = blocks.iter().map(|(_, w, cost)| f64::from(*w) * cost).sum();
        if sweep_cost <= 0.0 {
            trace(
                self.telemetry.as_ref(),
                LogLevel::Warn,
                "optimizer.initial_plan.unpriced",
                json!({ "weighted_types": blocks.len() }),
            );
            return Ok((plan, remaining));
        }

        'fill: while remaining > 0.0 {
            for (name, weight, cost) in &blocks {
                plan.add(name, *weight);
                remaining -= cost * f64::from(*weight);
                if remaining < 0.0 {
                    plan.remove(name, *weight);
                    remaining += cost * f64::from(*weight);
                    break 'fill;
                }
            }
        }
        trace(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "optimizer.initial_plan",
            json!({ "budget": budget, "remaining": remaining, "weights": weights }),
        );
        Ok((plan, remaining))
    }

    /// Worst observed slack per type, in vehicles' worth:
    /// `min_day(in_service + in_warehouse − units × fleet) / units`.
    /// Types with zero turnaround are not scored.
    pub fn performance_scores(&self, outcome: &SimulationOutcome) -> FleetResult<IndexMap<String, f64>> {
        let fleet = i64::from(self.fleet_size());
        let mut scores = IndexMap::new();
        for (bp, units) in self.required()? {
            if bp.depot_tat == 0 {
                continue;
            }
            let Some(series) = outcome.series.get(&bp.name) else {
                continue;
            };
            let needed = i64::from(units) * fleet;
            let worst = series
                .in_service
                .iter()
                .zip(&series.in_warehouse)
                .map(|(used, shelf)| i64::from(*used) + i64::from(*shelf) - needed)
                .min();
            if let Some(worst) = worst {
                #[allow(clippy::cast_precision_loss)]
                scores.insert(bp.name.clone(), worst as f64 / f64::from(units));
            }
        }
        Ok(scores)
    }

    /// Moves stock from the best-scoring type to the worst-scoring one, then
    /// spends what is left on the cheapest types. `None` means no move is possible.
    fn rebalance(
        &self,
        plan: &AllocationPlan,
        remaining: f64,
        outcome: &SimulationOutcome,
    ) -> FleetResult<Option<Candidate>> {
        let scores = self.performance_scores(outcome)?;
        let mut worst: Option<(&String, f64)> = None;
        let mut best: Option<(&String, f64)> = None;
        for (name, score) in &scores {
            if worst.map_or(true, |(_, w)| *score < w) {
                worst = Some((name, *score));
            }
            if best.map_or(true, |(_, b)| *score > b) {
                best = Some((name, *score));
            }
        }
        let (Some((worst, _)), Some((best, _))) = (worst, best) else {
            return Ok(None);
        };
        if worst == best {
            return Ok(None);
        }
        let worst_bp = self.catalog.require(worst)?;
        let best_bp = self.catalog.require(best)?;
        if worst_bp.cost <= 0.0 || best_bp.cost <= 0.0 {
            return Ok(None);
        }

        let swap_cost = best_bp.cost.max(worst_bp.cost);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let removed = (swap_cost / best_bp.cost).ceil() as u32;
        let mut next = plan.clone();
        if next.remove(best, removed).is_none() {
            return Ok(None);
        }
        let mut remaining = remaining + f64::from(removed) * best_bp.cost;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let added = (swap_cost / worst_bp.cost).floor() as u32;
        next.add(worst, added);
        remaining -= f64::from(added) * worst_bp.cost;

        remaining = self.spend_leftover(&mut next, remaining)?;
        Ok(Some(Candidate {
            plan: next,
            remaining,
            increased: worst.clone(),
            decreased: best.clone(),
            removed,
            added,
        }))
    }

    /// Whole units of the cheapest priced types first, until the cheapest is unaffordable.
    fn spend_leftover(&self, plan: &mut AllocationPlan, mut remaining: f64) -> FleetResult<f64> {
        let mut priced: Vec<Arc<PartBlueprint>> = self
            .required()?
            .into_iter()
            .map(|(bp, _)| bp)
            .filter(|bp| bp.cost > 0.0)
            .collect();
        priced.sort_by(|a, b| a.cost.total_cmp(&b.cost));
        let Some(cheapest) = priced.first().map(|bp| bp.cost) else {
            return Ok(remaining);
        };
        for bp in &priced {
            if remaining < cheapest {
                break;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let units = (remaining / bp.cost).floor() as u32;
            if units > 0 {
                plan.add(&bp.name, units);
                remaining -= f64::from(units) * bp.cost;
            }
        }
        Ok(remaining)
    }

    /// Simulates a plan on the optimizer's seed.
    pub fn evaluate(&self, plan: &AllocationPlan) -> FleetResult<SimulationOutcome> {
        self.simulator
            .simulate_plan(self.catalog, &self.tree, plan, self.seed)
    }

    /// Initial fill followed by up to `max_rounds` rebalances. A candidate is kept only
    /// when it strictly beats the best serviceability so far; otherwise the search stops.
    pub fn optimize(&self, budget: f64) -> FleetResult<OptimizationResult> {
        let optimization_id = Uuid::new_v4();
        trace(
            self.telemetry.as_ref(),
            LogLevel::Warn,
            "optimizer.start",
            json!({ "optimization_id": optimization_id, "budget": budget }),
        );
        let (mut best_plan, mut best_remaining) = self.initial_plan(budget)?;
        let mut best = self.evaluate(&best_plan)?;
        let initial_serviceability = best.serviceability;
        trace(
            self.telemetry.as_ref(),
            LogLevel::Warn,
            "optimizer.initial_serviceability",
            json!({ "optimization_id": optimization_id, "serviceability": initial_serviceability }),
        );

        let mut history = Vec::new();
        let mut rounds = 0;
        for round in 1..=self.max_rounds {
            let Some(candidate) = self.rebalance(&best_plan, best_remaining, &best)? else {
                trace(
                    self.telemetry.as_ref(),
                    LogLevel::Info,
                    "optimizer.rebalance.aborted",
                    json!({ "optimization_id": optimization_id, "round": round }),
                );
                break;
            };
            rounds = round;
            trace(
                self.telemetry.as_ref(),
                LogLevel::Info,
                "optimizer.rebalance",
                json!({
                    "optimization_id": optimization_id,
                    "round": round,
                    "increase": candidate.increased,
                    "decrease": candidate.decreased,
                    "removed": candidate.removed,
                    "added": candidate.added,
                    "remaining": candidate.remaining,
                }),
            );
            let outcome = self.evaluate(&candidate.plan)?;
            let accepted = outcome.serviceability > best.serviceability;
            history.push(RoundRecord {
                round,
                increased: candidate.increased,
                decreased: candidate.decreased,
                removed: candidate.removed,
                added: candidate.added,
                serviceability: outcome.serviceability,
                accepted,
            });
            if !accepted {
                trace(
                    self.telemetry.as_ref(),
                    LogLevel::Info,
                    "optimizer.converged",
                    json!({ "optimization_id": optimization_id, "round": round, "best": best.serviceability }),
                );
                break;
            }
            trace(
                self.telemetry.as_ref(),
                LogLevel::Info,
                "optimizer.round.accepted",
                json!({ "optimization_id": optimization_id, "round": round, "serviceability": outcome.serviceability }),
            );
            best_plan = candidate.plan;
            best_remaining = candidate.remaining;
            best = outcome;
        }

        trace(
            self.telemetry.as_ref(),
            LogLevel::Warn,
            "optimizer.finished",
            json!({ "optimization_id": optimization_id, "serviceability": best.serviceability, "rounds": rounds }),
        );
        Ok(OptimizationResult {
            optimization_id,
            budget,
            serviceability: best.serviceability,
            initial_serviceability,
            plan: best_plan,
            remaining_budget: best_remaining,
            rounds,
            history,
            completed_at: Utc::now(),
            outcome: best,
        })
    }
}
