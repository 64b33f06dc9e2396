use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    assembly::AssemblyTree,
    catalog::PartCatalog,
    error::{FleetError, FleetResult},
    helper::{trace, SimulationTelemetry},
    part::PartCounts,
    plan::AllocationPlan,
    reliability::{FailureSampler, WeibullSampler},
    world::World,
};

/// Mission length and fleet size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionProfile {
    /// Simulated days.
    pub days: u32,
    /// Operating hours per day.
    pub hours_per_day: u32,
    /// Vehicles in the fleet.
    pub fleet_size: u32,
}

impl MissionProfile {
    /// Rejects empty missions.
    pub fn validate(&self) -> FleetResult<()> {
        for (field, value) in [
            ("days", self.days),
            ("hours_per_day", self.hours_per_day),
            ("fleet_size", self.fleet_size),
        ] {
            if value == 0 {
                return Err(FleetError::InvalidParameter(format!(
                    "{field} must be positive"
                )));
            }
        }
        Ok(())
    }
}

impl Default for MissionProfile {
    fn default() -> Self {
        Self {
            days: 1000,
            hours_per_day: 5,
            fleet_size: 5,
        }
    }
}

/// Daily counts for one part type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSeries {
    /// Installed on vehicles.
    pub in_service: Vec<u32>,
    /// In the depot.
    pub in_depot: Vec<u32>,
    /// On the shelf.
    pub in_warehouse: Vec<u32>,
    /// Scrapped.
    pub in_graveyard: Vec<u32>,
    /// Random failures that day.
    pub failed: Vec<u32>,
    /// Overhaul arrivals that day.
    pub overhaul: Vec<u32>,
    /// Life-limit scrappings that day.
    pub life_expired: Vec<u32>,
    /// Repairs in progress.
    pub under_repair: Vec<u32>,
    /// Repairs finished that day.
    pub repair_completed: Vec<u32>,
}

impl PartSeries {
    fn push(&mut self, counts: PartCounts) {
        self.in_service.push(counts.in_service);
        self.in_depot.push(counts.in_depot);
        self.in_warehouse.push(counts.in_warehouse);
        self.in_graveyard.push(counts.in_graveyard);
        self.failed.push(counts.failed);
        self.overhaul.push(counts.overhaul);
        self.life_expired.push(counts.life_expired);
        self.under_repair.push(counts.under_repair);
        self.repair_completed.push(counts.repair_completed);
    }

    fn named(&self) -> [(&'static str, &Vec<u32>); 9] {
        [
            ("in_service", &self.in_service),
            ("in_depot", &self.in_depot),
            ("in_warehouse", &self.in_warehouse),
            ("in_graveyard", &self.in_graveyard),
            ("failed", &self.failed),
            ("overhaul", &self.overhaul),
            ("life_expired", &self.life_expired),
            ("under_repair", &self.under_repair),
            ("repair_completed", &self.repair_completed),
        ]
    }
}

/// Metrics from one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    /// Serviceable vehicle-days as a percentage of all vehicle-days.
    pub serviceability: f64,
    /// Mission that produced the metrics.
    pub profile: MissionProfile,
    /// Serviceable vehicles at the end of each day.
    pub serviceable_vehicles: Vec<u32>,
    /// Vehicles found broken before each day's refill.
    pub broken_vehicles: Vec<u32>,
    /// Per part type series.
    pub series: IndexMap<String, PartSeries>,
}

impl SimulationOutcome {
    /// Flat `(name, values)` list for plotting, e.g. `Wheel.in_service`.
    #[must_use]
    pub fn named_series(&self) -> Vec<(String, Vec<f64>)> {
        let widen = |values: &Vec<u32>| -> Vec<f64> { values.iter().map(|v| f64::from(*v)).collect() };
        let mut out = vec![
            ("fleet.serviceable".to_string(), widen(&self.serviceable_vehicles)),
            ("fleet.broken".to_string(), widen(&self.broken_vehicles)),
        ];
        for (part_type, series) in &self.series {
            for (field, values) in series.named() {
                out.push((format!("{part_type}.{field}"), widen(values)));
            }
        }
        out
    }
}

/// Day/hour stepper over a [`World`].
#[derive(Debug, Clone)]
pub struct Simulator {
    profile: MissionProfile,
    telemetry: Option<SimulationTelemetry>,
}

impl Simulator {
    /// Creates a simulator.
    #[must_use]
    pub const fn new(profile: MissionProfile, telemetry: Option<SimulationTelemetry>) -> Self {
        Self { profile, telemetry }
    }

    /// Mission profile.
    #[must_use]
    pub const fn profile(&self) -> MissionProfile {
        self.profile
    }

    /// Builds a fresh world for `plan` and runs it with a seeded Weibull sampler.
    pub fn simulate_plan(
        &self,
        catalog: &PartCatalog,
        tree: &Arc<AssemblyTree>,
        plan: &AllocationPlan,
        seed: u64,
    ) -> FleetResult<SimulationOutcome> {
        self.profile.validate()?;
        let mut sampler = WeibullSampler::seeded(seed);
        let mut world = World::build(
            catalog,
            Arc::clone(tree),
            plan,
            self.profile.fleet_size,
            &mut sampler,
        )?;
        trace(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "world.built",
            json!({ "parts": world.pool().len(), "vehicles": world.vehicles().len(), "seed": seed }),
        );
        self.run(&mut world, &mut sampler)
    }

    /// Runs the configured number of days.
    ///
    /// Each day: depot dwell, hourly wear with check and detach, breakage tally,
    /// refill and recheck, then the per-type snapshot.
    pub fn run(
        &self,
        world: &mut World,
        sampler: &mut dyn FailureSampler,
    ) -> FleetResult<SimulationOutcome> {
        self.profile.validate()?;
        let days = self.profile.days;
        let fleet = world.vehicles().len();
        if fleet == 0 {
            return Err(FleetError::InvalidParameter("world has no vehicles".into()));
        }
        trace(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "simulation.run.start",
            json!({ "days": days, "hours_per_day": self.profile.hours_per_day, "fleet": fleet }),
        );

        let mut series: IndexMap<String, PartSeries> = world
            .tree()
            .part_quantities()
            .into_keys()
            .map(|name| (name, PartSeries::default()))
            .collect();
        let mut serviceable_vehicles = Vec::with_capacity(days as usize);
        let mut broken_vehicles = Vec::with_capacity(days as usize);
        let log_days = self
            .telemetry
            .as_ref()
            .is_some_and(|tel| tel.enabled(LogLevel::Debug));

        for day in 0..days {
            let (pool, vehicles) = world.parts_mut();
            let released = pool.advance_depot(sampler)?;

            for hour in 0..self.profile.hours_per_day {
                for vehicle in vehicles.iter_mut() {
                    if vehicle.is_serviceable() {
                        for (part, event) in vehicle.run(pool, 1.0) {
                            if log_days {
                                let part = pool.get(part);
                                trace(
                                    self.telemetry.as_ref(),
                                    LogLevel::Debug,
                                    "part.transition",
                                    json!({
                                        "day": day,
                                        "hour": hour,
                                        "serial": part.serial(),
                                        "part_type": part.part_type(),
                                        "event": format!("{event:?}"),
                                        "hours": part.operating_hours(),
                                    }),
                                );
                            }
                        }
                    }
                    vehicle.check_serviceability(pool);
                    vehicle.detach_unserviceable(pool);
                }
            }

            let mut broken = 0;
            let mut serviceable = 0;
            for vehicle in vehicles.iter_mut() {
                if !vehicle.is_serviceable() {
                    broken += 1;
                }
                vehicle.fill(pool);
                if vehicle.check_serviceability(pool) {
                    serviceable += 1;
                }
            }
            broken_vehicles.push(broken);
            serviceable_vehicles.push(serviceable);

            let snapshot = pool.snapshot();
            for (name, counts) in snapshot {
                series.entry(name).or_default().push(counts);
            }
            let expected = day as usize + 1;
            for part_series in series.values_mut() {
                if part_series.in_service.len() < expected {
                    part_series.push(PartCounts::default());
                }
            }

            if log_days {
                trace(
                    self.telemetry.as_ref(),
                    LogLevel::Debug,
                    "simulation.day",
                    json!({ "day": day, "released": released, "broken": broken, "serviceable": serviceable }),
                );
            }
        }

        let total: u64 = serviceable_vehicles.iter().map(|v| u64::from(*v)).sum();
        #[allow(clippy::cast_precision_loss)]
        let serviceability = total as f64 / (fleet as f64 * f64::from(days)) * 100.0;
        trace(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "simulation.run.completed",
            json!({ "serviceability": serviceability }),
        );
        Ok(SimulationOutcome {
            serviceability,
            profile: self.profile,
            serviceable_vehicles,
            broken_vehicles,
            series,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::AssemblyRow,
        catalog::PartBlueprint,
        part::{tests::ScriptedSampler, DepotReason, Location},
    };

    fn wheel_setup() -> (PartCatalog, Arc<AssemblyTree>) {
        let mut catalog = PartCatalog::new();
        catalog
            .insert(
                PartBlueprint::new("Wheel")
                    .with_failure(100.0, 2.0)
                    .with_depot(5, 10.0),
            )
            .unwrap();
        let tree = AssemblyTree::from_rows(&[AssemblyRow::new("root", "Wheel", "None")]).unwrap();
        (catalog, Arc::new(tree))
    }

    fn one_wheel_profile() -> MissionProfile {
        MissionProfile {
            days: 50,
            hours_per_day: 1,
            fleet_size: 1,
        }
    }

    #[test]
    fn single_wheel_scenario_with_spare() {
        let (catalog, tree) = wheel_setup();
        let mut plan = AllocationPlan::new();
        plan.set("Wheel", 2);
        // Active wheel fails after 10 hours; spare lasts the mission, repaired wheel likewise.
        let mut sampler = ScriptedSampler::new(&[10.0, 1_000.0, 1_000.0], 1_000.0);
        let mut world = World::build(&catalog, Arc::clone(&tree), &plan, 1, &mut sampler).unwrap();
        let outcome = Simulator::new(one_wheel_profile(), None)
            .run(&mut world, &mut sampler)
            .unwrap();

        let wheel = &outcome.series["Wheel"];
        assert_eq!(wheel.failed.iter().sum::<u32>(), 1);
        assert_eq!(wheel.failed[9], 1);
        assert_eq!(wheel.in_depot.iter().filter(|n| **n == 1).count(), 5);
        assert_eq!(wheel.in_depot[9..14], [1, 1, 1, 1, 1]);
        assert_eq!(wheel.repair_completed[14], 1);
        assert_eq!(wheel.in_warehouse[14], 1);
        // The spare went in the same day, so the vehicle never ended a day grounded.
        assert_eq!(outcome.broken_vehicles[9], 1);
        assert!(outcome.serviceable_vehicles.iter().all(|v| *v == 1));
        assert!((outcome.serviceability - 100.0).abs() < 1e-9);
    }

    #[test]
    fn single_wheel_without_spare_loses_repair_days() {
        let (catalog, tree) = wheel_setup();
        let mut plan = AllocationPlan::new();
        plan.set("Wheel", 1);
        let mut sampler = ScriptedSampler::new(&[10.0, 1_000.0], 1_000.0);
        let mut world = World::build(&catalog, tree, &plan, 1, &mut sampler).unwrap();
        let outcome = Simulator::new(one_wheel_profile(), None)
            .run(&mut world, &mut sampler)
            .unwrap();
        let grounded = outcome.serviceable_vehicles.iter().filter(|v| **v == 0).count();
        assert_eq!(grounded, 5);
        let expected = f64::from(50 - 5) / 50.0 * 100.0;
        assert!((outcome.serviceability - expected).abs() < 1e-9);
    }

    #[test]
    fn random_scenario_stays_in_bounds() {
        let (catalog, tree) = wheel_setup();
        let mut plan = AllocationPlan::new();
        plan.set("Wheel", 2);
        let outcome = Simulator::new(one_wheel_profile(), None)
            .simulate_plan(&catalog, &tree, &plan, 17)
            .unwrap();
        assert!((0.0..=100.0).contains(&outcome.serviceability));
        let days_ok = outcome.serviceable_vehicles.iter().map(|v| f64::from(*v)).sum::<f64>();
        assert!((outcome.serviceability - days_ok / 50.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn scrapped_parts_are_counted_once() {
        let mut catalog = PartCatalog::new();
        catalog
            .insert(
                PartBlueprint::new("Filter")
                    .with_limits(3.0, f64::INFINITY)
                    .with_depot(1, 1.0),
            )
            .unwrap();
        let tree = Arc::new(
            AssemblyTree::from_rows(&[AssemblyRow::new("root", "Filter", "None")]).unwrap(),
        );
        let mut plan = AllocationPlan::new();
        plan.set("Filter", 2);
        let profile = MissionProfile {
            days: 10,
            hours_per_day: 1,
            fleet_size: 1,
        };
        let outcome = Simulator::new(profile, None)
            .simulate_plan(&catalog, &tree, &plan, 1)
            .unwrap();
        let filter = &outcome.series["Filter"];
        assert_eq!(filter.life_expired.iter().sum::<u32>(), 2);
        assert_eq!(filter.in_graveyard[9], 2);
        assert_eq!(outcome.serviceable_vehicles[9], 0);
    }

    #[test]
    fn overhaul_repeats_because_hours_are_kept() {
        let mut catalog = PartCatalog::new();
        catalog
            .insert(
                PartBlueprint::new("Pump")
                    .with_limits(f64::INFINITY, 2.0)
                    .with_depot(1, 1.0),
            )
            .unwrap();
        let tree = Arc::new(
            AssemblyTree::from_rows(&[AssemblyRow::new("root", "Pump", "None")]).unwrap(),
        );
        let mut plan = AllocationPlan::new();
        plan.set("Pump", 1);
        let mut sampler = ScriptedSampler::new(&[], 1_000.0);
        let mut world = World::build(&catalog, tree, &plan, 1, &mut sampler).unwrap();
        let outcome = Simulator::new(
            MissionProfile {
                days: 6,
                hours_per_day: 1,
                fleet_size: 1,
            },
            None,
        )
        .run(&mut world, &mut sampler)
        .unwrap();
        let pump = &outcome.series["Pump"];
        assert!(pump.overhaul.iter().sum::<u32>() >= 2);
        let part = world.pool().get(0);
        assert!(part.operating_hours() >= 2.0);
        assert!(matches!(
            part.location(),
            Location::Depot(DepotReason::Overhaul) | Location::Car | Location::Warehouse
        ));
    }

    #[test]
    fn named_series_cover_fleet_and_parts() {
        let (catalog, tree) = wheel_setup();
        let mut plan = AllocationPlan::new();
        plan.set("Wheel", 2);
        let outcome = Simulator::new(one_wheel_profile(), None)
            .simulate_plan(&catalog, &tree, &plan, 5)
            .unwrap();
        let named = outcome.named_series();
        assert_eq!(named.len(), 2 + 9);
        assert_eq!(named[0].0, "fleet.serviceable");
        assert!(named.iter().any(|(name, values)| name == "Wheel.in_service" && values.len() == 50));
    }

    #[test]
    fn fleet_size_does_not_change_steady_state() {
        let (catalog, tree) = wheel_setup();
        let serviceability = |fleet: u32| {
            let mut plan = AllocationPlan::as_built(&tree.part_quantities(), fleet);
            plan.add("Wheel", 2 * fleet);
            let profile = MissionProfile {
                days: 3000,
                hours_per_day: 5,
                fleet_size: fleet,
            };
            Simulator::new(profile, None)
                .simulate_plan(&catalog, &tree, &plan, 21)
                .unwrap()
                .serviceability
        };
        let small = serviceability(3);
        let large = serviceability(6);
        assert!((small - large).abs() < 2.0, "fleet 3: {small}, fleet 6: {large}");
    }

    #[test]
    fn empty_missions_are_rejected() {
        let (catalog, tree) = wheel_setup();
        let profile = MissionProfile {
            days: 0,
            hours_per_day: 1,
            fleet_size: 1,
        };
        assert!(matches!(
            Simulator::new(profile, None).simulate_plan(&catalog, &tree, &AllocationPlan::new(), 1),
            Err(FleetError::InvalidParameter(_))
        ));
    }
}
