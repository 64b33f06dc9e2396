use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{catalog::PartBlueprint, error::FleetResult, reliability::FailureSampler};

/// Index of a part inside a [`PartPool`].
pub type PartId = usize;

/// Why a part is sitting in the depot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepotReason {
    /// Scheduled overhaul after reaching the depot limit.
    Overhaul,
    /// Random failure.
    UnscheduledRepair,
}

/// Where a physical part currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    /// Purchased but not yet received.
    Unassigned,
    /// On the shelf.
    Warehouse,
    /// Installed on a vehicle.
    Car,
    /// Under repair or overhaul.
    Depot(DepotReason),
    /// Scrapped. Terminal.
    Graveyard,
}

/// Transition recorded for the end-of-day snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// Reached the life limit.
    LifeExpired,
    /// Reached the depot limit.
    Overhaul,
    /// Reached its sampled failure time.
    Failed,
    /// Left the depot.
    RepairCompleted,
}

/// One physical part.
#[derive(Debug, Clone)]
pub struct PartInstance {
    blueprint: Arc<PartBlueprint>,
    serial: u64,
    operating_hours: f64,
    sampled_failure_hours: f64,
    location: Location,
    serviceable: bool,
    depot_countdown: u32,
    arrival: Option<LifecycleEvent>,
    repair_completed: bool,
}

impl PartInstance {
    /// Creates an unassigned part and draws its first failure time.
    pub fn new(
        blueprint: Arc<PartBlueprint>,
        serial: u64,
        sampler: &mut dyn FailureSampler,
    ) -> FleetResult<Self> {
        let sampled_failure_hours = sampler.draw(blueprint.shape_factor, blueprint.failure_hours)?;
        Ok(Self {
            blueprint,
            serial,
            operating_hours: 0.0,
            sampled_failure_hours,
            location: Location::Unassigned,
            serviceable: 0.0 < sampled_failure_hours,
            depot_countdown: 0,
            arrival: None,
            repair_completed: false,
        })
    }

    /// Adds operating hours and applies the lifecycle rules in priority order:
    /// life limit, depot limit, sampled failure.
    pub fn accrue(&mut self, hours: f64) -> Option<LifecycleEvent> {
        if self.location == Location::Graveyard {
            return None;
        }
        self.operating_hours += hours;
        let bp = &self.blueprint;
        let event = if self.operating_hours >= bp.life_limit {
            self.location = Location::Graveyard;
            self.depot_countdown = 0;
            LifecycleEvent::LifeExpired
        } else if self.operating_hours >= bp.depot_limit {
            self.location = Location::Depot(DepotReason::Overhaul);
            self.depot_countdown = bp.depot_tat;
            LifecycleEvent::Overhaul
        } else if self.operating_hours >= self.sampled_failure_hours {
            self.location = Location::Depot(DepotReason::UnscheduledRepair);
            self.depot_countdown = bp.depot_tat;
            LifecycleEvent::Failed
        } else {
            self.serviceable = true;
            return None;
        };
        self.serviceable = false;
        self.arrival = Some(event);
        Some(event)
    }

    /// One depot day. Returns true when the part comes back to the warehouse.
    ///
    /// The failure clock is extended from its previous value; operating hours are kept.
    pub fn advance_depot(&mut self, sampler: &mut dyn FailureSampler) -> FleetResult<bool> {
        if !matches!(self.location, Location::Depot(_)) {
            return Ok(false);
        }
        self.depot_countdown = self.depot_countdown.saturating_sub(1);
        if self.depot_countdown > 0 {
            return Ok(false);
        }
        self.sampled_failure_hours += sampler.draw(
            self.blueprint.shape_factor,
            self.blueprint.failure_hours,
        )?;
        self.location = Location::Warehouse;
        self.serviceable = true;
        self.repair_completed = true;
        Ok(true)
    }

    /// Moves a received part onto the shelf.
    pub fn receive(&mut self) {
        if self.location == Location::Unassigned {
            self.location = Location::Warehouse;
        }
    }

    /// Marks the part as installed.
    pub fn install(&mut self) {
        self.location = Location::Car;
    }

    /// Overrides the serviceable flag without moving the part.
    pub fn force_serviceable(&mut self, serviceable: bool) {
        self.serviceable = serviceable;
    }

    fn settle(&mut self) -> (Option<LifecycleEvent>, bool) {
        (self.arrival.take(), std::mem::take(&mut self.repair_completed))
    }

    /// Shared blueprint.
    #[must_use]
    pub fn blueprint(&self) -> &Arc<PartBlueprint> {
        &self.blueprint
    }

    /// Part-type name.
    #[must_use]
    pub fn part_type(&self) -> &str {
        &self.blueprint.name
    }

    /// Serial number, unique within a pool.
    #[must_use]
    pub const fn serial(&self) -> u64 {
        self.serial
    }

    /// Cumulative hours.
    #[must_use]
    pub const fn operating_hours(&self) -> f64 {
        self.operating_hours
    }

    /// Hours at which the part next fails randomly.
    #[must_use]
    pub const fn sampled_failure_hours(&self) -> f64 {
        self.sampled_failure_hours
    }

    /// Current location.
    #[must_use]
    pub const fn location(&self) -> Location {
        self.location
    }

    /// Serviceable flag.
    #[must_use]
    pub const fn is_serviceable(&self) -> bool {
        self.serviceable
    }

    /// Days left in the depot, zero elsewhere.
    #[must_use]
    pub const fn depot_countdown(&self) -> u32 {
        self.depot_countdown
    }
}

/// Per-type tallies for one simulated day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartCounts {
    /// Parts of this type.
    pub total: u32,
    /// Serviceable parts.
    pub serviceable: u32,
    /// Installed on vehicles.
    pub in_service: u32,
    /// In the depot.
    pub in_depot: u32,
    /// On the shelf.
    pub in_warehouse: u32,
    /// Scrapped.
    pub in_graveyard: u32,
    /// Random failures since the last snapshot.
    pub failed: u32,
    /// Overhaul arrivals since the last snapshot.
    pub overhaul: u32,
    /// Life-limit scrappings since the last snapshot.
    pub life_expired: u32,
    /// Repairs still in progress. Always equal to `in_depot`, since every
    /// depot part is under repair or overhaul.
    pub under_repair: u32,
    /// Repairs finished since the last snapshot.
    pub repair_completed: u32,
}

/// Owned arena of every physical part in one world.
#[derive(Debug, Clone)]
pub struct PartPool {
    parts: Vec<PartInstance>,
    by_type: IndexMap<String, Vec<PartId>>,
    next_serial: u64,
}

impl Default for PartPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PartPool {
    /// Creates an empty pool. Serial numbers start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parts: Vec::new(),
            by_type: IndexMap::new(),
            next_serial: 1,
        }
    }

    /// Purchases one part; it starts `Unassigned`.
    pub fn purchase(
        &mut self,
        blueprint: &Arc<PartBlueprint>,
        sampler: &mut dyn FailureSampler,
    ) -> FleetResult<PartId> {
        let part = PartInstance::new(Arc::clone(blueprint), self.next_serial, sampler)?;
        self.next_serial += 1;
        let id = self.parts.len();
        self.by_type
            .entry(blueprint.name.clone())
            .or_default()
            .push(id);
        self.parts.push(part);
        Ok(id)
    }

    /// Moves every unassigned part to the warehouse.
    pub fn receive_all(&mut self) -> usize {
        let mut moved = 0;
        for part in &mut self.parts {
            if part.location == Location::Unassigned {
                part.receive();
                moved += 1;
            }
        }
        moved
    }

    /// Lowest-serial serviceable warehouse part of a type.
    #[must_use]
    pub fn first_available(&self, part_type: &str) -> Option<PartId> {
        self.by_type.get(part_type).and_then(|ids| {
            ids.iter().copied().find(|&id| {
                let part = &self.parts[id];
                part.location == Location::Warehouse && part.serviceable
            })
        })
    }

    /// Depot dwell for every part in the depot. Returns the number released.
    pub fn advance_depot(&mut self, sampler: &mut dyn FailureSampler) -> FleetResult<usize> {
        let mut released = 0;
        for part in &mut self.parts {
            if part.advance_depot(sampler)? {
                released += 1;
            }
        }
        Ok(released)
    }

    /// Counts parts per type and clears the pending transition markers,
    /// so each arrival is counted on exactly one day.
    pub fn snapshot(&mut self) -> IndexMap<String, PartCounts> {
        let mut out: IndexMap<String, PartCounts> = self
            .by_type
            .keys()
            .map(|name| (name.clone(), PartCounts::default()))
            .collect();
        for part in &mut self.parts {
            let (arrival, repaired) = part.settle();
            let Some(counts) = out.get_mut(&part.blueprint.name) else {
                continue;
            };
            counts.total += 1;
            if part.serviceable {
                counts.serviceable += 1;
            }
            match arrival {
                Some(LifecycleEvent::LifeExpired) => counts.life_expired += 1,
                Some(LifecycleEvent::Overhaul) => counts.overhaul += 1,
                Some(LifecycleEvent::Failed) => counts.failed += 1,
                Some(LifecycleEvent::RepairCompleted) | None => {}
            }
            if repaired {
                counts.repair_completed += 1;
            }
            match part.location {
                Location::Car => counts.in_service += 1,
                Location::Depot(_) => {
                    counts.in_depot += 1;
                    counts.under_repair += 1;
                }
                Location::Warehouse => counts.in_warehouse += 1,
                Location::Graveyard => counts.in_graveyard += 1,
                Location::Unassigned => {}
            }
        }
        out
    }

    /// Part by id.
    #[must_use]
    pub fn get(&self, id: PartId) -> &PartInstance {
        &self.parts[id]
    }

    /// Mutable part by id.
    pub fn get_mut(&mut self, id: PartId) -> &mut PartInstance {
        &mut self.parts[id]
    }

    /// Parts in serial order.
    pub fn iter(&self) -> impl Iterator<Item = &PartInstance> {
        self.parts.iter()
    }

    /// Number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True when no parts were purchased.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// One debug line per part.
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        self.parts
            .iter()
            .map(|part| {
                format!(
                    "Serial Number: {}, {}, Location: {:?}, Operating Hours: {}, Failure Hours: {}, Serviceable: {}",
                    part.serial,
                    part.blueprint.name,
                    part.location,
                    part.operating_hours,
                    part.sampled_failure_hours,
                    part.serviceable
                )
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::FleetError;
    use std::collections::VecDeque;

    /// Replays scripted failure times, then falls back to a constant.
    pub(crate) struct ScriptedSampler {
        pub(crate) draws: VecDeque<f64>,
        pub(crate) fallback: f64,
    }

    impl ScriptedSampler {
        pub(crate) fn new(draws: &[f64], fallback: f64) -> Self {
            Self {
                draws: draws.iter().copied().collect(),
                fallback,
            }
        }
    }

    impl FailureSampler for ScriptedSampler {
        fn draw(&mut self, shape: f64, scale: f64) -> FleetResult<f64> {
            if shape <= 0.0 {
                return Err(FleetError::InvalidParameter("shape".into()));
            }
            if scale.is_infinite() {
                return Ok(f64::INFINITY);
            }
            Ok(self.draws.pop_front().unwrap_or(self.fallback))
        }
    }

    fn wheel() -> Arc<PartBlueprint> {
        Arc::new(
            PartBlueprint::new("Wheel")
                .with_failure(100.0, 2.0)
                .with_depot(3, 10.0),
        )
    }

    #[test]
    fn failure_sends_part_to_depot_and_back() {
        let mut sampler = ScriptedSampler::new(&[2.0, 5.0], 1_000.0);
        let mut part = PartInstance::new(wheel(), 1, &mut sampler).unwrap();
        part.receive();
        part.install();
        assert_eq!(part.accrue(1.0), None);
        assert!(part.is_serviceable());
        assert_eq!(part.accrue(1.0), Some(LifecycleEvent::Failed));
        assert_eq!(part.location(), Location::Depot(DepotReason::UnscheduledRepair));
        assert_eq!(part.depot_countdown(), 3);
        assert!(!part.is_serviceable());

        assert!(!part.advance_depot(&mut sampler).unwrap());
        assert!(!part.advance_depot(&mut sampler).unwrap());
        assert!(part.advance_depot(&mut sampler).unwrap());
        assert_eq!(part.location(), Location::Warehouse);
        assert!(part.is_serviceable());
        // Clock extended from 2.0, hours kept.
        assert_eq!(part.sampled_failure_hours(), 7.0);
        assert_eq!(part.operating_hours(), 2.0);
    }

    #[test]
    fn life_limit_is_terminal() {
        let bp = Arc::new(
            PartBlueprint::new("Brake")
                .with_failure(1.0, 1.0)
                .with_limits(3.0, 2.0)
                .with_depot(1, 1.0),
        );
        let mut sampler = ScriptedSampler::new(&[50.0], 50.0);
        let mut part = PartInstance::new(bp, 1, &mut sampler).unwrap();
        part.install();
        part.accrue(3.0);
        assert_eq!(part.location(), Location::Graveyard);
        for _ in 0..10 {
            assert_eq!(part.accrue(1.0), None);
            part.advance_depot(&mut sampler).unwrap();
            assert_eq!(part.location(), Location::Graveyard);
        }
        assert!(!part.is_serviceable());
    }

    #[test]
    fn overhaul_beats_random_failure() {
        let bp = Arc::new(
            PartBlueprint::new("Gearbox")
                .with_failure(10.0, 1.0)
                .with_limits(f64::INFINITY, 4.0)
                .with_depot(2, 1.0),
        );
        let mut sampler = ScriptedSampler::new(&[3.0], 3.0);
        let mut part = PartInstance::new(bp, 1, &mut sampler).unwrap();
        part.install();
        assert_eq!(part.accrue(5.0), Some(LifecycleEvent::Overhaul));
        assert_eq!(part.location(), Location::Depot(DepotReason::Overhaul));
    }

    #[test]
    fn zero_turnaround_still_spends_one_dwell() {
        let bp = Arc::new(PartBlueprint::new("Bulb").with_failure(5.0, 1.0));
        let mut sampler = ScriptedSampler::new(&[1.0], 9.0);
        let mut part = PartInstance::new(bp, 1, &mut sampler).unwrap();
        part.install();
        part.accrue(1.0);
        assert_eq!(part.depot_countdown(), 0);
        assert!(part.advance_depot(&mut sampler).unwrap());
    }

    #[test]
    fn pool_picks_lowest_serial_and_counts_once() {
        let mut sampler = ScriptedSampler::new(&[1.0, 50.0, 50.0], 50.0);
        let mut pool = PartPool::new();
        let bp = wheel();
        let first = pool.purchase(&bp, &mut sampler).unwrap();
        let second = pool.purchase(&bp, &mut sampler).unwrap();
        assert_eq!(pool.get(first).serial(), 1);
        assert_eq!(pool.get(second).serial(), 2);
        assert_eq!(pool.first_available("Wheel"), None);
        assert_eq!(pool.receive_all(), 2);
        assert_eq!(pool.first_available("Wheel"), Some(first));

        pool.get_mut(first).install();
        pool.get_mut(first).accrue(1.0);
        assert_eq!(pool.first_available("Wheel"), Some(second));

        let day1 = pool.snapshot();
        assert_eq!(day1["Wheel"].failed, 1);
        assert_eq!(day1["Wheel"].in_depot, 1);
        assert_eq!(day1["Wheel"].in_warehouse, 1);
        assert_eq!(day1["Wheel"].under_repair, day1["Wheel"].in_depot);
        let day2 = pool.snapshot();
        assert_eq!(day2["Wheel"].failed, 0);
        assert_eq!(day2["Wheel"].in_depot, 1);
    }

    #[test]
    fn invalid_shape_stops_purchase() {
        let bp = Arc::new(PartBlueprint {
            shape_factor: 0.0,
            ..PartBlueprint::new("Odd").with_failure(10.0, 1.0)
        });
        let mut pool = PartPool::new();
        let mut sampler = ScriptedSampler::new(&[], 1.0);
        assert!(pool.purchase(&bp, &mut sampler).is_err());
        assert!(pool.is_empty());
    }
}
