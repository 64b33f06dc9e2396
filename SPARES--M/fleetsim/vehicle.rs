use std::sync::Arc;

use crate::{
    assembly::{AssemblyTree, NodeId},
    part::{LifecycleEvent, PartId, PartPool},
};

/// One assembled vehicle. Slots are indexed by assembly node.
#[derive(Debug, Clone)]
pub struct Vehicle {
    tree: Arc<AssemblyTree>,
    slots: Vec<Option<PartId>>,
    serviceable: bool,
}

impl Vehicle {
    /// Creates an empty vehicle over the shared tree.
    #[must_use]
    pub fn new(tree: Arc<AssemblyTree>) -> Self {
        let slots = vec![None; tree.len()];
        Self {
            tree,
            slots,
            serviceable: false,
        }
    }

    /// First-fit fill of every empty slot from the warehouse. Returns slots filled.
    ///
    /// Filled slots are skipped; children are visited whether or not their
    /// parent slot could be filled.
    pub fn fill(&mut self, pool: &mut PartPool) -> usize {
        let mut filled = 0;
        for id in self.tree.preorder() {
            if self.slots[id].is_some() {
                continue;
            }
            let part_type = &self.tree.node(id).part_type;
            if let Some(part) = pool.first_available(part_type) {
                pool.get_mut(part).install();
                self.slots[id] = Some(part);
                filled += 1;
            }
        }
        filled
    }

    /// Every slot holds a part and every part is serviceable. Updates the cached flag.
    pub fn check_serviceability(&mut self, pool: &PartPool) -> bool {
        self.serviceable = self.tree.preorder().into_iter().all(|id| {
            self.slots[id].is_some_and(|part| pool.get(part).is_serviceable())
        });
        self.serviceable
    }

    /// Frees the slots of unserviceable parts. Returns how many were removed.
    pub fn detach_unserviceable(&mut self, pool: &PartPool) -> usize {
        let mut removed = 0;
        for slot in &mut self.slots {
            if slot.is_some_and(|part| !pool.get(part).is_serviceable()) {
                *slot = None;
                removed += 1;
            }
        }
        removed
    }

    /// Adds hours to every installed part. Returns the parts that changed state.
    pub fn run(&self, pool: &mut PartPool, hours: f64) -> Vec<(PartId, LifecycleEvent)> {
        self.slots
            .iter()
            .flatten()
            .filter_map(|part| pool.get_mut(*part).accrue(hours).map(|event| (*part, event)))
            .collect()
    }

    /// Result of the last serviceability check.
    #[must_use]
    pub const fn is_serviceable(&self) -> bool {
        self.serviceable
    }

    /// Part installed at a slot.
    #[must_use]
    pub fn part_at(&self, node: NodeId) -> Option<PartId> {
        self.slots.get(node).copied().flatten()
    }

    /// Installed part ids.
    pub fn installed(&self) -> impl Iterator<Item = PartId> + '_ {
        self.slots.iter().flatten().copied()
    }

    /// Shared assembly tree.
    #[must_use]
    pub fn tree(&self) -> &Arc<AssemblyTree> {
        &self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::AssemblyRow,
        catalog::PartBlueprint,
        part::{tests::ScriptedSampler, Location},
    };

    fn tree() -> Arc<AssemblyTree> {
        Arc::new(
            AssemblyTree::from_rows(&[
                AssemblyRow::new("car", "Car", "None"),
                AssemblyRow::new("wheel_l", "Wheel", "car"),
                AssemblyRow::new("wheel_r", "Wheel", "car"),
            ])
            .unwrap(),
        )
    }

    fn stocked_pool(cars: usize, wheels: usize, sampler: &mut ScriptedSampler) -> PartPool {
        let car = Arc::new(PartBlueprint::new("Car"));
        let wheel = Arc::new(PartBlueprint::new("Wheel").with_failure(10.0, 1.0).with_depot(2, 5.0));
        let mut pool = PartPool::new();
        for _ in 0..cars {
            pool.purchase(&car, sampler).unwrap();
        }
        for _ in 0..wheels {
            pool.purchase(&wheel, sampler).unwrap();
        }
        pool.receive_all();
        pool
    }

    #[test]
    fn fills_first_fit_and_reports_serviceable() {
        let mut sampler = ScriptedSampler::new(&[], 100.0);
        let mut pool = stocked_pool(1, 3, &mut sampler);
        let mut vehicle = Vehicle::new(tree());
        assert_eq!(vehicle.fill(&mut pool), 3);
        assert!(vehicle.check_serviceability(&pool));
        let left = vehicle.part_at(1).unwrap();
        assert_eq!(pool.get(left).serial(), 2);
        assert_eq!(pool.get(left).location(), Location::Car);
        assert_eq!(vehicle.fill(&mut pool), 0);
    }

    #[test]
    fn missing_parent_part_still_fills_children() {
        let mut sampler = ScriptedSampler::new(&[], 100.0);
        let mut pool = stocked_pool(0, 2, &mut sampler);
        let mut vehicle = Vehicle::new(tree());
        assert_eq!(vehicle.fill(&mut pool), 2);
        assert!(vehicle.part_at(0).is_none());
        assert!(!vehicle.check_serviceability(&pool));
    }

    #[test]
    fn one_broken_part_grounds_the_vehicle() {
        let mut sampler = ScriptedSampler::new(&[], 100.0);
        let mut pool = stocked_pool(1, 3, &mut sampler);
        let mut vehicle = Vehicle::new(tree());
        vehicle.fill(&mut pool);
        assert!(vehicle.check_serviceability(&pool));

        let right = vehicle.part_at(2).unwrap();
        pool.get_mut(right).force_serviceable(false);
        assert!(!vehicle.check_serviceability(&pool));
        assert_eq!(vehicle.detach_unserviceable(&pool), 1);
        assert!(vehicle.part_at(2).is_none());

        assert_eq!(vehicle.fill(&mut pool), 1);
        assert_eq!(pool.get(vehicle.part_at(2).unwrap()).serial(), 4);
        assert!(vehicle.check_serviceability(&pool));
    }

    #[test]
    fn running_wears_installed_parts() {
        let mut sampler = ScriptedSampler::new(&[100.0, 1.0, 100.0], 100.0);
        let mut pool = stocked_pool(1, 2, &mut sampler);
        let mut vehicle = Vehicle::new(tree());
        vehicle.fill(&mut pool);
        let changed = vehicle.run(&mut pool, 1.0);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].1, LifecycleEvent::Failed);
        assert!(!vehicle.check_serviceability(&pool));
        vehicle.detach_unserviceable(&pool);
        assert_eq!(vehicle.installed().count(), 2);
        assert!(vehicle
            .installed()
            .all(|id| (pool.get(id).operating_hours() - 1.0).abs() < f64::EPSILON));
    }
}
