use std::sync::Arc;

use crate::{
    assembly::AssemblyTree,
    catalog::PartCatalog,
    error::FleetResult,
    part::PartPool,
    plan::AllocationPlan,
    reliability::FailureSampler,
    vehicle::Vehicle,
};

/// Everything one simulation run mutates: the part pool and the fleet.
///
/// Worlds are never repaired between optimizer rounds; a new plan gets a new world.
#[derive(Debug, Clone)]
pub struct World {
    tree: Arc<AssemblyTree>,
    pool: PartPool,
    vehicles: Vec<Vehicle>,
}

impl World {
    /// Purchases the plan, shelves it, then builds and fills `fleet_size` vehicles.
    pub fn build(
        catalog: &PartCatalog,
        tree: Arc<AssemblyTree>,
        plan: &AllocationPlan,
        fleet_size: u32,
        sampler: &mut dyn FailureSampler,
    ) -> FleetResult<Self> {
        for id in tree.preorder() {
            catalog.require(&tree.node(id).part_type)?;
        }
        let mut pool = PartPool::new();
        for (part_type, quantity) in plan.iter() {
            let blueprint = catalog.require(part_type)?;
            for _ in 0..quantity {
                pool.purchase(blueprint, sampler)?;
            }
        }
        pool.receive_all();

        let mut vehicles = Vec::with_capacity(fleet_size as usize);
        for _ in 0..fleet_size {
            let mut vehicle = Vehicle::new(Arc::clone(&tree));
            vehicle.fill(&mut pool);
            vehicle.check_serviceability(&pool);
            vehicles.push(vehicle);
        }
        Ok(Self {
            tree,
            pool,
            vehicles,
        })
    }

    /// Shared assembly tree.
    #[must_use]
    pub fn tree(&self) -> &Arc<AssemblyTree> {
        &self.tree
    }

    /// Part pool.
    #[must_use]
    pub const fn pool(&self) -> &PartPool {
        &self.pool
    }

    /// Fleet.
    #[must_use]
    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    /// Split borrow for the stepper.
    pub fn parts_mut(&mut self) -> (&mut PartPool, &mut [Vehicle]) {
        (&mut self.pool, &mut self.vehicles)
    }

    /// Vehicles passing their last check.
    #[must_use]
    pub fn serviceable_count(&self) -> usize {
        self.vehicles.iter().filter(|v| v.is_serviceable()).count()
    }
}
