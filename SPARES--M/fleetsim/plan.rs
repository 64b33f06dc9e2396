use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::PartCatalog,
    error::{FleetError, FleetResult},
};

/// Stock to purchase per part type.
///
/// `as_built` is the set delivered with the fleet itself; only the quantity
/// above it is charged against the spares budget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    quantities: IndexMap<String, u32>,
    #[serde(default)]
    as_built: IndexMap<String, u32>,
}

impl AllocationPlan {
    /// Empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan holding exactly one as-built set per vehicle.
    #[must_use]
    pub fn as_built(per_vehicle: &IndexMap<String, u32>, fleet_size: u32) -> Self {
        let as_built: IndexMap<String, u32> = per_vehicle
            .iter()
            .map(|(name, units)| (name.clone(), units * fleet_size))
            .collect();
        Self {
            quantities: as_built.clone(),
            as_built,
        }
    }

    /// Quantity stocked for a type.
    #[must_use]
    pub fn quantity(&self, part_type: &str) -> u32 {
        self.quantities.get(part_type).copied().unwrap_or(0)
    }

    /// Free as-built quantity for a type.
    #[must_use]
    pub fn baseline(&self, part_type: &str) -> u32 {
        self.as_built.get(part_type).copied().unwrap_or(0)
    }

    /// Sets the quantity for a type.
    pub fn set(&mut self, part_type: impl Into<String>, quantity: u32) {
        self.quantities.insert(part_type.into(), quantity);
    }

    /// Adds units of a type.
    pub fn add(&mut self, part_type: &str, units: u32) {
        *self.quantities.entry(part_type.to_string()).or_insert(0) += units;
    }

    /// Removes units of a type; `None` when that would go negative.
    pub fn remove(&mut self, part_type: &str, units: u32) -> Option<u32> {
        let slot = self.quantities.get_mut(part_type)?;
        *slot = slot.checked_sub(units)?;
        Some(*slot)
    }

    /// `(type, quantity)` in plan order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.quantities.iter().map(|(name, qty)| (name.as_str(), *qty))
    }

    /// Total units across all types.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.quantities.values().map(|qty| u64::from(*qty)).sum()
    }

    /// Σ (quantity − as-built) × unit cost.
    pub fn spares_cost(&self, catalog: &PartCatalog) -> FleetResult<f64> {
        let mut cost = 0.0;
        for (name, qty) in &self.quantities {
            let bp = catalog.require(name)?;
            cost += (f64::from(*qty) - f64::from(self.baseline(name))) * bp.cost;
        }
        Ok(cost)
    }

    /// Σ quantity × unit cost, fleet set included.
    pub fn total_cost(&self, catalog: &PartCatalog) -> FleetResult<f64> {
        self.quantities.iter().try_fold(0.0, |acc, (name, qty)| {
            Ok::<_, FleetError>(acc + f64::from(*qty) * catalog.require(name)?.cost)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PartBlueprint;
    use indexmap::indexmap;

    fn catalog() -> PartCatalog {
        let mut catalog = PartCatalog::new();
        catalog
            .insert(PartBlueprint::new("Wheel").with_depot(5, 10.0))
            .unwrap();
        catalog
            .insert(PartBlueprint::new("Engine").with_depot(10, 100.0))
            .unwrap();
        catalog
    }

    #[test]
    fn as_built_is_free() {
        let per_vehicle = indexmap! { "Wheel".to_string() => 4, "Engine".to_string() => 1 };
        let mut plan = AllocationPlan::as_built(&per_vehicle, 3);
        assert_eq!(plan.quantity("Wheel"), 12);
        assert_eq!(plan.spares_cost(&catalog()).unwrap(), 0.0);
        plan.add("Wheel", 2);
        plan.add("Engine", 1);
        assert_eq!(plan.spares_cost(&catalog()).unwrap(), 120.0);
        assert_eq!(plan.total_cost(&catalog()).unwrap(), 12.0 * 10.0 + 20.0 + 400.0);
        assert_eq!(plan.total_units(), 18);
    }

    #[test]
    fn removal_never_goes_negative() {
        let mut plan = AllocationPlan::new();
        plan.set("Wheel", 2);
        assert_eq!(plan.remove("Wheel", 3), None);
        assert_eq!(plan.quantity("Wheel"), 2);
        assert_eq!(plan.remove("Wheel", 2), Some(0));
        assert_eq!(plan.remove("Door", 1), None);
    }

    #[test]
    fn unknown_types_fail_costing() {
        let mut plan = AllocationPlan::new();
        plan.set("Door", 1);
        assert!(matches!(
            plan.spares_cost(&catalog()),
            Err(FleetError::UnknownPartType(_))
        ));
    }

    #[test]
    fn round_trips_through_json() {
        let mut plan = AllocationPlan::new();
        plan.set("Wheel", 6);
        let raw = serde_json::to_string(&plan).unwrap();
        let back: AllocationPlan = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, plan);
    }
}
