#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! Fleet spares simulator – wears parts out, cycles them through depot repair,
//! refills vehicles from the spares pool and searches budget allocations.

/// Error taxonomy for the simulation core.
#[path = "../error.rs"]
pub mod error;

/// Telemetry and RNG helpers.
#[path = "../helper.rs"]
pub mod helper;

/// Weibull failure sampling and mean-life maths.
#[path = "../reliability.rs"]
pub mod reliability;

/// Part-type catalog ("blueprints").
#[path = "../catalog.rs"]
pub mod catalog;

/// Hierarchical bill of materials.
#[path = "../assembly.rs"]
pub mod assembly;

/// Physical part instances and their lifecycle.
#[path = "../part.rs"]
pub mod part;

/// Vehicle fill and serviceability.
#[path = "../vehicle.rs"]
pub mod vehicle;

/// Spares allocation plans.
#[path = "../plan.rs"]
pub mod plan;

/// Owned simulation world (pool + fleet).
#[path = "../world.rs"]
pub mod world;

/// Day/hour simulation stepper.
#[path = "../simulator.rs"]
pub mod simulator;

/// Budget-constrained allocation optimizer.
#[path = "../optimizer.rs"]
pub mod optimizer;

/// Scenario configuration files.
#[path = "../config.rs"]
pub mod config;

/// Runtime entry points.
#[path = "../main.rs"]
pub mod runtime;

pub use assembly::{AssemblyNode, AssemblyRow, AssemblyTree, NodeId};
pub use catalog::{CatalogRecord, PartBlueprint, PartCatalog};
pub use config::{MissionConfig, OptimizerConfig, ScenarioConfig, SweepConfig};
pub use error::FleetError;
pub use helper::{SimulationTelemetry, SimulationTelemetryBuilder};
pub use optimizer::{AllocationOptimizer, OptimizationResult, RoundRecord};
pub use part::{DepotReason, LifecycleEvent, Location, PartId, PartInstance, PartPool};
pub use plan::AllocationPlan;
pub use reliability::{FailureSampler, WeibullSampler};
pub use runtime::{SparesEngine, SparesEngineBuilder, SweepPoint};
pub use simulator::{MissionProfile, PartSeries, SimulationOutcome, Simulator};
pub use vehicle::Vehicle;
pub use world::World;
