use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{FleetError, FleetResult};

/// Immutable reliability and cost parameters shared by every instance of a part type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartBlueprint {
    /// Unique part-type name.
    pub name: String,
    /// Weibull scale in hours; infinity means no random failures.
    pub failure_hours: f64,
    /// Weibull shape, strictly positive.
    pub shape_factor: f64,
    /// Cumulative hours after which the part is scrapped.
    pub life_limit: f64,
    /// Cumulative hours after which the part goes for scheduled overhaul.
    pub depot_limit: f64,
    /// Depot turnaround in days.
    pub depot_tat: u32,
    /// Unit price.
    pub cost: f64,
    /// Container-only entry with no physical meaning of its own.
    pub placeholder: bool,
}

impl PartBlueprint {
    /// Blueprint that never fails, never expires and costs nothing.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_hours: f64::INFINITY,
            shape_factor: 1.0,
            life_limit: f64::INFINITY,
            depot_limit: f64::INFINITY,
            depot_tat: 0,
            cost: 0.0,
            placeholder: false,
        }
    }

    /// Sets the Weibull parameters.
    #[must_use]
    pub const fn with_failure(mut self, failure_hours: f64, shape_factor: f64) -> Self {
        self.failure_hours = failure_hours;
        self.shape_factor = shape_factor;
        self
    }

    /// Sets life and overhaul thresholds.
    #[must_use]
    pub const fn with_limits(mut self, life_limit: f64, depot_limit: f64) -> Self {
        self.life_limit = life_limit;
        self.depot_limit = depot_limit;
        self
    }

    /// Sets depot turnaround and unit cost.
    #[must_use]
    pub const fn with_depot(mut self, depot_tat: u32, cost: f64) -> Self {
        self.depot_tat = depot_tat;
        self.cost = cost;
        self
    }

    fn validate(&self) -> FleetResult<()> {
        if !(self.shape_factor > 0.0) {
            return Err(FleetError::InvalidParameter(format!(
                "{}: shape factor must be positive, got {}",
                self.name, self.shape_factor
            )));
        }
        if !(self.cost >= 0.0) {
            return Err(FleetError::Catalog(format!(
                "{}: cost must be non-negative, got {}",
                self.name, self.cost
            )));
        }
        Ok(())
    }
}

/// One catalog row as read from a table. Blank cells are `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogRecord {
    /// Part-type name.
    pub part_type: String,
    /// Weibull scale; blank means infinite.
    #[serde(default)]
    pub failure_hours: Option<f64>,
    /// Life limit; blank means infinite.
    #[serde(default)]
    pub life_limit: Option<f64>,
    /// Overhaul (depot) limit; blank means infinite.
    #[serde(default)]
    pub oh_limit: Option<f64>,
    /// Weibull shape; blank means 1.
    #[serde(default)]
    pub shape_factor: Option<f64>,
    /// Unit cost; blank means 0.
    #[serde(default)]
    pub cost: Option<f64>,
    /// Depot turnaround days; blank means 0.
    #[serde(default)]
    pub depot_tat: Option<f64>,
    /// Loose boolean flag.
    #[serde(default)]
    pub placeholder: Option<String>,
}

impl CatalogRecord {
    /// Applies the blank-cell defaults.
    #[must_use]
    pub fn into_blueprint(self) -> PartBlueprint {
        let placeholder = self.placeholder.as_deref().is_some_and(|raw| {
            matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "y"
            )
        });
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let depot_tat = self
            .depot_tat
            .unwrap_or(0.0)
            .max(0.0)
            .ceil()
            .min(f64::from(u32::MAX)) as u32;
        PartBlueprint {
            name: self.part_type.trim().to_string(),
            failure_hours: self.failure_hours.unwrap_or(f64::INFINITY),
            shape_factor: self.shape_factor.unwrap_or(1.0),
            life_limit: self.life_limit.unwrap_or(f64::INFINITY),
            depot_limit: self.oh_limit.unwrap_or(f64::INFINITY),
            depot_tat,
            cost: self.cost.unwrap_or(0.0),
            placeholder,
        }
    }
}

/// Registry of part blueprints in insertion ("catalog") order.
#[derive(Debug, Clone, Default)]
pub struct PartCatalog {
    blueprints: IndexMap<String, Arc<PartBlueprint>>,
}

impl PartCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a blueprint; names must be unique.
    pub fn insert(&mut self, blueprint: PartBlueprint) -> FleetResult<Arc<PartBlueprint>> {
        blueprint.validate()?;
        if self.blueprints.contains_key(&blueprint.name) {
            return Err(FleetError::Catalog(format!(
                "duplicate part type {}",
                blueprint.name
            )));
        }
        let shared = Arc::new(blueprint);
        self.blueprints
            .insert(shared.name.clone(), Arc::clone(&shared));
        Ok(shared)
    }

    /// Builds a catalog from table rows.
    pub fn from_records(records: impl IntoIterator<Item = CatalogRecord>) -> FleetResult<Self> {
        let mut catalog = Self::new();
        for record in records {
            catalog.insert(record.into_blueprint())?;
        }
        Ok(catalog)
    }

    /// Reads a headed CSV catalog.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        Self::parse_csv(&raw).with_context(|| format!("parsing catalog {}", path.display()))
    }

    /// Parses headed CSV text.
    pub fn parse_csv(raw: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(raw.as_bytes());
        let mut records = Vec::new();
        for row in reader.deserialize::<CatalogRecord>() {
            records.push(row?);
        }
        Ok(Self::from_records(records)?)
    }

    /// Looks up a blueprint by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<PartBlueprint>> {
        self.blueprints.get(name)
    }

    /// Looks up a blueprint, failing with `UnknownPartType`.
    pub fn require(&self, name: &str) -> FleetResult<&Arc<PartBlueprint>> {
        self.get(name)
            .ok_or_else(|| FleetError::UnknownPartType(name.to_string()))
    }

    /// Blueprints in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PartBlueprint>> {
        self.blueprints.values()
    }

    /// Number of part types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }
}
