use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde_json::Value;
use shared_logging::{JsonLogger, LevelFilter, LogLevel, LogRecord};
use uuid::Uuid;

/// Configures where simulation records go and which run they belong to.
pub struct SimulationTelemetryBuilder {
    component: String,
    log_path: Option<PathBuf>,
    filter: LevelFilter,
    run_id: Option<Uuid>,
}

impl SimulationTelemetryBuilder {
    /// Starts a builder for a component label such as `"spares"`.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            log_path: None,
            filter: LevelFilter::default(),
            run_id: None,
        }
    }

    /// JSON-lines file receiving the records. Without one, telemetry is a no-op.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Minimum level persisted to the file.
    #[must_use]
    pub const fn file_level(mut self, level: LogLevel) -> Self {
        self.filter.file = level;
        self
    }

    /// Minimum level echoed to stderr; `None` silences the console.
    #[must_use]
    pub const fn console_level(mut self, level: Option<LogLevel>) -> Self {
        self.filter.console = level;
        self
    }

    /// Run id stamped on every record; a fresh v4 id otherwise.
    #[must_use]
    pub const fn run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Opens the sink.
    pub fn build(self) -> Result<SimulationTelemetry> {
        let sink = match self.log_path {
            Some(path) => Some(Arc::new(JsonLogger::with_filter(path, self.filter)?)),
            None => None,
        };
        Ok(SimulationTelemetry {
            sink,
            component: Arc::from(self.component),
            run_id: self.run_id.unwrap_or_else(Uuid::new_v4),
        })
    }
}

/// Cheap-to-clone handle onto one run's log sink.
///
/// Scoped copies share the sink and run id but carry their own component label.
#[derive(Clone)]
pub struct SimulationTelemetry {
    sink: Option<Arc<JsonLogger>>,
    component: Arc<str>,
    run_id: Uuid,
}

impl fmt::Debug for SimulationTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationTelemetry")
            .field("component", &self.component)
            .field("run_id", &self.run_id)
            .field("sink", &self.sink.as_ref().map(|sink| sink.path().to_path_buf()))
            .finish()
    }
}

impl SimulationTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(component: impl Into<String>) -> SimulationTelemetryBuilder {
        SimulationTelemetryBuilder::new(component)
    }

    /// Same sink and run, labelled `parent/component`.
    #[must_use]
    pub fn scoped(&self, component: &str) -> Self {
        Self {
            sink: self.sink.clone(),
            component: Arc::from(format!("{}/{component}", self.component)),
            run_id: self.run_id,
        }
    }

    /// Component label written on each record.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Run this handle reports for.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// True when a record at `level` would be written anywhere.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        self.sink.as_ref().is_some_and(|sink| sink.enabled(level))
    }

    /// Writes one record. Object metadata is kept; `run_id` is added unless present.
    pub fn log(&self, level: LogLevel, event: &str, metadata: Value) -> Result<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let mut record = LogRecord::new(self.component.as_ref(), level, event);
        match metadata {
            Value::Object(map) => record.metadata = map,
            Value::Null => {}
            other => {
                record.metadata.insert("value".into(), other);
            }
        }
        record
            .metadata
            .entry("run_id")
            .or_insert_with(|| Value::String(self.run_id.to_string()));
        sink.log(&record)
    }
}

/// Logs through an optional telemetry handle, ignoring sink failures.
pub fn trace(telemetry: Option<&SimulationTelemetry>, level: LogLevel, event: &str, metadata: Value) {
    if let Some(tel) = telemetry {
        let _ = tel.log(level, event, metadata);
    }
}

/// Fresh seed for runs that do not pin one.
#[must_use]
pub fn random_seed() -> u64 {
    rand::thread_rng().gen()
}

/// Reproducible generator for a seed.
#[must_use]
pub fn seeded_rng(seed: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn records_carry_run_id_and_component() {
        let tmp = tempdir().unwrap();
        let log_path = tmp.path().join("sim.log");
        let run_id = Uuid::new_v4();
        let telemetry = SimulationTelemetry::builder("spares")
            .log_path(&log_path)
            .console_level(None)
            .run_id(run_id)
            .build()
            .unwrap();
        let simulator = telemetry.scoped("simulator");
        assert_eq!(simulator.component(), "spares/simulator");
        assert_eq!(simulator.run_id(), run_id);
        simulator
            .log(LogLevel::Info, "simulation.run.start", json!({ "seed": 1 }))
            .unwrap();

        let line = fs::read_to_string(&log_path).unwrap();
        let record: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(record["module"], "spares/simulator");
        assert_eq!(record["message"], "simulation.run.start");
        assert_eq!(record["metadata"]["run_id"], run_id.to_string());
        assert_eq!(record["metadata"]["seed"], 1);
        assert!(telemetry.enabled(LogLevel::Debug));
    }

    #[test]
    fn file_level_filters_records() {
        let tmp = tempdir().unwrap();
        let log_path = tmp.path().join("sim.log");
        let telemetry = SimulationTelemetry::builder("spares")
            .log_path(&log_path)
            .file_level(LogLevel::Info)
            .console_level(None)
            .build()
            .unwrap();
        assert!(!telemetry.enabled(LogLevel::Debug));
        trace(Some(&telemetry), LogLevel::Debug, "simulation.day", json!({ "day": 0 }));
        trace(Some(&telemetry), LogLevel::Info, "world.built", Value::Null);
        let written = fs::read_to_string(&log_path).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert!(written.contains("world.built"));
    }

    #[test]
    fn telemetry_without_path_is_silent() {
        let telemetry = SimulationTelemetry::builder("quiet").build().unwrap();
        assert!(!telemetry.enabled(LogLevel::Error));
        telemetry.log(LogLevel::Error, "nothing", json!({})).unwrap();
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let a: u64 = seeded_rng(7).gen();
        let b: u64 = seeded_rng(7).gen();
        assert_eq!(a, b);
    }
}
