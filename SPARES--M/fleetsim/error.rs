use thiserror::Error;

/// Errors surfaced by the simulation core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FleetError {
    /// A distribution or mission parameter is outside its domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Assembly rows contain no root (parent sentinel `None`).
    #[error("assembly has no root row (parent place 'None')")]
    MissingRoot,
    /// Assembly rows could not all be attached to the tree.
    #[error("assembly rows could not be attached: {}", unresolved.join(", "))]
    StructuralError {
        /// Places left over after the last attachment pass.
        unresolved: Vec<String>,
    },
    /// A part type is referenced but missing from the catalog.
    #[error("unknown part type: {0}")]
    UnknownPartType(String),
    /// Malformed catalog content.
    #[error("catalog error: {0}")]
    Catalog(String),
}

/// Result alias for core operations.
pub type FleetResult<T> = Result<T, FleetError>;
