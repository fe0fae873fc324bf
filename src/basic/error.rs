use thiserror::Error;

use super::equations::Variable;

pub type Result<T> = std::result::Result<T, ScError>;

/// Errors raised while building or solving admittance systems.
///
/// Every failure is fatal to the computation that raised it; lookups that may
/// legitimately miss (fault locations) are logged and skipped by the callers
/// instead of producing one of these.
#[derive(Debug, Error)]
pub enum ScError {
    #[error("branch '{0}' has reactance equal to zero")]
    ZeroReactance(String),
    #[error("branch '{0}' has impedance equal to zero")]
    ZeroImpedance(String),
    #[error("unknown variable {variable} for term {term}")]
    UnknownVariable { term: String, variable: Variable },
    #[error(
        "impedance block values {block} of node {{{bus}}} have inconsistent values: {first} and {second}"
    )]
    InconsistentImpedance {
        bus: String,
        block: &'static str,
        first: f64,
        second: f64,
    },
    #[error("biphased fault second bus {0}: not found in the extraction matrix")]
    BiphasedBusNotFound(String),
    #[error("bus {bus} has no {what} in the admittance system")]
    BusNotInSystem { bus: usize, what: String },
    #[error("{element} refers to bus {bus}, which is not in the network")]
    UnknownBus { element: String, bus: usize },
    #[error("could not update variable of bus {0}: index not found in the subsystem")]
    VariableNotInSubsystem(usize),
    #[error("bus '{0}' has no operating point, a converged load flow is required")]
    MissingOperatingPoint(String),
    #[error("matrix shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },
    #[error("linear solver failed: {0}")]
    Solver(&'static str),
    #[error("invalid parameters: {0}")]
    Json(#[from] serde_json::Error),
}
