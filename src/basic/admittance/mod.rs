use derive_more::Display;
use serde::{Deserialize, Serialize};

mod branch;
mod matrix;
mod system;

pub use branch::branch_admittance_block;
pub use matrix::AdmittanceMatrix;
pub use system::{AdmittanceEquationSystem, AdmittanceParameters};

/// Base power (MVA).
pub const SB: f64 = 100.0;

/// Branches with both ends connected and a reactance below this value are not modeled.
pub const LOW_IMPEDANCE_THRESHOLD: f64 = 1e-8;

/// What the admittance matrix models besides the branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum AdmittanceType {
    /// Branches only.
    AdmInj,
    /// Branches and physical shunts.
    AdmShunt,
    /// Loads and generators folded into shunt admittances at their operating point.
    AdmAdmit,
    /// Direct-sequence network seen from the faults: machines by their internal impedance.
    #[default]
    AdmThevenin,
    /// Zero-sequence counterpart of `AdmThevenin`.
    AdmTheveninHomopolar,
}

/// Source of the bus voltages used to fold injections into admittances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum AdmittanceVoltageProfileType {
    /// Operating point of the load flow.
    Calculated,
    /// Flat profile, 1 p.u. and 0 degrees.
    #[default]
    Nominal,
}

/// Machine reactances used in Thevenin modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum AdmittancePeriodType {
    #[default]
    SubTransient,
    Transient,
    /// Uses the transient values.
    SteadyState,
}
