mod basic;
pub mod testcases;
pub mod prelude {
    use crate::basic;
    pub use basic::*;

    pub use admittance::{
        AdmittanceEquationSystem, AdmittanceMatrix, AdmittanceParameters, AdmittancePeriodType, AdmittanceType,
        AdmittanceVoltageProfileType,
    };
    pub use balanced::{BalancedFaultEngine, BalancedFaultParameters, ShortCircuitResult};
    pub use dc::DcEquationSystem;
    pub use error::{Result, ScError};
    pub use homopolar::{HomopolarParameters, LegConnectionType, MissingMagnetizing};
    pub use network::{Branch, BranchKind, Bus, Generator, Network, OperatingPoint, PiModel, Shunt};
    pub use reduction::{
        EquivalentBranch, EquivalentLoad, EquivalentShunt, ReductionEngine, ReductionParameters, ReductionResults,
        ReductionType,
    };
    pub use thevenin::{
        FaultLocation, LinearResolution, LinearResolutionOutput, LinearResolutionParameters, ResolvedFault,
        ShortCircuitFault, TheveninResult,
    };
    pub use unbalanced::{
        BiphasedCommonSupportType, CommonSupportFault, Fortescue, Phase, UnbalancedFault, UnbalancedFaultEngine,
        UnbalancedFaultKind, UnbalancedFaultParameters, UnbalancedFaultResult, UnbalancedFaultType,
    };
}
