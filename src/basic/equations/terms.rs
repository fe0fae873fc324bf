use derive_more::Display;
use nalgebra::Matrix4;

use super::{LinearTerm, Variable};
use crate::basic::error::{Result, ScError};

/// Which side and axis of a branch a term models.
///
/// Each side maps to one row of the branch 4x4 admittance block over `(V1r, V1i, V2r, V2i)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BranchSide {
    /// Real current injection at side 1.
    X1,
    /// Imaginary current injection at side 1.
    Y1,
    /// Real current injection at side 2.
    X2,
    /// Imaginary current injection at side 2.
    Y2,
}

impl BranchSide {
    pub const ALL: [BranchSide; 4] = [BranchSide::X1, BranchSide::Y1, BranchSide::X2, BranchSide::Y2];

    pub fn block_row(&self) -> usize {
        match self {
            BranchSide::X1 => 0,
            BranchSide::Y1 => 1,
            BranchSide::X2 => 2,
            BranchSide::Y2 => 3,
        }
    }
}

/// Linear current injection of a branch at one of its ends.
///
/// Variables are `[v1r, v1i, v2r, v2i]`; the coefficients are frozen at construction.
#[derive(Debug, Clone)]
pub struct BranchTerm {
    branch_id: String,
    side: BranchSide,
    variables: [Variable; 4],
    coefficients: [f64; 4],
}

impl BranchTerm {
    /// Builds the term from the row of `block` matching `side`.
    pub fn new(branch_id: &str, side: BranchSide, variables: [Variable; 4], block: &Matrix4<f64>) -> Self {
        let row = side.block_row();
        Self {
            branch_id: branch_id.to_string(),
            side,
            variables,
            coefficients: [block[(row, 0)], block[(row, 1)], block[(row, 2)], block[(row, 3)]],
        }
    }
}

impl LinearTerm for BranchTerm {
    fn name(&self) -> String {
        format!("adm_{}[{}]", self.side, self.branch_id)
    }

    fn variables(&self) -> &[Variable] {
        &self.variables
    }

    fn coefficient(&self, variable: &Variable) -> Result<f64> {
        self.variables
            .iter()
            .position(|v| v == variable)
            .map(|i| self.coefficients[i])
            .ok_or_else(|| ScError::UnknownVariable {
                term: self.name(),
                variable: *variable,
            })
    }
}

/// Shunt admittance `g + jb` at a bus, over `[vr, vi]`.
///
/// Real row: `I_r = g*vr - b*vi`; imaginary row: `I_i = b*vr + g*vi`.
#[derive(Debug, Clone)]
pub struct ShuntTerm {
    real: bool,
    variables: [Variable; 2],
    coefficients: [f64; 2],
}

impl ShuntTerm {
    pub fn real(g: f64, b: f64, vr: Variable, vi: Variable) -> Self {
        Self {
            real: true,
            variables: [vr, vi],
            coefficients: [g, -b],
        }
    }

    pub fn imaginary(g: f64, b: f64, vr: Variable, vi: Variable) -> Self {
        Self {
            real: false,
            variables: [vr, vi],
            coefficients: [b, g],
        }
    }
}

impl LinearTerm for ShuntTerm {
    fn name(&self) -> String {
        let axis = if self.real { "r" } else { "i" };
        format!("adm_shunt_{}[{}]", axis, self.variables[0].num)
    }

    fn variables(&self) -> &[Variable] {
        &self.variables
    }

    fn coefficient(&self, variable: &Variable) -> Result<f64> {
        self.variables
            .iter()
            .position(|v| v == variable)
            .map(|i| self.coefficients[i])
            .ok_or_else(|| ScError::UnknownVariable {
                term: self.name(),
                variable: *variable,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::equations::VariableKind;

    fn var(num: usize, kind: VariableKind) -> Variable {
        Variable { num, kind }
    }

    #[test]
    fn test_branch_term_reads_block_row() {
        let block = Matrix4::from_fn(|r, c| (10 * r + c) as f64);
        let vars = [
            var(0, VariableKind::BusVr),
            var(0, VariableKind::BusVi),
            var(1, VariableKind::BusVr),
            var(1, VariableKind::BusVi),
        ];
        let y2 = BranchTerm::new("L1", BranchSide::Y2, vars, &block);
        assert_eq!(y2.coefficient(&vars[0]).unwrap(), 30.0);
        assert_eq!(y2.coefficient(&vars[3]).unwrap(), 33.0);
        assert_eq!(y2.name(), "adm_Y2[L1]");
    }

    #[test]
    fn test_unknown_variable() {
        let vr = var(0, VariableKind::BusVr);
        let vi = var(0, VariableKind::BusVi);
        let t = ShuntTerm::real(1.0, 2.0, vr, vi);
        assert_eq!(t.coefficient(&vr).unwrap(), 1.0);
        assert_eq!(t.coefficient(&vi).unwrap(), -2.0);
        let err = t.coefficient(&var(5, VariableKind::BusVr)).unwrap_err();
        assert!(matches!(err, ScError::UnknownVariable { .. }), "{err}");
        assert!(err.to_string().contains("unknown variable"));
    }
}
