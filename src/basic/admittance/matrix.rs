use std::collections::{BTreeMap, HashMap};

use nalgebra::{DMatrix, DVector, Matrix2};
use nalgebra_sparse::{CooMatrix, CscMatrix};

use super::AdmittanceVoltageProfileType;
use crate::basic::equations::{EquationId, EquationKind, EquationSystem, Variable, VariableKind};
use crate::basic::error::{Result, ScError};
use crate::basic::network::Network;
use crate::basic::solver::{DefaultSolver, Solve};

/// Admittance matrix of an equation system, or of the part of it selected by row and
/// column buses.
///
/// The stored matrix is the transpose of `Y`: its rows are the variables and its columns
/// the equations. Solves work on `Y` itself, factorized once and kept until [`reset`].
///
/// [`reset`]: AdmittanceMatrix::reset
pub struct AdmittanceMatrix<S: Solve = DefaultSolver> {
    matrix: CscMatrix<f64>,
    variables: Vec<Variable>,
    var_to_col: HashMap<Variable, usize>,
    eq_to_row: HashMap<EquationId, usize>,
    is_sub_admittance: bool,
    solver: S,
    factorized: bool,
}

impl AdmittanceMatrix<DefaultSolver> {
    /// Full admittance matrix of `sys`.
    pub fn new(sys: &EquationSystem) -> Result<Self> {
        Self::with_solver(sys, &[], &[], DefaultSolver::default())
    }

    /// Rows limited to the equations of `row_buses`, columns to the variables of `col_buses`,
    /// both renumbered densely in sorted order.
    pub fn sub_admittance(sys: &EquationSystem, row_buses: &[usize], col_buses: &[usize]) -> Result<Self> {
        Self::with_solver(sys, row_buses, col_buses, DefaultSolver::default())
    }
}

impl<S: Solve> AdmittanceMatrix<S> {
    /// Builds with an explicit solver; empty bus lists select the full system.
    pub fn with_solver(sys: &EquationSystem, row_buses: &[usize], col_buses: &[usize], solver: S) -> Result<Self> {
        let is_sub_admittance = !row_buses.is_empty() || !col_buses.is_empty();

        let eq_to_row: HashMap<EquationId, usize> = sys
            .sorted_equations()
            .map(|eq| eq.id)
            .filter(|id| !is_sub_admittance || row_buses.contains(&id.num))
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();
        let variables: Vec<Variable> = sys.sorted_variables().copied().collect();
        let var_to_col: HashMap<Variable, usize> = variables
            .iter()
            .filter(|v| !is_sub_admittance || col_buses.contains(&v.num))
            .enumerate()
            .map(|(i, v)| (*v, i))
            .collect();

        let mut coo = CooMatrix::new(var_to_col.len(), eq_to_row.len());
        for eq in sys.sorted_equations() {
            let Some(&y_row) = eq_to_row.get(&eq.id) else {
                continue;
            };
            for (var, terms) in eq.terms_by_variable() {
                let Some(&y_col) = var_to_col.get(&var) else {
                    continue;
                };
                for term in terms {
                    coo.push(y_col, y_row, term.coefficient(&var)?);
                }
            }
        }

        Ok(Self {
            matrix: CscMatrix::from(&coo),
            variables,
            var_to_col,
            eq_to_row,
            is_sub_admittance,
            solver,
            factorized: false,
        })
    }

    /// Number of rows of `Y` (equations in scope).
    pub fn row_count(&self) -> usize {
        self.eq_to_row.len()
    }

    /// Number of columns of `Y` (variables in scope).
    pub fn col_count(&self) -> usize {
        self.var_to_col.len()
    }

    pub fn is_sub_admittance(&self) -> bool {
        self.is_sub_admittance
    }

    /// Row of `Y` holding equation `kind` of bus `num`.
    pub fn row_bus(&self, num: usize, kind: EquationKind) -> Result<usize> {
        self.eq_to_row
            .get(&EquationId { num, kind })
            .copied()
            .ok_or_else(|| ScError::BusNotInSystem {
                bus: num,
                what: format!("{kind} equation"),
            })
    }

    /// Column of `Y` holding variable `kind` of bus `num`.
    pub fn col_bus(&self, num: usize, kind: VariableKind) -> Result<usize> {
        self.var_to_col
            .get(&Variable { num, kind })
            .copied()
            .ok_or_else(|| ScError::BusNotInSystem {
                bus: num,
                what: format!("{kind} variable"),
            })
    }

    /// Equations in row order.
    pub fn row_equations(&self) -> Vec<EquationId> {
        let mut rows: Vec<(usize, EquationId)> = self.eq_to_row.iter().map(|(id, &r)| (r, *id)).collect();
        rows.sort_unstable_by_key(|(r, _)| *r);
        rows.into_iter().map(|(_, id)| id).collect()
    }

    /// Variables in column order.
    pub fn col_variables(&self) -> Vec<Variable> {
        let mut cols: Vec<(usize, Variable)> = self.var_to_col.iter().map(|(v, &c)| (c, *v)).collect();
        cols.sort_unstable_by_key(|(c, _)| *c);
        cols.into_iter().map(|(_, v)| v).collect()
    }

    /// True when both current equations and both voltage variables of bus `num` are in scope.
    pub fn contains_bus(&self, num: usize) -> bool {
        self.row_bus(num, EquationKind::BusYr).is_ok()
            && self.row_bus(num, EquationKind::BusYi).is_ok()
            && self.col_bus(num, VariableKind::BusVr).is_ok()
            && self.col_bus(num, VariableKind::BusVi).is_ok()
    }

    /// Entry of the stored (transposed) matrix: `(variable column, equation row)`.
    pub fn get(&self, var_col: usize, eq_row: usize) -> f64 {
        self.matrix
            .get_entry(var_col, eq_row)
            .map_or(0.0, |e| e.into_value())
    }

    /// The stored matrix, rows = variables, columns = equations.
    pub fn matrix(&self) -> &CscMatrix<f64> {
        &self.matrix
    }

    /// `Y` as a dense matrix.
    pub fn transpose_dense(&self) -> DMatrix<f64> {
        DMatrix::from(&self.matrix).transpose()
    }

    /// `Y·x`.
    pub fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>> {
        if x.len() != self.col_count() {
            return Err(ScError::ShapeMismatch {
                expected: format!("{} values", self.col_count()),
                got: format!("{} values", x.len()),
            });
        }
        let mut y = DVector::zeros(self.row_count());
        for (var_col, eq_row, v) in self.matrix.triplet_iter() {
            y[eq_row] += v * x[var_col];
        }
        Ok(y)
    }

    /// Voltage state `(Vr, Vi)` of the variables in scope, from the operating point or a
    /// flat profile.
    pub fn voltage_vector(&self, network: &Network, profile: AdmittanceVoltageProfileType) -> Result<DVector<f64>> {
        let mut x = DVector::zeros(self.col_count());
        for (var, &col) in &self.var_to_col {
            let bus = network.bus(var.num)?;
            let (v, angle) = match profile {
                AdmittanceVoltageProfileType::Nominal => (1.0, 0.0),
                AdmittanceVoltageProfileType::Calculated => {
                    let op = bus
                        .operating_point
                        .ok_or_else(|| ScError::MissingOperatingPoint(bus.id.clone()))?;
                    (op.v, op.angle.to_radians())
                }
            };
            x[col] = match var.kind {
                VariableKind::BusVr => v * angle.cos(),
                VariableKind::BusVi => v * angle.sin(),
                VariableKind::BusPhi => angle,
            };
        }
        Ok(x)
    }

    /// Solves `Y·x = b` in place for every column of `b`.
    pub fn solve_transposed(&mut self, b: &mut DMatrix<f64>) -> Result<()> {
        if b.nrows() != self.row_count() {
            return Err(ScError::ShapeMismatch {
                expected: format!("{} rows", self.row_count()),
                got: format!("{} rows", b.nrows()),
            });
        }
        self.ensure_factorized()?;
        let nrhs = b.ncols();
        self.solver
            .solve_factorized(b.as_mut_slice(), nrhs)
            .map_err(ScError::Solver)
    }

    pub fn solve_transposed_vector(&mut self, b: &mut DVector<f64>) -> Result<()> {
        if b.len() != self.row_count() {
            return Err(ScError::ShapeMismatch {
                expected: format!("{} rows", self.row_count()),
                got: format!("{} rows", b.len()),
            });
        }
        self.ensure_factorized()?;
        self.solver
            .solve_factorized(b.as_mut_slice(), 1)
            .map_err(ScError::Solver)
    }

    /// Drops the cached factorization.
    pub fn reset(&mut self) {
        self.solver.reset();
        self.factorized = false;
    }

    fn ensure_factorized(&mut self) -> Result<()> {
        if self.factorized {
            return Ok(());
        }
        let n = self.row_count();
        if n == 0 {
            return Err(ScError::ShapeMismatch {
                expected: "non-empty admittance matrix".to_string(),
                got: "0x0".to_string(),
            });
        }
        if self.col_count() != n {
            return Err(ScError::ShapeMismatch {
                expected: format!("square {n}x{n} admittance matrix"),
                got: format!("{n}x{}", self.col_count()),
            });
        }
        let y = self.matrix.transpose();
        self.solver
            .factorize(y.col_offsets(), y.row_indices(), y.values(), n)
            .map_err(ScError::Solver)?;
        self.factorized = true;
        Ok(())
    }

    /// Per-bus 2x2 blocks `[[Vr(2k), Vr(2k+1)], [Vi(2k), Vi(2k+1)]]` read from a solution
    /// with two columns per fault.
    pub fn delta_v(&self, m: &DMatrix<f64>, k: usize) -> Result<BTreeMap<usize, Matrix2<f64>>> {
        let mut blocks: BTreeMap<usize, Matrix2<f64>> = BTreeMap::new();
        for var in &self.variables {
            let Some(&row) = self.var_to_col.get(var) else {
                return Err(ScError::VariableNotInSubsystem(var.num));
            };
            let r = match var.kind {
                VariableKind::BusVr => 0,
                VariableKind::BusVi => 1,
                VariableKind::BusPhi => continue,
            };
            let block = blocks.entry(var.num).or_insert_with(Matrix2::zeros);
            block[(r, 0)] += m[(row, 2 * k)];
            block[(r, 1)] += m[(row, 2 * k + 1)];
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::admittance::{AdmittanceEquationSystem, AdmittanceParameters, AdmittanceType};
    use crate::testcases::two_bus_network;

    fn thevenin_system() -> EquationSystem {
        let params = AdmittanceParameters {
            admittance_type: AdmittanceType::AdmThevenin,
            ..Default::default()
        };
        AdmittanceEquationSystem::build(&two_bus_network(), &params).unwrap().0
    }

    #[test]
    fn test_stores_transposed_coefficients() {
        let sys = thevenin_system();
        let adm = AdmittanceMatrix::new(&sys).unwrap();
        assert_eq!(adm.row_count(), 4);
        assert_eq!(adm.col_count(), 4);
        for eq in sys.sorted_equations() {
            let row = sys.equation_row(&eq.id).unwrap();
            for (var, terms) in eq.terms_by_variable() {
                let col = sys.variable_column(&var).unwrap();
                let expected: f64 = terms.iter().map(|t| t.coefficient(&var).unwrap()).sum();
                assert!(
                    (adm.get(col, row) - expected).abs() < 1e-12,
                    "{} wrt {var}: {} != {expected}",
                    eq.id,
                    adm.get(col, row)
                );
            }
        }
        let y = adm.transpose_dense();
        assert_eq!(y[(0, 2)], adm.get(2, 0));
    }

    #[test]
    fn test_solve_matches_dense_inverse() {
        let sys = thevenin_system();
        let mut adm = AdmittanceMatrix::new(&sys).unwrap();
        let y = adm.transpose_dense();
        let mut b = DMatrix::identity(4, 4);
        adm.solve_transposed(&mut b).unwrap();
        let product = &y * &b;
        assert!((product - DMatrix::identity(4, 4)).abs().max() < 1e-9);

        // a second solve reuses the factorization
        let x = DVector::from_vec(vec![1.0, 0.0, 0.9, -0.05]);
        let mut rhs = adm.apply(&x).unwrap();
        adm.solve_transposed_vector(&mut rhs).unwrap();
        assert!((rhs - x).abs().max() < 1e-9);
    }

    #[test]
    fn test_bus_accessors() {
        let sys = thevenin_system();
        let adm = AdmittanceMatrix::new(&sys).unwrap();
        assert_eq!(adm.row_bus(1, EquationKind::BusYi).unwrap(), 3);
        assert_eq!(adm.col_bus(0, VariableKind::BusVr).unwrap(), 0);
        let err = adm.col_bus(7, VariableKind::BusVr).unwrap_err();
        assert!(matches!(err, ScError::BusNotInSystem { bus: 7, .. }), "{err}");
        assert!(adm.contains_bus(1));
        assert!(!adm.contains_bus(7));
    }

    #[test]
    fn test_sub_admittance() {
        let sys = thevenin_system();
        let sub = AdmittanceMatrix::sub_admittance(&sys, &[1], &[0]).unwrap();
        assert_eq!(sub.row_count(), 2);
        assert_eq!(sub.col_count(), 2);
        let full = AdmittanceMatrix::new(&sys).unwrap();
        // Y(bus 1 rows, bus 0 columns)
        assert_eq!(sub.get(0, 0), full.get(0, 2));
        assert_eq!(sub.get(1, 1), full.get(1, 3));

        assert_eq!(
            sub.row_equations(),
            vec![
                EquationId { num: 1, kind: EquationKind::BusYr },
                EquationId { num: 1, kind: EquationKind::BusYi }
            ]
        );
        assert!(sub.col_variables().iter().all(|v| v.num == 0));

        let m = DMatrix::zeros(2, 2);
        let err = sub.delta_v(&m, 0).unwrap_err();
        assert!(matches!(err, ScError::VariableNotInSubsystem(_)), "{err}");
    }

    #[test]
    fn test_delta_v_blocks() {
        let sys = thevenin_system();
        let adm = AdmittanceMatrix::new(&sys).unwrap();
        let m = DMatrix::from_fn(4, 4, |r, c| (10 * r + c) as f64);
        let blocks = adm.delta_v(&m, 1).unwrap();
        assert_eq!(blocks[&1], Matrix2::new(22.0, 23.0, 32.0, 33.0));
    }

    #[test]
    fn test_empty_system_solve_is_an_error() {
        let sys = EquationSystem::default();
        let mut adm = AdmittanceMatrix::new(&sys).unwrap();
        assert_eq!(adm.row_count(), 0);
        let mut b = DMatrix::zeros(0, 0);
        let err = adm.solve_transposed(&mut b).unwrap_err();
        assert!(matches!(err, ScError::ShapeMismatch { .. }), "{err}");
    }

    #[test]
    fn test_voltage_vector_unknown_bus() {
        let sys = thevenin_system();
        let adm = AdmittanceMatrix::new(&sys).unwrap();
        let mut net = two_bus_network();
        net.buses.truncate(1);
        let err = adm
            .voltage_vector(&net, AdmittanceVoltageProfileType::Nominal)
            .unwrap_err();
        assert!(matches!(err, ScError::UnknownBus { bus: 1, .. }), "{err}");
    }

    #[test]
    fn test_voltage_vector_nominal() {
        let sys = thevenin_system();
        let adm = AdmittanceMatrix::new(&sys).unwrap();
        let x = adm
            .voltage_vector(&two_bus_network(), AdmittanceVoltageProfileType::Nominal)
            .unwrap();
        assert_eq!(x.as_slice(), &[1.0, 0.0, 1.0, 0.0]);
    }
}
