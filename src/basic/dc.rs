use nalgebra_sparse::CscMatrix;
use tracing::debug;

use super::admittance::SB;
use super::equations::{EquationKind, EquationSystem, LinearTerm, Variable, VariableKind};
use super::error::{Result, ScError};
use super::network::Network;
use super::solver::{DefaultSolver, Solve};

/// Fixes the voltage angle of the slack bus.
#[derive(Debug, Clone)]
struct BusPhaseTerm {
    variable: [Variable; 1],
}

impl LinearTerm for BusPhaseTerm {
    fn name(&self) -> String {
        format!("dc_phi[{}]", self.variable[0].num)
    }

    fn variables(&self) -> &[Variable] {
        &self.variable
    }

    fn coefficient(&self, variable: &Variable) -> Result<f64> {
        if *variable == self.variable[0] {
            Ok(1.0)
        } else {
            Err(ScError::UnknownVariable {
                term: self.name(),
                variable: *variable,
            })
        }
    }
}

/// Active power flowing into a closed branch at one side (MW), over `[ph1, ph2]`.
///
/// Side 1: `p1 = power * (ph1 - ph2 + a1)`; side 2: `p2 = power * (ph2 - ph1 - a1)`.
#[derive(Debug, Clone)]
struct DcFlowTerm {
    branch_id: String,
    side1: bool,
    variables: [Variable; 2],
    power: f64,
    a1: f64,
}

impl LinearTerm for DcFlowTerm {
    fn name(&self) -> String {
        let side = if self.side1 { 1 } else { 2 };
        format!("dc_p{}[{}]", side, self.branch_id)
    }

    fn variables(&self) -> &[Variable] {
        &self.variables
    }

    fn coefficient(&self, variable: &Variable) -> Result<f64> {
        let sign = if self.side1 { 1.0 } else { -1.0 };
        if *variable == self.variables[0] {
            Ok(sign * self.power)
        } else if *variable == self.variables[1] {
            Ok(-sign * self.power)
        } else {
            Err(ScError::UnknownVariable {
                term: self.name(),
                variable: *variable,
            })
        }
    }

    fn constant(&self) -> f64 {
        if self.side1 {
            self.power * self.a1
        } else {
            -self.power * self.a1
        }
    }
}

/// Linearized active power balance: one angle per bus, the slack angle fixed to zero.
#[derive(Debug)]
pub struct DcEquationSystem {
    system: EquationSystem,
    slack: usize,
}

impl DcEquationSystem {
    pub fn build(network: &Network) -> Result<Self> {
        let slack = network.slack_bus();
        let mut system = EquationSystem::new();
        let phi = system.variable(slack, VariableKind::BusPhi);
        system.add_term(slack, EquationKind::BusPhi, Box::new(BusPhaseTerm { variable: [phi] }));

        for branch in &network.branches {
            let Some((bus1, bus2)) = branch.connected_buses() else {
                continue;
            };
            if branch.pi.x == 0.0 {
                return Err(ScError::ZeroReactance(branch.id.clone()));
            }
            let power = SB * branch.pi.rho / branch.pi.x;
            let a1 = branch.pi.alpha.to_radians();
            let variables = [
                system.variable(bus1, VariableKind::BusPhi),
                system.variable(bus2, VariableKind::BusPhi),
            ];
            for (bus, side1) in [(bus1, true), (bus2, false)] {
                if bus == slack {
                    continue;
                }
                let term = DcFlowTerm {
                    branch_id: branch.id.clone(),
                    side1,
                    variables,
                    power,
                    a1,
                };
                system.add_term(bus, EquationKind::BusP, Box::new(term));
            }
        }
        debug!(
            variables = system.variable_count(),
            equations = system.equation_count(),
            "dc equation system built"
        );
        Ok(Self { system, slack })
    }

    pub fn system(&self) -> &EquationSystem {
        &self.system
    }

    pub fn slack_bus(&self) -> usize {
        self.slack
    }

    /// MW per radian, rows = equations, columns = bus angles.
    pub fn jacobian(&self) -> Result<CscMatrix<f64>> {
        self.system.jacobian()
    }

    /// Right-hand side in equation order: net scheduled injection (MW) minus the
    /// phase-shift constants, zero for the slack angle.
    pub fn targets(&self, network: &Network) -> Result<Vec<f64>> {
        self.system
            .sorted_equations()
            .map(|eq| match eq.id.kind {
                EquationKind::BusP => {
                    let bus = network.bus(eq.id.num)?;
                    let (gen_p, _) = network.generation_target(eq.id.num);
                    let constants: f64 = eq.terms().iter().map(|t| t.constant()).sum();
                    Ok(SB * (gen_p - bus.load_p) - constants)
                }
                _ => Ok(0.0),
            })
            .collect()
    }

    /// Bus angles (radians) in variable order.
    pub fn solve(&self, network: &Network) -> Result<Vec<f64>> {
        let j = self.jacobian()?;
        let n = self.system.variable_count();
        if j.nrows() != n {
            return Err(ScError::ShapeMismatch {
                expected: format!("{n} equations"),
                got: format!("{} equations", j.nrows()),
            });
        }
        let mut x = self.targets(network)?;
        let mut solver = DefaultSolver::default();
        solver
            .solve(j.col_offsets(), j.row_indices(), j.values(), &mut x, n)
            .map_err(ScError::Solver)?;
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;
    use crate::testcases::eurostag_network;

    #[test]
    fn test_eurostag_jacobian_and_angles() {
        let net = eurostag_network();
        let dc = DcEquationSystem::build(&net).unwrap();
        let j = DMatrix::from(&dc.jacobian().unwrap());
        assert_eq!(j.shape(), (4, 4));
        assert!((j[(1, 1)] - 22439.668433814884).abs() < 1e-6, "J(1,1) = {}", j[(1, 1)]);
        assert!((j[(1, 0)] + 13688.153282299732).abs() < 1e-6, "J(1,0) = {}", j[(1, 0)]);
        assert!((j[(1, 2)] + 8751.515151515152).abs() < 1e-6, "J(1,2) = {}", j[(1, 2)]);
        assert_eq!(j[(0, 0)], 1.0);

        let targets = dc.targets(&net).unwrap();
        assert_eq!(targets[0], 0.0);
        assert!((targets[3] + 600.0).abs() < 1e-9);

        let x = dc.solve(&net).unwrap();
        assert!(x[0].abs() < 1e-12);
        assert!((x[1] + 0.04383352433493455).abs() < 1e-9, "dx = {x:?}");
        assert!((x[2] + 0.11239308112163815).abs() < 1e-9, "dx = {x:?}");

        // the solution balances every bus
        let mismatch = dc.system().eval(&x).unwrap();
        for (m, t) in mismatch.iter().zip(&targets) {
            assert!((m - t).abs() < 1e-6, "{mismatch:?} vs {targets:?}");
        }
    }

    #[test]
    fn test_solvable_after_line_disconnection() {
        let mut net = eurostag_network();
        assert!(net.disconnect_branch("NHV1_NHV2_1"));
        assert!(!net.disconnect_branch("UNKNOWN"));
        let dc = DcEquationSystem::build(&net).unwrap();
        let x = dc.solve(&net).unwrap();
        let single_line = 100.0 * 1444.0 / 33.0;
        assert!((x[2] - x[1] + 600.0 / single_line).abs() < 1e-9, "dx = {x:?}");
    }

    #[test]
    fn test_targets_of_foreign_network_fail() {
        let net = eurostag_network();
        let dc = DcEquationSystem::build(&net).unwrap();
        let mut smaller = net.clone();
        smaller.buses.truncate(2);
        let err = dc.targets(&smaller).unwrap_err();
        assert!(matches!(err, ScError::UnknownBus { bus: 2, .. }), "{err}");
    }

    #[test]
    fn test_phase_shift_constant() {
        let mut net = eurostag_network();
        net.branches[0].pi.alpha = 2.0;
        let dc = DcEquationSystem::build(&net).unwrap();
        let eq = dc.system().equation(1, EquationKind::BusP).unwrap();
        let shifter = eq.terms().iter().find(|t| t.name() == "dc_p2[NGEN_NHV1]").unwrap();
        let expected = -13688.153282299732 * 2f64.to_radians();
        assert!((shifter.constant() - expected).abs() < 1e-6);
    }
}
