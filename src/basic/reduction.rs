use std::collections::{BTreeMap, BTreeSet};

use derive_more::Display;
use nalgebra::{DMatrix, DVector, Matrix2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::admittance::{
    AdmittanceEquationSystem, AdmittanceMatrix, AdmittanceParameters, AdmittanceType, AdmittanceVoltageProfileType,
    LOW_IMPEDANCE_THRESHOLD, branch_admittance_block,
};
use super::equations::{EquationId, EquationKind, Variable, VariableKind};
use super::error::{Result, ScError};
use super::homopolar::HomopolarParameters;
use super::network::Network;

const BLOCK_EPSILON: f64 = 1e-5;
const SHUNT_EPSILON: f64 = 1e-6;
const LOAD_EPSILON: f64 = 1e-5;

/// How injections of the external zone enter the admittance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum ReductionType {
    /// Branches only, injections are carried by the equivalent currents.
    #[default]
    WardInj,
    /// Branches and physical shunts.
    WardShunt,
    /// Loads and generators folded into admittances.
    WardAdmit,
}

impl ReductionType {
    pub fn admittance_type(self) -> AdmittanceType {
        match self {
            ReductionType::WardInj => AdmittanceType::AdmInj,
            ReductionType::WardShunt => AdmittanceType::AdmShunt,
            ReductionType::WardAdmit => AdmittanceType::AdmAdmit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionParameters {
    pub reduction_type: ReductionType,
    pub voltage_profile: AdmittanceVoltageProfileType,
    pub ignore_shunts: bool,
    /// Ids of the buses to eliminate.
    pub external_buses: Vec<String>,
}

impl ReductionParameters {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Branch between two border buses replacing paths through the external zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquivalentBranch {
    pub bus1: usize,
    pub bus2: usize,
    pub r: f64,
    pub x: f64,
    /// Phase shift (radians).
    pub alpha: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquivalentShunt {
    pub bus: usize,
    pub g: f64,
    pub b: f64,
}

/// Consumption equivalent to the current injected by the external zone (p.u.).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquivalentLoad {
    pub bus: usize,
    pub p: f64,
    pub q: f64,
}

/// Ward equivalent of the external zone seen from the border buses.
///
/// With `i`, `b`, `e` the internal, border and external zones, eliminating `e` gives
/// `Ybb' = Ybb + Yeq` and `Ib' = Ib + Ieq` where
/// `Yeq = -Ybe·inv(Yee)·Yeb` and `Ieq = -Ybe·inv(Yee)·Ie`.
#[derive(Debug, Clone)]
pub struct ReductionResults {
    pub external_buses: Vec<usize>,
    pub border_buses: Vec<usize>,
    /// Rows follow `yeq_rows`, columns `yeq_cols`.
    pub yeq: DMatrix<f64>,
    pub yeq_rows: Vec<EquationId>,
    pub yeq_cols: Vec<Variable>,
    pub ieq: BTreeMap<usize, Complex64>,
    pub branches: Vec<EquivalentBranch>,
    pub shunts: Vec<EquivalentShunt>,
    pub loads: Vec<EquivalentLoad>,
}

impl ReductionResults {
    fn empty(external_buses: Vec<usize>, border_buses: Vec<usize>) -> Self {
        Self {
            external_buses,
            border_buses,
            yeq: DMatrix::zeros(0, 0),
            yeq_rows: Vec::new(),
            yeq_cols: Vec::new(),
            ieq: BTreeMap::new(),
            branches: Vec::new(),
            shunts: Vec::new(),
            loads: Vec::new(),
        }
    }

    /// Complex `Yeq` entry between two border buses.
    pub fn yeq_at(&self, bus_i: usize, bus_j: usize) -> Option<Complex64> {
        let row = |kind| self.yeq_rows.iter().position(|e| *e == EquationId { num: bus_i, kind });
        let col = |kind| self.yeq_cols.iter().position(|v| *v == Variable { num: bus_j, kind });
        let (ir, ii) = (row(EquationKind::BusYr)?, row(EquationKind::BusYi)?);
        let jr = col(VariableKind::BusVr)?;
        Some(Complex64::new(self.yeq[(ir, jr)], self.yeq[(ii, jr)]))
    }

    pub fn shunt_at(&self, bus: usize) -> Option<&EquivalentShunt> {
        self.shunts.iter().find(|s| s.bus == bus)
    }
}

/// Eliminates the external buses of a network, keeping its border.
pub struct ReductionEngine<'a> {
    network: &'a Network,
    params: ReductionParameters,
}

impl<'a> ReductionEngine<'a> {
    pub fn new(network: &'a Network, params: ReductionParameters) -> Self {
        Self { network, params }
    }

    /// External buses from the parameters, and the buses joined to them by a branch.
    fn define_zones(&self) -> (Vec<usize>, Vec<usize>) {
        let mut external = BTreeSet::new();
        for id in &self.params.external_buses {
            match self.network.bus_index(id) {
                Some(num) => {
                    external.insert(num);
                }
                None => warn!(bus = %id, "external bus not found in the network, ignored"),
            }
        }
        let mut border = BTreeSet::new();
        for branch in &self.network.branches {
            let Some((bus1, bus2)) = branch.connected_buses() else {
                continue;
            };
            match (external.contains(&bus1), external.contains(&bus2)) {
                (true, false) => {
                    border.insert(bus2);
                }
                (false, true) => {
                    border.insert(bus1);
                }
                _ => {}
            }
        }
        (external.into_iter().collect(), border.into_iter().collect())
    }

    pub fn run(&self) -> Result<ReductionResults> {
        let (external, border) = self.define_zones();
        debug!(external = ?external, border = ?border, "reduction zones");
        if external.is_empty() || border.is_empty() {
            warn!("nothing to reduce: no external bus linked to the rest of the network");
            return Ok(ReductionResults::empty(external, border));
        }

        let admittance = AdmittanceParameters {
            admittance_type: self.params.reduction_type.admittance_type(),
            voltage_profile: self.params.voltage_profile,
            ignore_shunts: self.params.ignore_shunts,
            ..Default::default()
        };
        let (sys, _) = AdmittanceEquationSystem::build(self.network, &admittance)?;
        let yeb = AdmittanceMatrix::sub_admittance(&sys, &external, &border)?;
        let mut yee = AdmittanceMatrix::sub_admittance(&sys, &external, &external)?;
        let ybe = AdmittanceMatrix::sub_admittance(&sys, &border, &external)?;

        // Ie = Yeb·Vb + Yee·Ve
        let profile = self.params.voltage_profile;
        let vb = yeb.voltage_vector(self.network, profile)?;
        let ie = yeb.apply(&vb)? + yee.apply(&yee.voltage_vector(self.network, profile)?)?;

        // W = inv(Yee)·Yeb, then Yeq = -Ybe·W
        let mut w = yeb.transpose_dense();
        yee.solve_transposed(&mut w)?;
        let y_be = ybe.transpose_dense();
        let yeq = -(&y_be * &w);

        // X = inv(Yee)·Ie, then Ieq = -Ybe·X
        let mut x = ie;
        yee.solve_transposed_vector(&mut x)?;
        let ieq_vec: DVector<f64> = -(&y_be * &x);

        let yeq_rows = ybe.row_equations();
        let yeq_cols = yeb.col_variables();
        if yeq_rows.len() != yeq_cols.len() {
            return Err(ScError::ShapeMismatch {
                expected: format!("square {0}x{0} equivalent admittance", yeq_rows.len()),
                got: format!("{}x{}", yeq_rows.len(), yeq_cols.len()),
            });
        }

        let mut ieq: BTreeMap<usize, Complex64> = BTreeMap::new();
        for (row, eq) in yeq_rows.iter().enumerate() {
            let entry = ieq.entry(eq.num).or_default();
            match eq.kind {
                EquationKind::BusYr => entry.re = ieq_vec[row],
                EquationKind::BusYi => entry.im = ieq_vec[row],
                EquationKind::BusP | EquationKind::BusPhi => {}
            }
        }

        let mut voltages: BTreeMap<usize, Complex64> = BTreeMap::new();
        for (col, var) in yeq_cols.iter().enumerate() {
            let entry = voltages.entry(var.num).or_default();
            match var.kind {
                VariableKind::BusVr => entry.re = vb[col],
                VariableKind::BusVi => entry.im = vb[col],
                VariableKind::BusPhi => {}
            }
        }

        let mut results = ReductionResults {
            yeq,
            yeq_rows,
            yeq_cols,
            ieq,
            ..ReductionResults::empty(external, border)
        };
        self.equivalent_elements(&mut results, &voltages)?;
        info!(
            branches = results.branches.len(),
            shunts = results.shunts.len(),
            loads = results.loads.len(),
            "network reduction done"
        );
        Ok(results)
    }

    /// Turns `Yeq` and `Ieq` into branches, shunts and loads on the border buses.
    fn equivalent_elements(&self, results: &mut ReductionResults, voltages: &BTreeMap<usize, Complex64>) -> Result<()> {
        let mut blocks: BTreeMap<(usize, usize), Matrix2<f64>> = BTreeMap::new();
        for (row, eq) in results.yeq_rows.iter().enumerate() {
            for (col, var) in results.yeq_cols.iter().enumerate() {
                let value = results.yeq[(row, col)];
                if value.abs() <= BLOCK_EPSILON {
                    continue;
                }
                let r = usize::from(eq.kind == EquationKind::BusYi);
                let c = usize::from(var.kind == VariableKind::BusVi);
                blocks.entry((eq.num, var.num)).or_insert_with(Matrix2::zeros)[(r, c)] = value;
            }
        }

        let mut y_shunt: BTreeMap<usize, Complex64> = BTreeMap::new();
        let mut y_mutual: BTreeMap<(usize, usize), Complex64> = BTreeMap::new();
        for (&(i, j), block) in &blocks {
            for (block_name, first, second) in [
                ("yeq_rr_ii", block[(0, 0)], block[(1, 1)]),
                ("yeq_ir_ri", block[(1, 0)], -block[(0, 1)]),
            ] {
                if (first - second).abs() > BLOCK_EPSILON {
                    return Err(ScError::InconsistentImpedance {
                        bus: format!("{i};{j}"),
                        block: block_name,
                        first,
                        second,
                    });
                }
            }
            let y = Complex64::new(block[(0, 0)], block[(1, 0)]);
            if i == j {
                *y_shunt.entry(i).or_default() += y;
            } else {
                y_mutual.insert((i, j), y);
            }
        }

        // the self terms of Yeq hold the shunt plus the equivalent branches
        let zero = Complex64::new(0.0, 0.0);
        for (&(i, j), &yij) in y_mutual.iter().filter(|((i, j), _)| i < j) {
            let y12 = -yij;
            let y21 = -y_mutual.get(&(j, i)).copied().unwrap_or(zero);
            *y_shunt.entry(i).or_default() -= y12;
            *y_shunt.entry(j).or_default() -= y21;

            let denom = y21.re * y12.re + y21.im * y12.im;
            let alpha = if denom > 1e-4 {
                0.5 * ((y21.im * y12.re - y12.im * y21.re) / denom).atan()
            } else {
                0.0
            };
            let (sin_a, cos_a) = alpha.sin_cos();
            let norm = y12.norm_sqr();
            let branch = EquivalentBranch {
                bus1: i,
                bus2: j,
                r: (y12.re * cos_a - y12.im * sin_a) / norm,
                x: -(y12.im * cos_a + y12.re * sin_a) / norm,
                alpha,
            };
            debug!(bus1 = i, bus2 = j, r = branch.r, x = branch.x, "equivalent branch");
            results.branches.push(branch);
        }

        // branches between the zones disappear with the external zone
        let admittance_type = self.params.reduction_type.admittance_type();
        for branch in &self.network.branches {
            let Some((bus1, bus2)) = branch.connected_buses() else {
                continue;
            };
            if branch.pi.x.abs() < LOW_IMPEDANCE_THRESHOLD {
                continue;
            }
            let (border_bus, start) = if results.external_buses.contains(&bus1) && results.border_buses.contains(&bus2) {
                (bus2, 2)
            } else if results.external_buses.contains(&bus2) && results.border_buses.contains(&bus1) {
                (bus1, 0)
            } else {
                continue;
            };
            let block = branch_admittance_block(branch, admittance_type, &HomopolarParameters::default())?;
            *y_shunt.entry(border_bus).or_default() += Complex64::new(block[(start, start)], block[(start + 1, start)]);
        }

        for (&bus, &y) in &y_shunt {
            if y.re.abs() > SHUNT_EPSILON || y.im.abs() > SHUNT_EPSILON {
                results.shunts.push(EquivalentShunt { bus, g: y.re, b: y.im });
            }
        }

        for (&bus, &i) in &results.ieq {
            let v = voltages.get(&bus).copied().unwrap_or(zero);
            let p = -(v.re * i.re + v.im * i.im);
            let q = i.im * v.re - v.im * i.re;
            if p.abs() > LOAD_EPSILON || q.abs() > LOAD_EPSILON {
                results.loads.push(EquivalentLoad { bus, p, q });
            }
        }
        Ok(())
    }
}
