use std::collections::BTreeMap;

use nalgebra::{DMatrix, Matrix2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::admittance::{
    AdmittanceEquationSystem, AdmittanceMatrix, AdmittanceParameters, AdmittanceType, AdmittanceVoltageProfileType,
};
use super::equations::{EquationKind, VariableKind};
use super::error::{Result, ScError};
use super::feeders::FeedersAtNetwork;
use super::network::{Bus, Network};

const IMPEDANCE_CHECK_EPSILON: f64 = 1e-5;

/// A branch end: `side` is 1 or 2, or the leg number (1 to 3) of a three-winding transformer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FaultLocation {
    pub branch_id: String,
    pub side: u8,
}

impl FaultLocation {
    pub fn new(branch_id: impl Into<String>, side: u8) -> Self {
        Self {
            branch_id: branch_id.into(),
            side,
        }
    }

    /// Bus of the network at this location.
    ///
    /// Three-winding transformer legs are named `<id>_leg_<n>` and match when `side == n`;
    /// the leg's side 1 bus is returned since side 2 is the star bus.
    pub fn resolve(&self, network: &Network) -> Option<usize> {
        for branch in &network.branches {
            match branch.kind.leg_number() {
                None => {
                    if branch.id == self.branch_id {
                        return if self.side == 1 { branch.bus1 } else { branch.bus2 };
                    }
                }
                Some(leg) => {
                    if self.side == leg && branch.id == format!("{}_leg_{}", self.branch_id, leg) {
                        return branch.bus1;
                    }
                }
            }
        }
        None
    }
}

/// A fault at a branch end, with its fault impedance `rf + j xf` (p.u.).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortCircuitFault {
    pub id: String,
    pub location: FaultLocation,
    /// Second location of a biphased common-support fault.
    pub second_location: Option<FaultLocation>,
    pub rf: f64,
    pub xf: f64,
}

impl ShortCircuitFault {
    pub fn new(id: impl Into<String>, location: FaultLocation) -> Self {
        Self {
            id: id.into(),
            location,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearResolutionParameters {
    #[serde(flatten)]
    pub admittance: AdmittanceParameters,
    /// Keep the solved columns to get the voltage delta at every bus.
    pub voltage_update: bool,
    pub faults: Vec<ShortCircuitFault>,
    pub biphased_faults: Vec<ShortCircuitFault>,
}

impl Default for LinearResolutionParameters {
    fn default() -> Self {
        Self {
            admittance: AdmittanceParameters {
                admittance_type: AdmittanceType::AdmThevenin,
                ..Default::default()
            },
            voltage_update: false,
            faults: Vec::new(),
            biphased_faults: Vec::new(),
        }
    }
}

impl LinearResolutionParameters {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Extra impedance blocks kept for a biphased common-support fault whose first bus is
/// the bus of the owning [`TheveninResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct BiphasedResult {
    pub bus2: usize,
    /// Index of `bus2` among the fault buses.
    pub fault_index2: usize,
    pub v2x: f64,
    pub v2y: f64,
    pub z22: Matrix2<f64>,
    pub z21: Matrix2<f64>,
    pub z12: Matrix2<f64>,
    pub delta_v2: Option<BTreeMap<usize, Matrix2<f64>>>,
}

/// Thevenin equivalent seen from a fault bus.
///
/// The impedance block is `[[r_eq11, -x_eq12], [x_eq21, r_eq22]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TheveninResult {
    pub bus: usize,
    pub bus_id: String,
    /// Index of the bus among the fault buses, its columns in the solution are `2k` and `2k+1`.
    pub fault_index: usize,
    pub r_eq11: f64,
    pub r_eq22: f64,
    pub x_eq12: f64,
    pub x_eq21: f64,
    pub eth_x: f64,
    pub eth_y: f64,
    /// Voltage response at the fault bus to unit current injections at the fault bus.
    pub en_bus: Matrix2<f64>,
    pub delta_v: Option<BTreeMap<usize, Matrix2<f64>>>,
    pub biphased: Vec<BiphasedResult>,
}

impl TheveninResult {
    pub fn zth(&self) -> Complex64 {
        Complex64::new(self.r_eq11, self.x_eq12)
    }

    pub fn eth(&self) -> Complex64 {
        Complex64::new(self.eth_x, self.eth_y)
    }

    fn check(&self) -> Result<()> {
        if (self.r_eq11 - self.r_eq22).abs() > IMPEDANCE_CHECK_EPSILON {
            return Err(ScError::InconsistentImpedance {
                bus: self.bus_id.clone(),
                block: "rth",
                first: self.r_eq11,
                second: self.r_eq22,
            });
        }
        if (self.x_eq12 - self.x_eq21).abs() > IMPEDANCE_CHECK_EPSILON {
            return Err(ScError::InconsistentImpedance {
                bus: self.bus_id.clone(),
                block: "xth",
                first: self.x_eq12,
                second: self.x_eq21,
            });
        }
        Ok(())
    }
}

/// A fault kept for the computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFault {
    pub id: String,
    /// Position of the fault in `faults`, or in `biphased_faults` when `second_bus` is set.
    pub index: usize,
    pub bus: usize,
    /// Second bus of a biphased common-support fault.
    pub second_bus: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct LinearResolutionOutput {
    pub results: Vec<TheveninResult>,
    /// Feeders recorded by the admittance builder (Thevenin mode only).
    pub feeders: FeedersAtNetwork,
    /// Faults in input order, plain faults first; ignored faults are absent.
    pub fault_buses: Vec<ResolvedFault>,
}

impl LinearResolutionOutput {
    pub fn result_at(&self, bus: usize) -> Option<&TheveninResult> {
        self.results.iter().find(|r| r.bus == bus)
    }
}

/// Computes Thevenin equivalents at fault buses with one factorization of `Y`:
/// `Y·X = En`, where each fault bus contributes two unit columns.
pub struct LinearResolution<'a> {
    network: &'a Network,
    params: LinearResolutionParameters,
}

impl<'a> LinearResolution<'a> {
    pub fn new(network: &'a Network, params: LinearResolutionParameters) -> Self {
        Self { network, params }
    }

    pub fn parameters(&self) -> &LinearResolutionParameters {
        &self.params
    }

    /// Resolves the fault locations against the network and the admittance system.
    ///
    /// A fault whose location is unknown, or whose bus carries no admittance equation
    /// (isolated, or only reached through skipped branches), is logged and left out.
    fn locate_faults(&self, y: &AdmittanceMatrix) -> Vec<ResolvedFault> {
        let network = self.network;
        let mut located = Vec::new();
        for (index, fault) in self.params.faults.iter().enumerate() {
            let Some(bus) = fault.location.resolve(network) else {
                warn!(
                    fault = %fault.id,
                    branch = %fault.location.branch_id,
                    side = fault.location.side,
                    "fault location not found in the network, fault ignored"
                );
                continue;
            };
            if !y.contains_bus(bus) {
                warn!(fault = %fault.id, bus, "fault bus is not in the admittance system, fault ignored");
                continue;
            }
            located.push(ResolvedFault {
                id: fault.id.clone(),
                index,
                bus,
                second_bus: None,
            });
        }

        for (index, fault) in self.params.biphased_faults.iter().enumerate() {
            let bus1 = fault.location.resolve(network);
            let bus2 = fault.second_location.as_ref().and_then(|l| l.resolve(network));
            let Some((b1, b2)) = bus1.zip(bus2) else {
                warn!(fault = %fault.id, "biphased fault locations not found in the network, fault ignored");
                continue;
            };
            if !y.contains_bus(b1) || !y.contains_bus(b2) {
                warn!(fault = %fault.id, bus1 = b1, bus2 = b2, "biphased fault bus is not in the admittance system, fault ignored");
                continue;
            }
            located.push(ResolvedFault {
                id: fault.id.clone(),
                index,
                bus: b1,
                second_bus: Some(b2),
            });
        }
        located
    }

    pub fn run(&self) -> Result<LinearResolutionOutput> {
        let network = self.network;
        let (sys, feeders) = AdmittanceEquationSystem::build(network, &self.params.admittance)?;
        let mut y = AdmittanceMatrix::new(&sys)?;

        let fault_buses = self.locate_faults(&y);
        let mut input_buses: Vec<usize> = Vec::new();
        for fault in &fault_buses {
            for bus in std::iter::once(fault.bus).chain(fault.second_bus) {
                if !input_buses.contains(&bus) {
                    input_buses.push(bus);
                }
            }
        }
        info!(faults = fault_buses.len(), buses = input_buses.len(), "fault locations resolved");
        if input_buses.is_empty() {
            return Ok(LinearResolutionOutput {
                results: Vec::new(),
                feeders,
                fault_buses,
            });
        }

        let mut en = DMatrix::zeros(y.row_count(), 2 * input_buses.len());
        let mut t_en_cols = Vec::with_capacity(2 * input_buses.len());
        for (k, &bus) in input_buses.iter().enumerate() {
            let row_x = y.row_bus(bus, EquationKind::BusYr)?;
            let row_y = y.row_bus(bus, EquationKind::BusYi)?;
            t_en_cols.push(y.col_bus(bus, VariableKind::BusVr)?);
            t_en_cols.push(y.col_bus(bus, VariableKind::BusVi)?);
            en[(row_x, 2 * k)] = 1.0;
            en[(row_y, 2 * k + 1)] = 1.0;
        }

        y.solve_transposed(&mut en)?;

        let calculated = self.params.admittance.voltage_profile == AdmittanceVoltageProfileType::Calculated;
        let mut results = Vec::with_capacity(input_buses.len());
        for (k, &bus_num) in input_buses.iter().enumerate() {
            let bus = network.bus(bus_num)?;
            let (col_x, col_y) = (t_en_cols[2 * k], t_en_cols[2 * k + 1]);
            let (eth_x, eth_y) = thevenin_voltage(bus, calculated)?;

            let row_x = y.row_bus(bus_num, EquationKind::BusYr)?;
            let row_y = y.row_bus(bus_num, EquationKind::BusYi)?;

            let mut res = TheveninResult {
                bus: bus_num,
                bus_id: bus.id.clone(),
                fault_index: k,
                r_eq11: en[(col_x, 2 * k)],
                r_eq22: en[(col_y, 2 * k + 1)],
                x_eq12: -en[(col_x, 2 * k + 1)],
                x_eq21: en[(col_y, 2 * k)],
                eth_x,
                eth_y,
                en_bus: Matrix2::new(
                    en[(row_x, 2 * k)],
                    en[(row_x, 2 * k + 1)],
                    en[(row_y, 2 * k)],
                    en[(row_y, 2 * k + 1)],
                ),
                delta_v: None,
                biphased: Vec::new(),
            };
            res.check()?;

            let seconds = fault_buses
                .iter()
                .filter(|f| f.bus == bus_num)
                .filter_map(|f| f.second_bus);
            for bus2 in seconds {
                if res.biphased.iter().any(|p| p.bus2 == bus2) {
                    continue;
                }
                let bus2_data = network.bus(bus2)?;
                let k2 = input_buses
                    .iter()
                    .position(|&b| b == bus2)
                    .ok_or_else(|| ScError::BiphasedBusNotFound(bus2_data.id.clone()))?;
                let col1x = y.col_bus(bus_num, VariableKind::BusVr)?;
                let col1y = y.col_bus(bus_num, VariableKind::BusVi)?;
                let col2x = y.col_bus(bus2, VariableKind::BusVr)?;
                let col2y = y.col_bus(bus2, VariableKind::BusVi)?;
                let block = |cx: usize, cy: usize, j: usize| {
                    Matrix2::new(en[(cx, 2 * j)], en[(cx, 2 * j + 1)], en[(cy, 2 * j)], en[(cy, 2 * j + 1)])
                };
                let (v2x, v2y) = thevenin_voltage(bus2_data, calculated)?;
                res.biphased.push(BiphasedResult {
                    bus2,
                    fault_index2: k2,
                    v2x,
                    v2y,
                    z22: block(col2x, col2y, k2),
                    z21: block(col2x, col2y, k),
                    z12: block(col1x, col1y, k2),
                    delta_v2: None,
                });
            }

            if self.params.voltage_update {
                res.delta_v = Some(y.delta_v(&en, k)?);
                for part in &mut res.biphased {
                    part.delta_v2 = Some(y.delta_v(&en, part.fault_index2)?);
                }
            }
            debug!(bus = %res.bus_id, zth = %res.zth(), "thevenin equivalent");
            results.push(res);
        }

        Ok(LinearResolutionOutput {
            results,
            feeders,
            fault_buses,
        })
    }
}

fn thevenin_voltage(bus: &Bus, calculated: bool) -> Result<(f64, f64)> {
    if !calculated {
        return Ok((1.0, 0.0));
    }
    let op = bus
        .operating_point
        .ok_or_else(|| ScError::MissingOperatingPoint(bus.id.clone()))?;
    let (sin, cos) = op.angle.to_radians().sin_cos();
    Ok((op.v * cos, op.v * sin))
}
