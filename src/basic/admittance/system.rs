use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    AdmittancePeriodType, AdmittanceType, AdmittanceVoltageProfileType, LOW_IMPEDANCE_THRESHOLD, SB,
    branch_admittance_block,
};
use crate::basic::equations::terms::{BranchSide, BranchTerm, ShuntTerm};
use crate::basic::equations::{EquationKind, EquationSystem, VariableKind};
use crate::basic::error::{Result, ScError};
use crate::basic::feeders::{Feeder, FeederKind, FeedersAtBus, FeedersAtNetwork};
use crate::basic::homopolar::HomopolarParameters;
use crate::basic::network::{Bus, Network};

const EPSILON: f64 = 1e-8;
const GENERATOR_EPSILON: f64 = 1e-7;

/// Options of the admittance equation system builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmittanceParameters {
    pub admittance_type: AdmittanceType,
    pub voltage_profile: AdmittanceVoltageProfileType,
    pub period: AdmittancePeriodType,
    pub ignore_shunts: bool,
    pub homopolar: HomopolarParameters,
}

/// Builds the linear `Y·V = I` equation system of a network.
pub struct AdmittanceEquationSystem;

impl AdmittanceEquationSystem {
    /// Creates the branch and shunt terms for `params.admittance_type`.
    ///
    /// The feeders are only filled in `AdmThevenin` mode.
    pub fn build(network: &Network, params: &AdmittanceParameters) -> Result<(EquationSystem, FeedersAtNetwork)> {
        let mut sys = EquationSystem::new();
        let mut feeders = FeedersAtNetwork::default();

        Self::create_branches(network, params, &mut sys)?;
        if params.admittance_type != AdmittanceType::AdmInj {
            Self::create_shunts(network, params, &mut sys, &mut feeders)?;
        }
        debug!(
            admittance_type = %params.admittance_type,
            variables = sys.variable_count(),
            equations = sys.equation_count(),
            terms = sys.term_count(),
            "admittance equation system built"
        );
        Ok((sys, feeders))
    }

    fn create_branches(network: &Network, params: &AdmittanceParameters, sys: &mut EquationSystem) -> Result<()> {
        for branch in &network.branches {
            let Some((bus1, bus2)) = branch.connected_buses() else {
                continue;
            };
            if branch.pi.x.abs() < LOW_IMPEDANCE_THRESHOLD {
                warn!(
                    branch = %branch.id,
                    "non impedant branches are not supported by the admittance model, branch skipped"
                );
                continue;
            }
            let block = branch_admittance_block(branch, params.admittance_type, &params.homopolar)?;
            let variables = [
                sys.variable(bus1, VariableKind::BusVr),
                sys.variable(bus1, VariableKind::BusVi),
                sys.variable(bus2, VariableKind::BusVr),
                sys.variable(bus2, VariableKind::BusVi),
            ];
            for side in BranchSide::ALL {
                let (bus, kind) = match side {
                    BranchSide::X1 => (bus1, EquationKind::BusYr),
                    BranchSide::Y1 => (bus1, EquationKind::BusYi),
                    BranchSide::X2 => (bus2, EquationKind::BusYr),
                    BranchSide::Y2 => (bus2, EquationKind::BusYi),
                };
                sys.add_term(bus, kind, Box::new(BranchTerm::new(&branch.id, side, variables, &block)));
            }
        }
        Ok(())
    }

    fn create_shunts(
        network: &Network,
        params: &AdmittanceParameters,
        sys: &mut EquationSystem,
        feeders: &mut FeedersAtNetwork,
    ) -> Result<()> {
        for (num, bus) in network.buses.iter().enumerate() {
            let (vr, vi) = bus_voltage(bus, params)?;
            let v_square = vr * vr + vi * vi;

            let (mut g, mut b) = (0.0, 0.0);
            match params.admittance_type {
                AdmittanceType::AdmInj => {}
                AdmittanceType::AdmShunt => {
                    if !params.ignore_shunts {
                        b += physical_shunts(network, num, None);
                    }
                }
                AdmittanceType::AdmAdmit => {
                    let op = bus
                        .operating_point
                        .ok_or_else(|| ScError::MissingOperatingPoint(bus.id.clone()))?;
                    if !params.ignore_shunts {
                        b += physical_shunts(network, num, None);
                    }
                    let g_load = bus.load_p / v_square;
                    let b_load = -bus.load_q / v_square;
                    // net nodal injection without the load
                    let g_gen = -op.p / v_square - g_load;
                    let b_gen = if bus.voltage_controlled {
                        op.q / v_square - b_load
                    } else {
                        network.generation_target(num).1 / v_square
                    };
                    g += g_load + g_gen;
                    b += b_load + b_gen;
                }
                AdmittanceType::AdmThevenin => {
                    let mut feeder_list = Vec::new();
                    if !params.ignore_shunts {
                        b += physical_shunts(network, num, Some(&mut feeder_list));
                    }
                    let g_load = bus.load_p / v_square;
                    let b_load = -bus.load_q / v_square;
                    feeder_list.push(Feeder::new(bus.id.clone(), FeederKind::Load, g_load, b_load));
                    let (g_gen, b_gen) = generator_admittance(network, num, bus.nominal_v, params, Some(&mut feeder_list));
                    g += g_load + g_gen;
                    b += b_load + b_gen;
                    feeders.insert(FeedersAtBus {
                        bus: num,
                        feeders: feeder_list,
                    });
                }
                AdmittanceType::AdmTheveninHomopolar => {
                    let (g_gen, b_gen) = generator_admittance(network, num, bus.nominal_v, params, None);
                    g += g_gen;
                    b += b_gen;
                }
            }

            if g.abs() > EPSILON || b.abs() > EPSILON {
                let vr_var = sys.variable(num, VariableKind::BusVr);
                let vi_var = sys.variable(num, VariableKind::BusVi);
                sys.add_term(num, EquationKind::BusYr, Box::new(ShuntTerm::real(g, b, vr_var, vi_var)));
                sys.add_term(num, EquationKind::BusYi, Box::new(ShuntTerm::imaginary(g, b, vr_var, vi_var)));
            }
        }
        Ok(())
    }
}

/// Voltage used to turn power injections into admittances.
fn bus_voltage(bus: &Bus, params: &AdmittanceParameters) -> Result<(f64, f64)> {
    match params.voltage_profile {
        AdmittanceVoltageProfileType::Nominal => Ok((1.0, 0.0)),
        AdmittanceVoltageProfileType::Calculated => {
            let op = bus
                .operating_point
                .ok_or_else(|| ScError::MissingOperatingPoint(bus.id.clone()))?;
            let (sin, cos) = op.angle.to_radians().sin_cos();
            Ok((op.v * cos, op.v * sin))
        }
    }
}

/// Total susceptance of the shunts at a bus, recording them as feeders when asked.
fn physical_shunts(network: &Network, bus: usize, mut feeders: Option<&mut Vec<Feeder>>) -> f64 {
    let mut b = 0.0;
    for shunt in network.shunts_at(bus) {
        b += shunt.b;
        if let Some(list) = feeders.as_deref_mut() {
            let kind = if shunt.controlled {
                FeederKind::ControlledShunt
            } else {
                FeederKind::Shunt
            };
            list.push(Feeder::new(shunt.id.clone(), kind, 0.0, shunt.b));
        }
    }
    b
}

/// Sum of the machine internal admittances at a bus, `(g, b)` in p.u.
fn generator_admittance(
    network: &Network,
    bus: usize,
    v_nom: f64,
    params: &AdmittanceParameters,
    mut feeders: Option<&mut Vec<Feeder>>,
) -> (f64, f64) {
    let (mut g, mut b) = (0.0, 0.0);
    for generator in network.generators_at(bus) {
        let Some(sc) = generator.short_circuit else {
            warn!(generator = %generator.id, "generator has no short-circuit data, ignored in the Thevenin admittance");
            continue;
        };
        let (rd, xd) = match params.period {
            AdmittancePeriodType::SubTransient => (sc.sub_trans_rd, sc.sub_trans_xd),
            AdmittancePeriodType::Transient | AdmittancePeriodType::SteadyState => (sc.trans_rd, sc.trans_xd),
        };
        let (coeff_r, coeff_x) = match params.admittance_type {
            AdmittanceType::AdmTheveninHomopolar if sc.grounded => (sc.coeff_ro, sc.coeff_xo),
            AdmittanceType::AdmTheveninHomopolar => (0.0, 0.0),
            _ => (1.0, 1.0),
        };
        let rd = (rd + sc.step_up_r) * sc.k_g * coeff_r;
        let xd = (xd + sc.step_up_x) * sc.k_g * coeff_x;
        if rd.abs() <= GENERATOR_EPSILON && xd.abs() <= GENERATOR_EPSILON {
            continue;
        }
        let scale = v_nom * v_nom / SB;
        let den = rd * rd + xd * xd;
        let g_gen = scale * rd / den;
        let b_gen = -scale * xd / den;
        g += g_gen;
        b += b_gen;
        if let Some(list) = feeders.as_deref_mut() {
            list.push(Feeder::new(generator.id.clone(), FeederKind::Generator, g_gen, b_gen));
        }
    }
    (g, b)
}
