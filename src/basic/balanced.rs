use std::collections::BTreeMap;

use nalgebra::Vector4;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::admittance::{
    AdmittanceParameters, AdmittancePeriodType, AdmittanceType, AdmittanceVoltageProfileType, LOW_IMPEDANCE_THRESHOLD,
    SB, branch_admittance_block,
};
use super::error::Result;
use super::feeders::{FeederResult, FeedersAtBusResult, FeedersAtNetwork};
use super::homopolar::HomopolarParameters;
use super::network::Network;
use super::thevenin::{LinearResolution, LinearResolutionParameters, ShortCircuitFault, TheveninResult};

/// Options of a three-phase fault computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancedFaultParameters {
    pub voltage_profile: AdmittanceVoltageProfileType,
    pub period: AdmittancePeriodType,
    pub ignore_shunts: bool,
    /// Compute the post-fault voltage of every bus and the feeder contributions.
    pub voltage_update: bool,
    pub faults: Vec<ShortCircuitFault>,
}

impl BalancedFaultParameters {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    fn linear_resolution(&self) -> LinearResolutionParameters {
        LinearResolutionParameters {
            admittance: AdmittanceParameters {
                admittance_type: AdmittanceType::AdmThevenin,
                voltage_profile: self.voltage_profile,
                period: self.period,
                ignore_shunts: self.ignore_shunts,
                homopolar: HomopolarParameters::default(),
            },
            voltage_update: self.voltage_update,
            faults: self.faults.clone(),
            biphased_faults: Vec::new(),
        }
    }
}

/// Outcome of one three-phase fault.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortCircuitResult {
    pub fault_id: String,
    pub bus: usize,
    pub bus_id: String,
    /// Bus nominal voltage (kV).
    pub nominal_v: f64,
    pub zth: Complex64,
    pub eth: Complex64,
    /// Fault current (p.u.).
    pub i_fault: Complex64,
    /// Post-fault voltage at the fault bus (p.u.).
    pub v_fault: Complex64,
    /// Voltage change of every bus when the voltage update is on.
    pub delta_v: BTreeMap<usize, Complex64>,
    /// Feeder contributions per bus when the voltage update is on.
    pub feeders: BTreeMap<usize, FeedersAtBusResult>,
}

impl ShortCircuitResult {
    /// Short-circuit current (A).
    pub fn icc(&self) -> f64 {
        (self.i_fault.norm_sqr() / 3.0).sqrt() * 1000.0 * SB / self.nominal_v
    }

    /// Short-circuit power (MVA), `sqrt(3)·Icc·|Eth|·Vnom`.
    pub fn pcc(&self) -> f64 {
        3f64.sqrt() * self.icc() * self.eth.norm() * self.nominal_v / 1000.0
    }

    /// Post-fault voltage of `bus` given its pre-fault voltage (p.u.).
    pub fn post_fault_voltage(&self, bus: usize, pre_fault: Complex64) -> Option<Complex64> {
        self.delta_v.get(&bus).map(|dv| pre_fault + dv)
    }

    pub fn feeder_contribution(&self, bus: usize, feeder_id: &str) -> Option<&FeederResult> {
        self.feeders.get(&bus).and_then(|f| f.feeder(feeder_id))
    }
}

/// Three-phase fault computation on top of the Thevenin linear resolution.
pub struct BalancedFaultEngine<'a> {
    network: &'a Network,
    params: BalancedFaultParameters,
}

impl<'a> BalancedFaultEngine<'a> {
    pub fn new(network: &'a Network, params: BalancedFaultParameters) -> Self {
        Self { network, params }
    }

    /// Results in fault input order; faults that could not be located are absent.
    pub fn run(&self) -> Result<Vec<ShortCircuitResult>> {
        let output = LinearResolution::new(self.network, self.params.linear_resolution()).run()?;
        let mut results = Vec::with_capacity(output.fault_buses.len());
        for located in &output.fault_buses {
            let Some(fault) = self.params.faults.get(located.index) else {
                continue;
            };
            let Some(thevenin) = output.result_at(located.bus) else {
                warn!(fault = %located.id, "no Thevenin equivalent for the fault bus");
                continue;
            };
            results.push(self.fault_result(fault, thevenin, &output.feeders)?);
        }
        info!(results = results.len(), "balanced short-circuit computation done");
        Ok(results)
    }

    fn fault_result(
        &self,
        fault: &ShortCircuitFault,
        thevenin: &TheveninResult,
        feeders: &FeedersAtNetwork,
    ) -> Result<ShortCircuitResult> {
        let (ex, ey) = (thevenin.eth_x, thevenin.eth_y);
        let (rth, xth) = (thevenin.r_eq11, thevenin.x_eq12);
        let (rt, xt) = (fault.rf + rth, fault.xf + xth);

        // If = Eth / (Zth + Zf)
        let den = rt * rt + xt * xt;
        let ifr = (ey * xt + ex * rt) / den;
        let ifi = (ey * rt - ex * xt) / den;

        let en = &thevenin.en_bus;
        let dvr = -ifr * en[(0, 0)] + ifi * en[(1, 0)];
        let dvi = -ifr * en[(1, 0)] - ifi * en[(0, 0)];

        let bus = self.network.bus(thevenin.bus)?;
        let mut result = ShortCircuitResult {
            fault_id: fault.id.clone(),
            bus: thevenin.bus,
            bus_id: bus.id.clone(),
            nominal_v: bus.nominal_v,
            zth: thevenin.zth(),
            eth: thevenin.eth(),
            i_fault: Complex64::new(ifr, ifi),
            v_fault: Complex64::new(ex + dvr, ey + dvi),
            delta_v: BTreeMap::new(),
            feeders: BTreeMap::new(),
        };
        debug!(fault = %fault.id, bus = %result.bus_id, i_fault = %result.i_fault, icc = result.icc(), "fault current");

        if let Some(blocks) = &thevenin.delta_v {
            for (&num, block) in blocks {
                let (ed_vr, ed_vi) = (block[(0, 0)], block[(1, 0)]);
                result.delta_v.insert(
                    num,
                    Complex64::new(-ifr * ed_vr + ifi * ed_vi, -ifr * ed_vi - ifi * ed_vr),
                );
            }
            self.update_feeders(&mut result, feeders)?;
        }
        Ok(result)
    }

    /// Branch current deltas accumulated per bus, then split among the bus feeders.
    fn update_feeders(&self, result: &mut ShortCircuitResult, feeders: &FeedersAtNetwork) -> Result<()> {
        let mut per_bus: BTreeMap<usize, FeedersAtBusResult> = feeders
            .bus_to_feeders
            .iter()
            .map(|(&bus, f)| (bus, FeedersAtBusResult::new(f)))
            .collect();

        let zero = Complex64::new(0.0, 0.0);
        for branch in &self.network.branches {
            let Some((bus1, bus2)) = branch.connected_buses() else {
                continue;
            };
            if branch.pi.x.abs() < LOW_IMPEDANCE_THRESHOLD {
                continue;
            }
            let block = branch_admittance_block(branch, AdmittanceType::AdmThevenin, &HomopolarParameters::default())?;
            let dv1 = result.delta_v.get(&bus1).copied().unwrap_or(zero);
            let dv2 = result.delta_v.get(&bus2).copied().unwrap_or(zero);
            let i12 = block * Vector4::new(dv1.re, dv1.im, dv2.re, dv2.im);
            if let Some(f) = per_bus.get_mut(&bus1) {
                f.add_branch_current(i12[0], i12[1]);
            }
            if let Some(f) = per_bus.get_mut(&bus2) {
                f.add_branch_current(i12[2], i12[3]);
            }
        }

        for f in per_bus.values_mut() {
            f.update_contributions();
        }
        result.feeders = per_bus;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::thevenin::FaultLocation;
    use crate::testcases::two_bus_network;

    fn run(faults: Vec<ShortCircuitFault>, voltage_update: bool) -> Vec<ShortCircuitResult> {
        let net = two_bus_network();
        let params = BalancedFaultParameters {
            voltage_update,
            faults,
            ..Default::default()
        };
        BalancedFaultEngine::new(&net, params).run().unwrap()
    }

    #[test]
    fn test_bolted_fault() {
        let results = run(vec![ShortCircuitFault::new("F2", FaultLocation::new("L1", 2))], true);
        assert_eq!(results.len(), 1);
        let res = &results[0];
        let expected = Complex64::new(1.0, 0.0) / Complex64::new(0.01, 0.2);
        assert!((res.i_fault - expected).norm() < 1e-9, "If = {}", res.i_fault);
        assert!(res.v_fault.norm() < 1e-9, "Vf = {}", res.v_fault);
        // the fault bus delta cancels the pre-fault voltage
        let v = res.post_fault_voltage(1, res.eth).unwrap();
        assert!(v.norm() < 1e-9);

        // the single machine feeds the whole fault current
        let machine = res.feeder_contribution(0, "G1").unwrap();
        assert!((machine.current() - res.i_fault).norm() < 1e-9, "I_G1 = {}", machine.current());

        let icc = (expected.norm_sqr() / 3.0).sqrt() * 1000.0 * 100.0 / 100.0;
        assert!((res.icc() - icc).abs() < 1e-6, "icc = {}", res.icc());
        assert!((res.pcc() - 3f64.sqrt() * icc * 100.0 / 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_fault_impedance_limits_current() {
        let mut fault = ShortCircuitFault::new("F2", FaultLocation::new("L1", 2));
        fault.xf = 0.3;
        let results = run(vec![fault], false);
        let res = &results[0];
        assert!((res.i_fault.norm() - 1.0 / Complex64::new(0.01, 0.5).norm()).abs() < 1e-9);
        // Vf = If * Zf
        assert!((res.v_fault - res.i_fault * Complex64::new(0.0, 0.3)).norm() < 1e-9);
        assert!(res.feeders.is_empty());
    }

    #[test]
    fn test_same_id_faults_keep_their_own_impedance() {
        let bolted = ShortCircuitFault::new("F", FaultLocation::new("L1", 2));
        let mut resistive = bolted.clone();
        resistive.xf = 0.3;
        let results = run(vec![bolted, resistive], false);
        assert_eq!(results.len(), 2);
        let bolted_current = 1.0 / Complex64::new(0.01, 0.2).norm();
        let resistive_current = 1.0 / Complex64::new(0.01, 0.5).norm();
        assert!((results[0].i_fault.norm() - bolted_current).abs() < 1e-9);
        assert!((results[1].i_fault.norm() - resistive_current).abs() < 1e-9);
    }

    #[test]
    fn test_parameters_from_json() {
        let params = BalancedFaultParameters::from_json_str(
            r#"{"voltage_update": true, "faults": [{"id": "F", "location": {"branch_id": "L1", "side": 1}}]}"#,
        )
        .unwrap();
        assert!(params.voltage_update);
        assert_eq!(params.period, AdmittancePeriodType::SubTransient);
        assert_eq!(params.faults.len(), 1);
    }
}
