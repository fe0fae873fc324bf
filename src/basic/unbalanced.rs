use std::collections::BTreeMap;

use derive_more::Display;
use nalgebra::Matrix2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::admittance::{AdmittanceParameters, AdmittancePeriodType, AdmittanceType, AdmittanceVoltageProfileType};
use super::error::Result;
use super::homopolar::HomopolarParameters;
use super::network::Network;
use super::thevenin::{
    BiphasedResult, LinearResolution, LinearResolutionOutput, LinearResolutionParameters, ShortCircuitFault,
    TheveninResult,
};

/// `a = exp(j·2π/3)`.
fn a() -> Complex64 {
    Complex64::from_polar(1.0, 2.0 * std::f64::consts::FRAC_PI_3)
}

fn a2() -> Complex64 {
    a() * a()
}

/// Complex impedance read from a 2x2 response block (real and imaginary voltage for a real
/// current injection).
fn block_z(m: &Matrix2<f64>) -> Complex64 {
    Complex64::new(m[(0, 0)], m[(1, 0)])
}

/// Shunt fault at one bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum UnbalancedFaultType {
    /// Phase c to ground through `Zf`.
    #[default]
    Monophased,
    /// Phase b to phase c through `Zf`.
    Biphased,
    /// Phases b and c joined, then to ground through `Zf`.
    BiphasedGround,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    /// Factor `f` with `Vp = Vo + f·Vd + f²·Vi`.
    pub fn factor(self) -> Complex64 {
        match self {
            Phase::A => Complex64::new(1.0, 0.0),
            Phase::B => a2(),
            Phase::C => a(),
        }
    }
}

/// Phase of the first bus and phase of the second bus joined by a common-support fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum BiphasedCommonSupportType {
    C1A2,
    C1B2,
    #[default]
    C1C2,
}

impl BiphasedCommonSupportType {
    pub fn phases(self) -> (Phase, Phase) {
        match self {
            BiphasedCommonSupportType::C1A2 => (Phase::C, Phase::A),
            BiphasedCommonSupportType::C1B2 => (Phase::C, Phase::B),
            BiphasedCommonSupportType::C1C2 => (Phase::C, Phase::C),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnbalancedFault {
    #[serde(flatten)]
    pub fault: ShortCircuitFault,
    pub fault_type: UnbalancedFaultType,
}

impl UnbalancedFault {
    pub fn new(fault: ShortCircuitFault, fault_type: UnbalancedFaultType) -> Self {
        Self { fault, fault_type }
    }
}

/// Fault between a phase at `location` and a phase at `second_location`, typically two
/// circuits sharing the same towers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonSupportFault {
    #[serde(flatten)]
    pub fault: ShortCircuitFault,
    pub support_type: BiphasedCommonSupportType,
}

impl CommonSupportFault {
    pub fn new(fault: ShortCircuitFault, support_type: BiphasedCommonSupportType) -> Self {
        Self { fault, support_type }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnbalancedFaultParameters {
    pub voltage_profile: AdmittanceVoltageProfileType,
    pub period: AdmittancePeriodType,
    pub ignore_shunts: bool,
    pub homopolar: HomopolarParameters,
    /// Compute the sequence voltage change of every bus.
    pub voltage_update: bool,
    pub faults: Vec<UnbalancedFault>,
    pub common_support_faults: Vec<CommonSupportFault>,
}

impl UnbalancedFaultParameters {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    fn linear_resolution(&self, admittance_type: AdmittanceType) -> LinearResolutionParameters {
        LinearResolutionParameters {
            admittance: AdmittanceParameters {
                admittance_type,
                voltage_profile: self.voltage_profile,
                period: self.period,
                ignore_shunts: self.ignore_shunts,
                homopolar: self.homopolar,
            },
            voltage_update: self.voltage_update,
            faults: self.faults.iter().map(|f| f.fault.clone()).collect(),
            biphased_faults: self.common_support_faults.iter().map(|f| f.fault.clone()).collect(),
        }
    }
}

/// Zero, direct and inverse sequence components.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Fortescue {
    pub zero: Complex64,
    pub direct: Complex64,
    pub inverse: Complex64,
}

impl Fortescue {
    pub fn new(zero: Complex64, direct: Complex64, inverse: Complex64) -> Self {
        Self { zero, direct, inverse }
    }

    pub fn phase(&self, phase: Phase) -> Complex64 {
        let f = phase.factor();
        self.zero + f * self.direct + f * f * self.inverse
    }

    /// Phase values `[a, b, c]`.
    pub fn phases(&self) -> [Complex64; 3] {
        [self.phase(Phase::A), self.phase(Phase::B), self.phase(Phase::C)]
    }

    /// Sequence components of a current `i` flowing in `phase` only.
    fn single_phase(phase: Phase, i: Complex64) -> Self {
        let f = phase.factor();
        Self::new(i / 3.0, i / (3.0 * f), f * i / 3.0)
    }
}

impl std::ops::Neg for Fortescue {
    type Output = Fortescue;

    fn neg(self) -> Fortescue {
        Fortescue::new(-self.zero, -self.direct, -self.inverse)
    }
}

/// Sequence currents leaving the network at the fault bus.
///
/// `v` is the pre-fault voltage, `zd` and `zo` the direct and zero-sequence Thevenin
/// impedances; the inverse impedance is taken equal to `zd`.
pub fn shunt_fault_currents(
    fault_type: UnbalancedFaultType,
    v: Complex64,
    zd: Complex64,
    zo: Complex64,
    zf: Complex64,
) -> Fortescue {
    match fault_type {
        UnbalancedFaultType::Monophased => {
            let zt = (2.0 * zd + zo) / 3.0 + zf;
            Fortescue::single_phase(Phase::C, a() * v / zt)
        }
        UnbalancedFaultType::Biphased => {
            let id = v / (2.0 * zd + zf);
            Fortescue::new(Complex64::new(0.0, 0.0), id, -id)
        }
        UnbalancedFaultType::BiphasedGround => {
            let zo_f = zo + 3.0 * zf;
            let den = zd * (zd + 2.0 * zo_f);
            Fortescue::new(-zd * v / den, (zd + zo_f) * v / den, -zo_f * v / den)
        }
    }
}

/// What was faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnbalancedFaultKind {
    #[display("{_0}")]
    Shunt(UnbalancedFaultType),
    #[display("CommonSupport{_0}")]
    CommonSupport(BiphasedCommonSupportType),
}

/// Fault quantities at the second bus of a common-support fault.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondBusResult {
    pub bus: usize,
    pub bus_id: String,
    pub v_init: Complex64,
    pub current: Fortescue,
    pub voltage: Fortescue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnbalancedFaultResult {
    pub fault_id: String,
    pub kind: UnbalancedFaultKind,
    pub bus: usize,
    pub bus_id: String,
    /// Bus nominal voltage (kV).
    pub nominal_v: f64,
    pub zd: Complex64,
    pub zo: Complex64,
    pub v_init: Complex64,
    /// Sequence currents leaving the network at the fault bus (p.u.).
    pub current: Fortescue,
    /// Post-fault sequence voltages at the fault bus (p.u.).
    pub voltage: Fortescue,
    pub second: Option<SecondBusResult>,
    /// Sequence voltage change of every bus when the voltage update is on.
    pub delta_v: BTreeMap<usize, Fortescue>,
}

impl UnbalancedFaultResult {
    pub fn phase_currents(&self) -> [Complex64; 3] {
        self.current.phases()
    }

    pub fn phase_voltages(&self) -> [Complex64; 3] {
        self.voltage.phases()
    }
}

/// Unbalanced fault computation from one direct and one zero-sequence linear resolution.
pub struct UnbalancedFaultEngine<'a> {
    network: &'a Network,
    params: UnbalancedFaultParameters,
}

impl<'a> UnbalancedFaultEngine<'a> {
    pub fn new(network: &'a Network, params: UnbalancedFaultParameters) -> Self {
        Self { network, params }
    }

    /// Results in input order, shunt faults first; faults that could not be located are absent.
    pub fn run(&self) -> Result<Vec<UnbalancedFaultResult>> {
        let direct = LinearResolution::new(self.network, self.params.linear_resolution(AdmittanceType::AdmThevenin)).run()?;
        let homopolar = LinearResolution::new(
            self.network,
            self.params.linear_resolution(AdmittanceType::AdmTheveninHomopolar),
        )
        .run()?;

        let mut results = Vec::with_capacity(direct.fault_buses.len());
        for located in &direct.fault_buses {
            let Some((th_d, th_o)) = Self::equivalents(&direct, &homopolar, located.bus) else {
                warn!(fault = %located.id, "no direct or zero-sequence equivalent for the fault bus, fault ignored");
                continue;
            };
            let result = match located.second_bus {
                None => {
                    let Some(fault) = self.params.faults.get(located.index) else {
                        continue;
                    };
                    self.shunt_fault(fault, th_d, th_o)?
                }
                Some(bus2) => {
                    let Some(fault) = self.params.common_support_faults.get(located.index) else {
                        continue;
                    };
                    let parts = th_d
                        .biphased
                        .iter()
                        .find(|p| p.bus2 == bus2)
                        .zip(th_o.biphased.iter().find(|p| p.bus2 == bus2));
                    let Some((part_d, part_o)) = parts else {
                        warn!(fault = %located.id, "no mutual impedance for the second bus, fault ignored");
                        continue;
                    };
                    self.common_support_fault(fault, th_d, th_o, part_d, part_o)?
                }
            };
            debug!(fault = %result.fault_id, kind = %result.kind, current = ?result.current, "unbalanced fault");
            results.push(result);
        }
        info!(results = results.len(), "unbalanced short-circuit computation done");
        Ok(results)
    }

    fn equivalents<'o>(
        direct: &'o LinearResolutionOutput,
        homopolar: &'o LinearResolutionOutput,
        bus: usize,
    ) -> Option<(&'o TheveninResult, &'o TheveninResult)> {
        direct.result_at(bus).zip(homopolar.result_at(bus))
    }

    fn shunt_fault(&self, fault: &UnbalancedFault, th_d: &TheveninResult, th_o: &TheveninResult) -> Result<UnbalancedFaultResult> {
        let bus = self.network.bus(th_d.bus)?;
        let (v, zd, zo) = (th_d.eth(), th_d.zth(), th_o.zth());
        let zf = Complex64::new(fault.fault.rf, fault.fault.xf);
        let current = shunt_fault_currents(fault.fault_type, v, zd, zo, zf);
        let voltage = Fortescue::new(-zo * current.zero, v - zd * current.direct, -zd * current.inverse);

        let mut delta_v = BTreeMap::new();
        if let Some(blocks) = &th_d.delta_v {
            let blocks_o = th_o.delta_v.as_ref();
            for (&num, block) in blocks {
                let zd_n = block_z(block);
                let zo_n = blocks_o.and_then(|b| b.get(&num)).map(block_z).unwrap_or_default();
                delta_v.insert(
                    num,
                    -Fortescue::new(zo_n * current.zero, zd_n * current.direct, zd_n * current.inverse),
                );
            }
        }

        Ok(UnbalancedFaultResult {
            fault_id: fault.fault.id.clone(),
            kind: UnbalancedFaultKind::Shunt(fault.fault_type),
            bus: th_d.bus,
            bus_id: bus.id.clone(),
            nominal_v: bus.nominal_v,
            zd,
            zo,
            v_init: v,
            current,
            voltage,
            second: None,
            delta_v,
        })
    }

    /// Phase `p1` of the first bus joined to phase `p2` of the second bus through `Zf`.
    ///
    /// With `f1`, `f2` the phase factors, the fault current is
    /// `Ic = (f1·V1 - f2·V2) / Zt` where `Zt` gathers `Zf` and the sequence impedances
    /// `Z11`, `Z12`, `Z21`, `Z22` seen through the phase factors.
    fn common_support_fault(
        &self,
        fault: &CommonSupportFault,
        th_d: &TheveninResult,
        th_o: &TheveninResult,
        part_d: &BiphasedResult,
        part_o: &BiphasedResult,
    ) -> Result<UnbalancedFaultResult> {
        let bus1 = self.network.bus(th_d.bus)?;
        let bus2 = self.network.bus(part_d.bus2)?;
        let (p1, p2) = fault.support_type.phases();
        let (f1, f2) = (p1.factor(), p2.factor());

        let v1 = th_d.eth();
        let v2 = Complex64::new(part_d.v2x, part_d.v2y);
        let (zd11, zd12, zd21, zd22) = (th_d.zth(), block_z(&part_d.z12), block_z(&part_d.z21), block_z(&part_d.z22));
        let (zo11, zo12, zo21, zo22) = (th_o.zth(), block_z(&part_o.z12), block_z(&part_o.z21), block_z(&part_o.z22));
        let (zi11, zi12, zi21, zi22) = (zd11, zd12, zd21, zd22);
        let zf = Complex64::new(fault.fault.rf, fault.fault.xf);

        let zt = zf
            + (zo11 - zo12 - zo21 + zo22 + zd11 + zd22 - f1 / f2 * zd12 - f2 / f1 * zd21 + zi11 + zi22
                - f2 / f1 * zi12
                - f1 / f2 * zi21)
                / 3.0;
        let ic = (f1 * v1 - f2 * v2) / zt;
        let i1 = Fortescue::single_phase(p1, ic);
        let i2 = Fortescue::single_phase(p2, -ic);

        type Pair = (Complex64, Complex64);
        let sequence_voltage = |v_init: Complex64, (zo_a, zo_b): Pair, (zd_a, zd_b): Pair, (zi_a, zi_b): Pair| {
            Fortescue::new(
                -(zo_a * i1.zero + zo_b * i2.zero),
                v_init - (zd_a * i1.direct + zd_b * i2.direct),
                -(zi_a * i1.inverse + zi_b * i2.inverse),
            )
        };
        let voltage1 = sequence_voltage(v1, (zo11, zo12), (zd11, zd12), (zi11, zi12));
        let voltage2 = sequence_voltage(v2, (zo21, zo22), (zd21, zd22), (zi21, zi22));

        let mut delta_v = BTreeMap::new();
        if let (Some(d1), Some(d2)) = (&th_d.delta_v, &part_d.delta_v2) {
            let (o1, o2) = (th_o.delta_v.as_ref(), part_o.delta_v2.as_ref());
            let zo_at = |blocks: Option<&BTreeMap<usize, Matrix2<f64>>>, num: usize| {
                blocks.and_then(|b| b.get(&num)).map(block_z).unwrap_or_default()
            };
            for (&num, block) in d1 {
                let zd_n1 = block_z(block);
                let zd_n2 = d2.get(&num).map(block_z).unwrap_or_default();
                let (zo_n1, zo_n2) = (zo_at(o1, num), zo_at(o2, num));
                delta_v.insert(
                    num,
                    -Fortescue::new(
                        zo_n1 * i1.zero + zo_n2 * i2.zero,
                        zd_n1 * i1.direct + zd_n2 * i2.direct,
                        zd_n1 * i1.inverse + zd_n2 * i2.inverse,
                    ),
                );
            }
        }

        Ok(UnbalancedFaultResult {
            fault_id: fault.fault.id.clone(),
            kind: UnbalancedFaultKind::CommonSupport(fault.support_type),
            bus: th_d.bus,
            bus_id: bus1.id.clone(),
            nominal_v: bus1.nominal_v,
            zd: zd11,
            zo: zo11,
            v_init: v1,
            current: i1,
            voltage: voltage1,
            second: Some(SecondBusResult {
                bus: part_d.bus2,
                bus_id: bus2.id.clone(),
                v_init: v2,
                current: i2,
                voltage: voltage2,
            }),
            delta_v,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::network::{OperatingPoint, ZeroSequenceData};
    use crate::basic::thevenin::FaultLocation;
    use crate::testcases::two_bus_network;

    const EPS: f64 = 1e-9;

    fn close(x: Complex64, y: Complex64) -> bool {
        (x - y).norm() < EPS
    }

    /// Grounded machine (Xo = X"d) on B1 and a line with Zo = 3·Zd.
    fn grounded_network() -> Network {
        let mut net = two_bus_network();
        if let Some(sc) = net.generators[0].short_circuit.as_mut() {
            sc.grounded = true;
        }
        net.branches[0].zero_sequence = Some(ZeroSequenceData {
            coeff_ro: 3.0,
            coeff_xo: 3.0,
            ..Default::default()
        });
        net
    }

    fn shunt_fault(fault_type: UnbalancedFaultType, rf: f64, xf: f64) -> UnbalancedFault {
        let mut fault = ShortCircuitFault::new("F2", FaultLocation::new("L1", 2));
        fault.rf = rf;
        fault.xf = xf;
        UnbalancedFault::new(fault, fault_type)
    }

    fn run(params: UnbalancedFaultParameters) -> Vec<UnbalancedFaultResult> {
        UnbalancedFaultEngine::new(&grounded_network(), params).run().unwrap()
    }

    #[test]
    fn test_fortescue_phases() {
        let balanced = Fortescue::new(Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0));
        let [va, vb, vc] = balanced.phases();
        assert!(close(va, Complex64::new(1.0, 0.0)));
        assert!(close(vb, Complex64::from_polar(1.0, -2.0 * std::f64::consts::FRAC_PI_3)));
        assert!(close(vc, Complex64::from_polar(1.0, 2.0 * std::f64::consts::FRAC_PI_3)));

        let i = Complex64::new(0.3, -1.2);
        for phase in [Phase::A, Phase::B, Phase::C] {
            let seq = Fortescue::single_phase(phase, i);
            let phases = seq.phases();
            for (p, value) in [Phase::A, Phase::B, Phase::C].into_iter().zip(phases) {
                let expected = if p == phase { i } else { Complex64::new(0.0, 0.0) };
                assert!(close(value, expected), "{phase} -> {p}: {value}");
            }
        }
    }

    #[test]
    fn test_monophased_fault() {
        let results = run(UnbalancedFaultParameters {
            voltage_update: true,
            faults: vec![shunt_fault(UnbalancedFaultType::Monophased, 0.01, 0.0)],
            ..Default::default()
        });
        assert_eq!(results.len(), 1);
        let res = &results[0];
        assert!(close(res.zd, Complex64::new(0.01, 0.2)), "zd = {}", res.zd);
        assert!(close(res.zo, Complex64::new(0.03, 0.4)), "zo = {}", res.zo);

        let zf = Complex64::new(0.01, 0.0);
        let zt = Complex64::new(0.05, 0.8) / 3.0 + zf;
        let ic = a() / zt;
        let [ia, ib, icc] = res.phase_currents();
        assert!(ia.norm() < EPS && ib.norm() < EPS, "{ia} {ib}");
        assert!(close(icc, ic), "Ic = {icc}, expected {ic}");
        assert!(close(res.current.direct, a2() * res.current.zero));
        assert!(close(res.current.inverse, a() * res.current.zero));

        // the faulted phase sits at Zf·Ic
        let [_, _, vc] = res.phase_voltages();
        assert!(close(vc, zf * icc), "Vc = {vc}");

        // the voltage update agrees with the fault bus voltages
        let dv = res.delta_v[&1];
        assert!(close(res.v_init + dv.direct, res.voltage.direct));
        assert!(close(dv.zero, res.voltage.zero));
        assert!(close(dv.inverse, res.voltage.inverse));
        // the generator bus sees the machine share of the drop
        let dv_gen = res.delta_v[&0];
        assert!(close(dv_gen.direct, -Complex64::new(0.0, 0.1) * res.current.direct));
    }

    #[test]
    fn test_biphased_fault() {
        let results = run(UnbalancedFaultParameters {
            faults: vec![shunt_fault(UnbalancedFaultType::Biphased, 0.0, 0.05)],
            ..Default::default()
        });
        let res = &results[0];
        let zf = Complex64::new(0.0, 0.05);
        assert!(close(res.current.direct, 1.0 / (2.0 * res.zd + zf)));
        let [ia, ib, ic] = res.phase_currents();
        assert!(ia.norm() < EPS);
        assert!(close(ib, -ic));
        let [_, vb, vc] = res.phase_voltages();
        assert!(close(vb - vc, zf * ib), "Vb - Vc = {}", vb - vc);
        assert!(res.delta_v.is_empty());
    }

    #[test]
    fn test_biphased_ground_fault() {
        let results = run(UnbalancedFaultParameters {
            faults: vec![shunt_fault(UnbalancedFaultType::BiphasedGround, 0.02, 0.01)],
            ..Default::default()
        });
        let res = &results[0];
        let zf = Complex64::new(0.02, 0.01);
        let [ia, ib, ic] = res.phase_currents();
        assert!(ia.norm() < EPS, "Ia = {ia}");
        let [_, vb, vc] = res.phase_voltages();
        assert!(close(vb, vc), "{vb} {vc}");
        assert!(close(vb, zf * (ib + ic)), "Vb = {vb}");
        assert!(close(ib + ic, 3.0 * res.current.zero));
    }

    fn common_support_params(support_type: BiphasedCommonSupportType) -> UnbalancedFaultParameters {
        let mut fault = ShortCircuitFault::new("CS", FaultLocation::new("L1", 1));
        fault.second_location = Some(FaultLocation::new("L1", 2));
        fault.rf = 0.02;
        fault.xf = 0.05;
        UnbalancedFaultParameters {
            voltage_profile: AdmittanceVoltageProfileType::Calculated,
            voltage_update: true,
            common_support_faults: vec![CommonSupportFault::new(fault, support_type)],
            ..Default::default()
        }
    }

    fn run_with_operating_point(params: UnbalancedFaultParameters) -> UnbalancedFaultResult {
        let mut net = grounded_network();
        net.buses[0].operating_point = Some(OperatingPoint {
            v: 1.0,
            ..Default::default()
        });
        net.buses[1].operating_point = Some(OperatingPoint {
            v: 0.98,
            angle: -5.0,
            ..Default::default()
        });
        let mut results = UnbalancedFaultEngine::new(&net, params).run().unwrap();
        assert_eq!(results.len(), 1);
        results.remove(0)
    }

    #[test]
    fn test_common_support_same_phase() {
        let res = run_with_operating_point(common_support_params(BiphasedCommonSupportType::C1C2));
        let second = res.second.as_ref().unwrap();
        assert_eq!((res.bus, second.bus), (0, 1));
        assert!(close(second.v_init, Complex64::from_polar(0.98, (-5.0f64).to_radians())));

        let [ia1, ib1, ic1] = res.phase_currents();
        let [ia2, ib2, ic2] = second.current.phases();
        assert!(ia1.norm() < EPS && ib1.norm() < EPS);
        assert!(ia2.norm() < EPS && ib2.norm() < EPS);
        assert!(close(ic2, -ic1));
        assert!(ic1.norm() > 0.0);

        let zf = Complex64::new(0.02, 0.05);
        let vc1 = res.voltage.phase(Phase::C);
        let vc2 = second.voltage.phase(Phase::C);
        assert!(close(vc1 - vc2, zf * ic1), "Vc1 - Vc2 = {}", vc1 - vc2);

        // the voltage update agrees at both buses
        let dv1 = res.delta_v[&0];
        assert!(close(res.v_init + dv1.direct, res.voltage.direct));
        assert!(close(dv1.zero, res.voltage.zero));
        let dv2 = res.delta_v[&1];
        assert!(close(second.v_init + dv2.direct, second.voltage.direct));
        assert!(close(dv2.inverse, second.voltage.inverse));
    }

    #[test]
    fn test_common_support_across_phases() {
        let res = run_with_operating_point(common_support_params(BiphasedCommonSupportType::C1A2));
        let second = res.second.as_ref().unwrap();
        let [_, _, ic1] = res.phase_currents();
        let [ia2, ib2, ic2] = second.current.phases();
        assert!(close(ia2, -ic1));
        assert!(ib2.norm() < EPS && ic2.norm() < EPS);

        let zf = Complex64::new(0.02, 0.05);
        let vc1 = res.voltage.phase(Phase::C);
        let va2 = second.voltage.phase(Phase::A);
        assert!(close(vc1 - va2, zf * ic1), "Vc1 - Va2 = {}", vc1 - va2);
        assert_eq!(res.kind, UnbalancedFaultKind::CommonSupport(BiphasedCommonSupportType::C1A2));
    }

    #[test]
    fn test_parameters_from_json() {
        let params = UnbalancedFaultParameters::from_json_str(
            r#"{
                "voltage_update": true,
                "faults": [{"id": "F", "location": {"branch_id": "L1", "side": 2}, "fault_type": "BiphasedGround"}],
                "common_support_faults": [{
                    "id": "CS",
                    "location": {"branch_id": "L1", "side": 1},
                    "second_location": {"branch_id": "L1", "side": 2},
                    "support_type": "C1B2"
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(params.faults[0].fault_type, UnbalancedFaultType::BiphasedGround);
        assert_eq!(params.faults[0].fault.location.side, 2);
        assert_eq!(params.common_support_faults[0].support_type, BiphasedCommonSupportType::C1B2);
        assert_eq!(BiphasedCommonSupportType::C1B2.phases(), (Phase::C, Phase::B));
    }
}
