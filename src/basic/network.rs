use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::{Result, ScError};
use super::homopolar::LegConnectionType;

//Electrical values are per unit on Sbase = 100 MVA and the nominal voltage of the bus,
//except the machine impedances which are given in ohms.

/// Operating point of a bus produced by an external load flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatingPoint {
    /// Voltage magnitude (p.u.).
    pub v: f64,
    /// Voltage angle (degrees).
    pub angle: f64,
    /// Net active power injected at the bus (p.u.).
    pub p: f64,
    /// Net reactive power injected at the bus (p.u.).
    pub q: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Bus {
    pub id: String,
    /// Nominal voltage (kV).
    pub nominal_v: f64,
    pub operating_point: Option<OperatingPoint>,
    /// True when the bus voltage is controlled by a generator (PV bus).
    pub voltage_controlled: bool,
    /// Aggregated active load (p.u.).
    pub load_p: f64,
    /// Aggregated reactive load (p.u.).
    pub load_q: f64,
}

impl Bus {
    pub fn new(id: impl Into<String>, nominal_v: f64) -> Self {
        Self {
            id: id.into(),
            nominal_v,
            ..Default::default()
        }
    }
}

/// Kind of a network branch.
///
/// Three-winding transformers are split into three legs connected to a fictitious star bus;
/// the star bus is always on side 2 of each leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
pub enum BranchKind {
    #[default]
    Line,
    Transfo2,
    Transfo3Leg1,
    Transfo3Leg2,
    Transfo3Leg3,
}

impl BranchKind {
    /// Leg number for three-winding transformer legs.
    pub fn leg_number(&self) -> Option<u8> {
        match self {
            BranchKind::Transfo3Leg1 => Some(1),
            BranchKind::Transfo3Leg2 => Some(2),
            BranchKind::Transfo3Leg3 => Some(3),
            BranchKind::Line | BranchKind::Transfo2 => None,
        }
    }

    pub fn is_transformer(&self) -> bool {
        !matches!(self, BranchKind::Line)
    }
}

/// Pi-model of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PiModel {
    pub r: f64,
    pub x: f64,
    pub g1: f64,
    pub b1: f64,
    pub g2: f64,
    pub b2: f64,
    /// Tap ratio on side 1.
    pub rho: f64,
    /// Phase shift on side 1 (degrees).
    pub alpha: f64,
}

impl Default for PiModel {
    fn default() -> Self {
        Self {
            r: 0.0,
            x: 0.0,
            g1: 0.0,
            b1: 0.0,
            g2: 0.0,
            b2: 0.0,
            rho: 1.0,
            alpha: 0.0,
        }
    }
}

impl PiModel {
    pub fn new(r: f64, x: f64) -> Self {
        Self {
            r,
            x,
            ..Default::default()
        }
    }

    pub fn z(&self) -> f64 {
        self.r.hypot(self.x)
    }
}

/// Grounding impedances of the two transformer sides (p.u.).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingImpedance {
    pub rga: f64,
    pub xga: f64,
    pub rgb: f64,
    pub xgb: f64,
}

/// Zero-sequence data attached to a branch.
///
/// For three-winding transformer legs, `leg1_connection` and `free_fluxes` describe the
/// winding of that leg, the star side keeps `leg2_connection`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZeroSequenceData {
    /// Ro = coeff_ro * Rd.
    pub coeff_ro: f64,
    /// Xo = coeff_xo * Xd.
    pub coeff_xo: f64,
    pub leg1_connection: LegConnectionType,
    pub leg2_connection: LegConnectionType,
    pub free_fluxes: bool,
    pub grounding: GroundingImpedance,
}

impl Default for ZeroSequenceData {
    fn default() -> Self {
        Self {
            coeff_ro: 1.0,
            coeff_xo: 1.0,
            leg1_connection: LegConnectionType::YGrounded,
            leg2_connection: LegConnectionType::YGrounded,
            free_fluxes: false,
            grounding: GroundingImpedance::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Branch {
    pub id: String,
    pub kind: BranchKind,
    /// Bus number of side 1, `None` when the side is disconnected.
    pub bus1: Option<usize>,
    /// Bus number of side 2, `None` when the side is disconnected.
    pub bus2: Option<usize>,
    pub pi: PiModel,
    pub zero_sequence: Option<ZeroSequenceData>,
}

impl Branch {
    pub fn new(id: impl Into<String>, kind: BranchKind, bus1: usize, bus2: usize, pi: PiModel) -> Self {
        Self {
            id: id.into(),
            kind,
            bus1: Some(bus1),
            bus2: Some(bus2),
            pi,
            zero_sequence: None,
        }
    }

    /// Both end buses when the branch is closed on both sides.
    pub fn connected_buses(&self) -> Option<(usize, usize)> {
        self.bus1.zip(self.bus2)
    }
}

/// Short-circuit data of a synchronous machine.
///
/// Impedances are in ohms on the nominal voltage of the connection bus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortCircuitMachineInfo {
    pub trans_rd: f64,
    pub trans_xd: f64,
    pub sub_trans_rd: f64,
    pub sub_trans_xd: f64,
    pub step_up_r: f64,
    pub step_up_x: f64,
    /// Impedance correction factor.
    pub k_g: f64,
    pub grounded: bool,
    pub coeff_ro: f64,
    pub coeff_xo: f64,
}

impl Default for ShortCircuitMachineInfo {
    fn default() -> Self {
        Self {
            trans_rd: 0.0,
            trans_xd: 0.0,
            sub_trans_rd: 0.0,
            sub_trans_xd: 0.0,
            step_up_r: 0.0,
            step_up_x: 0.0,
            k_g: 1.0,
            grounded: false,
            coeff_ro: 1.0,
            coeff_xo: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Generator {
    pub id: String,
    pub bus: usize,
    /// Active power target (p.u.).
    pub target_p: f64,
    /// Reactive power target (p.u.).
    pub target_q: f64,
    pub short_circuit: Option<ShortCircuitMachineInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Shunt {
    pub id: String,
    pub bus: usize,
    /// Susceptance (p.u.).
    pub b: f64,
    /// True for voltage-controlling shunts.
    pub controlled: bool,
}

/// An already-built bus/branch network. Bus numbers are indices into `buses`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
    pub generators: Vec<Generator>,
    pub shunts: Vec<Shunt>,
    /// Slack bus number, the first bus when not given.
    pub slack_bus: Option<usize>,
}

impl Network {
    /// Parses a network serialized as JSON and checks its bus references.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let network: Self = serde_json::from_str(s)?;
        network.validate()?;
        Ok(network)
    }

    /// Checks that every element refers to an existing bus.
    pub fn validate(&self) -> Result<()> {
        let check = |element: &str, bus: usize| {
            if bus < self.buses.len() {
                Ok(())
            } else {
                Err(ScError::UnknownBus {
                    element: element.to_string(),
                    bus,
                })
            }
        };
        for branch in &self.branches {
            for bus in [branch.bus1, branch.bus2].into_iter().flatten() {
                check(&format!("branch '{}'", branch.id), bus)?;
            }
        }
        for g in &self.generators {
            check(&format!("generator '{}'", g.id), g.bus)?;
        }
        for s in &self.shunts {
            check(&format!("shunt '{}'", s.id), s.bus)?;
        }
        if let Some(slack) = self.slack_bus {
            check("slack", slack)?;
        }
        Ok(())
    }

    /// Bus `num`, or [`ScError::UnknownBus`].
    pub fn bus(&self, num: usize) -> Result<&Bus> {
        self.buses.get(num).ok_or_else(|| ScError::UnknownBus {
            element: "bus lookup".to_string(),
            bus: num,
        })
    }

    pub fn slack_bus(&self) -> usize {
        self.slack_bus.unwrap_or(0)
    }

    pub fn bus_index(&self, id: &str) -> Option<usize> {
        self.buses.iter().position(|b| b.id == id)
    }

    pub fn branch(&self, id: &str) -> Option<&Branch> {
        self.branches.iter().find(|b| b.id == id)
    }

    pub fn generators_at(&self, bus: usize) -> impl Iterator<Item = &Generator> {
        self.generators.iter().filter(move |g| g.bus == bus)
    }

    pub fn shunts_at(&self, bus: usize) -> impl Iterator<Item = &Shunt> {
        self.shunts.iter().filter(move |s| s.bus == bus)
    }

    /// Total generation target at a bus (p.u.).
    pub fn generation_target(&self, bus: usize) -> (f64, f64) {
        self.generators_at(bus)
            .fold((0.0, 0.0), |(p, q), g| (p + g.target_p, q + g.target_q))
    }

    /// Opens both sides of a branch. Returns false when the branch does not exist.
    pub fn disconnect_branch(&mut self, id: &str) -> bool {
        match self.branches.iter_mut().find(|b| b.id == id) {
            Some(branch) => {
                branch.bus1 = None;
                branch.bus2 = None;
                true
            }
            None => false,
        }
    }
}
