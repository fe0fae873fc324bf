use std::fmt;

use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::balanced::ShortCircuitResult;
use super::thevenin::TheveninResult;
use super::unbalanced::UnbalancedFaultResult;

/// A float printed with a fixed number of decimals.
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub(crate) struct FloatWrapper {
    pub(crate) value: f64,
    pub(crate) precision: usize,
}

impl FloatWrapper {
    pub fn new(value: f64, precision: usize) -> Self {
        FloatWrapper { value, precision }
    }
}

impl fmt::Display for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

impl fmt::Debug for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Table row for Thevenin equivalents.
#[derive(Debug, Tabled)]
#[allow(non_snake_case)]
pub(crate) struct TheveninResTable {
    pub(crate) Bus: String,
    pub(crate) Rth_pu: FloatWrapper,
    pub(crate) Xth_pu: FloatWrapper,
    pub(crate) Eth_pu: FloatWrapper,
    pub(crate) Eth_deg: FloatWrapper,
}

impl From<&TheveninResult> for TheveninResTable {
    fn from(res: &TheveninResult) -> Self {
        let eth = res.eth();
        TheveninResTable {
            Bus: res.bus_id.clone(),
            Rth_pu: FloatWrapper::new(res.r_eq11, 6),
            Xth_pu: FloatWrapper::new(res.x_eq12, 6),
            Eth_pu: FloatWrapper::new(eth.norm(), 4),
            Eth_deg: FloatWrapper::new(eth.arg().to_degrees(), 3),
        }
    }
}

/// Table row for three-phase fault results.
#[derive(Debug, Tabled)]
#[allow(non_snake_case)]
pub(crate) struct FaultResTable {
    pub(crate) Fault: String,
    pub(crate) Bus: String,
    pub(crate) Icc_ka: FloatWrapper,
    pub(crate) Pcc_mva: FloatWrapper,
    pub(crate) Vf_pu: FloatWrapper,
}

impl From<&ShortCircuitResult> for FaultResTable {
    fn from(res: &ShortCircuitResult) -> Self {
        FaultResTable {
            Fault: res.fault_id.clone(),
            Bus: res.bus_id.clone(),
            Icc_ka: FloatWrapper::new(res.icc() / 1000.0, 4),
            Pcc_mva: FloatWrapper::new(res.pcc(), 2),
            Vf_pu: FloatWrapper::new(res.v_fault.norm(), 4),
        }
    }
}

/// Table row for feeder contributions.
#[derive(Debug, Tabled)]
#[allow(non_snake_case)]
pub(crate) struct FeederResTable {
    pub(crate) Fault: String,
    pub(crate) Bus: usize,
    pub(crate) Feeder: String,
    pub(crate) Kind: String,
    pub(crate) Ix_pu: FloatWrapper,
    pub(crate) Iy_pu: FloatWrapper,
}

/// Table row for unbalanced faults: phase current and voltage magnitudes at the fault bus.
#[derive(Debug, Tabled)]
#[allow(non_snake_case)]
pub(crate) struct UnbalancedResTable {
    pub(crate) Fault: String,
    pub(crate) Kind: String,
    pub(crate) Bus: String,
    pub(crate) Ia_pu: FloatWrapper,
    pub(crate) Ib_pu: FloatWrapper,
    pub(crate) Ic_pu: FloatWrapper,
    pub(crate) Va_pu: FloatWrapper,
    pub(crate) Vb_pu: FloatWrapper,
    pub(crate) Vc_pu: FloatWrapper,
}

impl From<&UnbalancedFaultResult> for UnbalancedResTable {
    fn from(res: &UnbalancedFaultResult) -> Self {
        let [ia, ib, ic] = res.phase_currents();
        let [va, vb, vc] = res.phase_voltages();
        UnbalancedResTable {
            Fault: res.fault_id.clone(),
            Kind: res.kind.to_string(),
            Bus: res.bus_id.clone(),
            Ia_pu: FloatWrapper::new(ia.norm(), 4),
            Ib_pu: FloatWrapper::new(ib.norm(), 4),
            Ic_pu: FloatWrapper::new(ic.norm(), 4),
            Va_pu: FloatWrapper::new(va.norm(), 4),
            Vb_pu: FloatWrapper::new(vb.norm(), 4),
            Vc_pu: FloatWrapper::new(vc.norm(), 4),
        }
    }
}

/// Renders Thevenin equivalents as a markdown table.
pub fn thevenin_table(results: &[TheveninResult]) -> String {
    let rows = results.iter().map(TheveninResTable::from);
    Table::new(rows).with(Style::markdown()).to_string()
}

/// Renders fault currents and powers as a markdown table.
pub fn fault_table(results: &[ShortCircuitResult]) -> String {
    let rows = results.iter().map(FaultResTable::from);
    Table::new(rows).with(Style::markdown()).to_string()
}

/// Renders the feeder contributions of every fault (voltage update runs only).
pub fn feeder_table(results: &[ShortCircuitResult]) -> String {
    let rows = results.iter().flat_map(|res| {
        res.feeders.iter().flat_map(move |(bus, at_bus)| {
            at_bus.results().iter().map(move |f| FeederResTable {
                Fault: res.fault_id.clone(),
                Bus: *bus,
                Feeder: f.feeder.id.clone(),
                Kind: f.feeder.kind.to_string(),
                Ix_pu: FloatWrapper::new(f.ix, 5),
                Iy_pu: FloatWrapper::new(f.iy, 5),
            })
        })
    });
    Table::new(rows).with(Style::markdown()).to_string()
}

/// Renders unbalanced fault results as a markdown table, one row per fault bus.
pub fn unbalanced_table(results: &[UnbalancedFaultResult]) -> String {
    let rows = results.iter().map(UnbalancedResTable::from);
    Table::new(rows).with(Style::markdown()).to_string()
}

/// Prints every table of a three-phase fault run.
pub fn print_fault_results(results: &[ShortCircuitResult]) {
    println!("{}", fault_table(results));
    if results.iter().any(|r| !r.feeders.is_empty()) {
        println!("{}", feeder_table(results));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::balanced::{BalancedFaultEngine, BalancedFaultParameters};
    use crate::basic::thevenin::{FaultLocation, LinearResolution, LinearResolutionParameters, ShortCircuitFault};
    use crate::basic::unbalanced::{UnbalancedFault, UnbalancedFaultEngine, UnbalancedFaultParameters, UnbalancedFaultType};
    use crate::testcases::two_bus_network;

    #[test]
    fn test_float_wrapper_precision() {
        assert_eq!(FloatWrapper::new(1.23456, 3).to_string(), "1.235");
        assert_eq!(format!("{:?}", FloatWrapper::new(2.0, 1)), "2.0");
    }

    #[test]
    fn test_fault_tables() {
        let net = two_bus_network();
        let params = BalancedFaultParameters {
            voltage_update: true,
            faults: vec![ShortCircuitFault::new("F2", FaultLocation::new("L1", 2))],
            ..Default::default()
        };
        let results = BalancedFaultEngine::new(&net, params).run().unwrap();
        let table = fault_table(&results);
        assert!(table.contains("Icc_ka"), "{table}");
        assert!(table.contains("| F2"), "{table}");
        let feeders = feeder_table(&results);
        assert!(feeders.contains("G1"), "{feeders}");
        assert!(feeders.contains("Generator"), "{feeders}");
    }

    #[test]
    fn test_thevenin_table() {
        let net = two_bus_network();
        let params = LinearResolutionParameters {
            faults: vec![ShortCircuitFault::new("F2", FaultLocation::new("L1", 2))],
            ..Default::default()
        };
        let output = LinearResolution::new(&net, params).run().unwrap();
        let table = thevenin_table(&output.results);
        assert!(table.contains("Rth_pu"), "{table}");
        assert!(table.contains("0.010000"), "{table}");
        assert!(table.contains("0.200000"), "{table}");
    }

    #[test]
    fn test_unbalanced_table() {
        let mut net = two_bus_network();
        if let Some(sc) = net.generators[0].short_circuit.as_mut() {
            sc.grounded = true;
        }
        let fault = ShortCircuitFault::new("F2", FaultLocation::new("L1", 2));
        let params = UnbalancedFaultParameters {
            faults: vec![UnbalancedFault::new(fault, UnbalancedFaultType::Biphased)],
            ..Default::default()
        };
        let results = UnbalancedFaultEngine::new(&net, params).run().unwrap();
        let table = unbalanced_table(&results);
        assert!(table.contains("Ic_pu"), "{table}");
        assert!(table.contains("| Biphased"), "{table}");
        assert!(table.contains("| B2"), "{table}");
    }
}
