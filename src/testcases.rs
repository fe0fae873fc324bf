//! Small networks used by the tests and the documentation.

use crate::basic::network::{Branch, BranchKind, Bus, Generator, Network, PiModel, ShortCircuitMachineInfo};

/// Two 100 kV buses joined by a line `0.01 + j0.1` p.u., with a machine of x"d = 10 ohms
/// (0.1 p.u.) on the first bus.
pub const TWO_BUS_JSON: &str = r#"{
    "buses": [
        {"id": "B1", "nominal_v": 100.0},
        {"id": "B2", "nominal_v": 100.0}
    ],
    "branches": [
        {"id": "L1", "kind": "Line", "bus1": 0, "bus2": 1, "pi": {"r": 0.01, "x": 0.1}}
    ],
    "generators": [
        {
            "id": "G1",
            "bus": 0,
            "target_p": 0.5,
            "short_circuit": {"trans_xd": 20.0, "sub_trans_xd": 10.0}
        }
    ],
    "slack_bus": 0
}"#;

/// The network of [`TWO_BUS_JSON`].
pub fn two_bus_network() -> Network {
    Network {
        buses: vec![Bus::new("B1", 100.0), Bus::new("B2", 100.0)],
        branches: vec![Branch::new("L1", BranchKind::Line, 0, 1, PiModel::new(0.01, 0.1))],
        generators: vec![Generator {
            id: "G1".into(),
            bus: 0,
            target_p: 0.5,
            target_q: 0.0,
            short_circuit: Some(ShortCircuitMachineInfo {
                trans_xd: 20.0,
                sub_trans_xd: 10.0,
                ..Default::default()
            }),
        }],
        shunts: Vec::new(),
        slack_bus: Some(0),
    }
}

/// Four-bus reference network: a 24 kV generator stepped up to 380 kV, two parallel
/// 380 kV lines and a 380/150 kV transformer feeding a 600 MW load.
///
/// Values are per unit on 100 MVA and the nominal voltage of side 2 of each branch.
pub fn eurostag_network() -> Network {
    let z_hv = 380.0 * 380.0 / 100.0;
    let z_load = 150.0 * 150.0 / 100.0;

    let buses = vec![
        Bus::new("NGEN", 24.0),
        Bus::new("NHV1", 380.0),
        Bus::new("NHV2", 380.0),
        Bus {
            load_p: 6.0,
            load_q: 2.0,
            ..Bus::new("NLOAD", 150.0)
        },
    ];

    let line = |id: &str| {
        Branch::new(
            id,
            BranchKind::Line,
            1,
            2,
            PiModel {
                r: 3.0 / z_hv,
                x: 33.0 / z_hv,
                b1: 1.93e-4 * z_hv,
                b2: 1.93e-4 * z_hv,
                ..Default::default()
            },
        )
    };

    let branches = vec![
        Branch::new(
            "NGEN_NHV1",
            BranchKind::Transfo2,
            0,
            1,
            PiModel {
                r: 0.24 / 1300.0,
                x: 11.104492831516762 / z_hv,
                rho: 400.0 / 380.0,
                ..Default::default()
            },
        ),
        line("NHV1_NHV2_1"),
        line("NHV1_NHV2_2"),
        Branch::new(
            "NHV2_NLOAD",
            BranchKind::Transfo2,
            2,
            3,
            PiModel {
                r: 0.04724 / z_load,
                x: 4.049 / z_load,
                rho: 1.0,
                ..Default::default()
            },
        ),
    ];

    let generators = vec![Generator {
        id: "GEN".into(),
        bus: 0,
        target_p: 6.07,
        target_q: 3.01,
        short_circuit: Some(ShortCircuitMachineInfo {
            trans_xd: 0.4,
            sub_trans_xd: 0.2,
            step_up_x: 0.0,
            ..Default::default()
        }),
    }];

    Network {
        buses,
        branches,
        generators,
        shunts: Vec::new(),
        slack_bus: Some(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_bus_json_matches_constructor() {
        let parsed = Network::from_json_str(TWO_BUS_JSON).unwrap();
        let built = two_bus_network();
        assert_eq!(parsed.buses.len(), built.buses.len());
        assert_eq!(parsed.branches[0].pi, built.branches[0].pi);
        assert_eq!(parsed.branches[0].connected_buses(), Some((0, 1)));
        assert_eq!(parsed.generators[0].short_circuit, built.generators[0].short_circuit);
        assert_eq!(parsed.slack_bus(), 0);
    }

    #[test]
    fn test_json_with_dangling_bus_is_rejected() {
        let json = TWO_BUS_JSON.replace(r#""bus1": 0, "bus2": 1"#, r#""bus1": 0, "bus2": 5"#);
        let err = Network::from_json_str(&json).unwrap_err();
        assert!(
            matches!(err, crate::basic::error::ScError::UnknownBus { bus: 5, .. }),
            "{err}"
        );

        let json = TWO_BUS_JSON.replace(r#""slack_bus": 0"#, r#""slack_bus": 2"#);
        assert!(Network::from_json_str(&json).is_err());
    }

    #[test]
    fn test_bus_lookup() {
        let net = two_bus_network();
        assert_eq!(net.bus(1).unwrap().id, "B2");
        assert!(net.bus(2).is_err());
        assert!(net.validate().is_ok());
    }

    #[test]
    fn test_eurostag_network_shape() {
        let net = eurostag_network();
        assert_eq!(net.bus_index("NLOAD"), Some(3));
        assert_eq!(net.generation_target(0), (6.07, 3.01));
        assert!(net.branch("NHV1_NHV2_2").is_some());
    }
}
