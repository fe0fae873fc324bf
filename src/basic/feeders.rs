use std::collections::BTreeMap;

use derive_more::Display;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::debug;

const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum FeederKind {
    Generator,
    Load,
    Shunt,
    ControlledShunt,
}

/// Shunt admittance of an element folded into the admittance matrix at a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feeder {
    pub id: String,
    pub kind: FeederKind,
    pub g: f64,
    pub b: f64,
}

impl Feeder {
    pub fn new(id: impl Into<String>, kind: FeederKind, g: f64, b: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            g,
            b,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedersAtBus {
    pub bus: usize,
    pub feeders: Vec<Feeder>,
}

/// Feeders recorded per bus number while building a Thevenin admittance system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedersAtNetwork {
    pub bus_to_feeders: BTreeMap<usize, FeedersAtBus>,
}

impl FeedersAtNetwork {
    pub fn insert(&mut self, feeders: FeedersAtBus) {
        self.bus_to_feeders.insert(feeders.bus, feeders);
    }

    pub fn at_bus(&self, bus: usize) -> Option<&FeedersAtBus> {
        self.bus_to_feeders.get(&bus)
    }
}

/// Current contribution of one feeder (p.u.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeederResult {
    pub feeder: Feeder,
    pub ix: f64,
    pub iy: f64,
}

impl FeederResult {
    pub fn current(&self) -> Complex64 {
        Complex64::new(self.ix, self.iy)
    }
}

/// Splits the current flowing into a bus from its branches among its feeders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedersAtBusResult {
    pub bus: usize,
    ix_sum: f64,
    iy_sum: f64,
    results: Vec<FeederResult>,
}

impl FeedersAtBusResult {
    pub fn new(feeders: &FeedersAtBus) -> Self {
        Self {
            bus: feeders.bus,
            ix_sum: 0.0,
            iy_sum: 0.0,
            results: feeders
                .feeders
                .iter()
                .map(|f| FeederResult {
                    feeder: f.clone(),
                    ix: 0.0,
                    iy: 0.0,
                })
                .collect(),
        }
    }

    /// Adds a branch current to the sum seen by the feeders.
    pub fn add_branch_current(&mut self, ix: f64, iy: f64) {
        self.ix_sum += ix;
        self.iy_sum += iy;
    }

    pub fn current_sum(&self) -> Complex64 {
        Complex64::new(self.ix_sum, self.iy_sum)
    }

    /// Apportions the accumulated current in proportion to the feeder admittances.
    ///
    /// With `Y = gSum + j bSum` the total admittance, feeder `k` receives `I * yk / Y`.
    /// Nothing is updated when the total admittance is negligible.
    pub fn update_contributions(&mut self) {
        let (g_sum, b_sum) = self
            .results
            .iter()
            .fold((0.0, 0.0), |(g, b), r| (g + r.feeder.g, b + r.feeder.b));
        if g_sum.abs() <= EPSILON && b_sum.abs() <= EPSILON {
            return;
        }
        let det = 1.0 / (g_sum * g_sum + b_sum * b_sum);
        let (ix, iy) = (self.ix_sum, self.iy_sum);
        for r in &mut self.results {
            let (gk, bk) = (r.feeder.g, r.feeder.b);
            r.ix += det * ((gk * g_sum + bk * b_sum) * ix + (gk * b_sum - g_sum * bk) * iy);
            r.iy += det * ((-gk * b_sum + g_sum * bk) * ix + (gk * g_sum + bk * b_sum) * iy);
            debug!(bus = self.bus, feeder = %r.feeder.id, kind = %r.feeder.kind, ix = r.ix, iy = r.iy, "feeder contribution");
        }
    }

    pub fn results(&self) -> &[FeederResult] {
        &self.results
    }

    pub fn feeder(&self, id: &str) -> Option<&FeederResult> {
        self.results.iter().find(|r| r.feeder.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_feeder_takes_whole_current() {
        let feeders = FeedersAtBus {
            bus: 2,
            feeders: vec![Feeder::new("G1", FeederKind::Generator, 0.3, -4.0)],
        };
        let mut res = FeedersAtBusResult::new(&feeders);
        res.add_branch_current(1.5, -2.0);
        res.add_branch_current(0.5, 0.5);
        res.update_contributions();
        let g1 = res.feeder("G1").unwrap();
        assert!((g1.ix - 2.0).abs() < 1e-12, "ix = {}", g1.ix);
        assert!((g1.iy + 1.5).abs() < 1e-12, "iy = {}", g1.iy);
    }

    #[test]
    fn test_split_follows_admittances() {
        let feeders = FeedersAtBus {
            bus: 0,
            feeders: vec![
                Feeder::new("G1", FeederKind::Generator, 0.0, -3.0),
                Feeder::new("G2", FeederKind::Generator, 0.0, -1.0),
                Feeder::new("0", FeederKind::Load, 0.0, 0.0),
            ],
        };
        let mut res = FeedersAtBusResult::new(&feeders);
        res.add_branch_current(0.0, -8.0);
        res.update_contributions();
        let total: Complex64 = res.results().iter().map(|r| r.current()).sum();
        assert!((total - res.current_sum()).norm() < 1e-12);
        assert!((res.feeder("G1").unwrap().iy + 6.0).abs() < 1e-12);
        assert!((res.feeder("G2").unwrap().iy + 2.0).abs() < 1e-12);
        assert_eq!(res.feeder("0").unwrap().current(), Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_negligible_admittance_is_skipped() {
        let feeders = FeedersAtBus {
            bus: 0,
            feeders: vec![Feeder::new("L", FeederKind::Load, 1e-7, 0.0)],
        };
        let mut res = FeedersAtBusResult::new(&feeders);
        res.add_branch_current(1.0, 1.0);
        res.update_contributions();
        assert_eq!(res.results()[0].ix, 0.0);
    }
}
