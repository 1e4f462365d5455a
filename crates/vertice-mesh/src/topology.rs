//! Coordination-topology selection from a classified task characteristic.
//!
//! Exact numeric constants, confirmed against the reference selector: a
//! fold over `[CENTRALIZED, DECENTRALIZED, HYBRID]` in that order, keeping
//! the first strictly-greater score, so ties resolve to the earliest
//! declared entry rather than whichever the iteration happens to visit last.

use std::fmt;

use crate::classify::TaskCharacteristic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationTopology {
    Independent,
    Centralized,
    Decentralized,
    Hybrid,
}

impl CoordinationTopology {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinationTopology::Independent => "independent",
            CoordinationTopology::Centralized => "centralized",
            CoordinationTopology::Decentralized => "decentralized",
            CoordinationTopology::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for CoordinationTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const SATURATION_THRESHOLD: f64 = 0.45;

fn topology_performance(topology: CoordinationTopology, characteristic: TaskCharacteristic) -> f64 {
    use CoordinationTopology::*;
    use TaskCharacteristic::*;
    match (topology, characteristic) {
        (Centralized, Parallelizable) => 0.808,
        (Centralized, Sequential) => -0.39,
        (Centralized, Exploratory) => 0.002,
        (Centralized, Complex) => 0.40,
        (Decentralized, Parallelizable) => 0.30,
        (Decentralized, Sequential) => -0.50,
        (Decentralized, Exploratory) => 0.092,
        (Decentralized, Complex) => 0.25,
        (Hybrid, Parallelizable) => 0.70,
        (Hybrid, Sequential) => -0.20,
        (Hybrid, Exploratory) => 0.06,
        (Hybrid, Complex) => 0.55,
        (Independent, _) => 0.0,
    }
}

/// Error-amplification factor per topology, used both for the score
/// penalty and as `TaskRoute.estimated_error_factor`.
pub fn error_factor(topology: CoordinationTopology) -> f64 {
    match topology {
        CoordinationTopology::Independent => 17.2,
        CoordinationTopology::Centralized => 4.4,
        CoordinationTopology::Decentralized => 8.0,
        CoordinationTopology::Hybrid => 5.0,
    }
}

fn error_penalty(topology: CoordinationTopology, prefer_error_containment: bool) -> f64 {
    if prefer_error_containment {
        (error_factor(topology) - 4.4) * 0.05
    } else {
        0.0
    }
}

fn score(
    topology: CoordinationTopology,
    characteristic: TaskCharacteristic,
    prefer_error_containment: bool,
) -> f64 {
    topology_performance(topology, characteristic) - error_penalty(topology, prefer_error_containment)
}

/// Select a coordination topology for a classified task. A `Sequential`
/// characteristic always resolves to `Independent` — multi-agent
/// coordination has no upside for a strictly ordered task. Otherwise the
/// highest-scoring candidate among `[Centralized, Decentralized, Hybrid]`
/// wins, ties going to the earliest in that list.
///
/// `agent_baseline_performance` above [`SATURATION_THRESHOLD`] doesn't
/// change the result — it only means coordination may have diminishing
/// returns, which callers can surface to the user via
/// [`TopologyAdvisory`].
pub fn select_topology(
    characteristic: TaskCharacteristic,
    agent_baseline_performance: f64,
    prefer_error_containment: bool,
) -> (CoordinationTopology, TopologyAdvisory) {
    let advisory = if agent_baseline_performance > SATURATION_THRESHOLD {
        TopologyAdvisory::DiminishingReturns
    } else {
        TopologyAdvisory::None
    };

    if characteristic == TaskCharacteristic::Sequential {
        return (CoordinationTopology::Independent, advisory);
    }

    let candidates = [
        CoordinationTopology::Centralized,
        CoordinationTopology::Decentralized,
        CoordinationTopology::Hybrid,
    ];

    let mut best = candidates[0];
    let mut best_score = score(best, characteristic, prefer_error_containment);
    for &candidate in &candidates[1..] {
        let candidate_score = score(candidate, characteristic, prefer_error_containment);
        if candidate_score > best_score {
            best = candidate;
            best_score = candidate_score;
        }
    }
    (best, advisory)
}

/// A non-fatal hint attached to a topology selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyAdvisory {
    None,
    DiminishingReturns,
}
