use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BalanceError;

/// Node selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Uniform draw over all nodes.
    Random,
    /// Persistent offset, modulo the node count.
    RoundRobin,
    /// Two uniform draws, keep the one with the lower block rate.
    PowerOfTwoChoices,
    /// Serve from the precomputed smooth weighted round-robin queue.
    Weighted,
}

impl Algorithm {
    /// Short name, also used for experiment file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Random => "random",
            Algorithm::RoundRobin => "round",
            Algorithm::PowerOfTwoChoices => "power",
            Algorithm::Weighted => "game",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = BalanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Algorithm::Random),
            "round" | "round_robin" | "roundrobin" => Ok(Algorithm::RoundRobin),
            "power" | "power_of_two" | "power_of_two_choices" => Ok(Algorithm::PowerOfTwoChoices),
            "game" | "weighted" => Ok(Algorithm::Weighted),
            other => Err(BalanceError::UnknownAlgorithm(other.to_string())),
        }
    }
}
