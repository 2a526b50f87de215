//! The five-phase turn cycle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{GameError, Violation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Turn {
    #[default]
    BuyIngredients,
    ForgeSwords,
    SelectProblems,
    SolveProblems,
    GetReward,
}

/// Cycle order. `next()` walks this list and wraps around.
pub const TURNS: [Turn; 5] = [
    Turn::BuyIngredients,
    Turn::ForgeSwords,
    Turn::SelectProblems,
    Turn::SolveProblems,
    Turn::GetReward,
];

impl Turn {
    pub fn index(self) -> usize {
        match self {
            Turn::BuyIngredients => 0,
            Turn::ForgeSwords => 1,
            Turn::SelectProblems => 2,
            Turn::SolveProblems => 3,
            Turn::GetReward => 4,
        }
    }

    #[must_use]
    pub fn next(self) -> Turn {
        TURNS[(self.index() + 1) % TURNS.len()]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Turn::BuyIngredients => "buy-ingredients",
            Turn::ForgeSwords => "forge-swords",
            Turn::SelectProblems => "select-problems",
            Turn::SolveProblems => "solve-problems",
            Turn::GetReward => "get-reward",
        }
    }

    /// Guard for phase-specific actions.
    pub fn ensure(self, expected: Turn) -> Result<(), GameError> {
        if self == expected {
            Ok(())
        } else {
            Err(Violation::WrongTurn {
                expected,
                actual: self,
            }
            .into())
        }
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Turn {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TURNS
            .into_iter()
            .find(|turn| turn.as_str() == s)
            .ok_or_else(|| GameError::invalid(format!("unknown turn '{s}'")))
    }
}
