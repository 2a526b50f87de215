//! Type definitions for `lab_core`.
//!
//! ID newtypes, problem snapshots, and the static content tables
//! (ingredients, products, difficulty buckets, constants).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Type aliases
// ---------------------------------------------------------------------------

pub type Timestamp = DateTime<Utc>;
pub type Recipe = BTreeMap<IngredientId, u32>;

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(PlayerId);
string_id!(UserHandle);
string_id!(ProblemId);
string_id!(IngredientId);
string_id!(ProductId);
string_id!(ResearchId);

// ---------------------------------------------------------------------------
// Problems and submissions
// ---------------------------------------------------------------------------

/// A catalog problem as seen at the moment it was offered or selected.
///
/// Research records keep their own copy so later catalog edits never
/// change a player's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemSnapshot {
    pub id: ProblemId,
    pub title: String,
    pub difficulty: i32,
}

/// First-submission and first-solve times reported by the submission tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionStatus {
    pub first_submitted_at: Option<Timestamp>,
    pub first_solved_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameContent {
    pub content_version: String,
    pub ingredients: Vec<IngredientDef>,
    pub products: Vec<ProductDef>,
    pub difficulty_buckets: Vec<DifficultyBucketDef>,
    pub constants: Constants,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientDef {
    pub id: IngredientId,
    pub name: String,
    pub unit_price: u64,
}

/// A craftable item. The sale price is log-normal around `price_mean`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDef {
    pub id: ProductId,
    pub name: String,
    pub recipe: Recipe,
    pub price_mean: f64,
    pub price_sigma: f64,
}

/// Half-open difficulty band `[min, max)`. A missing bound is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyBucketDef {
    pub name: String,
    #[serde(default)]
    pub min: Option<i32>,
    #[serde(default)]
    pub max: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constants {
    pub starting_cash: u64,
    pub starting_battery: u32,
    /// Capacity a laboratory has before any rewarded research.
    pub base_battery_capacity: f64,
    pub base_performance: f64,
    /// Number of most recent solved-and-rewarded records the rank averages over.
    pub rank_window: usize,
    /// How many problems are offered per selection turn.
    pub candidate_count: usize,
    /// Difficulty is divided by this to get the growth-rate mean.
    pub growth_difficulty_scale: f64,
    pub growth_sigma: f64,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            starting_cash: 1000,
            starting_battery: 1,
            base_battery_capacity: 1.0,
            base_performance: 1.0,
            rank_window: 5,
            candidate_count: 3,
            growth_difficulty_scale: 100.0,
            growth_sigma: 1.0,
        }
    }
}
