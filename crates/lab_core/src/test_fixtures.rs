//! Shared test fixtures for lab_core and downstream crates.
//!
//! `base_content()` mirrors the shipped content closely enough for
//! behavioural tests: iron at 100 per unit, a sword that needs three iron,
//! and the eight colour buckets.

use crate::{
    Constants, DifficultyBucketDef, GameContent, IngredientDef, IngredientId, ProblemId,
    ProblemSnapshot, ProductDef, ProductId, Timestamp,
};
use chrono::DateTime;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Epoch offset for `at()`; any fixed instant works.
const BASE_EPOCH_SECS: i64 = 1_700_000_000;

pub fn base_content() -> GameContent {
    GameContent {
        content_version: "test".to_string(),
        ingredients: vec![
            ingredient("iron", "Iron Ore", 100),
            ingredient("wood", "Oak Log", 20),
            ingredient("leather", "Leather", 50),
        ],
        products: vec![
            product("sword", "Sword", &[("iron", 3)], 400.0, 0.25),
            product("bow", "Bow", &[("wood", 4), ("leather", 1)], 180.0, 0.25),
            product("shield", "Shield", &[("iron", 2), ("wood", 2)], 300.0, 0.25),
        ],
        difficulty_buckets: color_buckets(),
        constants: Constants::default(),
    }
}

fn ingredient(id: &str, name: &str, unit_price: u64) -> IngredientDef {
    IngredientDef {
        id: IngredientId::new(id),
        name: name.to_string(),
        unit_price,
    }
}

fn product(id: &str, name: &str, recipe: &[(&str, u32)], mean: f64, sigma: f64) -> ProductDef {
    ProductDef {
        id: ProductId::new(id),
        name: name.to_string(),
        recipe: recipe
            .iter()
            .map(|(ingredient, amount)| (IngredientId::new(*ingredient), *amount))
            .collect::<BTreeMap<_, _>>(),
        price_mean: mean,
        price_sigma: sigma,
    }
}

/// 400-wide bands; the first is open below and the last open above.
pub fn color_buckets() -> Vec<DifficultyBucketDef> {
    let names = [
        "gray", "brown", "green", "cyan", "blue", "yellow", "orange", "red",
    ];
    let last = names.len() - 1;
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let lower = i32::try_from(i).unwrap_or(i32::MAX) * 400;
            DifficultyBucketDef {
                name: (*name).to_string(),
                min: (i > 0).then_some(lower),
                max: (i < last).then_some(lower + 400),
            }
        })
        .collect()
}

/// Gray-bucket problems with distinct ids.
pub fn sample_problems() -> Vec<ProblemSnapshot> {
    [
        ("abc300_a", "N-choice question", 14),
        ("abc300_b", "Same Map in the RPG World", 221),
        ("abc301_a", "Overall Winner", 19),
        ("abc301_b", "Fill the Gaps", 37),
        ("abc302_a", "Attack", 12),
        ("abc302_b", "Find snuke", 276),
    ]
    .into_iter()
    .map(|(id, title, difficulty)| ProblemSnapshot {
        id: ProblemId::new(id),
        title: title.to_string(),
        difficulty,
    })
    .collect()
}

pub fn make_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(42)
}

/// A fixed instant plus `secs` seconds.
pub fn at(secs: i64) -> Timestamp {
    DateTime::from_timestamp(BASE_EPOCH_SECS + secs, 0).expect("timestamp in range")
}
