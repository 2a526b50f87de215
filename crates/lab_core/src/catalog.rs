//! Lookups over the static content tables.

use crate::{
    DifficultyBucketDef, GameContent, GameError, IngredientDef, IngredientId, ProductDef,
    ProductId,
};

impl GameContent {
    pub fn ingredient(&self, id: &IngredientId) -> Result<&IngredientDef, GameError> {
        self.ingredients
            .iter()
            .find(|def| def.id == *id)
            .ok_or_else(|| GameError::not_found("ingredient", id))
    }

    pub fn product(&self, id: &ProductId) -> Result<&ProductDef, GameError> {
        self.products
            .iter()
            .find(|def| def.id == *id)
            .ok_or_else(|| GameError::not_found("product", id))
    }

    /// The bucket whose band contains `floor(rank)`.
    pub fn bucket_for_rank(&self, rank: f64) -> Option<&DifficultyBucketDef> {
        bucket_for_rank(&self.difficulty_buckets, rank)
    }
}

pub fn bucket_for_rank(buckets: &[DifficultyBucketDef], rank: f64) -> Option<&DifficultyBucketDef> {
    let difficulty = rank_to_difficulty(rank);
    buckets.iter().find(|bucket| bucket.contains(difficulty))
}

#[allow(clippy::cast_possible_truncation)]
fn rank_to_difficulty(rank: f64) -> i32 {
    if rank.is_nan() {
        return 0;
    }
    rank.floor().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

impl DifficultyBucketDef {
    pub fn contains(&self, difficulty: i32) -> bool {
        self.min.is_none_or(|min| difficulty >= min) && self.max.is_none_or(|max| difficulty < max)
    }
}

impl ProductDef {
    /// Total units of raw material one item consumes.
    pub fn material_units(&self) -> u64 {
        self.recipe.values().map(|amount| u64::from(*amount)).sum()
    }
}
