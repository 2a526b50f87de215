//! Content loading and validation shared between lab_cli and lab_daemon.

use anyhow::{bail, ensure, Context, Result};
use lab_core::{
    Constants, DifficultyBucketDef, GameContent, IngredientDef, IngredientId, ProblemId,
    ProblemSnapshot, ProductDef,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Deserialize)]
struct IngredientsFile {
    content_version: String,
    ingredients: Vec<IngredientDef>,
}

#[derive(Deserialize)]
struct ProductsFile {
    products: Vec<ProductDef>,
}

#[derive(Deserialize)]
struct BucketsFile {
    buckets: Vec<DifficultyBucketDef>,
}

#[derive(Deserialize)]
struct ProblemsFile {
    problems: Vec<ProblemSnapshot>,
}

fn read_json<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let path = dir.join(name);
    let text =
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {name}"))
}

/// Load and validate the game tables from `content_dir`.
pub fn load_content(content_dir: impl AsRef<Path>) -> Result<GameContent> {
    let dir = content_dir.as_ref();
    let constants: Constants = read_json(dir, "constants.json")?;
    let ingredients: IngredientsFile = read_json(dir, "ingredients.json")?;
    let products: ProductsFile = read_json(dir, "products.json")?;
    let buckets: BucketsFile = read_json(dir, "difficulty_buckets.json")?;
    let content = GameContent {
        content_version: ingredients.content_version,
        ingredients: ingredients.ingredients,
        products: products.products,
        difficulty_buckets: buckets.buckets,
        constants,
    };
    validate_content(&content)?;
    Ok(content)
}

/// Load the static problem catalog (`problems.json`).
pub fn load_problems(content_dir: impl AsRef<Path>) -> Result<Vec<ProblemSnapshot>> {
    let file: ProblemsFile = read_json(content_dir.as_ref(), "problems.json")?;
    let mut seen: HashSet<&ProblemId> = HashSet::new();
    for problem in &file.problems {
        ensure!(!problem.id.as_str().is_empty(), "problem with empty id");
        ensure!(seen.insert(&problem.id), "duplicate problem id '{}'", problem.id);
    }
    Ok(file.problems)
}

/// Check cross references and ranges in loaded content.
///
/// Catches mistakes like a recipe naming an unknown ingredient, a
/// non-positive price, or difficulty buckets that overlap or leave gaps.
pub fn validate_content(content: &GameContent) -> Result<()> {
    let mut ingredient_ids: HashSet<&IngredientId> = HashSet::new();
    for ingredient in &content.ingredients {
        ensure!(!ingredient.id.as_str().is_empty(), "ingredient with empty id");
        ensure!(
            ingredient_ids.insert(&ingredient.id),
            "duplicate ingredient id '{}'",
            ingredient.id
        );
        ensure!(
            ingredient.unit_price > 0,
            "ingredient '{}' has non-positive price",
            ingredient.id
        );
    }

    let mut product_ids = HashSet::new();
    for product in &content.products {
        ensure!(
            product_ids.insert(&product.id),
            "duplicate product id '{}'",
            product.id
        );
        ensure!(!product.recipe.is_empty(), "product '{}' has an empty recipe", product.id);
        for (ingredient, amount) in &product.recipe {
            ensure!(
                ingredient_ids.contains(ingredient),
                "product '{}' recipe references unknown ingredient '{}'",
                product.id,
                ingredient
            );
            ensure!(*amount > 0, "product '{}' needs zero '{}'", product.id, ingredient);
        }
        ensure!(
            product.price_mean > 0.0 && product.price_mean.is_finite(),
            "product '{}' has non-positive price mean",
            product.id
        );
        ensure!(
            product.price_sigma >= 0.0 && product.price_sigma.is_finite(),
            "product '{}' has negative price sigma",
            product.id
        );
    }

    validate_buckets(&content.difficulty_buckets)?;

    let c = &content.constants;
    ensure!(c.candidate_count > 0, "candidate_count must be positive");
    ensure!(c.rank_window > 0, "rank_window must be positive");
    ensure!(
        c.growth_difficulty_scale > 0.0,
        "growth_difficulty_scale must be positive"
    );
    ensure!(c.growth_sigma >= 0.0, "growth_sigma must not be negative");
    Ok(())
}

/// Buckets must tile the whole difficulty axis in ascending order.
fn validate_buckets(buckets: &[DifficultyBucketDef]) -> Result<()> {
    let (Some(first), Some(last)) = (buckets.first(), buckets.last()) else {
        bail!("no difficulty buckets defined");
    };
    ensure!(first.min.is_none(), "bucket '{}' must be open below", first.name);
    ensure!(last.max.is_none(), "bucket '{}' must be open above", last.name);
    for pair in buckets.windows(2) {
        let (lower, upper) = (&pair[0], &pair[1]);
        ensure!(
            lower.max.is_some() && lower.max == upper.min,
            "buckets '{}' and '{}' do not meet",
            lower.name,
            upper.name
        );
    }
    for bucket in buckets {
        if let (Some(min), Some(max)) = (bucket.min, bucket.max) {
            ensure!(min < max, "bucket '{}' is empty", bucket.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_core::test_fixtures::base_content;
    use lab_core::ProductId;

    #[test]
    fn fixture_content_is_valid() {
        validate_content(&base_content()).unwrap();
    }

    #[test]
    fn unknown_recipe_ingredient_is_rejected() {
        let mut content = base_content();
        content.products[0]
            .recipe
            .insert(IngredientId::new("mithril"), 1);
        let err = validate_content(&content).unwrap_err();
        assert!(err.to_string().contains("mithril"), "{err}");
    }

    #[test]
    fn duplicate_product_is_rejected() {
        let mut content = base_content();
        let mut copy = content.products[0].clone();
        copy.name = "Second Sword".to_string();
        content.products.push(copy);
        assert!(validate_content(&content).is_err());
        assert_eq!(content.products[0].id, ProductId::new("sword"));
    }

    #[test]
    fn gap_between_buckets_is_rejected() {
        let mut content = base_content();
        content.difficulty_buckets[1].min = Some(450);
        let err = validate_content(&content).unwrap_err();
        assert!(err.to_string().contains("do not meet"), "{err}");
    }

    #[test]
    fn zero_candidate_count_is_rejected() {
        let mut content = base_content();
        content.constants.candidate_count = 0;
        assert!(validate_content(&content).is_err());
    }

    #[test]
    fn missing_directory_reports_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_content(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("constants.json"), "{err:#}");
    }

    #[test]
    fn duplicate_problem_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("problems.json"),
            r#"{"problems":[
                {"id":"abc300_a","title":"A","difficulty":10},
                {"id":"abc300_a","title":"B","difficulty":20}
            ]}"#,
        )
        .unwrap();
        let err = load_problems(dir.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "{err}");
    }
}
