//! Stochastic pricing and growth. All draws come from the caller's RNG.

use rand::Rng;

use crate::{Constants, ProductDef};

/// Standard-normal sample via the Box–Muller transform.
pub fn standard_normal(rng: &mut impl Rng) -> f64 {
    // gen() is in [0, 1); shift to (0, 1] so ln never sees zero.
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Log-normal sample whose expected value is `mean`.
///
/// `mu = ln(mean) - sigma^2 / 2`, result `exp(mu + sigma * z)`.
/// A non-positive mean has no log-normal and yields 0.
pub fn log_normal(rng: &mut impl Rng, mean: f64, sigma: f64) -> f64 {
    if mean <= 0.0 || !mean.is_finite() {
        return 0.0;
    }
    let mu = mean.ln() - sigma * sigma / 2.0;
    (mu + sigma * standard_normal(rng)).exp()
}

/// Realized sale price for one crafted item, rounded to the nearest unit.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn sale_price(product: &ProductDef, rng: &mut impl Rng) -> u64 {
    let price = log_normal(rng, product.price_mean, product.price_sigma).round();
    if price.is_finite() && price > 0.0 {
        price.min(u64::MAX as f64) as u64
    } else {
        0
    }
}

/// Growth increment granted for a rewarded research on a problem of `difficulty`.
pub fn growth_rate(difficulty: i32, constants: &Constants, rng: &mut impl Rng) -> f64 {
    let mean = f64::from(difficulty) / constants.growth_difficulty_scale;
    log_normal(rng, mean, constants.growth_sigma)
}
