//! A player's cash, battery charge, and raw-material stock.
//!
//! Every operation takes `&self` and returns a new `Ledger`; a failed
//! operation leaves the caller's value untouched.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::sampling::sale_price;
use crate::{Constants, GameContent, GameError, IngredientId, ProductDef, Violation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub cash: u64,
    /// Current charge. Crafting one item consumes one unit.
    pub battery: u32,
    #[serde(default)]
    pub stock: BTreeMap<IngredientId, u64>,
}

impl Ledger {
    /// Starting values for a new player: cash and battery from `constants`, empty stock.
    pub fn starting(constants: &Constants) -> Self {
        Self {
            cash: constants.starting_cash,
            battery: constants.starting_battery,
            stock: BTreeMap::new(),
        }
    }

    pub fn stock_of(&self, ingredient: &IngredientId) -> u64 {
        self.stock.get(ingredient).copied().unwrap_or(0)
    }

    /// Spend `quantity × unit_price` cash on an ingredient.
    pub fn buy_ingredient(
        &self,
        content: &GameContent,
        ingredient: &IngredientId,
        quantity: i64,
    ) -> Result<Ledger, GameError> {
        let quantity = u64::try_from(quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| GameError::invalid(format!("quantity must be positive, got {quantity}")))?;
        let def = content.ingredient(ingredient)?;
        let cost = quantity
            .checked_mul(def.unit_price)
            .ok_or_else(|| GameError::invalid(format!("order of {quantity} {ingredient} is too large")))?;
        if self.cash < cost {
            return Err(Violation::InsufficientFunds {
                required: cost,
                available: self.cash,
            }
            .into());
        }

        let mut next = self.clone();
        next.cash -= cost;
        let held = next.stock.entry(ingredient.clone()).or_insert(0);
        *held = held
            .checked_add(quantity)
            .ok_or_else(|| GameError::invalid(format!("stock of {ingredient} would overflow")))?;
        Ok(next)
    }

    /// Craft one `product` from stock and sell it at a log-normal price.
    ///
    /// Returns the new ledger and the realized price.
    pub fn craft_and_sell(
        &self,
        product: &ProductDef,
        rng: &mut impl Rng,
    ) -> Result<(Ledger, u64), GameError> {
        if self.battery == 0 {
            return Err(Violation::InsufficientBattery.into());
        }
        for (ingredient, amount) in &product.recipe {
            let available = self.stock_of(ingredient);
            let required = u64::from(*amount);
            if available < required {
                return Err(Violation::InsufficientIngredients {
                    ingredient: ingredient.clone(),
                    required,
                    available,
                }
                .into());
            }
        }

        let mut next = self.clone();
        for (ingredient, amount) in &product.recipe {
            if let Some(held) = next.stock.get_mut(ingredient) {
                *held -= u64::from(*amount);
            }
        }
        next.battery -= 1;
        let price = sale_price(product, rng);
        next.cash = next.cash.saturating_add(price);
        Ok((next, price))
    }

    /// Full recharge: the battery is set to `capacity`, whatever its charge was.
    #[must_use]
    pub fn charge_battery(&self, capacity: u32) -> Ledger {
        Ledger {
            battery: capacity,
            ..self.clone()
        }
    }
}
