use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::{ModelRecord, PriceEntry};

/// In-memory model→price snapshot. Owns its own refreshable copy rather
/// than reading through a global singleton, so multiple `PricingTracker`
/// instances (e.g. in tests) never interfere with each other.
#[derive(Default)]
pub struct PricingTracker {
    snapshot: RwLock<HashMap<String, PriceEntry>>,
}

impl PricingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, models: &[ModelRecord]) {
        let snapshot = models
            .iter()
            .map(|m| {
                (
                    m.name.clone(),
                    PriceEntry {
                        input_price_per_million: m.input_price_per_million,
                        output_price_per_million: m.output_price_per_million,
                    },
                )
            })
            .collect();
        *self.snapshot.write().unwrap() = snapshot;
    }

    pub fn price_for(&self, model_name: &str) -> Option<PriceEntry> {
        self.snapshot.read().unwrap().get(model_name).copied()
    }

    /// Cost is zero if `model` is unknown in the pricing snapshot.
    pub fn cost(
        &self,
        model_name: &str,
        input_tokens: i64,
        output_tokens: i64,
    ) -> f64 {
        let Some(price) = self.price_for(model_name) else {
            return 0.0;
        };
        let input_cost = (input_tokens as f64 / 1_000_000.0) * price.input_price_per_million;
        let output_cost = (output_tokens as f64 / 1_000_000.0) * price.output_price_per_million;
        input_cost + output_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_costs_zero() {
        let tracker = PricingTracker::new();
        assert_eq!(tracker.cost("ghost", 1000, 1000), 0.0);
    }

    #[test]
    fn known_model_computes_per_million_cost() {
        let tracker = PricingTracker::new();
        tracker.replace(&[ModelRecord {
            id: 1,
            name: "claude-3-5-sonnet".into(),
            display_name: "Claude".into(),
            provider: "anthropic".into(),
            upstream_id: Some(1),
            input_price_per_million: 3.0,
            output_price_per_million: 15.0,
            active: true,
        }]);
        let cost = tracker.cost("claude-3-5-sonnet", 1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
    }
}
