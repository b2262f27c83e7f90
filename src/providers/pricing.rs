//! Model pricing table.
//!
//! Prices are in USD per 1M tokens (input/output). Costs are rounded to six
//! decimal places.

use serde::Serialize;
use std::collections::HashMap;

// MARK: - Types

/// Pricing information for a specific model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelPricing {
    pub model: String,
    /// Cost per 1M input tokens in USD.
    pub input_cost_per_million: f64,
    /// Cost per 1M output tokens in USD.
    pub output_cost_per_million: f64,
}

/// Combined rate for models without a table entry.
pub const DEFAULT_COST_PER_MILLION: f64 = 0.50;

/// Pricing table for the paid tiers.
#[derive(Debug, Clone)]
pub struct PricingTable {
    pricing: HashMap<String, ModelPricing>,
}

// MARK: - Implementation

impl PricingTable {
    /// Create a table with the built-in tier prices.
    pub fn new() -> Self {
        let mut table = Self {
            pricing: HashMap::new(),
        };
        table.insert("gpt-4-mini", 0.15, 0.60);
        table.insert("gpt-4-turbo", 0.50, 1.50);
        table
    }

    pub fn insert(&mut self, model: &str, input_per_million: f64, output_per_million: f64) {
        self.pricing.insert(
            model.to_string(),
            ModelPricing {
                model: model.to_string(),
                input_cost_per_million: input_per_million,
                output_cost_per_million: output_per_million,
            },
        );
    }

    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        self.pricing.get(model)
    }

    /// USD cost of a call, rounded to six decimals.
    pub fn cost(&self, model: &str, tokens_in: u32, tokens_out: u32) -> f64 {
        let raw = match self.get(model) {
            Some(p) => {
                f64::from(tokens_in) / 1_000_000.0 * p.input_cost_per_million
                    + f64::from(tokens_out) / 1_000_000.0 * p.output_cost_per_million
            }
            None => {
                f64::from(tokens_in.saturating_add(tokens_out)) / 1_000_000.0
                    * DEFAULT_COST_PER_MILLION
            }
        };
        round6(raw)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new()
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

// MARK: - Heuristic estimate

/// Rough token counts used when the upstream omits usage.
///
/// Input is `words * 1.2` (at least 1). Output is 60% of the budget, at
/// least 20 and never above `max_tokens`.
pub fn estimate_tokens(prompt: &str, max_tokens: u32) -> (u32, u32) {
    let words = prompt.split_whitespace().count() as f64;
    let tokens_in = ((words * 1.2) as u32).max(1);
    let tokens_out = max_tokens
        .min((f64::from(max_tokens) * 0.6) as u32)
        .max(20);
    (tokens_in, tokens_out)
}

// MARK: - Tests
