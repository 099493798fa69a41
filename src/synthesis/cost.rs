/*!
 * Cost estimation.
 *
 * Providers bill per started thousand characters.
 */

/// Cost of synthesizing `total_chars` characters
///
/// The character count is rounded up to the next thousand before
/// multiplying.
pub fn estimate_cost(total_chars: usize, price_per_thousand_chars: f64) -> f64 {
    total_chars.div_ceil(1000) as f64 * price_per_thousand_chars
}

/// Estimate for a set of chapters
#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    pub total_chars: usize,
    pub price_per_thousand_chars: Option<f64>,
}

impl CostEstimate {
    pub fn new(total_chars: usize, price_per_thousand_chars: Option<f64>) -> Self {
        Self {
            total_chars,
            price_per_thousand_chars,
        }
    }

    /// Estimated cost, `None` for free or unpriced backends
    pub fn cost(&self) -> Option<f64> {
        self.price_per_thousand_chars
            .map(|price| estimate_cost(self.total_chars, price))
    }

    /// Human-readable summary
    pub fn describe(&self) -> String {
        match self.cost() {
            Some(cost) => format!(
                "Total characters: {}, estimated cost: ${:.2}",
                self.total_chars, cost
            ),
            None => format!(
                "Total characters: {}, no per-character cost for this backend",
                self.total_chars
            ),
        }
    }
}
