//! Context window management

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::Turn;
use crate::token::{ModelTokenEstimator, TokenEstimator};

/// Default conversation budget in estimated tokens.
pub const DEFAULT_MAX_TOKENS: usize = 3000;

/// Context window configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    /// Budget for forwarded history. The system preamble is not counted.
    pub max_tokens: usize,
    /// Model whose tokenizer drives the estimate
    pub model: String,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl ContextWindow {
    pub fn new(max_tokens: usize, model: impl Into<String>) -> Self {
        Self {
            max_tokens,
            model: model.into(),
        }
    }

    pub fn estimator(&self) -> ModelTokenEstimator {
        ModelTokenEstimator::new(self.model.clone())
    }

    /// Most recent turns that fit the budget.
    pub fn trim<'a>(&self, turns: &'a [Turn]) -> &'a [Turn] {
        trim_to_budget(turns, self.max_tokens, &self.estimator())
    }
}

/// Keeps the longest suffix of `turns` whose estimated size fits `budget`.
///
/// The newest turn is always kept, even when it alone is over budget, so a
/// non-empty conversation never trims to nothing. Each turn is estimated at
/// most once.
pub fn trim_to_budget<'a, E>(turns: &'a [Turn], budget: usize, estimator: &E) -> &'a [Turn]
where
    E: TokenEstimator + ?Sized,
{
    let mut total = 0usize;
    let mut start = turns.len();

    for (index, turn) in turns.iter().enumerate().rev() {
        let tokens = estimator.estimate(turn.content());
        if total.saturating_add(tokens) > budget && start < turns.len() {
            break;
        }
        total = total.saturating_add(tokens);
        start = index;
    }

    if start > 0 {
        debug!(
            kept = turns.len() - start,
            dropped = start,
            tokens = total,
            budget,
            "trimmed conversation to fit context window"
        );
    }

    &turns[start..]
}
