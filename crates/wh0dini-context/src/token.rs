//! Token estimation
//!
//! Counts are exact for model families `tiktoken-rs` knows about and fall back
//! to a characters-per-token heuristic for everything else. The fallback never
//! fails and never reports zero tokens for non-empty text.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

/// Characters per token assumed by the fallback heuristic.
pub const CHARS_PER_TOKEN: usize = 4;

lazy_static! {
    // `None` marks a model name the tokenizer registry does not know.
    static ref ENCODINGS: RwLock<HashMap<String, Option<Arc<CoreBPE>>>> =
        RwLock::new(HashMap::new());
}

/// Anything that can put a token count on a piece of text.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// `max(1, ceil(chars / 4))`, or 0 for empty text.
pub fn heuristic_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(CHARS_PER_TOKEN).max(1)
}

/// Maps model names that share a family prefix onto the name the tokenizer
/// registry understands.
pub fn canonical_model(model: &str) -> &str {
    if model.starts_with("gpt-4o") {
        "gpt-4"
    } else if model.starts_with("gpt-3.5") {
        "gpt-3.5-turbo"
    } else {
        model
    }
}

fn encoding_for(model: &str) -> Option<Arc<CoreBPE>> {
    let canonical = canonical_model(model);

    if let Ok(cache) = ENCODINGS.read() {
        if let Some(entry) = cache.get(canonical) {
            return entry.clone();
        }
    }

    let loaded = match tiktoken_rs::get_bpe_from_model(canonical) {
        Ok(bpe) => Some(Arc::new(bpe)),
        Err(error) => {
            warn!(
                model,
                canonical,
                error = %error,
                "Token counting failed, using estimation"
            );
            None
        }
    };

    if let Ok(mut cache) = ENCODINGS.write() {
        cache.insert(canonical.to_string(), loaded.clone());
    }
    loaded
}

/// Estimated token count of `text` for `model`.
pub fn estimate_tokens(text: &str, model: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    match encoding_for(model) {
        Some(bpe) => bpe.encode_with_special_tokens(text).len().max(1),
        None => {
            debug!(model, "no tokenizer for model, using character estimate");
            heuristic_tokens(text)
        }
    }
}

/// Model-aware estimator backed by `tiktoken-rs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTokenEstimator {
    model: String,
}

impl ModelTokenEstimator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TokenEstimator for ModelTokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        estimate_tokens(text, &self.model)
    }
}

/// Pure character heuristic, independent of any tokenizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        heuristic_tokens(text)
    }
}
