#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::require_range;
use crate::resolution::MAX_USER_OPTIONS;
use crate::{ContractViolation, Validate};

/// Raw heuristic signals computed over one input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GarbageFeatures {
    pub char_repetition_ratio: f64,
    pub non_alnum_ratio: f64,
    pub dictionary_word_ratio: f64,
    pub has_known_tokens: bool,
    pub token_count: usize,
}

impl Validate for GarbageFeatures {
    fn validate(&self) -> Result<(), ContractViolation> {
        require_range(
            "garbage_features.char_repetition_ratio",
            self.char_repetition_ratio,
            0.0,
            1.0,
        )?;
        require_range(
            "garbage_features.non_alnum_ratio",
            self.non_alnum_ratio,
            0.0,
            1.0,
        )?;
        require_range(
            "garbage_features.dictionary_word_ratio",
            self.dictionary_word_ratio,
            0.0,
            1.0,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarbageAnalysis {
    pub is_garbage: bool,
    pub reason: String,
    pub features: GarbageFeatures,
    /// Number of independent garbage signals that fired.
    pub signals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub escalate: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserChoicePrompt {
    pub message: String,
    pub options: Vec<String>,
}

impl UserChoicePrompt {
    pub fn v1(message: String, options: Vec<String>) -> Result<Self, ContractViolation> {
        let p = Self { message, options };
        p.validate()?;
        Ok(p)
    }
}

impl Validate for UserChoicePrompt {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.message.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "user_choice_prompt.message",
                reason: "must not be empty",
            });
        }
        if self.options.is_empty() || self.options.len() > MAX_USER_OPTIONS {
            return Err(ContractViolation::InvalidValue {
                field: "user_choice_prompt.options",
                reason: "must contain 1..=5 entries",
            });
        }
        Ok(())
    }
}
