#![forbid(unsafe_code)]

use docflow_kernel_contracts::command::SourceType;
use docflow_kernel_contracts::escalation::{
    EscalationDecision, GarbageAnalysis, GarbageFeatures, UserChoicePrompt,
};
use docflow_kernel_contracts::ContractViolation;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::{
    COMMON_WORDS, FILLER_WORDS, KNOWN_ACTION_VERBS, KNOWN_ALIASES, KNOWN_FILE_TYPES,
    PURPOSE_KEYWORDS,
};

/// Inputs with at most this many words get the alias prefix check and the short-prompt
/// shortcut in [`GarbageClassifier::decide_escalation`].
const SHORT_PROMPT_WORDS: usize = 3;
const ALIAS_PREFIX_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub repetition_threshold: f64,
    pub dictionary_threshold: f64,
    pub non_alnum_threshold: f64,
    pub short_token_limit: usize,
    pub short_dictionary_threshold: f64,
    pub min_signals: u8,
}

impl ClassifierConfig {
    pub fn mvp_v1() -> Self {
        Self {
            repetition_threshold: 0.3,
            dictionary_threshold: 0.2,
            non_alnum_threshold: 0.5,
            short_token_limit: 2,
            short_dictionary_threshold: 0.5,
            min_signals: 2,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GarbageClassifier {
    config: ClassifierConfig,
}

impl Default for GarbageClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::mvp_v1())
    }
}

impl GarbageClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn features(&self, text: &str) -> GarbageFeatures {
        let text = text.trim();
        GarbageFeatures {
            char_repetition_ratio: char_repetition_ratio(text),
            non_alnum_ratio: non_alnum_ratio(text),
            dictionary_word_ratio: dictionary_word_ratio(text),
            has_known_tokens: has_known_tokens(text),
            token_count: text.split_whitespace().count(),
        }
    }

    /// Known tokens or an alias match veto every other signal.
    pub fn classify(&self, text: &str) -> GarbageAnalysis {
        let trimmed = text.trim();
        let features = self.features(trimmed);
        if trimmed.is_empty() {
            return GarbageAnalysis {
                is_garbage: true,
                reason: "Empty input".to_string(),
                features,
                signals: 0,
            };
        }
        if features.has_known_tokens {
            return clean(features, "Contains known tokens");
        }
        if matches_known_alias(trimmed) {
            return clean(features, "Matches known alias");
        }

        let c = &self.config;
        let mut reasons = Vec::new();
        if features.char_repetition_ratio > c.repetition_threshold {
            reasons.push(format!(
                "High char repetition ({:.2})",
                features.char_repetition_ratio
            ));
        }
        if features.dictionary_word_ratio < c.dictionary_threshold {
            reasons.push(format!(
                "Low dictionary ratio ({:.2})",
                features.dictionary_word_ratio
            ));
        }
        if features.non_alnum_ratio > c.non_alnum_threshold {
            reasons.push(format!(
                "High non-alnum ratio ({:.2})",
                features.non_alnum_ratio
            ));
        }
        if features.token_count <= c.short_token_limit
            && features.dictionary_word_ratio < c.short_dictionary_threshold
        {
            reasons.push("Very short, unrecognized".to_string());
        }

        let signals = u8::try_from(reasons.len()).unwrap_or(u8::MAX);
        let is_garbage = signals >= c.min_signals;
        debug!(signals, is_garbage, "garbage classification");
        GarbageAnalysis {
            is_garbage,
            reason: if is_garbage {
                reasons.join("; ")
            } else {
                "Valid input".to_string()
            },
            features,
            signals,
        }
    }

    /// Local-first gate for the remote rephrase path.
    pub fn decide_escalation(&self, text: &str) -> EscalationDecision {
        let prompt = text.trim();
        if prompt.is_empty() {
            return decision(false, "Empty prompt - handle locally");
        }
        if prompt.split_whitespace().count() <= SHORT_PROMPT_WORDS {
            if has_known_tokens(prompt) {
                return decision(false, "Short prompt with known tokens - handle locally");
            }
            if matches_known_alias(prompt) {
                return decision(false, "Short prompt matches alias - handle locally");
            }
        }
        let analysis = self.classify(prompt);
        if analysis.features.has_known_tokens {
            return decision(false, "Contains known tokens - handle locally");
        }
        if analysis.is_garbage {
            return EscalationDecision {
                escalate: true,
                reason: format!("Extreme garbage detected: {}", analysis.reason),
            };
        }
        decision(false, "Appears parseable - try local first")
    }
}

fn clean(features: GarbageFeatures, reason: &str) -> GarbageAnalysis {
    GarbageAnalysis {
        is_garbage: false,
        reason: reason.to_string(),
        features,
        signals: 0,
    }
}

fn decision(escalate: bool, reason: &str) -> EscalationDecision {
    EscalationDecision {
        escalate,
        reason: reason.to_string(),
    }
}

fn char_repetition_ratio(text: &str) -> f64 {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < 3 {
        return 0.0;
    }
    let repeated = chars.windows(2).filter(|w| w[0] == w[1]).count();
    repeated as f64 / (chars.len() - 1) as f64
}

fn non_alnum_ratio(text: &str) -> f64 {
    let (total, non_alnum) = text
        .chars()
        .filter(|c| *c != ' ')
        .fold((0usize, 0usize), |(total, non_alnum), c| {
            (total + 1, non_alnum + usize::from(!c.is_alphanumeric()))
        });
    if total == 0 {
        0.0
    } else {
        non_alnum as f64 / total as f64
    }
}

fn is_known_word(word: &str) -> bool {
    [
        KNOWN_ACTION_VERBS,
        KNOWN_FILE_TYPES,
        FILLER_WORDS,
        PURPOSE_KEYWORDS,
        COMMON_WORDS,
    ]
    .iter()
    .any(|table| table.contains(&word))
        || word.chars().all(|c| c.is_ascii_digit())
}

fn dictionary_word_ratio(text: &str) -> f64 {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let recognized = words.iter().filter(|w| is_known_word(w)).count();
    recognized as f64 / words.len() as f64
}

fn has_known_tokens(text: &str) -> bool {
    let lowered = text.to_lowercase();
    [
        KNOWN_ACTION_VERBS,
        KNOWN_FILE_TYPES,
        KNOWN_ALIASES,
        PURPOSE_KEYWORDS,
    ]
    .iter()
    .flat_map(|table| table.iter())
    .any(|token| lowered.contains(token))
}

fn prefix(s: &str) -> &str {
    match s.char_indices().nth(ALIAS_PREFIX_CHARS) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// Exact alias, or for short text a shared three-character prefix with one.
fn matches_known_alias(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    if KNOWN_ALIASES.contains(&lowered.as_str()) {
        return true;
    }
    if lowered.chars().count() < ALIAS_PREFIX_CHARS
        || lowered.split_whitespace().count() > SHORT_PROMPT_WORDS
    {
        return false;
    }
    let head = prefix(&lowered);
    KNOWN_ALIASES
        .iter()
        .filter(|alias| alias.chars().count() >= ALIAS_PREFIX_CHARS)
        .any(|alias| lowered.starts_with(prefix(alias)) || alias.starts_with(head))
}

/// Shown when the input is garbage and no rephrase is available. Options are always valid
/// operations for `source_type`.
pub fn garbage_prompt(source_type: SourceType) -> Result<UserChoicePrompt, ContractViolation> {
    let (noun, options): (&str, &[&str]) = match source_type {
        SourceType::Pdf => (
            "PDF",
            &[
                "compress",
                "split first page",
                "convert to docx",
                "rotate 90 degrees",
                "merge files",
            ],
        ),
        SourceType::Docx | SourceType::Doc => {
            ("document", &["convert to PDF", "compress", "add watermark"])
        }
        SourceType::Jpg | SourceType::Jpeg | SourceType::Png | SourceType::Img => (
            "image",
            &["convert to PDF", "compress", "enhance", "rotate 90 degrees"],
        ),
    };
    UserChoicePrompt::v1(
        format!("I couldn't understand that. What would you like to do with this {noun}?"),
        options.iter().map(|o| o.to_string()).collect(),
    )
}
