#![forbid(unsafe_code)]

use docflow_kernel_contracts::command::{
    Operation, ParsedCommand, PercentTarget, Purpose, SourceType, MAX_PARSED_OPERATIONS,
};
use docflow_kernel_contracts::ContractViolation;
use unicode_normalization::UnicodeNormalization;

use crate::registry::{PatternRegistry, DELIMITER, DELIMITER_TOKEN};

/// Upper bound on normalization passes. Each pass after the first can only strip a
/// prefix exposed by a typo fix, so real input converges in two or three.
const MAX_NORMALIZE_PASSES: usize = 8;

const CONFIDENCE_NO_OPERATION: f64 = 0.3;
const CONFIDENCE_OPERATION: f64 = 0.8;
const CONFIDENCE_TARGET_BONUS: f64 = 0.1;
const CONFIDENCE_SEQUENCE_BONUS: f64 = 0.05;

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    registry: &'static PatternRegistry,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self::with_registry(PatternRegistry::global())
    }

    pub fn with_registry(registry: &'static PatternRegistry) -> Self {
        Self { registry }
    }

    /// Total over any input. The result is a fixed point: normalizing it again is a no-op.
    pub fn normalize(&self, text: &str) -> String {
        let mut current = self.normalize_pass(text);
        for _ in 1..MAX_NORMALIZE_PASSES {
            let next = self.normalize_pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn normalize_pass(&self, text: &str) -> String {
        let folded = text.nfkc().collect::<String>().to_lowercase();
        let collapsed = self
            .registry
            .whitespace_run()
            .replace_all(folded.trim(), " ")
            .into_owned();

        let mut out = self.strip_noise_prefixes(collapsed);

        for (typo, fix) in self.registry.typo_fixes() {
            if typo.is_match(&out) {
                out = typo.replace_all(&out, *fix).into_owned();
            }
        }

        out = self
            .registry
            .sequence_connectors()
            .replace_all(&out, DELIMITER_TOKEN)
            .into_owned();
        out = self
            .registry
            .sequence_glyphs()
            .replace_all(&out, DELIMITER_TOKEN)
            .into_owned();

        out.trim().to_string()
    }

    fn strip_noise_prefixes(&self, mut text: String) -> String {
        loop {
            let before = text.len();
            for prefix in self.registry.noise_prefixes() {
                if let Some(m) = prefix.find(&text) {
                    text = text[m.end()..].trim_start().to_string();
                }
            }
            if text.len() == before {
                return text;
            }
        }
    }

    /// With a delimiter: one operation per segment, first keyword match wins, segment
    /// order kept. Without: every operation whose keyword fires, in table order.
    pub fn extract_operations(&self, normalized: &str) -> Vec<Operation> {
        let patterns = self.registry.operation_patterns();
        if normalized.contains(DELIMITER) {
            normalized
                .split(DELIMITER)
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .filter_map(|segment| {
                    patterns
                        .iter()
                        .find(|(_, re)| re.is_match(segment))
                        .map(|(op, _)| *op)
                })
                .collect()
        } else {
            patterns
                .iter()
                .filter(|(_, re)| re.is_match(normalized))
                .map(|(op, _)| *op)
                .collect()
        }
    }

    pub fn extract_target_format(&self, normalized: &str) -> Option<SourceType> {
        self.registry
            .target_format_patterns()
            .iter()
            .find(|(re, _)| re.is_match(normalized))
            .map(|(_, t)| *t)
    }

    /// First size mention only, in MB.
    pub fn extract_target_size(&self, normalized: &str) -> Option<f64> {
        let caps = self.registry.target_size_pattern().captures(normalized)?;
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        let mb = match caps.get(2)?.as_str() {
            "kb" => value / 1024.0,
            "mb" => value,
            "gb" => value * 1024.0,
            _ => return None,
        };
        (mb.is_finite() && mb > 0.0).then_some(mb)
    }

    pub fn extract_target_percent(&self, normalized: &str) -> Option<PercentTarget> {
        let caps = self.registry.target_percent_pattern().captures(normalized)?;
        let pct: f64 = caps.get(2)?.as_str().parse().ok()?;
        // Whole percentages only.
        if pct.fract() != 0.0 || !(1.0..=99.0).contains(&pct) {
            return None;
        }
        let pct = pct as u8;
        match caps.get(1).map(|m| m.as_str()) {
            Some("to") => Some(PercentTarget::ReduceTo(pct)),
            _ => Some(PercentTarget::ReduceBy(pct)),
        }
    }

    pub fn extract_purpose(&self, normalized: &str) -> Option<Purpose> {
        self.registry
            .purpose_patterns()
            .iter()
            .find(|(re, _)| re.is_match(normalized))
            .map(|(_, p)| *p)
    }

    pub fn parse(&self, raw: &str) -> Result<ParsedCommand, ContractViolation> {
        let normalized = self.normalize(raw);
        let mut operations = self.extract_operations(&normalized);
        operations.truncate(MAX_PARSED_OPERATIONS);
        let target_format = self.extract_target_format(&normalized);
        let target_size_mb = self.extract_target_size(&normalized);
        let target_percent = self.extract_target_percent(&normalized);
        let purpose = self.extract_purpose(&normalized);
        let explicit_sequence = normalized.contains(DELIMITER);

        let has_target = target_format.is_some()
            || target_size_mb.is_some()
            || target_percent.is_some()
            || purpose.is_some();
        let confidence = if normalized.is_empty() {
            0.0
        } else if operations.is_empty() {
            CONFIDENCE_NO_OPERATION
        } else {
            let mut c = CONFIDENCE_OPERATION;
            if has_target {
                c += CONFIDENCE_TARGET_BONUS;
            }
            if explicit_sequence {
                c += CONFIDENCE_SEQUENCE_BONUS;
            }
            c.min(1.0)
        };

        ParsedCommand::v1(
            raw.to_string(),
            normalized,
            operations,
            target_format,
            target_size_mb,
            target_percent,
            purpose,
            confidence,
            explicit_sequence,
        )
    }
}
