#![forbid(unsafe_code)]

use docflow_kernel_contracts::command::{ParsedCommand, SourceType};
use docflow_kernel_contracts::guard::{GuardResult, ValidationResult, ValidationStatus};
use docflow_kernel_contracts::resolution::{
    ResolutionResult, ResolutionState, ResolvedTargets, RESOLUTION_CONTRACT_VERSION,
};
use docflow_kernel_contracts::ContractViolation;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::garbage::{ClassifierConfig, GarbageClassifier};
use crate::guards::GuardEngine;
use crate::normalizer::Normalizer;
use crate::options::OptionGenerator;

pub mod reason_codes {
    use docflow_kernel_contracts::ReasonCodeId;

    pub const DF_RESOLVE_OK: ReasonCodeId = ReasonCodeId(0x4452_0001);
    pub const DF_RESOLVE_OK_ADJUSTED: ReasonCodeId = ReasonCodeId(0x4452_0002);
    pub const DF_RESOLVE_OK_NOOP: ReasonCodeId = ReasonCodeId(0x4452_0003);

    pub const DF_RESOLVE_NO_OPERATION: ReasonCodeId = ReasonCodeId(0x4452_00F1);
    pub const DF_RESOLVE_INCOMPATIBLE: ReasonCodeId = ReasonCodeId(0x4452_00F2);
    pub const DF_RESOLVE_INTERNAL_FAULT: ReasonCodeId = ReasonCodeId(0x4452_00F3);
}

const NO_OPERATION_MESSAGE: &str = "Could not detect an operation. Please select an action";
const INTERNAL_FAULT_MESSAGE: &str = "Something went wrong reading that. Please select an action";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Longer input is cut at a char boundary before normalization.
    pub max_input_chars: usize,
    pub max_options: usize,
}

impl ResolverConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_input_chars: 4096,
            max_options: 5,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

/// NORMALIZE -> MATCH -> {RESOLVED | NEEDS_USER_CHOICE}. One pass, no loops, no I/O.
#[derive(Debug, Clone)]
pub struct ResolverRuntime {
    config: ResolverConfig,
    normalizer: Normalizer,
    classifier: GarbageClassifier,
    guards: GuardEngine,
    options: OptionGenerator,
}

impl Default for ResolverRuntime {
    fn default() -> Self {
        Self::new(ResolverConfig::mvp_v1())
    }
}

impl ResolverRuntime {
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_classifier(config, ClassifierConfig::mvp_v1())
    }

    pub fn with_classifier(config: ResolverConfig, classifier: ClassifierConfig) -> Self {
        Self {
            config,
            normalizer: Normalizer::new(),
            classifier: GarbageClassifier::new(classifier),
            guards: GuardEngine::new(),
            options: OptionGenerator::new(config.max_options),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn classifier(&self) -> &GarbageClassifier {
        &self.classifier
    }

    pub fn guards(&self) -> &GuardEngine {
        &self.guards
    }

    pub fn parse(&self, user_input: &str) -> Result<ParsedCommand, ContractViolation> {
        self.normalizer
            .parse(truncate_chars(user_input, self.config.max_input_chars))
    }

    /// Never fails: internal faults come back as a user choice.
    pub fn resolve(&self, user_input: &str, source_type: SourceType) -> ResolutionResult {
        match self.try_resolve(user_input, source_type) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "resolution failed closed");
                self.fail_closed(source_type)
            }
        }
    }

    pub fn resolve_for_filename(&self, user_input: &str, filename: &str) -> ResolutionResult {
        self.resolve(user_input, SourceType::from_filename(filename))
    }

    fn try_resolve(
        &self,
        user_input: &str,
        source_type: SourceType,
    ) -> Result<ResolutionResult, ContractViolation> {
        let parsed = self.parse(user_input)?;
        debug!(
            normalized = %parsed.normalized_input,
            operations = ?parsed.operations,
            "parsed command"
        );
        let targets = ResolvedTargets {
            target_format: parsed.target_format,
            target_size_mb: parsed.target_size_mb,
            target_percent: parsed.target_percent,
            purpose: parsed.purpose,
        };

        if parsed.operations.is_empty() {
            let escalation = self.classifier.decide_escalation(&parsed.normalized_input);
            debug!(escalate = escalation.escalate, reason = %escalation.reason, "no operation matched");
            return ResolutionResult::user_choice_v1(
                source_type,
                targets,
                ValidationStatus::Ambiguous,
                parsed.confidence,
                None,
                self.options.for_command(source_type, &parsed),
                NO_OPERATION_MESSAGE.to_string(),
                escalation.escalate,
                reason_codes::DF_RESOLVE_NO_OPERATION,
            );
        }

        let validation = self.guards.validate(
            &parsed.operations,
            source_type,
            parsed.target_format,
            parsed.target_size_mb,
        )?;
        self.outcome(&parsed, source_type, targets, validation)
    }

    fn outcome(
        &self,
        parsed: &ParsedCommand,
        source_type: SourceType,
        targets: ResolvedTargets,
        validation: ValidationResult,
    ) -> Result<ResolutionResult, ContractViolation> {
        match validation.status {
            ValidationStatus::Valid if !validation.adjusted_pipeline.is_empty() => {
                let (guard_result, reason_code) = match validation.user_message {
                    Some(m) => (
                        Some(GuardResult::note(m, validation.reason_code)),
                        reason_codes::DF_RESOLVE_OK_ADJUSTED,
                    ),
                    None => (None, reason_codes::DF_RESOLVE_OK),
                };
                info!(
                    source = source_type.as_str(),
                    pipeline = ?validation.adjusted_pipeline,
                    "pipeline resolved"
                );
                ResolutionResult::resolved_v1(
                    validation.adjusted_pipeline,
                    source_type,
                    targets,
                    ValidationStatus::Valid,
                    parsed.confidence,
                    guard_result,
                    reason_code,
                )
            }
            ValidationStatus::Redundant => {
                let message = validation
                    .skip_reason
                    .or(validation.user_message)
                    .unwrap_or_else(|| "Nothing to do for this file".to_string());
                info!(source = source_type.as_str(), "request is a no-op");
                ResolutionResult::resolved_v1(
                    vec![],
                    source_type,
                    targets,
                    ValidationStatus::Redundant,
                    parsed.confidence,
                    Some(GuardResult::skip(message, validation.reason_code)),
                    reason_codes::DF_RESOLVE_OK_NOOP,
                )
            }
            ValidationStatus::Incompatible => {
                let message = validation
                    .user_message
                    .unwrap_or_else(|| "Those operations cannot run on this file".to_string());
                info!(source = source_type.as_str(), reason = %message, "pipeline rejected");
                ResolutionResult::user_choice_v1(
                    source_type,
                    targets,
                    ValidationStatus::Incompatible,
                    parsed.confidence,
                    Some(GuardResult::note(message.clone(), validation.reason_code)),
                    self.options.for_command(source_type, parsed),
                    message,
                    false,
                    reason_codes::DF_RESOLVE_INCOMPATIBLE,
                )
            }
            ValidationStatus::Valid | ValidationStatus::Ambiguous | ValidationStatus::RetryNeeded => {
                ResolutionResult::user_choice_v1(
                    source_type,
                    targets,
                    ValidationStatus::Ambiguous,
                    parsed.confidence,
                    None,
                    self.options.for_command(source_type, parsed),
                    NO_OPERATION_MESSAGE.to_string(),
                    false,
                    reason_codes::DF_RESOLVE_NO_OPERATION,
                )
            }
        }
    }

    fn fail_closed(&self, source_type: SourceType) -> ResolutionResult {
        ResolutionResult {
            schema_version: RESOLUTION_CONTRACT_VERSION,
            state: ResolutionState::NeedsUserChoice,
            success: false,
            pipeline: vec![],
            source_type,
            targets: ResolvedTargets::default(),
            validation_status: ValidationStatus::Ambiguous,
            confidence: 0.0,
            guard_result: None,
            needs_user_choice: true,
            options: self.options.generate(source_type, &[]),
            error_message: Some(INTERNAL_FAULT_MESSAGE.to_string()),
            escalation_advised: false,
            reason_code: reason_codes::DF_RESOLVE_INTERNAL_FAULT,
        }
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}
