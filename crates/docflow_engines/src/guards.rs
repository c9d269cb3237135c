#![forbid(unsafe_code)]

use docflow_kernel_contracts::command::{Operation, SourceType};
use docflow_kernel_contracts::guard::{
    GuardResult, RetryAction, ValidationResult, ValidationStatus,
};
use docflow_kernel_contracts::{ContractViolation, ReasonCodeId};
use tracing::{debug, info, warn};

use crate::registry::{
    is_redundant_conversion, valid_operations, CONFLICTING_OPERATIONS, ENCODING_ERROR_MARKERS,
};

pub mod reason_codes {
    use docflow_kernel_contracts::ReasonCodeId;

    pub const DF_GUARD_OK_VALID: ReasonCodeId = ReasonCodeId(0x4447_0001);
    pub const DF_GUARD_OK_ADJUSTED: ReasonCodeId = ReasonCodeId(0x4447_0002);
    pub const DF_GUARD_REDUNDANT_SKIP: ReasonCodeId = ReasonCodeId(0x4447_0003);
    pub const DF_GUARD_SIZE_MET: ReasonCodeId = ReasonCodeId(0x4447_0004);
    pub const DF_GUARD_SIZE_BEST_EFFORT: ReasonCodeId = ReasonCodeId(0x4447_0005);
    pub const DF_GUARD_RETRY_STRONGER_PRESET: ReasonCodeId = ReasonCodeId(0x4447_0006);
    pub const DF_GUARD_RETRY_OCR_FALLBACK: ReasonCodeId = ReasonCodeId(0x4447_0007);

    pub const DF_GUARD_NO_OPERATIONS: ReasonCodeId = ReasonCodeId(0x4447_00F1);
    pub const DF_GUARD_INCOMPATIBLE_SOURCE: ReasonCodeId = ReasonCodeId(0x4447_00F2);
    pub const DF_GUARD_CONFLICTING_OPERATIONS: ReasonCodeId = ReasonCodeId(0x4447_00F3);
    pub const DF_GUARD_ERROR_TERMINAL: ReasonCodeId = ReasonCodeId(0x4447_00F4);
    pub const DF_GUARD_INVALID_MEASUREMENT: ReasonCodeId = ReasonCodeId(0x4447_00F5);
}

/// File facts the pre-execution guards see alongside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardContext {
    pub source_type: SourceType,
    pub target_type: Option<SourceType>,
}

impl GuardContext {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            target_type: None,
        }
    }
}

/// What one pre-execution guard decided.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome {
    /// Run `pipeline` instead of the input and keep evaluating.
    Adjusted {
        pipeline: Vec<Operation>,
        result: GuardResult,
    },
    /// Nothing left to run. Success with no output change.
    Skip(GuardResult),
    /// Nothing may run.
    Reject(GuardResult),
}

/// Drops a no-op `convert`, then removes exact duplicates keeping first occurrences.
pub fn check_redundancy(pipeline: &[Operation], ctx: &GuardContext) -> Option<GuardOutcome> {
    let mut adjusted = pipeline.to_vec();
    let mut notes = Vec::new();

    if let Some(target) = ctx.target_type {
        if adjusted.contains(&Operation::Convert) && is_redundant_conversion(ctx.source_type, target)
        {
            adjusted.retain(|op| *op != Operation::Convert);
            let label = target.as_str().to_uppercase();
            if adjusted.is_empty() {
                return Some(GuardOutcome::Skip(GuardResult::skip(
                    format!("File is already in {label} format"),
                    reason_codes::DF_GUARD_REDUNDANT_SKIP,
                )));
            }
            notes.push(format!("Skipping conversion (already {label})"));
        }
    }

    let deduped = dedup_stable(&adjusted);
    if deduped.len() < adjusted.len() {
        notes.push("Removed duplicate operations".to_string());
        adjusted = deduped;
    }

    if notes.is_empty() {
        return None;
    }
    Some(GuardOutcome::Adjusted {
        pipeline: adjusted,
        result: GuardResult::note(notes.join("; "), reason_codes::DF_GUARD_OK_ADJUSTED),
    })
}

pub fn check_compatibility(pipeline: &[Operation], ctx: &GuardContext) -> Option<GuardOutcome> {
    let allowed = valid_operations(ctx.source_type);
    let (compatible, incompatible): (Vec<Operation>, Vec<Operation>) =
        pipeline.iter().partition(|op| allowed.contains(op));
    if incompatible.is_empty() {
        return None;
    }
    let names = dedup_stable(&incompatible)
        .iter()
        .map(|op| op.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    if compatible.is_empty() {
        return Some(GuardOutcome::Reject(GuardResult::note(
            format!(
                "Operations not supported for {}: {names}",
                ctx.source_type.as_str().to_uppercase()
            ),
            reason_codes::DF_GUARD_INCOMPATIBLE_SOURCE,
        )));
    }
    Some(GuardOutcome::Adjusted {
        pipeline: compatible,
        result: GuardResult::note(
            format!("Skipping unsupported operations: {names}"),
            reason_codes::DF_GUARD_OK_ADJUSTED,
        ),
    })
}

/// Rejects when the pipeline contains every member of a mutually exclusive set.
pub fn check_conflicts(pipeline: &[Operation], _ctx: &GuardContext) -> Option<GuardOutcome> {
    CONFLICTING_OPERATIONS
        .iter()
        .find(|set| set.iter().all(|op| pipeline.contains(op)))
        .map(|set| {
            let names = set.iter().map(|op| op.as_str()).collect::<Vec<_>>();
            GuardOutcome::Reject(GuardResult::note(
                format!("Cannot perform {} on the same file", names.join(" and ")),
                reason_codes::DF_GUARD_CONFLICTING_OPERATIONS,
            ))
        })
}

pub(crate) fn dedup_stable(ops: &[Operation]) -> Vec<Operation> {
    let mut out: Vec<Operation> = Vec::with_capacity(ops.len());
    for op in ops {
        if !out.contains(op) {
            out.push(*op);
        }
    }
    out
}

/// Stateless. Retry decisions take the caller's per-kind retry count; at most one retry
/// is ever granted per failure kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardEngine;

impl GuardEngine {
    pub fn new() -> Self {
        Self
    }

    /// Redundancy, then compatibility, then conflicts. Conflicts are judged on the
    /// requested operations, before compatibility trims anything. `target_size_mb` is
    /// only logged here; size targets are checked after execution by
    /// [`GuardEngine::validate_size_target`].
    pub fn validate(
        &self,
        operations: &[Operation],
        source_type: SourceType,
        target_type: Option<SourceType>,
        target_size_mb: Option<f64>,
    ) -> Result<ValidationResult, ContractViolation> {
        let original = operations.to_vec();
        if original.is_empty() {
            return ValidationResult::v1(
                ValidationStatus::Ambiguous,
                false,
                original,
                vec![],
                Some("No operations detected".to_string()),
                None,
                None,
                reason_codes::DF_GUARD_NO_OPERATIONS,
            );
        }

        debug!(
            source = source_type.as_str(),
            operations = original.len(),
            target_size_mb = ?target_size_mb,
            "validating pipeline"
        );
        let ctx = GuardContext {
            source_type,
            target_type,
        };
        let mut notes: Vec<GuardResult> = Vec::new();

        let requested = match check_redundancy(&original, &ctx) {
            Some(GuardOutcome::Skip(g)) => {
                debug!(source = source_type.as_str(), "request is a no-op");
                return redundant(original, g);
            }
            Some(GuardOutcome::Adjusted { pipeline, result }) => {
                notes.push(result);
                pipeline
            }
            Some(GuardOutcome::Reject(g)) => return incompatible(original, g),
            None => original.clone(),
        };

        let pipeline = match check_compatibility(&requested, &ctx) {
            Some(GuardOutcome::Adjusted { pipeline, result }) => {
                notes.push(result);
                pipeline
            }
            Some(GuardOutcome::Reject(g)) => return incompatible(original, g),
            Some(GuardOutcome::Skip(g)) => return redundant(original, g),
            None => requested.clone(),
        };

        match check_conflicts(&requested, &ctx) {
            Some(GuardOutcome::Reject(g)) | Some(GuardOutcome::Skip(g)) => {
                return incompatible(original, g)
            }
            Some(GuardOutcome::Adjusted { .. }) | None => {}
        }

        let message = notes
            .iter()
            .filter(|g| g.is_meaningful())
            .filter_map(|g| g.user_message.as_deref())
            .collect::<Vec<_>>()
            .join("; ");
        let (user_message, reason_code) = if message.is_empty() {
            (None, reason_codes::DF_GUARD_OK_VALID)
        } else {
            debug!(adjusted = ?pipeline, "pipeline adjusted by guards");
            (Some(message), reason_codes::DF_GUARD_OK_ADJUSTED)
        };
        ValidationResult::v1(
            ValidationStatus::Valid,
            true,
            original,
            pipeline,
            user_message,
            None,
            None,
            reason_code,
        )
    }

    /// `achieved_mb` is the measured output after one compress attempt.
    pub fn validate_size_target(
        &self,
        achieved_mb: f64,
        target_mb: f64,
        retry_count: u32,
    ) -> Result<ValidationResult, ContractViolation> {
        if !achieved_mb.is_finite() || achieved_mb < 0.0 || !target_mb.is_finite() || target_mb <= 0.0
        {
            warn!(achieved_mb, target_mb, "size check got an unusable measurement");
            return terminal(
                "Could not measure the output size".to_string(),
                reason_codes::DF_GUARD_INVALID_MEASUREMENT,
            );
        }
        if achieved_mb <= target_mb {
            return ValidationResult::v1(
                ValidationStatus::Valid,
                true,
                vec![],
                vec![],
                Some(format!("Target size achieved: {achieved_mb:.1}MB")),
                None,
                None,
                reason_codes::DF_GUARD_SIZE_MET,
            );
        }
        if retry_count == 0 {
            info!(achieved_mb, target_mb, "size target missed, retrying with stronger preset");
            return ValidationResult::v1(
                ValidationStatus::RetryNeeded,
                false,
                vec![],
                vec![],
                Some(format!(
                    "Retrying with stronger compression (current: {achieved_mb:.1}MB, target: {target_mb:.1}MB)"
                )),
                Some(RetryAction::StrongerPreset),
                None,
                reason_codes::DF_GUARD_RETRY_STRONGER_PRESET,
            );
        }
        ValidationResult::v1(
            ValidationStatus::Valid,
            true,
            vec![],
            vec![],
            Some(format!(
                "Best compression achieved: {achieved_mb:.1}MB (target was {target_mb:.1}MB)"
            )),
            None,
            None,
            reason_codes::DF_GUARD_SIZE_BEST_EFFORT,
        )
    }

    pub fn validate_error_for_retry(
        &self,
        error_message: &str,
        retry_count: u32,
    ) -> Result<ValidationResult, ContractViolation> {
        if retry_count == 0 && is_encoding_error(error_message) {
            info!("encoding-class failure, retrying with ocr fallback");
            return ValidationResult::v1(
                ValidationStatus::RetryNeeded,
                false,
                vec![],
                vec![],
                Some("Retrying with OCR processing".to_string()),
                Some(RetryAction::OcrFallback),
                None,
                reason_codes::DF_GUARD_RETRY_OCR_FALLBACK,
            );
        }
        terminal(
            "Processing failed - please try a different approach".to_string(),
            reason_codes::DF_GUARD_ERROR_TERMINAL,
        )
    }

    pub fn should_retry_on_error(
        &self,
        error_message: &str,
        retry_count: u32,
    ) -> (bool, Option<RetryAction>) {
        retry_decision(self.validate_error_for_retry(error_message, retry_count))
    }

    pub fn should_retry_on_size_miss(
        &self,
        achieved_mb: f64,
        target_mb: f64,
        retry_count: u32,
    ) -> (bool, Option<RetryAction>) {
        retry_decision(self.validate_size_target(achieved_mb, target_mb, retry_count))
    }
}

pub fn is_encoding_error(error_message: &str) -> bool {
    let lowered = error_message.to_lowercase();
    ENCODING_ERROR_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn retry_decision(
    result: Result<ValidationResult, ContractViolation>,
) -> (bool, Option<RetryAction>) {
    match result {
        Ok(r) if r.should_retry() => (true, r.retry_action),
        Ok(_) => (false, None),
        Err(e) => {
            warn!(error = %e, "retry guard produced an invalid result");
            (false, None)
        }
    }
}

fn redundant(
    original: Vec<Operation>,
    g: GuardResult,
) -> Result<ValidationResult, ContractViolation> {
    ValidationResult::v1(
        ValidationStatus::Redundant,
        true,
        original,
        vec![],
        g.user_message.clone(),
        None,
        g.user_message,
        g.reason_code,
    )
}

fn incompatible(
    original: Vec<Operation>,
    g: GuardResult,
) -> Result<ValidationResult, ContractViolation> {
    debug!(reason = ?g.user_message, "pipeline rejected");
    ValidationResult::v1(
        ValidationStatus::Incompatible,
        false,
        original,
        vec![],
        g.user_message,
        None,
        None,
        g.reason_code,
    )
}

fn terminal(message: String, reason_code: ReasonCodeId) -> Result<ValidationResult, ContractViolation> {
    ValidationResult::v1(
        ValidationStatus::Valid,
        false,
        vec![],
        vec![],
        Some(message),
        None,
        None,
        reason_code,
    )
}
