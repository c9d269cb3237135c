#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::command::Operation;
use crate::{ContractViolation, ReasonCodeId, SchemaVersion, Validate};

pub const GUARD_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    /// The request is a no-op for this file. Skipped, never an error.
    Redundant,
    Incompatible,
    RetryNeeded,
    Ambiguous,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::Redundant => "redundant",
            ValidationStatus::Incompatible => "incompatible",
            ValidationStatus::RetryNeeded => "retry_needed",
            ValidationStatus::Ambiguous => "ambiguous",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAction {
    StrongerPreset,
    OcrFallback,
}

impl RetryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RetryAction::StrongerPreset => "stronger_preset",
            RetryAction::OcrFallback => "ocr_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardResult {
    pub should_skip: bool,
    pub should_retry: bool,
    pub retry_action: Option<RetryAction>,
    pub user_message: Option<String>,
    pub reason_code: ReasonCodeId,
}

impl GuardResult {
    pub fn skip(user_message: String, reason_code: ReasonCodeId) -> Self {
        Self {
            should_skip: true,
            should_retry: false,
            retry_action: None,
            user_message: Some(user_message),
            reason_code,
        }
    }

    /// Informational only: the pipeline runs, the message is shown.
    pub fn note(user_message: String, reason_code: ReasonCodeId) -> Self {
        Self {
            should_skip: false,
            should_retry: false,
            retry_action: None,
            user_message: Some(user_message),
            reason_code,
        }
    }

    pub fn is_meaningful(&self) -> bool {
        self.should_skip || self.should_retry || self.user_message.is_some()
    }
}

impl Validate for GuardResult {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.should_retry != self.retry_action.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "guard_result.retry_action",
                reason: "must be present iff should_retry",
            });
        }
        if self.should_skip && self.should_retry {
            return Err(ContractViolation::InvalidValue {
                field: "guard_result",
                reason: "must not both skip and retry",
            });
        }
        if let Some(m) = &self.user_message {
            if m.trim().is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "guard_result.user_message",
                    reason: "must not be empty when present",
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub schema_version: SchemaVersion,
    pub status: ValidationStatus,
    pub is_valid: bool,
    pub original_pipeline: Vec<Operation>,
    pub adjusted_pipeline: Vec<Operation>,
    pub user_message: Option<String>,
    pub retry_action: Option<RetryAction>,
    pub skip_reason: Option<String>,
    pub reason_code: ReasonCodeId,
}

impl ValidationResult {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        status: ValidationStatus,
        is_valid: bool,
        original_pipeline: Vec<Operation>,
        adjusted_pipeline: Vec<Operation>,
        user_message: Option<String>,
        retry_action: Option<RetryAction>,
        skip_reason: Option<String>,
        reason_code: ReasonCodeId,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: GUARD_CONTRACT_VERSION,
            status,
            is_valid,
            original_pipeline,
            adjusted_pipeline,
            user_message,
            retry_action,
            skip_reason,
            reason_code,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn should_retry(&self) -> bool {
        self.status == ValidationStatus::RetryNeeded
    }
}

impl Validate for ValidationResult {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != GUARD_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "validation_result.schema_version",
                reason: "must match GUARD_CONTRACT_VERSION",
            });
        }
        if (self.status == ValidationStatus::RetryNeeded) != self.retry_action.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "validation_result.retry_action",
                reason: "must be present iff status is retry_needed",
            });
        }
        if has_duplicates(&self.adjusted_pipeline) {
            return Err(ContractViolation::InvalidValue {
                field: "validation_result.adjusted_pipeline",
                reason: "must not contain duplicate operations",
            });
        }
        if !is_ordered_subsequence(&self.adjusted_pipeline, &self.original_pipeline) {
            return Err(ContractViolation::InvalidValue {
                field: "validation_result.adjusted_pipeline",
                reason: "must be a subsequence of original_pipeline",
            });
        }
        match self.status {
            ValidationStatus::Incompatible | ValidationStatus::Ambiguous => {
                if self.is_valid || !self.adjusted_pipeline.is_empty() {
                    return Err(ContractViolation::InvalidValue {
                        field: "validation_result.status",
                        reason: "incompatible/ambiguous must be invalid with an empty pipeline",
                    });
                }
            }
            ValidationStatus::Redundant => {
                if !self.is_valid || !self.adjusted_pipeline.is_empty() {
                    return Err(ContractViolation::InvalidValue {
                        field: "validation_result.status",
                        reason: "redundant must be valid with an empty pipeline",
                    });
                }
            }
            ValidationStatus::Valid | ValidationStatus::RetryNeeded => {}
        }
        Ok(())
    }
}

pub fn has_duplicates(ops: &[Operation]) -> bool {
    let mut seen = BTreeSet::new();
    ops.iter().any(|op| !seen.insert(op.as_str()))
}

/// True when every element of `sub` appears in `full` in the same relative order.
pub fn is_ordered_subsequence(sub: &[Operation], full: &[Operation]) -> bool {
    let mut rest = full.iter();
    sub.iter().all(|op| rest.any(|candidate| candidate == op))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsequence_respects_relative_order() {
        use Operation::*;
        assert!(is_ordered_subsequence(&[Split, Compress], &[Split, Convert, Compress]));
        assert!(!is_ordered_subsequence(&[Compress, Split], &[Split, Compress]));
        assert!(is_ordered_subsequence(&[], &[Merge]));
        assert!(!is_ordered_subsequence(&[Merge], &[]));
    }

    #[test]
    fn validation_result_rejects_reordered_pipeline() {
        let r = ValidationResult::v1(
            ValidationStatus::Valid,
            true,
            vec![Operation::Split, Operation::Compress],
            vec![Operation::Compress, Operation::Split],
            None,
            None,
            None,
            ReasonCodeId(1),
        );
        assert!(r.is_err());
    }

    #[test]
    fn validation_result_rejects_duplicates_in_adjusted() {
        let r = ValidationResult::v1(
            ValidationStatus::Valid,
            true,
            vec![Operation::Compress, Operation::Compress],
            vec![Operation::Compress, Operation::Compress],
            None,
            None,
            None,
            ReasonCodeId(1),
        );
        assert!(r.is_err());
    }

    #[test]
    fn retry_action_required_iff_retry_needed() {
        let missing = ValidationResult::v1(
            ValidationStatus::RetryNeeded,
            true,
            vec![],
            vec![],
            None,
            None,
            None,
            ReasonCodeId(1),
        );
        assert!(missing.is_err());

        let guard = GuardResult {
            should_skip: false,
            should_retry: true,
            retry_action: None,
            user_message: None,
            reason_code: ReasonCodeId(1),
        };
        assert!(guard.validate().is_err());
    }

    #[test]
    fn retry_action_wire_names_are_stable() {
        assert_eq!(RetryAction::StrongerPreset.as_str(), "stronger_preset");
        assert_eq!(RetryAction::OcrFallback.as_str(), "ocr_fallback");
        assert_eq!(ValidationStatus::RetryNeeded.as_str(), "retry_needed");
    }
}
