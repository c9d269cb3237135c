#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::command::{validate_target_size, Operation, PercentTarget, Purpose, SourceType};
use crate::common::require_range;
use crate::guard::{has_duplicates, GuardResult, ValidationStatus};
use crate::{ContractViolation, ReasonCodeId, SchemaVersion, Validate};

pub const RESOLUTION_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Hard cap on suggestions shown to the user.
pub const MAX_USER_OPTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    Resolved,
    NeedsUserChoice,
}

/// Target fields extracted from the command and carried through resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTargets {
    pub target_format: Option<SourceType>,
    pub target_size_mb: Option<f64>,
    pub target_percent: Option<PercentTarget>,
    pub purpose: Option<Purpose>,
}

impl Validate for ResolvedTargets {
    fn validate(&self) -> Result<(), ContractViolation> {
        if let Some(size) = self.target_size_mb {
            validate_target_size("resolved_targets.target_size_mb", size)?;
        }
        if let Some(p) = &self.target_percent {
            p.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub schema_version: SchemaVersion,
    pub state: ResolutionState,
    pub success: bool,
    pub pipeline: Vec<Operation>,
    pub source_type: SourceType,
    pub targets: ResolvedTargets,
    pub validation_status: ValidationStatus,
    pub confidence: f64,
    /// Last meaningful guard outcome, surfaced for user display.
    pub guard_result: Option<GuardResult>,
    pub needs_user_choice: bool,
    pub options: Vec<String>,
    pub error_message: Option<String>,
    /// The caller may route this request to the language-model collaborator.
    pub escalation_advised: bool,
    pub reason_code: ReasonCodeId,
}

impl ResolutionResult {
    #[allow(clippy::too_many_arguments)]
    pub fn resolved_v1(
        pipeline: Vec<Operation>,
        source_type: SourceType,
        targets: ResolvedTargets,
        validation_status: ValidationStatus,
        confidence: f64,
        guard_result: Option<GuardResult>,
        reason_code: ReasonCodeId,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: RESOLUTION_CONTRACT_VERSION,
            state: ResolutionState::Resolved,
            success: true,
            pipeline,
            source_type,
            targets,
            validation_status,
            confidence,
            guard_result,
            needs_user_choice: false,
            options: vec![],
            error_message: None,
            escalation_advised: false,
            reason_code,
        };
        r.validate()?;
        Ok(r)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn user_choice_v1(
        source_type: SourceType,
        targets: ResolvedTargets,
        validation_status: ValidationStatus,
        confidence: f64,
        guard_result: Option<GuardResult>,
        options: Vec<String>,
        error_message: String,
        escalation_advised: bool,
        reason_code: ReasonCodeId,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: RESOLUTION_CONTRACT_VERSION,
            state: ResolutionState::NeedsUserChoice,
            success: false,
            pipeline: vec![],
            source_type,
            targets,
            validation_status,
            confidence,
            guard_result,
            needs_user_choice: true,
            options,
            error_message: Some(error_message),
            escalation_advised,
            reason_code,
        };
        r.validate()?;
        Ok(r)
    }

    /// Resolved with nothing to run: the request was a no-op for this file.
    pub fn is_noop(&self) -> bool {
        self.success && self.pipeline.is_empty()
    }

    /// Explicit size from the command, else the purpose preset's ceiling.
    pub fn effective_target_size_mb(&self) -> Option<f64> {
        self.targets
            .target_size_mb
            .or_else(|| self.targets.purpose.map(|p| p.preset().max_size_mb))
    }
}

impl Validate for ResolutionResult {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != RESOLUTION_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "resolution_result.schema_version",
                reason: "must match RESOLUTION_CONTRACT_VERSION",
            });
        }
        self.targets.validate()?;
        require_range("resolution_result.confidence", self.confidence, 0.0, 1.0)?;
        if let Some(g) = &self.guard_result {
            g.validate()?;
        }
        if has_duplicates(&self.pipeline) {
            return Err(ContractViolation::InvalidValue {
                field: "resolution_result.pipeline",
                reason: "must not contain duplicate operations",
            });
        }
        match self.state {
            ResolutionState::Resolved => {
                if !self.success || self.needs_user_choice {
                    return Err(ContractViolation::InvalidValue {
                        field: "resolution_result.state",
                        reason: "resolved must be successful without user choice",
                    });
                }
                if !self.options.is_empty() || self.error_message.is_some() {
                    return Err(ContractViolation::InvalidValue {
                        field: "resolution_result.options",
                        reason: "resolved must not carry options or an error message",
                    });
                }
            }
            ResolutionState::NeedsUserChoice => {
                if self.success || !self.needs_user_choice || !self.pipeline.is_empty() {
                    return Err(ContractViolation::InvalidValue {
                        field: "resolution_result.state",
                        reason: "user choice must be unsuccessful with an empty pipeline",
                    });
                }
                if self.options.is_empty() || self.options.len() > MAX_USER_OPTIONS {
                    return Err(ContractViolation::InvalidValue {
                        field: "resolution_result.options",
                        reason: "must contain 1..=5 entries",
                    });
                }
                if self.options.iter().any(|o| o.trim().is_empty()) {
                    return Err(ContractViolation::InvalidValue {
                        field: "resolution_result.options[]",
                        reason: "must not contain empty strings",
                    });
                }
                if self
                    .error_message
                    .as_deref()
                    .map_or(true, |m| m.trim().is_empty())
                {
                    return Err(ContractViolation::InvalidValue {
                        field: "resolution_result.error_message",
                        reason: "must not be empty for user choice",
                    });
                }
            }
        }
        Ok(())
    }
}
