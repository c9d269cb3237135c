#![forbid(unsafe_code)]

use docflow_engines::{garbage_prompt, ResolverRuntime};
use docflow_kernel_contracts::command::SourceType;
use docflow_kernel_contracts::escalation::UserChoicePrompt;
use docflow_kernel_contracts::resolution::ResolutionResult;
use docflow_kernel_contracts::{ContractViolation, Validate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MAX_ESCALATIONS_CEILING: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscalationError {
    #[error("escalation unavailable: {0}")]
    Unavailable(String),
    #[error("escalation timed out")]
    TimedOut,
    #[error("escalation failed: {0}")]
    Failed(String),
}

/// Remote rephrase collaborator. Turns degenerate input into a short command the
/// deterministic resolver can match.
pub trait IntentEscalator {
    fn rephrase(&self, user_input: &str, source_type: SourceType)
        -> Result<String, EscalationError>;
}

/// Escalator for deployments without a remote model.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEscalator;

impl IntentEscalator for NoEscalator {
    fn rephrase(
        &self,
        _user_input: &str,
        _source_type: SourceType,
    ) -> Result<String, EscalationError> {
        Err(EscalationError::Unavailable(
            "no escalator configured".to_string(),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveWiringConfig {
    pub escalation_enabled: bool,
    pub max_escalations: u8,
}

impl ResolveWiringConfig {
    pub fn mvp_v1(escalation_enabled: bool) -> Self {
        Self {
            escalation_enabled,
            max_escalations: 1,
        }
    }
}

impl Default for ResolveWiringConfig {
    fn default() -> Self {
        Self::mvp_v1(true)
    }
}

impl Validate for ResolveWiringConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.max_escalations > MAX_ESCALATIONS_CEILING {
            return Err(ContractViolation::InvalidRange {
                field: "resolve_wiring_config.max_escalations",
                min: 0.0,
                max: f64::from(MAX_ESCALATIONS_CEILING),
                got: f64::from(self.max_escalations),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveWiringOutcome {
    /// The user's own words were enough, either for a pipeline or for a ranked choice.
    Local(ResolutionResult),
    /// A rephrase resolved where the original input could not.
    Escalated {
        rephrased: String,
        attempts: u8,
        result: ResolutionResult,
    },
    /// Garbage input with no usable rephrase.
    GarbagePrompt {
        prompt: UserChoicePrompt,
        result: ResolutionResult,
    },
}

impl ResolveWiringOutcome {
    pub fn result(&self) -> &ResolutionResult {
        match self {
            ResolveWiringOutcome::Local(r) => r,
            ResolveWiringOutcome::Escalated { result, .. } => result,
            ResolveWiringOutcome::GarbagePrompt { result, .. } => result,
        }
    }
}

/// Local first. Only input the classifier flags as garbage reaches the escalator, and
/// never more than `max_escalations` times per request.
#[derive(Debug, Clone)]
pub struct ResolveWiring<E>
where
    E: IntentEscalator,
{
    config: ResolveWiringConfig,
    runtime: ResolverRuntime,
    escalator: E,
}

impl<E> ResolveWiring<E>
where
    E: IntentEscalator,
{
    pub fn new(
        config: ResolveWiringConfig,
        runtime: ResolverRuntime,
        escalator: E,
    ) -> Result<Self, ContractViolation> {
        config.validate()?;
        Ok(Self {
            config,
            runtime,
            escalator,
        })
    }

    pub fn runtime(&self) -> &ResolverRuntime {
        &self.runtime
    }

    pub fn run(
        &self,
        user_input: &str,
        source_type: SourceType,
    ) -> Result<ResolveWiringOutcome, ContractViolation> {
        let local = self.runtime.resolve(user_input, source_type);
        if local.success || !local.escalation_advised {
            return Ok(ResolveWiringOutcome::Local(local));
        }

        if self.config.escalation_enabled {
            for attempt in 1..=self.config.max_escalations {
                let rephrased = match self.escalator.rephrase(user_input, source_type) {
                    Ok(text) if !text.trim().is_empty() => text,
                    Ok(_) => {
                        warn!(attempt, "escalator returned an empty rephrase");
                        continue;
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "escalation failed");
                        continue;
                    }
                };
                debug!(attempt, rephrased = %rephrased, "resolving rephrased input");
                let result = self.runtime.resolve(&rephrased, source_type);
                if result.success && result.validate().is_ok() {
                    info!(attempt, pipeline = ?result.pipeline, "escalation resolved");
                    return Ok(ResolveWiringOutcome::Escalated {
                        rephrased,
                        attempts: attempt,
                        result,
                    });
                }
            }
        }

        Ok(ResolveWiringOutcome::GarbagePrompt {
            prompt: garbage_prompt(source_type)?,
            result: local,
        })
    }
}
