#![forbid(unsafe_code)]

pub mod garbage;
pub mod guards;
pub mod normalizer;
pub mod options;
pub mod presets;
pub mod registry;
pub mod resolver;

use docflow_kernel_contracts::command::{Operation, SourceType};
use docflow_kernel_contracts::guard::{RetryAction, ValidationResult};
use docflow_kernel_contracts::resolution::ResolutionResult;
use docflow_kernel_contracts::ContractViolation;

pub use garbage::{garbage_prompt, ClassifierConfig, GarbageClassifier};
pub use guards::{GuardContext, GuardEngine, GuardOutcome};
pub use normalizer::Normalizer;
pub use options::OptionGenerator;
pub use presets::{get_purpose_presets, purpose_presets_for_name};
pub use registry::PatternRegistry;
pub use resolver::{ResolverConfig, ResolverRuntime};

/// Resolves with the default configuration.
pub fn resolve(user_input: &str, source_type: SourceType) -> ResolutionResult {
    ResolverRuntime::default().resolve(user_input, source_type)
}

pub fn validate(
    operations: &[Operation],
    source_type: SourceType,
    target_type: Option<SourceType>,
    target_size_mb: Option<f64>,
) -> Result<ValidationResult, ContractViolation> {
    GuardEngine::new().validate(operations, source_type, target_type, target_size_mb)
}

pub fn should_retry_on_error(error_message: &str, retry_count: u32) -> (bool, Option<RetryAction>) {
    GuardEngine::new().should_retry_on_error(error_message, retry_count)
}

pub fn should_retry_on_size_miss(
    achieved_mb: f64,
    target_mb: f64,
    retry_count: u32,
) -> (bool, Option<RetryAction>) {
    GuardEngine::new().should_retry_on_size_miss(achieved_mb, target_mb, retry_count)
}
