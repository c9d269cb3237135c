#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use docflow_engines::GuardEngine;
use docflow_kernel_contracts::command::{Operation, SourceType};
use docflow_kernel_contracts::guard::RetryAction;
use docflow_kernel_contracts::resolution::ResolutionResult;
use docflow_kernel_contracts::{ContractViolation, Validate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// The guards never grant more than one retry per failure kind.
pub const MAX_RETRIES_PER_KIND: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct TransformStep {
    /// 1-based position in the pipeline.
    pub index: usize,
    pub operation: Operation,
    pub input: PathBuf,
    pub input_type: SourceType,
    pub target_format: Option<SourceType>,
    pub target_size_mb: Option<f64>,
    /// Retry actions granted so far, in grant order. Never holds duplicates.
    pub retry_actions: Vec<RetryAction>,
}

impl TransformStep {
    pub fn has_retry_action(&self, action: RetryAction) -> bool {
        self.retry_actions.contains(&action)
    }

    fn grant(&mut self, action: Option<RetryAction>) {
        if let Some(action) = action {
            if !self.has_retry_action(action) {
                self.retry_actions.push(action);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub path: PathBuf,
    pub output_type: SourceType,
    pub size_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("{0}")]
    Failed(String),
    #[error("{} is not supported by this transform", .0.as_str())]
    Unsupported(Operation),
}

/// File-processing collaborator. One call per attempt.
pub trait FileTransform {
    fn apply(&self, step: &TransformStep) -> Result<TransformOutput, TransformError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineRunnerConfig {
    pub max_retries_per_kind: u32,
}

impl PipelineRunnerConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_retries_per_kind: MAX_RETRIES_PER_KIND,
        }
    }
}

impl Default for PipelineRunnerConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

impl Validate for PipelineRunnerConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.max_retries_per_kind > MAX_RETRIES_PER_KIND {
            return Err(ContractViolation::InvalidRange {
                field: "pipeline_runner_config.max_retries_per_kind",
                min: 0.0,
                max: f64::from(MAX_RETRIES_PER_KIND),
                got: f64::from(self.max_retries_per_kind),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub operation: Operation,
    pub attempts: u32,
    pub retry_actions: Vec<RetryAction>,
    pub output: Option<PathBuf>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub steps: Vec<StepRecord>,
    pub final_file: Option<PathBuf>,
    pub summary: String,
    pub failure: Option<String>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    fn failed(steps: Vec<StepRecord>, failure: String) -> Self {
        Self {
            steps,
            final_file: None,
            summary: failure.clone(),
            failure: Some(failure),
        }
    }
}

/// Runs a resolved pipeline one step at a time, each step reading the previous step's
/// output. Synchronous.
#[derive(Debug, Clone)]
pub struct PipelineRunner<T>
where
    T: FileTransform,
{
    config: PipelineRunnerConfig,
    guards: GuardEngine,
    transform: T,
}

impl<T> PipelineRunner<T>
where
    T: FileTransform,
{
    pub fn new(config: PipelineRunnerConfig, transform: T) -> Result<Self, ContractViolation> {
        config.validate()?;
        Ok(Self {
            config,
            guards: GuardEngine::new(),
            transform,
        })
    }

    /// `input_size_mb` turns a percentage target into an absolute one.
    pub fn run(
        &self,
        resolution: &ResolutionResult,
        input: &Path,
        input_size_mb: f64,
    ) -> Result<PipelineReport, ContractViolation> {
        resolution.validate()?;
        if !resolution.success {
            return Ok(PipelineReport::failed(
                vec![],
                "Nothing to run: the command needs a user choice".to_string(),
            ));
        }
        if resolution.is_noop() {
            let summary = resolution
                .guard_result
                .as_ref()
                .and_then(|g| g.user_message.clone())
                .unwrap_or_else(|| "Nothing to do".to_string());
            return Ok(PipelineReport {
                steps: vec![],
                final_file: Some(input.to_path_buf()),
                summary,
                failure: None,
            });
        }

        let target_size_mb = self.target_size_mb(resolution, input_size_mb);
        let mut current = input.to_path_buf();
        let mut current_type = resolution.source_type;
        let mut steps = Vec::with_capacity(resolution.pipeline.len());
        // One retry per failure kind for the whole request, not per step.
        let mut error_retries = 0u32;
        let mut size_retries = 0u32;

        for (i, op) in resolution.pipeline.iter().copied().enumerate() {
            let mut step = TransformStep {
                index: i + 1,
                operation: op,
                input: current.clone(),
                input_type: current_type,
                target_format: resolution.targets.target_format,
                target_size_mb: if op == Operation::Compress {
                    target_size_mb
                } else {
                    None
                },
                retry_actions: vec![],
            };
            let mut attempts = 0u32;

            let (out, note) = loop {
                attempts += 1;
                info!(step = step.index, operation = op.as_str(), attempts, "running step");
                match self.transform.apply(&step) {
                    Ok(out) => {
                        let Some(target) = step.target_size_mb else {
                            break (out, None);
                        };
                        let (retry, action) = self.guards.should_retry_on_size_miss(
                            out.size_mb,
                            target,
                            size_retries,
                        );
                        if retry && size_retries < self.config.max_retries_per_kind {
                            warn!(
                                step = step.index,
                                achieved_mb = out.size_mb,
                                target,
                                "size target missed"
                            );
                            size_retries += 1;
                            step.grant(action);
                            continue;
                        }
                        // Retries are spent or disabled here; ask for the final wording.
                        let check = self.guards.validate_size_target(
                            out.size_mb,
                            target,
                            size_retries.max(1),
                        )?;
                        break (out, check.user_message);
                    }
                    Err(e) => {
                        let message = e.to_string();
                        let (retry, action) =
                            self.guards.should_retry_on_error(&message, error_retries);
                        if retry && error_retries < self.config.max_retries_per_kind {
                            warn!(step = step.index, error = %message, "step failed, retrying");
                            error_retries += 1;
                            step.grant(action);
                            continue;
                        }
                        let terminal = self
                            .guards
                            .validate_error_for_retry(&message, error_retries.max(1))?;
                        let failure = format!(
                            "Operation {} ({}) failed: {message}",
                            step.index,
                            op.as_str()
                        );
                        warn!(step = step.index, error = %message, "pipeline stopped");
                        steps.push(StepRecord {
                            index: step.index,
                            operation: op,
                            attempts,
                            retry_actions: step.retry_actions,
                            output: None,
                            message: terminal
                                .user_message
                                .unwrap_or_else(|| failure.clone()),
                        });
                        return Ok(PipelineReport::failed(steps, failure));
                    }
                }
            };

            let message = match note {
                Some(note) => format!("{} ({note})", op.display_name()),
                None => op.display_name().to_string(),
            };
            steps.push(StepRecord {
                index: step.index,
                operation: op,
                attempts,
                retry_actions: step.retry_actions,
                output: Some(out.path.clone()),
                message,
            });
            current = out.path;
            current_type = out.output_type;
        }

        let summary = if steps.is_empty() {
            "Processing completed".to_string()
        } else {
            steps
                .iter()
                .map(|s| s.message.as_str())
                .collect::<Vec<_>>()
                .join(" → ")
        };
        Ok(PipelineReport {
            steps,
            final_file: Some(current),
            summary,
            failure: None,
        })
    }

    /// Explicit size, else a percentage of the input, else the purpose ceiling.
    fn target_size_mb(&self, resolution: &ResolutionResult, input_size_mb: f64) -> Option<f64> {
        if let Some(size) = resolution.targets.target_size_mb {
            return Some(size);
        }
        if let Some(pct) = resolution.targets.target_percent {
            match pct.target_size_mb(input_size_mb) {
                Ok(size) => return Some(size),
                Err(e) => warn!(error = %e, "percentage target ignored"),
            }
        }
        resolution.effective_target_size_mb()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_engines::ResolverRuntime;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    #[derive(Debug, Default)]
    struct StubTransform {
        script: RefCell<VecDeque<Result<TransformOutput, TransformError>>>,
        calls: RefCell<Vec<TransformStep>>,
    }

    impl StubTransform {
        fn scripted(script: Vec<Result<TransformOutput, TransformError>>) -> Self {
            Self {
                script: RefCell::new(script.into()),
                calls: RefCell::new(vec![]),
            }
        }
    }

    impl FileTransform for StubTransform {
        fn apply(&self, step: &TransformStep) -> Result<TransformOutput, TransformError> {
            self.calls.borrow_mut().push(step.clone());
            self.script
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(TransformError::Failed("script exhausted".to_string())))
        }
    }

    fn out(path: &str, size_mb: f64) -> Result<TransformOutput, TransformError> {
        Ok(TransformOutput {
            path: PathBuf::from(path),
            output_type: SourceType::Pdf,
            size_mb,
        })
    }

    fn runner(script: Vec<Result<TransformOutput, TransformError>>) -> PipelineRunner<StubTransform> {
        PipelineRunner::new(PipelineRunnerConfig::mvp_v1(), StubTransform::scripted(script)).unwrap()
    }

    fn resolved(input: &str) -> ResolutionResult {
        let r = ResolverRuntime::default().resolve(input, SourceType::Pdf);
        assert!(r.success, "{input} did not resolve");
        r
    }

    #[test]
    fn at_runner_01_steps_chain_outputs() {
        let r = runner(vec![out("step_1.pdf", 4.0), out("step_2.pdf", 3.0)]);
        let report = r
            .run(&resolved("split -> rotate"), Path::new("in.pdf"), 5.0)
            .unwrap();
        assert!(report.succeeded());
        assert_eq!(report.final_file, Some(PathBuf::from("step_2.pdf")));
        assert_eq!(report.summary, "split → rotate");
        let calls = r.transform.calls.borrow();
        assert_eq!(calls[0].input, PathBuf::from("in.pdf"));
        assert_eq!(calls[1].input, PathBuf::from("step_1.pdf"));
        assert_eq!(calls[1].index, 2);
    }

    #[test]
    fn at_runner_02_encoding_error_retries_once_with_ocr() {
        let r = runner(vec![
            Err(TransformError::Failed(
                "All strings must be XML compatible".to_string(),
            )),
            out("fixed.pdf", 1.0),
        ]);
        let report = r.run(&resolved("flatten"), Path::new("in.pdf"), 2.0).unwrap();
        assert!(report.succeeded());
        assert_eq!(report.steps[0].attempts, 2);
        assert_eq!(report.steps[0].retry_actions, vec![RetryAction::OcrFallback]);
        assert!(r.transform.calls.borrow()[1].has_retry_action(RetryAction::OcrFallback));
        assert!(r.transform.calls.borrow()[0].retry_actions.is_empty());
    }

    #[test]
    fn at_runner_03_second_encoding_error_is_terminal() {
        let err = || Err(TransformError::Failed("unicode decode error".to_string()));
        let r = runner(vec![err(), err(), out("never.pdf", 1.0)]);
        let report = r.run(&resolved("flatten"), Path::new("in.pdf"), 2.0).unwrap();
        assert!(!report.succeeded());
        assert_eq!(r.transform.calls.borrow().len(), 2);
        assert_eq!(
            report.failure.as_deref(),
            Some("Operation 1 (flatten) failed: unicode decode error")
        );
        assert_eq!(
            report.steps[0].message,
            "Processing failed - please try a different approach"
        );
    }

    #[test]
    fn at_runner_04_other_errors_never_retry() {
        let r = runner(vec![
            Err(TransformError::Unsupported(Operation::Rotate)),
            out("never.pdf", 1.0),
        ]);
        let report = r.run(&resolved("rotate"), Path::new("in.pdf"), 2.0).unwrap();
        assert!(!report.succeeded());
        assert_eq!(r.transform.calls.borrow().len(), 1);
    }

    #[test]
    fn at_runner_05_size_miss_retries_once_then_best_effort() {
        let r = runner(vec![out("a.pdf", 5.0), out("b.pdf", 3.0), out("c.pdf", 1.0)]);
        let report = r
            .run(&resolved("compress to 2mb"), Path::new("in.pdf"), 8.0)
            .unwrap();
        assert!(report.succeeded());
        assert_eq!(r.transform.calls.borrow().len(), 2);
        assert_eq!(
            r.transform.calls.borrow()[1].retry_actions,
            vec![RetryAction::StrongerPreset]
        );
        assert_eq!(r.transform.calls.borrow()[1].input, PathBuf::from("in.pdf"));
        assert_eq!(report.final_file, Some(PathBuf::from("b.pdf")));
        assert_eq!(
            report.summary,
            "compress (Best compression achieved: 3.0MB (target was 2.0MB))"
        );
    }

    #[test]
    fn at_runner_06_percent_target_uses_input_size() {
        let r = runner(vec![out("a.pdf", 4.0)]);
        let report = r
            .run(&resolved("compress by 50%"), Path::new("in.pdf"), 10.0)
            .unwrap();
        assert!(report.succeeded());
        assert_eq!(r.transform.calls.borrow()[0].target_size_mb, Some(5.0));
        assert_eq!(report.summary, "compress (Target size achieved: 4.0MB)");
    }

    #[test]
    fn at_runner_07_user_choice_and_noop_do_not_touch_files() {
        let r = runner(vec![]);
        let choice = ResolverRuntime::default().resolve("hmm", SourceType::Pdf);
        let report = r.run(&choice, Path::new("in.pdf"), 1.0).unwrap();
        assert!(!report.succeeded());

        let noop = resolved("convert to pdf");
        let report = r.run(&noop, Path::new("in.pdf"), 1.0).unwrap();
        assert!(report.succeeded());
        assert_eq!(report.final_file, Some(PathBuf::from("in.pdf")));
        assert_eq!(report.summary, "File is already in PDF format");
        assert!(r.transform.calls.borrow().is_empty());
    }

    #[test]
    fn at_runner_08_retry_ceiling_enforced_by_config() {
        let bad = PipelineRunnerConfig {
            max_retries_per_kind: 2,
        };
        assert!(PipelineRunner::new(bad, StubTransform::default()).is_err());

        let no_retry = PipelineRunner::new(
            PipelineRunnerConfig {
                max_retries_per_kind: 0,
            },
            StubTransform::scripted(vec![Err(TransformError::Failed(
                "encoding error".to_string(),
            ))]),
        )
        .unwrap();
        let report = no_retry
            .run(&resolved("flatten"), Path::new("in.pdf"), 1.0)
            .unwrap();
        assert!(!report.succeeded());
        assert_eq!(no_retry.transform.calls.borrow().len(), 1);
    }

    #[test]
    fn at_runner_09_encoding_retry_is_spent_once_per_request() {
        let err = || Err(TransformError::Failed("unicode error".to_string()));
        let r = runner(vec![
            err(),
            out("step_1.pdf", 1.0),
            err(),
            out("never.pdf", 1.0),
        ]);
        let report = r
            .run(&resolved("flatten -> rotate -> watermark"), Path::new("in.pdf"), 2.0)
            .unwrap();
        assert!(!report.succeeded());
        assert_eq!(r.transform.calls.borrow().len(), 3);
        assert_eq!(
            report.failure.as_deref(),
            Some("Operation 2 (rotate) failed: unicode error")
        );
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.steps[1].attempts, 1);
        assert!(report.steps[1].retry_actions.is_empty());
    }

    #[test]
    fn at_runner_10_stronger_preset_survives_a_later_ocr_retry() {
        let r = runner(vec![
            out("a.pdf", 5.0),
            Err(TransformError::Failed("encoding error".to_string())),
            out("b.pdf", 1.5),
        ]);
        let report = r
            .run(&resolved("compress to 2mb"), Path::new("in.pdf"), 8.0)
            .unwrap();
        assert!(report.succeeded());
        let calls = r.transform.calls.borrow();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[2].retry_actions,
            vec![RetryAction::StrongerPreset, RetryAction::OcrFallback]
        );
        assert_eq!(report.final_file, Some(PathBuf::from("b.pdf")));
        assert_eq!(report.steps[0].retry_actions, calls[2].retry_actions);
    }
}
