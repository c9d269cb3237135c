#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docflow_engines::{purpose_presets_for_name, Normalizer};
use docflow_kernel_contracts::command::{Operation, Purpose, SourceType};
use docflow_os::resolve_wiring::{NoEscalator, ResolveWiring, ResolveWiringOutcome};
use serde_json::{json, Value};

use crate::config::ToolConfig;

#[derive(Debug, Parser)]
#[command(name = "docflow")]
#[command(version)]
#[command(about = "Resolve free-text file commands into validated operation pipelines")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON config file. Falls back to $DOCFLOW_CONFIG.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Single-line JSON output
    #[arg(long, global = true)]
    pub compact: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve a command against a file type
    Resolve {
        input: String,

        #[arg(long, short = 't', value_parser = parse_source_type, conflicts_with = "file")]
        source: Option<SourceType>,

        /// Detect the file type from this name's extension
        #[arg(long, short)]
        file: Option<String>,
    },

    /// Run the guards over an already-parsed pipeline
    Validate {
        #[arg(required = true, value_delimiter = ',', value_parser = parse_operation)]
        operations: Vec<Operation>,

        #[arg(long, short = 't', value_parser = parse_source_type, default_value = "pdf")]
        source: SourceType,

        #[arg(long, value_parser = parse_source_type)]
        target: Option<SourceType>,

        #[arg(long)]
        target_size_mb: Option<f64>,
    },

    /// Garbage analysis and escalation decision for one input
    Classify { input: String },

    /// Should a failed step be retried?
    RetryError {
        message: String,

        #[arg(long, default_value_t = 0)]
        retry_count: u32,
    },

    /// Should a compress step that missed its size target be retried?
    RetrySize {
        achieved_mb: f64,
        target_mb: f64,

        #[arg(long, default_value_t = 0)]
        retry_count: u32,
    },

    /// Purpose preset table, or one entry
    Presets { purpose: Option<String> },
}

fn parse_source_type(raw: &str) -> Result<SourceType, String> {
    SourceType::parse(raw).ok_or_else(|| {
        let allowed = SourceType::ALL.map(SourceType::as_str).join(", ");
        format!("unknown file type '{raw}'. allowed: {allowed}")
    })
}

fn parse_operation(raw: &str) -> Result<Operation, String> {
    Operation::parse(raw).ok_or_else(|| {
        let allowed = Operation::ALL.map(Operation::as_str).join(", ");
        format!("unknown operation '{raw}'. allowed: {allowed}")
    })
}

pub fn execute_command(config: &ToolConfig, command: &Commands) -> anyhow::Result<Value> {
    let runtime = config.runtime();
    match command {
        Commands::Resolve {
            input,
            source,
            file,
        } => {
            let source_type = match (source, file) {
                (Some(s), _) => *s,
                (None, Some(f)) => SourceType::from_filename(f),
                (None, None) => SourceType::Pdf,
            };
            let wiring = ResolveWiring::new(config.wiring, runtime, NoEscalator)
                .context("invalid wiring config")?;
            let out = match wiring.run(input, source_type)? {
                ResolveWiringOutcome::Local(result) => json!({
                    "outcome": "local",
                    "result": result,
                }),
                ResolveWiringOutcome::Escalated {
                    rephrased,
                    attempts,
                    result,
                } => json!({
                    "outcome": "escalated",
                    "rephrased": rephrased,
                    "attempts": attempts,
                    "result": result,
                }),
                ResolveWiringOutcome::GarbagePrompt { prompt, result } => json!({
                    "outcome": "garbage_prompt",
                    "prompt": prompt,
                    "result": result,
                }),
            };
            Ok(out)
        }
        Commands::Validate {
            operations,
            source,
            target,
            target_size_mb,
        } => {
            let result = runtime
                .guards()
                .validate(operations, *source, *target, *target_size_mb)?;
            Ok(serde_json::to_value(result)?)
        }
        Commands::Classify { input } => {
            let normalized = Normalizer::new().normalize(input);
            let classifier = runtime.classifier();
            Ok(json!({
                "normalized": normalized,
                "analysis": classifier.classify(&normalized),
                "escalation": classifier.decide_escalation(&normalized),
            }))
        }
        Commands::RetryError {
            message,
            retry_count,
        } => {
            let guards = runtime.guards();
            let (should_retry, retry_action) = guards.should_retry_on_error(message, *retry_count);
            Ok(json!({
                "should_retry": should_retry,
                "retry_action": retry_action,
                "result": guards.validate_error_for_retry(message, *retry_count)?,
            }))
        }
        Commands::RetrySize {
            achieved_mb,
            target_mb,
            retry_count,
        } => {
            let guards = runtime.guards();
            let (should_retry, retry_action) =
                guards.should_retry_on_size_miss(*achieved_mb, *target_mb, *retry_count);
            Ok(json!({
                "should_retry": should_retry,
                "retry_action": retry_action,
                "result": guards.validate_size_target(*achieved_mb, *target_mb, *retry_count)?,
            }))
        }
        Commands::Presets { purpose } => match purpose {
            Some(name) => Ok(json!({
                "purpose": name,
                "known": Purpose::parse(name).is_some(),
                "preset": purpose_presets_for_name(name),
            })),
            None => {
                let table: serde_json::Map<String, Value> = Purpose::ALL
                    .iter()
                    .map(|p| {
                        serde_json::to_value(p.preset()).map(|v| (p.as_str().to_string(), v))
                    })
                    .collect::<Result<_, _>>()?;
                Ok(Value::Object(table))
            }
        },
    }
}

pub fn render(value: &Value, compact: bool) -> anyhow::Result<String> {
    let out = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn run(args: &[&str]) -> Value {
        let cli = Cli::try_parse_from(std::iter::once("docflow").chain(args.iter().copied()))
            .unwrap();
        execute_command(&ToolConfig::default(), &cli.command).unwrap()
    }

    #[test]
    fn at_cli_01_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn at_cli_02_resolve_uses_file_extension() {
        let v = run(&["resolve", "plz compres this", "--file", "photo.PNG"]);
        assert_eq!(v["outcome"], "local");
        assert_eq!(v["result"]["source_type"], "png");
        assert_eq!(v["result"]["pipeline"], json!(["compress"]));
        assert_eq!(v["result"]["success"], true);
    }

    #[test]
    fn at_cli_03_garbage_without_escalator_prompts() {
        let v = run(&["resolve", "xk2!!!@@##", "-t", "pdf"]);
        assert_eq!(v["outcome"], "garbage_prompt");
        assert_eq!(v["prompt"]["options"].as_array().map(Vec::len), Some(5));
    }

    #[test]
    fn at_cli_04_validate_reports_incompatible() {
        let v = run(&["validate", "ocr", "-t", "docx"]);
        assert_eq!(v["status"], "incompatible");
        assert_eq!(v["is_valid"], false);

        let v = run(&["validate", "compress,compress,convert", "--target", "pdf"]);
        assert_eq!(v["adjusted_pipeline"], json!(["compress"]));
    }

    #[test]
    fn at_cli_05_retry_commands() {
        let v = run(&["retry-size", "12", "10"]);
        assert_eq!(v["should_retry"], true);
        assert_eq!(v["retry_action"], "stronger_preset");

        let v = run(&["retry-error", "XML compatible", "--retry-count", "1"]);
        assert_eq!(v["should_retry"], false);
        assert_eq!(v["retry_action"], Value::Null);
    }

    #[test]
    fn at_cli_06_presets_and_classify() {
        let v = run(&["presets", "carrier-pigeon"]);
        assert_eq!(v["known"], false);
        assert_eq!(v["preset"]["max_size_mb"], 10.0);
        let all = run(&["presets"]);
        assert_eq!(all["web"]["dpi"], 72);

        let v = run(&["classify", "plz compres this"]);
        assert_eq!(v["normalized"], "compress this");
        assert_eq!(v["analysis"]["is_garbage"], false);
    }

    #[test]
    fn at_cli_07_bad_arguments_rejected() {
        assert!(Cli::try_parse_from(["docflow", "validate", "teleport"]).is_err());
        assert!(Cli::try_parse_from(["docflow", "resolve", "x", "-t", "pdf", "-f", "a.doc"]).is_err());
        assert!(Cli::try_parse_from(["docflow", "resolve", "x", "-t", "tiff"]).is_err());
    }
}
