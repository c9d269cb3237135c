#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{require_finite, require_range};
use crate::{ContractViolation, SchemaVersion, Validate};

pub const COMMAND_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Input file kind, detected from the filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Docx,
    Doc,
    Jpg,
    Jpeg,
    Png,
    /// Generic image, used when the caller knows "an image" but not the encoding.
    Img,
}

impl SourceType {
    pub const ALL: [SourceType; 7] = [
        SourceType::Pdf,
        SourceType::Docx,
        SourceType::Doc,
        SourceType::Jpg,
        SourceType::Jpeg,
        SourceType::Png,
        SourceType::Img,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Pdf => "pdf",
            SourceType::Docx => "docx",
            SourceType::Doc => "doc",
            SourceType::Jpg => "jpg",
            SourceType::Jpeg => "jpeg",
            SourceType::Png => "png",
            SourceType::Img => "img",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(raw))
    }

    /// Extension lookup. Unknown or missing extensions fall back to `Pdf`.
    pub fn from_filename(filename: &str) -> Self {
        filename
            .trim()
            .rsplit_once('.')
            .and_then(|(_, ext)| Self::parse(ext))
            .unwrap_or(SourceType::Pdf)
    }
}

/// Canonical operations. Declaration order is the keyword-table order used for
/// first-match-wins extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Merge,
    Split,
    Compress,
    Convert,
    Ocr,
    Clean,
    Enhance,
    Rotate,
    Reorder,
    Flatten,
    Watermark,
    PageNumbers,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::Merge,
        Operation::Split,
        Operation::Compress,
        Operation::Convert,
        Operation::Ocr,
        Operation::Clean,
        Operation::Enhance,
        Operation::Rotate,
        Operation::Reorder,
        Operation::Flatten,
        Operation::Watermark,
        Operation::PageNumbers,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Merge => "merge",
            Operation::Split => "split",
            Operation::Compress => "compress",
            Operation::Convert => "convert",
            Operation::Ocr => "ocr",
            Operation::Clean => "clean",
            Operation::Enhance => "enhance",
            Operation::Rotate => "rotate",
            Operation::Reorder => "reorder",
            Operation::Flatten => "flatten",
            Operation::Watermark => "watermark",
            Operation::PageNumbers => "page-numbers",
        }
    }

    /// Human-facing name, matched case-insensitively against suggestion labels.
    pub fn display_name(self) -> &'static str {
        match self {
            Operation::PageNumbers => "page numbers",
            other => other.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        let raw = raw.replace(['_', ' '], "-");
        Self::ALL.into_iter().find(|op| op.as_str() == raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Email,
    Whatsapp,
    Print,
    Web,
    Share,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PurposePreset {
    pub max_size_mb: f64,
    pub quality: Quality,
    pub dpi: u16,
}

impl Purpose {
    pub const ALL: [Purpose; 5] = [
        Purpose::Email,
        Purpose::Whatsapp,
        Purpose::Print,
        Purpose::Web,
        Purpose::Share,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Email => "email",
            Purpose::Whatsapp => "whatsapp",
            Purpose::Print => "print",
            Purpose::Web => "web",
            Purpose::Share => "share",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(raw))
    }

    pub fn preset(self) -> PurposePreset {
        match self {
            Purpose::Email => PurposePreset {
                max_size_mb: 10.0,
                quality: Quality::Medium,
                dpi: 150,
            },
            Purpose::Whatsapp => PurposePreset {
                max_size_mb: 16.0,
                quality: Quality::Medium,
                dpi: 150,
            },
            Purpose::Print => PurposePreset {
                max_size_mb: 50.0,
                quality: Quality::High,
                dpi: 300,
            },
            Purpose::Web => PurposePreset {
                max_size_mb: 5.0,
                quality: Quality::Low,
                dpi: 72,
            },
            Purpose::Share => PurposePreset {
                max_size_mb: 25.0,
                quality: Quality::Medium,
                dpi: 150,
            },
        }
    }
}

/// Relative size goal ("compress by 50%", "shrink to 30%"). Needs the current file
/// size before it becomes an absolute target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "percent", rename_all = "snake_case")]
pub enum PercentTarget {
    ReduceBy(u8),
    ReduceTo(u8),
}

pub const MIN_PERCENT_TARGET_MB: f64 = 0.1;

impl PercentTarget {
    pub fn percent(self) -> u8 {
        match self {
            PercentTarget::ReduceBy(p) | PercentTarget::ReduceTo(p) => p,
        }
    }

    pub fn target_size_mb(self, current_mb: f64) -> Result<f64, ContractViolation> {
        require_finite("percent_target.current_mb", current_mb)?;
        if current_mb <= 0.0 {
            return Err(ContractViolation::InvalidValue {
                field: "percent_target.current_mb",
                reason: "must be > 0",
            });
        }
        self.validate()?;
        let keep_pct = match self {
            PercentTarget::ReduceBy(p) => 100 - u32::from(p),
            PercentTarget::ReduceTo(p) => u32::from(p),
        };
        Ok((current_mb * f64::from(keep_pct) / 100.0).max(MIN_PERCENT_TARGET_MB))
    }
}

impl Validate for PercentTarget {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !(1..=99).contains(&self.percent()) {
            return Err(ContractViolation::InvalidValue {
                field: "percent_target.percent",
                reason: "must be within 1..=99",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub schema_version: SchemaVersion,
    pub original_input: String,
    pub normalized_input: String,
    /// Detection order. May contain duplicates; guards dedupe.
    pub operations: Vec<Operation>,
    pub target_format: Option<SourceType>,
    pub target_size_mb: Option<f64>,
    pub target_percent: Option<PercentTarget>,
    pub purpose: Option<Purpose>,
    pub confidence: f64,
    /// True when the user sequenced stages explicitly (arrow or "then").
    pub explicit_sequence: bool,
}

pub const MAX_PARSED_OPERATIONS: usize = 64;

impl ParsedCommand {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        original_input: String,
        normalized_input: String,
        operations: Vec<Operation>,
        target_format: Option<SourceType>,
        target_size_mb: Option<f64>,
        target_percent: Option<PercentTarget>,
        purpose: Option<Purpose>,
        confidence: f64,
        explicit_sequence: bool,
    ) -> Result<Self, ContractViolation> {
        let c = Self {
            schema_version: COMMAND_CONTRACT_VERSION,
            original_input,
            normalized_input,
            operations,
            target_format,
            target_size_mb,
            target_percent,
            purpose,
            confidence,
            explicit_sequence,
        };
        c.validate()?;
        Ok(c)
    }
}

impl Validate for ParsedCommand {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != COMMAND_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "parsed_command.schema_version",
                reason: "must match COMMAND_CONTRACT_VERSION",
            });
        }
        if self.operations.len() > MAX_PARSED_OPERATIONS {
            return Err(ContractViolation::InvalidValue {
                field: "parsed_command.operations",
                reason: "must be <= 64 entries",
            });
        }
        require_range("parsed_command.confidence", self.confidence, 0.0, 1.0)?;
        if let Some(size) = self.target_size_mb {
            validate_target_size("parsed_command.target_size_mb", size)?;
        }
        if let Some(p) = &self.target_percent {
            p.validate()?;
        }
        Ok(())
    }
}

pub(crate) fn validate_target_size(field: &'static str, size: f64) -> Result<(), ContractViolation> {
    require_finite(field, size)?;
    if size <= 0.0 {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be > 0",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_falls_back_to_pdf_for_unknown_extension() {
        assert_eq!(SourceType::from_filename("scan.JPEG"), SourceType::Jpeg);
        assert_eq!(SourceType::from_filename("report.docx"), SourceType::Docx);
        assert_eq!(SourceType::from_filename("notes.doc"), SourceType::Doc);
        assert_eq!(SourceType::from_filename("archive.zip"), SourceType::Pdf);
        assert_eq!(SourceType::from_filename("no_extension"), SourceType::Pdf);
        assert_eq!(SourceType::from_filename(""), SourceType::Pdf);
    }

    #[test]
    fn operation_parse_accepts_wire_and_display_forms() {
        assert_eq!(Operation::parse("page-numbers"), Some(Operation::PageNumbers));
        assert_eq!(Operation::parse("Page Numbers"), Some(Operation::PageNumbers));
        assert_eq!(Operation::parse("page_numbers"), Some(Operation::PageNumbers));
        assert_eq!(Operation::parse("OCR"), Some(Operation::Ocr));
        assert_eq!(Operation::parse("staple"), None);
    }

    #[test]
    fn operation_serializes_kebab_case() {
        let json = serde_json::to_string(&vec![Operation::PageNumbers, Operation::Ocr]).unwrap();
        assert_eq!(json, r#"["page-numbers","ocr"]"#);
    }

    #[test]
    fn percent_target_converts_against_current_size() {
        let by = PercentTarget::ReduceBy(75).target_size_mb(8.0).unwrap();
        assert!((by - 2.0).abs() < 1e-9);
        let to = PercentTarget::ReduceTo(25).target_size_mb(8.0).unwrap();
        assert!((to - 2.0).abs() < 1e-9);
        let floor = PercentTarget::ReduceBy(99).target_size_mb(1.0).unwrap();
        assert!((floor - MIN_PERCENT_TARGET_MB).abs() < 1e-9);
        assert!(PercentTarget::ReduceBy(0).target_size_mb(4.0).is_err());
        assert!(PercentTarget::ReduceTo(50).target_size_mb(f64::NAN).is_err());
    }

    #[test]
    fn parsed_command_rejects_out_of_range_confidence_and_size() {
        let bad_conf = ParsedCommand::v1(
            "x".to_string(),
            "x".to_string(),
            vec![],
            None,
            None,
            None,
            None,
            1.5,
            false,
        );
        assert!(bad_conf.is_err());

        let bad_size = ParsedCommand::v1(
            "x".to_string(),
            "x".to_string(),
            vec![Operation::Compress],
            None,
            Some(0.0),
            None,
            None,
            0.8,
            false,
        );
        assert!(bad_size.is_err());
    }

    #[test]
    fn purpose_presets_are_a_fixed_table() {
        let print = Purpose::Print.preset();
        assert_eq!(print.dpi, 300);
        assert_eq!(print.quality, Quality::High);
        assert_eq!(Purpose::Web.preset().max_size_mb, 5.0);
        assert_eq!(Purpose::parse("WhatsApp"), Some(Purpose::Whatsapp));
    }
}
