#![forbid(unsafe_code)]

use docflow_kernel_contracts::command::{Operation, ParsedCommand, SourceType};
use docflow_kernel_contracts::resolution::MAX_USER_OPTIONS;

const PDF_OPTIONS: &[&str] = &[
    "Compress PDF",
    "Convert to DOCX",
    "OCR (extract text)",
    "Split pages",
    "Merge with other PDFs",
    "Add watermark",
    "Add page numbers",
];
const DOCX_OPTIONS: &[&str] = &[
    "Convert to PDF",
    "Compress",
    "Add watermark",
    "Add page numbers",
];
const DOC_OPTIONS: &[&str] = &["Convert to PDF", "Compress", "Add watermark"];
const IMAGE_OPTIONS: &[&str] = &[
    "Convert to PDF",
    "Compress image",
    "Enhance quality",
    "Merge into PDF",
    "Rotate image",
];

pub fn base_options(source_type: SourceType) -> &'static [&'static str] {
    match source_type {
        SourceType::Pdf => PDF_OPTIONS,
        SourceType::Docx => DOCX_OPTIONS,
        SourceType::Doc => DOC_OPTIONS,
        SourceType::Jpg | SourceType::Jpeg | SourceType::Png | SourceType::Img => IMAGE_OPTIONS,
    }
}

/// Ranked actions offered when resolution cannot pick a pipeline.
#[derive(Debug, Clone, Copy)]
pub struct OptionGenerator {
    max_options: usize,
}

impl Default for OptionGenerator {
    fn default() -> Self {
        Self::new(MAX_USER_OPTIONS)
    }
}

impl OptionGenerator {
    pub fn new(max_options: usize) -> Self {
        Self {
            max_options: max_options.clamp(1, MAX_USER_OPTIONS),
        }
    }

    pub fn for_command(&self, source_type: SourceType, parsed: &ParsedCommand) -> Vec<String> {
        self.generate(source_type, &parsed.operations)
    }

    /// Options whose label names a mentioned operation move to the front, in mention
    /// order; the rest keep their base order.
    pub fn generate(&self, source_type: SourceType, mentioned: &[Operation]) -> Vec<String> {
        let mut remaining: Vec<&str> = base_options(source_type).to_vec();
        let mut ranked: Vec<&str> = Vec::with_capacity(remaining.len());
        for op in mentioned {
            let needle = op.display_name();
            while let Some(idx) = remaining
                .iter()
                .position(|label| label.to_lowercase().contains(needle))
            {
                ranked.push(remaining.remove(idx));
            }
        }
        ranked.extend(remaining);
        ranked.truncate(self.max_options);
        ranked.into_iter().map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_options_01_base_order_truncated_to_five() {
        let opts = OptionGenerator::default().generate(SourceType::Pdf, &[]);
        assert_eq!(
            opts,
            vec![
                "Compress PDF",
                "Convert to DOCX",
                "OCR (extract text)",
                "Split pages",
                "Merge with other PDFs",
            ]
        );
    }

    #[test]
    fn at_options_02_mentioned_operations_promoted_in_order() {
        let opts = OptionGenerator::default().generate(
            SourceType::Pdf,
            &[Operation::PageNumbers, Operation::Watermark],
        );
        assert_eq!(opts[0], "Add page numbers");
        assert_eq!(opts[1], "Add watermark");
        assert_eq!(opts[2], "Compress PDF");
        assert_eq!(opts.len(), 5);
    }

    #[test]
    fn at_options_03_unknown_mentions_leave_order_alone() {
        let opts = OptionGenerator::default().generate(SourceType::Docx, &[Operation::Ocr]);
        assert_eq!(opts, DOCX_OPTIONS.to_vec());
    }

    #[test]
    fn at_options_04_limit_is_clamped() {
        assert_eq!(OptionGenerator::new(0).generate(SourceType::Png, &[]).len(), 1);
        assert_eq!(OptionGenerator::new(50).generate(SourceType::Pdf, &[]).len(), 5);
        assert_eq!(OptionGenerator::new(2).generate(SourceType::Doc, &[]).len(), 2);
    }
}
