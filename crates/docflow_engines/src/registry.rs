#![forbid(unsafe_code)]

//! Process-wide pattern tables. Built once on first use, read-only afterwards, shared
//! by the normalizer, the garbage classifier and the guard engine.

use std::sync::LazyLock;

use docflow_kernel_contracts::command::{Operation, Purpose, SourceType};
use docflow_kernel_contracts::SchemaVersion;
use regex::Regex;

pub const REGISTRY_VERSION: SchemaVersion = SchemaVersion(1);

/// Canonical pipeline delimiter glyph.
pub const DELIMITER: &str = "→";
/// Delimiter as it appears in normalized text.
pub const DELIMITER_TOKEN: &str = " → ";

const OPERATION_KEYWORDS: [(Operation, &str); 12] = [
    (Operation::Merge, r"\b(?:merge|combine|join)\b"),
    (Operation::Split, r"\b(?:split|separate|divide)\b"),
    (
        Operation::Compress,
        r"\b(?:compress|reduce|shrink|smaller|tiny|make\s+(?:it\s+)?small)\b",
    ),
    (
        Operation::Convert,
        r"\b(?:convert|change\s+to|transform|export|turn\s+into|save\s+as)\b",
    ),
    (Operation::Ocr, r"\b(?:ocr|searchable|extract\s+text)\b"),
    (
        Operation::Clean,
        r"\b(?:clean|remove\s+blank|remove\s+duplicate)\b",
    ),
    (Operation::Enhance, r"\b(?:enhance|improve|better|sharpen)\b"),
    (
        Operation::Rotate,
        r"\b(?:rotate|flip|turn\s+(?:left|right|around|sideways))\b",
    ),
    (
        Operation::Reorder,
        r"\b(?:reorder|rearrange|reorganize|reverse\s+(?:the\s+)?(?:page\s+)?order)\b",
    ),
    (Operation::Flatten, r"\bflatten\b"),
    (Operation::Watermark, r"\b(?:watermark|stamp)\b"),
    (
        Operation::PageNumbers,
        r"\b(?:page[-\s]?numbers?|add\s+numbers?|number\s+(?:the\s+)?pages)\b",
    ),
];

/// Misspelling -> canonical token. No value may itself be a key.
pub const TYPO_FIXES: &[(&str, &str)] = &[
    ("compres", "compress"),
    ("comprs", "compress"),
    ("comress", "compress"),
    ("compresss", "compress"),
    ("mrge", "merge"),
    ("merg", "merge"),
    ("splt", "split"),
    ("spill", "split"),
    ("spilt", "split"),
    ("splitt", "split"),
    ("convrt", "convert"),
    ("cnvrt", "convert"),
    ("rotat", "rotate"),
    ("rotae", "rotate"),
    ("roate", "rotate"),
    ("enhace", "enhance"),
    ("enhanc", "enhance"),
    ("watermrk", "watermark"),
    ("watermak", "watermark"),
    ("reordr", "reorder"),
    ("flaten", "flatten"),
    ("adn", "and"),
    ("thn", "then"),
    ("thne", "then"),
    ("dox", "docx"),
    ("pfd", "pdf"),
    ("pff", "pdf"),
    ("imag", "image"),
    ("imge", "image"),
    ("jgp", "jpg"),
    ("jepg", "jpeg"),
    ("jpge", "jpeg"),
    ("pngg", "png"),
];

/// Conversational lead-ins. Only phrases with no intent of their own belong here.
const NOISE_PREFIXES: &[&str] = &[
    r"^and\s+",
    r"^pls\s+",
    r"^plz\s+",
    r"^please\s+",
    r"^kindly\s+",
    r"^do\s+it\s+",
    r"^then\s+",
    r"^now\s+",
    r"^just\s+",
    r"^hey\s+",
    r"^ok(?:ay)?\s+",
    r"^can\s+you\s+",
    r"^could\s+you\s+",
    r"^would\s+you\s+",
    r"^i\s+want\s+to\s+",
    r"^i\s+need\s+to\s+",
    r"^i\s+would\s+like\s+to\s+",
    r"^help\s+me\s+",
    r"^\d+\s+to\s+\d+\s+",
];

const TARGET_FORMATS: &[(&str, SourceType)] = &[
    (r"\b(?:to|into|as)\s+pdf\b", SourceType::Pdf),
    (r"\b(?:to|into|as)\s+docx?\b", SourceType::Docx),
    (r"\b(?:to|into|as)\s+word\b", SourceType::Docx),
    (r"\b(?:to|into|as)\s+(?:img|images?)\b", SourceType::Img),
    (r"\b(?:to|into|as)\s+png\b", SourceType::Png),
    (r"\b(?:to|into|as)\s+jpe?g\b", SourceType::Jpg),
];

const PURPOSES: &[(&str, Purpose)] = &[
    (r"\be-?mail\b", Purpose::Email),
    (r"\bwhatsapp\b", Purpose::Whatsapp),
    (r"\bprint(?:ing)?\b", Purpose::Print),
    (r"\bweb(?:site)?\b", Purpose::Web),
    (r"\bshar(?:e|ing)\b", Purpose::Share),
];

// A number must not be the tail of a longer one ("1,500", "12.5", "2050").
const TARGET_SIZE: &str = r"(?:^|[^\d.,])(\d+(?:\.\d+)?)\s*(kb|mb|gb)\b";
const TARGET_PERCENT: &str =
    r"(?:\b(by|to)\s+|^|[^\d.,])(\d{1,3}(?:\.\d+)?)\s*(?:%|percent\b)";
const SEQUENCE_CONNECTORS: &str = r"\s+(?:and\s+then|then|after\s+that|afterwards)\s+";
const SEQUENCE_GLYPHS: &str = r"(?:\s*(?:=>|->|→|➔|➜|➡|⇒|⟶|>)\s*)+";
const WHITESPACE_RUN: &str = r"\s+";

pub const KNOWN_ACTION_VERBS: &[&str] = &[
    "merge", "combine", "join", "split", "extract", "keep", "delete", "remove", "compress",
    "reduce", "shrink", "small", "smaller", "tiny", "convert", "change", "transform", "export",
    "rotate", "turn", "flip", "reorder", "reverse", "swap", "rearrange", "watermark", "stamp",
    "ocr", "scan", "searchable", "readable", "enhance", "improve", "clarify", "sharpen", "fix",
    "flatten", "optimize", "sanitize", "clean", "blank", "duplicate", "number", "numbers",
    "page", "text", "merg", "mrge", "combin", "compres", "comprs", "comress", "splt", "spill",
    "spilt", "splitt", "delet", "remov", "rotat", "roate", "rotae", "convrt", "cnvrt", "extrat",
    "extrac", "enhace", "enhanc",
];

pub const KNOWN_FILE_TYPES: &[&str] = &[
    "pdf", "docx", "doc", "word", "png", "jpg", "jpeg", "image", "images", "img", "txt", "text",
    "zip", "pfd", "pff", "dox", "dog", "docs", "wrod", "wrord", "pngg", "jgp", "jepg", "jpge",
    "imag", "imge",
];

pub const KNOWN_ALIASES: &[&str] = &[
    "to docx", "to doc", "to word", "as docx", "as word", "to pdf", "as pdf", "to png", "to jpg",
    "to jpeg", "to img", "to image", "to images", "as png", "as jpg", "as jpeg", "as img",
    "to txt", "to text", "as txt", "ocr", "compress", "merge", "split", "rotate", "flatten",
    "enhance", "clean", "watermark", "too docx", "too doc", "too pdf", "too word", "too png",
    "too jpg", "too img", "tto docx", "tto pdf", "tto png", "2 docx", "2 pdf", "2 png",
    "2 word", "to dox", "to dcox", "to doxx", "to pfd", "compres", "comprs", "comress", "splt",
    "splitt", "merg", "mrge", "rotat", "roate", "cnvrt", "convrt",
];

pub const PURPOSE_KEYWORDS: &[&str] = &[
    "email", "whatsapp", "print", "web", "share", "upload", "send", "smaller", "reduce",
    "shrink",
];

pub const FILLER_WORDS: &[&str] = &[
    "please", "pls", "plz", "can", "you", "could", "would", "i", "want", "need", "like", "to",
    "the", "this", "that", "my", "a", "an", "it", "do", "make", "just", "help", "me", "file",
    "files", "document", "documents",
];

pub const COMMON_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do",
    "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall", "and",
    "or", "but", "if", "then", "else", "when", "where", "what", "which", "who", "how", "why",
    "all", "each", "every", "both", "few", "more", "most", "other", "some", "such", "no", "not",
    "only", "same", "than", "too", "very", "just", "also", "now", "here", "there", "out", "up",
    "down", "in", "on", "at", "by", "for", "from", "into", "of", "off", "over", "to", "with",
    "first", "second", "third", "last", "next", "new", "old", "one", "two", "three", "four",
    "five", "six", "seven", "eight", "page", "pages", "file", "files", "document", "size", "mb",
    "kb",
];

/// Compiled tables. Construct through [`PatternRegistry::global`] in production; `build`
/// stays public so tests and tools can hold an isolated instance.
#[derive(Debug)]
pub struct PatternRegistry {
    pub version: SchemaVersion,
    operations: Vec<(Operation, Regex)>,
    typo_fixes: Vec<(Regex, &'static str)>,
    noise_prefixes: Vec<Regex>,
    target_formats: Vec<(Regex, SourceType)>,
    purposes: Vec<(Regex, Purpose)>,
    target_size: Regex,
    target_percent: Regex,
    sequence_connectors: Regex,
    sequence_glyphs: Regex,
    whitespace_run: Regex,
}

static GLOBAL_REGISTRY: LazyLock<PatternRegistry> = LazyLock::new(PatternRegistry::build);

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("registry pattern is valid")
}

impl PatternRegistry {
    pub fn global() -> &'static PatternRegistry {
        &GLOBAL_REGISTRY
    }

    pub fn build() -> Self {
        Self {
            version: REGISTRY_VERSION,
            operations: OPERATION_KEYWORDS
                .iter()
                .map(|(op, p)| (*op, compile(p)))
                .collect(),
            typo_fixes: TYPO_FIXES
                .iter()
                .map(|(typo, fix)| (compile(&format!(r"\b{typo}\b")), *fix))
                .collect(),
            noise_prefixes: NOISE_PREFIXES.iter().map(|p| compile(p)).collect(),
            target_formats: TARGET_FORMATS
                .iter()
                .map(|(p, t)| (compile(p), *t))
                .collect(),
            purposes: PURPOSES.iter().map(|(p, v)| (compile(p), *v)).collect(),
            target_size: compile(TARGET_SIZE),
            target_percent: compile(TARGET_PERCENT),
            sequence_connectors: compile(SEQUENCE_CONNECTORS),
            sequence_glyphs: compile(SEQUENCE_GLYPHS),
            whitespace_run: compile(WHITESPACE_RUN),
        }
    }

    /// Declaration order; first match wins per segment.
    pub fn operation_patterns(&self) -> &[(Operation, Regex)] {
        &self.operations
    }

    pub fn typo_fixes(&self) -> &[(Regex, &'static str)] {
        &self.typo_fixes
    }

    pub fn noise_prefixes(&self) -> &[Regex] {
        &self.noise_prefixes
    }

    pub fn target_format_patterns(&self) -> &[(Regex, SourceType)] {
        &self.target_formats
    }

    pub fn purpose_patterns(&self) -> &[(Regex, Purpose)] {
        &self.purposes
    }

    pub fn target_size_pattern(&self) -> &Regex {
        &self.target_size
    }

    pub fn target_percent_pattern(&self) -> &Regex {
        &self.target_percent
    }

    pub fn sequence_connectors(&self) -> &Regex {
        &self.sequence_connectors
    }

    pub fn sequence_glyphs(&self) -> &Regex {
        &self.sequence_glyphs
    }

    pub fn whitespace_run(&self) -> &Regex {
        &self.whitespace_run
    }
}

pub fn valid_operations(source: SourceType) -> &'static [Operation] {
    use Operation::*;
    match source {
        SourceType::Pdf => &[
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
        ],
        SourceType::Docx => &[Convert, Compress, Watermark, PageNumbers],
        SourceType::Doc => &[Convert, Compress, Watermark],
        SourceType::Jpg | SourceType::Jpeg | SourceType::Png | SourceType::Img => {
            &[Merge, Compress, Convert, Enhance, Rotate]
        }
    }
}

/// Mutually exclusive operation sets. A request containing a whole set is rejected.
pub const CONFLICTING_OPERATIONS: &[&[Operation]] = &[&[Operation::Split, Operation::Merge]];

/// Lowercased error text containing any of these is an encoding-class failure, which an
/// OCR pass can usually route around.
pub const ENCODING_ERROR_MARKERS: &[&str] = &[
    "xml compatible",
    "unicode",
    "encoding",
    "character map",
    "null byte",
    "invalid character",
    "codec can't decode",
    "unencodable character",
];

/// Converting between these types changes nothing.
pub fn is_redundant_conversion(source: SourceType, target: SourceType) -> bool {
    source == target
        || matches!(
            (source, target),
            (SourceType::Jpg, SourceType::Jpeg) | (SourceType::Jpeg, SourceType::Jpg)
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_registry_01_every_operation_has_one_keyword_pattern() {
        let reg = PatternRegistry::global();
        let ops: Vec<Operation> = reg.operation_patterns().iter().map(|(op, _)| *op).collect();
        assert_eq!(ops, Operation::ALL.to_vec());
    }

    #[test]
    fn at_registry_02_typo_table_is_a_fixed_point() {
        for (_, fix) in TYPO_FIXES {
            assert!(
                !TYPO_FIXES.iter().any(|(typo, _)| typo == fix),
                "typo target '{fix}' is itself a typo key"
            );
        }
    }

    #[test]
    fn at_registry_03_canonical_names_match_their_own_keyword() {
        let reg = PatternRegistry::global();
        for (op, re) in reg.operation_patterns() {
            assert!(
                re.is_match(op.display_name()),
                "{} does not match its own pattern",
                op.as_str()
            );
        }
    }

    #[test]
    fn at_registry_04_pdf_allows_everything_docx_forbids_ocr() {
        assert_eq!(valid_operations(SourceType::Pdf).len(), Operation::ALL.len());
        assert!(!valid_operations(SourceType::Docx).contains(&Operation::Ocr));
        assert!(!valid_operations(SourceType::Png).contains(&Operation::Split));
    }

    #[test]
    fn at_registry_05_redundant_pairs_cover_identity_and_jpeg_alias() {
        for t in SourceType::ALL {
            assert!(is_redundant_conversion(t, t));
        }
        assert!(is_redundant_conversion(SourceType::Jpg, SourceType::Jpeg));
        assert!(!is_redundant_conversion(SourceType::Png, SourceType::Jpg));
        assert!(!is_redundant_conversion(SourceType::Pdf, SourceType::Docx));
    }

    #[test]
    fn at_registry_06_isolated_instance_matches_global_version() {
        let local = PatternRegistry::build();
        assert_eq!(local.version, PatternRegistry::global().version);
        assert_eq!(local.noise_prefixes().len(), NOISE_PREFIXES.len());
    }
}
