#![forbid(unsafe_code)]

use docflow_engines::registry::TYPO_FIXES;
use docflow_engines::{
    get_purpose_presets, resolve, should_retry_on_error, should_retry_on_size_miss, validate,
    GarbageClassifier, Normalizer, ResolverRuntime,
};
use docflow_kernel_contracts::command::{Operation, Purpose, Quality, SourceType};
use docflow_kernel_contracts::guard::{RetryAction, ValidationStatus};
use docflow_kernel_contracts::resolution::ResolutionState;
use docflow_kernel_contracts::Validate;

#[test]
fn at_e2e_01_normalization_is_idempotent() {
    let n = Normalizer::new();
    let mut corpus: Vec<String> = vec![
        "compres this by 50%".to_string(),
        "1 to 2 then make small".to_string(),
        "PLEASE   split ->compress=>  merge".to_string(),
        "and then and then".to_string(),
        "\u{00A0}rotate\u{3000}then\tflatten ".to_string(),
        "→→→".to_string(),
        "convert to pfd afterwards stamp".to_string(),
    ];
    // Every typo in isolation and inside a sentence.
    for (typo, _) in TYPO_FIXES {
        corpus.push(typo.to_string());
        corpus.push(format!("pls {typo} then {typo}"));
    }
    for input in &corpus {
        let once = n.normalize(input);
        assert_eq!(n.normalize(&once), once, "input: {input:?}");
    }
}

#[test]
fn at_e2e_02_escalation_gate() {
    let classifier = GarbageClassifier::default();
    assert!(classifier.classify("xk2!!!@@##").is_garbage);

    let normalized = Normalizer::new().normalize("plz compres this");
    assert!(!classifier.classify(&normalized).is_garbage);
    assert!(!classifier.classify("plz compres this").is_garbage);
}

#[test]
fn at_e2e_03_size_extraction_in_megabytes() {
    let n = Normalizer::new();
    let kb = n
        .extract_target_size(&n.normalize("compress to 500kb"))
        .unwrap();
    assert!((kb - 0.488).abs() < 0.001, "got {kb}");
    assert_eq!(n.extract_target_size(&n.normalize("under 2 MB")), Some(2.0));

    let r = resolve("compress to 500kb", SourceType::Pdf);
    assert!(r.success);
    assert!((r.targets.target_size_mb.unwrap() - 0.488).abs() < 0.001);
}

#[test]
fn at_e2e_04_incompatible_operation_is_rejected() {
    let v = validate(&[Operation::Ocr], SourceType::Docx, None, None).unwrap();
    assert_eq!(v.status, ValidationStatus::Incompatible);
    assert!(!v.is_valid);

    let r = resolve("ocr", SourceType::Docx);
    assert_eq!(r.state, ResolutionState::NeedsUserChoice);
    assert!(!r.options.is_empty());
    assert!(r.options.len() <= 5);
}

#[test]
fn at_e2e_05_dedup_and_redundant_conversion() {
    let v = validate(
        &[Operation::Compress, Operation::Compress, Operation::Convert],
        SourceType::Pdf,
        Some(SourceType::Pdf),
        None,
    )
    .unwrap();
    assert!(v.is_valid);
    assert_eq!(v.adjusted_pipeline, vec![Operation::Compress]);
    assert!(v.validate().is_ok());
}

#[test]
fn at_e2e_06_size_miss_retry_is_bounded() {
    assert_eq!(
        should_retry_on_size_miss(12.0, 10.0, 0),
        (true, Some(RetryAction::StrongerPreset))
    );
    assert_eq!(should_retry_on_size_miss(12.0, 10.0, 1), (false, None));
    assert_eq!(should_retry_on_size_miss(8.0, 10.0, 0), (false, None));
}

#[test]
fn at_e2e_07_error_retry_is_bounded() {
    let msg = "PDF text contains invalid character U+0000";
    assert_eq!(
        should_retry_on_error(msg, 0),
        (true, Some(RetryAction::OcrFallback))
    );
    assert_eq!(should_retry_on_error(msg, 1), (false, None));
    assert_eq!(should_retry_on_error("permission denied", 0), (false, None));
}

#[test]
fn at_e2e_08_sequence_words_keep_user_order() {
    let r = resolve("split pages then compress", SourceType::Pdf);
    assert_eq!(r.pipeline, vec![Operation::Split, Operation::Compress]);

    let r = resolve("watermark -> rotate -> compress", SourceType::Pdf);
    assert_eq!(
        r.pipeline,
        vec![Operation::Watermark, Operation::Rotate, Operation::Compress]
    );
}

#[test]
fn at_e2e_09_results_always_satisfy_their_contract() {
    let runtime = ResolverRuntime::default();
    let inputs = [
        "",
        "xk2!!!@@##",
        "compres this by 50%",
        "split and merge",
        "convert to jpeg",
        "ocr then flatten then compress",
        "merge -> merge -> merge",
        "make it small for print",
    ];
    for source in SourceType::ALL {
        for input in inputs {
            let r = runtime.resolve(input, source);
            assert!(
                r.validate().is_ok(),
                "invalid result for {input:?} on {}",
                source.as_str()
            );
            assert_eq!(r.success, r.state == ResolutionState::Resolved);
            if r.needs_user_choice {
                assert!((1..=5).contains(&r.options.len()));
                assert!(r.pipeline.is_empty());
            }
        }
    }
}

#[test]
fn at_e2e_10_purpose_preset_lookup() {
    let p = get_purpose_presets(Purpose::Email);
    assert_eq!(p.max_size_mb, 10.0);
    assert_eq!(p.quality, Quality::Medium);
    assert_eq!(p.dpi, 150);
}

#[test]
fn at_e2e_11_split_merge_incompatible_on_pdf() {
    let r = resolve("split then merge", SourceType::Pdf);
    assert_eq!(r.validation_status, ValidationStatus::Incompatible);
    assert!(r.needs_user_choice);
}
