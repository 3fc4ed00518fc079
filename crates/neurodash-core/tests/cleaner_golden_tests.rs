//! Golden tests for the narrative cleaner.
//!
//! Raw narratives as they appear in RIS exports, with the text the
//! inference engine should see.

use neurodash_core::enrich::TextCleaner;
use proptest::prelude::*;

struct GoldenCase {
    id: &'static str,
    raw: &'static str,
    expected: &'static str,
}

fn get_golden_cases() -> Vec<GoldenCase> {
    vec![
        GoldenCase {
            id: "plain",
            raw: "MRI head. No acute intracranial abnormality.",
            expected: "MRI head. No acute intracranial abnormality.",
        },
        GoldenCase {
            id: "rtf-wrapped",
            raw: r"{\rtf1\ansi\deff0 {\fonttbl {\f0 Arial;}}}\f0\fs20 Findings: small vessel disease.\par}",
            expected: "Findings: small vessel disease.",
        },
        GoldenCase {
            id: "line-breaks",
            raw: "CLINICAL DETAILS:\nHeadache.\n\nFINDINGS:\r\nNormal ventricles.",
            expected: "CLINICAL DETAILS: Headache. FINDINGS: Normal ventricles.",
        },
        GoldenCase {
            id: "space-before-period",
            raw: "No haemorrhage . No mass effect .",
            expected: "No haemorrhage. No mass effect.",
        },
        GoldenCase {
            id: "template-tokens",
            raw: "Reported by _REPORTER_NAME_ on _DATE_ for review.",
            expected: "Reported by on for review.",
        },
        GoldenCase {
            id: "whitespace-runs",
            raw: "   Chronic   infarct\t\tin the  left occipital lobe.   ",
            expected: "Chronic infarct in the left occipital lobe.",
        },
        GoldenCase {
            id: "empty",
            raw: "",
            expected: "",
        },
    ]
}

#[test]
fn test_golden_cases() {
    let cleaner = TextCleaner::new();
    for case in get_golden_cases() {
        let cleaned = cleaner.clean(case.raw);
        assert_eq!(cleaned, case.expected, "Case {}: cleaned text mismatch", case.id);
    }
}

proptest! {
    #[test]
    fn prop_cleaned_text_is_tidy(raw in "[ -~\n\r\t]{0,200}") {
        let cleaned = TextCleaner::new().clean(&raw);

        prop_assert!(!cleaned.contains('\n'));
        prop_assert!(!cleaned.contains('\r'));
        prop_assert_eq!(cleaned.trim(), cleaned.as_str());

        let chars: Vec<char> = cleaned.chars().collect();
        prop_assert!(
            chars.windows(2).all(|w| !(w[0].is_whitespace() && w[1].is_whitespace())),
            "whitespace run in {:?}",
            cleaned
        );
    }
}
