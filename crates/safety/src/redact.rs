//! PII redaction for escalation excerpts.
//!
//! Escalation records leave the engine's trust boundary — they land in
//! a human review queue — so message content is scrubbed of personal
//! identifiers before persistence. Detected spans are replaced with
//! fixed placeholder tokens.
//!
//! Verification re-runs every detector over the redacted output. If
//! anything still matches, redaction is treated as unverifiable and
//! the caller must fail closed (withhold content, keep metadata).

use regex::Regex;
use sherpa_core::error::RedactionError;
use std::sync::LazyLock;

/// A PII detector: pattern plus its replacement placeholder.
struct Detector {
    label: &'static str,
    pattern: Regex,
    placeholder: &'static str,
}

/// Detector order matters: longer numeric shapes run before shorter
/// ones so a card number is not half-eaten by the phone pattern.
static DETECTORS: LazyLock<Vec<Detector>> = LazyLock::new(|| {
    vec![
        Detector {
            label: "email",
            pattern: Regex::new(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}").unwrap(),
            placeholder: "[email]",
        },
        Detector {
            label: "card-number",
            // 13–16 digits, optionally grouped by spaces or dashes
            pattern: Regex::new(r"\b(?:\d[ \-]?){13,16}\b").unwrap(),
            placeholder: "[card-number]",
        },
        Detector {
            label: "id-number",
            // SSN-shaped and bare 9-digit government identifiers
            pattern: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b|\b\d{9}\b").unwrap(),
            placeholder: "[id-number]",
        },
        Detector {
            label: "phone",
            pattern: Regex::new(
                r"(?:\+?\d{1,3}[ .\-]?)?(?:\(\d{3}\)|\d{3})[ .\-]?\d{3}[ .\-]?\d{4}",
            )
            .unwrap(),
            placeholder: "[phone]",
        },
    ]
});

/// Replace every detected PII span with its placeholder token.
pub fn redact(input: &str) -> String {
    let mut result = input.to_string();
    for detector in DETECTORS.iter() {
        result = detector
            .pattern
            .replace_all(&result, detector.placeholder)
            .to_string();
    }
    result
}

/// Verify that no detector still matches.
pub fn verify(input: &str) -> Result<(), RedactionError> {
    for detector in DETECTORS.iter() {
        if detector.pattern.is_match(input) {
            return Err(RedactionError::Unverifiable {
                detector: detector.label.into(),
            });
        }
    }
    Ok(())
}

/// Redact and verify in one step. Errors mean the caller must withhold
/// the content entirely.
pub fn redact_verified(input: &str) -> Result<String, RedactionError> {
    let redacted = redact(input);
    verify(&redacted)?;
    Ok(redacted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_email() {
        let result = redact("reach me at sam.doe+test@example.co.uk please");
        assert_eq!(result, "reach me at [email] please");
    }

    #[test]
    fn redacts_phone_number() {
        let result = redact("call me on (555) 123-4567 tonight");
        assert!(result.contains("[phone]"));
        assert!(!result.contains("123-4567"));
    }

    #[test]
    fn redacts_international_phone() {
        let result = redact("my number is +1 555 123 4567");
        assert!(result.contains("[phone]"));
        assert!(!result.contains("4567"));
    }

    #[test]
    fn redacts_ssn_like_id() {
        let result = redact("my ssn is 123-45-6789 ok");
        assert_eq!(result, "my ssn is [id-number] ok");
    }

    #[test]
    fn redacts_bare_nine_digit_id() {
        let result = redact("id 123456789 on file");
        assert_eq!(result, "id [id-number] on file");
    }

    #[test]
    fn redacts_card_number() {
        let result = redact("charged to 4111 1111 1111 1111 yesterday");
        assert!(result.contains("[card-number]"));
        assert!(!result.contains("4111"));
    }

    #[test]
    fn redacts_dashed_card_number() {
        let result = redact("card: 5500-0000-0000-0004");
        assert!(result.contains("[card-number]"));
        assert!(!result.contains("5500"));
    }

    #[test]
    fn passes_through_clean_text() {
        let input = "I feel overwhelmed and I don't know what to do";
        assert_eq!(redact(input), input);
    }

    #[test]
    fn redacts_multiple_kinds_in_one_string() {
        let result = redact("email me at a@b.com or call 555-123-4567");
        assert!(result.contains("[email]"));
        assert!(result.contains("[phone]"));
        assert!(!result.contains("a@b.com"));
    }

    #[test]
    fn verify_rejects_unredacted_text() {
        let err = verify("my ssn is 123-45-6789").unwrap_err();
        match err {
            RedactionError::Unverifiable { detector } => {
                assert_eq!(detector, "id-number");
            }
        }
    }

    #[test]
    fn verify_accepts_redacted_output() {
        let redacted = redact("email a@b.com, phone 555-123-4567, card 4111111111111111");
        assert!(verify(&redacted).is_ok());
    }

    #[test]
    fn placeholders_do_not_retrigger_detectors() {
        let placeholders = "[email] [phone] [id-number] [card-number]";
        assert!(verify(placeholders).is_ok());
    }

    #[test]
    fn redact_verified_roundtrip() {
        let result =
            redact_verified("I'm at a@b.com, I can't cope anymore").expect("should verify");
        assert!(result.contains("[email]"));
        assert!(result.contains("can't cope"));
    }

    #[test]
    fn ordinary_numbers_survive() {
        let input = "I slept 4 hours and missed 2 lessons this week";
        assert_eq!(redact(input), input);
    }
}
