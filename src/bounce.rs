//! Bounce classification: one rule table mapping relay error text and
//! SMTP-style codes onto the hard/soft taxonomy. Every call site that used
//! to pattern-match error strings goes through here instead.

use crate::models::bounce::BounceKind;

/// Phrases that indicate the address is permanently undeliverable.
const HARD_KEYWORDS: &[&str] = &[
    "user unknown",
    "no such user",
    "mailbox not found",
    "mailbox unavailable",
    "address rejected",
    "does not exist",
    "invalid recipient",
    "recipient rejected",
    "account disabled",
    "unrouteable address",
];

/// Phrases that indicate a temporary condition worth retrying later.
const SOFT_KEYWORDS: &[&str] = &[
    "mailbox full",
    "quota exceeded",
    "temporarily unavailable",
    "temporarily deferred",
    "try again later",
    "greylisted",
    "too many connections",
    "connection timed out",
    "service unavailable",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub kind: BounceKind,
    pub confidence: f32,
}

/// Classify a delivery error.
///
/// Precedence: an explicit numeric code wins over keywords; if both
/// keyword sets match, hard wins; anything unrecognized is hard, since an
/// unknown failure must halt future sends rather than retry forever.
pub fn classify(error_text: &str, code: Option<u16>) -> Classification {
    let code = code.or_else(|| extract_smtp_code(error_text));
    if let Some(code) = code {
        if let Some(kind) = classify_code(code) {
            return Classification {
                kind,
                confidence: 0.95,
            };
        }
    }

    let lowered = error_text.to_lowercase();
    if HARD_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return Classification {
            kind: BounceKind::Hard,
            confidence: 0.8,
        };
    }
    if SOFT_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return Classification {
            kind: BounceKind::Soft,
            confidence: 0.8,
        };
    }

    Classification {
        kind: BounceKind::Hard,
        confidence: 0.4,
    }
}

fn classify_code(code: u16) -> Option<BounceKind> {
    match code {
        550..=554 => Some(BounceKind::Hard),
        421 | 450..=452 => Some(BounceKind::Soft),
        _ => None,
    }
}

/// Pull a leading 3-digit SMTP reply code out of error text, e.g.
/// `"550 5.1.1 User unknown"` -> `550`.
pub fn extract_smtp_code(error_text: &str) -> Option<u16> {
    let head: String = error_text
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if head.len() == 3 {
        head.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_code_in_text() {
        let c = classify("550 5.1.1 User unknown", None);
        assert_eq!(c.kind, BounceKind::Hard);
        assert!(c.confidence > 0.9);
    }

    #[test]
    fn soft_code_in_text() {
        let c = classify("421 4.3.2 Try again later", None);
        assert_eq!(c.kind, BounceKind::Soft);
        assert!(c.confidence > 0.9);
    }

    #[test]
    fn explicit_code_wins_over_keywords() {
        // Text says "mailbox full" (soft keyword) but 553 is a hard code.
        let c = classify("mailbox full", Some(553));
        assert_eq!(c.kind, BounceKind::Hard);
    }

    #[test]
    fn keyword_match_without_code() {
        assert_eq!(
            classify("smtp; Quota exceeded for user", None).kind,
            BounceKind::Soft
        );
        assert_eq!(
            classify("the specified Mailbox Not Found", None).kind,
            BounceKind::Hard
        );
    }

    #[test]
    fn hard_wins_when_both_keyword_sets_match() {
        let c = classify("user unknown, mailbox full", None);
        assert_eq!(c.kind, BounceKind::Hard);
    }

    #[test]
    fn unknown_text_defaults_to_hard() {
        let c = classify("some unrelated text", None);
        assert_eq!(c.kind, BounceKind::Hard);
        assert!(c.confidence < 0.5);
    }

    #[test]
    fn code_extraction_needs_exactly_three_leading_digits() {
        assert_eq!(extract_smtp_code("550 nope"), Some(550));
        assert_eq!(extract_smtp_code("  451 deferred"), Some(451));
        assert_eq!(extract_smtp_code("5501 not a code"), None);
        assert_eq!(extract_smtp_code("no code"), None);
        assert_eq!(extract_smtp_code("42 short"), None);
    }

    #[test]
    fn uninteresting_codes_fall_through_to_keywords() {
        // 250 is not a bounce code; keyword decides.
        assert_eq!(classify("250 mailbox full", None).kind, BounceKind::Soft);
    }
}
