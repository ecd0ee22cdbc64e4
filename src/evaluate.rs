//! Matching an extracted candidate against a fixture's ground truth.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::extract::extract;
use crate::fixture::{Fixture, Tier};
use crate::ocr::EngineResult;

pub const REASON_EMPTY_EXPECTED: &str = "expected code is empty";
pub const REASON_NO_DIGITS: &str = "no digit run found";
pub const REASON_PRIMARY: &str = "candidate contains expected code";
pub const REASON_PRIMARY_STRIPPED: &str = "candidate contains expected code ignoring whitespace";
pub const REASON_VARIATION: &str = "candidate matches an acceptable variation";
pub const REASON_MISS: &str = "digit run did not contain expected code";

/// Remove every whitespace character.
pub fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub matched: bool,
    pub reason: &'static str,
}

impl Verdict {
    fn hit(reason: &'static str) -> Self {
        Self { matched: true, reason }
    }

    fn miss(reason: &'static str) -> Self {
        Self { matched: false, reason }
    }
}

/// Decide whether `candidate` holds `expected`, either verbatim or once all
/// whitespace is removed from both. Variations are tried the same way when the
/// primary check fails.
pub fn evaluate<S: AsRef<str>>(candidate: &str, expected: &str, variations: &[S]) -> Verdict {
    if expected.is_empty() {
        return Verdict::miss(REASON_EMPTY_EXPECTED);
    }
    if candidate.is_empty() {
        return Verdict::miss(REASON_NO_DIGITS);
    }

    let stripped = strip_whitespace(candidate);
    if candidate.contains(expected) {
        return Verdict::hit(REASON_PRIMARY);
    }
    let expected_stripped = strip_whitespace(expected);
    if !expected_stripped.is_empty() && stripped.contains(&expected_stripped) {
        return Verdict::hit(REASON_PRIMARY_STRIPPED);
    }

    let variation_hit = variations.iter().map(|v| v.as_ref()).any(|v: &str| {
        let v_stripped = strip_whitespace(v);
        !v_stripped.is_empty()
            && (candidate.contains(v) || stripped.contains(&v_stripped) || candidate.contains(&v_stripped))
    });
    if variation_hit {
        return Verdict::hit(REASON_VARIATION);
    }
    Verdict::miss(REASON_MISS)
}

/// Terminal record for one (fixture, engine) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    fixture: PathBuf,
    tier: Tier,
    engine_id: String,
    expected_code: String,
    extracted_candidate: String,
    matched: bool,
    reason: String,
    raw_text: String,
    mean_confidence: f64,
}

impl MatchOutcome {
    pub fn fixture(&self) -> &Path {
        &self.fixture
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    pub fn expected_code(&self) -> &str {
        &self.expected_code
    }

    /// Empty when the engine text held no digits.
    pub fn extracted_candidate(&self) -> &str {
        &self.extracted_candidate
    }

    pub fn matched(&self) -> bool {
        self.matched
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn mean_confidence(&self) -> f64 {
        self.mean_confidence
    }
}

/// Extract a candidate from the engine's text and judge it. Acceptable
/// variations only count for real-world fixtures.
pub fn evaluate_fixture(fixture: &Fixture, result: &EngineResult) -> MatchOutcome {
    let candidate = extract(result.aggregated_text());
    let variations: Vec<&str> = if fixture.tier() == Tier::RealWorld {
        fixture.acceptable_variations().iter().map(String::as_str).collect()
    } else {
        Vec::new()
    };
    let verdict = evaluate(&candidate, fixture.expected_code(), variations.as_slice());
    MatchOutcome {
        fixture: fixture.image_path().to_path_buf(),
        tier: fixture.tier(),
        engine_id: result.engine_id().to_string(),
        expected_code: fixture.expected_code().to_string(),
        extracted_candidate: candidate,
        matched: verdict.matched,
        reason: verdict.reason.to_string(),
        raw_text: result.aggregated_text().to_string(),
        mean_confidence: result.mean_confidence(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{Detection, JoinPolicy};

    const NONE: [&str; 0] = [];

    #[test]
    fn spaced_candidate_matches_plain_code() {
        let v = evaluate("100 002", "100002", &NONE);
        assert!(v.matched);
        assert_eq!(v.reason, REASON_PRIMARY_STRIPPED);
    }

    #[test]
    fn variation_rescues_run_on_reading() {
        let v = evaluate("10000210566", "100002", &["100 002", "10000210566"]);
        assert!(v.matched);
    }

    #[test]
    fn containment_is_enough() {
        assert_eq!(evaluate("9912345", "12345", &NONE).reason, REASON_PRIMARY);
    }

    #[test]
    fn empty_candidate_is_a_miss_with_reason() {
        let v = evaluate("", "12345", &NONE);
        assert!(!v.matched);
        assert_eq!(v.reason, REASON_NO_DIGITS);
    }

    #[test]
    fn wrong_digits_are_a_miss() {
        let v = evaluate("12354", "12345", &["1234"]);
        assert!(!v.matched);
        assert_eq!(v.reason, REASON_MISS);
    }

    #[test]
    fn blank_variations_never_match() {
        assert!(!evaluate("777", "12345", &["", "  "]).matched);
    }

    #[test]
    fn empty_expected_never_matches() {
        assert_eq!(evaluate("12345", "", &NONE).reason, REASON_EMPTY_EXPECTED);
    }

    fn result(texts: &[&str]) -> EngineResult {
        let detections = texts
            .iter()
            .map(|t| Detection {
                text: t.to_string(),
                confidence: 0.8,
                region: None,
            })
            .collect();
        EngineResult::new("stub", detections, JoinPolicy::Space)
    }

    #[test]
    fn fixture_evaluation_extracts_first() {
        let fixture = Fixture::real_world("product_12345.png".into(), "12345", NONE).unwrap();
        let out = evaluate_fixture(&fixture, &result(&["Tornillo M8x20", "12345", "€0.50"]));
        assert_eq!(out.extracted_candidate(), "12345");
        assert!(out.matched());
        assert_eq!(out.raw_text(), "Tornillo M8x20 12345 €0.50");
        assert!((out.mean_confidence() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn variations_only_apply_to_real_world() {
        let photo = Fixture::real_world("variants/danowind.jpeg".into(), "100002", ["10566"]).unwrap();
        let reading = result(&["Lote", "10566"]);
        let out = evaluate_fixture(&photo, &reading);
        assert!(out.matched());
        assert_eq!(out.reason(), REASON_VARIATION);

        let variations = photo.acceptable_variations().clone();
        let label = Fixture::new(
            "variants/100002_white_modern.png".into(),
            "100002",
            Tier::Advanced,
            variations,
            None,
        )
        .unwrap();
        let out = evaluate_fixture(&label, &reading);
        assert_eq!(out.tier(), Tier::Advanced);
        assert!(!out.matched());
        assert_eq!(out.reason(), REASON_MISS);
    }
}
