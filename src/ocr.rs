pub mod easyocr;
pub mod process;
pub mod tesseract;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineSettings;
use crate::error::AdapterError;

use self::easyocr::EasyOcrBridge;
use self::tesseract::TesseractCli;

// ── Public types ─────────────────────────────────────────────────────────────

/// Quadrilateral reported by region-aware engines (corner points in pixels).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub points: Vec<[f64; 2]>,
}

/// One recognized text fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub text: String,
    pub confidence: f64, // 0.0 – 1.0
    /// Kept for spatial sorting; extraction never reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
}

/// An engine's output in its native shape, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    /// Flat `(text, confidence)` pairs.
    Pairs(Vec<(String, f64)>),
    /// `(region, text, confidence)` triples.
    Regions(Vec<(Region, String, f64)>),
}

impl RawOutput {
    pub fn len(&self) -> usize {
        match self {
            RawOutput::Pairs(p) => p.len(),
            RawOutput::Regions(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How detections are joined into one search string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinPolicy {
    Space,
    Newline,
}

impl JoinPolicy {
    pub fn separator(self) -> &'static str {
        match self {
            JoinPolicy::Space => " ",
            JoinPolicy::Newline => "\n",
        }
    }
}

/// Every OCR backend implements this.
///
/// `recognize` must return `Err` when the engine could not run at all and
/// `Ok` with an empty `RawOutput` when it ran and saw no text.
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Join policy that reproduces this engine's historical output format.
    fn default_join_policy(&self) -> JoinPolicy;

    fn recognize(&self, image: &Path) -> Result<RawOutput, AdapterError>;

    /// Cheap availability check; returns a version string.
    fn probe(&self) -> Result<String, AdapterError>;
}

// ── Adapter / aggregation ────────────────────────────────────────────────────

/// Convert any native engine output into detection records, preserving the
/// engine's order and confidences.
pub fn normalize(raw: RawOutput) -> Vec<Detection> {
    match raw {
        RawOutput::Pairs(pairs) => pairs
            .into_iter()
            .map(|(text, confidence)| Detection {
                text,
                confidence,
                region: None,
            })
            .collect(),
        RawOutput::Regions(triples) => triples
            .into_iter()
            .map(|(region, text, confidence)| Detection {
                text,
                confidence,
                region: Some(region),
            })
            .collect(),
    }
}

/// Join detection texts in engine order. The result is trimmed at both ends;
/// whitespace inside and between fragments is kept verbatim.
pub fn aggregate(detections: &[Detection], join: JoinPolicy) -> String {
    detections
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join(join.separator())
        .trim()
        .to_string()
}

/// Unweighted mean confidence; `0.0` when there are no detections.
pub fn aggregate_confidence(detections: &[Detection]) -> f64 {
    if detections.is_empty() {
        return 0.0;
    }
    detections.iter().map(|d| d.confidence).sum::<f64>() / detections.len() as f64
}

/// Detections of one engine run on one image, with the derived search string
/// and mean confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineResult {
    engine_id: String,
    detections: Vec<Detection>,
    aggregated_text: String,
    mean_confidence: f64,
}

impl EngineResult {
    pub fn new(engine_id: impl Into<String>, detections: Vec<Detection>, join: JoinPolicy) -> Self {
        let aggregated_text = aggregate(&detections, join);
        let mean_confidence = aggregate_confidence(&detections);
        Self {
            engine_id: engine_id.into(),
            detections,
            aggregated_text,
            mean_confidence,
        }
    }

    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn aggregated_text(&self) -> &str {
        &self.aggregated_text
    }

    pub fn mean_confidence(&self) -> f64 {
        self.mean_confidence
    }
}

// ── Engine handles ───────────────────────────────────────────────────────────

/// Built-in engine backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Tesseract,
    Easyocr,
}

impl EngineKind {
    pub const ALL: [EngineKind; 2] = [EngineKind::Tesseract, EngineKind::Easyocr];
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineKind::Tesseract => "tesseract",
            EngineKind::Easyocr => "easyocr",
        })
    }
}

/// A recognizer plus the join policy its output is aggregated with.
pub struct EngineHandle {
    recognizer: Box<dyn Recognizer>,
    join: JoinPolicy,
}

impl EngineHandle {
    pub fn new(recognizer: Box<dyn Recognizer>) -> Self {
        let join = recognizer.default_join_policy();
        Self { recognizer, join }
    }

    pub fn with_join(recognizer: Box<dyn Recognizer>, join: Option<JoinPolicy>) -> Self {
        let join = join.unwrap_or_else(|| recognizer.default_join_policy());
        Self { recognizer, join }
    }

    pub fn name(&self) -> &str {
        self.recognizer.name()
    }

    pub fn join_policy(&self) -> JoinPolicy {
        self.join
    }

    pub fn probe(&self) -> Result<String, AdapterError> {
        self.recognizer.probe()
    }

    /// Invoke the engine on one image and normalize its output.
    pub fn run(&self, image: &Path) -> Result<EngineResult, AdapterError> {
        let raw = self.recognizer.recognize(image).inspect_err(|e| {
            warn!(engine = self.name(), image = %image.display(), "engine failed: {e}");
        })?;
        debug!(
            engine = self.name(),
            image = %image.display(),
            fragments = raw.len(),
            "engine finished"
        );
        Ok(EngineResult::new(self.name(), normalize(raw), self.join))
    }
}

/// The engines used for one batch. Owned by the caller and dropped when the
/// batch is done.
#[derive(Default)]
pub struct EngineSet {
    engines: Vec<EngineHandle>,
}

impl EngineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: EngineHandle) {
        self.engines.push(handle);
    }

    pub fn with(mut self, handle: EngineHandle) -> Self {
        self.push(handle);
        self
    }

    /// Build the selected backends from configuration, in the order given.
    pub fn from_settings(settings: &EngineSettings, kinds: &[EngineKind]) -> Self {
        let mut set = Self::new();
        for kind in kinds {
            set.push(build_engine(settings, *kind));
        }
        set
    }

    pub fn iter(&self) -> impl Iterator<Item = &EngineHandle> {
        self.engines.iter()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// Build one backend from configuration.
pub fn build_engine(settings: &EngineSettings, kind: EngineKind) -> EngineHandle {
    match kind {
        EngineKind::Tesseract => {
            let s = &settings.tesseract;
            EngineHandle::with_join(
                Box::new(TesseractCli {
                    binary: s.binary.clone(),
                    languages: s.languages.clone(),
                    psm: s.psm,
                    timeout: Duration::from_secs(s.timeout_secs),
                }),
                s.join,
            )
        }
        EngineKind::Easyocr => {
            let s = &settings.easyocr;
            EngineHandle::with_join(
                Box::new(EasyOcrBridge {
                    python: s.python.clone(),
                    script: s.script.clone(),
                    languages: s.languages.clone(),
                    gpu: s.gpu,
                    timeout: Duration::from_secs(s.timeout_secs),
                }),
                s.join,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(text: &str, confidence: f64) -> Detection {
        Detection {
            text: text.to_string(),
            confidence,
            region: None,
        }
    }

    fn square() -> Region {
        Region {
            points: vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]],
        }
    }

    #[test]
    fn normalizes_pairs_without_geometry() {
        let raw = RawOutput::Pairs(vec![("Tornillo".into(), 0.91), ("12345".into(), 0.88)]);
        let detections = normalize(raw);
        assert_eq!(detections, vec![det("Tornillo", 0.91), det("12345", 0.88)]);
    }

    #[test]
    fn normalizes_triples_keeping_region_and_confidence() {
        let raw = RawOutput::Regions(vec![(square(), "100 002".into(), 0.4321)]);
        let detections = normalize(raw);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "100 002");
        assert_eq!(detections[0].confidence, 0.4321);
        assert_eq!(detections[0].region, Some(square()));
    }

    #[test]
    fn aggregate_respects_join_policy_and_order() {
        let d = vec![det("b", 1.0), det("a", 1.0), det("c", 1.0)];
        assert_eq!(aggregate(&d, JoinPolicy::Space), "b a c");
        assert_eq!(aggregate(&d, JoinPolicy::Newline), "b\na\nc");
    }

    #[test]
    fn aggregate_trims_ends_but_keeps_inner_whitespace() {
        let d = vec![det("  100  002", 1.0), det("€0.50 \n", 1.0)];
        assert_eq!(aggregate(&d, JoinPolicy::Space), "100  002 €0.50");
    }

    #[test]
    fn aggregate_of_nothing_is_empty() {
        assert_eq!(aggregate(&[], JoinPolicy::Newline), "");
    }

    #[test]
    fn mean_confidence_is_unweighted() {
        let d = vec![det("a", 0.2), det("much longer text", 0.6)];
        assert!((aggregate_confidence(&d) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn mean_confidence_of_nothing_is_zero() {
        assert_eq!(aggregate_confidence(&[]), 0.0);
    }

    #[test]
    fn engine_result_derives_text_and_confidence() {
        let r = EngineResult::new("easyocr", vec![det("12345", 0.9), det("€0.50", 0.5)], JoinPolicy::Newline);
        assert_eq!(r.engine_id(), "easyocr");
        assert_eq!(r.aggregated_text(), "12345\n€0.50");
        assert!((r.mean_confidence() - 0.7).abs() < 1e-12);
        assert_eq!(r.detections().len(), 2);
    }

    #[test]
    fn normalize_then_aggregate_is_idempotent() {
        let raw = RawOutput::Regions(vec![
            (square(), "Tuerca M10".into(), 0.7),
            (square(), "67890".into(), 0.99),
        ]);
        let first = aggregate(&normalize(raw.clone()), JoinPolicy::Newline);
        let second = aggregate(&normalize(raw), JoinPolicy::Newline);
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    struct Fixed;

    impl Recognizer for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn default_join_policy(&self) -> JoinPolicy {
            JoinPolicy::Newline
        }
        fn recognize(&self, _image: &Path) -> Result<RawOutput, AdapterError> {
            Ok(RawOutput::Pairs(vec![("100".into(), 0.5), ("002".into(), 0.7)]))
        }
        fn probe(&self) -> Result<String, AdapterError> {
            Ok("fixed 1.0".into())
        }
    }

    #[test]
    fn handle_uses_default_join_unless_overridden() {
        let default = EngineHandle::new(Box::new(Fixed));
        assert_eq!(default.join_policy(), JoinPolicy::Newline);
        let r = default.run(Path::new("unused.png")).unwrap();
        assert_eq!(r.aggregated_text(), "100\n002");

        let spaced = EngineHandle::with_join(Box::new(Fixed), Some(JoinPolicy::Space));
        let r = spaced.run(Path::new("unused.png")).unwrap();
        assert_eq!(r.aggregated_text(), "100 002");
    }

    #[test]
    fn builds_engines_from_settings_in_order() {
        let settings = EngineSettings::default();
        let set = EngineSet::from_settings(&settings, &[EngineKind::Easyocr, EngineKind::Tesseract]);
        let names: Vec<_> = set.iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["easyocr", "tesseract"]);
        let joins: Vec<_> = set.iter().map(|e| e.join_policy()).collect();
        assert_eq!(joins, vec![JoinPolicy::Newline, JoinPolicy::Space]);
    }
}
