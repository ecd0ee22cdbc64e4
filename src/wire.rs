//! One-shot JSON protocol of the `labelcode-ocr` binary.
//!
//! stdout always carries exactly one object: `{"raw_text": "..."}` on
//! success, `{"raw_text": "", "error": "..."}` otherwise.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ocr::EngineHandle;

pub const USAGE: &str = "usage: labelcode-ocr <image_path> [--engine easyocr|tesseract]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireResponse {
    pub fn text(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            raw_text: String::new(),
            error: Some(message.into()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!(r#"{{"raw_text":"","error":"{e}"}}"#))
    }
}

/// Answer one request and pick the process exit code. Only a missing image
/// argument is a usage failure; engine failures are reported in the body.
pub fn respond(image: Option<&Path>, engine: &EngineHandle) -> (WireResponse, u8) {
    let Some(image) = image else {
        return (WireResponse::error(USAGE), 1);
    };
    match engine.run(image) {
        Ok(result) => {
            info!(engine = engine.name(), chars = result.aggregated_text().len(), "recognized");
            (WireResponse::text(result.aggregated_text()), 0)
        }
        Err(e) => (WireResponse::error(e.to_string()), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::ocr::{JoinPolicy, RawOutput, Recognizer};

    struct Reads(Result<Vec<(&'static str, f64)>, ()>);

    impl Recognizer for Reads {
        fn name(&self) -> &str {
            "reads"
        }
        fn default_join_policy(&self) -> JoinPolicy {
            JoinPolicy::Newline
        }
        fn recognize(&self, _image: &Path) -> Result<RawOutput, AdapterError> {
            match &self.0 {
                Ok(pairs) => Ok(RawOutput::Pairs(
                    pairs.iter().map(|(t, c)| (t.to_string(), *c)).collect(),
                )),
                Err(()) => Err(AdapterError::Timeout {
                    engine: "reads".into(),
                    after: std::time::Duration::from_secs(10),
                }),
            }
        }
        fn probe(&self) -> Result<String, AdapterError> {
            Ok("reads".into())
        }
    }

    #[test]
    fn missing_argument_is_usage_error() {
        let engine = EngineHandle::new(Box::new(Reads(Ok(vec![]))));
        let (resp, code) = respond(None, &engine);
        assert_eq!(code, 1);
        assert_eq!(resp.error.as_deref(), Some(USAGE));
    }

    #[test]
    fn success_omits_error_field() {
        let engine = EngineHandle::new(Box::new(Reads(Ok(vec![("Tuerca M10", 0.8), ("67890", 0.9)]))));
        let (resp, code) = respond(Some(Path::new("label.png")), &engine);
        assert_eq!(code, 0);
        assert_eq!(resp.to_json(), r#"{"raw_text":"Tuerca M10\n67890"}"#);
    }

    #[test]
    fn engine_failure_is_reported_in_body() {
        let engine = EngineHandle::new(Box::new(Reads(Err(()))));
        let (resp, code) = respond(Some(Path::new("label.png")), &engine);
        assert_eq!(code, 0);
        assert_eq!(resp.raw_text, "");
        assert!(resp.error.unwrap().contains("timed out"));
    }
}
