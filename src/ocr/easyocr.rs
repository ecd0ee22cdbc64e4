use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::process::run_with_timeout;
use super::{JoinPolicy, RawOutput, Recognizer, Region};
use crate::error::AdapterError;

const ENGINE: &str = "easyocr";

/// EasyOCR reached through a small Python bridge script that prints the
/// reader's `(box, text, confidence)` triples as JSON.
pub struct EasyOcrBridge {
    pub python: PathBuf,
    pub script: PathBuf,
    pub languages: Vec<String>,
    pub gpu: bool,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct BridgeDetection {
    #[serde(rename = "box")]
    points: Vec<[f64; 2]>,
    text: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BridgeReply {
    Detections(Vec<BridgeDetection>),
    Error {
        error: String,
        #[serde(default)]
        kind: Option<String>,
    },
}

impl Recognizer for EasyOcrBridge {
    fn name(&self) -> &str {
        ENGINE
    }

    fn default_join_policy(&self) -> JoinPolicy {
        JoinPolicy::Newline
    }

    fn recognize(&self, image: &Path) -> Result<RawOutput, AdapterError> {
        if !self.script.exists() {
            return Err(AdapterError::Unavailable {
                engine: ENGINE.to_string(),
                reason: format!("bridge script {} not found", self.script.display()),
            });
        }

        let mut cmd = Command::new(&self.python);
        cmd.arg(&self.script)
            .arg(image)
            .arg("--langs")
            .arg(self.languages.join(","));
        if self.gpu {
            cmd.arg("--gpu");
        }

        let out = run_with_timeout(ENGINE, cmd, self.timeout)?;
        let stdout = out.stdout_lossy();
        // The bridge reports its own failures as JSON before exiting non-zero,
        // so try the payload first and fall back to the exit status.
        match serde_json::from_str::<BridgeReply>(stdout.trim()) {
            Ok(reply) => {
                let raw = reply_to_raw(reply)?;
                debug!(image = %image.display(), fragments = raw.len(), "easyocr bridge parsed");
                Ok(raw)
            }
            Err(e) => {
                out.check(ENGINE)?;
                Err(AdapterError::Decode {
                    engine: ENGINE.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn probe(&self) -> Result<String, AdapterError> {
        let mut cmd = Command::new(&self.python);
        cmd.arg("-c")
            .arg("import easyocr; print(easyocr.__version__)");
        let out = run_with_timeout(ENGINE, cmd, self.timeout)?;
        if !out.status.success() {
            return Err(AdapterError::Unavailable {
                engine: ENGINE.to_string(),
                reason: out.stderr_lossy().lines().last().unwrap_or_default().to_string(),
            });
        }
        Ok(format!("easyocr {}", out.stdout_lossy().trim()))
    }
}

/// Parse one bridge reply.
pub fn parse_reply(json: &str) -> Result<RawOutput, AdapterError> {
    let reply: BridgeReply = serde_json::from_str(json.trim()).map_err(|e| AdapterError::Decode {
        engine: ENGINE.to_string(),
        reason: e.to_string(),
    })?;
    reply_to_raw(reply)
}

fn reply_to_raw(reply: BridgeReply) -> Result<RawOutput, AdapterError> {
    match reply {
        BridgeReply::Detections(detections) => Ok(RawOutput::Regions(
            detections
                .into_iter()
                .map(|d| (Region { points: d.points }, d.text, d.confidence))
                .collect(),
        )),
        BridgeReply::Error { error, kind } if kind.as_deref() == Some("unavailable") => {
            Err(AdapterError::Unavailable {
                engine: ENGINE.to_string(),
                reason: error,
            })
        }
        BridgeReply::Error { error, .. } => Err(AdapterError::Failed {
            engine: ENGINE.to_string(),
            status: "bridge error".to_string(),
            stderr: error,
        }),
    }
}
