use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use super::process::run_with_timeout;
use super::{JoinPolicy, RawOutput, Recognizer};
use crate::error::AdapterError;

const ENGINE: &str = "tesseract";

/// TSV column holding the recognition level; words are level 5.
const WORD_LEVEL: &str = "5";
const TSV_COLUMNS: usize = 12;

/// Tesseract driven through its command-line interface in TSV mode, so every
/// recognized word arrives with its own confidence.
pub struct TesseractCli {
    pub binary: PathBuf,
    pub languages: Vec<String>,
    /// Page segmentation mode passed as `--psm`; Tesseract's default when unset.
    pub psm: Option<u8>,
    pub timeout: Duration,
}

impl Recognizer for TesseractCli {
    fn name(&self) -> &str {
        ENGINE
    }

    fn default_join_policy(&self) -> JoinPolicy {
        JoinPolicy::Space
    }

    fn recognize(&self, image: &Path) -> Result<RawOutput, AdapterError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(build_lang(&self.languages));
        if let Some(psm) = self.psm {
            cmd.arg("--psm").arg(psm.to_string());
        }
        cmd.arg("tsv");

        let out = run_with_timeout(ENGINE, cmd, self.timeout)?.check(ENGINE)?;
        let words = parse_tsv(&out.stdout_lossy())?;
        debug!(image = %image.display(), words = words.len(), "tesseract tsv parsed");
        Ok(RawOutput::Pairs(words))
    }

    fn probe(&self) -> Result<String, AdapterError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--version");
        let out = run_with_timeout(ENGINE, cmd, self.timeout)?.check(ENGINE)?;
        // Older releases print the banner on stderr.
        let text = if out.stdout.is_empty() {
            out.stderr_lossy()
        } else {
            out.stdout_lossy()
        };
        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }
}

/// Extract `(word, confidence)` pairs from Tesseract TSV output.
///
/// Confidence is reported on a 0–100 scale and converted to 0–1 here, before
/// [`normalize`](super::normalize), which passes confidences through as given.
/// Structural rows (page, block, paragraph, line) and empty words are skipped.
pub fn parse_tsv(tsv: &str) -> Result<Vec<(String, f64)>, AdapterError> {
    let mut words = Vec::new();
    for (n, line) in tsv.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with("level") {
            continue;
        }
        let fields: Vec<&str> = line.splitn(TSV_COLUMNS, '\t').collect();
        if fields.len() < TSV_COLUMNS - 1 {
            return Err(decode(format!(
                "line {}: expected {TSV_COLUMNS} columns, found {}",
                n + 1,
                fields.len()
            )));
        }
        if fields[0] != WORD_LEVEL {
            continue;
        }
        let conf: f64 = fields[10]
            .trim()
            .parse()
            .map_err(|_| decode(format!("line {}: bad confidence {:?}", n + 1, fields[10])))?;
        let text = fields.get(11).map(|t| t.trim()).unwrap_or_default();
        if conf < 0.0 || text.is_empty() {
            continue;
        }
        words.push((text.to_string(), (conf / 100.0).clamp(0.0, 1.0)));
    }
    Ok(words)
}

fn decode(reason: String) -> AdapterError {
    AdapterError::Decode {
        engine: ENGINE.to_string(),
        reason,
    }
}

/// Map ISO-639-1 codes to Tesseract language packs ("es", "en" → "spa+eng").
pub fn build_lang(languages: &[String]) -> String {
    if languages.is_empty() {
        return "spa+eng".to_string();
    }
    languages
        .iter()
        .map(|l| match l.trim() {
            "en" | "eng" => "eng",
            "es" | "spa" => "spa",
            "de" | "deu" => "deu",
            "fr" | "fra" => "fra",
            other => other,
        })
        .collect::<Vec<_>>()
        .join("+")
}
