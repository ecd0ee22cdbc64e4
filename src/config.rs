use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fixture::catalog::validate_variant_name;
use crate::fixture::{
    check_unique_paths, default_products, default_variants, validate_code, FontTable, FontVariant, Product,
};
use crate::ocr::JoinPolicy;

/// A photograph listed by hand, with the alternate readings that still count
/// as a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealWorldEntry {
    /// Relative to the fixture root.
    pub file: PathBuf,
    pub expected_code: String,
    #[serde(default)]
    pub acceptable_variations: Vec<String>,
}

fn default_real_world() -> Vec<RealWorldEntry> {
    vec![RealWorldEntry {
        file: PathBuf::from("variants/danowind.jpeg"),
        expected_code: "100002".to_string(),
        acceptable_variations: ["100 002", "10000210566", "100002", "100 002 10566"]
            .into_iter()
            .map(String::from)
            .collect(),
    }]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractSettings {
    pub binary: PathBuf,
    /// ISO 639-1 codes; mapped to tesseract's traineddata names.
    pub languages: Vec<String>,
    pub psm: Option<u8>,
    pub timeout_secs: u64,
    /// Overrides the engine's historical space join.
    pub join: Option<JoinPolicy>,
}

impl Default for TesseractSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            languages: vec!["es".into(), "en".into()],
            psm: None,
            timeout_secs: 10,
            join: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EasyOcrSettings {
    pub python: PathBuf,
    pub script: PathBuf,
    pub languages: Vec<String>,
    pub gpu: bool,
    /// First use downloads models, so this is generous.
    pub timeout_secs: u64,
    /// Overrides the engine's historical newline join.
    pub join: Option<JoinPolicy>,
}

impl Default for EasyOcrSettings {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python3"),
            script: PathBuf::from("scripts/easyocr_detect.py"),
            languages: vec!["en".into(), "es".into()],
            gpu: false,
            timeout_secs: 120,
            join: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub tesseract: TesseractSettings,
    pub easyocr: EasyOcrSettings,
}

/// Everything the harness and the engines read. Absent keys take defaults, so
/// an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub products: Vec<Product>,
    /// Font key used for basic labels.
    pub basic_font: String,
    pub variants: Vec<FontVariant>,
    pub fonts: FontTable,
    pub real_world: Vec<RealWorldEntry>,
    pub engines: EngineSettings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            products: default_products(),
            basic_font: "sans".to_string(),
            variants: default_variants(),
            fonts: FontTable::default(),
            real_world: default_real_world(),
            engines: EngineSettings::default(),
        }
    }
}

impl HarnessConfig {
    /// Reject codes and variant names that cannot round-trip through fixture
    /// filenames, and anything that would give two fixtures one path. Call once
    /// after deserialization.
    pub fn check(&self) -> Result<()> {
        for product in &self.products {
            validate_code(&product.code).with_context(|| format!("product {:?}", product.name))?;
        }
        for variant in &self.variants {
            validate_variant_name(&variant.name)?;
            if !self.fonts.0.contains_key(&variant.font) {
                warn!(variant = %variant.name, font = %variant.font, "font key not in font table");
            }
        }
        for entry in &self.real_world {
            validate_code(&entry.expected_code)
                .with_context(|| format!("real-world entry {}", entry.file.display()))?;
        }
        check_unique_paths(&self.products, &self.variants, &self.real_world)?;
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let cfg: HarnessConfig =
        serde_json::from_str(&text).with_context(|| format!("Parse error in {}", path.display()))?;
    cfg.check()?;
    Ok(cfg)
}

pub fn save_config(path: &Path, config: &HarnessConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Cannot create dirs")?;
    }
    let text = serde_json::to_string_pretty(config).context("Serialise error")?;
    fs::write(path, text).with_context(|| format!("Cannot write {}", path.display()))
}

/// Load `path` when given, otherwise the built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<HarnessConfig> {
    match path {
        Some(p) => load_config(p),
        None => Ok(HarnessConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_the_default_config() {
        let cfg: HarnessConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, HarnessConfig::default());
        assert_eq!(cfg.products.len(), 5);
        assert_eq!(cfg.variants.len(), 4);
        assert_eq!(cfg.real_world[0].expected_code, "100002");
    }

    #[test]
    fn partial_engine_settings_keep_other_defaults() {
        let cfg: HarnessConfig =
            serde_json::from_str(r#"{"engines": {"tesseract": {"psm": 7, "join": "newline"}}}"#).unwrap();
        assert_eq!(cfg.engines.tesseract.psm, Some(7));
        assert_eq!(cfg.engines.tesseract.join, Some(JoinPolicy::Newline));
        assert_eq!(cfg.engines.tesseract.timeout_secs, 10);
        assert_eq!(cfg.engines.easyocr, EasyOcrSettings::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("labelcode.json");
        let mut cfg = HarnessConfig::default();
        cfg.basic_font = "mono".into();
        save_config(&path, &cfg).unwrap();
        assert_eq!(load_config(&path).unwrap(), cfg);
    }

    #[test]
    fn rejects_codes_that_break_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r##"{"products": [{"code": "12_34", "name": "x", "price": "1", "background": "#000000", "part_type": "nut"}]}"##,
        )
        .unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("12_34"), "{err:#}");
    }

    fn load_json(json: &str) -> Result<HarnessConfig> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labelcode.json");
        fs::write(&path, json).unwrap();
        load_config(&path)
    }

    #[test]
    fn rejects_repeated_product_codes() {
        let err = load_json(
            r##"{"products": [
                {"code": "12345", "name": "Tornillo", "price": "0.50", "background": "#FFFFFF", "part_type": "screw"},
                {"code": "12345", "name": "Tuerca", "price": "0.20", "background": "#F0F0F0", "part_type": "nut"}
            ]}"##,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("duplicate product code \"12345\""), "{err:#}");
    }

    #[test]
    fn rejects_repeated_variant_names() {
        let err = load_json(
            r#"{"variants": [
                {"name": "white_bold", "font": "sans-bold"},
                {"name": "white_bold", "font": "serif"}
            ]}"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("duplicate variant name \"white_bold\""), "{err:#}");
    }

    #[test]
    fn rejects_photographs_named_like_generated_labels() {
        let basic = HarnessConfig {
            real_world: vec![RealWorldEntry {
                file: PathBuf::from("product_12345.png"),
                expected_code: "12345".into(),
                acceptable_variations: vec![],
            }],
            ..HarnessConfig::default()
        };
        let err = basic.check().unwrap_err();
        assert!(err.to_string().contains("product_12345.png"), "{err:#}");

        let mut advanced = basic.clone();
        advanced.real_world[0].file = PathBuf::from("variants/12345_white_modern.png");
        assert!(advanced.check().is_err());

        advanced.real_world[0].file = PathBuf::from("variants/12345_shelf.jpeg");
        assert!(advanced.check().is_ok());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_config(Path::new("/nonexistent/labelcode.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/labelcode.json"));
    }

    #[test]
    fn no_path_means_defaults() {
        assert_eq!(load_or_default(None).unwrap(), HarnessConfig::default());
    }
}
