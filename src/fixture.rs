pub mod catalog;
pub mod render;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{HarnessConfig, RealWorldEntry};
use crate::error::{FixtureIntegrityError, RenderError};

use self::catalog::{advanced_file_name, basic_file_name, validate_variant_name, VARIANTS_DIR};
use self::render::LabelRenderer;

// ── Catalog types ────────────────────────────────────────────────────────────

/// Fidelity class of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Basic,
    Advanced,
    RealWorld,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Basic, Tier::Advanced, Tier::RealWorld];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Basic => "basic",
            Tier::Advanced => "advanced",
            Tier::RealWorld => "real_world",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hardware category; selects the decorative pattern on advanced labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartType {
    Screw,
    Washer,
    Nut,
    Bearing,
    Cable,
}

/// One catalog entry to print labels for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub code: String,
    pub name: String,
    pub price: String,
    /// Background of the basic label, `#RRGGBB`.
    pub background: String,
    pub part_type: PartType,
}

impl Product {
    pub fn new(code: &str, name: &str, price: &str, background: &str, part_type: PartType) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            price: price.to_string(),
            background: background.to_string(),
            part_type,
        }
    }
}

/// The products every tier is generated from.
pub fn default_products() -> Vec<Product> {
    vec![
        Product::new("12345", "Tornillo M8x20", "0.50", "#FF6B6B", PartType::Screw),
        Product::new("54321", "Arandela de nylon", "2.50", "#4ECDC4", PartType::Washer),
        Product::new("67890", "Tuerca M10", "0.75", "#45B7D1", PartType::Nut),
        Product::new("11111", "Rodamiento 6203", "15.99", "#F7B731", PartType::Bearing),
        Product::new("22222", "Cable acero", "1.20", "#95E1D3", PartType::Cable),
    ]
}

/// A named font/style combination for the advanced tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontVariant {
    /// Filename suffix, e.g. `white_modern`.
    pub name: String,
    /// Key into the [`FontTable`].
    pub font: String,
}

impl FontVariant {
    pub fn new(name: &str, font: &str) -> Self {
        Self {
            name: name.to_string(),
            font: font.to_string(),
        }
    }
}

/// Bold sans, serif, monospace and bold monospace.
pub fn default_variants() -> Vec<FontVariant> {
    vec![
        FontVariant::new("white_modern", "sans-bold"),
        FontVariant::new("white_classic", "serif"),
        FontVariant::new("white_monospace", "mono"),
        FontVariant::new("white_mono_bold", "mono-bold"),
    ]
}

// ── Font resolution ──────────────────────────────────────────────────────────

/// Candidate font files per font key, tried in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FontTable(pub BTreeMap<String, Vec<PathBuf>>);

impl Default for FontTable {
    fn default() -> Self {
        let entries: [(&str, &[&str]); 5] = [
            (
                "sans",
                &[
                    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
                    "/usr/share/fonts/TTF/DejaVuSans.ttf",
                    "/System/Library/Fonts/Helvetica.ttc",
                ],
            ),
            (
                "sans-bold",
                &[
                    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
                    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
                    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
                ],
            ),
            (
                "serif",
                &[
                    "/usr/share/fonts/truetype/dejavu/DejaVuSerif.ttf",
                    "/usr/share/fonts/TTF/DejaVuSerif.ttf",
                    "/System/Library/Fonts/Supplemental/Times New Roman.ttf",
                ],
            ),
            (
                "mono",
                &[
                    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
                    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
                    "/System/Library/Fonts/Supplemental/Courier New.ttf",
                ],
            ),
            (
                "mono-bold",
                &[
                    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono-Bold.ttf",
                    "/usr/share/fonts/TTF/DejaVuSansMono-Bold.ttf",
                    "/System/Library/Fonts/Supplemental/Courier New Bold.ttf",
                ],
            ),
        ];
        FontTable(
            entries
                .iter()
                .map(|(key, paths)| (key.to_string(), paths.iter().map(PathBuf::from).collect()))
                .collect(),
        )
    }
}

impl FontTable {
    /// Pick the first existing file for every key.
    pub fn resolve(&self) -> ResolvedFonts {
        ResolvedFonts(
            self.0
                .iter()
                .map(|(key, candidates)| {
                    let found = candidates.iter().find(|p| p.is_file()).cloned();
                    (key.clone(), found)
                })
                .collect(),
        )
    }
}

/// Outcome of [`FontTable::resolve`]: key → font file, or `None` when no
/// candidate exists on this machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedFonts(pub BTreeMap<String, Option<PathBuf>>);

impl ResolvedFonts {
    pub fn resolution(&self, key: &str) -> FontResolution {
        match self.0.get(key) {
            Some(Some(path)) => FontResolution::File(path.clone()),
            _ => FontResolution::Builtin,
        }
    }
}

/// Which face actually drew a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum FontResolution {
    File(PathBuf),
    /// Built-in segment glyphs (digits, `-`, `.`); secondary text is omitted.
    Builtin,
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Background {
    Solid { colour: String },
    Textured { colour: String },
}

/// How a synthetic fixture was drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderingParams {
    pub variant: Option<String>,
    pub font_key: String,
    pub font: FontResolution,
    pub background: Background,
}

/// A labeled test image plus its ground truth. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fixture {
    image_path: PathBuf,
    expected_code: String,
    acceptable_variations: BTreeSet<String>,
    tier: Tier,
    rendering_params: Option<RenderingParams>,
}

impl Fixture {
    pub(crate) fn new(
        image_path: PathBuf,
        expected_code: &str,
        tier: Tier,
        acceptable_variations: BTreeSet<String>,
        rendering_params: Option<RenderingParams>,
    ) -> Result<Self, FixtureIntegrityError> {
        validate_code(expected_code)?;
        Ok(Self {
            image_path,
            expected_code: expected_code.to_string(),
            acceptable_variations,
            tier,
            rendering_params,
        })
    }

    pub fn synthetic(
        image_path: PathBuf,
        expected_code: &str,
        tier: Tier,
        rendering_params: RenderingParams,
    ) -> Result<Self, FixtureIntegrityError> {
        Self::new(image_path, expected_code, tier, BTreeSet::new(), Some(rendering_params))
    }

    pub fn real_world<I, S>(
        image_path: PathBuf,
        expected_code: &str,
        variations: I,
    ) -> Result<Self, FixtureIntegrityError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let variations = variations.into_iter().map(Into::into).collect();
        Self::new(image_path, expected_code, Tier::RealWorld, variations, None)
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn expected_code(&self) -> &str {
        &self.expected_code
    }

    pub fn acceptable_variations(&self) -> &BTreeSet<String> {
        &self.acceptable_variations
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// `None` for photographs and for files on disk whose variant is no
    /// longer configured.
    pub fn rendering_params(&self) -> Option<&RenderingParams> {
        self.rendering_params.as_ref()
    }

    /// Confirm the image exists and decodes; returns its dimensions.
    pub fn verify(&self) -> Result<(u32, u32), FixtureIntegrityError> {
        if !self.image_path.is_file() {
            return Err(FixtureIntegrityError::Missing(self.image_path.clone()));
        }
        image::image_dimensions(&self.image_path).map_err(|source| FixtureIntegrityError::Unreadable {
            path: self.image_path.clone(),
            source,
        })
    }
}

/// Codes are non-empty ASCII letters, digits and hyphens. `_` is reserved as
/// the filename separator.
pub fn validate_code(code: &str) -> Result<(), FixtureIntegrityError> {
    let invalid = |reason| FixtureIntegrityError::InvalidCode {
        code: code.to_string(),
        reason,
    };
    if code.is_empty() {
        return Err(invalid("code is empty"));
    }
    if !code.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid("code has no letters or digits"));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid("only ASCII letters, digits and '-' are allowed"));
    }
    Ok(())
}

/// Each fixture is identified by its image path, so product codes and variant
/// names must be unique and no manifest entry may shadow a generated file.
pub fn check_unique_paths(
    products: &[Product],
    variants: &[FontVariant],
    real_world: &[RealWorldEntry],
) -> Result<(), FixtureIntegrityError> {
    let duplicate = |what, name: &str| FixtureIntegrityError::Duplicate {
        what,
        name: name.to_string(),
    };
    let mut codes = HashSet::new();
    if let Some(p) = products.iter().find(|p| !codes.insert(p.code.as_str())) {
        return Err(duplicate("product code", &p.code));
    }
    let mut names = HashSet::new();
    if let Some(v) = variants.iter().find(|v| !names.insert(v.name.as_str())) {
        return Err(duplicate("variant name", &v.name));
    }

    let mut generated: HashSet<PathBuf> = HashSet::new();
    for product in products {
        generated.insert(PathBuf::from(basic_file_name(&product.code)));
        for variant in variants {
            generated.insert(Path::new(VARIANTS_DIR).join(advanced_file_name(&product.code, &variant.name)));
        }
    }
    let mut manifest: HashSet<&Path> = HashSet::new();
    for entry in real_world {
        if generated.contains(&entry.file) {
            return Err(FixtureIntegrityError::ManifestCollision(entry.file.clone()));
        }
        if !manifest.insert(entry.file.as_path()) {
            return Err(duplicate("real-world file", &entry.file.display().to_string()));
        }
    }
    Ok(())
}

// ── Harness ──────────────────────────────────────────────────────────────────

/// Generates and catalogs fixtures under one root directory.
///
/// Basic labels live at `<root>/product_{code}.png`, advanced labels at
/// `<root>/variants/{code}_{variant}.png`; real-world photographs are listed
/// in the manifest relative to `<root>`.
pub struct FixtureHarness {
    root: PathBuf,
    products: Vec<Product>,
    basic_font: String,
    variants: Vec<FontVariant>,
    fonts: ResolvedFonts,
    real_world: Vec<RealWorldEntry>,
}

/// Per-file result of [`FixtureHarness::validate`].
#[derive(Debug, Clone, Serialize)]
pub struct ImageCheck {
    pub image_path: PathBuf,
    pub tier: Tier,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
}

impl FixtureHarness {
    pub fn from_config(root: impl Into<PathBuf>, config: &HarnessConfig) -> Self {
        let fonts = config.fonts.resolve();
        for (key, path) in &fonts.0 {
            match path {
                Some(p) => info!(font = %key, path = %p.display(), "font resolved"),
                None => warn!(font = %key, "no font file found, built-in glyphs will be used"),
            }
        }
        Self {
            root: root.into(),
            products: config.products.clone(),
            basic_font: config.basic_font.clone(),
            variants: config.variants.clone(),
            fonts,
            real_world: config.real_world.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn variants(&self) -> &[FontVariant] {
        &self.variants
    }

    pub fn fonts(&self) -> &ResolvedFonts {
        &self.fonts
    }

    fn basic_params(&self, product: &Product) -> RenderingParams {
        RenderingParams {
            variant: None,
            font_key: self.basic_font.clone(),
            font: self.fonts.resolution(&self.basic_font),
            background: Background::Solid {
                colour: product.background.clone(),
            },
        }
    }

    fn variant_params(&self, variant: &FontVariant) -> RenderingParams {
        RenderingParams {
            variant: Some(variant.name.clone()),
            font_key: variant.font.clone(),
            font: self.fonts.resolution(&variant.font),
            background: Background::Textured {
                colour: render::ADVANCED_BACKGROUND.to_string(),
            },
        }
    }

    /// Render the requested tiers for `products` and return their fixtures,
    /// basic first, then advanced (product-major), then real-world.
    ///
    /// Real-world fixtures are not rendered, only cataloged from the manifest.
    pub fn generate(
        &self,
        products: &[Product],
        tiers: &[Tier],
        renderer: &dyn LabelRenderer,
    ) -> Result<Vec<Fixture>, RenderError> {
        check_unique_paths(products, &self.variants, &self.real_world)?;
        let mut jobs: Vec<(&Product, Fixture)> = Vec::new();

        if tiers.contains(&Tier::Basic) {
            fs::create_dir_all(&self.root)?;
            for product in products {
                let path = self.root.join(basic_file_name(&product.code));
                let fixture = Fixture::synthetic(path, &product.code, Tier::Basic, self.basic_params(product))?;
                jobs.push((product, fixture));
            }
        }
        if tiers.contains(&Tier::Advanced) {
            fs::create_dir_all(self.root.join(VARIANTS_DIR))?;
            for variant in &self.variants {
                validate_variant_name(&variant.name)?;
            }
            for product in products {
                for variant in &self.variants {
                    let path = self
                        .root
                        .join(VARIANTS_DIR)
                        .join(advanced_file_name(&product.code, &variant.name));
                    let fixture =
                        Fixture::synthetic(path, &product.code, Tier::Advanced, self.variant_params(variant))?;
                    jobs.push((product, fixture));
                }
            }
        }

        let mut fixtures: Vec<Fixture> = jobs
            .into_par_iter()
            .map(|(product, fixture)| {
                if let Some(params) = &fixture.rendering_params {
                    renderer.render(product, params, &fixture.image_path)?;
                    info!(
                        path = %fixture.image_path.display(),
                        tier = %fixture.tier,
                        font = ?params.font,
                        "label rendered"
                    );
                }
                Ok(fixture)
            })
            .collect::<Result<_, RenderError>>()?;

        if tiers.contains(&Tier::RealWorld) {
            fixtures.extend(self.real_world_fixtures()?);
        }
        Ok(fixtures)
    }

    /// Fixtures from the real-world manifest. Files are not checked here.
    pub fn real_world_fixtures(&self) -> Result<Vec<Fixture>, FixtureIntegrityError> {
        self.real_world
            .iter()
            .map(|entry| {
                Fixture::real_world(
                    self.root.join(&entry.file),
                    &entry.expected_code,
                    entry.acceptable_variations.iter().cloned(),
                )
            })
            .collect()
    }

    /// Check every fixture file. Failures are reported per file.
    pub fn validate(fixtures: &[Fixture]) -> Vec<Result<ImageCheck, FixtureIntegrityError>> {
        fixtures
            .par_iter()
            .map(|f| -> Result<ImageCheck, FixtureIntegrityError> {
                let (width, height) = f.verify()?;
                let bytes = fs::metadata(&f.image_path).map(|m| m.len()).unwrap_or(0);
                Ok(ImageCheck {
                    image_path: f.image_path.clone(),
                    tier: f.tier,
                    width,
                    height,
                    bytes,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_digit_and_alphanumeric_codes() {
        assert!(validate_code("12345").is_ok());
        assert!(validate_code("AB-1234").is_ok());
    }

    #[test]
    fn rejects_bad_codes() {
        for code in ["", "-", "12_34", "12 34", "12€"] {
            assert!(validate_code(code).is_err(), "{code:?} should be rejected");
        }
    }

    #[test]
    fn unresolved_fonts_fall_back_to_builtin_explicitly() {
        let mut table = BTreeMap::new();
        table.insert("sans".to_string(), vec![PathBuf::from("/nonexistent/font.ttf")]);
        let resolved = FontTable(table).resolve();
        assert_eq!(resolved.0.get("sans"), Some(&None));
        assert_eq!(resolved.resolution("sans"), FontResolution::Builtin);
        assert_eq!(resolved.resolution("unknown"), FontResolution::Builtin);
    }

    #[test]
    fn default_variants_cover_required_styles() {
        let fonts: Vec<_> = default_variants().into_iter().map(|v| v.font).collect();
        assert_eq!(fonts, vec!["sans-bold", "serif", "mono", "mono-bold"]);
    }

    #[test]
    fn generate_refuses_products_sharing_a_code() {
        let dir = tempfile::tempdir().unwrap();
        let harness = FixtureHarness::from_config(dir.path(), &HarnessConfig::default());
        let products = vec![
            Product::new("12345", "Tornillo M8x20", "0.50", "#FF6B6B", PartType::Screw),
            Product::new("12345", "Tuerca M10", "0.20", "#4ECDC4", PartType::Nut),
        ];
        let err = harness
            .generate(&products, &[Tier::Basic, Tier::Advanced], &render::LabelPainter)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::Fixture(FixtureIntegrityError::Duplicate { what: "product code", .. })
        ));
        assert!(!dir.path().join(basic_file_name("12345")).exists());
    }

    #[test]
    fn verify_reports_missing_file() {
        let f = Fixture::real_world(PathBuf::from("/nonexistent/danowind.jpeg"), "100002", ["100 002"]).unwrap();
        assert!(matches!(f.verify(), Err(FixtureIntegrityError::Missing(_))));
    }

    #[test]
    fn verify_reports_undecodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("product_12345.png");
        fs::write(&path, b"not a png").unwrap();
        let f = Fixture::real_world(path, "12345", Vec::<String>::new()).unwrap();
        assert!(matches!(f.verify(), Err(FixtureIntegrityError::Unreadable { .. })));
    }
}
