//! Filename codec for generated fixtures and the read-only catalog scan.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{validate_code, Fixture, FixtureHarness, Tier};
use crate::error::FixtureIntegrityError;

pub const VARIANTS_DIR: &str = "variants";
const BASIC_PREFIX: &str = "product_";
const EXTENSION: &str = ".png";

pub fn basic_file_name(code: &str) -> String {
    format!("{BASIC_PREFIX}{code}{EXTENSION}")
}

pub fn advanced_file_name(code: &str, variant: &str) -> String {
    format!("{code}_{variant}{EXTENSION}")
}

/// What a fixture's location says about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub code: String,
    pub tier: Tier,
    pub variant: Option<String>,
}

/// Decode a path relative to the fixture root: `product_{code}.png` is a
/// basic fixture, `variants/{code}_{variant}.png` an advanced one.
pub fn parse_relative_path(rel: &Path) -> Result<ParsedName, FixtureIntegrityError> {
    let unknown = || FixtureIntegrityError::UnknownFilename(rel.display().to_string());
    let name = rel.file_name().and_then(|n| n.to_str()).ok_or_else(unknown)?;
    let stem = name.strip_suffix(EXTENSION).ok_or_else(unknown)?;
    let parent = rel.parent().unwrap_or(Path::new(""));

    if parent == Path::new("") {
        let code = stem.strip_prefix(BASIC_PREFIX).ok_or_else(unknown)?;
        validate_code(code)?;
        return Ok(ParsedName {
            code: code.to_string(),
            tier: Tier::Basic,
            variant: None,
        });
    }

    if parent == Path::new(VARIANTS_DIR) {
        let (code, variant) = stem.split_once('_').ok_or_else(unknown)?;
        validate_code(code)?;
        validate_variant_name(variant)?;
        return Ok(ParsedName {
            code: code.to_string(),
            tier: Tier::Advanced,
            variant: Some(variant.to_string()),
        });
    }

    Err(unknown())
}

pub fn validate_variant_name(variant: &str) -> Result<(), FixtureIntegrityError> {
    let ok = !variant.is_empty()
        && variant
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(FixtureIntegrityError::InvalidVariant(variant.to_string()))
    }
}

impl FixtureHarness {
    /// Every fixture currently on disk plus the real-world manifest, without
    /// rendering anything. Order: basic, advanced, real-world; sorted by path
    /// within a tier.
    pub fn catalog(&self) -> Result<Vec<Fixture>, FixtureIntegrityError> {
        let real_world = self.real_world_fixtures()?;
        let manifest: HashSet<&Path> = real_world.iter().map(Fixture::image_path).collect();

        let mut fixtures = Vec::new();
        for dir in [self.root.clone(), self.root.join(VARIANTS_DIR)] {
            for path in list_pngs(&dir)? {
                if manifest.contains(path.as_path()) {
                    continue;
                }
                let Ok(rel) = path.strip_prefix(&self.root) else { continue };
                match parse_relative_path(rel) {
                    Ok(parsed) => {
                        fixtures.push(self.cataloged(path.clone(), parsed)?);
                    }
                    Err(e) => debug!(path = %path.display(), "skipping file: {e}"),
                }
            }
        }

        fixtures.extend(real_world);
        Ok(fixtures)
    }

    fn cataloged(&self, path: PathBuf, parsed: ParsedName) -> Result<Fixture, FixtureIntegrityError> {
        let params = match (parsed.tier, &parsed.variant) {
            (Tier::Basic, _) => self
                .products
                .iter()
                .find(|p| p.code == parsed.code)
                .map(|p| self.basic_params(p)),
            (Tier::Advanced, Some(name)) => self
                .variants
                .iter()
                .find(|v| &v.name == name)
                .map(|v| self.variant_params(v)),
            _ => None,
        };
        if params.is_none() {
            debug!(path = %path.display(), "no rendering parameters known for fixture");
        }
        Fixture::new(path, &parsed.code, parsed.tier, BTreeSet::new(), params)
    }
}

fn list_pngs(dir: &Path) -> Result<Vec<PathBuf>, FixtureIntegrityError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|source| FixtureIntegrityError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "png"))
        .collect();
    paths.sort();
    Ok(paths)
}
