use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Infrastructure failure while running an OCR engine.
///
/// Distinct from "the engine ran and found nothing", which is an empty
/// `RawOutput`.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("{engine}: engine unavailable: {reason}")]
    Unavailable { engine: String, reason: String },

    #[error("{engine}: engine exited with {status}: {stderr}")]
    Failed {
        engine: String,
        status: String,
        stderr: String,
    },

    #[error("{engine}: timed out after {after:?}")]
    Timeout { engine: String, after: Duration },

    #[error("{engine}: cannot decode engine output: {reason}")]
    Decode { engine: String, reason: String },

    #[error("{engine}: IO error: {source}")]
    Io {
        engine: String,
        #[source]
        source: std::io::Error,
    },
}

impl AdapterError {
    pub fn engine(&self) -> &str {
        match self {
            AdapterError::Unavailable { engine, .. }
            | AdapterError::Failed { engine, .. }
            | AdapterError::Timeout { engine, .. }
            | AdapterError::Decode { engine, .. }
            | AdapterError::Io { engine, .. } => engine,
        }
    }
}

/// A cataloged fixture cannot be used for evaluation.
#[derive(Error, Debug)]
pub enum FixtureIntegrityError {
    #[error("fixture image not found: {0}")]
    Missing(PathBuf),

    #[error("fixture image {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid product code {code:?}: {reason}")]
    InvalidCode { code: String, reason: &'static str },

    #[error("unrecognized fixture filename: {0}")]
    UnknownFilename(String),

    #[error("invalid variant name {0:?}: only ASCII letters, digits, '_' and '-' are allowed")]
    InvalidVariant(String),

    #[error("duplicate {what} {name:?}: fixture image paths must be unique")]
    Duplicate { what: &'static str, name: String },

    #[error("real-world entry {0} collides with a generated fixture path")]
    ManifestCollision(PathBuf),

    #[error("cannot read fixture directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Label rendering failure.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("cannot load font {path}: {reason}")]
    Font { path: PathBuf, reason: String },

    #[error("built-in glyphs cannot draw {0:?}; configure a font file")]
    UnsupportedGlyph(char),

    #[error("invalid background colour {0:?}")]
    Colour(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Fixture(#[from] FixtureIntegrityError),
}
