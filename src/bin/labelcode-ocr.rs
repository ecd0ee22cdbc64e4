use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

use labelcode::config::load_or_default;
use labelcode::ocr::{build_engine, EngineKind};
use labelcode::wire::{respond, WireResponse};

/// Recognize one image and print `{"raw_text": ...}` on stdout.
#[derive(Parser, Debug)]
#[command(name = "labelcode-ocr", version)]
struct Args {
    /// Image to recognize
    image: Option<PathBuf>,

    /// OCR backend
    #[arg(long, value_enum, default_value_t = Engine::Easyocr)]
    engine: Engine,

    /// JSON config whose `engines` section overrides the defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Engine {
    Easyocr,
    Tesseract,
}

impl From<Engine> for EngineKind {
    fn from(e: Engine) -> Self {
        match e {
            Engine::Easyocr => EngineKind::Easyocr,
            Engine::Tesseract => EngineKind::Tesseract,
        }
    }
}

/// Bad arguments still answer with one JSON object. Help and version output
/// are left to clap.
fn argument_error(e: clap::Error) -> Result<WireResponse, clap::Error> {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Err(e),
        _ => Ok(WireResponse::error(e.to_string().trim_end())),
    }
}

fn main() -> ExitCode {
    labelcode::init_tracing();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => match argument_error(e) {
            Ok(response) => {
                println!("{}", response.to_json());
                return ExitCode::FAILURE;
            }
            Err(e) => e.exit(),
        },
    };

    let config = match load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            println!("{}", WireResponse::error(format!("{e:#}")).to_json());
            return ExitCode::FAILURE;
        }
    };
    let engine = build_engine(&config.engines, args.engine.into());
    let (response, code) = respond(args.image.as_deref(), &engine);
    println!("{}", response.to_json());
    ExitCode::from(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("labelcode-ocr").chain(argv.iter().copied()))
    }

    #[test]
    fn unknown_flag_becomes_a_wire_error() {
        let response = argument_error(parse(&["label.png", "--engin", "x"]).unwrap_err()).unwrap();
        assert_eq!(response.raw_text, "");
        assert!(response.error.as_deref().unwrap().contains("--engin"));
        assert!(response.to_json().starts_with(r#"{"raw_text":"","error":"#));
    }

    #[test]
    fn unknown_engine_becomes_a_wire_error() {
        let response = argument_error(parse(&["label.png", "--engine", "paddle"]).unwrap_err()).unwrap();
        assert!(response.error.as_deref().unwrap().contains("paddle"));
    }

    #[test]
    fn help_and_version_are_left_to_clap() {
        for flag in ["--help", "--version"] {
            assert!(argument_error(parse(&[flag]).unwrap_err()).is_err(), "{flag}");
        }
    }

    #[test]
    fn image_is_optional_at_parse_time() {
        let args = parse(&[]).unwrap();
        assert!(args.image.is_none());
        assert!(matches!(args.engine, Engine::Easyocr));
    }
}
