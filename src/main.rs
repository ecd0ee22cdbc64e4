use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

use labelcode::config::{load_or_default, save_config, HarnessConfig};
use labelcode::fixture::render::LabelPainter;
use labelcode::fixture::{Fixture, FixtureHarness, Tier};
use labelcode::ocr::{EngineKind, EngineSet};
use labelcode::processor::{evaluate_all, save_csv};

#[derive(Parser, Debug)]
#[command(name = "labelcode")]
#[command(version, about = "Multi-engine OCR evaluation for printed product-code labels", long_about = None)]
struct Cli {
    /// JSON config; built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Fixture root directory
    #[arg(short, long, global = true, default_value = "test_images")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render label fixtures
    Generate {
        /// Tiers to produce
        #[arg(short, long, value_enum, default_values_t = vec![TierArg::Basic, TierArg::Advanced])]
        tier: Vec<TierArg>,
    },

    /// List fixtures already on disk as JSON
    Catalog,

    /// Check that every cataloged fixture exists and decodes
    Validate,

    /// Report which OCR engines are available
    Engines {
        #[arg(short, long, value_enum, default_values_t = vec![EngineArg::Tesseract, EngineArg::Easyocr])]
        engine: Vec<EngineArg>,
    },

    /// Run engines over the cataloged fixtures and summarize matches
    Evaluate {
        #[arg(short, long, value_enum, default_values_t = vec![EngineArg::Tesseract, EngineArg::Easyocr])]
        engine: Vec<EngineArg>,

        /// Only evaluate these tiers
        #[arg(short, long, value_enum)]
        tier: Vec<TierArg>,

        /// Write per-unit rows to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Print the full report as JSON instead of the summary table
        #[arg(long)]
        json: bool,
    },

    /// Write the effective configuration to a file
    InitConfig {
        out: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum TierArg {
    Basic,
    Advanced,
    RealWorld,
}

impl From<TierArg> for Tier {
    fn from(t: TierArg) -> Self {
        match t {
            TierArg::Basic => Tier::Basic,
            TierArg::Advanced => Tier::Advanced,
            TierArg::RealWorld => Tier::RealWorld,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum EngineArg {
    Tesseract,
    Easyocr,
}

impl From<EngineArg> for EngineKind {
    fn from(e: EngineArg) -> Self {
        match e {
            EngineArg::Tesseract => EngineKind::Tesseract,
            EngineArg::Easyocr => EngineKind::Easyocr,
        }
    }
}

fn main() -> ExitCode {
    labelcode::init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_or_default(cli.config.as_deref())?;
    let harness = FixtureHarness::from_config(&cli.dir, &config);

    match cli.command {
        Commands::Generate { tier } => {
            let tiers: Vec<Tier> = tier.into_iter().map(Tier::from).collect();
            let fixtures = harness
                .generate(harness.products(), &tiers, &LabelPainter)
                .context("label generation failed")?;
            for t in Tier::ALL {
                let n = fixtures.iter().filter(|f| f.tier() == t).count();
                if n > 0 {
                    println!("{t:<11} {n}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Catalog => {
            let fixtures = harness.catalog()?;
            println!("{}", serde_json::to_string_pretty(&fixtures)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate => {
            let fixtures = harness.catalog()?;
            let mut failures = 0;
            for (fixture, check) in fixtures.iter().zip(FixtureHarness::validate(&fixtures)) {
                match check {
                    Ok(c) => println!(
                        "ok    {:<11} {}x{} {:>8} B  {}",
                        c.tier,
                        c.width,
                        c.height,
                        c.bytes,
                        c.image_path.display()
                    ),
                    Err(e) => {
                        failures += 1;
                        println!("FAIL  {:<11} {e}", fixture.tier());
                    }
                }
            }
            println!("{} fixtures, {failures} invalid", fixtures.len());
            Ok(if failures == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }

        Commands::Engines { engine } => {
            let engines = engine_set(&config, &engine);
            let mut available = 0;
            for handle in engines.iter() {
                match handle.probe() {
                    Ok(version) => {
                        available += 1;
                        println!("{:<10} available  {version}", handle.name());
                    }
                    Err(e) => println!("{:<10} missing    {e}", handle.name()),
                }
            }
            Ok(if available > 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }

        Commands::Evaluate { engine, tier, csv, json } => {
            let engines = engine_set(&config, &engine);
            if engines.is_empty() {
                bail!("no engines selected");
            }
            let fixtures = select_tiers(harness.catalog()?, &tier);
            if fixtures.is_empty() {
                warn!(dir = %cli.dir.display(), "no fixtures found; run `labelcode generate` first");
            }

            let report = evaluate_all(&engines, &fixtures);
            if let Some(path) = csv {
                save_csv(&path, &report.to_csv())?;
                info!(path = %path.display(), "csv written");
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.summary);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::InitConfig { out } => {
            save_config(&out, &config)?;
            info!(path = %out.display(), "config written");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn engine_set(config: &HarnessConfig, selected: &[EngineArg]) -> EngineSet {
    let kinds: Vec<EngineKind> = selected.iter().map(|e| EngineKind::from(*e)).collect();
    EngineSet::from_settings(&config.engines, &kinds)
}

fn select_tiers(fixtures: Vec<Fixture>, tiers: &[TierArg]) -> Vec<Fixture> {
    if tiers.is_empty() {
        return fixtures;
    }
    let wanted: Vec<Tier> = tiers.iter().map(|t| Tier::from(*t)).collect();
    fixtures.into_iter().filter(|f| wanted.contains(&f.tier())).collect()
}
