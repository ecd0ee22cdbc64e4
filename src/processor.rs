use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::evaluate::{evaluate_fixture, MatchOutcome};
use crate::fixture::{Fixture, Tier};
use crate::ocr::EngineSet;

/// What happened to one (fixture, engine) unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Evaluated(MatchOutcome),
    EngineError { message: String },
    FixtureError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Matched,
    Missed,
    EngineError,
    FixtureError,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Matched => "matched",
            Category::Missed => "missed",
            Category::EngineError => "engine_error",
            Category::FixtureError => "fixture_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitResult {
    pub fixture: PathBuf,
    pub tier: Tier,
    pub engine_id: String,
    pub outcome: Outcome,
}

impl UnitResult {
    pub fn category(&self) -> Category {
        match &self.outcome {
            Outcome::Evaluated(m) if m.matched() => Category::Matched,
            Outcome::Evaluated(_) => Category::Missed,
            Outcome::EngineError { .. } => Category::EngineError,
            Outcome::FixtureError { .. } => Category::FixtureError,
        }
    }
}

/// Per-category counts. Engine and fixture errors are infrastructure
/// failures and never count as misses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub matched: usize,
    pub missed: usize,
    pub engine_errors: usize,
    pub fixture_errors: usize,
}

impl Counts {
    fn add(&mut self, category: Category) {
        match category {
            Category::Matched => self.matched += 1,
            Category::Missed => self.missed += 1,
            Category::EngineError => self.engine_errors += 1,
            Category::FixtureError => self.fixture_errors += 1,
        }
    }

    pub fn infrastructure(&self) -> usize {
        self.engine_errors + self.fixture_errors
    }

    pub fn total(&self) -> usize {
        self.matched + self.missed + self.infrastructure()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub overall: Counts,
    pub per_engine: BTreeMap<String, Counts>,
}

impl Summary {
    pub fn from_units(units: &[UnitResult]) -> Self {
        let mut summary = Summary::default();
        for unit in units {
            let category = unit.category();
            summary.overall.add(category);
            summary
                .per_engine
                .entry(unit.engine_id.clone())
                .or_default()
                .add(category);
        }
        summary
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = |f: &mut fmt::Formatter<'_>, label: &str, c: &Counts| {
            writeln!(
                f,
                "{label:<12} {:>4} units  {:>4} matched  {:>4} no match  {:>4} infrastructure ({} engine, {} fixture)",
                c.total(),
                c.matched,
                c.missed,
                c.infrastructure(),
                c.engine_errors,
                c.fixture_errors,
            )
        };
        for (engine, counts) in &self.per_engine {
            line(f, engine, counts)?;
        }
        line(f, "total", &self.overall)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub units: Vec<UnitResult>,
    pub summary: Summary,
}

impl Report {
    pub fn new(units: Vec<UnitResult>) -> Self {
        let summary = Summary::from_units(&units);
        Self { units, summary }
    }

    /// One row per unit.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from(
            "fixture,tier,engine,category,expected_code,extracted_candidate,mean_confidence,reason,raw_text\n",
        );
        for u in &self.units {
            let (expected, candidate, confidence, reason, raw) = match &u.outcome {
                Outcome::Evaluated(m) => (
                    m.expected_code(),
                    m.extracted_candidate(),
                    format!("{:.4}", m.mean_confidence()),
                    m.reason(),
                    m.raw_text(),
                ),
                Outcome::EngineError { message } | Outcome::FixtureError { message } => {
                    ("", "", String::new(), message.as_str(), "")
                }
            };
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{}\n",
                csv_field(&u.fixture.display().to_string()),
                u.tier,
                csv_field(&u.engine_id),
                u.category().as_str(),
                csv_field(expected),
                csv_field(candidate),
                confidence,
                csv_field(reason),
                csv_field(raw),
            ));
        }
        csv
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write CSV content to the given path, creating parent directories if needed.
pub fn save_csv(path: &Path, csv: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Cannot create directories")?;
    }
    fs::write(path, csv).with_context(|| format!("Cannot write {}", path.display()))
}

// ── Batch runner ─────────────────────────────────────────────────────────────

/// Run every engine on every fixture.
///
/// Units run in parallel but are reported in (fixture, engine) order. A
/// fixture that fails verification yields one `FixtureError` per engine
/// without invoking any engine.
pub fn evaluate_all(engines: &EngineSet, fixtures: &[Fixture]) -> Report {
    info!(fixtures = fixtures.len(), engines = engines.len(), "evaluation started");

    let units: Vec<UnitResult> = fixtures
        .par_iter()
        .flat_map_iter(|fixture| {
            let verified = fixture.verify();
            if let Err(e) = &verified {
                warn!(fixture = %fixture.image_path().display(), "fixture unusable: {e}");
            }
            engines.iter().map(move |engine| {
                let outcome = match &verified {
                    Err(e) => Outcome::FixtureError { message: e.to_string() },
                    Ok(_) => match engine.run(fixture.image_path()) {
                        Ok(result) => Outcome::Evaluated(evaluate_fixture(fixture, &result)),
                        Err(e) => Outcome::EngineError { message: e.to_string() },
                    },
                };
                let unit = UnitResult {
                    fixture: fixture.image_path().to_path_buf(),
                    tier: fixture.tier(),
                    engine_id: engine.name().to_string(),
                    outcome,
                };
                debug!(
                    fixture = %unit.fixture.display(),
                    engine = %unit.engine_id,
                    category = unit.category().as_str(),
                    "unit finished"
                );
                unit
            })
        })
        .collect();

    let report = Report::new(units);
    info!(
        matched = report.summary.overall.matched,
        missed = report.summary.overall.missed,
        infrastructure = report.summary.overall.infrastructure(),
        "evaluation finished"
    );
    report
}
