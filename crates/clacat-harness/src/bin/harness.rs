//! CLI entrypoint for the clacat harness.

use std::path::PathBuf;
use std::sync::Arc;

use clacat_core::{
    AttackClass, Catalog, CoverageMode, FixedForge, GeneratorConfig, LabelSet, NullSink,
    VariantGenerator, evaluate, parse_seed,
};
use clacat_harness::structured_log::validate_log_file;
use clacat_harness::{CatalogRunner, HarnessError, LogEmitter, RunSummary};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;

/// Catalog tooling for cross-language attack primitives.
#[derive(Debug, Parser)]
#[command(name = "harness")]
#[command(about = "Generate, shadow-run and inspect the attack primitive catalog")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate the catalog and emit its persisted JSON form.
    Generate {
        /// Generator seed (decimal or 0x...). Overrides CLACAT_SEED.
        #[arg(long)]
        seed: Option<String>,
        /// Restrict output to one class (code, `classN` or name).
        #[arg(long, value_parser = parse_class, requires = "count")]
        class: Option<AttackClass>,
        /// Number of variants to generate for `--class`.
        #[arg(long, requires = "class")]
        count: Option<usize>,
        /// Only the first variants of each class.
        #[arg(long)]
        smoke: bool,
        /// Output path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Shadow-run every entry and check outcomes against classifications.
    Verify {
        /// Generator seed (decimal or 0x...). Overrides CLACAT_SEED.
        #[arg(long)]
        seed: Option<String>,
        /// Structured JSONL log path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Calls made to each forged-capability slot.
        #[arg(long, default_value_t = clacat_harness::runner::DEFAULT_CALLS)]
        calls: usize,
    },
    /// Print the returned-value sequence of a forged-capability entry.
    Replay {
        /// Catalog id, e.g. `forged-cb-11`.
        #[arg(long)]
        id: String,
        /// Generator seed (decimal or 0x...). Overrides CLACAT_SEED.
        #[arg(long)]
        seed: Option<String>,
        /// Number of calls.
        #[arg(long, default_value_t = 6)]
        calls: usize,
        /// Forged word supplied on every call (decimal or 0x...).
        #[arg(long)]
        forged: Option<String>,
    },
    /// Score predicted labels against a ground-truth label CSV.
    Evaluate {
        /// Ground-truth CSV (`function_name`, `attack_type` and/or `label`).
        #[arg(long)]
        truth: PathBuf,
        /// Predicted labels CSV. Defaults to the generated catalog's classes.
        #[arg(long)]
        predictions: Option<PathBuf>,
        /// Generator seed used when scoring the catalog.
        #[arg(long)]
        seed: Option<String>,
        /// JSON report path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a structured JSONL log against the schema.
    ValidateLog {
        /// Structured JSONL log path.
        #[arg(long)]
        log: PathBuf,
    },
}

fn parse_class(raw: &str) -> Result<AttackClass, String> {
    AttackClass::from_str_loose(raw).ok_or_else(|| format!("unknown attack class: {raw}"))
}

fn parse_word(raw: &str) -> Result<u64, Box<dyn std::error::Error>> {
    parse_seed(raw).ok_or_else(|| format!("invalid number: {raw}").into())
}

fn config_with_seed(seed: Option<&str>) -> Result<GeneratorConfig, Box<dyn std::error::Error>> {
    let config = GeneratorConfig::from_env();
    Ok(match seed {
        Some(raw) => config.with_seed(parse_word(raw)?),
        None => config,
    })
}

fn write_output(output: Option<PathBuf>, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            std::fs::write(&path, text)?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Generate {
            seed,
            class,
            count,
            smoke,
            output,
        } => {
            let mut config = config_with_seed(seed.as_deref())?;
            if smoke {
                config = config.with_coverage(CoverageMode::Smoke);
            }
            let catalog = match (class, count) {
                (Some(class), Some(count)) => {
                    let primitives = VariantGenerator::new(config).generate(class, count)?;
                    Catalog::from_primitives(config.seed, primitives)?
                }
                _ => Catalog::generate(config)?,
            };
            for (class, count) in catalog.class_counts() {
                eprintln!("  {class}: {count}");
            }
            write_output(output, &catalog.document().to_json()?)?;
        }
        Command::Verify { seed, log, calls } => {
            let config = config_with_seed(seed.as_deref())?;
            let catalog = Catalog::generate(config)?;
            let mut runner = CatalogRunner::new().with_calls(calls);
            if let Some(path) = &log {
                let run_id = format!("verify-{:016x}", config.seed);
                let emitter = LogEmitter::to_file(path, &run_id, "shadow")?;
                runner = runner.with_emitter(Arc::new(Mutex::new(emitter)));
            }
            let records = runner.run(&catalog, &mut FixedForge::default())?;
            for record in records.iter().filter(|r| !r.consistent) {
                if let Err(err) = record.check() {
                    eprintln!("FAIL {err}");
                }
            }
            let summary = RunSummary::from_records(&records);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if !summary.all_consistent() {
                return Err(HarnessError::Disagreements(summary.disagreements()).into());
            }
            eprintln!("All {} entries agree with their classification", summary.total);
        }
        Command::Replay {
            id,
            seed,
            calls,
            forged,
        } => {
            let config = config_with_seed(seed.as_deref())?;
            let catalog = Catalog::generate(config)?;
            let mut slot = catalog.callback(&id)?;
            let mut forge = match forged {
                Some(raw) => FixedForge(parse_word(&raw)?),
                None => FixedForge::default(),
            };
            for call in 1..=calls {
                let value = slot.invoke(&mut forge, &NullSink);
                println!("{call:>3}  0x{value:016x}");
            }
        }
        Command::Evaluate {
            truth,
            predictions,
            seed,
            output,
        } => {
            let expected = LabelSet::from_csv_path(&truth)?;
            let predicted = match predictions {
                Some(path) => LabelSet::from_csv_path(&path)?,
                None => LabelSet::from_catalog(&Catalog::generate(config_with_seed(
                    seed.as_deref(),
                )?)?),
            };
            let report = evaluate(&expected, &predicted);
            if report.evaluated == 0 {
                return Err(HarnessError::NoOverlap {
                    truth: truth.display().to_string(),
                }
                .into());
            }
            eprintln!(
                "Scored {} name(s), accuracy {:.4} ({} truth-only, {} prediction-only)",
                report.evaluated,
                report.accuracy,
                report.truth_only.len(),
                report.predicted_only.len()
            );
            for m in &report.classes {
                eprintln!(
                    "  {:<24} p={:.3} r={:.3} f1={:.3}",
                    m.class.to_string(),
                    m.precision,
                    m.recall,
                    m.f1
                );
            }
            eprint!("{}", report.confusion.render());
            write_output(output, &serde_json::to_string_pretty(&report)?)?;
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for err in &errors {
                eprintln!("{err}");
            }
            if !errors.is_empty() {
                return Err(HarnessError::LogSchema {
                    lines,
                    errors: errors.len(),
                }
                .into());
            }
            eprintln!("{} valid line(s) in {}", lines, log.display());
        }
    }

    Ok(())
}
