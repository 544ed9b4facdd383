//! TLX CLI - Command-line interface for Synheart TLX
//!
//! Commands:
//! - baselines: Majority and logistic-regression baselines under LOUO
//! - search: Grouped hyperparameter search for the forest pipeline
//! - train: Fit the final forest pipeline (optionally after a search) and evaluate it
//! - evaluate: Evaluate a saved pipeline under LOUO
//! - importances: Export feature importances of a saved pipeline

use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use synheart_tlx::aggregate::LouoReport;
use synheart_tlx::config::StudyConfig;
use synheart_tlx::dataset::Dataset;
use synheart_tlx::pipeline::{
    run_baselines, search_forest, train_and_evaluate, write_baselines, EvaluationMode,
    SearchOptions, TrainOptions, FOREST_MODEL_NAME,
};
use synheart_tlx::report::{ReportWriter, RunManifest, BEST_PARAMS_FILE, MODEL_FILE};
use synheart_tlx::types::{FeatureImportance, Metric};
use synheart_tlx::{evaluate_prefit, EvalError, FittedPipeline, PRODUCER_NAME, VERSION};

/// TLX - Leave-one-user-out workload classification
#[derive(Parser)]
#[command(name = "tlx")]
#[command(author = "Synheart AI Inc")]
#[command(version = VERSION)]
#[command(about = "Evaluate NASA-TLX workload classifiers under leave-one-user-out", long_about = None)]
struct Cli {
    /// Study configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory (overrides the configuration)
    #[arg(short, long, global = true)]
    outdir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate majority and logistic-regression baselines
    Baselines {
        /// Modeling table (CSV)
        #[arg(long)]
        csv: PathBuf,
    },

    /// Run the grouped hyperparameter search
    Search {
        /// Modeling table (CSV)
        #[arg(long)]
        csv: PathBuf,

        /// Worker threads (0 = all cores)
        #[arg(long)]
        n_jobs: Option<usize>,
    },

    /// Fit the final pipeline on all rows and evaluate it
    Train {
        /// Modeling table (CSV)
        #[arg(long)]
        csv: PathBuf,

        /// Run the grouped search before fitting
        #[arg(long)]
        do_search: bool,

        /// Worker threads for the search (0 = all cores)
        #[arg(long)]
        n_jobs: Option<usize>,

        /// Refit inside every fold instead of scoring the final model
        #[arg(long)]
        refit_eval: bool,
    },

    /// Evaluate a saved pipeline under LOUO
    Evaluate {
        /// Modeling table (CSV)
        #[arg(long)]
        csv: PathBuf,

        /// Saved pipeline (JSON)
        #[arg(long)]
        model: PathBuf,
    },

    /// Export feature importances of a saved pipeline
    Importances {
        /// Modeling table (CSV), used for feature names
        #[arg(long)]
        csv: PathBuf,

        /// Saved pipeline (JSON)
        #[arg(long)]
        model: PathBuf,

        /// Number of top features to print
        #[arg(long, default_value = "10")]
        top: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("synheart_tlx={level}").parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), TlxCliError> {
    let mut config = match &cli.config {
        Some(path) => StudyConfig::load_from_path(path)?,
        None => StudyConfig::from_env()?,
    };
    if let Some(outdir) = cli.outdir {
        config.output.dir = outdir;
    }

    match cli.command {
        Commands::Baselines { csv } => cmd_baselines(&config, &csv),
        Commands::Search { csv, n_jobs } => {
            if let Some(n) = n_jobs {
                config.search.n_jobs = n;
            }
            cmd_search(&config, &csv)
        }
        Commands::Train {
            csv,
            do_search,
            n_jobs,
            refit_eval,
        } => {
            config.search.enabled |= do_search;
            if let Some(n) = n_jobs {
                config.search.n_jobs = n;
            }
            cmd_train(&config, &csv, refit_eval)
        }
        Commands::Evaluate { csv, model } => cmd_evaluate(&config, &csv, &model),
        Commands::Importances { csv, model, top } => cmd_importances(&config, &csv, &model, top),
    }
}

fn load_dataset(config: &StudyConfig, csv: &Path) -> Result<Dataset, TlxCliError> {
    let dataset = Dataset::from_csv_path(csv, &config.columns)?;
    info!(
        path = %csv.display(),
        rows = dataset.n_rows(),
        features = dataset.feature_names().len(),
        groups = dataset.n_groups(),
        "loaded modeling table"
    );
    Ok(dataset)
}

fn load_model(path: &Path) -> Result<FittedPipeline, TlxCliError> {
    let json = fs::read_to_string(path)?;
    Ok(FittedPipeline::from_json(&json)?)
}

fn cmd_baselines(config: &StudyConfig, csv: &Path) -> Result<(), TlxCliError> {
    let dataset = load_dataset(config, csv)?;
    let reports = run_baselines(&dataset, &config.logistic)?;

    let mut writer = ReportWriter::new(&config.output.dir)?;
    write_baselines(&reports, &mut writer)?;
    writer.manifest(RunManifest::new("baselines", &dataset))?;

    print_summary(&reports.majority);
    print_summary(&reports.logistic);
    Ok(())
}

fn cmd_search(config: &StudyConfig, csv: &Path) -> Result<(), TlxCliError> {
    let dataset = load_dataset(config, csv)?;
    let options = SearchOptions {
        grid: config.search.grid.clone(),
        n_jobs: config.search.n_jobs,
    };
    let (model, summary) = search_forest(&dataset, &options, config.forest.seed)?;

    let mut writer = ReportWriter::new(&config.output.dir)?;
    writer.json(BEST_PARAMS_FILE, &summary.best)?;
    writer.json("rf_search_results.json", &summary.candidates)?;
    writer.json(MODEL_FILE, &model)?;
    writer.manifest(RunManifest::new("search", &dataset))?;

    println!("{}", serde_json::to_string_pretty(&summary.best)?);
    Ok(())
}

fn cmd_train(config: &StudyConfig, csv: &Path, refit_eval: bool) -> Result<(), TlxCliError> {
    let dataset = load_dataset(config, csv)?;
    let mut options = TrainOptions::from_config(config);
    if refit_eval {
        options.evaluation = EvaluationMode::Refit;
    }
    let study = train_and_evaluate(&dataset, &options)?;

    let mut writer = ReportWriter::new(&config.output.dir)?;
    study.write(&mut writer)?;
    writer.manifest(RunManifest::new("train", &dataset))?;

    print_summary(&study.evaluation);
    Ok(())
}

fn cmd_evaluate(config: &StudyConfig, csv: &Path, model_path: &Path) -> Result<(), TlxCliError> {
    let dataset = load_dataset(config, csv)?;
    let model = load_model(model_path)?;
    check_feature_count(&model, &dataset)?;
    let report = evaluate_prefit(&model, FOREST_MODEL_NAME, &dataset)?;
    let importances = model.feature_importances(dataset.feature_names())?;

    let mut writer = ReportWriter::new(&config.output.dir)?;
    writer.louo_report("rf", &report)?;
    writer.misclassifications("rf", &report)?;
    writer.feature_importances(&importances)?;
    writer.manifest(RunManifest::new("evaluate", &dataset))?;

    print_summary(&report);
    Ok(())
}

fn cmd_importances(
    config: &StudyConfig,
    csv: &Path,
    model_path: &Path,
    top: usize,
) -> Result<(), TlxCliError> {
    let dataset = load_dataset(config, csv)?;
    let model = load_model(model_path)?;
    check_feature_count(&model, &dataset)?;
    let importances = model.feature_importances(dataset.feature_names())?;

    let mut writer = ReportWriter::new(&config.output.dir)?;
    writer.feature_importances(&importances)?;

    print_importances(&importances[..top.min(importances.len())])?;
    Ok(())
}

fn check_feature_count(model: &FittedPipeline, dataset: &Dataset) -> Result<(), TlxCliError> {
    let n = dataset.feature_names().len();
    if model.n_features() != n {
        return Err(TlxCliError::ModelMismatch {
            expected: model.n_features(),
            found: n,
        });
    }
    Ok(())
}

// Output

fn print_summary(report: &LouoReport) {
    if atty::is(atty::Stream::Stdout) {
        println!(
            "{} ({} folds, {} fallback)",
            report.model,
            report.n_folds(),
            report.fallback_folds.len()
        );
        for metric in Metric::ALL {
            let stats = report.summary.stats(metric);
            println!(
                "  {:<14} {:>7.4} ± {:.4}",
                metric.as_str(),
                stats.mean,
                stats.std
            );
        }
    } else {
        let line = serde_json::json!({
            "producer": PRODUCER_NAME,
            "model": report.model,
            "summary": report.summary,
            "fallback_folds": report.fallback_folds,
        });
        println!("{line}");
    }
}

fn print_importances(importances: &[FeatureImportance]) -> Result<(), TlxCliError> {
    if atty::is(atty::Stream::Stdout) {
        for fi in importances {
            println!("{:<40} {:.4}", fi.feature, fi.importance);
        }
    } else {
        println!("{}", serde_json::to_string(importances)?);
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum TlxCliError {
    Io(io::Error),
    Eval(EvalError),
    Json(serde_json::Error),
    ModelMismatch { expected: usize, found: usize },
}

impl From<io::Error> for TlxCliError {
    fn from(e: io::Error) -> Self {
        TlxCliError::Io(e)
    }
}

impl From<EvalError> for TlxCliError {
    fn from(e: EvalError) -> Self {
        TlxCliError::Eval(e)
    }
}

impl From<serde_json::Error> for TlxCliError {
    fn from(e: serde_json::Error) -> Self {
        TlxCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<TlxCliError> for CliError {
    fn from(e: TlxCliError) -> Self {
        match e {
            TlxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            TlxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check that the model file was written by 'tlx train'".to_string()),
            },
            TlxCliError::ModelMismatch { expected, found } => CliError {
                code: "MODEL_MISMATCH".to_string(),
                message: format!("model expects {expected} features, table has {found}"),
                hint: Some("Use the same column configuration as at training time".to_string()),
            },
            TlxCliError::Eval(e) => {
                let (code, hint) = match &e {
                    EvalError::Io(_) => ("IO_ERROR", Some("Check file paths and permissions")),
                    EvalError::CsvError(_) => ("CSV_ERROR", Some("Check the modeling table format")),
                    EvalError::JsonError(_) => ("JSON_ERROR", None),
                    EvalError::ConfigError(_) => ("CONFIG_ERROR", Some("Check the TOML configuration")),
                    EvalError::MissingColumn(_) => {
                        ("MISSING_COLUMN", Some("Set [columns] in the configuration"))
                    }
                    EvalError::InvalidLabel { .. } => {
                        ("INVALID_LABEL", Some("Target values must be 0/1 or true/false"))
                    }
                    EvalError::InsufficientGroups(_) => {
                        ("INSUFFICIENT_GROUPS", Some("LOUO needs at least two participants"))
                    }
                    EvalError::InvalidParameter { .. } => {
                        ("INVALID_PARAMETER", Some("Check [forest] and [search.grid] values"))
                    }
                    EvalError::SearchFailed => {
                        ("SEARCH_FAILED", Some("Every grid point failed; see the log for details"))
                    }
                    _ => ("EVAL_ERROR", None),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: hint.map(str::to_string),
                }
            }
        }
    }
}
