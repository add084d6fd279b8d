use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, Utc};
use clap::{Parser, Subcommand};
use gradecast_learning::{
    ingest, savor::read_header, GridProfile, LearningTelemetry, PredictPipeline, StudentRecord,
    TrainerConfig, TrainingPipeline,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::{read_records, JsonLogger, LogLevel, LogRecord};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "trn", version, about = "Exam score model training and inference")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Splits a raw student table into train/test CSV files.
    Ingest {
        #[arg(long)]
        raw: PathBuf,
        #[arg(long, default_value = "artifacts")]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 0.2)]
        test_ratio: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Tunes, ranks, and stacks the candidates, then publishes the artifacts.
    Train(TrainArgs),
    /// Predicts one math score from the published artifacts.
    Predict(PredictArgs),
    /// Lists most recent training runs.
    List {
        /// Number of entries to display.
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = "logs/runs/index.jsonl")]
        manifest: PathBuf,
    },
    /// Shows the manifest entry of a run.
    Status {
        run_id: String,
        #[arg(long, default_value = "logs/runs/index.jsonl")]
        manifest: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct TrainArgs {
    #[arg(long)]
    train: PathBuf,
    #[arg(long)]
    test: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    artifacts: Option<PathBuf>,
    /// Uses the reduced grids.
    #[arg(long)]
    compact: bool,
    /// Restricts the run to the named candidates; repeatable.
    #[arg(long = "only")]
    candidates: Vec<String>,
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
    #[arg(long, default_value = "logs/runs/index.jsonl")]
    manifest: PathBuf,
}

#[derive(Parser, Debug)]
struct PredictArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    artifacts: Option<PathBuf>,
    #[arg(long)]
    gender: String,
    #[arg(long)]
    race_ethnicity: String,
    #[arg(long)]
    parental_level_of_education: String,
    #[arg(long)]
    lunch: String,
    #[arg(long)]
    test_preparation_course: String,
    #[arg(long)]
    writing_score: f64,
    #[arg(long)]
    reading_score: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct RunManifestEntry {
    run_id: String,
    submitted_at: DateTime<Utc>,
    train: PathBuf,
    test: PathBuf,
    artifacts_dir: PathBuf,
    log_path: PathBuf,
    status: String,
    #[serde(default)]
    final_r2: Option<f64>,
}

impl RunManifestEntry {
    fn new(args: &TrainArgs, config: &TrainerConfig, log_path: PathBuf) -> Self {
        Self {
            run_id: format!("run-{}", Uuid::new_v4()),
            submitted_at: Utc::now(),
            train: args.train.clone(),
            test: args.test.clone(),
            artifacts_dir: config.artifacts_dir.clone(),
            log_path,
            status: "pending".into(),
            final_r2: None,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest {
            raw,
            out_dir,
            test_ratio,
            seed,
        } => {
            let output = ingest(&raw, &out_dir, test_ratio, seed)
                .with_context(|| format!("ingesting {}", raw.display()))?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Commands::Train(args) => handle_train(&args),
        Commands::Predict(args) => handle_predict(args),
        Commands::List { limit, manifest } => {
            let entries = read_manifest(&manifest)?;
            for entry in entries.into_iter().rev().take(limit) {
                let r2 = entry
                    .final_r2
                    .map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
                println!(
                    "{} | {} | {} | r2={r2} | {}",
                    entry.run_id,
                    entry.status,
                    entry.submitted_at,
                    entry.artifacts_dir.display()
                );
            }
            Ok(())
        }
        Commands::Status { run_id, manifest } => {
            let entries = read_manifest(&manifest)?;
            if let Some(entry) = entries.into_iter().find(|e| e.run_id == run_id) {
                println!("{}", serde_json::to_string_pretty(&status_summary(&entry)?)?);
            } else {
                println!("run {run_id} not found");
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>, artifacts: Option<&PathBuf>) -> Result<TrainerConfig> {
    let mut config = match path {
        Some(path) => TrainerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrainerConfig::default(),
    };
    if let Some(dir) = artifacts {
        config = config.with_artifacts_dir(dir);
    }
    Ok(config)
}

fn handle_train(args: &TrainArgs) -> Result<()> {
    anyhow::ensure!(args.train.exists(), "train file {} not found", args.train.display());
    anyhow::ensure!(args.test.exists(), "test file {} not found", args.test.display());
    let mut config = load_config(args.config.as_deref(), args.artifacts.as_ref())?;
    if args.compact {
        config = config.with_grid(GridProfile::Compact);
    }

    let log_path = compute_log_path(&args.log_dir)?;
    let entry = RunManifestEntry::new(args, &config, log_path.clone());
    append_manifest(&args.manifest, &entry)?;
    log_run_event(
        &log_path,
        LogLevel::Info,
        "run queued",
        json!({ "run_id": entry.run_id, "grid": config.grid }),
    )?;

    let telemetry = LearningTelemetry::builder("learning")
        .log_path(&log_path)
        .build()
        .context("building telemetry")?;
    update_status(&args.manifest, &entry.run_id, "running", None)?;

    let result = build_pipeline(config, &args.candidates)
        .and_then(|pipeline| pipeline.with_telemetry(telemetry).run(&args.train, &args.test));
    match result {
        Ok(outcome) => {
            update_status(
                &args.manifest,
                &entry.run_id,
                "completed",
                Some(outcome.final_r2()),
            )?;
            log_run_event(
                &log_path,
                LogLevel::Info,
                "run completed",
                json!({ "run_id": entry.run_id, "final_r2": outcome.final_r2() }),
            )?;
            let summary = json!({
                "run_id": entry.run_id,
                "final_r2": outcome.final_r2(),
                "ranking": outcome
                    .report
                    .candidates
                    .iter()
                    .map(|c| {
                        json!({ "rank": c.rank, "name": c.name, "test_r2": c.metrics.test_r2 })
                    })
                    .collect::<Vec<_>>(),
                "excluded": outcome.report.excluded,
                "artifacts": outcome.paths,
                "log_path": log_path,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(err) => {
            update_status(&args.manifest, &entry.run_id, "failed", None)?;
            log_run_event(
                &log_path,
                LogLevel::Error,
                "run failed",
                json!({ "run_id": entry.run_id, "stage": err.stage(), "error": err.to_string() }),
            )?;
            Err(err).with_context(|| format!("training run {}", entry.run_id))
        }
    }
}

fn build_pipeline(
    config: TrainerConfig,
    candidates: &[String],
) -> gradecast_learning::Result<TrainingPipeline> {
    let pipeline = TrainingPipeline::new(config)?;
    if candidates.is_empty() {
        return Ok(pipeline);
    }
    let mut registry = pipeline.registry().clone();
    registry.retain(candidates)?;
    pipeline.with_registry(registry)
}

/// Manifest entry plus the published report header and the last log record, when present.
fn status_summary(entry: &RunManifestEntry) -> Result<Value> {
    let report_path = TrainerConfig::default()
        .with_artifacts_dir(&entry.artifacts_dir)
        .report_path();
    let report = if report_path.exists() {
        Some(read_header(&report_path).context("reading report header")?)
    } else {
        None
    };
    let last_record = if entry.log_path.exists() {
        read_records(&entry.log_path)?.pop()
    } else {
        None
    };
    Ok(json!({
        "run": entry,
        "report": report,
        "last_log": last_record,
    }))
}

fn handle_predict(args: PredictArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), args.artifacts.as_ref())?;
    let pipeline = PredictPipeline::load(&config).context("loading artifacts")?;
    let record = StudentRecord {
        gender: Some(args.gender),
        race_ethnicity: Some(args.race_ethnicity),
        parental_level_of_education: Some(args.parental_level_of_education),
        lunch: Some(args.lunch),
        test_preparation_course: Some(args.test_preparation_course),
        reading_score: Some(args.reading_score),
        writing_score: Some(args.writing_score),
    };
    let prediction = pipeline.predict_one(&record).context("predicting")?;
    let out_of_range = prediction.is_out_of_range(pipeline.threshold());
    if out_of_range {
        eprintln!(
            "warning: predicted score {:.2} exceeds {}",
            prediction.score,
            pipeline.threshold()
        );
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "score": prediction.score,
            "out_of_range": out_of_range,
        }))?
    );
    Ok(())
}

fn append_manifest(path: &Path, entry: &RunManifestEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening manifest {}", path.display()))?;
    serde_json::to_writer(&mut file, entry)?;
    file.write_all(b"\n")?;
    Ok(())
}

fn read_manifest(path: &Path) -> Result<Vec<RunManifestEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: RunManifestEntry = serde_json::from_str(&line)
            .with_context(|| format!("parsing manifest {}", path.display()))?;
        entries.push(entry);
    }
    Ok(entries)
}

fn compute_log_path(base: &Path) -> Result<PathBuf> {
    let now = Local::now();
    let dir = base
        .join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()));
    fs::create_dir_all(&dir).with_context(|| format!("creating log dir {}", dir.display()))?;
    Ok(dir.join(format!(
        "run-{}.log.jsonl",
        Utc::now().format("%Y%m%d-%H%M%S")
    )))
}

fn update_status(path: &Path, run_id: &str, status: &str, final_r2: Option<f64>) -> Result<()> {
    let mut entries = read_manifest(path)?;
    let mut changed = false;
    for entry in &mut entries {
        if entry.run_id == run_id {
            entry.status = status.to_string();
            if final_r2.is_some() {
                entry.final_r2 = final_r2;
            }
            changed = true;
        }
    }
    if !changed {
        return Ok(());
    }
    let mut file = File::create(path)?;
    for entry in entries {
        serde_json::to_writer(&mut file, &entry)?;
        file.write_all(b"\n")?;
    }
    Ok(())
}

fn log_run_event(path: &Path, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
    let logger = JsonLogger::new(path)?;
    let record = LogRecord::new("trn", level, message)
        .with_stage("run")
        .with_metadata(metadata);
    logger.log(&record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(run_id: &str) -> RunManifestEntry {
        RunManifestEntry {
            run_id: run_id.into(),
            submitted_at: Utc::now(),
            train: "train.csv".into(),
            test: "test.csv".into(),
            artifacts_dir: "artifacts".into(),
            log_path: "logs/run.log.jsonl".into(),
            status: "pending".into(),
            final_r2: None,
        }
    }

    #[test]
    fn manifest_tracks_status_transitions() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("runs/index.jsonl");
        append_manifest(&manifest, &entry("run-a")).unwrap();
        append_manifest(&manifest, &entry("run-b")).unwrap();
        update_status(&manifest, "run-b", "running", None).unwrap();
        update_status(&manifest, "run-b", "completed", Some(0.87)).unwrap();
        update_status(&manifest, "run-missing", "failed", None).unwrap();
        let entries = read_manifest(&manifest).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, "pending");
        assert_eq!(entries[1].status, "completed");
        assert_eq!(entries[1].final_r2, Some(0.87));
    }

    #[test]
    fn status_includes_report_header_and_last_log() {
        use gradecast_learning::{
            savor::save_artifact, synthetic::student_frame, FeatureTransformer,
        };

        let dir = tempdir().unwrap();
        let mut run = entry("run-c");
        run.artifacts_dir = dir.path().join("artifacts");
        run.log_path = dir.path().join("logs/run.log.jsonl");

        let summary = status_summary(&run).unwrap();
        assert!(summary["report"].is_null());
        assert!(summary["last_log"].is_null());

        let state = FeatureTransformer::default()
            .fit(&student_frame(30, 1))
            .unwrap();
        let report_path = TrainerConfig::default()
            .with_artifacts_dir(&run.artifacts_dir)
            .report_path();
        save_artifact(&state, &report_path).unwrap();
        log_run_event(&run.log_path, LogLevel::Info, "run queued", json!({})).unwrap();
        log_run_event(&run.log_path, LogLevel::Info, "run completed", json!({})).unwrap();

        let summary = status_summary(&run).unwrap();
        assert_eq!(summary["report"]["format"], "gradecast-artifact");
        assert_eq!(summary["last_log"]["message"], "run completed");
        assert_eq!(summary["run"]["run_id"], "run-c");
    }

    #[test]
    fn only_flag_restricts_registry() {
        let config = TrainerConfig::default().with_grid(GridProfile::Compact);
        let pipeline = build_pipeline(config.clone(), &["Ridge".into(), "SVR".into()]).unwrap();
        let names: Vec<&str> = pipeline.registry().names().collect();
        assert_eq!(names, ["SVR", "Ridge"]);
        assert_eq!(build_pipeline(config.clone(), &[]).unwrap().registry().len(), 10);
        assert!(build_pipeline(config, &["Nope".into()]).is_err());
    }

    #[test]
    fn missing_manifest_reads_empty() {
        let dir = tempdir().unwrap();
        assert!(read_manifest(&dir.path().join("absent.jsonl"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn cli_parses_predict_arguments() {
        let cli = Cli::try_parse_from([
            "trn",
            "predict",
            "--gender",
            "female",
            "--race-ethnicity",
            "group B",
            "--parental-level-of-education",
            "bachelor's degree",
            "--lunch",
            "standard",
            "--test-preparation-course",
            "none",
            "--writing-score",
            "72",
            "--reading-score",
            "70",
        ])
        .unwrap();
        match cli.command {
            Commands::Predict(args) => {
                assert_eq!(args.race_ethnicity, "group B");
                assert!((args.reading_score - 70.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
