//! modelgate - operator CLI for the model registry
//!
//! ## Commands
//!
//! - `snapshot`: log a training run's metrics
//! - `register`: register a run as a new model version
//! - `promote`: promote a run if it beats production on a metric
//! - `transition` / `demote` / `reset`: manual stage changes and rollback
//! - `status` / `show`: inspect the registry
//! - `drift-report` / `metrics`: replay recorded traffic through the drift monitor

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use modelgate_core::{
    telemetry, write_drift_report_html, write_drift_report_json, DriftMonitor, FeatureVector,
    LifecycleConfig, MetricMap, MetricSnapshotStore, ModelRegistry, ModelVersion,
    Prediction, PromotionPolicy, ReferenceDistribution, RunId, Stage,
};
use modelgate_state::{SurrealHandle, SurrealVersionStore};

#[derive(Parser)]
#[command(name = "modelgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Model version registry, automatic promotion and drift monitoring",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "MODELGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Local database directory (overrides [storage].path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log the evaluation metrics of a training run
    Snapshot {
        /// Training run id
        run_id: String,

        /// Metric as name=value (repeatable)
        #[arg(short, long = "metric", value_parser = parse_metric, required = true)]
        metrics: Vec<(String, f64)>,
    },

    /// Register a training run as a new version of a model
    Register {
        /// Model name
        name: String,

        /// Training run id (generated if omitted)
        #[arg(long)]
        run_id: Option<String>,

        /// Metric as name=value (repeatable)
        #[arg(short, long = "metric", value_parser = parse_metric)]
        metrics: Vec<(String, f64)>,

        /// Take metrics from the run's logged snapshot instead of --metric
        #[arg(long, conflicts_with = "metrics")]
        from_snapshot: bool,
    },

    /// Promote a registered run if it beats the production version
    Promote {
        /// Training run id of the candidate
        run_id: String,

        /// Metric to compare (default: [promotion].metric)
        #[arg(long)]
        metric: Option<String>,

        /// Lower metric values are better (e.g. log loss)
        #[arg(long)]
        lower_is_better: bool,
    },

    /// Make a version the production version, archiving the current one
    Transition {
        /// Model name
        name: String,
        /// Version to promote
        version: u32,
    },

    /// Archive a version, taking it out of production if it serves
    Demote {
        /// Model name
        name: String,
        /// Version to archive
        version: u32,
    },

    /// Roll production back to a known-good version
    Reset {
        /// Model name
        name: String,
        /// Baseline version
        #[arg(long, default_value = "1")]
        version: u32,
    },

    /// List models with their versions and stages
    Status {
        /// Only this model
        name: Option<String>,
    },

    /// Show the version of a model in a stage
    Show {
        /// Model name
        name: String,
        /// Stage to look up
        #[arg(long, default_value = "production")]
        stage: Stage,
    },

    /// Replay recorded traffic and write a drift report
    DriftReport {
        /// Historical sample (JSON array of records)
        #[arg(long)]
        reference: PathBuf,

        /// Recorded traffic (JSON lines)
        #[arg(long)]
        traffic: PathBuf,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,

        /// Report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Html)]
        format: ReportFormat,
    },

    /// Replay recorded traffic and print the Prometheus exposition
    Metrics {
        /// Historical sample (JSON array of records)
        #[arg(long)]
        reference: PathBuf,

        /// Recorded traffic (JSON lines)
        #[arg(long)]
        traffic: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Html,
    Json,
}

/// One recorded prediction request.
#[derive(Debug, Deserialize)]
struct TrafficRecord {
    features: FeatureVector,
    /// Raw class label, 1 = no-show
    prediction: u8,
    #[serde(default)]
    latency_ms: f64,
    #[serde(default)]
    model_version: Option<String>,
}

type Store = SurrealVersionStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing(cli.json, telemetry::level_for(cli.verbose));

    let mut config =
        LifecycleConfig::resolve(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(db) = cli.db {
        config.storage.path = db;
    }
    let json = cli.json;

    match cli.command {
        Commands::DriftReport {
            reference,
            traffic,
            out,
            format,
        } => cmd_drift_report(&config, &reference, &traffic, &out, format, json),
        Commands::Metrics { reference, traffic } => cmd_metrics(&config, &reference, &traffic),
        command => {
            let store = open_store(&config).await?;
            run_registry_command(command, store, &config, json).await
        }
    }
}

async fn open_store(config: &LifecycleConfig) -> Result<Store> {
    let handle = SurrealHandle::from_env(&config.storage.path)
        .await
        .with_context(|| {
            format!(
                "Failed to open registry database at {}",
                config.storage.path.display()
            )
        })?;
    Ok(SurrealVersionStore::new(Arc::new(handle)))
}

async fn run_registry_command(
    command: Commands,
    store: Store,
    config: &LifecycleConfig,
    json: bool,
) -> Result<()> {
    let store = Arc::new(store);
    let registry = Arc::new(ModelRegistry::with_config(
        Arc::clone(&store),
        config.registry.clone(),
    ));

    match command {
        Commands::Snapshot { run_id, metrics } => {
            cmd_snapshot(store.as_ref(), &RunId::new(run_id), metrics, json).await
        }
        Commands::Register {
            name,
            run_id,
            metrics,
            from_snapshot,
        } => {
            let run_id = run_id.map(RunId::new).unwrap_or_else(RunId::generate);
            cmd_register(&registry, store.as_ref(), &name, &run_id, metrics, from_snapshot, json)
                .await
        }
        Commands::Promote {
            run_id,
            metric,
            lower_is_better,
        } => {
            let policy =
                PromotionPolicy::with_config(Arc::clone(&registry), config.promotion.clone());
            let metric = metric.unwrap_or_else(|| config.promotion.metric.clone());
            let higher_is_better = !lower_is_better && config.promotion.higher_is_better;
            cmd_promote(&policy, &RunId::new(run_id), &metric, higher_is_better, json).await
        }
        Commands::Transition { name, version } => {
            let t = registry
                .transition_to_production(&name, version)
                .await
                .context("transition failed")?;
            print_transition(&t.promoted, t.demoted.as_ref(), json)
        }
        Commands::Demote { name, version } => {
            let v = registry
                .demote(&name, version, Stage::Archived)
                .await
                .context("demote failed")?;
            emit(json, &v, || format!("{} v{} -> {}", v.name, v.version, v.stage))
        }
        Commands::Reset { name, version } => {
            let t = registry
                .reset_to_version(&name, version)
                .await
                .with_context(|| format!("reset of {name} to v{version} failed"))?;
            print_transition(&t.promoted, t.demoted.as_ref(), json)
        }
        Commands::Status { name } => cmd_status(&registry, name.as_deref(), json).await,
        Commands::Show { name, stage } => {
            let v = registry.get_by_stage(&name, stage).await?;
            emit(json, &v, || describe_version(&v))
        }
        Commands::DriftReport { .. } | Commands::Metrics { .. } => {
            bail!("drift commands do not use the registry")
        }
    }
}

// ---------------------------------------------------------------------------
// Registry commands
// ---------------------------------------------------------------------------

async fn cmd_snapshot(
    store: &Store,
    run_id: &RunId,
    metrics: Vec<(String, f64)>,
    json: bool,
) -> Result<()> {
    let snapshot = store
        .put_snapshot(run_id, metrics.into_iter().collect())
        .await
        .context("failed to store metric snapshot")?;
    emit(json, &snapshot, || {
        format!(
            "Logged {} metric(s) for run {}",
            snapshot.metrics.len(),
            snapshot.run_id
        )
    })
}

async fn cmd_register(
    registry: &ModelRegistry<Store>,
    store: &Store,
    name: &str,
    run_id: &RunId,
    metrics: Vec<(String, f64)>,
    from_snapshot: bool,
    json: bool,
) -> Result<()> {
    let registered = if from_snapshot {
        registry.register_from_snapshot(name, run_id, store).await
    } else {
        let metrics: MetricMap = metrics.into_iter().collect();
        registry.register(name, run_id, metrics).await
    };
    let version = registered.context("registration failed")?;

    info!(model = %version.name, version = version.version, "registered");
    emit(json, &version, || {
        format!(
            "Registered {} v{} (run {})",
            version.name, version.version, version.run_id
        )
    })
}

#[derive(Serialize)]
struct PromoteOutput<'a> {
    run_id: &'a str,
    metric: &'a str,
    higher_is_better: bool,
    promoted_version: Option<u32>,
}

async fn cmd_promote(
    policy: &PromotionPolicy<Store>,
    run_id: &RunId,
    metric: &str,
    higher_is_better: bool,
    json: bool,
) -> Result<()> {
    let promoted = policy
        .auto_promote_if_better(run_id, metric, higher_is_better)
        .await
        .with_context(|| format!("promotion of run {run_id} failed"))?;

    let out = PromoteOutput {
        run_id: run_id.as_str(),
        metric,
        higher_is_better,
        promoted_version: promoted,
    };
    emit(json, &out, || match promoted {
        Some(v) => format!("Promoted v{v} to Production"),
        None => format!("Run {run_id} did not beat production on {metric}; not promoted"),
    })
}

async fn cmd_status(registry: &ModelRegistry<Store>, name: Option<&str>, json: bool) -> Result<()> {
    let models = match name {
        Some(name) => vec![registry.model_status(name).await?],
        None => registry.status().await?,
    };

    emit(json, &models, || {
        if models.is_empty() {
            return "No registered models".to_string();
        }
        let mut out = String::new();
        for model in &models {
            out.push_str(&format!("Model: {}\n", model.name));
            for v in &model.versions {
                out.push_str(&format!("  {v}\n"));
            }
        }
        out.trim_end().to_string()
    })
}

fn print_transition(
    promoted: &ModelVersion,
    demoted: Option<&ModelVersion>,
    json: bool,
) -> Result<()> {
    #[derive(Serialize)]
    struct TransitionOutput<'a> {
        promoted: &'a ModelVersion,
        demoted: Option<&'a ModelVersion>,
    }

    emit(json, &TransitionOutput { promoted, demoted }, || match demoted {
        Some(d) => format!(
            "{} v{} -> Production (v{} archived)",
            promoted.name, promoted.version, d.version
        ),
        None => format!("{} v{} -> Production", promoted.name, promoted.version),
    })
}

fn describe_version(v: &ModelVersion) -> String {
    let metrics: Vec<String> = v.metrics.iter().map(|(k, m)| format!("{k}={m}")).collect();
    format!(
        "{} v{}\n  stage:   {}\n  run:     {}\n  created: {}\n  metrics: {}",
        v.name,
        v.version,
        v.stage,
        v.run_id,
        v.created_at.to_rfc3339(),
        metrics.join(", ")
    )
}

// ---------------------------------------------------------------------------
// Drift commands
// ---------------------------------------------------------------------------

fn build_monitor(
    config: &LifecycleConfig,
    reference: &Path,
    traffic: &Path,
) -> Result<DriftMonitor> {
    let reference =
        ReferenceDistribution::from_json_file(reference, config.drift.reference_sample_limit)
            .with_context(|| format!("failed to load reference sample {:?}", reference))?;
    let monitor = DriftMonitor::new(reference, config.drift.clone())?;

    for (i, record) in load_traffic(traffic)?.into_iter().enumerate() {
        let prediction = Prediction::from_label(record.prediction);
        let latency = latency_from_ms(record.latency_ms)
            .with_context(|| format!("traffic record {}", i + 1))?;
        match &record.model_version {
            Some(version) => {
                monitor.record_for_version(version, &record.features, prediction, latency)
            }
            None => monitor.record(&record.features, prediction, latency),
        }
    }
    Ok(monitor)
}

/// Negative latencies clamp to zero; values too large for a `Duration` are
/// rejected.
fn latency_from_ms(latency_ms: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(latency_ms.max(0.0) / 1000.0)
        .with_context(|| format!("latency_ms {latency_ms} is out of range"))
}

fn load_traffic(path: &Path) -> Result<Vec<TrafficRecord>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    parse_traffic(&raw).with_context(|| format!("parse {:?}", path))
}

fn parse_traffic(raw: &str) -> Result<Vec<TrafficRecord>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", i + 1))
        })
        .collect()
}

fn cmd_drift_report(
    config: &LifecycleConfig,
    reference: &Path,
    traffic: &Path,
    out: &Path,
    format: ReportFormat,
    json: bool,
) -> Result<()> {
    let monitor = build_monitor(config, reference, traffic)?;
    let report = monitor.generate_report();

    match format {
        ReportFormat::Html => write_drift_report_html(out, &report)?,
        ReportFormat::Json => write_drift_report_json(out, &report)?,
    }

    let high: Vec<&str> = report.high_drift().map(|f| f.feature.as_str()).collect();
    emit(json, &report, || {
        let mut text = format!(
            "Wrote drift report for {} sample(s) to {}",
            report.buffered_samples,
            out.display()
        );
        if !high.is_empty() {
            text.push_str(&format!("\nHigh drift: {}", high.join(", ")));
        }
        text
    })
}

fn cmd_metrics(config: &LifecycleConfig, reference: &Path, traffic: &Path) -> Result<()> {
    let monitor = build_monitor(config, reference, traffic)?;
    monitor.compute_drift();
    print!("{}", monitor.exporter().render()?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn emit<T, F>(json: bool, value: &T, text: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce() -> String,
{
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(value).context("serialize output")?
        );
    } else {
        println!("{}", text());
    }
    Ok(())
}

/// Parse `name=value` into a metric pair.
fn parse_metric(raw: &str) -> std::result::Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("metric name is empty in '{raw}'"));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("metric value for '{name}' is not a number"))?;
    if !value.is_finite() {
        return Err(format!("metric value for '{name}' is not finite"));
    }
    Ok((name.to_string(), value))
}
