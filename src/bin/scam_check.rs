use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use scam_checker_lib::models::{ClassificationRequest, ContentKind, EnsembleVerdict, ModelSummary};
use scam_checker_lib::services::config_store::{AppConfig, ConfigStore};
use scam_checker_lib::services::detection::{EnsembleClassifier, ANALYSIS_FAILED_MESSAGE};
use scam_checker_lib::services::media::{load_request, MediaOverrides};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "scam_check")]
#[command(author, version, about = "Classify text, images or audio as scam or not with a two-model ensemble")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the verdict as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Give up on the whole analysis after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Accept a verdict from one model when the other fails
    #[arg(long, global = true)]
    allow_single_model: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a message
    Text {
        /// Message body
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        body: Option<String>,

        /// Read the message from a UTF-8 file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Analyze a screenshot or photo
    Image {
        path: PathBuf,

        /// MIME type (detected from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,
    },

    /// Analyze a call recording or voicemail
    Audio {
        path: PathBuf,

        /// MIME type (detected from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,

        /// Duration in seconds (read from WAV headers when omitted)
        #[arg(long)]
        duration: Option<f64>,
    },
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let store = match path {
        Some(p) => ConfigStore::at_file(p.to_path_buf()),
        None => match ConfigStore::default_config_dir() {
            Some(dir) => ConfigStore::new(dir),
            None => return Ok(AppConfig::default()),
        },
    };

    let config = store
        .load()
        .with_context(|| format!("loading {}", store.config_file().display()))?;
    info!("[CLI] Loaded config from {}", store.config_file().display());
    Ok(config)
}

async fn build_request(command: &Commands) -> Result<ClassificationRequest> {
    let request = match command {
        Commands::Text { body: Some(body), .. } => ClassificationRequest::text(body.clone()),
        Commands::Text { file: Some(file), .. } => {
            load_request(file, ContentKind::Text, &MediaOverrides::default()).await?
        }
        Commands::Text { .. } => return Err(anyhow!("no message given")),
        Commands::Image { path, mime } => {
            let overrides = MediaOverrides {
                mime_type: mime.clone(),
                duration_seconds: None,
            };
            load_request(path, ContentKind::Image, &overrides).await?
        }
        Commands::Audio {
            path,
            mime,
            duration,
        } => {
            let overrides = MediaOverrides {
                mime_type: mime.clone(),
                duration_seconds: *duration,
            };
            load_request(path, ContentKind::Audio, &overrides).await?
        }
    };
    Ok(request)
}

async fn run(cli: &Cli) -> Result<EnsembleVerdict> {
    let mut config = load_config(cli.config.as_deref())?;
    config.apply_env_overrides();
    if cli.allow_single_model {
        config.ensemble.single_model_fallback = true;
    }

    let classifier = EnsembleClassifier::from_config(&config)?;
    let request = build_request(&cli.command).await?;

    let verdict = match cli.timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), classifier.analyze(&request))
            .await
            .map_err(|_| anyhow!("analysis timed out after {}s", secs))??,
        None => classifier.analyze(&request).await?,
    };

    Ok(verdict)
}

fn summary_line(label: &str, summary: &ModelSummary) -> String {
    match &summary.error {
        Some(err) => format!("  {} ({}): failed, {}", label, summary.model_id, err),
        None => format!(
            "  {} ({}): {}, confidence {:.2}{}",
            label,
            summary.model_id,
            if summary.is_scam { "scam" } else { "not a scam" },
            summary.confidence,
            summary
                .latency_ms
                .map(|ms| format!(", {}ms", ms))
                .unwrap_or_default()
        ),
    }
}

fn print_verdict(verdict: &EnsembleVerdict) {
    println!(
        "Verdict: {}",
        if verdict.is_scam { "LIKELY SCAM" } else { "not flagged as a scam" }
    );
    println!("Confidence: {:.2}", verdict.confidence);
    println!(
        "Cross-validated: {}",
        if verdict.cross_validated { "yes" } else { "no" }
    );
    if verdict.degraded {
        println!("Mode: single model (degraded)");
    }
    if !verdict.detected_tactics.is_empty() {
        println!("Tactics: {}", verdict.detected_tactics.join(", "));
    }

    let findings = &verdict.findings;
    if let Some(ref elements) = findings.detected_elements {
        println!("Elements: {}", elements);
    }
    if let Some(ref risk) = findings.risk_level {
        println!("Risk level: {}", risk);
    }
    if let Some(ref technical) = findings.technical_analysis {
        println!("Technical analysis: {}", technical);
    }
    if let Some(ref transcript) = findings.transcript {
        println!("Transcript: {}", transcript);
    }

    println!("\nReason:\n{}", verdict.reason);
    println!("\nModels:");
    println!("{}", summary_line("standard", &verdict.per_model.standard));
    println!("{}", summary_line("tuned", &verdict.per_model.tuned));
    println!("\nRequest: {}", verdict.request_id);
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    scam_checker_lib::init_logging();

    match run(&cli).await {
        Ok(verdict) => {
            if cli.json {
                match serde_json::to_string_pretty(&verdict) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        error!("[CLI] Failed to serialize verdict: {}", e);
                        eprintln!("{}", ANALYSIS_FAILED_MESSAGE);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                print_verdict(&verdict);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("[CLI] Analysis failed: {:#}", e);
            eprintln!("{}", ANALYSIS_FAILED_MESSAGE);
            eprintln!("({:#})", e);
            ExitCode::FAILURE
        }
    }
}
