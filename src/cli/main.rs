use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::json;
use student_risk::config::Config;
use student_risk::ml::{TrainingOrchestrator, TrainingOutcome};

#[derive(Parser)]
#[command(name = "student-risk-cli")]
#[command(about = "Student risk pipeline CLI", long_about = None)]
struct Cli {
    #[arg(short, long, env = "STUDENT_RISK_ENDPOINT", default_value = "http://localhost:8000")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full training pass locally using the loaded configuration
    Train {
        /// Number of sampled hyperparameter combinations
        #[arg(short, long)]
        n_iter: Option<usize>,

        /// Register the new version without moving the production alias
        #[arg(long)]
        no_promote: bool,
    },

    /// Score one student record on a running server
    Predict {
        #[arg(long)]
        iaa: f64,

        #[arg(long)]
        ieg: f64,

        #[arg(long)]
        ips: f64,

        #[arg(long)]
        ida: f64,

        #[arg(long)]
        ipv: f64,

        #[arg(long)]
        idade: Option<f64>,

        #[arg(long)]
        fase: Option<String>,

        #[arg(long)]
        pedra: Option<String>,
    },

    /// Ask the server to load the current production model
    Reload,

    /// Ask the server to retrain in the background
    Retrain,

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Train { n_iter, no_promote } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "student_risk=info".into()),
                )
                .init();

            let mut config = Config::load()?;
            if let Some(n_iter) = n_iter {
                config.training.n_iter = n_iter;
            }
            if no_promote {
                config.registry.promote_on_register = false;
            }

            let orchestrator = TrainingOrchestrator::from_config(&config);
            let outcome = tokio::task::spawn_blocking(move || orchestrator.run_training()).await??;

            match outcome {
                TrainingOutcome::Completed(summary) => {
                    println!("Training completed");
                    println!("  Version:   {}", summary.registered_version);
                    println!("  Promoted:  {}", summary.promoted);
                    println!("  Params:    {}", summary.best_params);
                    println!("  CV recall: {:.4}", summary.cv_recall);
                    println!("  Recall:    {:.4}", summary.report.recall);
                    println!("  Precision: {:.4}", summary.report.precision);
                    println!("  F1:        {:.4}", summary.report.f1_score);
                    println!("  Artifact:  {}", summary.artifact_path.display());
                }
                TrainingOutcome::Skipped { reason } => {
                    eprintln!("Training skipped: {}", reason);
                    std::process::exit(2);
                }
            }
        }

        Commands::Predict {
            iaa,
            ieg,
            ips,
            ida,
            ipv,
            idade,
            fase,
            pedra,
        } => {
            let response = client
                .post(format!("{}/predict", cli.endpoint))
                .json(&json!({
                    "IAA": iaa,
                    "IEG": ieg,
                    "IPS": ips,
                    "IDA": ida,
                    "IPV": ipv,
                    "Idade": idade,
                    "Fase": fase,
                    "Pedra": pedra,
                }))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Reload => {
            let response = client
                .post(format!("{}/reload", cli.endpoint))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Retrain => {
            let response = client
                .post(format!("{}/retrain", cli.endpoint))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.endpoint))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
