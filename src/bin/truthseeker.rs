#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use truthseeker::attestation::{attest_report, DigestAttestor};
use truthseeker::gateway::ProviderGateway;
use truthseeker::jobs::VerificationJobStore;
use truthseeker::oracle::LlmOracle;
use truthseeker::orchestrator::Verifier;
use truthseeker::progress::TracingProgressSink;
use truthseeker::search::SearchAggregator;
use truthseeker::Config;

#[derive(Parser)]
#[command(name = "truthseeker", version, about = "Adversarial claim verification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a claim and print the attested report
    Verify {
        #[arg(long)]
        claim: String,
        /// Also write the JSON to this file
        #[arg(long)]
        out: Option<PathBuf>,
        /// Search only this backend instead of fanning out
        #[arg(long)]
        backend: Option<String>,
    },
    /// Run a claim as a background job and stream its progress
    Watch {
        #[arg(long)]
        claim: String,
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },
    /// List search backends and whether they are configured
    Backends,
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| format!("failed to initialize tracing subscriber: {e}"))?;
    Ok(())
}

fn build_verifier(config: &Config) -> Result<Verifier, Box<dyn std::error::Error>> {
    let gateway = Arc::new(ProviderGateway::from_env()?);
    let oracle = Arc::new(LlmOracle::new(gateway, config.model.clone()));
    let search = Arc::new(SearchAggregator::from_env(config.search_timeout)?);
    Ok(Verifier::new(oracle, search, config.verifier.clone()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;
    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command {
        Commands::Verify {
            claim,
            out,
            backend,
        } => {
            config.verifier.evidence.search.backend = backend;
            let verifier = build_verifier(&config)?;
            let attestor = DigestAttestor::from_env()?;

            let report = verifier.run(&claim, &TracingProgressSink).await?;
            let attested = attest_report(&attestor, report).await?;

            let json = serde_json::to_string_pretty(&attested)?;
            if let Some(path) = out {
                std::fs::write(&path, &json)?;
            }
            println!("{json}");
        }
        Commands::Watch { claim, poll_ms } => {
            let verifier = Arc::new(build_verifier(&config)?);
            let store = VerificationJobStore::new(verifier, config.job_grace);
            let id = store.submit(claim);
            eprintln!("job {id}");

            let mut ticker = tokio::time::interval(Duration::from_millis(poll_ms.max(1)));
            loop {
                ticker.tick().await;
                let poll = store.poll(id)?;
                for line in &poll.logs {
                    println!("{line}");
                }
                if poll.completed {
                    match poll.result {
                        Some(decision) => println!("{}", serde_json::to_string_pretty(&decision)?),
                        None => return Err(format!("verification job {id} failed").into()),
                    }
                    break;
                }
            }
        }
        Commands::Backends => {
            let search = SearchAggregator::from_env(config.search_timeout)?;
            for (name, available) in search.backends() {
                let status = if available { "available" } else { "not configured" };
                println!("{name}\t{status}");
            }
        }
    }

    Ok(())
}
