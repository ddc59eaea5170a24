mod main_runtime;

use anyhow::Context;
use clap::Parser;
use digit_recognizer::adapters::start_api_server;
use digit_recognizer::api::AppState;
use digit_recognizer::cli::{self, Cli, Commands};
use digit_recognizer::config::AppConfig;
use digit_recognizer::persistence::{JsonModelFile, ParameterStore};
use digit_recognizer::services::ClassifierService;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    cli.apply_overrides(&mut cfg);
    if let Err(errors) = cfg.validate() {
        anyhow::bail!("invalid configuration:\n  {}", errors.join("\n  "));
    }

    match &cli.command {
        None | Some(Commands::Serve { .. }) => {
            init_logging(&cfg.logging);
            run_server(&cfg).await?;
        }
        Some(Commands::Predict { image }) => {
            init_logging_simple();
            let prediction = cli::predict_file(&cfg, image).await?;
            cli::print_prediction(&prediction);
        }
        Some(Commands::Inspect) => {
            init_logging_simple();
            let params = cli::inspect_model(&cfg).await?;
            cli::print_summary(&cfg, &params);
        }
        Some(Commands::Init { seed, force, .. }) => {
            init_logging_simple();
            let params = cli::init_model(&cfg, *seed, *force).await?;
            println!(
                "wrote {} (hidden units: {})",
                cfg.model.path.display(),
                params.hidden_units()
            );
        }
    }

    Ok(())
}

async fn run_server(cfg: &AppConfig) -> anyhow::Result<()> {
    info!(
        model = %cfg.model.path.display(),
        persist_on_train = cfg.model.persist_on_train,
        learning_rate = cfg.training.learning_rate,
        "starting digit recognizer"
    );

    let repository = Arc::new(JsonModelFile::new(&cfg.model.path));
    let store = ParameterStore::open(repository, cfg.model.persist_on_train)
        .await
        .inspect_err(|e| {
            if e.is_fatal() {
                error!(kind = e.kind(), error = %e, "model parameters unusable, refusing to start");
            }
        })
        .context("cannot serve without model parameters")?;

    let classifier = ClassifierService::new(Arc::new(store), cfg.training.learning_rate);
    let state = AppState::new(classifier);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cfg.server.host, cfg.server.port))?;
    start_api_server(state, addr).await?;
    Ok(())
}
