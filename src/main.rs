use anyhow::Context;
use std::path::Path;
use tradebook::{batch, config::Config, process_batch};

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> anyhow::Result<()> {
    let raws = batch::read_batch(&config.input_path)
        .with_context(|| format!("reading batch from {}", config.input_path))?;
    tracing::info!(path = %config.input_path, transactions = raws.len(), "Loaded batch");

    let result = process_batch(&raws, &config.engine).context("processing batch")?;

    let digest = result.digest().context("hashing result")?;
    batch::write_result(config.output_path.as_deref().map(Path::new), &result)
        .context("writing result")?;

    tracing::info!(
        ledger_rows = result.ledger.len(),
        episodes = result.episodes.len(),
        open_episodes = result.open_episodes().count(),
        digest = %digest,
        "Result written"
    );
    Ok(())
}
