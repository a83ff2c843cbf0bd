//! duelhall: offline tools around the duel runtime.

use anyhow::Context;
use clap::Parser;
use duelhall_runtime::DuelConfig;
use duelhall_runtime::replay::Scenario;

mod cli;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("DUELHALL_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        cli::Command::CheckConfig { path } => {
            let config = DuelConfig::load(&path)?;
            tracing::info!(
                path = %path.display(),
                templates = config.templates.len(),
                "config ok"
            );
            println!(
                "{}",
                toml::to_string_pretty(&config).context("failed to render config")?
            );
        }
        cli::Command::Replay(opts) => {
            let config = match &opts.config {
                Some(path) => DuelConfig::load(path)?,
                None => DuelConfig::default(),
            };
            let scenario = Scenario::load(&opts.scenario)?;
            let report = scenario
                .run(config)
                .with_context(|| format!("scenario {} failed", scenario.name))?;
            let out = if opts.compact {
                serde_json::to_string(&report)?
            } else {
                serde_json::to_string_pretty(&report)?
            };
            println!("{out}");
        }
    }
    Ok(())
}
