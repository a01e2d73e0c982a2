mod bundle;
mod cli;
mod config;
mod error;
mod source;

use bundle::{archive, Bundler, Layout};
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use error::Result;
use source::{HttpFetcher, Source};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Bundle {
            model_url,
            code_url,
            input_dir,
            output_dir,
            collisions,
            json,
        } => {
            let mut config = Config::from_env(cli.config.as_deref())?;
            if let Some(dir) = input_dir {
                config.input_dir = dir;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(policy) = collisions {
                config.collision_policy = policy;
            }

            let model = Source::parse(&model_url)?;
            let code = Source::parse(&code_url)?;

            let fetcher = HttpFetcher::new(config.fetch_timeout())?;
            let layout = Layout::from_config(&config);
            let bundler = Bundler::new(layout, fetcher, config.collision_policy);
            tracing::info!(
                "Bundling into {:?} (input root {:?})",
                bundler.layout().output_archive,
                bundler.layout().input_root
            );

            let report = bundler.run(&model, &code)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("✓ Bundled model archive: {:?}", report.output);
                println!("  Size: {} bytes", report.size_bytes);
                println!("  SHA-256: {}", report.sha256);
                println!("  Entries: {}", report.entries);
                println!("  Overrides applied: {}", report.overrides_applied);
            }
        }

        Commands::Inspect { archive: path, json } => {
            let entries = archive::list(&path)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("Archive {:?} is empty.", path);
            } else {
                for entry in &entries {
                    println!("  {}", entry);
                }
                println!("\n{} entries in {:?}", entries.len(), path);
            }
        }
    }

    Ok(())
}
