//! Vigie CLI entry point.
//!
//! This binary provides the command-line interface for Vigie.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vigie::cli::{Cli, Commands, CompatSubject};
use vigie::reporter::{ReportEnvelope, Reporter};
use vigie::{Config, Scanner, VigieError};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("Error: {e}");

            // Print error chain (cause chain)
            let mut source = e.source();
            if source.is_some() {
                eprintln!("\nCaused by:");
                let mut i = 0;
                while let Some(cause) = source {
                    eprintln!("  {i}: {cause}");
                    source = cause.source();
                    i += 1;
                }
            }

            let code = e
                .downcast_ref::<VigieError>()
                .map_or(1, VigieError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        // RUST_LOG wins over the verbosity flags when set
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let base_level = match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            EnvFilter::new(format!("warn,vigie={base_level}"))
        })
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::debug!("Loading configuration");
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Scan(args) => {
            let mut config = config;
            config.merge_cli_args(&args);
            config.validate()?;

            let scanner = Scanner::new(config);
            let mut inventory = scanner
                .scan_path_named(&args.path, args.project_name.clone())
                .await?;

            if args.resolve_enabled() {
                scanner.resolve(&mut inventory).await;
            }
            let compatibility = if args.compat {
                Some(scanner.analyze_compatibility(&inventory).await)
            } else {
                None
            };

            let reporter = Reporter::new(&scanner.config().output);
            let envelope = ReportEnvelope::new(inventory, compatibility);
            reporter.write(&envelope, args.output.as_deref())?;

            Ok(ExitCode::from(0))
        }

        Commands::Compat(args) => {
            config.validate()?;
            let scanner = Scanner::new(config);

            let (report, format) = match args.subject {
                CompatSubject::Module(subject) => (
                    scanner
                        .module_compat(&subject.source, &subject.current, subject.target.as_deref())
                        .await,
                    subject.format,
                ),
                CompatSubject::Provider(subject) => (
                    scanner
                        .provider_compat(
                            &subject.source,
                            &subject.current,
                            subject.target.as_deref(),
                        )
                        .await,
                    subject.format,
                ),
            };

            let rendered = match format.unwrap_or_default() {
                vigie::ReportFormat::Json => serde_json::to_string_pretty(&report)?,
                vigie::ReportFormat::Yaml => serde_yaml::to_string(&report)?,
            };
            println!("{rendered}");

            let code = if report.has_breaking_changes() { 2 } else { 0 };
            Ok(ExitCode::from(code))
        }

        Commands::Init => {
            let example_config = Config::example_yaml();
            let config_path = std::path::Path::new("vigie.yaml");

            if config_path.exists() {
                anyhow::bail!(
                    "Configuration file already exists: {}",
                    config_path.display()
                );
            }

            std::fs::write(config_path, example_config)?;
            println!("Created example configuration: vigie.yaml");
            Ok(ExitCode::from(0))
        }

        Commands::Validate(args) => {
            let config_content = std::fs::read_to_string(&args.config)?;
            match Config::from_yaml(&config_content).and_then(|c| {
                c.validate()?;
                Ok(())
            }) {
                Ok(()) => {
                    println!("Configuration is valid: {}", args.config.display());
                    Ok(ExitCode::from(0))
                }
                Err(e) => {
                    eprintln!("Configuration error: {e}");
                    Ok(ExitCode::from(1))
                }
            }
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    if let Some(ref config_path) = cli.config {
        tracing::debug!(path = %config_path.display(), "Loading configuration from explicit path");
        let content = std::fs::read_to_string(config_path)?;
        let mut config = Config::from_yaml(&content)?;
        config.load_tokens_from_env();
        return Ok(config);
    }

    let default_paths = ["vigie.yaml", "vigie.yml", ".vigie.yaml"];
    for path in &default_paths {
        if std::path::Path::new(path).exists() {
            tracing::debug!(path = %path, "Found configuration file");
            let content = std::fs::read_to_string(path)?;
            let mut config = Config::from_yaml(&content)?;
            config.load_tokens_from_env();
            return Ok(config);
        }
    }

    tracing::debug!("No configuration file found, using defaults");
    let mut config = Config::default();
    config.load_tokens_from_env();
    Ok(config)
}
