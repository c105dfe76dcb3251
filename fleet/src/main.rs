use clap::{Args, Parser};
use config::Config;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod config;

#[derive(Parser)]
enum CliCommand {
    /// Run the controller.
    Run(ConfigArgs),
    /// Load and validate a config file, then exit.
    Validate(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    config_file: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Validation(#[from] reconciler::config::ValidationError),
    #[error("could not install statsd recorder: {0}")]
    Metrics(String),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Run(#[from] reconciler::RunError),
}

fn main() {
    let cli = CliCommand::parse();

    let result = match cli {
        CliCommand::Run(args) => run(&args),
        CliCommand::Validate(args) => validate(&args),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "alb-fleet exited with an error");
        eprintln!("{e}");
        process::exit(1);
    }
}

fn load(args: &ConfigArgs) -> Result<Config, StartupError> {
    let config = Config::from_file(&args.config_file)?;
    config.controller.validate()?;
    Ok(config)
}

fn validate(args: &ConfigArgs) -> Result<(), StartupError> {
    load(args)?;
    println!("{} is valid", args.config_file.display());
    Ok(())
}

fn run(args: &ConfigArgs) -> Result<(), StartupError> {
    let config = load(args)?;

    // Dropping the guard flushes pending events.
    let _sentry = config.sentry_dsn().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    init_logging();

    if let Some(metrics) = &config.common.metrics {
        init_statsd(&metrics.statsd_host, metrics.statsd_port)?;
    }

    tracing::info!(cluster = %config.controller.cluster_name, "Starting alb-fleet");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(reconciler::run(config.controller))?;
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry::integrations::tracing::layer())
        .init();
}

fn init_statsd(host: &str, port: u16) -> Result<(), StartupError> {
    let recorder = metrics_exporter_statsd::StatsdBuilder::from(host, port)
        .build(Some("alb_fleet"))
        .map_err(|e| StartupError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| StartupError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(reconciler::metrics_defs::ALL_METRICS);
    Ok(())
}
