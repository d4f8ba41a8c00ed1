mod controller;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use datadam_core::{DamConfig, Error as CoreError};
use datadam_dispatch::DispatchError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use controller::{Controller, default_registry};
use logging::init_logging;

#[derive(Debug, Error)]
enum CliError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("logging error: {0}")]
    Logging(String),
    #[error("lane task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CliError {
    /// 2 for configuration mistakes, 1 for everything else.
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Core(CoreError::Config(_))
            | CliError::Dispatch(DispatchError::Config(_)) => 2,
            _ => 1,
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(
    name = "datadam",
    version,
    about = "Synthetic DML workload generator for relational databases"
)]
struct Cli {
    /// TOML configuration file. Flags override its values.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Log filter, e.g. `info` or `datadam_dispatch=debug`.
    #[arg(long)]
    log_level: Option<String>,
    /// Also write JSON logs to this file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// Operations per second.
    #[arg(long)]
    rate: Option<u32>,
    /// Rate limiter burst size.
    #[arg(long)]
    burst: Option<u32>,
    /// Run time such as `30s` or `1m30s`, `0` runs until interrupted.
    #[arg(long)]
    duration: Option<String>,
    /// Number of regular worker lanes.
    #[arg(long)]
    concurrent: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// Idle time after which a lane executes a partial batch.
    #[arg(long)]
    flush_interval: Option<String>,
    /// Weights for insert, update, delete and ddl, e.g. `5,4,1,0`.
    #[arg(long, value_delimiter = ',')]
    op_weight: Option<Vec<u32>>,
    /// Schema to generate into. Repeat for several.
    #[arg(long = "schema", value_name = "SCHEMA")]
    schemas: Vec<String>,
    /// Backend kind (`mysql` or `memory`).
    #[arg(long)]
    db_kind: Option<String>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    password: Option<String>,
    /// Log every executed statement at debug level.
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    /// Load the config file, if any, and apply flag overrides on top.
    fn into_config(self) -> Result<DamConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => DamConfig::from_file(path)?,
            None => DamConfig::default(),
        };

        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file;
        }
        if let Some(rate) = self.rate {
            config.rate = rate;
        }
        if let Some(burst) = self.burst {
            config.burst = burst;
        }
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if let Some(concurrent) = self.concurrent {
            config.concurrent = concurrent;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(interval) = self.flush_interval {
            config.flush_interval = interval;
        }
        if let Some(weights) = self.op_weight {
            config.op_weight = weights;
        }
        if !self.schemas.is_empty() {
            config.schemas = self.schemas;
        }

        let db = &mut config.db_config;
        if let Some(kind) = self.db_kind {
            db.kind = kind;
        }
        if let Some(host) = self.host {
            db.mysql.host = host;
        }
        if let Some(port) = self.port {
            db.mysql.port = port;
        }
        if let Some(user) = self.user {
            db.mysql.user = user;
        }
        if let Some(password) = self.password {
            db.mysql.password = password;
        }
        db.verbose |= self.verbose;

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("datadam: {err}");
            return ExitCode::from(err.exit_code());
        }
    };
    if let Err(err) = init_logging(&config.log_level, config.log_file.as_deref()) {
        eprintln!("datadam: {err}");
        return ExitCode::from(err.exit_code());
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(event = "run_failed", error = %err);
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(config: DamConfig) -> Result<(), CliError> {
    tracing::info!(event = "config_loaded", config = %config.redacted_json());

    let registry = default_registry(&config)?;
    let shutdown = CancellationToken::new();
    let watcher = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => tracing::info!(event = "signal_received", signal),
            Err(err) => tracing::warn!(error = %err, "cannot listen for signals"),
        }
        watcher.cancel();
    });

    let summary = Controller::new(config, registry).run(shutdown).await?;
    tracing::info!(
        event = "summary",
        run_id = %summary.run_id,
        submitted = summary.submitted,
        lanes = summary.reports.len(),
    );
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut quit = signal(SignalKind::quit())?;
    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
        _ = quit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("datadam").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--rate",
            "40",
            "--op-weight",
            "1,0,0,0",
            "--schema",
            "a",
            "--schema",
            "b",
            "--db-kind",
            "memory",
            "--verbose",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.rate, 40);
        assert_eq!(config.burst, 10);
        assert_eq!(config.op_weight, vec![1, 0, 0, 0]);
        assert_eq!(config.schemas, vec!["a", "b"]);
        assert_eq!(config.db_config.kind, "memory");
        assert!(config.db_config.verbose);
    }

    #[test]
    fn bad_weights_exit_with_config_status() {
        let err = parse(&["--schema", "a", "--op-weight", "1,2"])
            .into_config()
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn missing_schema_is_rejected() {
        let err = Cli::default().into_config().unwrap_err();
        assert!(matches!(err, CliError::Core(CoreError::Config(_))));
    }
}
