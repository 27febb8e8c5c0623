mod cli;
mod error;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use fleetdiag_api::{
    AgentMetrics, HttpPacFetcher, HttpSender, InterfaceResolver, MetricsSnapshot,
    SigningCertEnvelope, TlsMode,
};
use fleetdiag_config::Config;
use fleetdiag_core::{Diagnostics, Report, channels, spawn_feeds};

use crate::cli::{Cli, Command, ConfigCommand, GlobalOpts, RunArgs};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli.global);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(opts: &GlobalOpts) -> Option<WorkerGuard> {
    let level = match opts.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // The report owns stdout; logs go to stderr or a file.
    let (writer, guard) = match &opts.log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .unwrap_or(std::ffi::OsStr::new("fleetdiag.log"));
            let (non_blocking, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(opts.log_file.is_none())
        .with_target(false);
    let registry = tracing_subscriber::registry().with(filter);
    if opts.log_json {
        registry.with(layer.json()).init();
    } else {
        registry.with(layer).init();
    }
    guard
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli
        .global
        .config
        .clone()
        .unwrap_or_else(fleetdiag_config::config_path);

    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "fleetdiag", &mut std::io::stdout());
            Ok(())
        }

        Command::Config(ConfigCommand::Path) => {
            println!("{}", config_path.display());
            Ok(())
        }

        Command::Config(ConfigCommand::Show) => {
            let config = fleetdiag_config::load_config(Some(&config_path))?;
            print!("{}", fleetdiag_config::to_toml(&config)?);
            Ok(())
        }

        Command::Config(ConfigCommand::Init { force }) => {
            if config_path.exists() && !force {
                return Err(CliError::ConfigExists { path: config_path });
            }
            fleetdiag_config::save_config(&Config::default(), &config_path)?;
            println!("wrote {}", config_path.display());
            Ok(())
        }

        Command::Run(args) => {
            let mut config = fleetdiag_config::load_config(Some(&config_path))?;
            apply_overrides(&mut config, &args);
            diagnose(&config).await
        }
    }
}

/// Command-line flags win over file and environment.
fn apply_overrides(config: &mut Config, args: &RunArgs) {
    config.forever |= args.forever;
    config.pac_contents |= args.pac_contents;
    config.probe.simulate_dns_failure |= args.simulate_dns_failure;
    config.probe.simulate_ping_failure |= args.simulate_ping_failure;
    config.probe.probe_app_ports |= args.probe_app_ports;
    config.certs.insecure |= args.insecure;
    if let Some(max_retries) = args.max_retries {
        config.probe.max_retries = max_retries;
    }
    if let Some(output) = &args.output {
        config.output = Some(output.clone());
    }
    if let Some(metrics_file) = &args.metrics_file {
        config.metrics_file = Some(metrics_file.clone());
    }
}

async fn diagnose(config: &Config) -> Result<(), CliError> {
    let diag_config = config.to_diag_config()?;
    let report = match &config.output {
        Some(path) => Report::append_to(path)?,
        None => Report::stdout(),
    };

    let tls = if config.certs.insecure {
        warn!("controller TLS verification disabled");
        TlsMode::DangerAcceptInvalid
    } else if diag_config.certs.root_ca.exists() {
        TlsMode::CustomCa(diag_config.certs.root_ca.clone())
    } else {
        TlsMode::System
    };

    let metrics = Arc::new(AgentMetrics::new());
    let sender = HttpSender::new(tls, Arc::clone(&metrics));
    let resolver = InterfaceResolver::new(config.dns_timeout());
    let envelope = SigningCertEnvelope::new(diag_config.certs.controller_signing_cert.clone());
    let fetcher = HttpPacFetcher::new(Arc::clone(&metrics));

    let cancel = CancellationToken::new();
    let (senders, inputs) = channels();
    let feeds = spawn_feeds(&diag_config.feeds, senders, &cancel);

    let diagnostics = Diagnostics::new(
        diag_config,
        report,
        sender,
        resolver,
        envelope,
        fetcher,
        metrics,
    );

    let metrics_writer = config.metrics_file.clone().map(|path| {
        tokio::spawn(write_metrics(
            diagnostics.subscribe_metrics(),
            path,
            cancel.child_token(),
        ))
    });

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted");
            interrupt.cancel();
        }
    });

    let result = diagnostics.run(inputs, cancel.clone()).await;
    cancel.cancel();

    for feed in feeds {
        if let Err(e) = feed.await {
            warn!(error = %e, "feed task failed");
        }
    }
    if let Some(writer) = metrics_writer {
        match writer.await {
            Ok(written) => written?,
            Err(e) => warn!(error = %e, "metrics writer failed"),
        }
    }

    let summary = result?;
    debug!(passes = summary.passes, "done");
    Ok(())
}

/// Write every published metrics snapshot to `path` as pretty JSON.
async fn write_metrics(
    mut rx: watch::Receiver<MetricsSnapshot>,
    path: std::path::PathBuf,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let json = serde_json::to_vec_pretty(&*rx.borrow_and_update())?;
                tokio::fs::write(&path, json).await?;
                debug!(path = %path.display(), "metrics written");
            }
        }
    }
    Ok(())
}
