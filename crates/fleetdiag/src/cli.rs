//! Clap derive structures for the `fleetdiag` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fleetdiag -- controller connectivity diagnostics for edge devices
#[derive(Debug, Parser)]
#[command(
    name = "fleetdiag",
    version,
    about = "Verify that an edge device can reach its fleet controller",
    long_about = "Watches the device's network, LED, onboarding and port-config state and\n\
        prints a PASS/INFO/WARNING/ERROR report of controller reachability over\n\
        every management port: DNS, ping, authenticated round-trip, proxy and\n\
        WPAD discovery, and Internet diagnosis when the controller is unreachable.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, env = "FLEETDIAG_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the diagnostics and print the report
    Run(RunArgs),

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Keep reporting on every change instead of exiting after one report
    #[arg(long, short = 'f')]
    pub forever: bool,

    /// Print PAC file contents
    #[arg(long, short = 'p')]
    pub pac_contents: bool,

    /// Simulate a DNS lookup failure
    #[arg(long = "simulate-dns-failure", short = 'D')]
    pub simulate_dns_failure: bool,

    /// Simulate a controller ping failure
    #[arg(long = "simulate-ping-failure", short = 'P')]
    pub simulate_ping_failure: bool,

    /// File or device for the report (appended to)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Retries per step after the first attempt; 0 retries forever
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Also probe non-management ports that have an address
    #[arg(long)]
    pub probe_app_ports: bool,

    /// Skip controller TLS verification
    #[arg(long, short = 'k')]
    pub insecure: bool,

    /// Write each metrics snapshot to this file as JSON
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Print the configuration file path
    Path,

    /// Write a configuration file with the default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
