//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and process exit codes.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use fleetdiag_config::ConfigError;
use fleetdiag_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const CERTIFICATES: i32 = 3;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(fleetdiag::config),
        help("Check the configuration file (fleetdiag config show) and FLEETDIAG_* variables.")
    )]
    Config(#[from] ConfigError),

    #[error("Configuration file {} already exists", path.display())]
    #[diagnostic(code(fleetdiag::config_exists), help("Use --force to overwrite it."))]
    ConfigExists { path: PathBuf },

    #[error("{message}")]
    #[diagnostic(
        code(fleetdiag::controller_address),
        help("The server file must contain the controller's host[:port].")
    )]
    ControllerAddress { message: String },

    // ── Certificates ─────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(fleetdiag::certificates),
        help(
            "Neither the device nor the onboarding certificate could be loaded.\n\
             Check the [certs] paths in the configuration."
        )
    )]
    Certificates { message: String },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Diagnostics failed: {0}")]
    #[diagnostic(code(fleetdiag::diagnostics))]
    Diagnostics(CoreError),

    #[error(transparent)]
    #[diagnostic(code(fleetdiag::io))]
    Io(#[from] std::io::Error),

    #[error("Cannot encode metrics: {0}")]
    #[diagnostic(code(fleetdiag::metrics))]
    Metrics(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::ConfigExists { .. } | Self::ControllerAddress { .. } => {
                exit_code::CONFIG
            }
            Self::Certificates { .. } => exit_code::CERTIFICATES,
            Self::Diagnostics(_) | Self::Io(_) | Self::Metrics(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NoCertificate { .. } | CoreError::Certificate { .. } => {
                CliError::Certificates {
                    message: err.to_string(),
                }
            }
            CoreError::ControllerFile { .. } | CoreError::EmptyControllerFile { .. } => {
                CliError::ControllerAddress {
                    message: err.to_string(),
                }
            }
            CoreError::Report(e) => CliError::Io(e),
            other => CliError::Diagnostics(other),
        }
    }
}
