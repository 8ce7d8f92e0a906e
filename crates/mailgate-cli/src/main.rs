// crates/mailgate-cli/src/main.rs
// ============================================================================
// Module: Mailgate CLI Entry Point
// Description: Command dispatcher for the gateway server and mailbox auth.
// Purpose: Provide a safe, loopback-first launcher for the MCP gateway.
// Dependencies: clap, mailgate-config, mailgate-core, mailgate-mcp, tokio
// ============================================================================

//! ## Overview
//! `mailgate serve` launches the HTTP gateway with the loopback-only bind
//! policy enforced before any listener opens. `mailgate auth` runs the
//! mailbox consent handshake standalone and reports completion or timeout.
//! Real auth and mail collaborators are linked in by deployments; the stock
//! binary wires the fail-closed placeholders and degrades to explicit
//! errors rather than crashing.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod serve_policy;


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use mailgate_config::MailgateConfig;
use mailgate_core::AuthFlow;
use mailgate_core::AuthIdentity;
use mailgate_core::SessionId;
use mailgate_mcp::GatewayServer;
use mailgate_mcp::NoopMetrics;
use mailgate_mcp::StderrAuditSink;
use mailgate_mcp::SystemClock;
use mailgate_mcp::UnconfiguredAuthFlow;
use mailgate_mcp::UnconfiguredExecutor;
use thiserror::Error;

use crate::serve_policy::ServePolicyError;
use crate::serve_policy::enforce_local_only;
use crate::serve_policy::resolve_allow_non_loopback;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Seconds between consent completion polls in `mailgate auth`.
const AUTH_POLL_INTERVAL_SECS: u64 = 2;

// ============================================================================
// SECTION: Command Line
// ============================================================================

/// Session-isolated MCP gateway for a mail API.
#[derive(Debug, Parser)]
#[command(name = "mailgate", version, about)]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Launch the gateway server.
    Serve(ServeArgs),
    /// Run the mailbox consent handshake standalone.
    Auth(AuthArgs),
}

/// Arguments for `mailgate serve`.
#[derive(Debug, Args)]
struct ServeArgs {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the configured bind address.
    #[arg(long)]
    bind: Option<String>,
    /// Allow binding a non-loopback address.
    #[arg(long, action = ArgAction::SetTrue)]
    allow_non_loopback: bool,
}

/// Arguments for `mailgate auth`.
#[derive(Debug, Args)]
struct AuthArgs {
    /// Seconds to wait for consent before giving up.
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures surfaced to the operator.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration could not be loaded or validated.
    #[error("config: {0}")]
    Config(String),
    /// Bind policy refused the requested exposure.
    #[error(transparent)]
    Policy(#[from] ServePolicyError),
    /// Server startup or serving failed.
    #[error("server: {0}")]
    Server(String),
    /// Auth handshake failed or timed out.
    #[error("auth: {0}")]
    Auth(String),
    /// Runtime construction failed.
    #[error("runtime: {0}")]
    Runtime(String),
    /// Writing CLI output failed.
    #[error("output: {0}")]
    Output(#[from] std::io::Error),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Binary entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(std::io::stderr(), "mailgate: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatches the parsed command.
fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Auth(args) => run_auth(&args),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Loads configuration, enforces the bind policy, and serves.
fn run_serve(args: ServeArgs) -> Result<(), CliError> {
    let mut config = match &args.config {
        Some(path) => MailgateConfig::load(path).map_err(|err| CliError::Config(err.to_string()))?,
        None => MailgateConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    let allow_non_loopback = resolve_allow_non_loopback(args.allow_non_loopback)?;
    let addr = enforce_local_only(&config.server.bind, allow_non_loopback)?;
    if addr.ip().is_loopback() {
        write_stderr_line(&format!("mailgate: serving loopback-only on {addr}"))?;
    } else {
        write_stderr_line(&format!(
            "mailgate: WARNING: serving on network address {addr}; ensure a reverse proxy \
             terminates TLS in front of this listener"
        ))?;
    }
    let server = GatewayServer::new(
        config,
        Arc::new(UnconfiguredAuthFlow),
        Arc::new(UnconfiguredExecutor),
        Arc::new(SystemClock),
        Arc::new(StderrAuditSink),
        Arc::new(NoopMetrics),
    )
    .map_err(|err| CliError::Server(err.to_string()))?;
    runtime()?
        .block_on(server.serve())
        .map_err(|err| CliError::Server(err.to_string()))
}

// ============================================================================
// SECTION: Auth Command
// ============================================================================

/// Runs the consent handshake against the configured auth collaborator.
fn run_auth(args: &AuthArgs) -> Result<(), CliError> {
    let timeout = Duration::from_secs(args.timeout_secs);
    runtime()?.block_on(async {
        let flow = UnconfiguredAuthFlow;
        // Standalone handshakes mint a throwaway session; the identity only
        // needs to be stable for the duration of this flow.
        let session_id = SessionId::mint();
        let identity = AuthIdentity::derive(&session_id);
        let start = flow
            .begin_auth(&identity)
            .await
            .map_err(|err| CliError::Auth(err.to_string()))?;
        write_stdout_line(&format!("open this url to grant access: {}", start.auth_url))?;
        let deadline = Instant::now() + timeout;
        loop {
            let completed = flow
                .poll_completion(&identity)
                .await
                .map_err(|err| CliError::Auth(err.to_string()))?;
            if completed.is_some() {
                write_stdout_line("mailbox connected")?;
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CliError::Auth("timed out waiting for consent".to_string()));
            }
            tokio::time::sleep(Duration::from_secs(AUTH_POLL_INTERVAL_SECS)).await;
        }
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the multi-threaded runtime both commands run on.
fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Runtime(err.to_string()))
}

/// Writes one line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes one line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}
