/// authget – main entry point.
///
/// Performs one authenticated HTTP GET. Basic authentication is used unless a
/// domain is given, in which case NTLM is negotiated.

use anyhow::{Context, Result};
use authget_core::{authenticate, AuthError, ClientConfig, ExchangeLogger, TcpTransport, Verdict};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "authget",
    version,
    about = "Perform an authenticated HTTP GET request using Basic or NTLM",
    long_about = "Perform an authenticated HTTP GET request. Basic Authentication or NTLM can be used.\n\
                  If --domain is not provided, Basic is used. If it is, NTLM is negotiated."
)]
struct Cli {
    /// User name
    #[arg(short, long)]
    user: String,

    /// Password
    #[arg(short, long)]
    password: String,

    /// Windows domain; selects NTLM instead of Basic
    #[arg(short, long)]
    domain: Option<String>,

    /// Forward proxy to connect through (host:port or URL)
    #[arg(short = 'P', long)]
    proxy: Option<String>,

    /// Per-request timeout in seconds
    #[arg(short, long, default_value_t = authget_core::config::DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Append a JSON line per request/response exchange to this file
    #[arg(long)]
    log_file: Option<String>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// URL to fetch
    url: String,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the verdict.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    let config = match ClientConfig::new(&cli.user, &cli.password, cli.domain.clone(), cli.proxy.clone()) {
        Ok(c) => c.with_timeout(cli.timeout),
        Err(e) => {
            println!("Error: {}", e);
            return Ok(ExitCode::from(2));
        }
    };
    debug!(?config, "configuration loaded");

    let logger = match &cli.log_file {
        Some(path) => Some(
            ExchangeLogger::new(path).with_context(|| format!("cannot open log file '{}'", path))?,
        ),
        None => None,
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let transport = TcpTransport::new(Duration::from_secs(config.timeout_secs));
    let outcome = rt.block_on(authenticate(&transport, &config, &cli.url, logger.as_ref()));

    Ok(ExitCode::from(report(outcome)))
}

/// Print the verdict line and pick the exit status.
fn report(outcome: Result<Verdict, AuthError>) -> u8 {
    match outcome {
        Ok(verdict) if verdict.is_success() => {
            if verdict == Verdict::NotRequired {
                info!("no authentication was required");
            }
            println!("OK");
            0
        }
        Ok(verdict) => {
            info!(?verdict, "authentication did not succeed");
            println!("Authentication failed");
            1
        }
        Err(e) => {
            println!("Error: {}", e);
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_ntlm_options() {
        let cli = Cli::try_parse_from([
            "authget", "-u", "alice", "-p", "secret", "-d", "CORP", "-P", "proxy:3128", "http://intranet/",
        ])
        .unwrap();
        assert_eq!(cli.user, "alice");
        assert_eq!(cli.domain.as_deref(), Some("CORP"));
        assert_eq!(cli.proxy.as_deref(), Some("proxy:3128"));
        assert_eq!(cli.timeout, authget_core::config::DEFAULT_TIMEOUT_SECS);
        assert_eq!(cli.url, "http://intranet/");
    }

    #[test]
    fn test_cli_requires_credentials_and_one_url() {
        assert!(Cli::try_parse_from(["authget", "-p", "secret", "http://x/"]).is_err());
        assert!(Cli::try_parse_from(["authget", "-u", "a", "-p", "b"]).is_err());
        assert!(Cli::try_parse_from(["authget", "-u", "a", "-p", "b", "http://x/", "http://y/"]).is_err());
    }

    #[test]
    fn test_report_exit_codes() {
        assert_eq!(report(Ok(Verdict::Authenticated)), 0);
        assert_eq!(report(Ok(Verdict::NotRequired)), 0);
        assert_eq!(report(Ok(Verdict::Inconclusive { status: 302 })), 1);
        assert_eq!(
            report(Ok(Verdict::Rejected { status: 401, reason: "Unauthorized".into() })),
            1
        );
        assert_eq!(
            report(Err(AuthError::ProtocolViolation("first round failed".into()))),
            2
        );
    }
}
