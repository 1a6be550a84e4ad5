//! fieldlinkd - fieldlink telemetry agent daemon
//!
//! Bridges a vehicle diagnostic adapter and a private network tunnel and
//! sends vehicle samples to a remote collector.
//!
//! Usage:
//!   fieldlinkd [OPTIONS] [config.toml]
//!
//! Without a config file every setting uses its default; with no adapter
//! attached the agent runs on simulated vehicle data.

use std::path::Path;

use fieldlinkd::{Agent, AgentConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str =
    "fieldlinkd=info,fieldlink_obd=info,fieldlink_tunnel=info,fieldlink_client=info";

/// Parsed command-line arguments
#[derive(Debug, Default, PartialEq)]
struct Args {
    /// Agent config file (TOML)
    config_path: Option<String>,
    /// Emulated adapter and simulated tunnel
    simulate: bool,
    /// JSON log lines
    log_json: bool,
    help: bool,
    /// Reported once logging is up
    unknown: Vec<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Args {
    let mut result = Args::default();

    for arg in args {
        match arg.as_str() {
            "--simulate" => result.simulate = true,
            "--log-json" => result.log_json = true,
            "--help" | "-h" => result.help = true,
            a if !a.starts_with('-') => {
                // Positional argument = config file
                result.config_path = Some(arg);
            }
            _ => result.unknown.push(arg),
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"fieldlinkd - fieldlink telemetry agent

Usage: fieldlinkd [OPTIONS] [config.toml]

Options:
      --simulate    Use the emulated adapter and a simulated tunnel
      --log-json    Write log lines as JSON
  -h, --help        Print this help message

Environment:
  RUST_LOG          Log filter (default: {DEFAULT_LOG_FILTER})

Examples:
  # Run with defaults (simulated data when no adapter is attached)
  fieldlinkd

  # Run with config file
  fieldlinkd /etc/fieldlink/fieldlink.toml

  # Demo without hardware or tunnel client
  fieldlinkd --simulate
"#
    );
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1));
    if args.help {
        print_help();
        return Ok(());
    }

    init_logging(args.log_json);
    for arg in &args.unknown {
        tracing::warn!("Unknown argument: {}", arg);
    }

    tracing::info!("Starting fieldlinkd");

    let mut config = if let Some(ref path) = args.config_path {
        tracing::info!("Loading config from: {}", path);
        AgentConfig::load(Path::new(path))?
    } else {
        tracing::info!("No config file provided, using defaults");
        AgentConfig::default()
    };
    if args.simulate {
        tracing::info!("Simulation forced: emulated adapter, simulated tunnel");
        config.force_simulation();
    }

    let agent = Agent::from_config(config)?;
    agent.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    agent.shutdown().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Args {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_no_arguments() {
        assert_eq!(args(&[]), Args::default());
    }

    #[test]
    fn test_flags_and_config_path() {
        let parsed = args(&["--simulate", "agent.toml", "--log-json"]);
        assert!(parsed.simulate);
        assert!(parsed.log_json);
        assert_eq!(parsed.config_path.as_deref(), Some("agent.toml"));
        assert!(parsed.unknown.is_empty());
    }

    #[test]
    fn test_unknown_flags_are_collected() {
        let parsed = args(&["--verbose", "-h"]);
        assert!(parsed.help);
        assert_eq!(parsed.unknown, vec!["--verbose".to_string()]);
    }
}
