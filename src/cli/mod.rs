use crate::config::ServiceConfig;
use crate::server;
use crate::services::Aggregator;
use crate::types::Market;
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// App Store / Play Store ratings and BVC market data, as JSON
#[derive(Parser)]
#[command(name = "cx-service")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON config file (default: ~/.cx-service/config.json if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (default)
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print Trii rating on both stores
    Trii,

    /// Print Trii reviews of the last 30 days
    TriiComments,

    /// Print competitor ratings for one store
    Ratings {
        #[arg(value_enum)]
        store: StoreArg,
    },

    /// Print the BVC market table
    Bvc {
        #[arg(value_enum)]
        market: MarketArg,

        /// Attach the last upstream failure when the fetch fails
        #[arg(long)]
        debug: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StoreArg {
    Playstore,
    Appstore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MarketArg {
    Local,
    Global,
}

impl From<MarketArg> for Market {
    fn from(arg: MarketArg) -> Self {
        match arg {
            MarketArg::Local => Market::Local,
            MarketArg::Global => Market::Global,
        }
    }
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let config =
            ServiceConfig::load(self.config.as_deref()).context("failed to load configuration")?;

        match self.command.unwrap_or(Commands::Serve {
            host: None,
            port: None,
        }) {
            Commands::Serve { host, port } => {
                let host = host.unwrap_or_else(|| config.server.host.clone());
                let port = port.unwrap_or(config.server.port);
                let addr: SocketAddr = format!("{}:{}", host, port)
                    .parse()
                    .with_context(|| format!("invalid bind address {}:{}", host, port))?;

                let aggregator = Arc::new(Aggregator::new(config)?);
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .context("failed to start tokio runtime")?;
                runtime.block_on(server::serve(aggregator, addr))?;
                Ok(())
            }
            Commands::Trii => print_json(&Aggregator::new(config)?.trii_ratings()),
            Commands::TriiComments => print_json(&Aggregator::new(config)?.trii_comments()),
            Commands::Ratings { store } => {
                let aggregator = Aggregator::new(config)?;
                match store {
                    StoreArg::Playstore => print_json(&aggregator.playstore_ratings()),
                    StoreArg::Appstore => print_json(&aggregator.appstore_ratings()),
                }
            }
            Commands::Bvc { market, debug } => {
                print_json(&Aggregator::new(config)?.market(market.into(), debug))
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::try_parse_from(["cx-service"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_parse_serve_port() {
        let cli = Cli::try_parse_from(["cx-service", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Serve {
                host: None,
                port: Some(9000)
            })
        ));
    }

    #[test]
    fn test_cli_parse_ratings() {
        let cli = Cli::try_parse_from(["cx-service", "ratings", "appstore"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Ratings {
                store: StoreArg::Appstore
            })
        ));
    }

    #[test]
    fn test_cli_parse_bvc_debug_with_config() {
        let cli = Cli::try_parse_from([
            "cx-service",
            "bvc",
            "global",
            "--debug",
            "--config",
            "/tmp/cx.json",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Bvc {
                market: MarketArg::Global,
                debug: true
            })
        ));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/cx.json")));
    }

    #[test]
    fn test_cli_rejects_unknown_store() {
        assert!(Cli::try_parse_from(["cx-service", "ratings", "huawei"]).is_err());
    }

    #[test]
    fn test_market_arg_conversion() {
        assert_eq!(Market::from(MarketArg::Local), Market::Local);
        assert_eq!(Market::from(MarketArg::Global), Market::Global);
    }
}
