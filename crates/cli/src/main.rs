mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::Query;
use config::{AppConfig, Backend, LogFormat, TerminalConfig};
use mtbridge_brokers_common::SimulatedTerminal;
use mtbridge_brokers_metatrader::MetaTraderBridge;
use mtbridge_core::{Credentials, Secret, TerminalClient};
use mtbridge_service::{ConnectionService, HistoryRequest};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mtbridge")]
#[command(about = "REST bridge to MetaTrader terminals: connect accounts, read positions and history")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "MTBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Directory for daily-rotated log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Use the built-in simulated terminal instead of the bridge
    #[arg(long)]
    demo: bool,

    /// Terminal bridge host
    #[arg(long, env = "MTBRIDGE_BRIDGE_HOST")]
    bridge_host: Option<String>,

    /// Terminal bridge port
    #[arg(long, env = "MTBRIDGE_BRIDGE_PORT")]
    bridge_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Server {
        /// Bind address
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Log in and print the account summary
    Connect(AccountArgs),

    /// Print detailed account information
    Account(AccountArgs),

    /// Print open positions
    Positions(AccountArgs),

    /// Print deal history
    History {
        #[command(flatten)]
        account: AccountArgs,

        /// Only deals for this symbol
        #[arg(long)]
        symbol: Option<String>,

        /// Start date (ISO format); defaults to 30 days ago
        #[arg(long = "from")]
        from_date: Option<String>,

        /// End date (ISO format); defaults to now
        #[arg(long = "to")]
        to_date: Option<String>,

        /// Maximum number of deals (0 = no limit)
        #[arg(long, default_value = "100")]
        limit: usize,
    },
}

#[derive(Args)]
struct AccountArgs {
    /// Trade server name
    #[arg(long)]
    server: String,

    /// Account login
    #[arg(long)]
    login: u64,

    /// Account password
    #[arg(long, env = "MTBRIDGE_PASSWORD", hide_env_values = true)]
    password: String,
}

impl AccountArgs {
    fn credentials(&self) -> Credentials {
        Credentials {
            server: self.server.clone(),
            login: self.login,
            password: Secret::new(self.password.clone()),
        }
    }
}

impl Cli {
    /// Config file overlaid with command-line flags.
    fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;

        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(dir) = &self.log_dir {
            config.logging.dir = Some(dir.clone());
        }
        if self.demo {
            config.terminal.backend = Backend::Demo;
        }
        if let Some(host) = &self.bridge_host {
            config.terminal.bridge.host = host.clone();
        }
        if let Some(port) = self.bridge_port {
            config.terminal.bridge.port = port;
        }
        if let Commands::Server { bind: Some(bind) } = &self.command {
            config.server.bind = bind.clone();
        }
        Ok(config)
    }
}

fn build_terminal(config: &TerminalConfig) -> Arc<dyn TerminalClient> {
    match config.backend {
        Backend::Demo => Arc::new(SimulatedTerminal::demo()),
        Backend::Bridge => Arc::new(MetaTraderBridge::new(config.bridge.clone())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    logging::init_logging(&config.logging);

    let terminal = build_terminal(&config.terminal);
    tracing::debug!(terminal = terminal.name(), "Terminal client selected");

    let (credentials, query) = match cli.command {
        Commands::Server { .. } => {
            let service = Arc::new(ConnectionService::new(terminal));
            mtbridge_api::start_server(service, &config.server.bind).await?;
            return Ok(());
        }
        Commands::Connect(account) => (account.credentials(), Query::Connect),
        Commands::Account(account) => (account.credentials(), Query::Account),
        Commands::Positions(account) => (account.credentials(), Query::Positions),
        Commands::History {
            account,
            symbol,
            from_date,
            to_date,
            limit,
        } => (
            account.credentials(),
            Query::History(HistoryRequest {
                symbol,
                from_date,
                to_date,
                limit: Some(limit),
            }),
        ),
    };

    let (ok, output) = commands::run_standalone(terminal, &credentials, query).await;
    println!("{}", serde_json::to_string_pretty(&output)?);
    std::process::exit(if ok { 0 } else { 1 });
}
