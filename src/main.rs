use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use custontp::core::{ClientSettings, LogSink, ServerConfig, TimestampStyle, TracingSink, DEFAULT_PORT};
use custontp::core::settings::SETTINGS_FILE;
use custontp::network::{discover, TimeServer, DEFAULT_DISCOVERY_TIMEOUT};
use custontp::sync::SyncManager;

/// LAN time synchronization
#[derive(Parser, Debug)]
#[command(name = "custontp")]
#[command(about = "Serve, discover and apply LAN time", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the local clock until interrupted
    Server {
        /// TCP and UDP port
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Format of the served time
        #[arg(long, value_enum, default_value_t = Style::Utc)]
        style: Style,
    },

    /// Look for a server on the local network
    Discover {
        /// Port to probe; defaults to the saved one
        #[arg(short, long)]
        port: Option<u16>,

        /// How long to wait for a reply
        #[arg(long, default_value_t = DEFAULT_DISCOVERY_TIMEOUT.as_millis() as u64)]
        timeout_ms: u64,

        /// Settings file updated with the found address
        #[arg(long, default_value = SETTINGS_FILE)]
        settings: PathBuf,
    },

    /// Fetch the server time and set the system clock
    Sync {
        /// Server address; defaults to the saved one
        #[arg(long)]
        ip: Option<String>,

        /// Server port; defaults to the saved one
        #[arg(short, long)]
        port: Option<u16>,

        /// Locate the server by broadcast first
        #[arg(long)]
        discover: bool,

        /// Settings file holding the last used address
        #[arg(long, default_value = SETTINGS_FILE)]
        settings: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Style {
    /// UTC with milliseconds
    Utc,
    /// Local time, whole seconds
    Local,
}

impl From<Style> for TimestampStyle {
    fn from(style: Style) -> Self {
        match style {
            Style::Utc => TimestampStyle::Utc,
            Style::Local => TimestampStyle::LegacyLocal,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let log: Arc<dyn LogSink> = Arc::new(TracingSink);

    match args.command {
        Command::Server { port, style } => run_server(port, style.into(), log).await,
        Command::Discover {
            port,
            timeout_ms,
            settings,
        } => {
            let mut saved = ClientSettings::load(&settings);
            let port = port.map_or_else(|| saved.port(), Ok)?;
            if let Some(ip) = find_server(port, Duration::from_millis(timeout_ms), log.as_ref()).await? {
                saved.ip = ip.to_string();
                saved.port = port.to_string();
                saved.save(&settings)?;
            }
            Ok(())
        }
        Command::Sync {
            ip,
            port,
            discover,
            settings,
        } => {
            let mut saved = ClientSettings::load(&settings);
            let port = port.map_or_else(|| saved.port(), Ok)?;
            let mut ip = ip.unwrap_or_else(|| saved.ip.clone());

            if discover {
                match find_server(port, DEFAULT_DISCOVERY_TIMEOUT, log.as_ref()).await? {
                    Some(found) => ip = found.to_string(),
                    None => anyhow::bail!("no server answered on port {}", port),
                }
            }

            saved.ip = ip.clone();
            saved.port = port.to_string();
            saved.save(&settings)?;

            let mut manager = SyncManager::new(log);
            let outcome = manager.synchronize(&ip, port).await?;
            if !outcome.clock_changed() {
                anyhow::bail!("the system clock was not changed");
            }
            Ok(())
        }
    }
}

async fn run_server(port: u16, style: TimestampStyle, log: Arc<dyn LogSink>) -> anyhow::Result<()> {
    let config = ServerConfig {
        style,
        ..ServerConfig::with_port(port)
    };

    let mut server = TimeServer::new(config, log);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    server.stop().await;
    Ok(())
}

async fn find_server(port: u16, wait: Duration, log: &dyn LogSink) -> anyhow::Result<Option<IpAddr>> {
    log.emit("[CLIENT] Searching for server...");
    let found = discover(port, wait).await?;
    match found {
        Some(ip) => log.emit(&format!("[CLIENT] Server found: {}", ip)),
        None => log.emit("[CLIENT] Server not found"),
    }
    Ok(found)
}
