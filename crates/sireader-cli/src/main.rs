//! Command line reader for SportIdent master stations

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use sireader_core::config::DriverConfig;
use sireader_core::dataframe::CardDataFrame;
use sireader_core::driver::{CommStatus, DriverExit, SiDriver, SiHandler};
use sireader_core::link::SerialLink;
use sireader_core::protocol::{list_ports, LOW_BAUD_RATE};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sireader", version, about = "Read SportIdent cards from a master station")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports, SportIdent stations first
    Ports,

    /// Run the driver and print station events
    Read {
        /// Serial port of the master station
        #[arg(short, long)]
        port: Option<String>,

        /// JSON configuration file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Use the low speed setting (4800 baud)
        #[arg(long, conflicts_with = "baud")]
        low_baud: bool,

        /// Answer timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

/// Prints driver events to stdout
struct PrintHandler {
    json: bool,
}

impl PrintHandler {
    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

impl SiHandler for PrintHandler {
    fn notify(&mut self, status: CommStatus) {
        if self.json {
            println!("{}", json!({ "status": status }));
        } else {
            println!("status: {:?}", status);
        }
    }

    fn notify_data(&mut self, frame: CardDataFrame) {
        if self.json {
            let blocks: Vec<String> = frame.blocks().iter().map(|b| Self::hex(b.data())).collect();
            println!(
                "{}",
                json!({
                    "series": frame.series(),
                    "read_at": frame.read_at().to_rfc3339(),
                    "blocks": blocks,
                })
            );
        } else {
            println!(
                "card: {} read at {} ({} block(s))",
                frame.series(),
                frame.read_at().format("%H:%M:%S"),
                frame.blocks().len()
            );
        }
    }

    fn notify_error(&mut self, status: CommStatus, message: &str) {
        if self.json {
            println!("{}", json!({ "status": status, "error": message }));
        } else {
            eprintln!("error: {:?}: {}", status, message);
        }
    }
}

fn print_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return;
    }
    for port in ports {
        let marker = if port.is_sportident() { "*" } else { " " };
        println!(
            "{} {} {}",
            marker,
            port.name,
            port.product.as_deref().unwrap_or("")
        );
    }
}

fn build_config(
    port: Option<String>,
    config: Option<PathBuf>,
    baud: Option<u32>,
    low_baud: bool,
    timeout_ms: Option<u64>,
) -> Result<DriverConfig> {
    let mut cfg = match config {
        Some(path) => DriverConfig::load(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DriverConfig::default(),
    };
    if let Some(port) = port {
        cfg.port_name = port;
    }
    if let Some(baud) = baud {
        cfg.baud_rate = baud;
    }
    if low_baud {
        cfg.baud_rate = LOW_BAUD_RATE;
    }
    if let Some(timeout_ms) = timeout_ms {
        cfg.timeout_ms = timeout_ms;
    }
    if cfg.port_name.is_empty() {
        bail!("no port given; use --port or a configuration file");
    }
    Ok(cfg)
}

async fn read(config: DriverConfig, json: bool) -> Result<()> {
    let link = SerialLink::open(&config)
        .with_context(|| format!("opening {}", config.port_name))?;
    let cancel = link.queue.cancellation();
    let handle = SiDriver::new(link.queue, link.writer, PrintHandler { json }).start();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping driver");
            cancel.cancel();
        }
    });

    let exit = handle.join().await;
    link.reader.abort();

    match exit {
        DriverExit::Stopped => Ok(()),
        DriverExit::Failed(message) => bail!(message),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Ports => {
            print_ports();
            Ok(())
        }
        Command::Read {
            port,
            config,
            baud,
            low_baud,
            timeout_ms,
            json,
        } => {
            let config = build_config(port, config, baud, low_baud, timeout_ms)?;
            read(config, json).await
        }
    }
}
