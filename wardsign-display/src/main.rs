//! WardSign Display Agent - signage screen runtime
//!
//! - Liveness heartbeats to the display registry
//! - View rotation (Mixed dashboards, kiosk mode)
//! - Hospital data refresh from the registry or local CSV snapshots
//! - Text frames on stdout, operator commands on stdin

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wardsign_display::config::{DisplayAgentConfig, SourceConfig};
use wardsign_display::fetch::{AnySource, CsvSource, RegistrySource, SnapshotFetcher};
use wardsign_display::heartbeat::{HttpHeartbeatSink, LivenessReporter, Visibility};
use wardsign_display::session::{Command, DisplaySession, SessionOptions};

#[derive(Parser, Debug)]
#[command(name = "wardsign-display")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/wardsign-display/config.toml)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Display identifier known to the registry
    #[arg(long = "display-id")]
    display_id: Option<String>,

    /// Registry base URL
    #[arg(long = "registry-url", value_name = "URL")]
    registry_url: Option<String>,

    /// Read hospital data from CSV files in this directory instead of the registry
    #[arg(long = "csv-dir", value_name = "DIR")]
    csv_dir: Option<PathBuf>,

    /// Whole-screen rotation (interval clamped to 10-120s)
    #[arg(short = 'k', long = "kiosk")]
    kiosk: bool,

    /// Animate the first snapshot locally instead of polling for data
    #[arg(short = 's', long = "simulate")]
    simulate: bool,

    /// Seed for the simulation
    #[arg(long = "seed")]
    seed: Option<u64>,

    /// Do not clear the screen between frames
    #[arg(long = "plain")]
    plain: bool,
}

impl Cli {
    fn apply(self, config: &mut DisplayAgentConfig) {
        if let Some(id) = self.display_id {
            config.display_id = id;
        }
        if let Some(url) = self.registry_url {
            config.registry_url = url;
        }
        if let Some(dir) = self.csv_dir {
            config.source = SourceConfig::Csv { data_dir: dir };
        }
        config.kiosk |= self.kiosk;
        config.simulate |= self.simulate;
        if self.seed.is_some() {
            config.simulation_seed = self.seed;
        }
    }
}

/// Operator console: `hide`, `show`, `pin <view>`, `resume`, `quit`
fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    match words.next()? {
        "hide" => Some(Command::Visibility(Visibility::Hidden)),
        "show" => Some(Command::Visibility(Visibility::Visible)),
        "pin" => words.next()?.parse().ok().map(Command::Pin),
        "resume" => Some(Command::Resume),
        "quit" | "exit" => Some(Command::Shutdown),
        _ => None,
    }
}

fn spawn_console(tx: mpsc::Sender<Command>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_command(&line) {
                Some(command) => {
                    if tx.send(command).await.is_err() {
                        break;
                    }
                }
                None => warn!("Unknown command: {}", line.trim()),
            }
        }
    });
}

fn spawn_signal_handler(tx: mpsc::Sender<Command>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            let _ = tx.send(Command::Shutdown).await;
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, frames own stdout)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let plain = cli.plain;
    let mut config = DisplayAgentConfig::load(cli.config.as_deref())
        .await
        .context("Failed to load display configuration")?;
    cli.apply(&mut config);

    info!("WardSign display {} starting ({:?})", config.display_id, config.source);

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let source = match &config.source {
        SourceConfig::Registry => {
            AnySource::Registry(RegistrySource::new(client.clone(), &config.registry_url, &config.display_id))
        }
        SourceConfig::Csv { data_dir } => AnySource::Csv(CsvSource::new(data_dir.clone())),
    };

    let reporter = LivenessReporter::new(
        HttpHeartbeatSink::new(client, &config.registry_url),
        config.display_id.clone(),
        config.heartbeat_interval(),
        config.beacon_timeout(),
    );
    let mut session = DisplaySession::new(reporter, SnapshotFetcher::new(source), SessionOptions::from_config(&config));

    let (tx, mut commands) = mpsc::channel(16);
    spawn_console(tx.clone());
    spawn_signal_handler(tx);

    let mut stdout = std::io::stdout();
    session
        .run(&mut commands, |frame| {
            if !plain {
                let _ = write!(stdout, "\x1b[2J\x1b[H");
            }
            let _ = write!(stdout, "{frame}");
            let _ = stdout.flush();
        })
        .await;

    session.teardown().await;
    info!("WardSign display stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wardsign_display::model::ViewId;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("pin ot"), Some(Command::Pin(ViewId::Ot)));
        assert_eq!(parse_command("  hide "), Some(Command::Visibility(Visibility::Hidden)));
        assert_eq!(parse_command("pin lobby"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("quit"), Some(Command::Shutdown));
    }

    #[test]
    fn test_cli_overrides_file_config() {
        let cli = Cli::parse_from(["wardsign-display", "--display-id", "DISP-009", "--csv-dir", "/data", "--kiosk"]);
        let mut config = DisplayAgentConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.display_id, "DISP-009");
        assert_eq!(config.source, SourceConfig::Csv { data_dir: "/data".into() });
        assert!(config.kiosk);
    }
}
