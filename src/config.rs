use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, ensure};
use clap::{ArgAction, Parser};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line interface. All runtime configuration is flag-driven; the
/// only configuration files are the OAuth client credentials (input) and the
/// token cache (managed by `auth`).
#[derive(Debug, Parser)]
#[command(name = "cloudframe", version, about = "cloud photo library framebuffer frame")]
pub struct Args {
    /// Path to the framebuffer device
    #[arg(short = 'd', long, value_name = "PATH", default_value = "/dev/fb0")]
    pub device: PathBuf,

    /// Rotation interval between photos (e.g. "10s", "2m")
    #[arg(
        short = 't',
        long,
        value_name = "DURATION",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub interval: Duration,

    /// Path to the OAuth client credentials JSON file
    #[arg(short = 'c', long, value_name = "FILE", default_value = "./credentials.json")]
    pub credentials: PathBuf,

    /// Media items requested per library search page
    #[arg(long, value_name = "N", default_value_t = 50)]
    pub page_size: i32,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.interval > Duration::ZERO,
            "rotation interval must be greater than zero"
        );
        ensure!(
            (1..=100).contains(&self.page_size),
            "page size must be between 1 and 100, got {}",
            self.page_size
        );
        Ok(self)
    }
}

pub fn init_tracing(verbosity: u8) {
    // map -v to log level; RUST_LOG takes precedence when set
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cloudframe={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
