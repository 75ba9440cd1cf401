//! cropscan - field client for plant-disease detection.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the inference service is up.
    Health,
    /// Run single-shot detection on one image.
    Detect {
        /// Image file (JPEG or PNG).
        image: PathBuf,
    },
    /// Stream frames to the inference service until a result is accepted.
    Stream {
        /// Image file re-read on every capture, or a directory cycled in name order.
        #[arg(long)]
        frames: PathBuf,
        /// Stop on the first detection at or above this confidence.
        #[arg(long, value_name = "CONF")]
        act_above: Option<f64>,
        /// Give up after this many seconds.
        #[arg(long, value_name = "SECS")]
        max_duration: Option<u64>,
    },
    /// Log in to the backend.
    Login {
        #[arg(long, env = "CROPSCAN_USERNAME")]
        username: String,
        #[arg(long, env = "CROPSCAN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget stored credentials.
    Logout,
    /// Show the logged-in user.
    Whoami,
    /// Look up disease information for a detection label.
    Disease {
        /// Label as reported by the model (e.g. "sauvebua").
        label: String,
    },
    /// File a disease report, detecting the disease from an image.
    Report {
        /// Image of the affected plant.
        #[arg(long)]
        image: PathBuf,
        /// Plant plot the report is filed against.
        #[arg(long, value_name = "ID")]
        plot: i64,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command).await {
        error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,cropscan=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Health => commands::health().await,
        Command::Detect { image } => commands::detect(&image).await,
        Command::Stream {
            frames,
            act_above,
            max_duration,
        } => commands::stream(&frames, act_above, max_duration).await,
        Command::Login { username, password } => commands::login(username, password).await,
        Command::Logout => commands::logout().await,
        Command::Whoami => commands::whoami().await,
        Command::Disease { label } => commands::disease(&label).await,
        Command::Report { image, plot, notes } => commands::report(&image, plot, notes).await,
    }
}
