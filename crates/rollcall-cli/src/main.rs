use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "rollcall", version, about = "Rollcall attendance verification tools")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a configuration file and report suspicious settings.
    Check {
        /// Path to the YAML configuration
        #[arg(long, short, env = "ROLLCALL_CONFIG", default_value = "rollcall.yaml")]
        config: PathBuf,
    },

    /// Evaluate a location against the configured rooms and campus.
    Locate {
        #[arg(long, short, env = "ROLLCALL_CONFIG", default_value = "rollcall.yaml")]
        config: PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        /// Reported accuracy radius in metres
        #[arg(long, default_value_t = 10.0)]
        accuracy: f64,

        /// Check against this room. Without it the nearest room is reported.
        #[arg(long)]
        room: Option<String>,
    },

    /// Run an in-memory scenario: start a session, submit claims, print outcomes and risk.
    Simulate {
        #[arg(long, short, env = "ROLLCALL_CONFIG", default_value = "rollcall.yaml")]
        config: PathBuf,

        /// Room to hold the session in. Defaults to the first configured room.
        #[arg(long)]
        room: Option<String>,

        /// Number of students claiming presence
        #[arg(long, default_value_t = 5)]
        students: usize,
    },

    /// Validate exported attendance records against the record schema.
    Records {
        /// JSON file holding one record or an array of records
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Check { config } => commands::check::run(&config)?,
        Command::Locate {
            config,
            lat,
            lng,
            accuracy,
            room,
        } => commands::locate::run(&config, lat, lng, accuracy, room.as_deref())?,
        Command::Simulate {
            config,
            room,
            students,
        } => commands::simulate::run(&config, room.as_deref(), students).await?,
        Command::Records { file } => commands::records::run(&file)?,
    }

    Ok(())
}
