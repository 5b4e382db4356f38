mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use overwatch_core::config::DEFAULT_CONFIG_FILE;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "overwatch",
    about = "Hazard aggregation and preparedness pipeline for Philippine locations",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (missing file means defaults)
    #[arg(long, global = true, env = "OVERWATCH_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the four analysis jobs for a location
    Run {
        /// Latitude (default: pipeline.default_location)
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Longitude
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Location name used in prompts
        #[arg(long)]
        name: Option<String>,
        /// Household profile (YAML or JSON)
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Launch stage-two jobs together instead of one by one
        #[arg(long)]
        concurrent: bool,
    },

    /// Make one structured generation call
    Generate {
        /// Prompt text
        #[arg(long)]
        prompt: String,
        /// Schema hint reported on parse failures
        #[arg(long, default_value = "free-form JSON")]
        schema: String,
    },

    /// Fetch one hazard feed
    Feed {
        /// Feed name (e.g. usgs, open-meteo, pagasa-flood)
        name: String,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Start the HTTP API
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "3001")]
        port: u16,
        /// Profile used for runs that do not send one
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_path();
    let result = match cli.command {
        Commands::Run {
            lat,
            lon,
            name,
            profile,
            concurrent,
        } => cmd::run::run(
            config,
            cmd::run::RunArgs {
                coords: lat.zip(lon),
                name,
                profile,
                concurrent,
            },
            cli.json,
        ),
        Commands::Generate { prompt, schema } => cmd::generate::run(config, &prompt, &schema),
        Commands::Feed { name, lat, lon } => cmd::feed::run(config, &name, lat.zip(lon), cli.json),
        Commands::Serve { port, profile } => cmd::serve::run(config, port, profile),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
