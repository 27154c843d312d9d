//! shipline CLI tool.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "shipline")]
#[command(about = "Build, package, publish, sign and scan a Maven application", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, env = "SHIPLINE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Load secrets, then run the pipeline
    Run {
        /// Path to the pipeline file
        #[arg(long, short, env = "SHIPLINE_CONFIG", default_value = "shipline.kdl")]
        config: PathBuf,
        /// Source directory, overriding the pipeline file
        #[arg(long)]
        source: Option<PathBuf>,
        /// Publish under this tag instead of the configured policy
        #[arg(long)]
        tag: Option<String>,
        /// Leave out the sign stage
        #[arg(long)]
        skip_sign: bool,
        /// Leave out the scan stage
        #[arg(long)]
        skip_scan: bool,
    },
    /// Validate a pipeline file
    Validate {
        /// Path to the pipeline file
        #[arg(default_value = "shipline.kdl")]
        path: PathBuf,
    },
    /// Load the secrets and list their names
    Secrets {
        /// Path to the pipeline file
        #[arg(long, short, env = "SHIPLINE_CONFIG", default_value = "shipline.kdl")]
        config: PathBuf,
    },
    /// Print the tag the next run would publish under
    Tag {
        /// Path to the pipeline file
        #[arg(long, short, env = "SHIPLINE_CONFIG", default_value = "shipline.kdl")]
        config: PathBuf,
        /// Source directory, overriding the pipeline file
        #[arg(long)]
        source: Option<PathBuf>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let result = match cli.command {
        Commands::Run {
            config,
            source,
            tag,
            skip_sign,
            skip_scan,
        } => {
            let options = commands::run::RunOptions {
                config,
                source,
                tag,
                skip_sign,
                skip_scan,
            };
            commands::run::run(options).await
        }
        Commands::Validate { path } => commands::validate(&path),
        Commands::Secrets { config } => commands::secrets::list(&config).await,
        Commands::Tag { config, source } => commands::tag::show(&config, source.as_deref()),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
