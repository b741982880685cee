mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stagerun",
    version,
    about = "Run one pipeline stage against an object and record its status"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke a stage for the object described by an event file
    Invoke {
        /// Path to stage config YAML file
        #[arg(long)]
        config: PathBuf,
        /// Path to the invocation event JSON file
        #[arg(long)]
        event: PathBuf,
        /// Invoking function identity, e.g. "sdlf-engineering-stageA-process"
        #[arg(long)]
        function_name: String,
    },
    /// Validate configuration and open every store
    Check {
        /// Path to stage config YAML file
        #[arg(long)]
        config: PathBuf,
    },
    /// Manage pipeline runs in an environment's ledger
    Runs {
        #[command(subcommand)]
        command: RunsCommand,
    },
    /// Manage manifest control records
    Manifest {
        #[command(subcommand)]
        command: ManifestCommand,
    },
    /// List registered transforms and the configured stage bindings
    Transforms {
        /// Path to stage config YAML file
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum RunsCommand {
    /// Start a new run and print its id
    Start {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        env: String,
        /// Pipeline (dataset) name recorded on the run
        #[arg(long)]
        pipeline: String,
    },
    /// Show a run and its status history
    Show {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        env: String,
        run_id: String,
    },
}

#[derive(Subcommand)]
enum ManifestCommand {
    /// Register a new control record
    Register {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        key: String,
        #[arg(long)]
        dataset: String,
        #[arg(long)]
        datafile: String,
    },
    /// Show a control record and its per-stage status
    Show {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Invoke {
            config,
            event,
            function_name,
        } => commands::invoke::execute(&config, &event, &function_name).await,
        Commands::Check { config } => commands::check::execute(&config).await,
        Commands::Runs { command } => match command {
            RunsCommand::Start {
                config,
                env,
                pipeline,
            } => commands::runs::start(&config, &env, &pipeline).await,
            RunsCommand::Show {
                config,
                env,
                run_id,
            } => commands::runs::show(&config, &env, &run_id).await,
        },
        Commands::Manifest { command } => match command {
            ManifestCommand::Register {
                config,
                key,
                dataset,
                datafile,
            } => commands::manifest::register(&config, &key, &dataset, &datafile).await,
            ManifestCommand::Show { config, key } => {
                commands::manifest::show(&config, &key).await
            }
        },
        Commands::Transforms { config } => commands::transforms::execute(&config).await,
    }
}
