mod commands;

use clap::{Parser, Subcommand};

/// The kagan launcher: start the core process or tear down its state.
#[derive(Parser)]
#[command(name = "kagan", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Core process lifecycle.
    Core {
        #[command(subcommand)]
        command: CoreCommands,
    },
    /// Stop the core and remove its config/data/cache/worktree roots.
    Reset {
        /// Don't ask for confirmation.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum CoreCommands {
    /// Run the core process in the foreground until it is asked to stop.
    Start,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kagan_telemetry::logging::init_logging("kagan", "info");

    let cli = Cli::parse();
    match cli.command {
        Commands::Core { command: CoreCommands::Start } => commands::core_start::run().await,
        Commands::Reset { force } => commands::reset::run(force).await,
    }
}
