use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, name = "francine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Start the coordinator that manages render workers")]
    Master {
        #[arg(long, help = "The path to a TOML configuration file")]
        config: Option<PathBuf>,
    },
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(args);

    match cli.command {
        Command::Master { config } => crate::coordinator::run_master(config.as_deref()),
    }
}
