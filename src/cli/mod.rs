use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Neoscene - turn natural-language prompts into live physics scenes
#[derive(Parser, Debug)]
#[command(name = "neoscene", about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Print version information
    #[arg(long, short = 'V')]
    pub version: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the WebSocket API server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Export a SceneSpec JSON file to MJCF
    Run {
        /// Path to the SceneSpec JSON file
        scene: PathBuf,

        /// Write the generated MJCF XML to this path
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// List the asset catalog
    Assets {
        /// Filter by category (environment, vehicle, prop, ...)
        #[arg(long, short)]
        category: Option<String>,
    },
}
