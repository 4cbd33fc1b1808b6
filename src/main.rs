//! `neoscene` - text-to-scene generation with a live simulation server
//!
//! This binary provides the CLI for serving the WebSocket API, exporting
//! SceneSpec files to MJCF offline, and inspecting the asset catalog.

use anyhow::{Context, Result};
use clap::Parser;
use console::Style;

use crate::cli::{Cli, Commands};
use neoscene_core::assets::AssetCatalog;
use neoscene_core::exporter;
use neoscene_core::{Config, SceneSpec};

mod cli;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        let blue = Style::new().blue();
        println!(
            "{} v{} ({})",
            blue.apply_to("neoscene"),
            env!("CARGO_PKG_VERSION"),
            env!("GIT_HASH")
        );
        return Ok(());
    }

    let mut config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Some(Commands::Serve { port }) => {
            if let Some(port) = port {
                config.server.port = port;
            }
            server::start_server(config).await?;
        }

        Some(Commands::Run { scene, output }) => {
            let json = std::fs::read_to_string(&scene)
                .with_context(|| format!("Failed to read {}", scene.display()))?;
            let spec: SceneSpec =
                serde_json::from_str(&json).context("Failed to parse scene JSON")?;
            println!("Loaded scene: {}", spec.name);

            let catalog = AssetCatalog::new(&config.assets.root)
                .context("Failed to load asset catalog")?;
            println!(
                "Loaded {} assets from {}",
                catalog.len(),
                config.assets.root.display()
            );

            let compiled = exporter::compile(&spec, &catalog, exporter::DEFAULT_SEED)
                .context("Failed to generate MJCF")?;
            println!("Generated MJCF ({} bytes)", compiled.mjcf_xml.len());

            match output {
                Some(path) => {
                    exporter::write_scene_to_file(&spec, &catalog, &path, exporter::DEFAULT_SEED)?;
                    println!("Wrote {}", path.display());
                }
                None => {
                    println!("{}", compiled.mjcf_xml);
                }
            }
        }

        Some(Commands::Assets { category }) => {
            let catalog = AssetCatalog::new(&config.assets.root)
                .context("Failed to load asset catalog")?;
            let filter = category
                .map(|c| {
                    c.parse::<neoscene_core::assets::AssetCategory>()
                        .map_err(|e| anyhow::anyhow!(e))
                })
                .transpose()?;

            let green = Style::new().green();
            let assets = catalog.list(filter);
            for manifest in &assets {
                println!(
                    "{:<28} {:<12} {}",
                    green.apply_to(&manifest.asset_id),
                    manifest.category,
                    manifest.name
                );
            }
            println!("{} asset(s)", assets.len());
        }

        None => {
            println!("No command given. Try `neoscene serve` or `neoscene --help`.");
        }
    }

    Ok(())
}
