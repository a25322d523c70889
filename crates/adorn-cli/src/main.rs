use std::path::PathBuf;

use adorn_core::assets::list_asset_files;
use adorn_core::JewelryCategory;
use adorn_hw::Camera;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

mod config;
mod engine;

use config::Config;
use engine::spawn_engine;

#[derive(Parser)]
#[command(name = "adorn", about = "Adorn virtual jewelry try-on CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Category {
    Earring,
    Necklace,
}

impl From<Category> for JewelryCategory {
    fn from(c: Category) -> Self {
        match c {
            Category::Earring => JewelryCategory::Earring,
            Category::Necklace => JewelryCategory::Necklace,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a still try-on composite
    Snapshot {
        /// Earring image to wear
        #[arg(long)]
        earring: Option<PathBuf>,
        /// Necklace image to wear
        #[arg(long)]
        necklace: Option<PathBuf>,
    },
    /// Cycle through every asset in a folder, capturing one composite each
    TryAll {
        /// Jewelry category to cycle
        #[arg(value_enum)]
        category: Category,
        /// Asset folder (defaults to <asset dir>/<category>s)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show current tunable parameters as TOML
    Params {
        /// Write the defaults to the params file
        #[arg(long)]
        write_defaults: bool,
    },
    /// List available cameras
    Devices,
    /// Run camera and model diagnostics
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Snapshot { earring, necklace } => {
            let handle = spawn_engine(&config)?;
            if let Some(path) = earring {
                handle.load_asset(JewelryCategory::Earring, path).await?;
            }
            if let Some(path) = necklace {
                handle.load_asset(JewelryCategory::Necklace, path).await?;
            }

            let png = handle.snapshot().await?;
            let name = format!("jewelry-{}.png", chrono::Local::now().format("%Y%m%d-%H%M%S"));
            let out = config.output_dir.join(name);
            std::fs::write(&out, png)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Saved {}", out.display());
        }
        Commands::TryAll { category, dir } => {
            let category: JewelryCategory = category.into();
            let dir = dir.unwrap_or_else(|| {
                config.asset_dir.join(format!("{}s", category.name()))
            });
            let paths = list_asset_files(&dir)
                .with_context(|| format!("failed to list assets in {}", dir.display()))?;
            if paths.is_empty() {
                anyhow::bail!("no image assets found in {}", dir.display());
            }

            let handle = spawn_engine(&config)?;
            let looks = handle.try_all(category, paths).await?;
            for (i, look) in looks.iter().enumerate() {
                let out = config.output_dir.join(format!("look_{}.png", i + 1));
                std::fs::write(&out, &look.png)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                println!("Saved {} ({})", out.display(), look.asset_id);
            }
        }
        Commands::Params { write_defaults } => {
            if write_defaults {
                let params = adorn_core::TryOnParams::default();
                if let Some(parent) = config.params_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&config.params_path, params.to_toml())?;
                println!("Wrote defaults to {}", config.params_path.display());
            } else {
                print!("{}", config.load_params().to_toml());
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Test => {
            let handle = spawn_engine(&config)?;
            let status = handle.status().await?;
            println!("{status}");
        }
    }

    Ok(())
}
