use anyhow::Result;
use clap::{Parser, Subcommand};
use ctrlfw_core::update::{FirmwareInfo, Version, stamp_info_region};
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run all tests
    Test,
    /// Write a synthetic firmware image with a valid info region
    Mkimage {
        /// Display name embedded in the image
        #[arg(long, default_value = "WARP Charger")]
        name: String,
        /// Version as major.minor.patch
        #[arg(long = "fw-version", default_value = "2.1.0")]
        version: Version,
        /// Image size in bytes
        #[arg(long, default_value_t = 0x20000)]
        size: usize,
        #[arg(short, long, default_value = "firmware.bin")]
        output: PathBuf,
    },
}

fn cargo(args: &[&str], what: &str) -> Result<()> {
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{} failed", what);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            cargo(&["build", "--workspace"], "Build")?;
        }
        Commands::Test => {
            println!("Running tests...");
            cargo(&["test", "--workspace"], "Test")?;
        }
        Commands::Mkimage {
            name,
            version,
            size,
            output,
        } => {
            let mut image: Vec<u8> = (0..*size).map(|i| (i % 251) as u8).collect();
            stamp_info_region(&mut image, &FirmwareInfo::new(name, *version));
            std::fs::write(output, &image)?;
            println!(
                "Wrote {} ({} bytes, {} {})",
                output.display(),
                image.len(),
                name,
                version
            );
        }
    }

    Ok(())
}
