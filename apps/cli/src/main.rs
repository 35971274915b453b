use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ctrlfw_core::config::ControllerConfig;
use ctrlfw_core::events::TracingObserver;
use ctrlfw_core::http::{self, Controller, HttpReply, UploadChunk};
use ctrlfw_core::platform::{DirSystem, MemoryFlash};
use ctrlfw_core::update::{INFO_REGION, InfoAccumulator, UpdateGate, UpdateTarget};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Controller firmware update simulator", long_about = None)]
struct Args {
    /// Controller configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the info region of a firmware image
    Info { image: PathBuf },

    /// Validate the info region of a firmware image without flashing
    Check {
        image: PathBuf,

        /// Accept images older than the running version
        #[arg(long)]
        allow_downgrade: bool,

        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,
    },

    /// Validate and flash an image, then restart
    Flash {
        image: PathBuf,

        /// Image is a filesystem image
        #[arg(long)]
        filesystem: bool,

        /// Directory the committed image is written to
        #[arg(long, default_value = ".")]
        slot_dir: PathBuf,

        /// Persistent storage directory
        #[arg(long, default_value = "storage")]
        storage: PathBuf,

        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,
    },

    /// Wipe the storage directory
    FactoryReset {
        /// Persistent storage directory
        #[arg(long, default_value = "storage")]
        storage: PathBuf,

        /// Confirm the reset
        #[arg(long)]
        i_know_what_i_am_doing: bool,
    },

    /// Write the default configuration
    InitConfig { path: PathBuf },
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => ControllerConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ControllerConfig::default(),
    };

    match args.command {
        Command::Info { image } => show_info(&image),
        Command::Check {
            image,
            allow_downgrade,
            chunk_size,
        } => check(&config, &image, !allow_downgrade, chunk_size),
        Command::Flash {
            image,
            filesystem,
            slot_dir,
            storage,
            chunk_size,
        } => {
            let target = if filesystem {
                UpdateTarget::Filesystem
            } else {
                UpdateTarget::Firmware
            };
            flash(&config, &image, target, &slot_dir, &storage, chunk_size)
        }
        Command::FactoryReset {
            storage,
            i_know_what_i_am_doing,
        } => factory_reset(&config, &storage, i_know_what_i_am_doing),
        Command::InitConfig { path } => {
            config.save_to_file(&path)?;
            info!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn controller(config: &ControllerConfig, storage: &Path) -> Controller<MemoryFlash, DirSystem> {
    Controller::new(
        config,
        MemoryFlash::new(16 * 1024 * 1024),
        DirSystem::new(storage),
        UpdateGate::default(),
        Arc::new(TracingObserver),
    )
}

fn chunks(image: &[u8], size: usize) -> impl Iterator<Item = UploadChunk<'_>> {
    let size = size.max(1);
    let count = image.len().div_ceil(size);
    image.chunks(size).enumerate().map(move |(i, data)| UploadChunk {
        index: i * size,
        data,
        is_final: i + 1 == count,
        total_len: image.len(),
    })
}

fn finish(endpoint: &str, reply: Option<HttpReply>) -> Result<()> {
    let Some(reply) = reply else {
        bail!("{} produced no reply", endpoint);
    };
    info!(status = reply.status, "{} replied: {}", endpoint, reply.body);
    if !reply.is_success() {
        bail!("{} rejected the upload ({})", endpoint, reply.status);
    }
    Ok(())
}

fn show_info(path: &Path) -> Result<()> {
    let image = read_image(path)?;
    let mut acc = InfoAccumulator::new(INFO_REGION);
    acc.feed(0, &image);

    let Some(record) = acc.record().filter(|_| acc.found()) else {
        bail!("{} has no info page", path.display());
    };
    println!("Name:     {}", record.name());
    println!("Version:  {}", record.version);
    match (acc.embedded(), acc.calculated()) {
        (Some(embedded), Some(calculated)) if embedded == calculated => {
            println!("Checksum: {:#010x} (ok)", embedded)
        }
        (Some(embedded), Some(calculated)) => println!(
            "Checksum: {:#010x} (calculated {:#010x}, CORRUPTED)",
            embedded, calculated
        ),
        _ => println!("Checksum: missing"),
    }
    Ok(())
}

fn check(config: &ControllerConfig, path: &Path, detect_downgrade: bool, chunk_size: usize) -> Result<()> {
    let image = read_image(path)?;
    if image.len() < INFO_REGION.end() {
        bail!("{} ends before the info region {}", path.display(), INFO_REGION);
    }
    let region = &image[INFO_REGION.start..INFO_REGION.end()];

    let storage = std::env::temp_dir();
    let mut controller = controller(config, &storage);
    let reply = chunks(region, chunk_size)
        .filter_map(|chunk| controller.check_firmware(chunk, detect_downgrade))
        .last();
    finish(http::CHECK_FIRMWARE, reply)
}

fn flash(
    config: &ControllerConfig,
    path: &Path,
    target: UpdateTarget,
    slot_dir: &Path,
    storage: &Path,
    chunk_size: usize,
) -> Result<()> {
    let image = read_image(path)?;
    let mut controller = controller(config, storage);

    let endpoint = match target {
        UpdateTarget::Firmware => http::FLASH_FIRMWARE,
        UpdateTarget::Filesystem => http::FLASH_FILESYSTEM,
    };
    let reply = chunks(&image, chunk_size)
        .filter_map(|chunk| match target {
            UpdateTarget::Firmware => controller.flash_firmware(chunk),
            UpdateTarget::Filesystem => controller.flash_filesystem(chunk),
        })
        .last();
    finish(endpoint, reply)?;

    let committed = controller
        .updater()
        .flash()
        .committed(target)
        .context("no image committed")?;
    let slot = slot_dir.join(format!("{}.bin", target));
    std::fs::write(&slot, &committed).with_context(|| format!("writing {}", slot.display()))?;
    info!(len = committed.len(), "Wrote {}", slot.display());

    controller.tick(config.restart_delay_ms);
    if controller.system().restarted() {
        info!("Controller restarted");
    }
    Ok(())
}

fn factory_reset(config: &ControllerConfig, storage: &Path, confirmed: bool) -> Result<()> {
    let mut controller = controller(config, storage);
    let body = format!(r#"{{"{}": {}}}"#, http::FACTORY_RESET_CONFIRMATION, confirmed);

    let reply = controller.factory_reset_request(&body);
    finish(http::FACTORY_RESET, Some(reply))?;

    controller.tick(config.factory_reset_delay_ms);
    if !controller.system().restarted() {
        bail!("factory reset did not run");
    }
    Ok(())
}
