mod halfkay;
mod hex;
mod images;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use halfkay::Attached;
use images::Images;

/// 100 ms polls while the keyboard re-enumerates as HalfKay.
const BOOTLOADER_WAIT_ATTEMPTS: u32 = 50;

#[derive(Parser)]
#[command(name = "trikey-cli")]
#[command(about = "Trikey firmware flasher and shortcut image tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Flash a .hex firmware file to Teensy via HalfKay bootloader
    Flash {
        /// Path to the Intel HEX firmware file
        firmware: PathBuf,
    },
    /// Report whether the bootloader or the running keyboard is attached
    Detect,
    /// Decode and print the shortcuts held in EEPROM images
    Shortcuts {
        /// Internal EEPROM image (.eep Intel HEX or raw binary)
        #[arg(long)]
        internal: PathBuf,
        /// First 24LC512 image
        #[arg(long)]
        bulk_a: PathBuf,
        /// Second 24LC512 image
        #[arg(long)]
        bulk_b: PathBuf,
    },
    /// Write blank, formatted EEPROM images
    Format {
        /// Directory to write internal.eep, bulk-a.bin and bulk-b.bin into
        #[arg(long)]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Flash { firmware } => flash(&firmware)?,
        Command::Detect => match halfkay::detect()? {
            Attached::Bootloader => println!("Teensy bootloader detected (HalfKay mode)."),
            Attached::Keyboard => println!("Trikey keyboard detected (running firmware)."),
            Attached::Nothing => {
                println!("Neither the Trikey nor the Teensy bootloader was detected.");
                println!("Press the reset button on the Teensy to enter bootloader mode.");
            }
        },
        Command::Shortcuts {
            internal,
            bulk_a,
            bulk_b,
        } => {
            let mut images = Images::load(&internal, &bulk_a, &bulk_b)?;
            print!("{}", images.shortcuts()?);
        }
        Command::Format { out_dir } => {
            Images::blank()?.save(&out_dir)?;
            info!("blank images written to {}", out_dir.display());
        }
    }

    Ok(())
}

fn flash(firmware: &Path) -> Result<()> {
    let contents = fs::read_to_string(firmware)
        .with_context(|| format!("reading {}", firmware.display()))?;

    let segments = hex::parse_hex(&contents).context("parsing Intel HEX file")?;
    let (base_address, data) =
        hex::flatten_segments(&segments).context("flattening HEX segments")?;

    info!(
        "Firmware: {} bytes at base address 0x{:04X}",
        data.len(),
        base_address
    );

    match halfkay::detect()? {
        Attached::Bootloader => {}
        Attached::Keyboard => {
            info!("Rebooting keyboard into bootloader...");
            halfkay::reboot_to_bootloader()?;
            if !halfkay::wait_for_bootloader(BOOTLOADER_WAIT_ATTEMPTS)? {
                bail!(
                    "Teensy bootloader not detected after reboot. \
                     Press the reset button on the Teensy and try again."
                );
            }
        }
        Attached::Nothing => bail!(
            "Teensy bootloader not detected and keyboard not found. \
             Press the reset button on the Teensy and try again."
        ),
    }

    halfkay::flash(base_address, &data)
}
