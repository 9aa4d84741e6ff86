use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rusb::{Device, DeviceHandle, GlobalContext};
use std::time::Duration;

use trikey_core::usb::descriptors::{PRODUCT_ID, VENDOR_ID};

/// Teensy 2.0 HalfKay bootloader USB identifiers.
const HALFKAY_VID: u16 = 0x16C0;
const HALFKAY_PID: u16 = 0x0478;

/// Vendor request the firmware answers by jumping to the bootloader.
const REQUEST_TYPE_VENDOR_OUT: u8 = 0x40;
const REQUEST_BOOTLOADER: u8 = 0xFF;

/// ATmega32U4 flash page size in bytes.
const PAGE_SIZE: usize = 128;

/// Flash available to the application; HalfKay occupies the top 512 bytes.
const FLASH_SIZE: usize = 32768 - 512;

/// USB control transfer timeout.
const USB_TIMEOUT: Duration = Duration::from_secs(2);

/// Delay after each page write to allow flash programming.
const PAGE_WRITE_DELAY: Duration = Duration::from_millis(5);

/// What is currently plugged in, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attached {
    Bootloader,
    Keyboard,
    Nothing,
}

fn find(vendor_id: u16, product_id: u16) -> Result<Option<Device<GlobalContext>>> {
    let devices = rusb::devices().context("failed to enumerate USB devices")?;
    for device in devices.iter() {
        let desc = device
            .device_descriptor()
            .context("failed to read device descriptor")?;
        if desc.vendor_id() == vendor_id && desc.product_id() == product_id {
            return Ok(Some(device));
        }
    }
    Ok(None)
}

/// Look for the bootloader first, then the running keyboard.
pub fn detect() -> Result<Attached> {
    if find(HALFKAY_VID, HALFKAY_PID)?.is_some() {
        return Ok(Attached::Bootloader);
    }
    if find(VENDOR_ID, PRODUCT_ID)?.is_some() {
        return Ok(Attached::Keyboard);
    }
    Ok(Attached::Nothing)
}

/// Ask a running keyboard to jump into HalfKay. Returns false when no
/// keyboard is attached.
pub fn reboot_to_bootloader() -> Result<bool> {
    let Some(device) = find(VENDOR_ID, PRODUCT_ID)? else {
        return Ok(false);
    };
    let handle = device
        .open()
        .context("failed to open keyboard (may need root/sudo or udev rules)")?;
    // The keyboard detaches before the status stage, so the transfer may fail.
    if let Err(err) = handle.write_control(
        REQUEST_TYPE_VENDOR_OUT,
        REQUEST_BOOTLOADER,
        0,
        0,
        &[],
        USB_TIMEOUT,
    ) {
        debug!("bootloader request ended with {}", err);
    }
    Ok(true)
}

/// Poll for the bootloader to enumerate after a reboot request.
pub fn wait_for_bootloader(attempts: u32) -> Result<bool> {
    for _ in 0..attempts {
        std::thread::sleep(Duration::from_millis(100));
        if detect()? == Attached::Bootloader {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Open the Teensy HalfKay bootloader device.
fn open_device() -> Result<DeviceHandle<GlobalContext>> {
    let Some(device) = find(HALFKAY_VID, HALFKAY_PID)? else {
        bail!("Teensy bootloader not found. Press the reset button on the Teensy and try again.");
    };
    device
        .open()
        .context("failed to open Teensy bootloader (may need root/sudo or udev rules)")
}

/// Flash firmware data to the Teensy via HalfKay protocol.
///
/// `base_address` is the starting address of the firmware image.
/// `data` is the firmware binary, which will be split into 128-byte pages.
pub fn flash(base_address: u32, data: &[u8]) -> Result<()> {
    check_fits(base_address, data.len())?;
    let handle = open_device()?;

    let total_pages = data.len().div_ceil(PAGE_SIZE);
    let pb = ProgressBar::new(total_pages as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} pages")
            .context("invalid progress template")?
            .progress_chars("=> "),
    );
    pb.set_message("Flashing");

    for (page_idx, chunk) in data.chunks(PAGE_SIZE).enumerate() {
        let address = base_address as usize + page_idx * PAGE_SIZE;

        // Erased pages need no write.
        if chunk.iter().all(|&b| b == 0xFF) {
            pb.inc(1);
            continue;
        }

        write_page(&handle, &page_buffer(address, chunk))
            .with_context(|| format!("failed to write page at address 0x{:04X}", address))?;

        std::thread::sleep(PAGE_WRITE_DELAY);
        pb.inc(1);
    }

    pb.finish_with_message("Flashed");

    reboot(&handle);
    info!("Teensy rebooted. Firmware should be running.");

    Ok(())
}

fn check_fits(base_address: u32, len: usize) -> Result<()> {
    if base_address as usize + len > FLASH_SIZE {
        bail!(
            "firmware too large: {} bytes at offset 0x{:04X} exceeds {} byte flash",
            len,
            base_address,
            FLASH_SIZE
        );
    }
    Ok(())
}

/// Two address bytes (little-endian) followed by the page, padded with 0xFF.
fn page_buffer(address: usize, chunk: &[u8]) -> Vec<u8> {
    let mut buf = vec![0xFFu8; 2 + PAGE_SIZE];
    buf[0] = (address & 0xFF) as u8;
    buf[1] = ((address >> 8) & 0xFF) as u8;
    buf[2..2 + chunk.len()].copy_from_slice(chunk);
    buf
}

/// Write a single page via HalfKay USB control transfer.
fn write_page(handle: &DeviceHandle<GlobalContext>, buf: &[u8]) -> Result<()> {
    // HID SET_REPORT, output report 0, interface 0
    handle
        .write_control(0x21, 0x09, 0x0200, 0, buf, USB_TIMEOUT)
        .context("USB control transfer failed")?;
    Ok(())
}

/// Send reboot command to Teensy (write to address 0xFFFF).
fn reboot(handle: &DeviceHandle<GlobalContext>) {
    let buf = page_buffer(0xFFFF, &[]);
    // The device disconnects immediately, so the result is meaningless.
    let _ = handle.write_control(0x21, 0x09, 0x0200, 0, &buf, USB_TIMEOUT);
}
