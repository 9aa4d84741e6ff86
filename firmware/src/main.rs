//! Trikey firmware for ATmega32U4 (Teensy 2.0).
//!
//! Three keys, four layers, a 5x4 LED matrix and shortcut storage spread
//! over the internal EEPROM and two 24LC512 parts. All behaviour lives in
//! `trikey-core`; this crate only maps it onto registers:
//! - Timer0 (2 ms) scans one LED row
//! - Timer1 (5 ms) polls the switches
//! - USB_GEN / USB_COM run the control endpoint and idle reports
//! - the foreground loop handles keypresses

#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]
#![feature(asm_experimental_arch)]

mod board;
mod eeprom;
mod i2c;
mod usb;

use avr_device::atmega32u4::Peripherals;

use trikey_core::{Control, LayerController, Runtime, StorageController, Ticks, UsbController};

use board::{MatrixLines, Switches};
use eeprom::InternalEeprom;
use i2c::Eeprom24;
use usb::AvrUsb;

static TICKS: Ticks<Switches, MatrixLines> = Ticks::new(Switches, MatrixLines);
static USB: UsbController<AvrUsb> = UsbController::new(AvrUsb);

/// Panic handler: on AVR we just loop forever.
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[avr_device::interrupt(atmega32u4)]
fn TIMER0_COMPA() {
    TICKS.scan_leds();
}

#[avr_device::interrupt(atmega32u4)]
fn TIMER1_COMPA() {
    TICKS.poll_keys();
}

#[avr_device::interrupt(atmega32u4)]
fn USB_GEN() {
    USB.handle_general_interrupt();
}

#[avr_device::interrupt(atmega32u4)]
fn USB_COM() {
    if USB.handle_endpoint_interrupt() == Control::Bootloader {
        USB.detach();
        usb::jump_to_bootloader();
    }
}

#[no_mangle]
pub extern "C" fn main() -> ! {
    let dp = unsafe { Peripherals::steal() };

    board::init_clock(&dp);
    board::init_pins(&dp);
    board::init_timers(&dp);
    i2c::init(&dp.TWI);

    let link = USB.setup();

    // SAFETY: every static the handlers touch is const-initialised
    unsafe { avr_device::interrupt::enable() };

    let storage = StorageController::new(
        InternalEeprom::new(&dp.EEPROM),
        Eeprom24::new(&dp.TWI, i2c::BULK_A_ADDR),
        Eeprom24::new(&dp.TWI, i2c::BULK_B_ADDR),
    );
    let mut runtime = Runtime::new(&TICKS, LayerController::new(storage, &USB));
    runtime.start();
    if let Err(err) = link {
        // Keep going: the keys and LEDs still work without a host.
        runtime.report(Err(err.into()));
    }

    runtime.run()
}
