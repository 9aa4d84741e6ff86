//! ATmega32U4 USB controller registers behind [`UsbHardware`].

use avr_device::atmega32u4::{usb_device, Peripherals, PLL, USB_DEVICE};

use trikey_core::usb::{DeviceInterrupts, EndpointConfig, EndpointKind, EndpointStatus};
use trikey_core::UsbHardware;

// UEINTX
const TXINI: u8 = 0x01;
const RXOUTI: u8 = 0x04;
const RXSTPI: u8 = 0x08;
const RWAL: u8 = 0x20;
/// Clears FIFOCON and TXINI, leaving the other flags alone.
const RELEASE_BANK: u8 = 0x3A;

// UECONX
const EPEN: u8 = 0x01;
const STALLRQC: u8 = 0x10;
const STALLRQ: u8 = 0x20;

// UDINT
const SOFI: u8 = 0x04;
const EORSTI: u8 = 0x08;

// UECFG1X
const ALLOC: u8 = 0x02;
const DOUBLE_BANK: u8 = 0x04;

const ADDEN: u8 = 0x80;

/// The controller itself carries no state; every call goes to the registers.
pub struct AvrUsb;

impl AvrUsb {
    fn usb(&self) -> &'static usb_device::RegisterBlock {
        // SAFETY: single core; the USB registers are only touched here and
        // endpoint selection is guarded by the controller's critical sections
        unsafe { &*USB_DEVICE::ptr() }
    }

    fn pll(&self) -> &'static avr_device::atmega32u4::pll::RegisterBlock {
        // SAFETY: as above
        unsafe { &*PLL::ptr() }
    }

    fn size_code(size: u8) -> u8 {
        match size {
            0..=8 => 0x00,
            9..=16 => 0x10,
            17..=32 => 0x20,
            _ => 0x30,
        }
    }
}

impl UsbHardware for AvrUsb {
    fn power_up(&self) {
        self.usb().uhwcon.write(|w| w.uvrege().set_bit());
        self.usb()
            .usbcon
            .write(|w| w.usbe().set_bit().frzclk().set_bit());
    }

    fn start_pll(&self) {
        // 16 MHz crystal -> 48 MHz USB clock
        self.pll().pllcsr.write(|w| w.pindiv().set_bit().plle().set_bit());
    }

    fn pll_locked(&self) -> bool {
        self.pll().pllcsr.read().plock().bit_is_set()
    }

    fn enable_clock(&self) {
        self.usb()
            .usbcon
            .write(|w| w.usbe().set_bit().otgpade().set_bit());
    }

    fn enable_device_interrupts(&self) {
        self.usb()
            .udien
            .write(|w| w.eorste().set_bit().sofe().set_bit());
    }

    fn attach(&self) {
        self.usb().udcon.modify(|_, w| w.detach().clear_bit());
    }

    fn detach(&self) {
        self.usb().udcon.modify(|_, w| w.detach().set_bit());
    }

    fn take_device_interrupts(&self) -> DeviceInterrupts {
        let flags = self.usb().udint.read().bits();
        self.usb().udint.write(|w| unsafe { w.bits(0) });
        DeviceInterrupts {
            end_of_reset: flags & EORSTI != 0,
            start_of_frame: flags & SOFI != 0,
        }
    }

    fn select_endpoint(&self, endpoint: u8) {
        self.usb().uenum.write(|w| w.bits(endpoint & 0x07));
    }

    fn configure_endpoint(&self, config: &EndpointConfig) {
        let kind = match config.kind {
            EndpointKind::Control => 0x00,
            EndpointKind::Interrupt => 0xC0,
        };
        let direction = if config.direction_in { 0x01 } else { 0x00 };
        let bank = if config.double_bank { DOUBLE_BANK } else { 0 };

        let usb = self.usb();
        usb.ueconx.write(|w| unsafe { w.bits(EPEN) });
        usb.uecfg0x.write(|w| unsafe { w.bits(kind | direction) });
        usb.uecfg1x
            .write(|w| unsafe { w.bits(Self::size_code(config.size) | bank | ALLOC) });
        usb.ueienx
            .write(|w| unsafe { w.bits(if config.setup_interrupt { RXSTPI } else { 0 }) });
    }

    fn disable_endpoint(&self) {
        self.usb().ueconx.write(|w| unsafe { w.bits(0) });
    }

    fn reset_endpoints(&self, mask: u8) {
        self.usb().uerst.write(|w| unsafe { w.bits(mask) });
    }

    fn endpoint_status(&self) -> EndpointStatus {
        let flags = self.usb().ueintx.read().bits();
        EndpointStatus {
            setup_received: flags & RXSTPI != 0,
            in_ready: flags & TXINI != 0,
            out_received: flags & RXOUTI != 0,
            rw_allowed: flags & RWAL != 0,
        }
    }

    fn acknowledge_setup(&self) {
        self.usb()
            .ueintx
            .write(|w| unsafe { w.bits(!(RXSTPI | RXOUTI | TXINI)) });
    }

    fn send_in(&self) {
        self.usb().ueintx.write(|w| unsafe { w.bits(!TXINI) });
    }

    fn acknowledge_out(&self) {
        self.usb().ueintx.write(|w| unsafe { w.bits(!RXOUTI) });
    }

    fn release_fifo(&self) {
        self.usb().ueintx.write(|w| unsafe { w.bits(RELEASE_BANK) });
    }

    fn read_byte(&self) -> u8 {
        self.usb().uedatx.read().bits()
    }

    fn write_byte(&self, value: u8) {
        self.usb().uedatx.write(|w| w.bits(value));
    }

    fn stall(&self) {
        self.usb().ueconx.write(|w| unsafe { w.bits(STALLRQ | EPEN) });
    }

    fn clear_stall(&self) {
        self.usb().ueconx.write(|w| unsafe { w.bits(STALLRQC | EPEN) });
    }

    fn is_stalled(&self) -> bool {
        self.usb().ueconx.read().bits() & STALLRQ != 0
    }

    fn set_address(&self, address: u8) {
        self.usb()
            .udaddr
            .write(|w| unsafe { w.bits((address & 0x7F) | ADDEN) });
    }

    fn frame_number(&self) -> u8 {
        self.usb().udfnum.read().bits() as u8
    }
}

/// Disable all peripherals and jump to the HalfKay bootloader at 0x7E00.
pub fn jump_to_bootloader() -> ! {
    avr_device::interrupt::disable();

    // SAFETY: interrupts are off and nothing runs after the jump
    let dp = unsafe { Peripherals::steal() };

    dp.USB_DEVICE.usbcon.write(|w| w.frzclk().set_bit());

    // Give the host time to notice the disconnect.
    for _ in 0..20000u16 {
        unsafe { core::arch::asm!("nop") };
    }

    dp.EXINT.eimsk.write(|w| w.bits(0));
    dp.EEPROM.eecr.write(|w| unsafe { w.bits(0) });
    dp.TC0.timsk0.write(|w| unsafe { w.bits(0) });
    dp.TC1.timsk1.write(|w| unsafe { w.bits(0) });
    dp.TWI.twcr.write(|w| unsafe { w.bits(0) });

    dp.PORTB.ddrb.write(|w| unsafe { w.bits(0) });
    dp.PORTB.portb.write(|w| unsafe { w.bits(0) });
    dp.PORTD.ddrd.write(|w| unsafe { w.bits(0) });
    dp.PORTD.portd.write(|w| unsafe { w.bits(0) });
    dp.PORTF.ddrf.write(|w| unsafe { w.bits(0) });
    dp.PORTF.portf.write(|w| unsafe { w.bits(0) });

    unsafe { core::arch::asm!("jmp 0x7E00", options(noreturn)) }
}
