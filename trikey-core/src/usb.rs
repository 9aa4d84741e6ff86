//! USB HID keyboard engine.
//!
//! Drives the device side of enumeration and the boot-keyboard report stream
//! on top of a register-level [`UsbHardware`]. Two entry points run from
//! interrupt context: [`UsbController::handle_general_interrupt`] (bus reset,
//! start of frame) and [`UsbController::handle_endpoint_interrupt`] (SETUP
//! packets on endpoint 0). [`UsbController::send_keypress`] runs in the
//! foreground with interrupts enabled.
//!
//! Every busy-wait has an iteration or frame ceiling.

pub mod descriptors;
pub mod setup;

use core::cell::Cell;

use critical_section::Mutex;
use log::debug;

use crate::error::UsbError;
use self::descriptors::{
    CONFIGURATION_VALUE, EP0_SIZE, KEYBOARD_ENDPOINT, KEYBOARD_INTERFACE, KEYBOARD_SIZE,
};
use self::setup::{Direction, Recipient, RequestKind, SetupPacket};

/// Polls of the PLL lock bit before bring-up gives up.
pub const PLL_LOCK_CEILING: u32 = 100_000;
/// Host frames a report may wait for the keyboard endpoint.
pub const TRANSMIT_FRAME_BUDGET: u8 = 50;
/// Backstop for a transmit poll when no frames arrive (suspended bus).
pub const TRANSMIT_POLL_CEILING: u32 = 500_000;
/// Polls of an endpoint 0 handshake flag before the request is stalled.
pub const CONTROL_POLL_CEILING: u32 = 0xFFFF;

/// Largest descriptor transfer the engine serves.
const MAX_DESCRIPTOR_TRANSFER: u16 = 255;
/// Start-of-frame ticks per HID idle unit (4 ms).
const SOF_PER_IDLE_UNIT: u8 = 4;
/// Keyboard endpoints reset mask for UERST-style resets (endpoints 1-4).
const DATA_ENDPOINTS: u8 = 0x1E;

/// Snapshot of the device interrupt flags, cleared as they are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInterrupts {
    pub end_of_reset: bool,
    pub start_of_frame: bool,
}

/// Status flags of the selected endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointStatus {
    /// A SETUP packet is waiting in the FIFO.
    pub setup_received: bool,
    /// The IN bank is free for the next packet.
    pub in_ready: bool,
    /// An OUT packet is waiting in the FIFO.
    pub out_received: bool,
    /// The FIFO accepts writes.
    pub rw_allowed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Control,
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    pub kind: EndpointKind,
    pub direction_in: bool,
    pub size: u8,
    pub double_bank: bool,
    /// Raise the endpoint interrupt when a SETUP packet arrives.
    pub setup_interrupt: bool,
}

/// Register-level capability of the USB device controller.
///
/// Methods take `&self` like memory-mapped registers do; the endpoint
/// operations act on whichever endpoint was selected last.
pub trait UsbHardware {
    /// Pad regulator on, controller enabled with its clock frozen.
    fn power_up(&self);
    fn start_pll(&self);
    fn pll_locked(&self) -> bool;
    /// Unfreeze the clock and enable the VBUS pad.
    fn enable_clock(&self);
    /// Enable the end-of-reset and start-of-frame interrupts.
    fn enable_device_interrupts(&self);
    /// Connect the pull-up: the host sees the device from here on.
    fn attach(&self);
    fn detach(&self);
    fn take_device_interrupts(&self) -> DeviceInterrupts;

    fn select_endpoint(&self, endpoint: u8);
    fn configure_endpoint(&self, config: &EndpointConfig);
    fn disable_endpoint(&self);
    /// Hold the endpoints in `mask` (bit per endpoint number) in reset.
    fn reset_endpoints(&self, mask: u8);
    fn endpoint_status(&self) -> EndpointStatus;
    /// Clear the SETUP, OUT and IN flags after reading a SETUP packet.
    fn acknowledge_setup(&self);
    /// Hand the IN bank to the host.
    fn send_in(&self);
    /// Release the OUT bank after reading it.
    fn acknowledge_out(&self);
    /// Commit a filled bank on a non-control endpoint.
    fn release_fifo(&self);
    fn read_byte(&self) -> u8;
    fn write_byte(&self, value: u8);
    fn stall(&self);
    fn clear_stall(&self);
    fn is_stalled(&self) -> bool;

    /// Latch and enable the device address.
    fn set_address(&self, address: u8);
    /// Low byte of the current host frame number.
    fn frame_number(&self) -> u8;
}

/// Anything that can type one key with modifiers and release it.
pub trait Keyboard {
    fn send_keypress(&self, keycode: u8, modifier: u8) -> Result<(), UsbError>;
}

/// Host-visible session state. Reset to defaults on every bus reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidState {
    /// 0 until the host selects the configuration.
    pub configuration: u8,
    pub modifier_keys: u8,
    /// Only slot 0 is ever used.
    pub keyboard_keys: [u8; 6],
    /// 0 = boot protocol, 1 = report protocol.
    pub protocol: u8,
    /// Unsolicited report interval in 4 ms units, 0 = never.
    pub idle_config: u8,
    pub idle_count: u8,
    /// Keyboard LED byte last written by the host.
    pub leds: u8,
    sof_divider: u8,
}

impl HidState {
    pub const fn new() -> Self {
        Self {
            configuration: 0,
            modifier_keys: 0,
            keyboard_keys: [0; 6],
            protocol: 1,
            idle_config: 125,
            idle_count: 0,
            leds: 0,
            sof_divider: 0,
        }
    }

    pub fn report(&self) -> [u8; 8] {
        let k = self.keyboard_keys;
        [self.modifier_keys, 0, k[0], k[1], k[2], k[3], k[4], k[5]]
    }
}

impl Default for HidState {
    fn default() -> Self {
        Self::new()
    }
}

/// What the endpoint interrupt did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Handled,
    /// Unknown request or bus misbehaviour; endpoint 0 is halted.
    Stalled,
    /// The host asked for the bootloader. The caller detaches and jumps.
    Bootloader,
}

/// Marker for "stall endpoint 0 and give up on this request".
struct Stall;

pub struct UsbController<H> {
    hw: H,
    state: Mutex<Cell<HidState>>,
}

impl<H: UsbHardware> UsbController<H> {
    pub const fn new(hw: H) -> Self {
        Self {
            hw,
            state: Mutex::new(Cell::new(HidState::new())),
        }
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hid_state(&self) -> HidState {
        critical_section::with(|cs| self.state.borrow(cs).get())
    }

    fn update<R>(&self, f: impl FnOnce(&mut HidState) -> R) -> R {
        critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            let mut state = cell.get();
            let result = f(&mut state);
            cell.set(state);
            result
        })
    }

    pub fn has_configured(&self) -> bool {
        self.hid_state().configuration != 0
    }

    /// Bring up regulator, PLL and clock, then attach to the bus.
    ///
    /// The pull-up is the last step; on a PLL timeout the device stays
    /// invisible and the session state is untouched.
    pub fn setup(&self) -> Result<(), UsbError> {
        self.hw.power_up();
        self.hw.start_pll();
        if !(0..PLL_LOCK_CEILING).any(|_| self.hw.pll_locked()) {
            return Err(UsbError::PllTimeout);
        }
        self.hw.enable_clock();
        self.update(|state| *state = HidState::new());
        self.hw.enable_device_interrupts();
        self.hw.attach();
        debug!("usb attached");
        Ok(())
    }

    /// Drop off the bus and forget the session.
    pub fn detach(&self) {
        self.hw.detach();
        self.update(|state| *state = HidState::new());
        debug!("usb detached");
    }

    /// Bus reset and start-of-frame handling.
    pub fn handle_general_interrupt(&self) {
        let flags = self.hw.take_device_interrupts();

        if flags.end_of_reset {
            self.hw.select_endpoint(0);
            self.hw.configure_endpoint(&EndpointConfig {
                kind: EndpointKind::Control,
                direction_in: false,
                size: EP0_SIZE,
                double_bank: false,
                setup_interrupt: true,
            });
            self.update(|state| *state = HidState::new());
        }

        if flags.start_of_frame {
            self.idle_tick();
        }
    }

    /// Resend the current report every `idle_config` 4 ms units.
    fn idle_tick(&self) {
        let mut state = self.hid_state();
        if state.configuration == 0 || state.idle_config == 0 {
            return;
        }
        state.sof_divider = (state.sof_divider + 1) % SOF_PER_IDLE_UNIT;
        if state.sof_divider == 0 {
            self.hw.select_endpoint(KEYBOARD_ENDPOINT);
            if self.hw.endpoint_status().rw_allowed {
                state.idle_count = state.idle_count.wrapping_add(1);
                if state.idle_count == state.idle_config {
                    state.idle_count = 0;
                    self.write_report(&state);
                }
            }
        }
        self.update(|s| {
            s.sof_divider = state.sof_divider;
            s.idle_count = state.idle_count;
        });
    }

    fn write_report(&self, state: &HidState) {
        for byte in state.report() {
            self.hw.write_byte(byte);
        }
        self.hw.release_fifo();
    }

    /// Serve one control request on endpoint 0.
    pub fn handle_endpoint_interrupt(&self) -> Control {
        self.hw.select_endpoint(0);
        if !self.hw.endpoint_status().setup_received {
            self.hw.stall();
            return Control::Stalled;
        }

        let mut bytes = [0u8; 8];
        for byte in bytes.iter_mut() {
            *byte = self.hw.read_byte();
        }
        self.hw.acknowledge_setup();

        match self.dispatch(&SetupPacket::from_bytes(bytes)) {
            Ok(control) => control,
            Err(Stall) => {
                self.hw.stall();
                Control::Stalled
            }
        }
    }

    fn dispatch(&self, setup: &SetupPacket) -> Result<Control, Stall> {
        use self::setup::*;

        match (setup.kind(), setup.recipient(), setup.direction()) {
            (RequestKind::Standard, _, Direction::DeviceToHost) => self.standard_in(setup),
            (RequestKind::Standard, _, Direction::HostToDevice) => self.standard_out(setup),
            (RequestKind::Class, Recipient::Interface, _) if setup.index == KEYBOARD_INTERFACE => {
                self.hid_request(setup)
            }
            (RequestKind::Vendor, Recipient::Device, Direction::HostToDevice)
                if setup.request == VENDOR_BOOTLOADER =>
            {
                self.hw.send_in();
                Ok(Control::Bootloader)
            }
            _ => Err(Stall),
        }
    }

    fn standard_in(&self, setup: &SetupPacket) -> Result<Control, Stall> {
        use self::setup::*;

        match (setup.request, setup.recipient()) {
            (GET_DESCRIPTOR, Recipient::Device | Recipient::Interface) => {
                let descriptor = descriptors::lookup(setup.value, setup.index).ok_or(Stall)?;
                self.send_descriptor(descriptor, setup.length)
            }
            (GET_CONFIGURATION, Recipient::Device) => {
                self.wait_in_ready()?;
                self.hw.write_byte(self.hid_state().configuration);
                self.hw.send_in();
                Ok(Control::Handled)
            }
            (GET_STATUS, recipient) => {
                // Bus powered, no remote wakeup; endpoints report their halt bit.
                let status = match recipient {
                    Recipient::Endpoint => {
                        self.hw.select_endpoint(endpoint_number(setup.index));
                        let halted = self.hw.is_stalled();
                        self.hw.select_endpoint(0);
                        halted as u8
                    }
                    _ => 0,
                };
                self.wait_in_ready()?;
                self.hw.write_byte(status);
                self.hw.write_byte(0);
                self.hw.send_in();
                Ok(Control::Handled)
            }
            _ => Err(Stall),
        }
    }

    fn standard_out(&self, setup: &SetupPacket) -> Result<Control, Stall> {
        use self::setup::*;

        match (setup.request, setup.recipient()) {
            (SET_ADDRESS, Recipient::Device) => {
                self.hw.send_in();
                self.wait_in_ready()?;
                self.hw.set_address(setup.value as u8 & 0x7F);
                Ok(Control::Handled)
            }
            (SET_CONFIGURATION, Recipient::Device) => self.set_configuration(setup.value),
            (SET_FEATURE | CLEAR_FEATURE, Recipient::Endpoint)
                if setup.value == ENDPOINT_HALT
                    && endpoint_number(setup.index) == KEYBOARD_ENDPOINT =>
            {
                self.hw.send_in();
                self.hw.select_endpoint(KEYBOARD_ENDPOINT);
                if setup.request == SET_FEATURE {
                    self.hw.stall();
                } else {
                    self.hw.clear_stall();
                    self.hw.reset_endpoints(1 << KEYBOARD_ENDPOINT);
                    self.hw.reset_endpoints(0);
                }
                self.hw.select_endpoint(0);
                Ok(Control::Handled)
            }
            _ => Err(Stall),
        }
    }

    fn set_configuration(&self, value: u16) -> Result<Control, Stall> {
        if value == 0 {
            self.update(|state| state.configuration = 0);
            self.hw.send_in();
            self.hw.select_endpoint(KEYBOARD_ENDPOINT);
            self.hw.disable_endpoint();
            self.hw.select_endpoint(0);
            return Ok(Control::Handled);
        }
        if value != CONFIGURATION_VALUE as u16 {
            return Err(Stall);
        }

        self.update(|state| state.configuration = CONFIGURATION_VALUE);
        self.hw.send_in();
        self.hw.select_endpoint(KEYBOARD_ENDPOINT);
        self.hw.configure_endpoint(&EndpointConfig {
            kind: EndpointKind::Interrupt,
            direction_in: true,
            size: KEYBOARD_SIZE,
            double_bank: true,
            setup_interrupt: false,
        });
        self.hw.reset_endpoints(DATA_ENDPOINTS);
        self.hw.reset_endpoints(0);
        self.hw.select_endpoint(0);
        debug!("usb configured");
        Ok(Control::Handled)
    }

    fn hid_request(&self, setup: &SetupPacket) -> Result<Control, Stall> {
        use self::setup::*;

        match (setup.direction(), setup.request) {
            (Direction::DeviceToHost, HID_GET_REPORT) => {
                self.wait_in_ready()?;
                for byte in self.hid_state().report() {
                    self.hw.write_byte(byte);
                }
            }
            (Direction::DeviceToHost, HID_GET_IDLE) => {
                self.wait_in_ready()?;
                self.hw.write_byte(self.hid_state().idle_config);
            }
            (Direction::DeviceToHost, HID_GET_PROTOCOL) => {
                self.wait_in_ready()?;
                self.hw.write_byte(self.hid_state().protocol);
            }
            (Direction::HostToDevice, HID_SET_REPORT) => {
                self.wait_out_received()?;
                let leds = self.hw.read_byte();
                self.hw.acknowledge_out();
                self.update(|state| state.leds = leds);
            }
            (Direction::HostToDevice, HID_SET_IDLE) => {
                let idle = (setup.value >> 8) as u8;
                self.update(|state| {
                    state.idle_config = idle;
                    state.idle_count = 0;
                });
            }
            (Direction::HostToDevice, HID_SET_PROTOCOL) => {
                let protocol = setup.value as u8;
                self.update(|state| state.protocol = protocol);
            }
            _ => return Err(Stall),
        }
        self.hw.send_in();
        Ok(Control::Handled)
    }

    /// Stream a descriptor in endpoint-sized chunks. A chunk of exactly
    /// [`EP0_SIZE`] is followed by a short (possibly empty) packet.
    fn send_descriptor(&self, descriptor: &[u8], requested: u16) -> Result<Control, Stall> {
        let length = requested.min(MAX_DESCRIPTOR_TRANSFER) as usize;
        let mut remaining = &descriptor[..length.min(descriptor.len())];
        loop {
            let status = self.poll_ep0(|s| s.in_ready || s.out_received)?;
            if status.out_received {
                // Host ended the data stage early.
                return Ok(Control::Handled);
            }
            let (chunk, rest) = remaining.split_at(remaining.len().min(EP0_SIZE as usize));
            for &byte in chunk {
                self.hw.write_byte(byte);
            }
            self.hw.send_in();
            remaining = rest;
            if remaining.is_empty() && chunk.len() != EP0_SIZE as usize {
                return Ok(Control::Handled);
            }
        }
    }

    fn wait_in_ready(&self) -> Result<EndpointStatus, Stall> {
        self.poll_ep0(|s| s.in_ready)
    }

    fn wait_out_received(&self) -> Result<EndpointStatus, Stall> {
        self.poll_ep0(|s| s.out_received)
    }

    fn poll_ep0(&self, ready: impl Fn(&EndpointStatus) -> bool) -> Result<EndpointStatus, Stall> {
        for _ in 0..CONTROL_POLL_CEILING {
            let status = self.hw.endpoint_status();
            if ready(&status) {
                return Ok(status);
            }
        }
        Err(Stall)
    }

    /// Press `keycode` with `modifier`, then release everything.
    ///
    /// The held state is cleared even when the press fails, so idle reports
    /// never repeat a key the host did not receive a release for.
    pub fn send_keypress(&self, keycode: u8, modifier: u8) -> Result<(), UsbError> {
        self.update(|state| {
            state.modifier_keys = modifier;
            state.keyboard_keys[0] = keycode;
        });
        let pressed = self.transmit();
        self.update(|state| {
            state.modifier_keys = 0;
            state.keyboard_keys[0] = 0;
        });
        pressed?;
        self.transmit()
    }

    /// Push the current report, waiting up to [`TRANSMIT_FRAME_BUDGET`]
    /// frames for the keyboard endpoint. Interrupts are masked only while
    /// the endpoint is selected and written.
    fn transmit(&self) -> Result<(), UsbError> {
        let start = self.hw.frame_number();
        for _ in 0..TRANSMIT_POLL_CEILING {
            let sent = critical_section::with(|cs| {
                let cell = self.state.borrow(cs);
                let mut state = cell.get();
                if state.configuration == 0 {
                    return Err(UsbError::NotConfigured);
                }
                self.hw.select_endpoint(KEYBOARD_ENDPOINT);
                if !self.hw.endpoint_status().rw_allowed {
                    return Ok(false);
                }
                self.write_report(&state);
                state.idle_count = 0;
                cell.set(state);
                Ok(true)
            })?;
            if sent {
                return Ok(());
            }
            if self.hw.frame_number().wrapping_sub(start) >= TRANSMIT_FRAME_BUDGET {
                break;
            }
        }
        Err(UsbError::EndpointTimeout)
    }
}

impl<H: UsbHardware> Keyboard for UsbController<H> {
    fn send_keypress(&self, keycode: u8, modifier: u8) -> Result<(), UsbError> {
        UsbController::send_keypress(self, keycode, modifier)
    }
}

fn endpoint_number(index: u16) -> u8 {
    (index & 0x07) as u8
}
