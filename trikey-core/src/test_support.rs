//! Test doubles for the hardware capability traits.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

use crate::error::{BusError, UsbError};
use crate::keys::{Key, SwitchPins};
use crate::leds::LedLines;
use crate::storage::ByteStore;
use crate::usb::{
    descriptors::KEYBOARD_ENDPOINT, Control, DeviceInterrupts, EndpointConfig, EndpointStatus,
    Keyboard, UsbController, UsbHardware,
};

#[derive(Default)]
pub struct FakeSwitches {
    held: RefCell<Vec<Key>>,
}

impl FakeSwitches {
    pub fn hold(&self, keys: &[Key]) {
        *self.held.borrow_mut() = keys.to_vec();
    }
}

impl SwitchPins for FakeSwitches {
    fn is_pressed(&self, key: Key) -> bool {
        self.held.borrow().contains(&key)
    }
}

#[derive(Default)]
pub struct FakeLedLines {
    driven: RefCell<Vec<(u8, u8)>>,
}

impl FakeLedLines {
    pub fn driven(&self) -> Vec<(u8, u8)> {
        self.driven.borrow().clone()
    }
}

impl LedLines for FakeLedLines {
    fn drive(&self, row: u8, columns: u8) {
        self.driven.borrow_mut().push((row, columns));
    }
}

/// Erased (0xFF) EEPROM image with write-failure injection.
pub struct FaultyStore {
    pub bytes: Vec<u8>,
    /// Every write fails.
    pub fail_writes: bool,
    /// Writes left before they start failing.
    pub fail_after_writes: Option<usize>,
}

impl FaultyStore {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0xFF; size],
            fail_writes: false,
            fail_after_writes: None,
        }
    }
}

impl ByteStore for FaultyStore {
    fn read_byte(&mut self, address: u16) -> Result<u8, BusError> {
        self.bytes
            .get(address as usize)
            .copied()
            .ok_or(BusError::OutOfBounds)
    }

    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        if self.fail_writes {
            return Err(BusError::Nack);
        }
        if let Some(left) = self.fail_after_writes.as_mut() {
            if *left == 0 {
                return Err(BusError::Timeout);
            }
            *left -= 1;
        }
        let byte = self
            .bytes
            .get_mut(address as usize)
            .ok_or(BusError::OutOfBounds)?;
        *byte = value;
        Ok(())
    }
}

/// Records every successful keystroke.
#[derive(Default)]
pub struct RecordingKeyboard {
    sent: RefCell<Vec<(u8, u8)>>,
    remaining: Cell<Option<usize>>,
}

impl RecordingKeyboard {
    pub fn failing_after(successes: usize) -> Self {
        Self {
            sent: RefCell::default(),
            remaining: Cell::new(Some(successes)),
        }
    }

    pub fn sent(&self) -> Vec<(u8, u8)> {
        self.sent.borrow().clone()
    }
}

impl Keyboard for RecordingKeyboard {
    fn send_keypress(&self, keycode: u8, modifier: u8) -> Result<(), UsbError> {
        match self.remaining.get() {
            Some(0) => return Err(UsbError::EndpointTimeout),
            Some(n) => self.remaining.set(Some(n - 1)),
            None => {}
        }
        self.sent.borrow_mut().push((keycode, modifier));
        Ok(())
    }
}

const ENDPOINTS: usize = 7;

#[derive(Default)]
struct MockState {
    log: Vec<&'static str>,
    pll_never_locks: bool,
    attached: bool,
    interrupts: DeviceInterrupts,
    selected: u8,
    configs: [Option<EndpointConfig>; ENDPOINTS],
    stalled: [bool; ENDPOINTS],
    setup_pending: bool,
    pending_out: Vec<u8>,
    out_received: bool,
    rx: VecDeque<u8>,
    in_bank: Vec<u8>,
    packets: Vec<Vec<u8>>,
    keyboard_bank: Vec<u8>,
    keyboard_busy: bool,
    reports: Vec<[u8; 8]>,
    address: Option<u8>,
    frame: u8,
}

/// Simulated USB controller plus a host that acknowledges every IN packet
/// as soon as it is sent.
#[derive(Default)]
pub struct MockUsb {
    state: RefCell<MockState>,
}

impl MockUsb {
    pub fn without_pll() -> Self {
        let usb = MockUsb::default();
        usb.state.borrow_mut().pll_never_locks = true;
        usb
    }

    pub fn bring_up_log(&self) -> Vec<&'static str> {
        self.state.borrow().log.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.state.borrow().attached
    }

    pub fn bus_reset(&self) {
        self.state.borrow_mut().interrupts.end_of_reset = true;
    }

    pub fn start_of_frame(&self) {
        let mut state = self.state.borrow_mut();
        state.interrupts.start_of_frame = true;
        state.frame = state.frame.wrapping_add(1);
    }

    /// Place a SETUP packet (and the OUT data stage that follows it) in
    /// endpoint 0.
    pub fn load_setup(&self, packet: [u8; 8], out_data: &[u8]) {
        let mut state = self.state.borrow_mut();
        state.rx = packet.iter().copied().collect();
        state.setup_pending = true;
        state.pending_out = out_data.to_vec();
    }

    pub fn take_packets(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.borrow_mut().packets)
    }

    pub fn endpoint_config(&self, endpoint: u8) -> Option<EndpointConfig> {
        self.state.borrow().configs[endpoint as usize]
    }

    pub fn address(&self) -> Option<u8> {
        self.state.borrow().address
    }

    pub fn reports(&self) -> Vec<[u8; 8]> {
        self.state.borrow().reports.clone()
    }

    pub fn stalled(&self, endpoint: u8) -> bool {
        self.state.borrow().stalled[endpoint as usize]
    }

    pub fn set_keyboard_ready(&self, ready: bool) {
        self.state.borrow_mut().keyboard_busy = !ready;
    }
}

impl UsbHardware for MockUsb {
    fn power_up(&self) {
        self.state.borrow_mut().log.push("power_up");
    }

    fn start_pll(&self) {
        self.state.borrow_mut().log.push("start_pll");
    }

    fn pll_locked(&self) -> bool {
        !self.state.borrow().pll_never_locks
    }

    fn enable_clock(&self) {
        self.state.borrow_mut().log.push("enable_clock");
    }

    fn enable_device_interrupts(&self) {
        self.state.borrow_mut().log.push("enable_device_interrupts");
    }

    fn attach(&self) {
        let mut state = self.state.borrow_mut();
        state.log.push("attach");
        state.attached = true;
    }

    fn detach(&self) {
        self.state.borrow_mut().attached = false;
    }

    fn take_device_interrupts(&self) -> DeviceInterrupts {
        std::mem::take(&mut self.state.borrow_mut().interrupts)
    }

    fn select_endpoint(&self, endpoint: u8) {
        self.state.borrow_mut().selected = endpoint;
    }

    fn configure_endpoint(&self, config: &EndpointConfig) {
        let mut state = self.state.borrow_mut();
        let selected = state.selected as usize;
        state.configs[selected] = Some(*config);
    }

    fn disable_endpoint(&self) {
        let mut state = self.state.borrow_mut();
        let selected = state.selected as usize;
        state.configs[selected] = None;
    }

    fn reset_endpoints(&self, mask: u8) {
        let mut state = self.state.borrow_mut();
        if mask & (1 << KEYBOARD_ENDPOINT) != 0 {
            state.keyboard_bank.clear();
        }
    }

    fn endpoint_status(&self) -> EndpointStatus {
        let state = self.state.borrow();
        match state.selected {
            0 => EndpointStatus {
                setup_received: state.setup_pending,
                in_ready: true,
                out_received: state.out_received,
                rw_allowed: false,
            },
            KEYBOARD_ENDPOINT => {
                let ready = state.configs[KEYBOARD_ENDPOINT as usize].is_some()
                    && !state.keyboard_busy
                    && !state.stalled[KEYBOARD_ENDPOINT as usize];
                EndpointStatus {
                    in_ready: ready,
                    rw_allowed: ready,
                    ..EndpointStatus::default()
                }
            }
            _ => EndpointStatus::default(),
        }
    }

    fn acknowledge_setup(&self) {
        let mut state = self.state.borrow_mut();
        state.setup_pending = false;
        state.rx.clear();
        let out = std::mem::take(&mut state.pending_out);
        if !out.is_empty() {
            state.rx.extend(out);
            state.out_received = true;
        }
    }

    fn send_in(&self) {
        let mut state = self.state.borrow_mut();
        if state.selected == 0 {
            let packet = std::mem::take(&mut state.in_bank);
            state.packets.push(packet);
        }
    }

    fn acknowledge_out(&self) {
        let mut state = self.state.borrow_mut();
        state.out_received = false;
        state.rx.clear();
    }

    fn release_fifo(&self) {
        let mut state = self.state.borrow_mut();
        if state.selected == KEYBOARD_ENDPOINT {
            let bank = std::mem::take(&mut state.keyboard_bank);
            let report: [u8; 8] = bank.try_into().expect("keyboard report is 8 bytes");
            state.reports.push(report);
        }
    }

    fn read_byte(&self) -> u8 {
        self.state.borrow_mut().rx.pop_front().unwrap_or(0)
    }

    fn write_byte(&self, value: u8) {
        let mut state = self.state.borrow_mut();
        match state.selected {
            0 => state.in_bank.push(value),
            KEYBOARD_ENDPOINT => state.keyboard_bank.push(value),
            _ => {}
        }
    }

    fn stall(&self) {
        let mut state = self.state.borrow_mut();
        let selected = state.selected as usize;
        state.stalled[selected] = true;
    }

    fn clear_stall(&self) {
        let mut state = self.state.borrow_mut();
        let selected = state.selected as usize;
        state.stalled[selected] = false;
    }

    fn is_stalled(&self) -> bool {
        let state = self.state.borrow();
        state.stalled[state.selected as usize]
    }

    fn set_address(&self, address: u8) {
        self.state.borrow_mut().address = Some(address);
    }

    fn frame_number(&self) -> u8 {
        let mut state = self.state.borrow_mut();
        state.frame = state.frame.wrapping_add(1);
        state.frame
    }
}

/// Run one control transfer from the host side. Returns what the device
/// did and every IN byte it sent.
pub fn control(
    usb: &UsbController<MockUsb>,
    packet: [u8; 8],
    out_data: &[u8],
) -> (Control, Vec<u8>) {
    usb.hardware().load_setup(packet, out_data);
    let result = usb.handle_endpoint_interrupt();
    let data = usb.hardware().take_packets().concat();
    (result, data)
}
