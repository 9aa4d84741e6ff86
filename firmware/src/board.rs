//! Pin assignment, LED matrix lines and tick timers for the Trikey board.
//!
//! Wiring (Teensy 2.0 / ATmega32U4 at 16 MHz):
//!   Switches X, Y, Z:     PB4, PB5, PB6 (inputs with pull-up, pressed = low)
//!   LED rows 0-4:         PF0, PF1, PF4, PF5, PF6 (active high)
//!   LED columns 0-3:      PB0-PB3 (active low)
//!   Bulk EEPROMs (TWI):   PD0 = SCL, PD1 = SDA

use avr_device::atmega32u4::{Peripherals, PORTB, PORTF};

use trikey_core::keys::KEY_TICK_MS;
use trikey_core::leds::LED_TICK_MS;
use trikey_core::{Key, LedLines, SwitchPins};

const SWITCH_MASK: u8 = 0x70;
const COLUMN_MASK: u8 = 0x0F;
const ROW_PINS: [u8; 5] = [0x01, 0x02, 0x10, 0x20, 0x40];
const ROW_MASK: u8 = 0x73;

const F_CPU: u32 = 16_000_000;

/// Timer0 compare value at clk/256: 124 for a 2 ms tick.
const LED_TICK_COMPARE: u8 = (F_CPU / 256 * LED_TICK_MS as u32 / 1000 - 1) as u8;
/// Timer1 compare value at clk/64: 1249 for a 5 ms tick.
const KEY_TICK_COMPARE: u16 = (F_CPU / 64 * KEY_TICK_MS as u32 / 1000 - 1) as u16;

fn portb() -> &'static avr_device::atmega32u4::portb::RegisterBlock {
    // SAFETY: single core; the port registers are only touched through these helpers
    unsafe { &*PORTB::ptr() }
}

fn portf() -> &'static avr_device::atmega32u4::portf::RegisterBlock {
    // SAFETY: as above
    unsafe { &*PORTF::ptr() }
}

/// Run the core at the full crystal frequency.
pub fn init_clock(dp: &Peripherals) {
    dp.CPU.clkpr.write(|w| w.clkpce().set_bit());
    dp.CPU.clkpr.write(|w| unsafe { w.bits(0) });
}

/// Switch inputs with pull-ups, LED rows off, LED columns high (unlit).
pub fn init_pins(dp: &Peripherals) {
    dp.PORTB.ddrb.modify(|r, w| unsafe {
        w.bits((r.bits() & !SWITCH_MASK) | COLUMN_MASK)
    });
    dp.PORTB.portb.modify(|r, w| unsafe {
        w.bits(r.bits() | SWITCH_MASK | COLUMN_MASK)
    });

    dp.PORTF.ddrf.modify(|r, w| unsafe { w.bits(r.bits() | ROW_MASK) });
    dp.PORTF.portf.modify(|r, w| unsafe { w.bits(r.bits() & !ROW_MASK) });
}

/// Timer0 drives the LED scan, Timer1 the key poll. Both in CTC mode.
pub fn init_timers(dp: &Peripherals) {
    let tc0 = &dp.TC0;
    tc0.tccr0a.write(|w| unsafe { w.bits(0x02) }); // WGM01
    tc0.ocr0a.write(|w| unsafe { w.bits(LED_TICK_COMPARE) });
    tc0.tccr0b.write(|w| unsafe { w.bits(0x04) }); // clk/256
    tc0.timsk0.write(|w| unsafe { w.bits(0x02) }); // OCIE0A

    let tc1 = &dp.TC1;
    tc1.tccr1a.write(|w| unsafe { w.bits(0) });
    tc1.ocr1a.write(|w| unsafe { w.bits(KEY_TICK_COMPARE) });
    tc1.tccr1b.write(|w| unsafe { w.bits(0x0B) }); // WGM12, clk/64
    tc1.timsk1.write(|w| unsafe { w.bits(0x02) }); // OCIE1A
}

/// The three switches, read straight from PINB.
pub struct Switches;

impl Switches {
    fn pin(key: Key) -> u8 {
        match key {
            Key::X => 0x10,
            Key::Y => 0x20,
            Key::Z => 0x40,
        }
    }
}

impl SwitchPins for Switches {
    fn is_pressed(&self, key: Key) -> bool {
        portb().pinb.read().bits() & Self::pin(key) == 0
    }
}

/// Row and column lines of the LED matrix.
pub struct MatrixLines;

impl LedLines for MatrixLines {
    fn drive(&self, row: u8, columns: u8) {
        let Some(&row_pin) = ROW_PINS.get(row as usize) else {
            return;
        };
        // Blank the previous row before the columns change under it.
        portf().portf.modify(|r, w| unsafe { w.bits(r.bits() & !ROW_MASK) });
        portb().portb.modify(|r, w| unsafe {
            w.bits((r.bits() & !COLUMN_MASK) | (columns & COLUMN_MASK))
        });
        portf().portf.modify(|r, w| unsafe { w.bits(r.bits() | row_pin) });
    }
}
