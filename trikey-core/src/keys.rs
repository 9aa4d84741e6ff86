//! Key sampling and combo decoding.
//!
//! The three switches X, Y and Z are sampled once per key tick. A gesture
//! starts with the first press and ends when every switch is released again;
//! every switch touched in between is folded into one [`Keypress`]. There is no
//! counter-based debounce: bounce shorter than one tick never shows up in the
//! samples.

use core::cell::Cell;

use critical_section::Mutex;

/// Key tick period in milliseconds.
pub const KEY_TICK_MS: u8 = 5;

/// One of the three physical switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    X,
    Y,
    Z,
}

impl Key {
    pub const ALL: [Key; 3] = [Key::X, Key::Y, Key::Z];

    /// Bit index of this key in the latched half of the gesture mask.
    const fn bit(self) -> u8 {
        match self {
            Key::Z => 0,
            Key::Y => 1,
            Key::X => 2,
        }
    }
}

/// A decoded gesture: a 3-bit mask over X, Y and Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Keypress {
    Z = 0b001,
    Y = 0b010,
    YZ = 0b011,
    X = 0b100,
    XZ = 0b101,
    XY = 0b110,
    XYZ = 0b111,
}

impl Keypress {
    /// Decode the low three bits of a mask. An empty mask is no keypress.
    pub const fn from_mask(mask: u8) -> Option<Keypress> {
        match mask & 0b111 {
            0b001 => Some(Keypress::Z),
            0b010 => Some(Keypress::Y),
            0b011 => Some(Keypress::YZ),
            0b100 => Some(Keypress::X),
            0b101 => Some(Keypress::XZ),
            0b110 => Some(Keypress::XY),
            0b111 => Some(Keypress::XYZ),
            _ => None,
        }
    }
}

/// Read access to the switch inputs.
pub trait SwitchPins {
    /// True while the switch is physically held down.
    fn is_pressed(&self, key: Key) -> bool;
}

const HELD_SHIFT: u8 = 3;
const LATCHED_MASK: u8 = 0b0000_0111;
const HELD_MASK: u8 = LATCHED_MASK << HELD_SHIFT;

/// Edge-triggered gesture decoder.
///
/// Low three bits latch keys that were released during the current gesture,
/// the next three bits track keys that are held right now.
#[derive(Debug, Default)]
pub struct KeyController {
    mask: u8,
}

impl KeyController {
    pub const fn new() -> Self {
        Self { mask: 0 }
    }

    /// Sample the switches once. Returns the gesture when its last key is
    /// released. Runs in interrupt context: no storage or USB work here.
    pub fn poll<P: SwitchPins + ?Sized>(&mut self, pins: &P) -> Option<Keypress> {
        for key in Key::ALL {
            let held = 1 << (key.bit() + HELD_SHIFT);
            if pins.is_pressed(key) {
                self.mask |= held;
            } else if self.mask & held != 0 {
                self.mask &= !held;
                self.mask |= 1 << key.bit();
            }
        }

        if self.mask & HELD_MASK == 0 && self.mask & LATCHED_MASK != 0 {
            let keypress = Keypress::from_mask(self.mask);
            self.mask = 0;
            return keypress;
        }
        None
    }
}

/// Single-slot handoff from the key interrupt to the foreground loop.
///
/// Written only by the interrupt path and drained only by the foreground. A
/// second gesture completing before the first is drained replaces it.
pub struct KeypressCell {
    slot: Mutex<Cell<Option<Keypress>>>,
}

impl KeypressCell {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(None)),
        }
    }

    pub fn post(&self, keypress: Keypress) {
        critical_section::with(|cs| self.slot.borrow(cs).set(Some(keypress)));
    }

    pub fn take(&self) -> Option<Keypress> {
        critical_section::with(|cs| self.slot.borrow(cs).take())
    }
}

impl Default for KeypressCell {
    fn default() -> Self {
        Self::new()
    }
}
