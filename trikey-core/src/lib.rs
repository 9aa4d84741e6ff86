//! Core runtime of the three-key shortcut keyboard.
//!
//! Everything in here is hardware-agnostic: the AVR firmware provides the
//! register-level implementations of the capability traits ([`keys::SwitchPins`],
//! [`leds::LedLines`], [`storage::ByteStore`], [`usb::UsbHardware`]) and the
//! host tools reuse the storage layout to decode EEPROM images.

#![cfg_attr(not(test), no_std)]

pub mod error;
pub mod keys;
pub mod layers;
pub mod leds;
pub mod runtime;
pub mod storage;
pub mod usb;

#[cfg(test)]
mod test_support;

pub use error::{BusError, Error, StorageError, UsbError};
pub use keys::{Key, KeyController, Keypress, KeypressCell, SwitchPins};
pub use layers::{Layer, LayerController, LayerId, Transition};
pub use leds::{Color, LedController, LedLines, LedMode, LedState};
pub use runtime::{Runtime, Ticks};
pub use storage::{ByteStore, RamStore, StorageController, WordMode};
pub use usb::{Control, HidState, Keyboard, UsbController, UsbHardware};
