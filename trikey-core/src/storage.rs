//! Persistent shortcut storage across three EEPROMs.
//!
//! Layout (bit-exact, shared with previously written boards):
//!
//! Internal EEPROM (1 KiB):
//! - `0x000 + id`: character shortcut value, 256 slots
//! - `0x100 + id`: word shortcut length, 256 slots
//! - `0x200 + id`: blob shortcut length, 248 slots
//! - `0x3FF`: layout version marker
//!
//! Bulk EEPROM A (64 KiB):
//! - `id * 16 + n`: character `n` of word shortcut `id`
//! - `0x1000 + id * 512 + n * 2`: pair `n` of blob shortcut `id < 120`
//!
//! Bulk EEPROM B (64 KiB):
//! - `(id - 120) * 512 + n * 2`: pair `n` of blob shortcut `id >= 120`
//!
//! Length bytes are only ever advanced after their payload write succeeded.

use log::{debug, warn};

use crate::error::{BusError, Error, StorageError};
use crate::usb::Keyboard;

/// Byte-granular access to one EEPROM device.
pub trait ByteStore {
    fn read_byte(&mut self, address: u16) -> Result<u8, BusError>;
    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), BusError>;
}

impl<T: ByteStore + ?Sized> ByteStore for &mut T {
    fn read_byte(&mut self, address: u16) -> Result<u8, BusError> {
        (**self).read_byte(address)
    }

    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        (**self).write_byte(address, value)
    }
}

/// A store backed by a byte slice, for images and tests.
pub struct RamStore<'a> {
    bytes: &'a mut [u8],
}

impl<'a> RamStore<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }
}

impl ByteStore for RamStore<'_> {
    fn read_byte(&mut self, address: u16) -> Result<u8, BusError> {
        self.bytes
            .get(address as usize)
            .copied()
            .ok_or(BusError::OutOfBounds)
    }

    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        let byte = self
            .bytes
            .get_mut(address as usize)
            .ok_or(BusError::OutOfBounds)?;
        *byte = value;
        Ok(())
    }
}

/// Internal EEPROM size in bytes.
pub const INTERNAL_SIZE: usize = 1024;
/// Size of each bulk EEPROM in bytes.
pub const BULK_SIZE: usize = 64 * 1024;

pub const CHARACTER_SHORTCUT_COUNT: usize = 256;
pub const WORD_SHORTCUT_COUNT: usize = 256;
pub const BLOB_SHORTCUT_COUNT: u8 = 248;

/// Characters a word shortcut holds.
pub const WORD_CAPACITY: u8 = 15;
/// Key/modifier pairs a blob shortcut holds.
pub const BLOB_CAPACITY: u8 = 255;

const WORD_LENGTH_BASE: u16 = 0x100;
const BLOB_LENGTH_BASE: u16 = 0x200;
const LAYOUT_VERSION_ADDR: u16 = 0x3FF;
const LAYOUT_VERSION: u8 = 0x01;

const WORD_SLOT_SIZE: u16 = 16;
const BLOB_BASE_A: u16 = 0x1000;
const BLOB_SLOT_SIZE: u16 = 512;
/// Blob ids from here on live in bulk EEPROM B.
pub const BLOB_SPLIT_ID: u8 = 120;

const SHIFT: u8 = 0x02;
const KEY_DOT: u8 = 0x37;
const KEY_COMMA: u8 = 0x36;
const KEY_MINUS: u8 = 0x2D;

/// How a word shortcut is typed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordMode {
    #[default]
    AsIs,
    /// Shift held on every character.
    Uppercase,
    /// Shift held on the first character only.
    Capitalized,
    TrailingPeriod,
    TrailingComma,
    TrailingDash,
}

impl WordMode {
    const ALL: [WordMode; 6] = [
        WordMode::AsIs,
        WordMode::Uppercase,
        WordMode::Capitalized,
        WordMode::TrailingPeriod,
        WordMode::TrailingComma,
        WordMode::TrailingDash,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    /// The next mode, wrapping back to `AsIs`.
    pub fn next(self) -> WordMode {
        Self::ALL[(self.index() as usize + 1) % Self::ALL.len()]
    }

    fn modifier_for(self, position: u8) -> u8 {
        match self {
            WordMode::Uppercase => SHIFT,
            WordMode::Capitalized if position == 0 => SHIFT,
            _ => 0,
        }
    }

    fn trailing_key(self) -> Option<u8> {
        match self {
            WordMode::TrailingPeriod => Some(KEY_DOT),
            WordMode::TrailingComma => Some(KEY_COMMA),
            WordMode::TrailingDash => Some(KEY_MINUS),
            _ => None,
        }
    }
}

/// Shortcut-level view over the three EEPROMs.
pub struct StorageController<I, A, B> {
    internal: I,
    bulk_a: A,
    bulk_b: B,
}

impl<I: ByteStore, A: ByteStore, B: ByteStore> StorageController<I, A, B> {
    pub fn new(internal: I, bulk_a: A, bulk_b: B) -> Self {
        Self {
            internal,
            bulk_a,
            bulk_b,
        }
    }

    pub fn into_inner(self) -> (I, A, B) {
        (self.internal, self.bulk_a, self.bulk_b)
    }

    pub fn internal_mut(&mut self) -> &mut I {
        &mut self.internal
    }

    pub fn bulk_b_mut(&mut self) -> &mut B {
        &mut self.bulk_b
    }

    /// Whether the internal store carries the current layout marker.
    pub fn is_formatted(&mut self) -> Result<bool, StorageError> {
        Ok(self.internal.read_byte(LAYOUT_VERSION_ADDR)? == LAYOUT_VERSION)
    }

    /// Zero every character value and every word and blob length, then
    /// write the layout marker.
    ///
    /// Word and blob payload bytes are left alone.
    pub fn format(&mut self) -> Result<(), StorageError> {
        warn!("formatting shortcut storage");
        for id in 0..CHARACTER_SHORTCUT_COUNT as u16 {
            self.internal.write_byte(id, 0)?;
        }
        for id in 0..WORD_SHORTCUT_COUNT as u16 {
            self.internal.write_byte(WORD_LENGTH_BASE + id, 0)?;
        }
        for id in 0..BLOB_SHORTCUT_COUNT as u16 {
            self.internal.write_byte(BLOB_LENGTH_BASE + id, 0)?;
        }
        self.internal.write_byte(LAYOUT_VERSION_ADDR, LAYOUT_VERSION)?;
        Ok(())
    }

    /// Format unless the marker is already present. Returns true if it formatted.
    pub fn ensure_formatted(&mut self) -> Result<bool, StorageError> {
        if self.is_formatted()? {
            return Ok(false);
        }
        self.format()?;
        Ok(true)
    }

    pub fn set_character_shortcut(&mut self, id: u8, value: u8) -> Result<(), StorageError> {
        self.internal.write_byte(id as u16, value)?;
        Ok(())
    }

    pub fn character_shortcut(&mut self, id: u8) -> Result<u8, StorageError> {
        Ok(self.internal.read_byte(id as u16)?)
    }

    pub fn word_shortcut_length(&mut self, id: u8) -> Result<u8, StorageError> {
        Ok(self.internal.read_byte(WORD_LENGTH_BASE + id as u16)?)
    }

    pub fn append_to_word_shortcut(&mut self, id: u8, character: u8) -> Result<(), StorageError> {
        let length = self.word_shortcut_length(id)?;
        if length >= WORD_CAPACITY {
            return Err(StorageError::Full);
        }
        self.bulk_a
            .write_byte(id as u16 * WORD_SLOT_SIZE + length as u16, character)?;
        self.internal
            .write_byte(WORD_LENGTH_BASE + id as u16, length + 1)?;
        debug!("word {} now {} long", id, length + 1);
        Ok(())
    }

    pub fn clear_word_shortcut(&mut self, id: u8) -> Result<(), StorageError> {
        self.internal.write_byte(WORD_LENGTH_BASE + id as u16, 0)?;
        Ok(())
    }

    /// Type out word shortcut `id`. The first failing keystroke aborts.
    pub fn send_word_shortcut<K: Keyboard + ?Sized>(
        &mut self,
        id: u8,
        mode: WordMode,
        keyboard: &K,
    ) -> Result<(), Error> {
        let length = self.word_shortcut_length(id)?.min(WORD_CAPACITY);
        for position in 0..length {
            let character = self
                .bulk_a
                .read_byte(id as u16 * WORD_SLOT_SIZE + position as u16)?;
            keyboard.send_keypress(character, mode.modifier_for(position))?;
        }
        if let Some(key) = mode.trailing_key() {
            keyboard.send_keypress(key, 0)?;
        }
        Ok(())
    }

    pub fn blob_shortcut_length(&mut self, id: u8) -> Result<u8, StorageError> {
        check_blob_id(id)?;
        Ok(self.internal.read_byte(BLOB_LENGTH_BASE + id as u16)?)
    }

    pub fn append_to_blob_shortcut(
        &mut self,
        id: u8,
        keycode: u8,
        modcode: u8,
    ) -> Result<(), StorageError> {
        let length = self.blob_shortcut_length(id)?;
        if length >= BLOB_CAPACITY {
            return Err(StorageError::Full);
        }
        let (store, address) = self.blob_pair(id, length);
        store.write_byte(address, keycode)?;
        store.write_byte(address + 1, modcode)?;
        self.internal
            .write_byte(BLOB_LENGTH_BASE + id as u16, length + 1)?;
        debug!("blob {} now {} long", id, length + 1);
        Ok(())
    }

    pub fn clear_blob_shortcut(&mut self, id: u8) -> Result<(), StorageError> {
        check_blob_id(id)?;
        self.internal.write_byte(BLOB_LENGTH_BASE + id as u16, 0)?;
        Ok(())
    }

    /// Replay blob shortcut `id` pair by pair. The first failure aborts.
    pub fn send_blob_shortcut<K: Keyboard + ?Sized>(
        &mut self,
        id: u8,
        keyboard: &K,
    ) -> Result<(), Error> {
        let length = self.blob_shortcut_length(id)?;
        for position in 0..length {
            let (keycode, modcode) = self.blob_entry(id, position)?;
            keyboard.send_keypress(keycode, modcode)?;
        }
        Ok(())
    }

    /// Read pair `position` of blob `id` without checking the stored length.
    pub fn blob_entry(&mut self, id: u8, position: u8) -> Result<(u8, u8), StorageError> {
        check_blob_id(id)?;
        let (store, address) = self.blob_pair(id, position);
        let keycode = store.read_byte(address)?;
        let modcode = store.read_byte(address + 1)?;
        Ok((keycode, modcode))
    }

    /// Read character `position` of word `id` without checking the stored length.
    pub fn word_entry(&mut self, id: u8, position: u8) -> Result<u8, StorageError> {
        if position >= WORD_CAPACITY {
            return Err(StorageError::OutOfRange);
        }
        Ok(self
            .bulk_a
            .read_byte(id as u16 * WORD_SLOT_SIZE + position as u16)?)
    }

    /// Which bulk store and address hold pair `position` of blob `id`.
    fn blob_pair(&mut self, id: u8, position: u8) -> (&mut dyn ByteStore, u16) {
        let offset = position as u16 * 2;
        if id < BLOB_SPLIT_ID {
            let address = BLOB_BASE_A + id as u16 * BLOB_SLOT_SIZE + offset;
            (&mut self.bulk_a, address)
        } else {
            let address = (id - BLOB_SPLIT_ID) as u16 * BLOB_SLOT_SIZE + offset;
            (&mut self.bulk_b, address)
        }
    }
}

fn check_blob_id(id: u8) -> Result<(), StorageError> {
    if id >= BLOB_SHORTCUT_COUNT {
        return Err(StorageError::OutOfRange);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UsbError;
    use crate::test_support::{FaultyStore, RecordingKeyboard};

    type Storage = StorageController<FaultyStore, FaultyStore, FaultyStore>;

    fn storage() -> Storage {
        let mut storage = StorageController::new(
            FaultyStore::new(INTERNAL_SIZE),
            FaultyStore::new(BULK_SIZE),
            FaultyStore::new(BULK_SIZE),
        );
        storage.format().unwrap();
        storage
    }

    #[test]
    fn test_character_shortcuts_map_to_internal_offsets() {
        let mut storage = storage();
        storage.set_character_shortcut(0x42, 0x1D).unwrap();
        assert_eq!(storage.character_shortcut(0x42).unwrap(), 0x1D);
        let (internal, _, _) = storage.into_inner();
        assert_eq!(internal.bytes[0x42], 0x1D);
    }

    #[test]
    fn test_word_round_trip_and_capacity() {
        let mut storage = storage();
        let word: Vec<u8> = (0x04..0x04 + WORD_CAPACITY).collect();
        for &c in &word {
            storage.append_to_word_shortcut(7, c).unwrap();
        }
        assert_eq!(
            storage.append_to_word_shortcut(7, 0x2C),
            Err(StorageError::Full)
        );
        assert_eq!(storage.word_shortcut_length(7).unwrap(), WORD_CAPACITY);

        let keyboard = RecordingKeyboard::default();
        storage.send_word_shortcut(7, WordMode::AsIs, &keyboard).unwrap();
        let expected: Vec<(u8, u8)> = word.iter().map(|&c| (c, 0)).collect();
        assert_eq!(keyboard.sent(), expected);

        let (_, bulk_a, _) = storage.into_inner();
        assert_eq!(&bulk_a.bytes[7 * 16..7 * 16 + 15], word.as_slice());
    }

    #[test]
    fn test_word_modes() {
        let mut storage = storage();
        for c in [0x0B, 0x0C] {
            storage.append_to_word_shortcut(1, c).unwrap();
        }
        let cases = [
            (WordMode::AsIs, vec![(0x0B, 0), (0x0C, 0)]),
            (WordMode::Uppercase, vec![(0x0B, SHIFT), (0x0C, SHIFT)]),
            (WordMode::Capitalized, vec![(0x0B, SHIFT), (0x0C, 0)]),
            (WordMode::TrailingPeriod, vec![(0x0B, 0), (0x0C, 0), (KEY_DOT, 0)]),
            (WordMode::TrailingComma, vec![(0x0B, 0), (0x0C, 0), (KEY_COMMA, 0)]),
            (WordMode::TrailingDash, vec![(0x0B, 0), (0x0C, 0), (KEY_MINUS, 0)]),
        ];
        for (mode, expected) in cases {
            let keyboard = RecordingKeyboard::default();
            storage.send_word_shortcut(1, mode, &keyboard).unwrap();
            assert_eq!(keyboard.sent(), expected, "{:?}", mode);
        }
    }

    #[test]
    fn test_failed_payload_write_keeps_length() {
        let mut storage = storage();
        storage.append_to_word_shortcut(3, 0x04).unwrap();
        storage.bulk_a.fail_writes = true;
        assert!(matches!(
            storage.append_to_word_shortcut(3, 0x05),
            Err(StorageError::Bus(_))
        ));
        storage.bulk_a.fail_writes = false;
        assert_eq!(storage.word_shortcut_length(3).unwrap(), 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut storage = storage();
        for c in 0..5 {
            storage.append_to_word_shortcut(9, c).unwrap();
        }
        storage.clear_word_shortcut(9).unwrap();
        assert_eq!(storage.word_shortcut_length(9).unwrap(), 0);
        storage.clear_word_shortcut(9).unwrap();
        assert_eq!(storage.word_shortcut_length(9).unwrap(), 0);

        storage.append_to_blob_shortcut(9, 1, 2).unwrap();
        storage.clear_blob_shortcut(9).unwrap();
        assert_eq!(storage.blob_shortcut_length(9).unwrap(), 0);
    }

    #[test]
    fn test_blob_below_split_goes_to_bulk_a() {
        let mut storage = storage();
        storage.append_to_blob_shortcut(4, 0x10, 0x01).unwrap();
        storage.append_to_blob_shortcut(4, 0x11, 0x02).unwrap();
        let (internal, bulk_a, bulk_b) = storage.into_inner();
        let base = 0x1000 + 4 * 512;
        assert_eq!(&bulk_a.bytes[base..base + 4], &[0x10, 0x01, 0x11, 0x02]);
        assert_eq!(internal.bytes[0x204], 2);
        assert!(bulk_b.bytes.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_blob_at_split_goes_to_bulk_b() {
        let mut storage = storage();
        storage.append_to_blob_shortcut(120, 0x20, 0x04).unwrap();
        storage.append_to_blob_shortcut(121, 0x21, 0x08).unwrap();
        let (_, _, bulk_b) = storage.into_inner();
        assert_eq!(&bulk_b.bytes[0..2], &[0x20, 0x04]);
        assert_eq!(&bulk_b.bytes[512..514], &[0x21, 0x08]);
    }

    #[test]
    fn test_last_blob_slot_fits() {
        let mut storage = storage();
        for n in 0..BLOB_CAPACITY {
            storage.append_to_blob_shortcut(247, n, n).unwrap();
        }
        assert_eq!(
            storage.append_to_blob_shortcut(247, 0, 0),
            Err(StorageError::Full)
        );
        assert_eq!(storage.blob_entry(247, 254).unwrap(), (254, 254));
        assert_eq!(storage.blob_entry(119, 0).unwrap(), (0xFF, 0xFF));
    }

    #[test]
    fn test_blob_id_out_of_range() {
        let mut storage = storage();
        assert_eq!(
            storage.append_to_blob_shortcut(248, 1, 1),
            Err(StorageError::OutOfRange)
        );
        assert_eq!(storage.blob_shortcut_length(255), Err(StorageError::OutOfRange));
        assert_eq!(storage.clear_blob_shortcut(250), Err(StorageError::OutOfRange));
    }

    #[test]
    fn test_failed_blob_modcode_write_keeps_length() {
        let mut storage = storage();
        storage.bulk_b.fail_after_writes = Some(1);
        assert!(storage.append_to_blob_shortcut(130, 0x04, 0x02).is_err());
        storage.bulk_b.fail_after_writes = None;
        assert_eq!(storage.blob_shortcut_length(130).unwrap(), 0);
    }

    #[test]
    fn test_send_blob_stops_on_usb_failure() {
        let mut storage = storage();
        for n in 0..3 {
            storage.append_to_blob_shortcut(2, 0x04 + n, 0).unwrap();
        }
        let keyboard = RecordingKeyboard::failing_after(1);
        assert_eq!(
            storage.send_blob_shortcut(2, &keyboard),
            Err(Error::Usb(UsbError::EndpointTimeout))
        );
        assert_eq!(keyboard.sent(), vec![(0x04, 0)]);
    }

    #[test]
    fn test_ensure_formatted_only_once() {
        let mut storage = StorageController::new(
            FaultyStore::new(INTERNAL_SIZE),
            FaultyStore::new(BULK_SIZE),
            FaultyStore::new(BULK_SIZE),
        );
        assert_eq!(storage.word_shortcut_length(0).unwrap(), 0xFF);
        assert!(storage.ensure_formatted().unwrap());
        assert_eq!(storage.character_shortcut(0xFF).unwrap(), 0);
        assert_eq!(storage.word_shortcut_length(0).unwrap(), 0);
        assert_eq!(storage.blob_shortcut_length(247).unwrap(), 0);
        assert!(!storage.ensure_formatted().unwrap());
    }

    #[test]
    fn test_ram_store_bounds() {
        let mut bytes = [0u8; 4];
        let mut store = RamStore::new(&mut bytes);
        store.write_byte(3, 9).unwrap();
        assert_eq!(store.read_byte(3), Ok(9));
        assert_eq!(store.read_byte(4), Err(BusError::OutOfBounds));
    }
}
