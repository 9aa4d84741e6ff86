//! EEPROM images of the three shortcut stores, read and written on the host
//! through the same [`StorageController`] the firmware uses.

use anyhow::{Context, Result};
use log::debug;
use std::fmt;
use std::fs;
use std::path::Path;

use trikey_core::storage::{
    BLOB_SHORTCUT_COUNT, BULK_SIZE, CHARACTER_SHORTCUT_COUNT, INTERNAL_SIZE, WORD_CAPACITY,
    WORD_SHORTCUT_COUNT,
};
use trikey_core::{RamStore, StorageController};

use crate::hex;

/// File names written by `format`.
pub const INTERNAL_FILE: &str = "internal.eep";
pub const BULK_A_FILE: &str = "bulk-a.bin";
pub const BULK_B_FILE: &str = "bulk-b.bin";

pub struct Images {
    pub internal: Vec<u8>,
    pub bulk_a: Vec<u8>,
    pub bulk_b: Vec<u8>,
}

impl Images {
    /// Erased parts with a fresh layout written over them.
    pub fn blank() -> Result<Self> {
        let mut images = Self {
            internal: vec![0xFF; INTERNAL_SIZE],
            bulk_a: vec![0xFF; BULK_SIZE],
            bulk_b: vec![0xFF; BULK_SIZE],
        };
        images.storage().format().context("formatting images")?;
        Ok(images)
    }

    pub fn load(internal: &Path, bulk_a: &Path, bulk_b: &Path) -> Result<Self> {
        Ok(Self {
            internal: load_image(internal, INTERNAL_SIZE)?,
            bulk_a: load_image(bulk_a, BULK_SIZE)?,
            bulk_b: load_image(bulk_b, BULK_SIZE)?,
        })
    }

    /// Write the internal image as Intel HEX (avrdude's `.eep`) and the bulk
    /// images as raw binaries.
    pub fn save(&self, out_dir: &Path) -> Result<()> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("creating {}", out_dir.display()))?;
        let internal = out_dir.join(INTERNAL_FILE);
        fs::write(&internal, hex::write_hex(&self.internal)?)
            .with_context(|| format!("writing {}", internal.display()))?;
        for (name, data) in [(BULK_A_FILE, &self.bulk_a), (BULK_B_FILE, &self.bulk_b)] {
            let path = out_dir.join(name);
            fs::write(&path, data).with_context(|| format!("writing {}", path.display()))?;
        }
        Ok(())
    }

    pub fn storage(&mut self) -> StorageController<RamStore<'_>, RamStore<'_>, RamStore<'_>> {
        StorageController::new(
            RamStore::new(&mut self.internal),
            RamStore::new(&mut self.bulk_a),
            RamStore::new(&mut self.bulk_b),
        )
    }

    /// Decode every non-empty shortcut.
    pub fn shortcuts(&mut self) -> Result<Shortcuts> {
        let mut storage = self.storage();
        let mut shortcuts = Shortcuts {
            formatted: storage.is_formatted()?,
            ..Shortcuts::default()
        };

        for id in 0..CHARACTER_SHORTCUT_COUNT {
            let id = id as u8;
            let value = storage.character_shortcut(id)?;
            if value != 0 {
                shortcuts.characters.push((id, value));
            }
        }

        for id in 0..WORD_SHORTCUT_COUNT {
            let id = id as u8;
            let length = storage.word_shortcut_length(id)?;
            if length == 0 {
                continue;
            }
            let characters = (0..length.min(WORD_CAPACITY))
                .map(|position| storage.word_entry(id, position))
                .collect::<Result<Vec<_>, _>>()?;
            shortcuts.words.push((id, characters));
        }

        for id in 0..BLOB_SHORTCUT_COUNT {
            let length = storage.blob_shortcut_length(id)?;
            if length == 0 {
                continue;
            }
            let pairs = (0..length)
                .map(|position| storage.blob_entry(id, position))
                .collect::<Result<Vec<_>, _>>()?;
            shortcuts.blobs.push((id, pairs));
        }

        Ok(shortcuts)
    }
}

/// Read an image file. `.eep`/`.hex` files are parsed as Intel HEX, anything
/// else is taken as a raw dump. Short images are padded with 0xFF.
pub fn load_image(path: &Path, size: usize) -> Result<Vec<u8>> {
    let is_hex = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("eep" | "hex")
    );
    let mut image = if is_hex {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let segments = hex::parse_hex(&contents)
            .with_context(|| format!("parsing Intel HEX file {}", path.display()))?;
        hex::to_image(&segments, size)?
    } else {
        fs::read(path).with_context(|| format!("reading {}", path.display()))?
    };
    if image.len() > size {
        anyhow::bail!(
            "{} holds {} bytes, more than the {} byte part",
            path.display(),
            image.len(),
            size
        );
    }
    debug!("{}: {} bytes", path.display(), image.len());
    image.resize(size, 0xFF);
    Ok(image)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Shortcuts {
    pub formatted: bool,
    pub characters: Vec<(u8, u8)>,
    pub words: Vec<(u8, Vec<u8>)>,
    pub blobs: Vec<(u8, Vec<(u8, u8)>)>,
}

impl fmt::Display for Shortcuts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.formatted {
            writeln!(f, "warning: layout marker missing, the keyboard will format on boot")?;
        }
        writeln!(f, "Character shortcuts (R): {}", self.characters.len())?;
        for (id, keycode) in &self.characters {
            writeln!(f, "  {:3}: 0x{:02X}", id, keycode)?;
        }
        writeln!(f, "Word shortcuts (G): {}", self.words.len())?;
        for (id, characters) in &self.words {
            write!(f, "  {:3}:", id)?;
            for keycode in characters {
                write!(f, " {:02X}", keycode)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "Blob shortcuts (B): {}", self.blobs.len())?;
        for (id, pairs) in &self.blobs {
            write!(f, "  {:3}:", id)?;
            for (keycode, modcode) in pairs {
                write!(f, " {:02X}/{:02X}", keycode, modcode)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
