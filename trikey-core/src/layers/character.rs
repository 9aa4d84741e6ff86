//! R layer: character shortcuts.

use crate::error::Error;
use crate::keys::Keypress;
use crate::leds::{Color, LedMode, LedState};
use crate::storage::ByteStore;
use crate::usb::Keyboard;

use super::{Context, LayerId, Transition};

/// R: one stored keycode per shortcut id, sent with a modifier chosen on
/// the spot.
///
/// In programming mode `X` increments the stored keycode and writes it back
/// immediately, so bank 1 always shows what is in EEPROM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterLayer {
    shortcut_id: u8,
    modcode: u8,
    value: u8,
    prog: bool,
}

impl CharacterLayer {
    pub fn handle_event<I, A, B, K>(
        &mut self,
        keypress: Keypress,
        cx: &mut Context<'_, I, A, B, K>,
    ) -> Result<Transition, Error>
    where
        I: ByteStore,
        A: ByteStore,
        B: ByteStore,
        K: Keyboard + ?Sized,
    {
        if !self.prog && keypress == Keypress::XYZ {
            return Ok(Transition::SwitchTo(LayerId::R.next()));
        }
        let result = if self.prog {
            self.program(keypress, cx)
        } else {
            self.navigate(keypress, cx)
        };
        self.paint(cx.leds);
        result.map(|()| Transition::Stay)
    }

    fn navigate<I, A, B, K>(
        &mut self,
        keypress: Keypress,
        cx: &mut Context<'_, I, A, B, K>,
    ) -> Result<(), Error>
    where
        I: ByteStore,
        A: ByteStore,
        B: ByteStore,
        K: Keyboard + ?Sized,
    {
        match keypress {
            Keypress::X => self.shortcut_id = self.shortcut_id.wrapping_add(1),
            Keypress::Y => self.modcode = self.modcode.wrapping_add(1),
            Keypress::Z => {
                let keycode = cx.storage.character_shortcut(self.shortcut_id)?;
                cx.keyboard.send_keypress(keycode, self.modcode)?;
            }
            Keypress::XZ => self.shortcut_id = 0,
            Keypress::YZ => self.modcode = 0,
            Keypress::XY => {
                self.value = cx.storage.character_shortcut(self.shortcut_id)?;
                self.prog = true;
            }
            Keypress::XYZ => {}
        }
        Ok(())
    }

    fn program<I, A, B, K>(
        &mut self,
        keypress: Keypress,
        cx: &mut Context<'_, I, A, B, K>,
    ) -> Result<(), Error>
    where
        I: ByteStore,
        A: ByteStore,
        B: ByteStore,
        K: Keyboard + ?Sized,
    {
        match keypress {
            Keypress::X => {
                let value = self.value.wrapping_add(1);
                cx.storage.set_character_shortcut(self.shortcut_id, value)?;
                self.value = value;
            }
            Keypress::Y => self.select(self.shortcut_id.wrapping_add(1), cx)?,
            Keypress::Z => cx.keyboard.send_keypress(self.value, self.modcode)?,
            Keypress::XZ => {
                cx.storage.set_character_shortcut(self.shortcut_id, 0)?;
                self.value = 0;
            }
            Keypress::YZ => self.select(0, cx)?,
            Keypress::XY | Keypress::XYZ => self.prog = false,
        }
        Ok(())
    }

    fn select<I, A, B, K>(&mut self, id: u8, cx: &mut Context<'_, I, A, B, K>) -> Result<(), Error>
    where
        I: ByteStore,
        A: ByteStore,
        B: ByteStore,
        K: Keyboard + ?Sized,
    {
        self.value = cx.storage.character_shortcut(id)?;
        self.shortcut_id = id;
        Ok(())
    }

    pub fn paint(&self, leds: &mut LedState) {
        if self.prog {
            leds.set_color(Some((Color::Red, LedMode::Blink)));
            leds.set_prog(LedMode::On);
            leds.set_bank1(self.value);
        } else {
            leds.set_color(Some((Color::Red, LedMode::On)));
            leds.set_prog(LedMode::Off);
            leds.set_bank1(self.modcode);
        }
        leds.set_bank0(self.shortcut_id);
    }
}
