//! G layer: word shortcuts.

use crate::error::Error;
use crate::keys::Keypress;
use crate::leds::{Color, LedMode, LedState};
use crate::storage::{ByteStore, WordMode};
use crate::usb::Keyboard;

use super::{Context, LayerId, Transition};

/// G: word shortcuts of up to fifteen characters, typed with a
/// [`WordMode`] applied on the way out.
///
/// The stored length is re-read after every event so the banks never show
/// a stale count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordLayer {
    shortcut_id: u8,
    mode: WordMode,
    character: u8,
    length: u8,
    prog: bool,
}

impl WordLayer {
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
            return Ok(Transition::SwitchTo(LayerId::G.next()));
        }
        let result = if self.prog {
            self.program(keypress, cx)
        } else {
            self.navigate(keypress, cx)
        }
        .and_then(|()| self.refresh(cx));
        self.paint(cx.leds);
        result.map(|()| Transition::Stay)
    }

    pub fn transitioned_to_layer<I, A, B, K>(
        &mut self,
        cx: &mut Context<'_, I, A, B, K>,
    ) -> Result<(), Error>
    where
        I: ByteStore,
        A: ByteStore,
        B: ByteStore,
        K: Keyboard + ?Sized,
    {
        let result = self.refresh(cx);
        self.paint(cx.leds);
        result
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
            Keypress::Y => self.mode = self.mode.next(),
            Keypress::Z => cx
                .storage
                .send_word_shortcut(self.shortcut_id, self.mode, cx.keyboard)?,
            Keypress::XZ => self.shortcut_id = 0,
            Keypress::YZ => self.mode = WordMode::AsIs,
            Keypress::XY => self.prog = true,
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
            Keypress::X => self.character = self.character.wrapping_add(1),
            Keypress::Y => self.shortcut_id = self.shortcut_id.wrapping_add(1),
            Keypress::Z => cx
                .storage
                .append_to_word_shortcut(self.shortcut_id, self.character)?,
            Keypress::XZ => cx.storage.clear_word_shortcut(self.shortcut_id)?,
            Keypress::YZ => self.character = 0,
            Keypress::XY | Keypress::XYZ => self.prog = false,
        }
        Ok(())
    }

    fn refresh<I, A, B, K>(&mut self, cx: &mut Context<'_, I, A, B, K>) -> Result<(), Error>
    where
        I: ByteStore,
        A: ByteStore,
        B: ByteStore,
        K: Keyboard + ?Sized,
    {
        self.length = cx.storage.word_shortcut_length(self.shortcut_id)?;
        Ok(())
    }

    pub fn paint(&self, leds: &mut LedState) {
        let length = self.length & 0x0F;
        if self.prog {
            leds.set_color(Some((Color::Green, LedMode::Blink)));
            leds.set_prog(LedMode::On);
            leds.set_bank0(self.character);
            leds.set_bank1(length);
        } else {
            leds.set_color(Some((Color::Green, LedMode::On)));
            leds.set_prog(LedMode::Off);
            leds.set_bank0(self.shortcut_id);
            leds.set_bank1((self.mode.index() << 4) | length);
        }
    }
}
