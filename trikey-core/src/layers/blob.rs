//! B layer: blob shortcuts.

use crate::error::Error;
use crate::keys::Keypress;
use crate::leds::{Color, LedMode, LedState};
use crate::storage::{ByteStore, BLOB_SHORTCUT_COUNT};
use crate::usb::Keyboard;

use super::{Context, LayerId, Transition};

/// B: blob shortcuts, each a list of keycode/modifier pairs replayed in
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobLayer {
    shortcut_id: u8,
    keycode: u8,
    modcode: u8,
    length: u8,
    prog: bool,
}

impl BlobLayer {
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
            return Ok(Transition::SwitchTo(LayerId::B.next()));
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
            Keypress::X => {
                self.shortcut_id = (self.shortcut_id + 1) % BLOB_SHORTCUT_COUNT;
            }
            Keypress::Y => {
                self.shortcut_id = self
                    .shortcut_id
                    .checked_sub(1)
                    .unwrap_or(BLOB_SHORTCUT_COUNT - 1);
            }
            Keypress::Z => cx.storage.send_blob_shortcut(self.shortcut_id, cx.keyboard)?,
            Keypress::XZ => self.shortcut_id = 0,
            Keypress::XY => self.prog = true,
            Keypress::YZ | Keypress::XYZ => {}
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
            Keypress::X => self.keycode = self.keycode.wrapping_add(1),
            Keypress::Y => self.modcode = self.modcode.wrapping_add(1),
            Keypress::Z => {
                cx.storage
                    .append_to_blob_shortcut(self.shortcut_id, self.keycode, self.modcode)?;
            }
            Keypress::XZ => cx.storage.clear_blob_shortcut(self.shortcut_id)?,
            Keypress::YZ => {
                self.keycode = 0;
                self.modcode = 0;
            }
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
        self.length = cx.storage.blob_shortcut_length(self.shortcut_id)?;
        Ok(())
    }

    pub fn paint(&self, leds: &mut LedState) {
        if self.prog {
            leds.set_color(Some((Color::Blue, LedMode::Blink)));
            leds.set_prog(LedMode::On);
            leds.set_bank0(self.keycode);
            leds.set_bank1(self.modcode);
        } else {
            leds.set_color(Some((Color::Blue, LedMode::On)));
            leds.set_prog(LedMode::Off);
            leds.set_bank0(self.shortcut_id);
            leds.set_bank1(self.length);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{controller, press, Controller};
    use crate::keys::Keypress;
    use crate::layers::LayerId;
    use crate::leds::LedMode;
    use crate::storage::BLOB_SHORTCUT_COUNT;
    use crate::test_support::RecordingKeyboard;

    fn enter(keyboard: &RecordingKeyboard) -> Controller<'_> {
        let mut layers = controller(keyboard);
        press(&mut layers, &[Keypress::XYZ; 3]);
        assert_eq!(layers.current(), LayerId::B);
        layers
    }

    #[test]
    fn test_record_and_replay_pairs() {
        let keyboard = RecordingKeyboard::default();
        let mut layers = enter(&keyboard);
        press(
            &mut layers,
            &[Keypress::XY, Keypress::X, Keypress::Y, Keypress::Z],
        );
        assert_eq!(layers.leds().b, LedMode::Blink);
        assert_eq!((layers.leds().bank0, layers.leds().bank1), (1, 1));
        press(
            &mut layers,
            &[Keypress::X, Keypress::YZ, Keypress::X, Keypress::Z],
        );
        layers.handle_event(Keypress::XY).unwrap();
        assert_eq!((layers.leds().bank0, layers.leds().bank1), (0, 2));

        layers.handle_event(Keypress::Z).unwrap();
        assert_eq!(keyboard.sent(), vec![(1, 1), (1, 0)]);
    }

    #[test]
    fn test_id_wraps_both_ways() {
        let keyboard = RecordingKeyboard::default();
        let mut layers = enter(&keyboard);
        layers.handle_event(Keypress::Y).unwrap();
        assert_eq!(layers.leds().bank0, BLOB_SHORTCUT_COUNT - 1);
        layers.handle_event(Keypress::X).unwrap();
        assert_eq!(layers.leds().bank0, 0);
        press(&mut layers, &[Keypress::X, Keypress::X, Keypress::XZ]);
        assert_eq!(layers.leds().bank0, 0);
    }

    #[test]
    fn test_last_id_lands_in_second_bulk_store() {
        let keyboard = RecordingKeyboard::default();
        let mut layers = enter(&keyboard);
        press(
            &mut layers,
            &[Keypress::Y, Keypress::XY, Keypress::X, Keypress::Z],
        );
        assert!(layers.storage_mut().bulk_b_mut().bytes.iter().any(|&byte| byte == 1));
        press(&mut layers, &[Keypress::XZ, Keypress::XY]);
        assert_eq!(layers.leds().bank1, 0);
    }

    #[test]
    fn test_cycle_back_to_default() {
        let keyboard = RecordingKeyboard::default();
        let mut layers = enter(&keyboard);
        layers.handle_event(Keypress::XYZ).unwrap();
        assert_eq!(layers.current(), LayerId::Dflt);
        assert_eq!(layers.leds().b, LedMode::Off);
    }
}
