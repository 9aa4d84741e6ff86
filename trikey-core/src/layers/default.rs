//! DFLT layer: raw keycode and modifier entry.

use crate::error::Error;
use crate::keys::Keypress;
use crate::leds::{LedMode, LedState};
use crate::storage::ByteStore;
use crate::usb::Keyboard;

use super::{Context, LayerId, Transition};

/// DFLT: build a keycode in bank 0 and a modifier in bank 1, then send them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultLayer {
    keycode: u8,
    modifier: u8,
}

impl DefaultLayer {
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
        let result = match keypress {
            Keypress::X => {
                self.keycode = self.keycode.wrapping_add(1);
                Ok(())
            }
            Keypress::Y => {
                self.modifier = self.modifier.wrapping_add(1);
                Ok(())
            }
            Keypress::Z => cx
                .keyboard
                .send_keypress(self.keycode, self.modifier)
                .map_err(Error::from),
            Keypress::XZ => {
                self.keycode = 0;
                Ok(())
            }
            Keypress::YZ => {
                self.modifier = 0;
                Ok(())
            }
            Keypress::XY => Ok(()),
            Keypress::XYZ => return Ok(Transition::SwitchTo(LayerId::Dflt.next())),
        };
        self.paint(cx.leds);
        result.map(|()| Transition::Stay)
    }

    pub fn paint(&self, leds: &mut LedState) {
        leds.set_color(None);
        leds.set_prog(LedMode::Off);
        leds.set_bank0(self.keycode);
        leds.set_bank1(self.modifier);
    }
}
