//! The four-layer input state machine.
//!
//! Every layer shares one vocabulary: `X`/`Y` adjust a counter or move
//! between shortcut slots, `Z` sends, `XZ`/`YZ` clear, `XY` toggles
//! programming mode where the layer has one, and `XYZ` leaves programming
//! mode or moves on to the next layer (DFLT -> R -> G -> B -> DFLT).

mod blob;
mod character;
mod default;
mod word;

use log::debug;

use crate::error::Error;
use crate::keys::Keypress;
use crate::leds::LedState;
use crate::storage::{ByteStore, StorageController};
use crate::usb::Keyboard;

pub use blob::BlobLayer;
pub use character::CharacterLayer;
pub use default::DefaultLayer;
pub use word::WordLayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerId {
    /// Raw keycode/modifier entry.
    Dflt,
    /// Character shortcuts.
    R,
    /// Word shortcuts.
    G,
    /// Blob shortcuts.
    B,
}

impl LayerId {
    pub const fn next(self) -> LayerId {
        match self {
            LayerId::Dflt => LayerId::R,
            LayerId::R => LayerId::G,
            LayerId::G => LayerId::B,
            LayerId::B => LayerId::Dflt,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// What a layer asks the controller to do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    SwitchTo(LayerId),
}

/// Everything a layer may touch while handling an event.
pub struct Context<'c, I, A, B, K: ?Sized> {
    pub storage: &'c mut StorageController<I, A, B>,
    pub keyboard: &'c K,
    pub leds: &'c mut LedState,
}

/// One layer and its private state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Dflt(DefaultLayer),
    R(CharacterLayer),
    G(WordLayer),
    B(BlobLayer),
}

impl Layer {
    pub fn initial(id: LayerId) -> Layer {
        match id {
            LayerId::Dflt => Layer::Dflt(DefaultLayer::default()),
            LayerId::R => Layer::R(CharacterLayer::default()),
            LayerId::G => Layer::G(WordLayer::default()),
            LayerId::B => Layer::B(BlobLayer::default()),
        }
    }

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
        match self {
            Layer::Dflt(layer) => layer.handle_event(keypress, cx),
            Layer::R(layer) => layer.handle_event(keypress, cx),
            Layer::G(layer) => layer.handle_event(keypress, cx),
            Layer::B(layer) => layer.handle_event(keypress, cx),
        }
    }

    /// Repaint the LEDs for a freshly entered layer.
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
        match self {
            Layer::Dflt(layer) => {
                layer.paint(cx.leds);
                Ok(())
            }
            Layer::R(layer) => {
                layer.paint(cx.leds);
                Ok(())
            }
            Layer::G(layer) => layer.transitioned_to_layer(cx),
            Layer::B(layer) => layer.transitioned_to_layer(cx),
        }
    }
}

/// Owns the active layer id, one [`Layer`] per id, the shortcut storage and
/// the LED state the layers paint.
pub struct LayerController<'a, I, A, B, K: ?Sized> {
    current: LayerId,
    layers: [Layer; 4],
    storage: StorageController<I, A, B>,
    keyboard: &'a K,
    leds: LedState,
}

impl<'a, I, A, B, K> LayerController<'a, I, A, B, K>
where
    I: ByteStore,
    A: ByteStore,
    B: ByteStore,
    K: Keyboard + ?Sized,
{
    pub fn new(storage: StorageController<I, A, B>, keyboard: &'a K) -> Self {
        Self {
            current: LayerId::Dflt,
            layers: [LayerId::Dflt, LayerId::R, LayerId::G, LayerId::B].map(Layer::initial),
            storage,
            keyboard,
            leds: LedState::new(),
        }
    }

    pub fn current(&self) -> LayerId {
        self.current
    }

    pub fn layer(&self, id: LayerId) -> &Layer {
        &self.layers[id.index()]
    }

    pub fn leds(&self) -> &LedState {
        &self.leds
    }

    pub fn leds_mut(&mut self) -> &mut LedState {
        &mut self.leds
    }

    pub fn storage_mut(&mut self) -> &mut StorageController<I, A, B> {
        &mut self.storage
    }

    /// Route one keypress to the active layer and follow any transition.
    pub fn handle_event(&mut self, keypress: Keypress) -> Result<(), Error> {
        let mut cx = Context {
            storage: &mut self.storage,
            keyboard: self.keyboard,
            leds: &mut self.leds,
        };
        match self.layers[self.current.index()].handle_event(keypress, &mut cx)? {
            Transition::Stay => Ok(()),
            Transition::SwitchTo(next) => self.switch_to_layer(next),
        }
    }

    /// Make `id` the active layer and let it repaint.
    ///
    /// Returning to DFLT resets every other layer; R, G and B keep their
    /// state only for as long as the cycle has not passed through DFLT.
    pub fn switch_to_layer(&mut self, id: LayerId) -> Result<(), Error> {
        debug!("layer {:?} -> {:?}", self.current, id);
        if id == LayerId::Dflt {
            for other in [LayerId::R, LayerId::G, LayerId::B] {
                self.layers[other.index()] = Layer::initial(other);
            }
        }
        self.current = id;
        self.transitioned_to_layer()
    }

    /// Repaint the active layer.
    pub fn transitioned_to_layer(&mut self) -> Result<(), Error> {
        let mut cx = Context {
            storage: &mut self.storage,
            keyboard: self.keyboard,
            leds: &mut self.leds,
        };
        self.layers[self.current.index()].transitioned_to_layer(&mut cx)
    }
}
