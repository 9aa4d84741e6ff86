//! Glue between the timer interrupts and the foreground event loop.

use core::cell::RefCell;

use critical_section::Mutex;
use log::{debug, info, warn};

use crate::error::Error;
use crate::keys::{KeyController, Keypress, KeypressCell, SwitchPins};
use crate::layers::LayerController;
use crate::leds::{LedController, LedLines, LedState};
use crate::storage::ByteStore;
use crate::usb::Keyboard;

/// State touched from the two timer interrupts.
///
/// Meant to live in a `static`: every method takes `&self` and does its
/// work inside a critical section.
pub struct Ticks<S, L> {
    switches: S,
    keys: Mutex<RefCell<KeyController>>,
    pending: KeypressCell,
    leds: Mutex<RefCell<LedController<L>>>,
}

impl<S: SwitchPins, L: LedLines> Ticks<S, L> {
    pub const fn new(switches: S, lines: L) -> Self {
        Self {
            switches,
            keys: Mutex::new(RefCell::new(KeyController::new())),
            pending: KeypressCell::new(),
            leds: Mutex::new(RefCell::new(LedController::new(lines))),
        }
    }

    /// Key tick: sample the switches and post any finished gesture.
    pub fn poll_keys(&self) {
        let finished =
            critical_section::with(|cs| self.keys.borrow_ref_mut(cs).poll(&self.switches));
        if let Some(keypress) = finished {
            self.pending.post(keypress);
        }
    }

    /// LED tick: drive the next matrix row.
    pub fn scan_leds(&self) {
        critical_section::with(|cs| self.leds.borrow_ref_mut(cs).scan_next_line());
    }

    pub fn take_keypress(&self) -> Option<Keypress> {
        self.pending.take()
    }

    /// Hand a new LED snapshot to the scanner.
    pub fn publish(&self, state: LedState) {
        critical_section::with(|cs| self.leds.borrow_ref_mut(cs).update(state));
    }

    /// The snapshot the scanner is currently displaying.
    pub fn displayed(&self) -> LedState {
        critical_section::with(|cs| *self.leds.borrow_ref(cs).state())
    }

    #[cfg(test)]
    pub(crate) fn with_lines<R>(&self, f: impl FnOnce(&L) -> R) -> R {
        critical_section::with(|cs| f(self.leds.borrow_ref(cs).lines()))
    }
}

/// The foreground loop: drains keypresses, runs the active layer and
/// republishes the LEDs after each event.
pub struct Runtime<'a, S, L, I, A, B, K: ?Sized> {
    ticks: &'a Ticks<S, L>,
    layers: LayerController<'a, I, A, B, K>,
}

impl<'a, S, L, I, A, B, K> Runtime<'a, S, L, I, A, B, K>
where
    S: SwitchPins,
    L: LedLines,
    I: ByteStore,
    A: ByteStore,
    B: ByteStore,
    K: Keyboard + ?Sized,
{
    pub fn new(ticks: &'a Ticks<S, L>, layers: LayerController<'a, I, A, B, K>) -> Self {
        Self { ticks, layers }
    }

    pub fn layers(&self) -> &LayerController<'a, I, A, B, K> {
        &self.layers
    }

    /// Format fresh storage if needed and paint the initial layer.
    pub fn start(&mut self) {
        let result = self
            .layers
            .storage_mut()
            .ensure_formatted()
            .map_err(Error::from)
            .and_then(|formatted| {
                if formatted {
                    info!("storage was blank, formatted");
                }
                self.layers.transitioned_to_layer()
            });
        self.report(result);
    }

    /// Handle at most one pending keypress. Returns whether one was handled.
    pub fn run_once(&mut self) -> bool {
        let Some(keypress) = self.ticks.take_keypress() else {
            return false;
        };
        debug!("keypress {:?} on {:?}", keypress, self.layers.current());
        let result = self.layers.handle_event(keypress);
        self.report(result);
        true
    }

    pub fn run(&mut self) -> ! {
        loop {
            if !self.run_once() {
                core::hint::spin_loop();
            }
        }
    }

    /// Show the outcome of the last operation and publish the LEDs.
    ///
    /// A failure blinks PROG fast until the next operation succeeds.
    pub fn report(&mut self, result: Result<(), Error>) {
        if let Err(err) = result {
            warn!("{}", err);
        }
        self.layers.leds_mut().error = result.is_err();
        self.ticks.publish(*self.layers.leds());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StorageError, UsbError};
    use crate::keys::Key;
    use crate::layers::LayerId;
    use crate::leds::LedMode;
    use crate::storage::{StorageController, BULK_SIZE, INTERNAL_SIZE};
    use crate::test_support::{FakeLedLines, FakeSwitches, FaultyStore, RecordingKeyboard};

    type TestTicks = Ticks<FakeSwitches, FakeLedLines>;

    fn blank_storage() -> StorageController<FaultyStore, FaultyStore, FaultyStore> {
        StorageController::new(
            FaultyStore::new(INTERNAL_SIZE),
            FaultyStore::new(BULK_SIZE),
            FaultyStore::new(BULK_SIZE),
        )
    }

    fn tap(ticks: &TestTicks, keys: &[Key]) {
        ticks.switches.hold(keys);
        ticks.poll_keys();
        ticks.switches.hold(&[]);
        ticks.poll_keys();
    }

    #[test]
    fn test_start_formats_blank_storage() {
        let ticks = TestTicks::new(FakeSwitches::default(), FakeLedLines::default());
        let keyboard = RecordingKeyboard::default();
        let mut runtime = Runtime::new(&ticks, LayerController::new(blank_storage(), &keyboard));
        runtime.start();
        assert!(!ticks.displayed().error);

        let mut storage = blank_storage();
        storage.format().unwrap();
        let (internal, _, _) = storage.into_inner();
        let mut layers = runtime.layers;
        assert_eq!(layers.storage_mut().internal_mut().bytes, internal.bytes);
    }

    #[test]
    fn test_start_failure_lights_error() {
        let ticks = TestTicks::new(FakeSwitches::default(), FakeLedLines::default());
        let keyboard = RecordingKeyboard::default();
        let mut storage = blank_storage();
        storage.internal_mut().fail_writes = true;
        let mut runtime = Runtime::new(&ticks, LayerController::new(storage, &keyboard));
        runtime.start();
        assert!(ticks.displayed().error);
    }

    #[test]
    fn test_keypress_flows_to_layer_and_leds() {
        let ticks = TestTicks::new(FakeSwitches::default(), FakeLedLines::default());
        let keyboard = RecordingKeyboard::default();
        let mut runtime = Runtime::new(&ticks, LayerController::new(blank_storage(), &keyboard));
        runtime.start();
        assert!(!runtime.run_once());

        tap(&ticks, &[Key::X]);
        assert!(runtime.run_once());
        assert_eq!(ticks.displayed().bank0, 1);

        ticks.scan_leds();
        ticks.with_lines(|lines| assert_eq!(lines.driven(), vec![(0, 0b1110)]));
    }

    #[test]
    fn test_chord_switches_layer() {
        let ticks = TestTicks::new(FakeSwitches::default(), FakeLedLines::default());
        let keyboard = RecordingKeyboard::default();
        let mut runtime = Runtime::new(&ticks, LayerController::new(blank_storage(), &keyboard));
        runtime.start();

        ticks.switches.hold(&[Key::X, Key::Y]);
        ticks.poll_keys();
        ticks.switches.hold(&[Key::X, Key::Y, Key::Z]);
        ticks.poll_keys();
        ticks.switches.hold(&[Key::Z]);
        ticks.poll_keys();
        assert!(!runtime.run_once());
        ticks.switches.hold(&[]);
        ticks.poll_keys();
        assert!(runtime.run_once());

        assert_eq!(runtime.layers().current(), LayerId::R);
        assert_eq!(ticks.displayed().r, LedMode::On);
    }

    #[test]
    fn test_error_clears_on_next_success() {
        let ticks = TestTicks::new(FakeSwitches::default(), FakeLedLines::default());
        let keyboard = RecordingKeyboard::failing_after(0);
        let mut runtime = Runtime::new(&ticks, LayerController::new(blank_storage(), &keyboard));
        runtime.start();

        tap(&ticks, &[Key::Z]);
        runtime.run_once();
        assert!(ticks.displayed().error);

        tap(&ticks, &[Key::Y]);
        runtime.run_once();
        let shown = ticks.displayed();
        assert!(!shown.error);
        assert_eq!(shown.bank1, 1);
    }

    #[test]
    fn test_report_publishes_usb_failure() {
        let ticks = TestTicks::new(FakeSwitches::default(), FakeLedLines::default());
        let keyboard = RecordingKeyboard::default();
        let mut runtime = Runtime::new(&ticks, LayerController::new(blank_storage(), &keyboard));
        runtime.start();
        runtime.report(Err(UsbError::PllTimeout.into()));
        assert!(ticks.displayed().error);
        runtime.report(Err(StorageError::Full.into()));
        assert!(ticks.displayed().error);
    }
}
