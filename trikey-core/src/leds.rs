//! LED matrix state and scan multiplexing.
//!
//! The matrix has five rows of four active-low columns:
//!
//! | row | columns                         |
//! |-----|---------------------------------|
//! | 0   | bank 0, bits 0-3                |
//! | 1   | bank 0, bits 4-7                |
//! | 2   | bank 1, bits 0-3                |
//! | 3   | bank 1, bits 4-7                |
//! | 4   | R, G, B, PROG mode LEDs         |
//!
//! Rows 0-3 are plain on/off. Mode LEDs resolve their [`LedMode`] against a
//! free-running counter bumped once per scan.

/// LED scan tick period in milliseconds.
pub const LED_TICK_MS: u8 = 2;

pub const ROWS: u8 = 5;
pub const COLUMNS: u8 = 4;

const COLUMN_MASK: u8 = (1 << COLUMNS) - 1;
const MODE_ROW: u8 = ROWS - 1;
const BLINK_BIT: u8 = 1 << 7;
const BLINK_FAST_BIT: u8 = 1 << 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedMode {
    #[default]
    Off,
    On,
    Blink,
    BlinkFast,
}

impl LedMode {
    /// Whether the LED is lit at this counter value.
    pub const fn is_lit(self, counter: u8) -> bool {
        match self {
            LedMode::Off => false,
            LedMode::On => true,
            LedMode::Blink => counter & BLINK_BIT != 0,
            LedMode::BlinkFast => counter & BLINK_FAST_BIT != 0,
        }
    }
}

/// Everything the matrix displays.
///
/// Mutated by the active layer in the foreground; the scan only ever reads a
/// copy of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedState {
    pub r: LedMode,
    pub g: LedMode,
    pub b: LedMode,
    pub prog: LedMode,
    pub bank0: u8,
    pub bank1: u8,
    /// Set by the runtime when the last operation failed. Overrides PROG
    /// with a fast blink.
    pub error: bool,
}

impl LedState {
    pub const fn new() -> Self {
        Self {
            r: LedMode::Off,
            g: LedMode::Off,
            b: LedMode::Off,
            prog: LedMode::Off,
            bank0: 0,
            bank1: 0,
            error: false,
        }
    }

    pub fn set_r(&mut self, mode: LedMode) {
        self.r = mode;
    }

    pub fn set_g(&mut self, mode: LedMode) {
        self.g = mode;
    }

    pub fn set_b(&mut self, mode: LedMode) {
        self.b = mode;
    }

    pub fn set_prog(&mut self, mode: LedMode) {
        self.prog = mode;
    }

    pub fn set_bank0(&mut self, value: u8) {
        self.bank0 = value;
    }

    pub fn set_bank1(&mut self, value: u8) {
        self.bank1 = value;
    }

    /// Light exactly one colour LED, or none for `None`.
    pub fn set_color(&mut self, color: Option<(Color, LedMode)>) {
        self.r = LedMode::Off;
        self.g = LedMode::Off;
        self.b = LedMode::Off;
        if let Some((color, mode)) = color {
            match color {
                Color::Red => self.r = mode,
                Color::Green => self.g = mode,
                Color::Blue => self.b = mode,
            }
        }
    }

    /// Lit columns (active high) for a row at the given blink counter.
    pub fn row_bits(&self, row: u8, counter: u8) -> u8 {
        match row {
            0 => self.bank0 & COLUMN_MASK,
            1 => self.bank0 >> COLUMNS,
            2 => self.bank1 & COLUMN_MASK,
            3 => self.bank1 >> COLUMNS,
            MODE_ROW => {
                let prog = if self.error {
                    LedMode::BlinkFast
                } else {
                    self.prog
                };
                [self.r, self.g, self.b, prog]
                    .iter()
                    .enumerate()
                    .filter(|(_, mode)| mode.is_lit(counter))
                    .fold(0u8, |bits, (i, _)| bits | (1u8 << i))
            }
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Blue,
}

/// Output lines of the matrix.
pub trait LedLines {
    /// Select `row` and drive the column lines. `columns` is already
    /// active-low: a cleared bit lights the LED.
    fn drive(&self, row: u8, columns: u8);
}

/// Row multiplexer, advanced once per LED tick from interrupt context.
pub struct LedController<L> {
    lines: L,
    state: LedState,
    row: u8,
    counter: u8,
}

impl<L: LedLines> LedController<L> {
    pub const fn new(lines: L) -> Self {
        Self {
            lines,
            state: LedState::new(),
            row: 0,
            counter: 0,
        }
    }

    /// Replace the displayed state. Takes effect on the next scan.
    pub fn update(&mut self, state: LedState) {
        self.state = state;
    }

    pub fn state(&self) -> &LedState {
        &self.state
    }

    pub fn lines(&self) -> &L {
        &self.lines
    }

    pub fn state_mut(&mut self) -> &mut LedState {
        &mut self.state
    }

    /// Drive the next row.
    pub fn scan_next_line(&mut self) {
        let bits = self.state.row_bits(self.row, self.counter);
        self.lines.drive(self.row, !bits & COLUMN_MASK);

        self.row += 1;
        if self.row == ROWS {
            self.row = 0;
        }
        self.counter = self.counter.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeLedLines;

    #[test]
    fn test_rows_cycle_and_wrap() {
        let mut leds = LedController::new(FakeLedLines::default());
        for _ in 0..7 {
            leds.scan_next_line();
        }
        let rows: Vec<u8> = leds.lines.driven().iter().map(|(row, _)| *row).collect();
        assert_eq!(rows, vec![0, 1, 2, 3, 4, 0, 1]);
    }

    #[test]
    fn test_banks_are_active_low_nibbles() {
        let mut leds = LedController::new(FakeLedLines::default());
        leds.state_mut().set_bank0(0xA5);
        leds.state_mut().set_bank1(0x0F);
        for _ in 0..4 {
            leds.scan_next_line();
        }
        let columns: Vec<u8> = leds.lines.driven().iter().map(|(_, c)| *c).collect();
        assert_eq!(columns, vec![!0x5 & 0xF, !0xA & 0xF, 0x0, 0xF]);
    }

    #[test]
    fn test_blink_follows_counter_bits() {
        assert!(!LedMode::Blink.is_lit(0x7F));
        assert!(LedMode::Blink.is_lit(0x80));
        assert!(!LedMode::BlinkFast.is_lit(0x3F));
        assert!(LedMode::BlinkFast.is_lit(0x40));
        assert!(LedMode::On.is_lit(0));
        assert!(!LedMode::Off.is_lit(0xFF));
    }

    #[test]
    fn test_mode_row() {
        let mut state = LedState::new();
        state.set_color(Some((Color::Green, LedMode::On)));
        state.set_prog(LedMode::Blink);
        assert_eq!(state.row_bits(4, 0), 0b0010);
        assert_eq!(state.row_bits(4, 0x80), 0b1010);

        state.error = true;
        assert_eq!(state.row_bits(4, 0x80), 0b0010);
        assert_eq!(state.row_bits(4, 0x40), 0b1010);
    }

    #[test]
    fn test_set_color_keeps_one_lit() {
        let mut state = LedState::new();
        state.set_color(Some((Color::Red, LedMode::On)));
        state.set_color(Some((Color::Blue, LedMode::Blink)));
        assert_eq!((state.r, state.g, state.b), (LedMode::Off, LedMode::Off, LedMode::Blink));
        state.set_color(None);
        assert_eq!((state.r, state.g, state.b), (LedMode::Off, LedMode::Off, LedMode::Off));
    }
}
