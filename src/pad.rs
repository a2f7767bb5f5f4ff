use pebblecore_common::{
    data::{read_u8, write_u8},
    error::Error,
};
use std::io::Cursor;

use crate::state::{StateComponent, StateFormat};

pub struct Pad {
    down: bool,
    up: bool,
    left: bool,
    right: bool,
    start: bool,
    select: bool,
    b: bool,
    a: bool,
    selection: PadSelection,

    /// Set whenever a selected button line transitions from released to
    /// pressed, mirroring the hardware joypad interrupt (used to wake
    /// the CPU from STOP). Cleared by [`Pad::ack_pad`].
    int_pad: bool,

    /// Optional host-provided polling callback, queried once per frame
    /// by [`Pad::poll`] as an alternative to the discrete [`Pad::key_press`]
    /// / [`Pad::key_lift`] event API. Bit layout matches the host's
    /// input-snapshot convention: A, B, Select, Start, Right, Left, Up,
    /// Down from bit 0 upwards, set when the corresponding key is held.
    input_callback: Option<fn() -> u8>,
}

/// Bit positions of the host input-snapshot byte consumed by [`Pad::poll`].
const SNAPSHOT_A: u8 = 0x01;
const SNAPSHOT_B: u8 = 0x02;
const SNAPSHOT_SELECT: u8 = 0x04;
const SNAPSHOT_START: u8 = 0x08;
const SNAPSHOT_RIGHT: u8 = 0x10;
const SNAPSHOT_LEFT: u8 = 0x20;
const SNAPSHOT_UP: u8 = 0x40;
const SNAPSHOT_DOWN: u8 = 0x80;

#[derive(Clone, Copy, PartialEq)]
pub enum PadSelection {
    Action,
    Direction,
}

pub enum PadKey {
    Up,
    Down,
    Left,
    Right,
    Start,
    Select,
    A,
    B,
}

impl Pad {
    pub fn new() -> Self {
        Self {
            down: false,
            up: false,
            left: false,
            right: false,
            start: false,
            select: false,
            b: false,
            a: false,
            selection: PadSelection::Action,
            int_pad: false,
            input_callback: None,
        }
    }

    pub fn reset(&mut self) {
        self.down = false;
        self.up = false;
        self.left = false;
        self.right = false;
        self.start = false;
        self.select = false;
        self.b = false;
        self.a = false;
        self.selection = PadSelection::Action;
        self.int_pad = false;
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        match addr & 0x00ff {
            0x0000 => {
                let mut value;
                match self.selection {
                    PadSelection::Action => {
                        value = if self.a { 0x00 } else { 0x01 }
                            | if self.b { 0x00 } else { 0x02 }
                            | if self.select { 0x00 } else { 0x04 }
                            | if self.start { 0x00 } else { 0x08 }
                    }
                    PadSelection::Direction => {
                        value = if self.right { 0x00 } else { 0x01 }
                            | if self.left { 0x00 } else { 0x02 }
                            | if self.up { 0x00 } else { 0x04 }
                            | if self.down { 0x00 } else { 0x08 }
                    }
                }
                value |= if self.selection == PadSelection::Direction {
                    0x10
                } else {
                    0x00
                } | if self.selection == PadSelection::Action {
                    0x20
                } else {
                    0x00
                };
                value
            }
            addr => panic!("Reading from unknown Pad location 0x{:04x}", addr),
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr & 0x00ff {
            0x0000 => {
                self.selection = if value & 0x10 == 0x00 {
                    PadSelection::Direction
                } else {
                    PadSelection::Action
                }
            }
            addr => panic!("Writing to unknown Pad location 0x{:04x}", addr),
        }
    }

    pub fn key_press(&mut self, key: PadKey) {
        let is_action = matches!(
            key,
            PadKey::Start | PadKey::Select | PadKey::A | PadKey::B
        );
        let was_selected = match self.selection {
            PadSelection::Action => is_action,
            PadSelection::Direction => !is_action,
        };
        match key {
            PadKey::Up => self.up = true,
            PadKey::Down => self.down = true,
            PadKey::Left => self.left = true,
            PadKey::Right => self.right = true,
            PadKey::Start => self.start = true,
            PadKey::Select => self.select = true,
            PadKey::A => self.a = true,
            PadKey::B => self.b = true,
        }
        // the joypad interrupt fires on a high-to-low transition of a
        // currently selected line, regardless of which of the two
        // button groups is selected at the time, matching real hardware
        if was_selected {
            self.int_pad = true;
        }
    }

    pub fn key_lift(&mut self, key: PadKey) {
        match key {
            PadKey::Up => self.up = false,
            PadKey::Down => self.down = false,
            PadKey::Left => self.left = false,
            PadKey::Right => self.right = false,
            PadKey::Start => self.start = false,
            PadKey::Select => self.select = false,
            PadKey::A => self.a = false,
            PadKey::B => self.b = false,
        }
    }

    /// Registers the host's input-sampling callback, queried by [`Pad::poll`].
    /// The callback must not block and may be called from the tick thread.
    pub fn set_input_callback(&mut self, callback: fn() -> u8) {
        self.input_callback = Some(callback);
    }

    /// Queries the registered input-sampling callback (if any) and applies
    /// the returned snapshot, raising the joypad interrupt on any rising
    /// edge of a currently selected line exactly as [`Pad::key_press`] does.
    /// A no-op when no callback has been registered.
    pub fn poll(&mut self) {
        let Some(callback) = self.input_callback else {
            return;
        };
        let snapshot = callback();
        self.apply_snapshot(snapshot);
    }

    /// Applies an 8-bit input snapshot directly, bypassing the callback.
    /// Exposed so hosts that already own their own polling loop can push
    /// a snapshot without registering a callback.
    ///
    /// A button still held across two consecutive snapshots must not
    /// re-raise the joypad interrupt, so each line's previous pressed
    /// state is compared against the new snapshot and [`Pad::key_press`]
    /// is only invoked on the release-to-press edge; [`Pad::key_lift`] is
    /// harmless to call unconditionally since it never touches `int_pad`.
    pub fn apply_snapshot(&mut self, snapshot: u8) {
        let keys = [
            (PadKey::A, self.a, snapshot & SNAPSHOT_A != 0),
            (PadKey::B, self.b, snapshot & SNAPSHOT_B != 0),
            (PadKey::Select, self.select, snapshot & SNAPSHOT_SELECT != 0),
            (PadKey::Start, self.start, snapshot & SNAPSHOT_START != 0),
            (PadKey::Right, self.right, snapshot & SNAPSHOT_RIGHT != 0),
            (PadKey::Left, self.left, snapshot & SNAPSHOT_LEFT != 0),
            (PadKey::Up, self.up, snapshot & SNAPSHOT_UP != 0),
            (PadKey::Down, self.down, snapshot & SNAPSHOT_DOWN != 0),
        ];
        for (key, was_pressed, pressed) in keys {
            if pressed {
                if !was_pressed {
                    self.key_press(key);
                }
            } else {
                self.key_lift(key);
            }
        }
    }

    pub fn int_pad(&self) -> bool {
        self.int_pad
    }

    pub fn a(&self) -> bool {
        self.a
    }

    pub fn set_int_pad(&mut self, value: bool) {
        self.int_pad = value;
    }

    /// Acknowledges that the joypad interrupt has been serviced by
    /// the CPU, clearing the pending flag.
    pub fn ack_pad(&mut self) {
        self.set_int_pad(false);
    }
}

impl Default for Pad {
    fn default() -> Self {
        Self::new()
    }
}

impl StateComponent for Pad {
    fn state(&self, _format: Option<StateFormat>) -> Result<Vec<u8>, Error> {
        let mut cursor = Cursor::new(vec![]);
        write_u8(&mut cursor, self.down as u8)?;
        write_u8(&mut cursor, self.up as u8)?;
        write_u8(&mut cursor, self.left as u8)?;
        write_u8(&mut cursor, self.right as u8)?;
        write_u8(&mut cursor, self.start as u8)?;
        write_u8(&mut cursor, self.select as u8)?;
        write_u8(&mut cursor, self.b as u8)?;
        write_u8(&mut cursor, self.a as u8)?;
        write_u8(
            &mut cursor,
            matches!(self.selection, PadSelection::Action) as u8,
        )?;
        write_u8(&mut cursor, self.int_pad as u8)?;
        Ok(cursor.into_inner())
    }

    fn set_state(&mut self, data: &[u8], _format: Option<StateFormat>) -> Result<(), Error> {
        let mut cursor = Cursor::new(data);
        self.down = read_u8(&mut cursor)? != 0;
        self.up = read_u8(&mut cursor)? != 0;
        self.left = read_u8(&mut cursor)? != 0;
        self.right = read_u8(&mut cursor)? != 0;
        self.start = read_u8(&mut cursor)? != 0;
        self.select = read_u8(&mut cursor)? != 0;
        self.b = read_u8(&mut cursor)? != 0;
        self.a = read_u8(&mut cursor)? != 0;
        self.selection = if read_u8(&mut cursor)? != 0 {
            PadSelection::Action
        } else {
            PadSelection::Direction
        };
        self.int_pad = read_u8(&mut cursor)? != 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Pad, PadKey};
    use crate::state::StateComponent;

    #[test]
    fn test_key_press_sets_interrupt_when_selected() {
        let mut pad = Pad::new();
        pad.write(0x0, 0x10); // select action buttons
        pad.key_press(PadKey::A);
        assert!(pad.int_pad());
    }

    #[test]
    fn test_key_press_does_not_set_interrupt_when_not_selected() {
        let mut pad = Pad::new();
        pad.write(0x0, 0x10); // select action buttons
        pad.key_press(PadKey::Up);
        assert!(!pad.int_pad());
    }

    #[test]
    fn test_ack_pad_clears_interrupt() {
        let mut pad = Pad::new();
        pad.write(0x0, 0x10);
        pad.key_press(PadKey::A);
        pad.ack_pad();
        assert!(!pad.int_pad());
    }

    #[test]
    fn test_apply_snapshot_sets_and_clears_keys() {
        let mut pad = Pad::new();
        pad.write(0x0, 0x10); // select action buttons
        pad.apply_snapshot(0x01); // A held
        assert!(pad.a);
        assert!(pad.int_pad());
        pad.ack_pad();
        pad.apply_snapshot(0x00); // released
        assert!(!pad.a);
    }

    #[test]
    fn test_apply_snapshot_held_key_does_not_reraise_interrupt() {
        let mut pad = Pad::new();
        pad.write(0x0, 0x10); // select action buttons
        pad.apply_snapshot(0x01); // A pressed
        assert!(pad.int_pad());
        pad.ack_pad();

        pad.apply_snapshot(0x01); // A still held
        assert!(!pad.int_pad());

        pad.apply_snapshot(0x00); // A released
        pad.apply_snapshot(0x01); // A pressed again
        assert!(pad.int_pad());
    }

    #[test]
    fn test_poll_uses_registered_callback() {
        fn snapshot() -> u8 {
            0x80 // Down held
        }
        let mut pad = Pad::new();
        pad.set_input_callback(snapshot);
        pad.poll();
        assert!(pad.down);
    }

    #[test]
    fn test_state_round_trip() {
        let mut pad = Pad::new();
        pad.key_press(PadKey::Up);
        pad.key_press(PadKey::A);
        let state = pad.state(None).unwrap();

        let mut restored = Pad::new();
        restored.set_state(&state, None).unwrap();
        assert!(restored.up);
        assert!(restored.a);
    }
}
