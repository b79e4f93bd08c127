//! PS/2 scancode set 1 decoding.
//!
//! Modifier presses and releases update the modifier state; all other
//! releases are ignored. `Ctrl+1` to `Ctrl+3` select the active console.

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Arrow {
    Up,
    Down,
    Right,
    Left,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeyEvent {
    Byte(u8),
    Escape,
    Backspace,
    Arrow(Arrow),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeyAction {
    /// Input for the active console.
    Key(KeyEvent),
    /// Make console `n` (0-based) the active one.
    SwitchTty(usize),
}

const fn keymap(rows: &[(usize, &[u8])]) -> [u8; 128] {
    let mut map = [0; 128];
    let mut r = 0;
    while r < rows.len() {
        let (start, keys) = rows[r];
        let mut i = 0;
        while i < keys.len() {
            map[start + i] = keys[i];
            i += 1;
        }
        r += 1;
    }
    map
}

// UK layout
const PLAIN: [u8; 128] = keymap(&[
    (0x02, b"1234567890-="),
    (0x0F, b"\tqwertyuiop[]\n"),
    (0x1E, b"asdfghjkl;'`"),
    (0x2B, b"#zxcvbnm,./"),
    (0x37, b"*"),
    (0x39, b" "),
    (0x4A, b"-"),
    (0x4E, b"+"),
    (0x56, b"\\"),
]);

const SHIFTED: [u8; 128] = keymap(&[
    (0x02, b"!\"#$%^&*()_+"),
    (0x0F, b"\tQWERTYUIOP{}\n"),
    (0x1E, b"ASDFGHJKL:@"),
    (0x2B, b"~ZXCVBNM<>?"),
    (0x37, b"*"),
    (0x39, b" "),
    (0x4A, b"-"),
    (0x4E, b"+"),
    (0x56, b"|"),
]);

const SHIFT_DOWN: u8 = 0x2A;
const SHIFT_UP: u8 = 0xAA;
const CTRL_DOWN: u8 = 0x1D;
const CTRL_UP: u8 = 0x9D;
const ALT_DOWN: u8 = 0x38;
const ALT_UP: u8 = 0xB8;
const RELEASED: u8 = 0x80;

/// Modifier state between interrupts.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct Keyboard {
    shift: bool,
    ctrl: bool,
    alt: bool,
}

impl Keyboard {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            shift: false,
            ctrl: false,
            alt: false,
        }
    }

    #[must_use]
    pub const fn alt(&self) -> bool {
        self.alt
    }

    /// Feed one scancode.
    pub fn scancode(&mut self, code: u8) -> Option<KeyAction> {
        match code {
            SHIFT_DOWN => self.shift = true,
            SHIFT_UP => self.shift = false,
            CTRL_DOWN => self.ctrl = true,
            CTRL_UP => self.ctrl = false,
            ALT_DOWN => self.alt = true,
            ALT_UP => self.alt = false,
            c if c >= RELEASED => {}
            0x02..=0x04 if self.ctrl => return Some(KeyAction::SwitchTty(usize::from(code - 0x02))),
            _ => return self.translate(code).map(KeyAction::Key),
        }
        None
    }

    fn translate(&self, code: u8) -> Option<KeyEvent> {
        let special = match code {
            0x01 => KeyEvent::Escape,
            0x0E => KeyEvent::Backspace,
            0x48 => KeyEvent::Arrow(Arrow::Up),
            0x50 => KeyEvent::Arrow(Arrow::Down),
            0x4D => KeyEvent::Arrow(Arrow::Right),
            0x4B => KeyEvent::Arrow(Arrow::Left),
            _ => {
                let map = if self.shift { &SHIFTED } else { &PLAIN };
                let c = map[usize::from(code)];
                return (c != 0).then_some(KeyEvent::Byte(c));
            }
        };
        Some(special)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(codes: &[u8]) -> Vec<KeyAction> {
        let mut kb = Keyboard::new();
        codes.iter().filter_map(|&c| kb.scancode(c)).collect()
    }

    fn byte(c: u8) -> KeyAction {
        KeyAction::Key(KeyEvent::Byte(c))
    }

    #[test]
    fn letters_and_shift() {
        // h, shift+i, shift release, enter
        let actions = typed(&[0x23, 0xA3, 0x2A, 0x17, 0xAA, 0x17, 0x1C]);
        assert_eq!(actions, [byte(b'h'), byte(b'I'), byte(b'i'), byte(b'\n')]);
    }

    #[test]
    fn uk_symbols() {
        assert_eq!(typed(&[0x2A, 0x03, 0x04, 0x28]), [byte(b'"'), byte(b'#'), byte(b'@')]);
        assert_eq!(typed(&[0x2B, 0x56, 0x29]), [byte(b'#'), byte(b'\\'), byte(b'`')]);
        // shifted 0x29 has no symbol
        assert_eq!(typed(&[0x2A, 0x29]), []);
    }

    #[test]
    fn special_keys() {
        assert_eq!(
            typed(&[0x01, 0x0E, 0x48, 0x4B]),
            [
                KeyAction::Key(KeyEvent::Escape),
                KeyAction::Key(KeyEvent::Backspace),
                KeyAction::Key(KeyEvent::Arrow(Arrow::Up)),
                KeyAction::Key(KeyEvent::Arrow(Arrow::Left)),
            ]
        );
    }

    #[test]
    fn ctrl_digits_switch_consoles() {
        assert_eq!(
            typed(&[0x1D, 0x03, 0x9D, 0x03]),
            [KeyAction::SwitchTty(1), byte(b'2')]
        );
        assert_eq!(typed(&[0x1D, 0x05]), [byte(b'4')]);
    }

    #[test]
    fn modifiers_and_releases_produce_nothing() {
        let mut kb = Keyboard::new();
        assert_eq!(kb.scancode(0x38), None);
        assert!(kb.alt());
        assert_eq!(kb.scancode(0xB8), None);
        assert_eq!(kb.scancode(0x9E), None);
        assert_eq!(kb.scancode(0x80), None);
        assert_eq!(kb.scancode(0x3B), None); // F1
    }
}
