//! # Text Consoles
//!
//! Each [`Tty`] is a character grid with a cursor, written through a small
//! ANSI subset, and a keyboard input ring filled from interrupt context.
//!
//! | Sequence | Effect |
//! |----------|--------|
//! | `ESC [ A` / `B` / `C` / `D` | cursor up / down / right / left, clamped |
//! | `ESC [ K` | clear from the cursor to the end of the line |
//! | `ESC [ H` | cursor home |
//! | `ESC [ J` | clear from the cursor to the end of the screen |
//! | `\n` | next line, column 0 |
//! | `\r` | column 0 |
//! | `\b` | cursor left |
//!
//! Any other byte after `ESC [` ends the sequence silently. Writing past
//! the last column wraps; moving past the last row scrolls.

use crate::keyboard::{Arrow, KeyEvent};
use alloc::vec;
use alloc::vec::Vec;
use kernel_sync::SpinLock;

pub const WIDTH: usize = 240;
pub const HEIGHT: usize = 135;

/// Bytes in the input ring; one slot stays free to tell full from empty.
pub const INPUT_BUFFER_LEN: usize = 4096;

const ESC: u8 = 0x1B;

/// Input byte produced by the backspace key.
pub const BACKSPACE: u8 = 0xFF;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Escape {
    None,
    Esc,
    Bracket,
}

/// Character grid and cursor.
#[derive(Debug)]
pub struct Screen {
    width: usize,
    height: usize,
    cells: Vec<u8>,
    row: usize,
    column: usize,
    escape: Escape,
}

impl Screen {
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![b' '; width * height],
            row: 0,
            column: 0,
            escape: Escape::None,
        }
    }

    #[must_use]
    pub const fn cursor(&self) -> (usize, usize) {
        (self.row, self.column)
    }

    #[must_use]
    pub fn row(&self, row: usize) -> &[u8] {
        &self.cells[row * self.width..(row + 1) * self.width]
    }

    fn set(&mut self, row: usize, column: usize, c: u8) {
        self.cells[row * self.width + column] = c;
    }

    /// Move every row up by one and blank the last.
    fn scroll(&mut self) {
        self.cells.copy_within(self.width.., 0);
        let last = (self.height - 1) * self.width;
        self.cells[last..].fill(b' ');
    }

    fn newline(&mut self) {
        self.column = 0;
        if self.row == self.height - 1 {
            self.scroll();
        } else {
            self.row += 1;
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &c in bytes {
            self.put(c);
        }
    }

    fn put(&mut self, c: u8) {
        match self.escape {
            Escape::Esc => {
                self.escape = if c == b'[' { Escape::Bracket } else { Escape::None };
            }
            Escape::Bracket => {
                self.escape = Escape::None;
                self.control(c);
            }
            Escape::None => match c {
                ESC => self.escape = Escape::Esc,
                b'\n' => self.newline(),
                b'\r' => self.column = 0,
                0x08 => self.column = self.column.saturating_sub(1),
                _ => {
                    self.set(self.row, self.column, c);
                    if self.column == self.width - 1 {
                        self.newline();
                    } else {
                        self.column += 1;
                    }
                }
            },
        }
    }

    fn control(&mut self, c: u8) {
        match c {
            b'A' => self.row = self.row.saturating_sub(1),
            b'B' => self.row = (self.row + 1).min(self.height - 1),
            b'C' => self.column = (self.column + 1).min(self.width - 1),
            b'D' => self.column = self.column.saturating_sub(1),
            b'K' => {
                let start = self.row * self.width + self.column;
                let end = (self.row + 1) * self.width;
                self.cells[start..end].fill(b' ');
            }
            b'H' => (self.row, self.column) = (0, 0),
            b'J' => {
                let start = self.row * self.width + self.column;
                self.cells[start..].fill(b' ');
            }
            _ => {}
        }
    }
}

/// Keyboard bytes waiting for a reader. Input arriving while the ring is
/// full is dropped.
#[derive(Debug)]
pub struct InputRing {
    buf: [u8; INPUT_BUFFER_LEN],
    head: usize,
    tail: usize,
}

impl Default for InputRing {
    fn default() -> Self {
        Self::new()
    }
}

impl InputRing {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0; INPUT_BUFFER_LEN],
            head: 0,
            tail: 0,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        (self.tail + INPUT_BUFFER_LEN - self.head) % INPUT_BUFFER_LEN
    }

    pub const fn push(&mut self, c: u8) {
        if (self.tail + 1) % INPUT_BUFFER_LEN == self.head {
            return;
        }
        self.buf[self.tail] = c;
        self.tail = (self.tail + 1) % INPUT_BUFFER_LEN;
    }

    pub const fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let c = self.buf[self.head];
        self.head = (self.head + 1) % INPUT_BUFFER_LEN;
        Some(c)
    }
}

/// One console: screen plus input.
pub struct Tty {
    screen: SpinLock<Screen>,
    /// Filled by the keyboard interrupt; task code locks with `lock_irq`.
    input: SpinLock<InputRing>,
}

impl Default for Tty {
    fn default() -> Self {
        Self::new()
    }
}

impl Tty {
    #[must_use]
    pub fn new() -> Self {
        Self {
            screen: SpinLock::new(Screen::new(WIDTH, HEIGHT)),
            input: SpinLock::new(InputRing::new()),
        }
    }

    /// Interpret `bytes`; every byte counts as written.
    pub fn write(&self, bytes: &[u8]) -> usize {
        self.screen.lock_irq().write(bytes);
        bytes.len()
    }

    /// Run `f` on the screen contents.
    pub fn with_screen<R>(&self, f: impl FnOnce(&Screen) -> R) -> R {
        f(&self.screen.lock_irq())
    }

    /// Move buffered input into `buf`; returns the bytes moved.
    pub fn drain_input(&self, buf: &mut [u8]) -> usize {
        let mut input = self.input.lock_irq();
        let mut n = 0;
        while n < buf.len() {
            let Some(c) = input.pop() else { break };
            buf[n] = c;
            n += 1;
        }
        n
    }

    /// Queue the bytes for `event`. Interrupt context.
    pub fn push_key(&self, event: KeyEvent) {
        let mut input = self.input.lock();
        match event {
            KeyEvent::Byte(c) => input.push(c),
            KeyEvent::Escape => input.push(ESC),
            KeyEvent::Backspace => input.push(BACKSPACE),
            KeyEvent::Arrow(arrow) => {
                let code = match arrow {
                    Arrow::Up => b'A',
                    Arrow::Down => b'B',
                    Arrow::Right => b'C',
                    Arrow::Left => b'D',
                };
                input.push(ESC);
                input.push(b'[');
                input.push(code);
            }
        }
    }
}
