use crate::syscall::write;
use core::fmt::{self, Write};

/// Formatting sink writing to a file descriptor.
pub struct FdSink(pub u64);

impl Write for FdSink {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut bytes = s.as_bytes();
        while !bytes.is_empty() {
            let n = write(self.0, bytes);
            if crate::syscall_abi::is_error(n) || n == 0 {
                return Err(fmt::Error);
            }
            bytes = &bytes[(n as usize).min(bytes.len())..];
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn fd_write(fd: u64, args: fmt::Arguments) {
    // Ignore errors; there is nowhere to report them.
    fmt::write(&mut FdSink(fd), args).ok();
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        $crate::stdlib::fmt::fd_write(1, core::format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! println {
    () => {{
        $crate::syscall::write(1, b"\n");
    }};
    ($($arg:tt)*) => {{
        $crate::stdlib::fmt::fd_write(1, core::format_args!($($arg)*));
        $crate::syscall::write(1, b"\n");
    }};
}

#[macro_export]
macro_rules! eprintln {
    ($($arg:tt)*) => {{
        $crate::stdlib::fmt::fd_write(2, core::format_args!($($arg)*));
        $crate::syscall::write(2, b"\n");
    }};
}
