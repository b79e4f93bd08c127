#![no_std]
#![no_main]

use stdlib::syscall;

#[unsafe(no_mangle)]
pub extern "C" fn _start(_argc: u64, _argv: *const *const u8) -> ! {
    syscall::write(1, b"hi");
    syscall::exit(0)
}
