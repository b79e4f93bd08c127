use crate::{Kernel, TrapFrame};
use alloc::format;

/// A CPU exception as decoded by the entry stubs.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exception {
    /// `#DE`
    DivideError,
    /// `#DF`
    DoubleFault,
    /// `#GP`
    GeneralProtection,
    /// `#PF` with the faulting address from `cr2`.
    PageFault { address: u64, error_code: u64 },
    Other(u8),
}

const PF_WRITE: u64 = 1 << 1;

impl Kernel {
    /// Terminate the current task for a fault it caused in user mode.
    ///
    /// # Panics
    /// On a double fault, an unknown vector, or any exception raised in
    /// kernel mode.
    pub fn handle_exception(&self, exception: Exception, frame: &TrapFrame) {
        match exception {
            Exception::DoubleFault => panic!("Double fault"),
            Exception::Other(vector) => panic!("Unknown CPU exception {vector}"),
            _ if frame.cs & 3 == 0 => panic!("{exception:?} in kernel mode at {:#x}", frame.rip),
            Exception::DivideError => {
                self.printk("Division by zero\n");
                self.exit_current(1);
            }
            Exception::GeneralProtection => {
                self.printk("General protection fault\n");
                self.exit_current(139);
            }
            Exception::PageFault { address, error_code } => {
                let access = if error_code & PF_WRITE == 0 { "read" } else { "written" };
                self.printk(&format!(
                    "The instruction at 0x{:016x} referenced memory at 0x{address:016x}. The memory could not be {access}.\n",
                    frame.rip
                ));
                self.exit_current(1);
            }
        }
    }
}
