use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_qemu::qemu_trace;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Whether the UEFI console may still be written to.
static BOOT_SERVICES: AtomicBool = AtomicBool::new(true);

/// Logs to the QEMU debug port, and to the UEFI console until boot
/// services are gone.
pub struct UefiLogger {
    max_level: LevelFilter,
}

impl UefiLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Install the logger. Call once during early init.
    ///
    /// # Errors
    /// Fails if another logger was installed before.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        log::set_logger(Box::leak(Box::new(self)))?;
        log::set_max_level(max_level);
        Ok(())
    }

    /// Stop mirroring to the UEFI console. Call right before
    /// `ExitBootServices`.
    pub fn exit_boot_services() {
        BOOT_SERVICES.store(false, Ordering::Release);
    }
}

impl Log for UefiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        qemu_trace!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );

        if BOOT_SERVICES.load(Ordering::Acquire) {
            uefi::println!(
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
