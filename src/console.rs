//! Kernel Console and Logger
//!
//! The console device itself (UART, framebuffer terminal) lives outside
//! this crate and implements [`ConsoleSink`]. Once a sink is installed,
//! `kprint!`/`kprintln!` and every `log` macro in the kernel write to it.

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

/// Output device for kernel messages.
pub trait ConsoleSink: Sync {
    /// Write a string to the device.
    fn write_str(&self, s: &str);
}

/// Adapter so a sink can be used with `core::fmt::Write`.
pub struct Console {
    sink: Option<&'static dyn ConsoleSink>,
}

impl Console {
    const fn new() -> Self {
        Self { sink: None }
    }

    /// Whether a device has been attached.
    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(sink) = self.sink {
            sink.write_str(s);
        }
        Ok(())
    }
}

/// Global console protected by spinlock
pub static CONSOLE: Mutex<Console> = Mutex::new(Console::new());

/// Attach a console device. Output before this point is dropped.
pub fn attach(sink: &'static dyn ConsoleSink) {
    CONSOLE.lock().sink = Some(sink);
}

/// Print macro for kernel output
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let mut console = $crate::console::CONSOLE.lock();
        let _ = write!(console, $($arg)*);
    }};
}

/// Println macro for kernel output
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint!("\n")
    };
    ($($arg:tt)*) => {{
        $crate::kprint!($($arg)*);
        $crate::kprint!("\n");
    }};
}

/// `log` backend that formats records onto the console.
pub struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut console = CONSOLE.lock();
        let _ = writeln!(console, "{:<5} {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Attach `sink` and route the `log` facade to it.
///
/// Fails if another logger was already installed.
pub fn init_logger(sink: &'static dyn ConsoleSink, level: LevelFilter) -> Result<(), SetLoggerError> {
    attach(sink);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    struct Capture(Mutex<String>);

    impl ConsoleSink for Capture {
        fn write_str(&self, s: &str) {
            self.0.lock().push_str(s);
        }
    }

    static CAPTURE: Capture = Capture(Mutex::new(String::new()));

    #[test]
    fn test_logger_writes_level_and_message() {
        // Other tests may have installed the logger first; either way the
        // sink below receives output.
        let _ = init_logger(&CAPTURE, LevelFilter::Debug);
        attach(&CAPTURE);
        log::set_max_level(LevelFilter::Debug);
        log::warn!("[TEST] pid {} misbehaved", 7);
        kprintln!("raw line");
        let out = CAPTURE.0.lock().clone();
        assert!(out.contains("WARN  [TEST] pid 7 misbehaved"));
        assert!(out.contains("raw line\n"));
    }
}
