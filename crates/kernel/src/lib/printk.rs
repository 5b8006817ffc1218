// Kernel logging (printk) with ring buffer

use super::ringbuf::RingBuffer;
use core::fmt::{self, Write};
use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

#[derive(Copy, Clone)]
pub struct LogEntry {
    pub ticks: u64,
    pub level: LogLevel,
    pub message: [u8; 256],
    pub len: usize,
}

static KERNEL_LOG: Mutex<RingBuffer<LogEntry, 256>> = Mutex::new(RingBuffer::new());

/// Formats into a fixed buffer, truncating on overflow. Logging must work
/// before the heap is up, so no allocation here.
struct StackWriter {
    buf: [u8; 256],
    len: usize,
}

impl Write for StackWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let n = core::cmp::min(s.len(), self.buf.len() - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

pub fn log(level: LogLevel, args: fmt::Arguments) {
    let mut writer = StackWriter {
        buf: [0u8; 256],
        len: 0,
    };
    let _ = writer.write_fmt(args);

    console_write(b"[");
    console_write(level.as_str().as_bytes());
    console_write(b"] ");
    console_write(&writer.buf[..writer.len]);
    console_write(b"\n");

    KERNEL_LOG.lock().push(LogEntry {
        ticks: crate::time::ticks(),
        level,
        message: writer.buf,
        len: writer.len,
    });
}

/// Drain the buffered log, oldest first.
pub fn drain_log() -> alloc::vec::Vec<LogEntry> {
    KERNEL_LOG.lock().drain_all()
}

#[cfg(target_os = "none")]
fn console_write(bytes: &[u8]) {
    crate::arch::x86_64::serial::write_bytes(bytes);
}

#[cfg(not(target_os = "none"))]
fn console_write(_bytes: &[u8]) {}

#[macro_export]
macro_rules! printk {
    ($level:expr, $($arg:tt)*) => {
        $crate::lib::printk::log($level, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::printk!($crate::lib::printk::LogLevel::Error, $($arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::printk!($crate::lib::printk::LogLevel::Warn, $($arg)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::printk!($crate::lib::printk::LogLevel::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::printk!($crate::lib::printk::LogLevel::Debug, $($arg)*)
    };
}
