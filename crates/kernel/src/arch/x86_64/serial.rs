// COM1 serial console

use spin::Mutex;
use uart_16550::SerialPort;

const COM1: u16 = 0x3F8;

static SERIAL1: Mutex<Option<SerialPort>> = Mutex::new(None);

pub fn init() {
    let mut port = unsafe { SerialPort::new(COM1) };
    port.init();
    *SERIAL1.lock() = Some(port);
}

pub fn write_bytes(bytes: &[u8]) {
    let mut guard = SERIAL1.lock();
    if let Some(port) = guard.as_mut() {
        for &b in bytes {
            port.send(b);
        }
    }
}
