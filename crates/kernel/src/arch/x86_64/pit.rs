// PIT (8253/8254) channel 0 programming
//
// The PIT drives the BSP scheduler tick through the remapped legacy PIC.
// APs never take timer interrupts; they are rescheduled by IPI.

use crate::config::{PIT_DIVISOR, TIMER_VECTOR};
use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::instructions::port::Port;

const PIC1_OFFSET: u8 = 32;
const PIC2_OFFSET: u8 = 40;

static PICS: Mutex<ChainedPics> = Mutex::new(unsafe { ChainedPics::new(PIC1_OFFSET, PIC2_OFFSET) });

/// Remap the legacy PICs so IRQ 0 arrives on TIMER_VECTOR, then mask
/// everything except the timer line.
pub fn init_pic() {
    unsafe {
        let mut pics = PICS.lock();
        pics.initialize();
        pics.write_masks(0xFE, 0xFF);
    }
}

/// Program channel 0 as a rate generator at ~1000 Hz.
pub fn set_pit_freq() {
    let low = (PIT_DIVISOR & 0xFF) as u8;
    let high = ((PIT_DIVISOR >> 8) & 0xFF) as u8;

    let mut command: Port<u8> = Port::new(0x43);
    let mut channel0: Port<u8> = Port::new(0x40);
    unsafe {
        command.write(0x36);
        channel0.write(low);
        channel0.write(high);
    }
}

pub fn end_of_interrupt() {
    unsafe {
        PICS.lock().notify_end_of_interrupt(TIMER_VECTOR);
    }
}
