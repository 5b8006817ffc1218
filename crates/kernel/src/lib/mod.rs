// Core library utilities for the kernel

pub mod arena;
pub mod error;
pub mod panic;
pub mod printk;
pub mod ringbuf;
