// Memory management: boot heap and the VMM contract

#[cfg(target_os = "none")]
pub mod heap;
pub mod vmm;
