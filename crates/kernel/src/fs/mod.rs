// Filesystem drivers

pub mod echfs;
