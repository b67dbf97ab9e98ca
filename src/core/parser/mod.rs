//! Pure parsers for hypervisor-native text formats. None of these perform I/O.

pub mod classify;
pub mod config;
pub mod disk;
pub mod lease;
pub mod net;
