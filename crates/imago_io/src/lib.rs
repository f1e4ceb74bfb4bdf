//! I/O infrastructure adapters for the Imago imaging engine.

mod disk;
mod platform;

pub use disk::DiskSource;
