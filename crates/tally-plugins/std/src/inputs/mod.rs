//! Built-in inputs.

pub mod cpu;
pub mod file;

pub use cpu::Cpu;
pub use file::File;
