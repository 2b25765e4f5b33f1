//! Built-in outputs.

pub mod discard;
pub mod file;

pub use discard::Discard;
pub use file::File;
