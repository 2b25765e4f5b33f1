pub mod rename;

pub use rename::{Rename, Replace};
